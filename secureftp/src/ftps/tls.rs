//! # Tls
//!
//! Tls wrappers.
//!
//! A [`TlsConnector`] is the TLS engine as seen by the FTPS session: it wraps a connected [`TcpStream`]
//! into a client TLS stream, verifying the server against the given domain and resuming the given session
//! when the server agrees to.

use std::fmt::Debug;
use std::io::{Read, Write};
use std::net::TcpStream;

use crate::{FtpError, FtpResult};

#[cfg(feature = "native-tls")]
mod native_tls;
#[cfg(feature = "native-tls")]
pub use self::native_tls::{NativeTlsConnector, NativeTlsStream};

#[cfg(feature = "rustls")]
mod rustls;
#[cfg(feature = "rustls")]
pub use self::rustls::{RustlsConnector, RustlsSession, RustlsStream};

pub trait TlsConnector: Debug {
    type Stream: TlsStream<Session = Self::Session>;
    /// Opaque session state which can be handed to a later handshake for resumption
    type Session: Clone + Debug + Send;

    /// Perform a blocking client handshake over `stream`.
    ///
    /// `session`, when set, is offered to the server for resumption; a server declining it
    /// results in a full handshake, not in an error.
    /// Unless the connector was configured otherwise, the server certificate must be valid for `domain`.
    fn connect(
        &self,
        domain: &str,
        stream: TcpStream,
        session: Option<&Self::Session>,
    ) -> FtpResult<Self::Stream>;

    /// Whether this connector is backed by a TLS engine at all
    fn is_available(&self) -> bool {
        true
    }
}

/// A trait for a TLS stream.
///
/// This kind of stream is returned when using a data connection in FTP.
pub trait TlsStream: Debug {
    type InnerStream: Read + Write;
    type Session;

    /// Get ref to underlying tcp stream
    fn get_ref(&self) -> &TcpStream;

    /// Get mutable reference to tls stream
    fn mut_ref(&mut self) -> &mut Self::InnerStream;

    /// Session negotiated by this stream, if the engine exposes one
    fn session(&self) -> Option<Self::Session>;

    /// DER encoded certificate presented by the server
    fn peer_certificate(&self) -> Option<Vec<u8>>;
}

/// Connector used when no TLS engine is available: every upgrade fails with [`FtpError::TlsUnavailable`]
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTlsConnector;

impl TlsConnector for NoTlsConnector {
    type Stream = NoTlsStream;
    type Session = ();

    fn connect(
        &self,
        _domain: &str,
        _stream: TcpStream,
        _session: Option<&()>,
    ) -> FtpResult<NoTlsStream> {
        Err(FtpError::TlsUnavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Stream type of [`NoTlsConnector`]. It can't be constructed.
#[derive(Debug)]
pub enum NoTlsStream {}

impl TlsStream for NoTlsStream {
    type InnerStream = TcpStream;
    type Session = ();

    fn get_ref(&self) -> &TcpStream {
        match *self {}
    }

    fn mut_ref(&mut self) -> &mut Self::InnerStream {
        match *self {}
    }

    fn session(&self) -> Option<()> {
        match *self {}
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        match *self {}
    }
}
