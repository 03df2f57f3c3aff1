//! # Native tls
//!
//! Native tls implementation of TLS types.
//!
//! native-tls doesn't expose the negotiated session, so resumption is left to the platform engine.

use std::net::TcpStream;

use native_tls::{HandshakeError, TlsConnector, TlsStream as NativeTlsInnerStream};

use super::{TlsConnector as FtpsTlsConnector, TlsStream};
use crate::{FtpError, FtpResult};

#[derive(Debug)]
/// A Wrapper for the tls connector
pub struct NativeTlsConnector {
    connector: TlsConnector,
}

impl From<TlsConnector> for NativeTlsConnector {
    fn from(connector: TlsConnector) -> Self {
        Self { connector }
    }
}

impl FtpsTlsConnector for NativeTlsConnector {
    type Stream = NativeTlsStream;
    type Session = ();

    fn connect(
        &self,
        domain: &str,
        stream: TcpStream,
        _session: Option<&()>,
    ) -> FtpResult<Self::Stream> {
        self.connector
            .connect(domain, stream)
            .map(|stream| NativeTlsStream { stream })
            .map_err(|err| match err {
                HandshakeError::Failure(err) => classify_failure(err.to_string()),
                HandshakeError::WouldBlock(_) => {
                    FtpError::TlsHandshake(String::from("handshake interrupted"))
                }
            })
    }
}

/// The platform engines only report a message; certificate problems are told apart by its content
fn classify_failure(message: String) -> FtpError {
    let lowercase = message.to_ascii_lowercase();
    if lowercase.contains("certificate") || lowercase.contains("hostname") {
        FtpError::TlsVerification(message)
    } else {
        FtpError::TlsHandshake(message)
    }
}

// -- tls stream wrapper to implement drop...

/// Tls stream wrapper. Shuts the TLS session down when dropped
#[derive(Debug)]
pub struct NativeTlsStream {
    stream: NativeTlsInnerStream<TcpStream>,
}

impl TlsStream for NativeTlsStream {
    type InnerStream = NativeTlsInnerStream<TcpStream>;
    type Session = ();

    /// Get ref to underlying tcp stream
    fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Get mutable reference to tls stream
    fn mut_ref(&mut self) -> &mut Self::InnerStream {
        &mut self.stream
    }

    fn session(&self) -> Option<()> {
        None
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.stream
            .peer_certificate()
            .ok()
            .flatten()
            .and_then(|cert| cert.to_der().ok())
    }
}

impl Drop for NativeTlsStream {
    fn drop(&mut self) {
        if let Err(err) = self.stream.shutdown() {
            error!("Failed to shutdown stream: {}", err);
        } else {
            debug!("TLS Stream shut down");
        }
    }
}
