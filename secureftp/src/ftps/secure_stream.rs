//! # Secure stream
//!
//! Adapter around an established TLS stream which makes the close sequence of a connection
//! (shutdown, read timeout, read until EOF) safe to run against TLS.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use super::tls::TlsStream;

/// A TLS stream which can be shut down.
///
/// Once shut down, reads return EOF immediately and writes fail with [`io::ErrorKind::BrokenPipe`].
/// The TLS session itself is terminated when the stream is dropped.
#[derive(Debug)]
pub struct SecureStream<T>
where
    T: TlsStream,
{
    stream: T,
    shutdown: bool,
}

impl<T> SecureStream<T>
where
    T: TlsStream,
{
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            shutdown: false,
        }
    }

    /// Flush pending data and mark the stream as closed.
    ///
    /// The stream is closed even if the flush fails; the flush error is then returned.
    /// The transport is left untouched: a half-close is not available on every TLS engine.
    pub fn shutdown(&mut self) -> io::Result<()> {
        if self.shutdown {
            return Ok(());
        }
        self.shutdown = true;
        trace!("TLS stream marked as shut down");
        self.stream.mut_ref().flush().map_err(|err| {
            error!("failed to flush TLS stream on shutdown: {err}");
            err
        })
    }

    /// Does nothing: timeouts are owned by the transport the TLS stream was built on
    pub fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Returns a reference to the underlying TcpStream.
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Session negotiated by the TLS stream
    pub fn session(&self) -> Option<T::Session> {
        self.stream.session()
    }

    /// DER certificate presented by the server
    pub fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.stream.peer_certificate()
    }
}

impl<T> Read for SecureStream<T>
where
    T: TlsStream,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.shutdown {
            return Ok(0);
        }
        self.stream.mut_ref().read(buf)
    }
}

impl<T> Write for SecureStream<T>
where
    T: TlsStream,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.shutdown {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write on a TLS stream which has been shut down",
            ));
        }
        self.stream.mut_ref().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.shutdown {
            return Ok(());
        }
        self.stream.mut_ref().flush()
    }
}
