//! # Data Stream
//!
//! This module exposes the data stream where bytes must be written to/read from,
//! and the close sequence shared by every kind of stream.

use std::io::{self, ErrorKind, Read, Result, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use super::secure_stream::SecureStream;
use super::tls::TlsStream;

/// Data Stream used for communications. It can be both of type Tcp in case of plain communication or Ssl in case of FTPS
#[derive(Debug)]
pub enum DataStream<T>
where
    T: TlsStream,
{
    Tcp(TcpStream),
    Ssl(Box<SecureStream<T>>),
}

impl<T> DataStream<T>
where
    T: TlsStream,
{
    /// Returns a reference to the underlying TcpStream.
    pub fn get_ref(&self) -> &TcpStream {
        match self {
            DataStream::Tcp(ref stream) => stream,
            DataStream::Ssl(ref stream) => stream.get_ref(),
        }
    }

    /// Returns whether the stream is protected by TLS
    pub fn is_secure(&self) -> bool {
        matches!(self, DataStream::Ssl(_))
    }

    /// DER certificate presented by the server on this stream
    pub fn peer_certificate(&self) -> Option<Vec<u8>> {
        match self {
            DataStream::Tcp(_) => None,
            DataStream::Ssl(ref stream) => stream.peer_certificate(),
        }
    }
}

/// A stream which can go through the close sequence of a connection.
///
/// The sequence is: [`CloseableStream::shutdown`], then [`CloseableStream::set_read_timeout`],
/// then reading until EOF. See [`close_stream`].
pub trait CloseableStream: Read + Write {
    /// Stop sending on the stream
    fn shutdown(&mut self) -> Result<()>;

    /// Bound the time spent reading the remaining bytes
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;
}

impl CloseableStream for TcpStream {
    fn shutdown(&mut self) -> Result<()> {
        TcpStream::shutdown(self, Shutdown::Write)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

impl<T> CloseableStream for SecureStream<T>
where
    T: TlsStream,
{
    fn shutdown(&mut self) -> Result<()> {
        SecureStream::shutdown(self)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        SecureStream::set_read_timeout(self, timeout)
    }
}

impl<T> CloseableStream for DataStream<T>
where
    T: TlsStream,
{
    fn shutdown(&mut self) -> Result<()> {
        match self {
            DataStream::Tcp(ref mut stream) => CloseableStream::shutdown(stream),
            DataStream::Ssl(ref mut stream) => stream.shutdown(),
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match self {
            DataStream::Tcp(ref mut stream) => CloseableStream::set_read_timeout(stream, timeout),
            DataStream::Ssl(ref mut stream) => stream.set_read_timeout(timeout),
        }
    }
}

/// Run the close sequence on `stream`: shutdown, set the read timeout, then discard bytes until EOF.
///
/// A read timing out ends the sequence without error; the remaining bytes are dropped with the stream.
pub fn close_stream<S>(stream: &mut S, timeout: Duration) -> Result<u64>
where
    S: CloseableStream + ?Sized,
{
    match stream.shutdown() {
        Err(err) if err.kind() != ErrorKind::NotConnected => return Err(err),
        _ => {}
    }
    stream.set_read_timeout(Some(timeout))?;
    match io::copy(stream, &mut io::sink()) {
        Ok(discarded) => {
            trace!("discarded {discarded} bytes before EOF");
            Ok(discarded)
        }
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            debug!("peer didn't close the stream within {timeout:?}");
            Ok(0)
        }
        Err(err) => Err(err),
    }
}

// -- sync

impl<T> Read for DataStream<T>
where
    T: TlsStream,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            DataStream::Tcp(ref mut stream) => stream.read(buf),
            DataStream::Ssl(ref mut stream) => stream.read(buf),
        }
    }
}

impl<T> Write for DataStream<T>
where
    T: TlsStream,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            DataStream::Tcp(ref mut stream) => stream.write(buf),
            DataStream::Ssl(ref mut stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            DataStream::Tcp(ref mut stream) => stream.flush(),
            DataStream::Ssl(ref mut stream) => stream.flush(),
        }
    }
}

#[cfg(test)]
mod test {

    use std::time::Instant;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ftps::tls::TlsConnector as _;
    use crate::test_tls::{socket_pair, MockTlsConnector, MockTlsStream};

    #[test]
    fn should_drain_plain_stream_until_eof() {
        let (client, mut server) = socket_pair();
        let mut stream: DataStream<MockTlsStream> = DataStream::Tcp(client);
        server.write_all(b"left over").unwrap();
        let peer = std::thread::spawn(move || {
            // closes once the client half-closed
            let mut buf = Vec::new();
            server.read_to_end(&mut buf).unwrap();
            buf
        });
        assert_eq!(
            close_stream(&mut stream, Duration::from_secs(5)).unwrap(),
            9
        );
        assert!(peer.join().unwrap().is_empty());
        assert!(!stream.is_secure());
        assert_eq!(stream.peer_certificate(), None);
    }

    #[test]
    fn should_stop_draining_on_timeout() {
        let (client, _server) = socket_pair();
        let mut stream: DataStream<MockTlsStream> = DataStream::Tcp(client);
        assert_eq!(
            close_stream(&mut stream, Duration::from_millis(100)).unwrap(),
            0
        );
    }

    #[test]
    fn should_close_secure_stream_without_blocking() {
        let (client, _server) = socket_pair();
        let tls = MockTlsConnector::new("localhost")
            .connect("localhost", client, None)
            .unwrap();
        let mut stream = DataStream::Ssl(Box::new(SecureStream::new(tls)));
        assert!(stream.is_secure());
        assert!(stream.peer_certificate().is_some());
        let started = Instant::now();
        assert_eq!(
            close_stream(&mut stream, Duration::from_secs(30)).unwrap(),
            0
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        // the timeout never reached the socket
        assert_eq!(stream.get_ref().read_timeout().unwrap(), None);
    }
}
