//! # Upgrade
//!
//! Turns a plain socket into a [`SecureStream`], resuming the session kept in the [`SessionCache`].

use std::net::TcpStream;

use super::secure_stream::SecureStream;
use super::session_cache::SessionCache;
use super::tls::{TlsConnector, TlsStream};
use crate::{FtpError, FtpResult};

/// Wrap `stream` into TLS.
///
/// The cached session, if any, is offered for resumption and the server certificate is verified against `domain`,
/// which must be the host the FTPS session was opened with, whatever the address `stream` is connected to.
/// On success the negotiated session replaces the cached one.
pub fn upgrade<C>(
    connector: &C,
    stream: TcpStream,
    domain: &str,
    cache: &mut SessionCache<C::Session>,
) -> FtpResult<SecureStream<C::Stream>>
where
    C: TlsConnector,
{
    if !connector.is_available() {
        return Err(FtpError::TlsUnavailable);
    }
    debug!(
        "Upgrading connection with {} to TLS (resuming session: {})",
        stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default(),
        !cache.is_empty()
    );
    let stream = connector.connect(domain, stream, cache.get())?;
    match stream.session() {
        Some(session) => cache.store(session),
        None => trace!("TLS engine didn't expose a session"),
    }
    debug!("TLS stream OK");
    Ok(SecureStream::new(stream))
}
