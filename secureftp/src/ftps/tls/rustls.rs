//! # Rustls
//!
//! Rustls implementation of tls types

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{
    ClientSessionStore, Resumption, Tls12ClientSessionValue, Tls13ClientSessionValue,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, NamedGroup, SignatureScheme, StreamOwned,
};

use super::{TlsConnector, TlsStream};
use crate::{FtpError, FtpResult};

/// A Wrapper for the tls connector
pub struct RustlsConnector {
    connector: Arc<ClientConfig>,
}

impl std::fmt::Debug for RustlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<?>")
    }
}

impl From<Arc<ClientConfig>> for RustlsConnector {
    fn from(connector: Arc<ClientConfig>) -> Self {
        Self { connector }
    }
}

impl From<ClientConfig> for RustlsConnector {
    fn from(config: ClientConfig) -> Self {
        Self::from(Arc::new(config))
    }
}

impl RustlsConnector {
    /// Build a connector which doesn't verify the server certificate nor its name.
    ///
    /// The connection is still encrypted, but anybody between client and server may impersonate the server.
    pub fn dangerous_no_verify() -> Self {
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
            .with_no_client_auth();
        Self::from(config)
    }
}

impl TlsConnector for RustlsConnector {
    type Stream = RustlsStream;
    type Session = RustlsSession;

    fn connect(
        &self,
        domain: &str,
        stream: TcpStream,
        session: Option<&RustlsSession>,
    ) -> FtpResult<Self::Stream> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| FtpError::TlsVerification(e.to_string()))?;
        // connections resuming a session share its store, so tickets issued on any of them are reused
        let store = session
            .map(|session| Arc::clone(&session.store))
            .unwrap_or_default();
        let mut config = ClientConfig::clone(&self.connector);
        config.resumption = Resumption::store(store.clone());
        let connection = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| FtpError::TlsHandshake(e.to_string()))?;
        let mut stream = StreamOwned::new(connection, stream);
        while stream.conn.is_handshaking() {
            stream
                .conn
                .complete_io(&mut stream.sock)
                .map_err(handshake_error)?;
        }
        trace!(
            "rustls handshake completed; protocol {:?}",
            stream.conn.protocol_version()
        );
        Ok(RustlsStream {
            stream,
            session: RustlsSession { store },
        })
    }
}

/// Map an io error returned while handshaking to the matching [`FtpError`]
fn handshake_error(err: io::Error) -> FtpError {
    match err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        Some(err @ rustls::Error::InvalidCertificate(_)) => {
            FtpError::TlsVerification(err.to_string())
        }
        Some(err) => FtpError::TlsHandshake(err.to_string()),
        None => FtpError::TlsHandshake(err.to_string()),
    }
}

// -- session

/// Maximum amount of TLS 1.3 tickets kept for a session
const MAX_TLS13_TICKETS: usize = 8;

/// Session state of a rustls connection.
///
/// TLS 1.3 tickets are sent by the server after the handshake, so they are collected
/// in the store as long as the connection is alive.
#[derive(Debug, Clone)]
pub struct RustlsSession {
    store: Arc<SingleSessionStore>,
}

impl RustlsSession {
    /// Returns whether the server handed out anything which can be resumed
    pub fn is_resumable(&self) -> bool {
        let slot = self.store.lock();
        slot.tls12.is_some() || !slot.tls13.is_empty()
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    kx_hint: Option<NamedGroup>,
    tls12: Option<Tls12ClientSessionValue>,
    tls13: VecDeque<Tls13ClientSessionValue>,
}

/// Session store holding the state of a single TLS session.
///
/// A store only ever sees the target host of a single FTPS session, so server names are not keyed.
#[derive(Debug, Default)]
struct SingleSessionStore {
    slot: Mutex<SessionSlot>,
}

impl SingleSessionStore {
    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClientSessionStore for SingleSessionStore {
    fn set_kx_hint(&self, _server_name: ServerName<'static>, group: NamedGroup) {
        self.lock().kx_hint = Some(group);
    }

    fn kx_hint(&self, _server_name: &ServerName<'_>) -> Option<NamedGroup> {
        self.lock().kx_hint
    }

    fn set_tls12_session(&self, _server_name: ServerName<'static>, value: Tls12ClientSessionValue) {
        let mut slot = self.lock();
        slot.tls12 = Some(value);
        slot.tls13.clear();
    }

    fn tls12_session(&self, _server_name: &ServerName<'_>) -> Option<Tls12ClientSessionValue> {
        self.lock().tls12.clone()
    }

    fn remove_tls12_session(&self, _server_name: &ServerName<'static>) {
        self.lock().tls12 = None;
    }

    fn insert_tls13_ticket(
        &self,
        _server_name: ServerName<'static>,
        value: Tls13ClientSessionValue,
    ) {
        let mut slot = self.lock();
        if slot.tls13.len() == MAX_TLS13_TICKETS {
            slot.tls13.pop_front();
        }
        slot.tls13.push_back(value);
        slot.tls12 = None;
    }

    fn take_tls13_ticket(
        &self,
        _server_name: &ServerName<'static>,
    ) -> Option<Tls13ClientSessionValue> {
        self.lock().tls13.pop_back()
    }
}

// -- verifier

/// Accepts any server certificate
#[derive(Debug)]
struct NoCertVerifier;

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

// -- tls stream wrapper to implement drop...

/// Tls stream wrapper. Sends close_notify to the server when dropped
#[derive(Debug)]
pub struct RustlsStream {
    stream: StreamOwned<ClientConnection, TcpStream>,
    session: RustlsSession,
}

impl TlsStream for RustlsStream {
    type InnerStream = StreamOwned<ClientConnection, TcpStream>;
    type Session = RustlsSession;

    /// Get ref to underlying tcp stream
    fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Get mutable reference to tls stream
    fn mut_ref(&mut self) -> &mut Self::InnerStream {
        &mut self.stream
    }

    fn session(&self) -> Option<RustlsSession> {
        Some(self.session.clone())
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.stream
            .conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| cert.as_ref().to_vec())
    }
}

impl Drop for RustlsStream {
    fn drop(&mut self) {
        if let Err(err) = self.stream.flush() {
            error!("error in flushing rustls stream on drop: {err}");
        }
        self.stream.conn.send_close_notify();
        if let Err(err) = self.stream.conn.write_tls(&mut self.stream.sock) {
            error!("error in terminating rustls stream: {err}");
        }
    }
}
