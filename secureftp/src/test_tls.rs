//! # Test TLS
//!
//! A TLS connector for tests which doesn't encrypt anything: it records every handshake
//! and hands out numbered sessions, so that resumption and hostname verification can be asserted.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

use crate::ftps::{TlsConnector, TlsStream};
use crate::{FtpError, FtpResult};

/// Something which happened on the wire, seen from the test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsEvent {
    /// A command received by the test server
    Command(String),
    /// A handshake performed by the client
    Handshake(Handshake),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Name the certificate was verified against
    pub domain: String,
    /// Address of the peer the handshake ran with
    pub peer: SocketAddr,
    /// Session offered for resumption
    pub offered: Option<u32>,
    /// Session the handshake ended up with
    pub negotiated: u32,
}

/// Journal of events, shared between the connector and the test server
pub type Journal = Arc<Mutex<Vec<TlsEvent>>>;

#[derive(Debug, Default)]
struct Sessions {
    last_issued: u32,
}

#[derive(Debug)]
pub struct MockTlsConnector {
    certificate_name: String,
    resume: bool,
    fail: bool,
    sessions: Mutex<Sessions>,
    journal: Journal,
}

impl MockTlsConnector {
    /// Connector talking to a server whose certificate is valid for `certificate_name`
    pub fn new(certificate_name: &str) -> Self {
        Self {
            certificate_name: certificate_name.to_string(),
            resume: true,
            fail: false,
            sessions: Mutex::new(Sessions::default()),
            journal: Journal::default(),
        }
    }

    /// The server never honours the offered session
    pub fn decline_resumption(mut self) -> Self {
        self.resume = false;
        self
    }

    /// Every handshake fails
    pub fn fail_handshake(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn events(&self) -> Vec<TlsEvent> {
        self.journal.lock().unwrap().clone()
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TlsEvent::Handshake(handshake) => Some(handshake),
                TlsEvent::Command(_) => None,
            })
            .collect()
    }
}

impl TlsConnector for MockTlsConnector {
    type Stream = MockTlsStream;
    type Session = u32;

    fn connect(
        &self,
        domain: &str,
        stream: TcpStream,
        session: Option<&u32>,
    ) -> FtpResult<MockTlsStream> {
        if self.fail {
            return Err(FtpError::TlsHandshake(String::from("handshake failure")));
        }
        if domain != self.certificate_name {
            return Err(FtpError::TlsVerification(format!(
                "certificate is valid for {}, not {domain}",
                self.certificate_name
            )));
        }
        let negotiated = match session {
            Some(id) if self.resume => *id,
            _ => {
                let mut sessions = self.sessions.lock().unwrap();
                sessions.last_issued += 1;
                sessions.last_issued
            }
        };
        let peer = stream.peer_addr().map_err(FtpError::ConnectionError)?;
        self.journal
            .lock()
            .unwrap()
            .push(TlsEvent::Handshake(Handshake {
                domain: domain.to_string(),
                peer,
                offered: session.copied(),
                negotiated,
            }));
        Ok(MockTlsStream {
            stream,
            session: negotiated,
            certificate: self.certificate_name.as_bytes().to_vec(),
        })
    }
}

/// A plain stream posing as a TLS stream
#[derive(Debug)]
pub struct MockTlsStream {
    stream: TcpStream,
    session: u32,
    certificate: Vec<u8>,
}

impl TlsStream for MockTlsStream {
    type InnerStream = TcpStream;
    type Session = u32;

    fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    fn mut_ref(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    fn session(&self) -> Option<u32> {
        Some(self.session)
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        Some(self.certificate.clone())
    }
}

/// A pair of connected sockets: (client, server)
pub fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}
