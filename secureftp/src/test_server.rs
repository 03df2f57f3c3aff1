//! # Test server
//!
//! A scripted FTP server running in a thread, used to check what the client sends and in which order.
//! Commands received are written to the same [`Journal`] the test TLS connector writes handshakes to.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::test_tls::{Handshake, Journal, TlsEvent};

const TIMEOUT: Duration = Duration::from_secs(10);

/// A step of the server script
#[derive(Debug, Clone)]
pub enum Step {
    /// Send a reply; the line terminator is appended
    Reply(&'static str),
    /// Wait for a command. A trailing `*` matches any command starting with what precedes it.
    /// On mismatch the server replies `500` and stops.
    Expect(&'static str),
    /// Open the passive data listener and reply `227` with its address
    PassiveListen,
    /// Same as [`Step::PassiveListen`], but announce a private address instead of the real one
    PassiveListenBehindNat,
    /// Open the passive data listener and reply `229` with its port
    ExtendedPassiveListen,
    /// Accept the data connection on the passive listener
    AcceptData,
    /// Connect to the address given by the client with `PORT` or `EPRT`
    ConnectData,
    /// Write bytes to the data connection
    SendData(&'static [u8]),
    /// Read the data connection until the client closes it
    ReadData,
    /// Close the data connection
    CloseData,
}

#[derive(Default)]
struct Outcome {
    failures: Vec<String>,
    received: Vec<Vec<u8>>,
}

pub struct MockServer {
    addr: SocketAddr,
    journal: Journal,
    outcome: Arc<Mutex<Outcome>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Start serving `script` to the first client connecting
    pub fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let journal = Journal::default();
        let outcome = Arc::new(Mutex::new(Outcome::default()));
        let handle = {
            let journal = journal.clone();
            let outcome = outcome.clone();
            thread::spawn(move || {
                let mut session = match accept(&listener) {
                    Ok(control) => ServerSession::new(control, journal),
                    Err(err) => {
                        outcome.lock().unwrap().failures.push(err);
                        return;
                    }
                };
                let result = session.run(script);
                let mut outcome = outcome.lock().unwrap();
                outcome.received = std::mem::take(&mut session.received);
                if let Err(err) = result {
                    outcome.failures.push(err);
                }
            })
        };
        Self {
            addr,
            journal,
            outcome,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Commands received and handshakes performed so far
    pub fn events(&self) -> Vec<TlsEvent> {
        self.journal.lock().unwrap().clone()
    }

    /// Commands received so far
    pub fn commands(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TlsEvent::Command(command) => Some(command),
                TlsEvent::Handshake(_) => None,
            })
            .collect()
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

    /// Wait for the script to end, panic if the client deviated from it and return what was uploaded
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        let mut outcome = self.outcome.lock().unwrap();
        assert!(
            outcome.failures.is_empty(),
            "server script failed: {:?}",
            outcome.failures
        );
        std::mem::take(&mut outcome.received)
    }
}

struct ServerSession {
    reader: BufReader<TcpStream>,
    control: TcpStream,
    journal: Journal,
    passive: Option<TcpListener>,
    active_addr: Option<SocketAddr>,
    data: Option<TcpStream>,
    received: Vec<Vec<u8>>,
}

impl ServerSession {
    fn new(control: TcpStream, journal: Journal) -> Self {
        control.set_read_timeout(Some(TIMEOUT)).unwrap();
        Self {
            reader: BufReader::new(control.try_clone().unwrap()),
            control,
            journal,
            passive: None,
            active_addr: None,
            data: None,
            received: Vec::new(),
        }
    }

    fn run(&mut self, script: Vec<Step>) -> Result<(), String> {
        for step in script {
            self.step(step)?;
        }
        Ok(())
    }

    fn step(&mut self, step: Step) -> Result<(), String> {
        match step {
            Step::Reply(reply) => self.reply(reply),
            Step::Expect(pattern) => self.expect(pattern),
            Step::PassiveListen => {
                let port = self.listen()?;
                self.reply(&format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})",
                    port >> 8,
                    port & 0xff
                ))
            }
            Step::PassiveListenBehindNat => {
                let port = self.listen()?;
                self.reply(&format!(
                    "227 Entering Passive Mode (10,255,255,1,{},{})",
                    port >> 8,
                    port & 0xff
                ))
            }
            Step::ExtendedPassiveListen => {
                let port = self.listen()?;
                self.reply(&format!("229 Entering Extended Passive Mode (|||{port}|)"))
            }
            Step::AcceptData => {
                let listener = self
                    .passive
                    .take()
                    .ok_or_else(|| String::from("no passive listener"))?;
                self.data = Some(accept(&listener)?);
                Ok(())
            }
            Step::ConnectData => {
                let addr = self
                    .active_addr
                    .take()
                    .ok_or_else(|| String::from("client didn't announce an address"))?;
                let stream = TcpStream::connect_timeout(&addr, TIMEOUT)
                    .map_err(|e| format!("failed to connect to {addr}: {e}"))?;
                self.data = Some(stream);
                Ok(())
            }
            Step::SendData(bytes) => self
                .data()?
                .write_all(bytes)
                .map_err(|e| format!("failed to send data: {e}")),
            Step::ReadData => {
                let mut buf = Vec::new();
                let data = self.data()?;
                data.set_read_timeout(Some(TIMEOUT)).unwrap();
                data.read_to_end(&mut buf)
                    .map_err(|e| format!("failed to read data: {e}"))?;
                self.received.push(buf);
                Ok(())
            }
            Step::CloseData => {
                self.data = None;
                Ok(())
            }
        }
    }

    fn reply(&mut self, reply: &str) -> Result<(), String> {
        self.control
            .write_all(format!("{reply}\r\n").as_bytes())
            .map_err(|e| format!("failed to reply '{reply}': {e}"))
    }

    fn expect(&mut self, pattern: &str) -> Result<(), String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => return Err(format!("connection closed while expecting '{pattern}'")),
            Ok(_) => {}
            Err(err) => return Err(format!("failed to read '{pattern}': {err}")),
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        self.journal
            .lock()
            .unwrap()
            .push(TlsEvent::Command(command.clone()));
        let matches = match pattern.strip_suffix('*') {
            Some(prefix) => command.starts_with(prefix),
            None => command == pattern,
        };
        if !matches {
            let _ = self.reply("500 Unexpected command");
            return Err(format!("expected '{pattern}', got '{command}'"));
        }
        if let Some(addr) = parse_active_address(&command) {
            self.active_addr = Some(addr);
        }
        Ok(())
    }

    fn listen(&mut self) -> Result<u16, String> {
        let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| e.to_string())?;
        let port = listener.local_addr().map_err(|e| e.to_string())?.port();
        self.passive = Some(listener);
        Ok(port)
    }

    fn data(&mut self) -> Result<&mut TcpStream, String> {
        self.data
            .as_mut()
            .ok_or_else(|| String::from("no data connection"))
    }
}

fn accept(listener: &TcpListener) -> Result<TcpStream, String> {
    listener.set_nonblocking(true).map_err(|e| e.to_string())?;
    let started = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).map_err(|e| e.to_string())?;
                return Ok(stream);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if started.elapsed() > TIMEOUT {
                    return Err(String::from("nobody connected"));
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => return Err(err.to_string()),
        }
    }
}

/// Address given by a `PORT` or `EPRT` command
fn parse_active_address(command: &str) -> Option<SocketAddr> {
    if let Some(args) = command.strip_prefix("PORT ") {
        let numbers: Vec<u8> = args
            .split(',')
            .map(|n| n.trim().parse().ok())
            .collect::<Option<_>>()?;
        if numbers.len() != 6 {
            return None;
        }
        let ip = IpAddr::from([numbers[0], numbers[1], numbers[2], numbers[3]]);
        let port = (u16::from(numbers[4]) << 8) | u16::from(numbers[5]);
        return Some(SocketAddr::new(ip, port));
    }
    let args = command.strip_prefix("EPRT ")?;
    let mut fields = args.trim_matches('|').split('|');
    let _protocol = fields.next()?;
    let ip: IpAddr = fields.next()?.parse().ok()?;
    let port: u16 = fields.next()?.parse().ok()?;
    Some(SocketAddr::new(ip, port))
}
