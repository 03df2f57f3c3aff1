//! # Data channel
//!
//! Opens the data connection of a transfer and secures it once the server accepted the transfer command.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use super::upgrade::upgrade;
use super::{DataStream, ImplFtpsStream, TlsConnector};
use crate::command::Command;
use crate::regex::{EPSV_PORT_RE, PASV_PORT_RE};
use crate::status::ReplyClass;
use crate::types::{FtpError, FtpResult, Mode, Response};
use crate::Status;

impl<C> ImplFtpsStream<C>
where
    C: TlsConnector,
{
    /// Execute a command which sends or receives data in a separate, secured, stream.
    ///
    /// When `offset` is given, `REST` is sent before the command.
    /// Returns the `1xx` reply of the server to the command and the data stream.
    pub(super) fn data_command(
        &mut self,
        command: Command,
        offset: Option<usize>,
    ) -> FtpResult<(Response, DataStream<C::Stream>)> {
        match self.mode {
            Mode::Active => self.active_data_command(command, offset),
            Mode::ExtendedPassive | Mode::Passive => self.passive_data_command(command, offset),
        }
    }

    fn passive_data_command(
        &mut self,
        command: Command,
        offset: Option<usize>,
    ) -> FtpResult<(Response, DataStream<C::Stream>)> {
        let addr = match self.mode {
            Mode::ExtendedPassive => self.epsv()?,
            _ => self.pasv()?,
        };
        if let Some(offset) = offset {
            self.rest(offset)?;
        }
        debug!("Connecting to data channel at {addr}");
        let stream = (self.passive_stream_builder)(addr)?;
        self.perform(command)?;
        let response = self.read_transfer_reply()?;
        let stream = self.secure_data_stream(stream)?;
        Ok((response, stream))
    }

    fn active_data_command(
        &mut self,
        command: Command,
        offset: Option<usize>,
    ) -> FtpResult<(Response, DataStream<C::Stream>)> {
        let listener = self.active()?;
        if let Some(offset) = offset {
            self.rest(offset)?;
        }
        self.perform(command)?;
        let response = self.read_transfer_reply()?;
        let stream = self.accept_data_connection(&listener)?;
        let stream = self.secure_data_stream(stream)?;
        drop(listener);
        trace!("Closed data channel listener");
        Ok((response, stream))
    }

    /// Upgrade the data connection, verifying the server against the host of the control connection
    fn secure_data_stream(&mut self, stream: TcpStream) -> FtpResult<DataStream<C::Stream>> {
        let domain = self
            .domain
            .as_deref()
            .ok_or(FtpError::InvalidState("not connected"))?;
        debug!("Securing data channel");
        upgrade(&self.tls_connector, stream, domain, &mut self.session_cache)
            .map(|stream| DataStream::Ssl(Box::new(stream)))
    }

    /// Read the reply to a transfer command.
    ///
    /// A single `2xx` reply is tolerated before the `1xx` reply opening the transfer.
    fn read_transfer_reply(&mut self) -> FtpResult<Response> {
        let mut response = self.read_reply()?;
        if response.class() == ReplyClass::PositiveCompletion {
            debug!("Skipping informational reply {response}");
            response = self.read_reply()?;
        }
        match response.class() {
            ReplyClass::PositivePreliminary => Ok(response),
            _ => Err(FtpError::UnexpectedResponse(response)),
        }
    }

    /// Tell the server to skip the first `offset` bytes of the next transfer
    fn rest(&mut self, offset: usize) -> FtpResult<()> {
        debug!("Requesting to resume transfer at offset {}", offset);
        self.perform(Command::Rest(offset))?;
        let response = self.read_reply()?;
        match response.class() {
            ReplyClass::PositiveIntermediate => {
                debug!("Resume transfer accepted");
                Ok(())
            }
            _ => Err(FtpError::UnexpectedResponse(response)),
        }
    }

    /// Create a new tcp listener and announce it with `PORT` or `EPRT`
    fn active(&mut self) -> FtpResult<TcpListener> {
        debug!("Starting local tcp listener...");
        let ip = self
            .get_ref()?
            .local_addr()
            .map_err(FtpError::ConnectionError)?
            .ip();
        let listener =
            TcpListener::bind(SocketAddr::new(ip, 0)).map_err(FtpError::ConnectionError)?;
        listener
            .set_nonblocking(true)
            .map_err(FtpError::ConnectionError)?;
        let addr = listener.local_addr().map_err(FtpError::ConnectionError)?;
        debug!("Active mode, listening on {addr}");

        match addr {
            SocketAddr::V4(v4) => {
                let msb = addr.port() / 256;
                let lsb = addr.port() % 256;
                let ip_port = format!("{},{},{}", v4.ip().to_string().replace('.', ","), msb, lsb);
                debug!("Running PORT command");
                self.perform(Command::Port(ip_port))?;
            }
            SocketAddr::V6(_) => {
                debug!("Running EPRT command");
                self.perform(Command::Eprt(addr))?;
            }
        }
        self.read_response(Status::CommandOk)?;

        Ok(listener)
    }

    /// Wait for the server to connect to the data listener
    fn accept_data_connection(&self, listener: &TcpListener) -> FtpResult<TcpStream> {
        let start = Instant::now();
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("Accepted data connection from {addr}");
                    stream
                        .set_nonblocking(false)
                        .map_err(FtpError::ConnectionError)?;
                    break Ok(stream);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > self.active_timeout {
                        break Err(FtpError::ConnectionError(
                            std::io::ErrorKind::TimedOut.into(),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => break Err(FtpError::ConnectionError(e)),
            }
        }
    }

    /// Runs the EPSV to enter Extended passive mode.
    fn epsv(&mut self) -> FtpResult<SocketAddr> {
        debug!("EPSV command");
        self.perform(Command::Epsv)?;
        // EPSV response format : 229 Entering Extended Passive Mode (|||PORT|)
        let response = self.read_response(Status::ExtendedPassiveMode)?;
        let response_str = response.as_string().map_err(|_| FtpError::BadResponse)?;
        let new_port = EPSV_PORT_RE
            .captures(&response_str)
            .and_then(|caps| caps[1].parse::<u16>().ok())
            .ok_or_else(|| FtpError::UnexpectedResponse(response.clone()))?;
        trace!("Got port number from EPSV: {}", new_port);
        let mut remote = self
            .get_ref()?
            .peer_addr()
            .map_err(FtpError::ConnectionError)?;
        remote.set_port(new_port);
        trace!("Remote address for extended passive mode is {}", remote);
        Ok(remote)
    }

    /// Runs the PASV command  to enter passive mode.
    fn pasv(&mut self) -> FtpResult<SocketAddr> {
        debug!("PASV command");
        self.perform(Command::Pasv)?;
        // PASV response format : 227 Entering Passive Mode (h1,h2,h3,h4,p1,p2).
        let response = self.read_response(Status::PassiveMode)?;
        let addr = Self::parse_passive_address_from_response(response)?;
        trace!("Passive address: {addr}");
        if self.nat_workaround {
            let mut remote = self
                .get_ref()?
                .peer_addr()
                .map_err(FtpError::ConnectionError)?;
            remote.set_port(addr.port());
            trace!("Replacing site local address {} with {}", addr, remote);
            Ok(remote)
        } else {
            Ok(addr)
        }
    }

    /// Parse passive address from response
    pub(crate) fn parse_passive_address_from_response(response: Response) -> FtpResult<SocketAddr> {
        let response_str = response.as_string().map_err(|_| FtpError::BadResponse)?;
        trace!("PASV response: {response_str}");
        let numbers = PASV_PORT_RE
            .captures(&response_str)
            .and_then(|caps| {
                (1..=6)
                    .map(|i| caps[i].parse::<u8>().ok())
                    .collect::<Option<Vec<u8>>>()
            })
            .ok_or_else(|| FtpError::UnexpectedResponse(response.clone()))?;
        let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
        let port = (u16::from(numbers[4]) << 8) | u16::from(numbers[5]);
        Ok(SocketAddr::new(ip.into(), port))
    }
}
