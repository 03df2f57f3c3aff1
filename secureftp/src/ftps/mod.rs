//! # Ftps
//!
//! This module contains the FTPS session: securing the control channel, file operations
//! and securing each data channel with the session negotiated on the control channel.

mod data_channel;
mod data_stream;
mod secure_stream;
mod session_cache;
mod tls;
mod upgrade;

use std::io::{copy, BufRead, BufReader, Cursor, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
// export
pub use data_stream::{close_stream, CloseableStream, DataStream};
pub use secure_stream::SecureStream;
use session_cache::SessionCache;
#[cfg(feature = "native-tls")]
pub use tls::{NativeTlsConnector, NativeTlsStream};
pub use tls::{NoTlsConnector, NoTlsStream, TlsConnector, TlsStream};
#[cfg(feature = "rustls")]
pub use tls::{RustlsConnector, RustlsSession, RustlsStream};
use upgrade::upgrade;

use crate::command::{Command, ProtectionLevel};
use crate::regex::{MDTM_RE, SIZE_RE};
use crate::status::ReplyClass;
use crate::types::{FileType, FtpError, FtpResult, FtpsMode, Mode, Response};
use crate::Status;

/// A function that creates a new stream for the data connection in passive mode.
///
/// It takes a [`SocketAddr`] and returns a [`TcpStream`].
pub type PassiveStreamBuilder = dyn Fn(SocketAddr) -> FtpResult<TcpStream> + Send + Sync;

/// Default time given to the server to close a data connection
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// State of the control channel
enum ControlChannel<T>
where
    T: TlsStream,
{
    Disconnected,
    Connected(BufReader<DataStream<T>>),
    Closed,
}

/// FTPS session over a single control connection.
///
/// In [`FtpsMode::Explicit`] the control channel is secured by [`ImplFtpsStream::login`], after `AUTH`;
/// in [`FtpsMode::Implicit`] it is secured by [`ImplFtpsStream::connect`], before anything is read from it.
/// Every data channel is secured too, resuming the last TLS session negotiated by the session
/// and verifying the server against the host given to `connect`.
pub struct ImplFtpsStream<C>
where
    C: TlsConnector,
{
    ftps_mode: FtpsMode,
    tls_connector: C,
    control: ControlChannel<C::Stream>,
    domain: Option<String>,
    session_cache: SessionCache<C::Session>,
    mode: Mode,
    nat_workaround: bool,
    welcome_msg: Option<String>,
    active_timeout: Duration,
    close_timeout: Duration,
    passive_stream_builder: Box<PassiveStreamBuilder>,
}

impl<C> Default for ImplFtpsStream<C>
where
    C: TlsConnector + Default,
{
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> ImplFtpsStream<C>
where
    C: TlsConnector,
{
    /// Create a new, disconnected, FTPS session in explicit mode
    pub fn new(tls_connector: C) -> Self {
        Self {
            ftps_mode: FtpsMode::default(),
            tls_connector,
            control: ControlChannel::Disconnected,
            domain: None,
            session_cache: SessionCache::default(),
            mode: Mode::Passive,
            nat_workaround: false,
            welcome_msg: None,
            active_timeout: Duration::from_secs(60),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            passive_stream_builder: Self::default_passive_stream_builder(),
        }
    }

    /// Set the FTPS mode
    pub fn with_mode(mut self, ftps_mode: FtpsMode) -> Self {
        self.ftps_mode = ftps_mode;
        self
    }

    /// Enable active mode for data channel
    pub fn active_mode(mut self, accept_timeout: Duration) -> Self {
        self.mode = Mode::Active;
        self.active_timeout = accept_timeout;
        self
    }

    /// Set a custom [`PassiveStreamBuilder`] for passive mode.
    ///
    /// The stream builder is a function that takes a `SocketAddr` and returns a `TcpStream` and it's used
    /// to create the [`TcpStream`] for the data connection in passive mode.
    pub fn passive_stream_builder<F>(mut self, stream_builder: F) -> Self
    where
        F: Fn(SocketAddr) -> FtpResult<TcpStream> + Send + Sync + 'static,
    {
        self.passive_stream_builder = Box::new(stream_builder);
        self
    }

    /// Set how long the server is given to close a data connection once the transfer is over
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the data channel transfer mode
    pub fn set_mode(&mut self, mode: Mode) {
        debug!("Changed mode to {:?}", mode);
        self.mode = mode;
    }

    /// Set NAT workaround for passive mode.
    ///
    /// The address sent by the server in the `PASV` reply is replaced with the address of the control connection.
    pub fn set_passive_nat_workaround(&mut self, nat_workaround: bool) {
        self.nat_workaround = nat_workaround;
    }

    pub fn ftps_mode(&self) -> FtpsMode {
        self.ftps_mode
    }

    /// Change the FTPS mode. Fails with [`FtpError::InvalidState`] while connected
    pub fn set_ftps_mode(&mut self, ftps_mode: FtpsMode) -> FtpResult<()> {
        self.ensure_disconnected("FTPS mode can't be changed while connected")?;
        debug!("Changed FTPS mode to {ftps_mode}");
        self.ftps_mode = ftps_mode;
        Ok(())
    }

    /// Replace the TLS configuration. Fails with [`FtpError::InvalidState`] while connected
    pub fn set_tls_connector(&mut self, tls_connector: C) -> FtpResult<()> {
        self.ensure_disconnected("TLS parameters can't be changed while connected")?;
        self.tls_connector = tls_connector;
        self.session_cache.clear();
        Ok(())
    }

    /// Try to connect to `host`.
    ///
    /// When `port` is not given, the default port of the FTPS mode is used.
    /// `host` is the name every server certificate of this session is verified against.
    pub fn connect(&mut self, host: &str, port: Option<u16>) -> FtpResult<()> {
        self.ensure_disconnected("already connected")?;
        let port = port.unwrap_or_else(|| self.ftps_mode.default_port());
        debug!("Connecting to server {host}:{port}");
        let stream = TcpStream::connect((host, port)).map_err(FtpError::ConnectionError)?;
        self.connect_with_stream(host, stream)
    }

    /// Try to connect to `host`, giving up after `timeout` for each address `host` resolves to
    pub fn connect_timeout(
        &mut self,
        host: &str,
        port: Option<u16>,
        timeout: Duration,
    ) -> FtpResult<()> {
        self.ensure_disconnected("already connected")?;
        let port = port.unwrap_or_else(|| self.ftps_mode.default_port());
        debug!("Connecting to server {host}:{port} (timeout {timeout:?})");
        let mut last_error = None;
        for addr in (host, port)
            .to_socket_addrs()
            .map_err(FtpError::ConnectionError)?
        {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return self.connect_with_stream(host, stream),
                Err(err) => {
                    debug!("Failed to connect to {addr}: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(FtpError::ConnectionError(last_error.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "host resolved to no address")
        })))
    }

    /// Start the session over an already connected stream.
    ///
    /// `host` is the name every server certificate of this session is verified against.
    pub fn connect_with_stream(&mut self, host: &str, stream: TcpStream) -> FtpResult<()> {
        self.ensure_disconnected("already connected")?;
        debug!(
            "Established connection with server ({} FTPS)",
            self.ftps_mode
        );
        self.session_cache.clear();
        self.welcome_msg = None;
        self.domain = Some(host.to_string());
        self.control = ControlChannel::Closed;
        let stream = match self.ftps_mode {
            FtpsMode::Explicit => DataStream::Tcp(stream),
            FtpsMode::Implicit => {
                debug!("Implicit FTPS; securing control channel");
                let stream = upgrade(&self.tls_connector, stream, host, &mut self.session_cache)?;
                DataStream::Ssl(Box::new(stream))
            }
        };
        self.control = ControlChannel::Connected(BufReader::new(stream));
        debug!("Reading server response...");
        match self.read_response(Status::Ready) {
            Ok(response) => {
                let welcome_msg = response.as_string().ok();
                debug!("Server READY; response: {:?}", welcome_msg);
                self.welcome_msg = welcome_msg;
                Ok(())
            }
            Err(err) => {
                self.control = ControlChannel::Closed;
                Err(err)
            }
        }
    }

    /// Log in to the FTP server, securing the control channel with `AUTH TLS` first in explicit mode.
    pub fn login<S: AsRef<str>>(&mut self, user: S, password: S) -> FtpResult<()> {
        self.login_with(user.as_ref(), password.as_ref(), None, "TLS")
    }

    /// Log in to the FTP server.
    ///
    /// In explicit mode `AUTH <auth_method>` is sent and the control channel is secured, unless it already is.
    /// `account` is sent if the server asks for it.
    /// Once logged in, the data channel protection is set with `PBSZ 0` and `PROT P`;
    /// if the server refuses either, [`FtpError::ProtocolNegotiation`] is returned.
    pub fn login_with(
        &mut self,
        user: &str,
        password: &str,
        account: Option<&str>,
        auth_method: &str,
    ) -> FtpResult<()> {
        if !self.is_connected() {
            return Err(FtpError::InvalidState("not connected"));
        }
        if self.ftps_mode == FtpsMode::Explicit {
            self.secure_control_channel(auth_method)?;
        }
        self.authenticate(user, password, account)?;
        self.negotiate_protection()
    }

    /// Returns whether the control channel is open
    pub fn is_connected(&self) -> bool {
        matches!(self.control, ControlChannel::Connected(_))
    }

    /// Returns whether the control channel is protected by TLS
    pub fn is_secure(&self) -> bool {
        match &self.control {
            ControlChannel::Connected(reader) => reader.get_ref().is_secure(),
            _ => false,
        }
    }

    /// DER certificate presented by the server on the control channel
    pub fn peer_certificate(&self) -> Option<Vec<u8>> {
        match &self.control {
            ControlChannel::Connected(reader) => reader.get_ref().peer_certificate(),
            _ => None,
        }
    }

    /// Returns welcome message retrieved from server (if available)
    pub fn get_welcome_msg(&self) -> Option<&str> {
        self.welcome_msg.as_deref()
    }

    /// Returns a reference to the underlying [`TcpStream`] of the control channel.
    pub fn get_ref(&self) -> FtpResult<&TcpStream> {
        match &self.control {
            ControlChannel::Connected(reader) => Ok(reader.get_ref().get_ref()),
            _ => Err(FtpError::InvalidState("not connected")),
        }
    }

    /// Quits the current FTP session and closes the control channel.
    pub fn quit(&mut self) -> FtpResult<()> {
        debug!("Quitting stream");
        self.perform(Command::Quit)?;
        let result = self.read_response(Status::Closing).map(|_| ());
        self.close();
        result
    }

    /// Close the control channel without saying goodbye. The session can be connected again afterwards.
    pub fn close(&mut self) {
        if let ControlChannel::Connected(reader) =
            std::mem::replace(&mut self.control, ControlChannel::Closed)
        {
            debug!("Closing control channel");
            drop(reader);
        }
        self.session_cache.clear();
    }

    /// Change the current directory to the path specified.
    pub fn cwd<S: AsRef<str>>(&mut self, path: S) -> FtpResult<()> {
        debug!("Changing working directory to {}", path.as_ref());
        self.perform(Command::Cwd(path.as_ref().to_string()))?;
        self.read_response(Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Move the current directory to the parent directory.
    pub fn cdup(&mut self) -> FtpResult<()> {
        debug!("Going to parent directory");
        self.perform(Command::Cdup)?;
        self.read_response_in(&[Status::CommandOk, Status::RequestedFileActionOk])
            .map(|_| ())
    }

    /// Gets the current directory
    pub fn pwd(&mut self) -> FtpResult<String> {
        debug!("Getting working directory");
        self.perform(Command::Pwd)?;
        let response = self.read_response(Status::PathCreated)?;
        let body = response.as_string().map_err(|_| FtpError::BadResponse)?;
        match (body.find('"'), body.rfind('"')) {
            (Some(begin), Some(end)) if begin < end => Ok(body[begin + 1..end].to_string()),
            _ => Err(FtpError::UnexpectedResponse(response)),
        }
    }

    /// This does nothing. This is usually just used to keep the connection open.
    pub fn noop(&mut self) -> FtpResult<()> {
        debug!("Pinging server");
        self.perform(Command::Noop)?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// This creates a new directory on the server.
    pub fn mkdir<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<()> {
        debug!("Creating directory at {}", pathname.as_ref());
        self.perform(Command::Mkd(pathname.as_ref().to_string()))?;
        self.read_response(Status::PathCreated).map(|_| ())
    }

    /// Removes the remote pathname from the server.
    pub fn rmdir<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<()> {
        debug!("Removing directory {}", pathname.as_ref());
        self.perform(Command::Rmd(pathname.as_ref().to_string()))?;
        self.read_response(Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Remove the remote file from the server.
    pub fn rm<S: AsRef<str>>(&mut self, filename: S) -> FtpResult<()> {
        debug!("Removing file {}", filename.as_ref());
        self.perform(Command::Dele(filename.as_ref().to_string()))?;
        self.read_response(Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Renames the file from_name to to_name
    pub fn rename<S: AsRef<str>>(&mut self, from_name: S, to_name: S) -> FtpResult<()> {
        debug!(
            "Renaming '{}' to '{}'",
            from_name.as_ref(),
            to_name.as_ref()
        );
        self.perform(Command::RenameFrom(from_name.as_ref().to_string()))?;
        self.read_response(Status::RequestFilePending)?;
        self.perform(Command::RenameTo(to_name.as_ref().to_string()))?;
        self.read_response(Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Sets the type of file to be transferred. That is the implementation
    /// of `TYPE` command.
    pub fn transfer_type(&mut self, file_type: FileType) -> FtpResult<()> {
        debug!("Setting transfer type {}", file_type);
        self.perform(Command::Type(file_type))?;
        self.read_response(Status::CommandOk).map(|_| ())
    }

    /// Retrieves the modification time of the file at `pathname` if it exists.
    pub fn mdtm<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<NaiveDateTime> {
        debug!("Getting modification time for {}", pathname.as_ref());
        self.perform(Command::Mdtm(pathname.as_ref().to_string()))?;
        let response = self.read_response(Status::File)?;
        let body = response.as_string().map_err(|_| FtpError::BadResponse)?;
        let caps = MDTM_RE.captures(&body).ok_or(FtpError::BadResponse)?;
        let field = |i: usize| caps[i].parse::<u32>().map_err(|_| FtpError::BadResponse);
        let year = caps[1].parse::<i32>().map_err(|_| FtpError::BadResponse)?;
        let date =
            NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or(FtpError::BadResponse)?;
        let time = NaiveTime::from_hms_opt(field(4)?, field(5)?, field(6)?)
            .ok_or(FtpError::BadResponse)?;
        Ok(NaiveDateTime::new(date, time))
    }

    /// Retrieves the size of the file in bytes at `pathname` if it exists.
    pub fn size<S: AsRef<str>>(&mut self, pathname: S) -> FtpResult<usize> {
        debug!("Getting file size for {}", pathname.as_ref());
        self.perform(Command::Size(pathname.as_ref().to_string()))?;
        let response = self.read_response(Status::File)?;
        let body = response.as_string().map_err(|_| FtpError::BadResponse)?;
        SIZE_RE
            .captures(&body)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or(FtpError::BadResponse)
    }

    /// The implementation of `RETR` command where `filename` is the name of the file
    /// to download from FTP and `reader` is the function which operates with the
    /// data stream opened.
    ///
    /// The data connection is closed once `reader` returns, whatever it returns.
    pub fn retr<F, D>(&mut self, file_name: &str, mut reader: F) -> FtpResult<D>
    where
        F: FnMut(&mut dyn Read) -> FtpResult<D>,
    {
        let mut stream = self.retr_as_stream(file_name)?;
        let result = reader(&mut stream);
        self.finish_transfer(stream, result)
    }

    /// Simple way to retr a file from the server. This stores the file in a buffer in memory.
    pub fn retr_as_buffer(&mut self, file_name: &str) -> FtpResult<Cursor<Vec<u8>>> {
        self.retr(file_name, |reader| {
            let mut buffer = Vec::new();
            reader
                .read_to_end(&mut buffer)
                .map(|_| buffer)
                .map_err(FtpError::ConnectionError)
        })
        .map(Cursor::new)
    }

    /// Retrieves the file name specified from the server as a readable stream.
    ///
    /// Once the file has been read, the stream must be given back to [`ImplFtpsStream::close_data_connection`].
    pub fn retr_as_stream<S: AsRef<str>>(
        &mut self,
        file_name: S,
    ) -> FtpResult<DataStream<C::Stream>> {
        debug!("Retrieving '{}'", file_name.as_ref());
        self.data_command(Command::Retr(file_name.as_ref().to_string()), None)
            .map(|(_, stream)| stream)
    }

    /// Same as [`ImplFtpsStream::retr_as_stream`], but the server skips the first `offset` bytes of the file
    pub fn resume_retr_as_stream<S: AsRef<str>>(
        &mut self,
        file_name: S,
        offset: usize,
    ) -> FtpResult<DataStream<C::Stream>> {
        debug!("Retrieving '{}' from offset {offset}", file_name.as_ref());
        self.data_command(Command::Retr(file_name.as_ref().to_string()), Some(offset))
            .map(|(_, stream)| stream)
    }

    /// This stores a file on the server.
    /// r argument must be any struct which implemenents the [`Read`] trait.
    /// Returns amount of written bytes
    pub fn put_file<S: AsRef<str>, R: Read>(&mut self, filename: S, r: &mut R) -> FtpResult<u64> {
        let mut data_stream = self.put_with_stream(filename.as_ref())?;
        let result = copy(r, &mut data_stream).map_err(FtpError::ConnectionError);
        self.finish_transfer(data_stream, result)
    }

    /// Send `STOR` and return the stream to write the file content to.
    ///
    /// Once the file has been written, the stream must be given back to [`ImplFtpsStream::close_data_connection`].
    pub fn put_with_stream<S: AsRef<str>>(
        &mut self,
        filename: S,
    ) -> FtpResult<DataStream<C::Stream>> {
        debug!("Put file {}", filename.as_ref());
        self.data_command(Command::Store(filename.as_ref().to_string()), None)
            .map(|(_, stream)| stream)
    }

    /// Same as [`ImplFtpsStream::put_with_stream`], but the server writes from `offset` on
    pub fn resume_put_with_stream<S: AsRef<str>>(
        &mut self,
        filename: S,
        offset: usize,
    ) -> FtpResult<DataStream<C::Stream>> {
        debug!("Put file {} from offset {offset}", filename.as_ref());
        self.data_command(Command::Store(filename.as_ref().to_string()), Some(offset))
            .map(|(_, stream)| stream)
    }

    /// Open specified file for appending data. Returns the stream to append data to specified file.
    ///
    /// Once the data has been written, the stream must be given back to [`ImplFtpsStream::close_data_connection`].
    pub fn append_with_stream<S: AsRef<str>>(
        &mut self,
        filename: S,
    ) -> FtpResult<DataStream<C::Stream>> {
        debug!("Appending to file {}", filename.as_ref());
        self.data_command(Command::Appe(filename.as_ref().to_string()), None)
            .map(|(_, stream)| stream)
    }

    /// Append data from reader to file at `filename`
    pub fn append_file<R: Read>(&mut self, filename: &str, r: &mut R) -> FtpResult<u64> {
        let mut data_stream = self.append_with_stream(filename)?;
        let result = copy(r, &mut data_stream).map_err(FtpError::ConnectionError);
        self.finish_transfer(data_stream, result)
    }

    /// Execute `LIST` command which returns the detailed file listing in human readable format.
    /// If `pathname` is omited then the list of files in the current directory will be
    /// returned otherwise it will the list of files on `pathname`.
    pub fn list(&mut self, pathname: Option<&str>) -> FtpResult<Vec<String>> {
        debug!(
            "Reading {} directory content",
            pathname.unwrap_or("working")
        );
        self.stream_lines(Command::List(pathname.map(|x| x.to_string())))
    }

    /// Execute `NLST` command which returns the list of file names only.
    /// If `pathname` is omited then the list of files in the current directory will be
    /// returned otherwise it will the list of files on `pathname`.
    pub fn nlst(&mut self, pathname: Option<&str>) -> FtpResult<Vec<String>> {
        debug!(
            "Getting file names for {} directory",
            pathname.unwrap_or("working")
        );
        self.stream_lines(Command::Nlst(pathname.map(|x| x.to_string())))
    }

    /// Perform custom command
    pub fn custom_command(
        &mut self,
        command: impl ToString,
        expected_code: &[Status],
    ) -> FtpResult<Response> {
        let command = command.to_string();
        debug!("Sending custom command: {}", command);
        self.perform(Command::Custom(command))?;
        self.read_response_in(expected_code)
    }

    /// Perform a custom command using the data connection.
    /// It returns both the [`Response`] and the secured [`DataStream`].
    ///
    /// The stream must eventually be closed using [`Self::close_data_connection`].
    pub fn custom_data_command(
        &mut self,
        command: impl ToString,
        expected_code: &[Status],
    ) -> FtpResult<(Response, DataStream<C::Stream>)> {
        let command = command.to_string();
        debug!("Sending custom data command: {}", command);
        let (response, data_stream) = self.data_command(Command::Custom(command), None)?;
        if !expected_code.contains(&response.status) {
            self.finish_transfer(data_stream, Ok(()))?;
            return Err(FtpError::UnexpectedResponse(response));
        }
        Ok((response, data_stream))
    }

    /// Close a data connection and read the reply of the server to the transfer.
    ///
    /// The stream is shut down, then the bytes the server may still send are discarded until it closes the connection
    /// or the close timeout elapses.
    pub fn close_data_connection(&mut self, mut stream: DataStream<C::Stream>) -> FtpResult<()> {
        debug!("Closing data connection");
        if let Err(err) = close_stream(&mut stream, self.close_timeout) {
            error!("Failed to close data connection: {err}");
        }
        // NOTE: must be dropped before reading the reply, otherwise the server won't send it
        drop(stream);
        trace!("dropped stream");
        self.read_response_in(&[Status::ClosingDataConnection, Status::RequestedFileActionOk])
            .map(|_| ())
    }

    /// Read a [`DataStream`] line by line.
    pub fn get_lines_from_stream(
        data_stream: &mut BufReader<DataStream<C::Stream>>,
    ) -> FtpResult<Vec<String>> {
        let mut lines: Vec<String> = Vec::new();

        loop {
            let mut line_buf = vec![];
            match data_stream.read_until(b'\n', &mut line_buf) {
                Ok(0) => break,
                Ok(len) => {
                    let mut line = String::from_utf8_lossy(&line_buf[..len]).to_string();
                    trace!("STREAM IN: {:?}", line);
                    if line.ends_with('\n') {
                        line.pop();
                    }
                    if line.ends_with('\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }
                    lines.push(line);
                }
                Err(err) => {
                    error!("failed to get lines from stream: {err}");
                    return Err(FtpError::BadResponse);
                }
            }
        }
        trace!("Lines from stream {:?}", lines);

        Ok(lines)
    }

    // -- negotiation

    /// Send `AUTH` and swap the control socket with its TLS upgrade
    fn secure_control_channel(&mut self, auth_method: &str) -> FtpResult<()> {
        if self.is_secure() {
            debug!("Control channel is already secure; AUTH skipped");
            return Ok(());
        }
        if !self.tls_connector.is_available() {
            return Err(FtpError::TlsUnavailable);
        }
        debug!("Initializing TLS auth");
        self.perform(Command::Auth(auth_method.to_string()))?;
        let response = self.read_reply()?;
        if response.class() != ReplyClass::PositiveCompletion {
            return Err(FtpError::UnexpectedResponse(response));
        }
        debug!("TLS OK; initializing ssl stream");
        // the channel stays closed if the upgrade fails
        let stream = match std::mem::replace(&mut self.control, ControlChannel::Closed) {
            ControlChannel::Connected(reader) => match reader.into_inner() {
                DataStream::Tcp(stream) => stream,
                DataStream::Ssl(_) => {
                    return Err(FtpError::InvalidState("control channel is already secure"))
                }
            },
            _ => return Err(FtpError::InvalidState("not connected")),
        };
        let domain = self
            .domain
            .as_deref()
            .ok_or(FtpError::InvalidState("no target host"))?;
        let stream = upgrade(&self.tls_connector, stream, domain, &mut self.session_cache)?;
        self.control = ControlChannel::Connected(BufReader::new(DataStream::Ssl(Box::new(stream))));
        debug!("Control channel secured");
        Ok(())
    }

    /// `USER`, `PASS` and `ACCT` exchange
    fn authenticate(&mut self, user: &str, password: &str, account: Option<&str>) -> FtpResult<()> {
        debug!("Signin in with user '{}'", user);
        self.perform(Command::User(user.to_string()))?;
        let mut response = self.read_response_in(&[
            Status::LoggedIn,
            Status::NeedPassword,
            Status::LoginNeedAccount,
        ])?;
        if response.status == Status::NeedPassword {
            debug!("Password is required");
            self.perform(Command::Pass(password.to_string()))?;
            response = self.read_response_in(&[
                Status::LoggedIn,
                Status::CommandNotImplemented,
                Status::LoginNeedAccount,
            ])?;
        }
        if response.status == Status::LoginNeedAccount {
            let account = account.ok_or_else(|| FtpError::UnexpectedResponse(response.clone()))?;
            debug!("Account is required");
            self.perform(Command::Acct(account.to_string()))?;
            self.read_response_in(&[Status::LoggedIn, Status::CommandNotImplemented])?;
        }
        debug!("Login OK");
        Ok(())
    }

    /// `PBSZ 0` then `PROT P`
    fn negotiate_protection(&mut self) -> FtpResult<()> {
        debug!("Setting protection buffer size");
        self.protection_command(Command::Pbsz(0))?;
        debug!("Setting data channel protection level to private");
        self.protection_command(Command::Prot(ProtectionLevel::Private))
    }

    fn protection_command(&mut self, command: Command) -> FtpResult<()> {
        self.perform(command)?;
        let response = self.read_reply()?;
        match response.class() {
            ReplyClass::PositiveCompletion => Ok(()),
            _ => Err(FtpError::ProtocolNegotiation(response)),
        }
    }

    // -- control channel

    fn ensure_disconnected(&self, reason: &'static str) -> FtpResult<()> {
        if self.is_connected() {
            return Err(FtpError::InvalidState(reason));
        }
        Ok(())
    }

    fn reader(&mut self) -> FtpResult<&mut BufReader<DataStream<C::Stream>>> {
        match &mut self.control {
            ControlChannel::Connected(reader) => Ok(reader),
            _ => Err(FtpError::InvalidState("not connected")),
        }
    }

    /// The control connection can't be used anymore
    fn connection_lost(&mut self, err: std::io::Error) -> FtpError {
        error!("Control connection lost: {err}");
        self.control = ControlChannel::Closed;
        FtpError::ConnectionError(err)
    }

    /// Read response from stream
    fn read_response(&mut self, expected_code: Status) -> FtpResult<Response> {
        self.read_response_in(&[expected_code])
    }

    /// Read a reply and check its status
    fn read_response_in(&mut self, expected_code: &[Status]) -> FtpResult<Response> {
        let response = self.read_reply()?;
        if expected_code.contains(&response.status) {
            Ok(response)
        } else {
            Err(FtpError::UnexpectedResponse(response))
        }
    }

    /// Read a whole reply, multi-line replies included
    fn read_reply(&mut self) -> FtpResult<Response> {
        let mut line = Vec::new();
        self.read_line(&mut line)?;
        trace!("CC IN: {:?}", String::from_utf8_lossy(&line));

        let code_word = Self::code_from_buffer(&line)?;
        let code = Status::from(code_word);
        trace!("Code parsed from response: {} ({})", code, code_word);

        let mut body = line.clone();
        // multiple line reply: `xyz-` opens it, `xyz ` closes it
        if line.get(3) == Some(&b'-') {
            let terminator = [line[0], line[1], line[2], b' '];
            loop {
                line.clear();
                self.read_line(&mut line)?;
                trace!("CC IN: {:?}", String::from_utf8_lossy(&line));
                body.extend_from_slice(&line);
                if line.len() >= 4 && line[0..4] == terminator {
                    break;
                }
            }
        }

        Ok(Response::new(code, body))
    }

    /// Read bytes from reader until 0x0A or EOF is found
    fn read_line(&mut self, line: &mut Vec<u8>) -> FtpResult<usize> {
        let result = self.reader()?.read_until(0x0A, line);
        match result {
            Ok(0) => Err(self.connection_lost(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "control connection closed by server",
            ))),
            Ok(len) => Ok(len),
            Err(err) => Err(self.connection_lost(err)),
        }
    }

    /// Get the three digit code at the beginning of a reply line
    fn code_from_buffer(buf: &[u8]) -> FtpResult<u32> {
        match buf.get(0..3) {
            Some(digits) if digits.iter().all(u8::is_ascii_digit) => Ok(digits
                .iter()
                .fold(0, |code, digit| code * 10 + u32::from(digit - b'0'))),
            _ => Err(FtpError::BadResponse),
        }
    }

    /// Write data to stream with command to perform
    fn perform(&mut self, command: Command) -> FtpResult<()> {
        trace!("CC OUT: {}", command.log_line());
        let line = command.to_string();
        let stream = self.reader()?.get_mut();
        let result = stream
            .write_all(line.as_bytes())
            .and_then(|_| stream.flush());
        result.map_err(|err| self.connection_lost(err))
    }

    // -- transfers

    /// Close the data connection of a transfer, reporting the error of the transfer first
    fn finish_transfer<D>(
        &mut self,
        stream: DataStream<C::Stream>,
        result: FtpResult<D>,
    ) -> FtpResult<D> {
        let closed = self.close_data_connection(stream);
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                error!("Failed to close data connection after error: {close_err}");
                Err(err)
            }
        }
    }

    /// Execute a command which returns list of strings in a separate stream
    fn stream_lines(&mut self, cmd: Command) -> FtpResult<Vec<String>> {
        let (_, data_stream) = self.data_command(cmd, None)?;
        let mut reader = BufReader::new(data_stream);
        let lines = Self::get_lines_from_stream(&mut reader);
        self.finish_transfer(reader.into_inner(), lines)
    }

    /// Default stream builder
    fn default_passive_stream_builder() -> Box<PassiveStreamBuilder> {
        Box::new(|addr| TcpStream::connect(addr).map_err(FtpError::ConnectionError))
    }
}
