//! # Types
//!
//! The set of valid values for FTP commands

use std::fmt;
use std::str::FromStr;
use std::string::FromUtf8Error;

use thiserror::Error;

use super::status::ReplyClass;
use super::Status;

/// A shorthand for a Result whose error type is always an FtpError.
pub type FtpResult<T> = std::result::Result<T, FtpError>;

/// `FtpError` is a library-global error type to describe the different kinds of
/// errors that might occur while using FTPS.
///
/// None of these errors are retried by the library.
#[derive(Debug, Error)]
pub enum FtpError {
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(std::io::Error),
    /// An argument has a value which is not supported (e.g. an unknown FTPS mode)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not allowed in the current state of the session
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    /// No TLS engine has been compiled in or configured
    #[error("TLS support is not available")]
    TlsUnavailable,
    /// The TLS handshake failed at transport or crypto level
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),
    /// The server certificate couldn't be verified against the target hostname
    #[error("TLS verification error: {0}")]
    TlsVerification(String),
    /// Unexpected response from remote. The command expected a certain response, but got another one.
    /// This means the ftp server refused to perform your request or there was an error while processing it.
    /// Contains the response data.
    #[error("Invalid response: {0}")]
    UnexpectedResponse(Response),
    /// The server refused the data channel protection (`PBSZ` or `PROT`)
    #[error("Protection negotiation failed: {0}")]
    ProtocolNegotiation(Response),
    /// The response syntax is invalid
    #[error("Response contains an invalid syntax")]
    BadResponse,
    /// The address provided was invalid
    #[error("Invalid address: {0}")]
    InvalidAddress(std::net::AddrParseError),
}

/// Defines a response from the ftp server
#[derive(Clone, Debug, Error)]
pub struct Response {
    pub status: Status,
    pub body: Vec<u8>,
}

/// Text Format Control used in `TYPE` command
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatControl {
    /// Default text format control (is NonPrint)
    Default,
    /// Non-print (not destined for printing)
    NonPrint,
    /// Telnet format control (\<CR\>, \<FF\>, etc.)
    Telnet,
    /// ASA (Fortran) Carriage Control
    Asa,
}

/// File Type used in `TYPE` command
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileType {
    /// ASCII text (the argument is the text format control)
    Ascii(FormatControl),
    /// EBCDIC text (the argument is the text format control)
    Ebcdic(FormatControl),
    /// Image,
    Image,
    /// Binary (the synonym to Image)
    Binary,
    /// Local format (the argument is the number of bits in one byte on local machine)
    Local(u8),
}

/// Connection mode for data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Active,
    /// Required by some servers (ipv6); defined in rfc 2428 <https://www.rfc-editor.org/rfc/rfc2428#section-3>
    ExtendedPassive,
    Passive,
}

/// How TLS is established on the control connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FtpsMode {
    /// Start in plaintext on the standard port and upgrade after `AUTH`
    #[default]
    Explicit,
    /// TLS from the first byte, on a dedicated port
    Implicit,
}

impl FtpsMode {
    /// Port used by `connect` when none is given
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Explicit => 21,
            Self::Implicit => 990,
        }
    }
}

impl FromStr for FtpsMode {
    type Err = FtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Self::Explicit),
            "implicit" => Ok(Self::Implicit),
            _ => Err(FtpError::InvalidArgument(format!(
                "unsupported FTPS mode '{s}'"
            ))),
        }
    }
}

impl fmt::Display for FtpsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Implicit => write!(f, "implicit"),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.status.code(),
            self.as_string().ok().unwrap_or_default()
        )
    }
}

impl Response {
    /// Instantiates a new `Response`
    pub fn new(status: Status, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Get response as string
    pub fn as_string(&self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.body.clone()).map(|x| x.trim_end().to_string())
    }

    /// Get the reply class.
    ///
    /// The first digit of the raw reply is used, so codes without a [`Status`] variant are classified too
    pub fn class(&self) -> ReplyClass {
        match self.body.first() {
            Some(digit) if digit.is_ascii_digit() && self.body.len() >= 3 => {
                ReplyClass::from_code(u32::from(digit - b'0') * 100)
            }
            _ => self.status.class(),
        }
    }
}

impl fmt::Display for FormatControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FormatControl::Default | FormatControl::NonPrint => String::from("N"),
                FormatControl::Telnet => String::from("T"),
                FormatControl::Asa => String::from("C"),
            }
        )
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FileType::Ascii(fc) => format!("A {}", fc),
                FileType::Ebcdic(fc) => format!("E {}", fc),
                FileType::Image | FileType::Binary => String::from("I"),
                FileType::Local(bits) => format!("L {bits}"),
            }
        )
    }
}
