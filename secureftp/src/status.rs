//! # Status
//!
//! This module exposes the reply codes defined by the File Transfer Protocol and its security extensions (RFC 2228, RFC 4217)

use thiserror::Error;

#[derive(Debug, Copy, Clone, Error, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
/// Ftp status returned after command execution
pub enum Status {
    // 1xx: Positive Preliminary Reply
    #[error("restart marker reply")]
    RestartMarker = 110,
    #[error("service ready in (n) minutes")]
    ReadyMinute = 120,
    #[error("data connection already open, transfer starting")]
    AlreadyOpen = 125,
    #[error("file status okay, about to open data connection")]
    AboutToSend = 150,
    // 2xx: Positive Completion Reply
    #[error("command okay")]
    CommandOk = 200,
    #[error("command not implemented")]
    CommandNotImplemented = 202,
    #[error("system status, or system help reply")]
    System = 211,
    #[error("directory status")]
    Directory = 212,
    #[error("file status")]
    File = 213,
    #[error("help message")]
    Help = 214,
    #[error("NAME system type")]
    Name = 215,
    #[error("service ready for new user")]
    Ready = 220,
    #[error("service closing control connection")]
    Closing = 221,
    #[error("data connection open; no transfer in progress")]
    DataConnectionOpen = 225,
    #[error("closing data connection")]
    ClosingDataConnection = 226,
    #[error("entering passive mode")]
    PassiveMode = 227,
    #[error("entering long passive mode")]
    LongPassiveMode = 228,
    #[error("entering extended passive mode")]
    ExtendedPassiveMode = 229,
    #[error("user logged in, proceed. Logged out if appropriate.")]
    LoggedIn = 230,
    #[error("user logged out; service terminated")]
    LoggedOut = 231,
    #[error("logout command noted, will complete when transfer done")]
    LogoutAck = 232,
    #[error(
        "specifies that the server accepts the authentication mechanism specified by the client"
    )]
    AuthOk = 234,
    #[error("requested file action okay")]
    RequestedFileActionOk = 250,
    #[error("pathname created")]
    PathCreated = 257,
    // 3xx: Positive intermediate Reply
    #[error("user name okay, need password")]
    NeedPassword = 331,
    #[error("need account for login")]
    LoginNeedAccount = 332,
    #[error("security mechanism accepted, security data required")]
    SecurityDataRequired = 334,
    #[error("requested file action pending further information")]
    RequestFilePending = 350,
    // 4xx: Transient Negative Completion Reply
    #[error("service not available, closing control connection")]
    NotAvailable = 421,
    #[error("can't open data connection")]
    CannotOpenDataConnection = 425,
    #[error("connection closed; transfer aborted")]
    TransferAborted = 426,
    #[error("invalid username or password")]
    InvalidCredentials = 430,
    #[error("need some unavailable resource to process security")]
    SecurityResourceUnavailable = 431,
    #[error("requested host unavailable")]
    HostUnavailable = 434,
    #[error("requested file action not taken")]
    RequestFileActionIgnored = 450,
    #[error("requested action aborted")]
    ActionAborted = 451,
    #[error("requested action not taken")]
    RequestedActionNotTaken = 452,
    // 5xx: Permanent Negative Completion Reply
    #[error("syntax error, command unrecognized")]
    BadCommand = 500,
    #[error("syntax error in parameters or arguments")]
    BadArguments = 501,
    #[error("command not implemented")]
    NotImplemented = 502,
    #[error("bad sequence of commands")]
    BadSequence = 503,
    #[error("command not implemented for that parameter")]
    NotImplementedParameter = 504,
    #[error("network protocol not supported")]
    NetworkProtocolNotSupported = 522,
    #[error("user not logged in")]
    NotLoggedIn = 530,
    #[error("need account for storing files")]
    StoringNeedAccount = 532,
    #[error("command protection level denied for policy reasons")]
    ProtectionLevelDenied = 533,
    #[error("request denied for policy reasons")]
    PolicyDenied = 534,
    #[error("requested action not taken; file unavailable")]
    FileUnavailable = 550,
    #[error("requested action aborted; page type unknown")]
    PageTypeUnknown = 551,
    #[error("requested file action aborted; exceeded storage allocation")]
    ExceededStorage = 552,
    #[error("requested action not taken; file name not allowed")]
    BadFilename = 553,
    #[error("unknown error code")]
    Unknown = 0,
}

/// Class of a reply, given by the first digit of its code
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReplyClass {
    /// 1yz: the action is being started, expect another reply
    PositivePreliminary,
    /// 2yz: the action has been completed
    PositiveCompletion,
    /// 3yz: the command has been accepted, send the next one
    PositiveIntermediate,
    /// 4yz: the action was not taken, but may be retried
    TransientNegative,
    /// 5yz: the action was not taken
    PermanentNegative,
    /// Anything outside the ranges above
    Unknown,
}

impl Status {
    /// Get status code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get status description
    pub fn desc(&self) -> String {
        self.to_string()
    }

    /// Get the class of the status
    pub fn class(&self) -> ReplyClass {
        ReplyClass::from_code(self.code())
    }
}

impl ReplyClass {
    /// Classify a three digit reply code
    pub fn from_code(code: u32) -> Self {
        match code / 100 {
            1 => Self::PositivePreliminary,
            2 => Self::PositiveCompletion,
            3 => Self::PositiveIntermediate,
            4 => Self::TransientNegative,
            5 => Self::PermanentNegative,
            _ => Self::Unknown,
        }
    }

    /// Returns whether the reply class is 1yz, 2yz or 3yz
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::PositivePreliminary | Self::PositiveCompletion | Self::PositiveIntermediate
        )
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        match code {
            110 => Self::RestartMarker,
            120 => Self::ReadyMinute,
            125 => Self::AlreadyOpen,
            150 => Self::AboutToSend,
            200 => Self::CommandOk,
            202 => Self::CommandNotImplemented,
            211 => Self::System,
            212 => Self::Directory,
            213 => Self::File,
            214 => Self::Help,
            215 => Self::Name,
            220 => Self::Ready,
            221 => Self::Closing,
            225 => Self::DataConnectionOpen,
            226 => Self::ClosingDataConnection,
            227 => Self::PassiveMode,
            228 => Self::LongPassiveMode,
            229 => Self::ExtendedPassiveMode,
            230 => Self::LoggedIn,
            231 => Self::LoggedOut,
            232 => Self::LogoutAck,
            234 => Self::AuthOk,
            250 => Self::RequestedFileActionOk,
            257 => Self::PathCreated,
            331 => Self::NeedPassword,
            332 => Self::LoginNeedAccount,
            334 => Self::SecurityDataRequired,
            350 => Self::RequestFilePending,
            421 => Self::NotAvailable,
            425 => Self::CannotOpenDataConnection,
            426 => Self::TransferAborted,
            430 => Self::InvalidCredentials,
            431 => Self::SecurityResourceUnavailable,
            434 => Self::HostUnavailable,
            450 => Self::RequestFileActionIgnored,
            451 => Self::ActionAborted,
            452 => Self::RequestedActionNotTaken,
            500 => Self::BadCommand,
            501 => Self::BadArguments,
            502 => Self::NotImplemented,
            503 => Self::BadSequence,
            504 => Self::NotImplementedParameter,
            522 => Self::NetworkProtocolNotSupported,
            530 => Self::NotLoggedIn,
            532 => Self::StoringNeedAccount,
            533 => Self::ProtectionLevelDenied,
            534 => Self::PolicyDenied,
            550 => Self::FileUnavailable,
            551 => Self::PageTypeUnknown,
            552 => Self::ExceededStorage,
            553 => Self::BadFilename,
            _ => Self::Unknown,
        }
    }
}
