//! # Command
//!
//! The set of FTP commands

use std::fmt;
use std::net::SocketAddr;

use crate::types::FileType;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ftp commands with their arguments
pub enum Command {
    /// Provide account information
    Acct(String),
    /// Append to file
    Appe(String),
    /// Ask the server to start the security mechanism (e.g. `TLS`)
    Auth(String),
    /// Change directory to parent directory
    Cdup,
    /// Change working directory
    Cwd(String),
    /// Remove file at specified path
    Dele(String),
    /// Specifies an extended address and port to which the server should connect (active mode)
    Eprt(SocketAddr),
    /// Extended passive mode <https://www.rfc-editor.org/rfc/rfc2428#section-3>
    Epsv,
    /// List entries at specified path. If path is not provided list entries at current working directory
    List(Option<String>),
    /// Get modification time for file at specified path
    Mdtm(String),
    /// Make directory
    Mkd(String),
    /// Get the list of file names at specified path. If path is not provided list entries at current working directory
    Nlst(Option<String>),
    /// Ping server
    Noop,
    /// Provide login password
    Pass(String),
    /// Passive mode
    Pasv,
    /// Protection buffer size
    Pbsz(usize),
    /// Specifies an address and port to which the server should connect (active mode)
    Port(String),
    /// Set protection level for data channel
    Prot(ProtectionLevel),
    /// Print working directory
    Pwd,
    /// Quit
    Quit,
    /// Select file to rename
    RenameFrom(String),
    /// Rename selected file to
    RenameTo(String),
    /// Resume transfer from offset
    Rest(usize),
    /// Retrieve file
    Retr(String),
    /// Remove directory
    Rmd(String),
    /// Get file size of specified path
    Size(String),
    /// Put file at specified path
    Store(String),
    /// Set transfer type
    Type(FileType),
    /// Provide user to login as
    User(String),
    /// Any other command, sent as is
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(unused)]
/// Protection level; argument for `Prot` command
pub enum ProtectionLevel {
    Clear,
    Private,
}

// -- stringify

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acct(a) => write!(f, "ACCT {a}"),
            Self::Appe(p) => write!(f, "APPE {p}"),
            Self::Auth(method) => write!(f, "AUTH {method}"),
            Self::Cdup => write!(f, "CDUP"),
            Self::Cwd(d) => write!(f, "CWD {d}"),
            Self::Dele(p) => write!(f, "DELE {p}"),
            Self::Eprt(addr) => {
                let proto = if addr.is_ipv4() { 1 } else { 2 };
                write!(f, "EPRT |{proto}|{}|{}|", addr.ip(), addr.port())
            }
            Self::Epsv => write!(f, "EPSV"),
            Self::List(Some(p)) => write!(f, "LIST {p}"),
            Self::List(None) => write!(f, "LIST"),
            Self::Mdtm(p) => write!(f, "MDTM {p}"),
            Self::Mkd(p) => write!(f, "MKD {p}"),
            Self::Nlst(Some(p)) => write!(f, "NLST {p}"),
            Self::Nlst(None) => write!(f, "NLST"),
            Self::Noop => write!(f, "NOOP"),
            Self::Pass(p) => write!(f, "PASS {p}"),
            Self::Pasv => write!(f, "PASV"),
            Self::Pbsz(sz) => write!(f, "PBSZ {sz}"),
            Self::Port(p) => write!(f, "PORT {p}"),
            Self::Prot(level) => write!(f, "PROT {level}"),
            Self::Pwd => write!(f, "PWD"),
            Self::Quit => write!(f, "QUIT"),
            Self::RenameFrom(p) => write!(f, "RNFR {p}"),
            Self::RenameTo(p) => write!(f, "RNTO {p}"),
            Self::Rest(offset) => write!(f, "REST {offset}"),
            Self::Retr(p) => write!(f, "RETR {p}"),
            Self::Rmd(p) => write!(f, "RMD {p}"),
            Self::Size(p) => write!(f, "SIZE {p}"),
            Self::Store(p) => write!(f, "STOR {p}"),
            Self::Type(t) => write!(f, "TYPE {t}"),
            Self::User(u) => write!(f, "USER {u}"),
            Self::Custom(c) => write!(f, "{c}"),
        }?;
        write!(f, "\r\n")
    }
}

impl Command {
    /// Text to log for this command. Passwords are masked
    pub fn log_line(&self) -> String {
        match self {
            Self::Pass(_) => String::from("PASS ******"),
            cmd => cmd.to_string().trim_end_matches("\r\n").to_string(),
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clear => write!(f, "C"),
            Self::Private => write!(f, "P"),
        }
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn should_stringify_command() {
        assert_eq!(
            Command::Acct(String::from("billing")).to_string().as_str(),
            "ACCT billing\r\n"
        );
        assert_eq!(
            Command::Appe(String::from("foobar.txt"))
                .to_string()
                .as_str(),
            "APPE foobar.txt\r\n"
        );
        assert_eq!(
            Command::Auth(String::from("TLS")).to_string().as_str(),
            "AUTH TLS\r\n"
        );
        assert_eq!(Command::Cdup.to_string().as_str(), "CDUP\r\n");
        assert_eq!(
            Command::Cwd(String::from("/tmp")).to_string().as_str(),
            "CWD /tmp\r\n"
        );
        assert_eq!(
            Command::Dele(String::from("a.txt")).to_string().as_str(),
            "DELE a.txt\r\n"
        );
        assert_eq!(
            Command::Eprt("127.0.0.1:6275".parse().unwrap())
                .to_string()
                .as_str(),
            "EPRT |1|127.0.0.1|6275|\r\n"
        );
        assert_eq!(
            Command::Eprt("[::1]:5282".parse().unwrap())
                .to_string()
                .as_str(),
            "EPRT |2|::1|5282|\r\n"
        );
        assert_eq!(Command::Epsv.to_string().as_str(), "EPSV\r\n");
        assert_eq!(
            Command::List(Some(String::from("/tmp")))
                .to_string()
                .as_str(),
            "LIST /tmp\r\n"
        );
        assert_eq!(Command::List(None).to_string().as_str(), "LIST\r\n");
        assert_eq!(
            Command::Mdtm(String::from("a.txt")).to_string().as_str(),
            "MDTM a.txt\r\n"
        );
        assert_eq!(
            Command::Mkd(String::from("/tmp")).to_string().as_str(),
            "MKD /tmp\r\n"
        );
        assert_eq!(Command::Nlst(None).to_string().as_str(), "NLST\r\n");
        assert_eq!(Command::Noop.to_string().as_str(), "NOOP\r\n");
        assert_eq!(
            Command::Pass(String::from("qwerty123"))
                .to_string()
                .as_str(),
            "PASS qwerty123\r\n"
        );
        assert_eq!(Command::Pasv.to_string().as_str(), "PASV\r\n");
        assert_eq!(Command::Pbsz(0).to_string().as_str(), "PBSZ 0\r\n");
        assert_eq!(
            Command::Port(String::from("127,0,0,1,4,1"))
                .to_string()
                .as_str(),
            "PORT 127,0,0,1,4,1\r\n"
        );
        assert_eq!(
            Command::Prot(ProtectionLevel::Private).to_string().as_str(),
            "PROT P\r\n"
        );
        assert_eq!(Command::Pwd.to_string().as_str(), "PWD\r\n");
        assert_eq!(Command::Quit.to_string().as_str(), "QUIT\r\n");
        assert_eq!(
            Command::RenameFrom(String::from("a.txt"))
                .to_string()
                .as_str(),
            "RNFR a.txt\r\n"
        );
        assert_eq!(
            Command::RenameTo(String::from("b.txt"))
                .to_string()
                .as_str(),
            "RNTO b.txt\r\n"
        );
        assert_eq!(Command::Rest(123).to_string().as_str(), "REST 123\r\n");
        assert_eq!(
            Command::Retr(String::from("a.txt")).to_string().as_str(),
            "RETR a.txt\r\n"
        );
        assert_eq!(
            Command::Rmd(String::from("/tmp")).to_string().as_str(),
            "RMD /tmp\r\n"
        );
        assert_eq!(
            Command::Size(String::from("a.txt")).to_string().as_str(),
            "SIZE a.txt\r\n"
        );
        assert_eq!(
            Command::Store(String::from("a.txt")).to_string().as_str(),
            "STOR a.txt\r\n"
        );
        assert_eq!(
            Command::Type(FileType::Binary).to_string().as_str(),
            "TYPE I\r\n"
        );
        assert_eq!(
            Command::User(String::from("omar")).to_string().as_str(),
            "USER omar\r\n"
        );
        assert_eq!(
            Command::Custom(String::from("SITE CHMOD 644 a.txt"))
                .to_string()
                .as_str(),
            "SITE CHMOD 644 a.txt\r\n"
        );
    }

    #[test]
    fn should_stringify_protection_level() {
        assert_eq!(ProtectionLevel::Clear.to_string().as_str(), "C");
        assert_eq!(ProtectionLevel::Private.to_string().as_str(), "P");
    }

    #[test]
    fn should_mask_password_in_log_line() {
        assert_eq!(
            Command::Pass(String::from("secret")).log_line().as_str(),
            "PASS ******"
        );
        assert_eq!(Command::Pbsz(0).log_line().as_str(), "PBSZ 0");
    }
}
