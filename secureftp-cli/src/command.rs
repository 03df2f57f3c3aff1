use std::path::PathBuf;
use std::str::FromStr;

use secureftp::{FtpsMode, Mode};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Appe(PathBuf, String),
    Cdup,
    Cert,
    Connect(String, Option<u16>),
    Cwd(String),
    DataMode(Mode),
    Help,
    List(Option<String>),
    Login,
    Mdtm(String),
    Mkdir(String),
    Mode(FtpsMode),
    Noop,
    Put(PathBuf, String),
    Pwd,
    Quit,
    Rename(String, String),
    Resume(String, PathBuf),
    Retr(String, PathBuf),
    Rm(String),
    Rmdir(String),
    Size(String),
}

impl FromStr for Command {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split string by space
        let mut args = s.split_ascii_whitespace();
        // Match args
        match args.next() {
            Some(cmd) => match cmd.to_ascii_uppercase().as_str() {
                "APPE" => {
                    let local: PathBuf = match args.next() {
                        Some(l) => PathBuf::from(l),
                        None => return Err("Missing `source` field"),
                    };
                    match args.next() {
                        Some(d) => Ok(Self::Appe(local, d.to_string())),
                        None => Err("Missing `dest` field"),
                    }
                }
                "CDUP" => Ok(Self::Cdup),
                "CERT" => Ok(Self::Cert),
                "CONNECT" => {
                    let host = match args.next() {
                        Some(host) => host.to_string(),
                        None => return Err("Missing `host` field"),
                    };
                    match args.next().map(u16::from_str) {
                        None => Ok(Self::Connect(host, None)),
                        Some(Ok(port)) => Ok(Self::Connect(host, Some(port))),
                        Some(Err(_)) => Err("Invalid `port` field"),
                    }
                }
                "CWD" => match args.next() {
                    Some(p) => Ok(Self::Cwd(p.to_string())),
                    None => Err("Missing `dir` field"),
                },
                "DATAMODE" => match args.next().map(|m| m.to_ascii_uppercase()).as_deref() {
                    Some("ACTIVE") => Ok(Self::DataMode(Mode::Active)),
                    Some("EXTPASSIVE") => Ok(Self::DataMode(Mode::ExtendedPassive)),
                    Some("PASSIVE") => Ok(Self::DataMode(Mode::Passive)),
                    Some(_) => Err("Invalid mode"),
                    None => Err("Missing `mode` field"),
                },
                "HELP" => Ok(Self::Help),
                "LIST" => match args.next() {
                    Some(dir) => Ok(Self::List(Some(dir.to_string()))),
                    None => Ok(Self::List(None)),
                },
                "LOGIN" => Ok(Self::Login),
                "MDTM" => match args.next() {
                    Some(file) => Ok(Self::Mdtm(file.to_string())),
                    None => Err("Missing `file` field"),
                },
                "MKDIR" => match args.next() {
                    Some(file) => Ok(Self::Mkdir(file.to_string())),
                    None => Err("Missing `dir` field"),
                },
                "MODE" => match args.next() {
                    Some(mode) => FtpsMode::from_str(mode)
                        .map(Self::Mode)
                        .map_err(|_| "Invalid mode"),
                    None => Err("Missing `mode` field"),
                },
                "NOOP" => Ok(Self::Noop),
                "PUT" => {
                    let local: PathBuf = match args.next() {
                        Some(l) => PathBuf::from(l),
                        None => return Err("Missing `source` field"),
                    };
                    match args.next() {
                        Some(d) => Ok(Self::Put(local, d.to_string())),
                        None => Err("Missing `dest` field"),
                    }
                }
                "PWD" => Ok(Self::Pwd),
                "QUIT" => Ok(Self::Quit),
                "RENAME" => {
                    let src: String = match args.next() {
                        Some(s) => s.to_string(),
                        None => return Err("Missing `src` field"),
                    };
                    match args.next() {
                        Some(d) => Ok(Self::Rename(src, d.to_string())),
                        None => Err("Missing `dest` field"),
                    }
                }
                "RESUME" => {
                    let file: String = match args.next() {
                        Some(f) => f.to_string(),
                        None => return Err("Missing `file` field"),
                    };
                    match args.next() {
                        Some(d) => Ok(Self::Resume(file, PathBuf::from(d))),
                        None => Err("Missing `dest` field"),
                    }
                }
                "RETR" => {
                    let file: String = match args.next() {
                        Some(f) => f.to_string(),
                        None => return Err("Missing `file` field"),
                    };
                    match args.next() {
                        Some(d) => Ok(Self::Retr(file, PathBuf::from(d))),
                        None => Err("Missing `dest` field"),
                    }
                }
                "RM" => match args.next() {
                    Some(file) => Ok(Self::Rm(file.to_string())),
                    None => Err("Missing `file` field"),
                },
                "RMDIR" => match args.next() {
                    Some(dir) => Ok(Self::Rmdir(dir.to_string())),
                    None => Err("Missing `dir` field"),
                },
                "SIZE" => match args.next() {
                    Some(file) => Ok(Self::Size(file.to_string())),
                    None => Err("Missing `file` field"),
                },
                _ => Err("Unknown command"),
            },
            None => Err("Unknown command"),
        }
    }
}
