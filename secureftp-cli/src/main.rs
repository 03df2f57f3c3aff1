//! # SecureFTP Client
//!
//! This is a client you can install via `cargo install secureftp-cli` on your system to work with FTPS servers
//!

// -- mods
mod actions;
mod args;
mod command;

use std::io;
use std::io::Write;
use std::str::FromStr;

use actions::*;
use args::Args;
use command::Command;
use env_logger::Builder as LogBuilder;
use log::LevelFilter;
use secureftp::rustls::{ClientConfig, RootCertStore};
use secureftp::{FtpError, FtpsMode, RustlsConnector, RustlsFtpsStream as FtpsStream};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

fn usage() {
    println!("Available commands:");
    println!("APPE <file> <dest>                  Append content of local file `file` to `dest`");
    println!("CDUP                                Go to parent directory");
    println!("CERT                                Print the certificate presented by the server");
    println!("CONNECT <host> [port]               Connect to remote host");
    println!("CWD <dir>                           Change working directory");
    println!("DATAMODE <PASSIVE|EXTPASSIVE|ACTIVE> Set data channel mode");
    println!("HELP                                Print this help");
    println!("LIST [dir]                          List files. If directory is not provided, current directory is used");
    println!("LOGIN                               Login to remote");
    println!("MDTM <file>                         Get modification time for `file`");
    println!("MKDIR <dir>                         Create directory");
    println!("MODE <EXPLICIT|IMPLICIT>            Set FTPS mode (only while disconnected)");
    println!("NOOP                                Ping server");
    println!("PUT <file> <dest>                   Upload local file `file` to `dest`");
    println!("PWD                                 Print working directory");
    println!("QUIT                                Quit secureftp");
    println!("RENAME <source> <dest>              Rename file `source` to `dest`");
    println!("RESUME <file> <dest>                Download the rest of `file` to the partial `dest`");
    println!("RETR <file> <dest>                  Download `file` to `dest`");
    println!("RM <file>                           Remove file");
    println!("RMDIR <dir>                         Remove directory");
    println!("SIZE <file>                         Get `file` size");
}

fn input() -> Option<Command> {
    loop {
        print!(">> ");
        let _ = io::stdout().flush();
        let mut input: String = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => {
                eprintln!("Failed to read stdin: {}", err);
                return None;
            }
        }
        // Try to create command
        match Command::from_str(input.as_str()) {
            Ok(cmd) => return Some(cmd),
            Err(err) => println!("{}", err),
        }
    }
}

fn tls_connector(insecure: bool) -> RustlsConnector {
    if insecure {
        return RustlsConnector::dangerous_no_verify();
    }
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
        .into()
}

fn main() {
    let args: Args = argh::from_env();
    // print version
    if args.version {
        println!("secureftp {APP_VERSION} - developed by {APP_AUTHORS}")
    }
    // init logger
    LogBuilder::new()
        .filter_level(if args.debug {
            LevelFilter::Trace
        } else if args.verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Off
        })
        .init();
    let ftps_mode = if args.implicit {
        FtpsMode::Implicit
    } else {
        FtpsMode::Explicit
    };
    let mut ftps = FtpsStream::new(tls_connector(args.insecure)).with_mode(ftps_mode);

    // connect if host is specified
    if let Some(host) = args.host {
        perform(&mut ftps, Command::Connect(host, args.port));
    }

    // Main loop
    while let Some(command) = input() {
        match command {
            Command::Quit => break,
            Command::Help => usage(),
            cmd => perform(&mut ftps, cmd),
        }
    }
    quit(&mut ftps);
}

fn perform(ftps: &mut FtpsStream, command: Command) {
    match command {
        Command::Appe(src, dest) => appe(ftps, src.as_path(), dest.as_str()),
        Command::Cdup => cdup(ftps),
        Command::Cert => cert(ftps),
        Command::Connect(host, port) => connect(ftps, host.as_str(), port),
        Command::Cwd(dir) => cwd(ftps, dir.as_str()),
        Command::DataMode(m) => set_data_mode(ftps, m),
        Command::List(p) => list(ftps, p.as_deref()),
        Command::Login => login(ftps),
        Command::Mdtm(p) => mdtm(ftps, p.as_str()),
        Command::Mkdir(p) => mkdir(ftps, p.as_str()),
        Command::Mode(m) => set_ftps_mode(ftps, m),
        Command::Noop => noop(ftps),
        Command::Put(src, dest) => put(ftps, src.as_path(), dest.as_str()),
        Command::Pwd => pwd(ftps),
        Command::Rename(src, dest) => rename(ftps, src.as_str(), dest.as_str()),
        Command::Resume(file, dest) => resume(ftps, file.as_str(), dest.as_path()),
        Command::Retr(file, dest) => retr(ftps, file.as_str(), dest.as_path()),
        Command::Rm(file) => rm(ftps, file.as_str()),
        Command::Rmdir(file) => rmdir(ftps, file.as_str()),
        Command::Size(file) => size(ftps, file.as_str()),
        Command::Help | Command::Quit => {
            eprintln!("Something unexpected happened")
        }
    }
}
