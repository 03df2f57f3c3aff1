use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use secureftp::types::FileType;
use secureftp::{FtpsMode, Mode};

use super::{FtpError, FtpsStream};

pub fn quit(ftp: &mut FtpsStream) {
    if ftp.is_connected() {
        match ftp.quit() {
            Ok(_) => println!("OK"),
            Err(err) => eprintln!("Failed to disconnect from remote: {}", err),
        }
    }
}

pub fn appe(ftp: &mut FtpsStream, local: &Path, dest: &str) {
    let mut reader = match File::open(local) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("Failed to open local file for read: {}", err);
            return;
        }
    };
    match ftp.append_file(dest, &mut reader) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("APPE error: {}", err),
    }
}

pub fn cdup(ftp: &mut FtpsStream) {
    match ftp.cdup() {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("CDUP error: {}", err),
    }
}

pub fn cert(ftp: &FtpsStream) {
    match ftp.peer_certificate() {
        Some(der) => {
            println!("OK: {} bytes (DER)", der.len());
            for chunk in der.chunks(32) {
                let line: String = chunk.iter().map(|b| format!("{b:02x}")).collect();
                println!("{line}");
            }
        }
        None => eprintln!("CERT error: the control channel is not secured"),
    }
}

pub fn connect(ftp: &mut FtpsStream, host: &str, port: Option<u16>) {
    if ftp.is_connected() {
        ftp.close();
    }
    match ftp.connect(host, port) {
        Ok(_) => {
            if let Some(welcome) = ftp.get_welcome_msg() {
                println!("{}", welcome.trim_end());
            }
            println!("OK");
        }
        Err(err) => eprintln!("Failed to connect to remote: {}", err),
    }
}

pub fn cwd(ftp: &mut FtpsStream, dir: &str) {
    match ftp.cwd(dir) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("CWD error: {}", err),
    }
}

pub fn list(ftp: &mut FtpsStream, p: Option<&str>) {
    match ftp.list(p) {
        Ok(files) => {
            files.iter().for_each(|f| println!("{}", f));
        }
        Err(err) => eprintln!("LIST error: {}", err),
    }
}

pub fn login(ftp: &mut FtpsStream) {
    // Read username
    print!("Username: ");
    let _ = io::Write::flush(&mut io::stdout());
    let mut username = String::new();
    if let Err(err) = io::stdin().read_line(&mut username) {
        eprintln!("Could not read username: {}", err);
        return;
    }
    // Read password
    let password: String = match rpassword::prompt_password("Password: ") {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Could not read password: {}", err);
            return;
        }
    };
    // Login
    match ftp.login(username.trim(), password.as_str()) {
        Ok(_) => println!("OK"),
        Err(err) => {
            eprintln!("LOGIN error: {}", err);
            return;
        }
    }
    // Set transfer type to binary
    if let Err(err) = ftp.transfer_type(FileType::Binary) {
        eprintln!("Failed to set transfer type to binary: {}", err);
    }
}

pub fn mdtm(ftp: &mut FtpsStream, f: &str) {
    match ftp.mdtm(f) {
        Ok(time) => println!("OK: {}", time),
        Err(err) => eprintln!("MDTM error: {}", err),
    }
}

pub fn mkdir(ftp: &mut FtpsStream, f: &str) {
    match ftp.mkdir(f) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("MKDIR error: {}", err),
    }
}

pub fn set_data_mode(ftp: &mut FtpsStream, mode: Mode) {
    ftp.set_mode(mode);
    println!("OK");
}

pub fn set_ftps_mode(ftp: &mut FtpsStream, mode: FtpsMode) {
    match ftp.set_ftps_mode(mode) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("MODE error: {}", err),
    }
}

pub fn noop(ftp: &mut FtpsStream) {
    match ftp.noop() {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("NOOP error: {}", err),
    }
}

pub fn put(ftp: &mut FtpsStream, local: &Path, dest: &str) {
    let mut reader = match File::open(local) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("Failed to open local file for read: {}", err);
            return;
        }
    };
    match ftp.put_file(dest, &mut reader) {
        Ok(bytes) => println!("OK: {} bytes", bytes),
        Err(err) => eprintln!("PUT error: {}", err),
    }
}

pub fn pwd(ftp: &mut FtpsStream) {
    match ftp.pwd() {
        Ok(p) => println!("OK: {}", p),
        Err(err) => eprintln!("PWD error: {}", err),
    }
}

pub fn rename(ftp: &mut FtpsStream, src: &str, dest: &str) {
    match ftp.rename(src, dest) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("RENAME error: {}", err),
    }
}

/// Download the part of `file` missing from `dest`
pub fn resume(ftp: &mut FtpsStream, file: &str, dest: &Path) {
    let mut dest: File = match OpenOptions::new().create(true).append(true).open(dest) {
        Ok(d) => d,
        Err(err) => {
            eprintln!("Failed to open destination file: {}", err);
            return;
        }
    };
    let offset = match dest.metadata() {
        Ok(metadata) => metadata.len() as usize,
        Err(err) => {
            eprintln!("Failed to stat destination file: {}", err);
            return;
        }
    };
    let mut stream = match ftp.resume_retr_as_stream(file, offset) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("RESUME error: {}", err);
            return;
        }
    };
    let copied = io::copy(&mut stream, &mut dest);
    let closed = ftp.close_data_connection(stream);
    match (copied, closed) {
        (Ok(bytes), Ok(_)) => println!("OK: {} bytes from offset {}", bytes, offset),
        (Err(err), _) => eprintln!("RESUME error: {}", err),
        (_, Err(err)) => eprintln!("RESUME error: {}", err),
    }
}

pub fn retr(ftp: &mut FtpsStream, file: &str, dest: &Path) {
    let mut dest: File = match File::create(dest) {
        Ok(d) => d,
        Err(err) => {
            eprintln!("Failed to open destination file: {}", err);
            return;
        }
    };
    match ftp.retr(file, move |reader| {
        io::copy(reader, &mut dest).map_err(FtpError::ConnectionError)
    }) {
        Ok(bytes) => println!("OK: {} bytes", bytes),
        Err(err) => eprintln!("RETR error: {}", err),
    }
}

pub fn rm(ftp: &mut FtpsStream, file: &str) {
    match ftp.rm(file) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("RM error: {}", err),
    }
}

pub fn rmdir(ftp: &mut FtpsStream, dir: &str) {
    match ftp.rmdir(dir) {
        Ok(_) => println!("OK"),
        Err(err) => eprintln!("RMDIR error: {}", err),
    }
}

pub fn size(ftp: &mut FtpsStream, file: &str) {
    match ftp.size(file) {
        Ok(size) => println!("OK: {}", size),
        Err(err) => eprintln!("SIZE error: {}", err),
    }
}
