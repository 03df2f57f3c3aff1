#![allow(dead_code)]

use std::borrow::Cow;
use std::collections::HashMap;

use testcontainers::core::WaitFor;
use testcontainers::{Container, Image};

/// Passive ports opened by the image
const PASSIVE_PORTS: std::ops::RangeInclusive<u16> = 30000..=30009;

/// pure-ftpd refusing any session which isn't secured
#[derive(Debug, Default, Clone)]
struct PureFtpsImage {
    _priv: (),
}

impl Image for PureFtpsImage {
    fn name(&self) -> &str {
        "stilliard/pure-ftpd"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::message_on_stdout("Starting Pure-FTPd")]
    }

    fn env_vars(
        &self,
    ) -> impl IntoIterator<Item = (impl Into<Cow<'_, str>>, impl Into<Cow<'_, str>>)> {
        vec![
            ("PUBLICHOST", "localhost"),
            ("FTP_USER_NAME", "test"),
            ("FTP_USER_PASS", "test"),
            ("FTP_USER_HOME", "/home/test"),
            ("ADDED_FLAGS", "--tls=2"),
            ("TLS_CN", "localhost"),
            ("TLS_ORG", "secureftp"),
            ("TLS_C", "IT"),
        ]
    }
}

pub struct SyncPureFtpsRunner {
    container: Container<PureFtpsImage>,
}

impl SyncPureFtpsRunner {
    pub fn start() -> Self {
        use testcontainers::runners::SyncRunner;
        let container = PureFtpsImage::default()
            .start()
            .expect("Failed to start container");

        Self { container }
    }

    pub fn get_ftp_port(&self) -> u16 {
        self.container.get_host_port_ipv4(21).unwrap()
    }

    pub fn get_mapped_port(&self, port: u16) -> u16 {
        self.container.get_host_port_ipv4(port).unwrap()
    }

    /// Host ports of the passive ports of the container
    pub fn passive_ports(&self) -> HashMap<u16, u16> {
        PASSIVE_PORTS
            .map(|port| (port, self.get_mapped_port(port)))
            .collect()
    }
}

#[cfg(all(test, feature = "rustls"))]
mod test {

    use std::io::Cursor;
    use std::net::{SocketAddr, TcpStream};

    use pretty_assertions::assert_eq;
    use rand::distr::Alphanumeric;
    use rand::{rng, Rng};
    use serial_test::serial;

    use super::*;
    use crate::{FtpError, FtpsMode, RustlsConnector, RustlsFtpsStream};

    fn setup_stream(container: &SyncPureFtpsRunner) -> RustlsFtpsStream {
        crate::log_init();
        let ports = container.passive_ports();
        let mut stream = RustlsFtpsStream::new(RustlsConnector::dangerous_no_verify())
            .with_mode(FtpsMode::Explicit)
            .passive_stream_builder(move |addr: SocketAddr| {
                let port = ports.get(&addr.port()).copied().unwrap_or(addr.port());
                TcpStream::connect(("127.0.0.1", port)).map_err(FtpError::ConnectionError)
            });
        stream
            .connect("127.0.0.1", Some(container.get_ftp_port()))
            .unwrap();
        stream.login("test", "test").unwrap();
        stream
    }

    fn generate_tempfile_name() -> String {
        let mut rng = rng();
        let name: String = std::iter::repeat(())
            .map(|()| rng.sample(Alphanumeric))
            .map(char::from)
            .take(5)
            .collect();
        format!("temp_{}", name)
    }

    #[test]
    #[serial]
    #[ignore = "requires docker"]
    fn should_transfer_files_over_secured_session() {
        let container = SyncPureFtpsRunner::start();
        let mut stream = setup_stream(&container);
        assert!(stream.is_secure());
        assert!(stream.peer_certificate().is_some());

        let file_name = generate_tempfile_name();
        let mut reader = Cursor::new(b"hello, world!".to_vec());
        assert_eq!(stream.put_file(&file_name, &mut reader).unwrap(), 13);
        assert_eq!(stream.size(&file_name).unwrap(), 13);
        let buffer = stream.retr_as_buffer(&file_name).unwrap();
        assert_eq!(buffer.into_inner(), b"hello, world!".to_vec());
        assert!(stream
            .nlst(None)
            .unwrap()
            .iter()
            .any(|name| name.ends_with(&file_name)));
        stream.rm(&file_name).unwrap();
        stream.quit().unwrap();
        assert!(!stream.is_connected());
    }

    #[test]
    #[serial]
    #[ignore = "requires docker"]
    fn should_fail_implicit_handshake_against_explicit_server() {
        let container = SyncPureFtpsRunner::start();
        let mut stream = RustlsFtpsStream::new(RustlsConnector::dangerous_no_verify())
            .with_mode(FtpsMode::Implicit);
        // the server speaks explicit FTPS only
        assert!(stream
            .connect("127.0.0.1", Some(container.get_ftp_port()))
            .is_err());
        assert!(!stream.is_connected());
    }
}
