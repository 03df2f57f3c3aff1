//! To run this example enable the rustls feature (--features rustls).
//! If you use this code in your own project you need to enable secureftp's
//! rustls feature through Cargo.toml and also include the webpki-roots crate
//! as a dependency (this includes Mozilla's root certificates for use with
//! rustls).

use std::sync::Arc;

use secureftp::rustls;
use secureftp::rustls::ClientConfig;
use secureftp::{FtpsMode, RustlsConnector, RustlsFtpsStream};

fn main() {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    // Create an explicit FTPS session and authenticate to the server.
    let mut ftps = RustlsFtpsStream::new(RustlsConnector::from(Arc::new(config)))
        .with_mode(FtpsMode::Explicit);
    ftps.connect("test.rebex.net", None).unwrap();
    ftps.login("demo", "password").unwrap();

    // Every data channel resumes the session of the control channel.
    for name in ftps.nlst(None).unwrap() {
        println!("{name}");
    }
    let readme = ftps.retr_as_buffer("readme.txt").unwrap();
    println!("{}", String::from_utf8_lossy(readme.get_ref()));

    // Terminate the connection to the server.
    let _ = ftps.quit();
}
