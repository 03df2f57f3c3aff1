#![crate_name = "secureftp"]
#![crate_type = "lib"]

//! # SecureFTP
//!
//! SecureFTP is an FTPS (FTP over TLS) client library written in Rust.
//! It takes care of the security of the whole session, not only of the control connection:
//!
//! - **Explicit** FTPS, where the control connection is secured with `AUTH TLS` before logging in
//! - **Implicit** FTPS, where the control connection is secured before the server sends anything
//! - `PBSZ 0` and `PROT P`, so that the server requires every data connection to be secured
//! - TLS session resumption on every data connection, as most servers refuse data connections
//!   which don't resume the session of the control connection
//! - Hostname verification of every data connection against the host the session was opened with,
//!   even when the server announces a different address for the transfer
//! - Orderly TLS shutdown of data connections, which tells the server the transfer completed
//!
//! ## Get started
//!
//! To get started, first add **secureftp** to your dependencies:
//!
//! ```toml
//! secureftp = "^0.1"
//! ```
//!
//! ### Features
//!
//! #### TLS engine
//!
//! The TLS engine is selected with the `rustls` (default) or `native-tls` feature.
//!
//! ```toml
//! secureftp = { version = "^0.1", default-features = false, features = ["native-tls"] }
//! ```
//!
//! > 💡 native-tls doesn't expose the negotiated session: resumption is then up to the platform engine.
//!
//! Without any engine the library still builds, but every session fails with [`FtpError::TlsUnavailable`]
//! before any credential is sent.
//!
//! #### Logging
//!
//! The library logs through the [log](https://docs.rs/log) facade. Logging can be compiled out with the `no-log` feature.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "rustls")]
//! # fn main() {
//! use std::sync::Arc;
//!
//! use secureftp::rustls::ClientConfig;
//! use secureftp::{FtpsMode, RustlsConnector, RustlsFtpsStream};
//!
//! let root_store = secureftp::rustls::RootCertStore::empty();
//! let config = ClientConfig::builder()
//!     .with_root_certificates(root_store)
//!     .with_no_client_auth();
//! let mut ftps = RustlsFtpsStream::new(RustlsConnector::from(Arc::new(config)))
//!     .with_mode(FtpsMode::Explicit);
//! ftps.connect("ftp.example.com", None).unwrap();
//! ftps.login("user", "password").unwrap();
//! let listing = ftps.nlst(None).unwrap();
//! println!("{}", listing.join("\n"));
//! ftps.quit().unwrap();
//! # }
//! # #[cfg(not(feature = "rustls"))]
//! # fn main() {}
//! ```
//!

#![doc(html_playground_url = "https://play.rust-lang.org")]

// -- common deps
#[macro_use]
extern crate lazy_regex;
#[macro_use]
extern crate log;

// -- private
pub(crate) mod command;
mod ftps;
mod regex;
mod status;
#[cfg(test)]
mod test_container;
#[cfg(test)]
mod test_server;
#[cfg(test)]
mod test_tls;

// -- public
pub mod types;

// -- secure deps
#[cfg(feature = "native-tls")]
pub extern crate native_tls_crate as native_tls;
#[cfg(feature = "rustls")]
pub extern crate rustls_crate as rustls;

// -- export
pub use ftps::{
    close_stream, CloseableStream, DataStream, ImplFtpsStream, NoTlsConnector, NoTlsStream,
    PassiveStreamBuilder, SecureStream, TlsConnector, TlsStream,
};
#[cfg(feature = "native-tls")]
pub use ftps::{NativeTlsConnector, NativeTlsStream};
#[cfg(feature = "rustls")]
pub use ftps::{RustlsConnector, RustlsSession, RustlsStream};
pub use status::{ReplyClass, Status};
pub use types::{FileType, FormatControl, FtpError, FtpResult, FtpsMode, Mode, Response};

/// FTPS session using rustls
#[cfg(feature = "rustls")]
pub type RustlsFtpsStream = ImplFtpsStream<RustlsConnector>;
/// FTPS session using native-tls
#[cfg(feature = "native-tls")]
pub type NativeTlsFtpsStream = ImplFtpsStream<NativeTlsConnector>;
/// FTPS session without any TLS engine: connecting works, securing it doesn't
pub type NoTlsFtpsStream = ImplFtpsStream<NoTlsConnector>;

// -- test logging
#[cfg(test)]
pub fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
