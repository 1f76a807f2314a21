//! Transport adapter: configuration and the plain/TLS byte stream.
//!
//! This is the lowest layer in the pipeline (specification §2 component 1):
//! it knows nothing about IMAP framing, only how to open, read, write, and
//! upgrade a duplex byte stream.

mod config;
mod stream;

pub use config::{Config, ConfigBuilder, Security};
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};
