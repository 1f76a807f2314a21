//! Error types for the IMAP transport engine.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving an IMAP transport connection.
///
/// Every variant but [`Error::Protocol`] is fatal: it tears the connection
/// down via the error funnel in [`crate::engine`]. [`Error::Protocol`]
/// surfaces only to the completion of the command that caused it; the
/// connection remains usable afterwards.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure: socket open failure, unexpected close, or
    /// I/O error while reading or writing. Fatal.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// TLS handshake or configuration error. Fatal.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name supplied for TLS server name verification. Fatal.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A per-write socket timeout fired before any inbound byte arrived. Fatal.
    #[error("socket timeout after {0:?}")]
    Timeout(Duration),

    /// The parser collaborator rejected a framed response. Fatal.
    #[error("parser error at byte {position}: {message}")]
    Parser {
        /// Byte offset into the framed response where parsing failed.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The compiler collaborator rejected an enqueued request. Fatal for
    /// that command and for the connection.
    #[error("compiler error: {0}")]
    Compiler(String),

    /// The server answered a tagged command with `NO` or `BAD`. Non-fatal:
    /// delivered only to that command's completion.
    #[error("protocol error{}: {human_readable}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Protocol {
        /// Machine-readable response code, e.g. `AUTHENTICATIONFAILED`.
        code: Option<String>,
        /// Human-readable text from the response, or `"Error"` if absent.
        human_readable: String,
    },

    /// The compression worker task failed or its channel closed unexpectedly. Fatal.
    #[error("compression worker error: {0}")]
    Worker(String),

    /// The connection was closed while this command was still outstanding.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
