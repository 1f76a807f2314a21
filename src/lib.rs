//! # imap-transport
//!
//! The transport core of an IMAP4rev1 client: a push-based line/literal
//! framer, a response dispatcher, a one-command-at-a-time send engine with
//! continuation-request handshakes, and a transparent DEFLATE/INFLATE shim
//! for `COMPRESS=DEFLATE`. It does not know LOGIN, SELECT, or FETCH — those
//! belong to a higher-level crate built on top of [`Client::enqueue`].
//!
//! ## Quick start
//!
//! ```ignore
//! use imap_transport::{Client, Config, SimpleCompiler, SimpleParser};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> imap_transport::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let (client, mut events) = Client::connect(
//!         config,
//!         Arc::new(SimpleParser),
//!         Arc::new(SimpleCompiler),
//!     )
//!     .await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! transport ── (inflate) ── framer ── dispatcher ── payload bucket
//!    ▲                                    │           global handler
//!    │                                    ▼           completion
//!    └── (deflate) ── send engine ◀── command queue
//! ```
//!
//! ## Modules
//!
//! - [`connection`]: the transport adapter — configuration and the plain/TLS byte stream.
//! - [`compression`]: the DEFLATE/INFLATE shim inserted after `COMPRESS DEFLATE`.
//! - [`framer`]: the push-based line/literal framer.
//! - [`parser`]: the sans-I/O response grammar (lexer, attribute-tree AST, `Parser` trait).
//! - [`dispatcher`]: continuation classification and response normalization.
//! - [`compiler`]: the `Compiler` trait that turns a [`compiler::Request`] into wire bytes.
//! - [`command`]: the enqueued-command record and tag generator.
//! - [`engine`]: the connection lifecycle controller tying everything together.
//! - [`time`]: the `Clock` abstraction retained as testing infrastructure;
//!   the engine's own idle and socket timers use `tokio::time` directly.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod compiler;
pub mod compression;
pub mod connection;
pub mod dispatcher;
pub mod engine;
mod error;
pub mod framer;
pub mod parser;
pub mod time;

pub use command::{CommandOutcome, CommandRecord, Completion, EnqueueOptions, TagGenerator};
pub use compiler::{Arg, Compiler, Request, SimpleCompiler};
pub use compression::Compression;
pub use connection::{Config, ConfigBuilder, ImapStream, Security};
pub use dispatcher::DispatchedResponse;
pub use engine::{Client, Event, HandlerFn};
pub use error::{Error, Result};
pub use framer::Framer;
pub use parser::{Attribute, Parser, ResponseAst, SimpleParser};
