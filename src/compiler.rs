//! Command compiler: turns a request AST into wire bytes.
//!
//! The compiler is an external collaborator (§6 of the specification): a
//! higher-level IMAP command set would supply its own. This module ships
//! [`SimpleCompiler`], a reference implementation that covers plain atom
//! commands and a single trailing literal argument, enough to drive every
//! end-to-end scenario in §8, including the continuation handshake.

use crate::Result;

/// One argument of a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Sent as-is if it needs no quoting, quoted otherwise.
    Atom(String),
    /// Always sent as a quoted string.
    Quoted(String),
    /// Sent as an octet-counted literal, splitting the command across a
    /// continuation handshake when `split_for_literals` is requested.
    Literal(Vec<u8>),
}

/// An opaque command request accepted by a [`Compiler`].
///
/// `command` is the bare command verb (`"CAPABILITY"`, `"LOGIN"`, ...);
/// `args` are serialized in order, space-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The command verb, e.g. `LOGIN` or `APPEND`.
    pub command: String,
    /// Ordered command arguments.
    pub args: Vec<Arg>,
}

impl Request {
    /// Builds a request with no arguments, e.g. `CAPABILITY` or `NOOP`.
    #[must_use]
    pub fn bare(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument, builder-style.
    #[must_use]
    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }
}

/// Compiles a [`Request`] into one or more chunks of wire bytes.
///
/// When `split_for_literals` is true, each chunk but the last ends with a
/// literal declaration (`{N}` or `{N+}`) awaiting a server continuation;
/// the send engine appends the line terminator to every chunk it writes
/// (see [`crate::engine`]).
pub trait Compiler: Send + Sync {
    /// Compiles `request`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Compiler`] if `request` cannot be serialized.
    fn compile(
        &self,
        tag: &str,
        request: &Request,
        split_for_literals: bool,
        redact_for_log: bool,
    ) -> Result<Vec<Vec<u8>>>;
}

/// Reference [`Compiler`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleCompiler;

impl Compiler for SimpleCompiler {
    fn compile(
        &self,
        tag: &str,
        request: &Request,
        split_for_literals: bool,
        redact_for_log: bool,
    ) -> Result<Vec<Vec<u8>>> {
        let mut chunks = Vec::new();
        let mut current = Vec::new();
        current.extend_from_slice(tag.as_bytes());
        current.push(b' ');
        current.extend_from_slice(request.command.as_bytes());

        for arg in &request.args {
            current.push(b' ');
            match arg {
                Arg::Atom(s) if needs_quoting(s) => write_quoted(&mut current, s),
                Arg::Atom(s) => current.extend_from_slice(s.as_bytes()),
                Arg::Quoted(s) => write_quoted(&mut current, s),
                Arg::Literal(bytes) => {
                    current.extend_from_slice(format!("{{{}}}", bytes.len()).as_bytes());
                    if split_for_literals {
                        chunks.push(std::mem::take(&mut current));
                        current = bytes.clone();
                    } else {
                        current.push(b'\r');
                        current.push(b'\n');
                        current.extend_from_slice(bytes);
                    }
                }
            }
        }

        chunks.push(current);

        if redact_for_log {
            tracing::trace!(tag, command = %request.command, "compiled command (redacted)");
        } else {
            tracing::trace!(tag, command = %request.command, chunks = chunks.len(), "compiled command");
        }

        Ok(chunks)
    }
}

/// An atom needs quoting if it is empty or contains a character the IMAP
/// grammar excludes from `atom` (space, parens, braces, quotes, etc.).
fn needs_quoting(s: &str) -> bool {
    s.is_empty() || s.bytes().any(|b| !crate::parser::is_atom_char(b))
}

fn write_quoted(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for byte in s.bytes() {
        if byte == b'"' || byte == b'\\' {
            out.push(b'\\');
        }
        out.push(byte);
    }
    out.push(b'"');
}
