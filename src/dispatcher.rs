//! Response normalization (specification §4.2, steps 1-4).
//!
//! This module is deliberately ignorant of command queues, handler tables,
//! or I/O: given one framed response it either recognizes a continuation
//! request or normalizes a parsed [`ResponseAst`] into a [`DispatchedResponse`].
//! Routing the normalized response to a payload bucket, a global handler,
//! or a command completion (§4.2 step 5-6) is the job of [`crate::engine`],
//! which owns the mutable state (current command, handler table) that
//! routing decisions depend on.

use std::collections::HashMap;

use crate::parser::{Attribute, ResponseAst};

/// Response commands that may carry a bracketed `[CODE ...]` section.
const CODE_BEARING_COMMANDS: [&str; 5] = ["OK", "NO", "BAD", "BYE", "PREAUTH"];

/// What a single framed response text turns out to be, before full parsing.
pub enum Frame<'a> {
    /// A synthetic continuation response: `+` followed by optional text.
    Continuation {
        /// Text after `"+ "`, or empty if the line was bare `+`.
        payload: String,
    },
    /// Anything else: hand this to the parser collaborator.
    Unparsed(&'a [u8]),
}

/// Classifies a framed response text (specification §4.2 step 1).
#[must_use]
pub fn classify(text: &[u8]) -> Frame<'_> {
    if let Some(rest) = text.strip_prefix(b"+") {
        let rest = rest.strip_prefix(b" ").unwrap_or(rest);
        return Frame::Continuation {
            payload: String::from_utf8_lossy(rest).into_owned(),
        };
    }
    Frame::Unparsed(text)
}

/// A response after numeric-untagged normalization and response-code
/// extraction have both run.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedResponse {
    /// `"*"` for untagged, or the echoed command tag.
    pub tag: String,
    /// The (possibly normalized) command name, always uppercased and trimmed.
    pub command: String,
    /// Sequence number recovered from a numeric-untagged response, e.g. the
    /// `17` in `* 17 EXISTS`.
    pub nr: Option<u32>,
    /// Machine-readable response code, e.g. `AUTHENTICATIONFAILED`.
    pub code: Option<String>,
    /// Elements attached to `code`, keyed by its lowercased name; a
    /// singleton section element is unwrapped, multiple are kept as a list.
    pub code_data: HashMap<String, Attribute>,
    /// Trailing human-readable text, when present.
    pub human_readable: Option<String>,
    /// Whatever attributes remain after normalization and code extraction.
    pub attributes: Vec<Attribute>,
}

/// Applies numeric-untagged normalization and response-code extraction to
/// a parsed response (specification §4.2 steps 3-4).
#[must_use]
pub fn normalize(ast: ResponseAst) -> DispatchedResponse {
    let ResponseAst {
        tag,
        command,
        mut attributes,
    } = ast;

    let mut nr = None;
    let mut command = command;
    if tag == "*" && command.bytes().all(|b| b.is_ascii_digit()) && !command.is_empty() {
        if let Some(Attribute::Atom(name)) = attributes.first() {
            let name = name.trim().to_ascii_uppercase();
            nr = command.parse().ok();
            command = name;
            attributes.remove(0);
        }
    }

    let mut code = None;
    let mut code_data = HashMap::new();
    let mut human_readable = None;

    if CODE_BEARING_COMMANDS.contains(&command.to_ascii_uppercase().as_str()) {
        let is_section = matches!(attributes.first(), Some(Attribute::Section(_)));
        if is_section {
            let Attribute::Section(section) = attributes.remove(0) else {
                unreachable!("guarded by is_section above");
            };
            if let Some(Attribute::Atom(name)) = section.first() {
                let key = name.to_ascii_lowercase();
                code = Some(name.clone());
                let rest = &section[1..];
                if rest.len() == 1 {
                    code_data.insert(key, rest[0].clone());
                } else if !rest.is_empty() {
                    code_data.insert(key, Attribute::List(rest.to_vec()));
                }
            }
        }
        if let Some(Attribute::Text(text)) = attributes.last() {
            human_readable = Some(text.clone());
        }
    }

    DispatchedResponse {
        tag,
        command,
        nr,
        code,
        code_data,
        human_readable,
        attributes,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::{Parser, SimpleParser};

    fn normalize_text(text: &[u8]) -> DispatchedResponse {
        let ast = SimpleParser.parse(text).unwrap();
        normalize(ast)
    }

    #[test]
    fn classifies_continuation_with_payload() {
        match classify(b"+ Ready for literal data") {
            Frame::Continuation { payload } => assert_eq!(payload, "Ready for literal data"),
            Frame::Unparsed(_) => panic!("expected continuation"),
        }
    }

    #[test]
    fn classifies_bare_continuation() {
        match classify(b"+") {
            Frame::Continuation { payload } => assert_eq!(payload, ""),
            Frame::Unparsed(_) => panic!("expected continuation"),
        }
    }

    #[test]
    fn classifies_ordinary_response_as_unparsed() {
        assert!(matches!(classify(b"* OK hi"), Frame::Unparsed(_)));
    }

    #[test]
    fn normalizes_numeric_untagged_exists() {
        let response = normalize_text(b"* 42 EXISTS");
        assert_eq!(response.command, "EXISTS");
        assert_eq!(response.nr, Some(42));
        assert!(response.attributes.is_empty());
    }

    #[test]
    fn leaves_non_numeric_untagged_alone() {
        let response = normalize_text(b"* CAPABILITY IMAP4rev1 AUTH=PLAIN");
        assert_eq!(response.command, "CAPABILITY");
        assert_eq!(response.nr, None);
        assert_eq!(response.attributes.len(), 2);
    }

    #[test]
    fn extracts_response_code_and_human_readable() {
        let response = normalize_text(b"W4 NO [AUTHENTICATIONFAILED] bad creds");
        assert_eq!(response.code.as_deref(), Some("AUTHENTICATIONFAILED"));
        assert_eq!(response.human_readable.as_deref(), Some("bad creds"));
        assert!(response.code_data.is_empty());
    }

    #[test]
    fn extracts_response_code_with_singleton_data() {
        let response = normalize_text(b"W2 OK [UIDNEXT 100] done");
        assert_eq!(response.code.as_deref(), Some("UIDNEXT"));
        assert_eq!(response.code_data.get("uidnext"), Some(&Attribute::Number(100)));
        assert_eq!(response.human_readable.as_deref(), Some("done"));
    }

    #[test]
    fn extracts_response_code_with_list_data() {
        let response = normalize_text(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready");
        assert_eq!(response.code.as_deref(), Some("CAPABILITY"));
        assert_eq!(
            response.code_data.get("capability"),
            Some(&Attribute::List(vec![
                Attribute::Atom("IMAP4rev1".into()),
                Attribute::Atom("AUTH=PLAIN".into()),
            ]))
        );
    }

    #[test]
    fn no_code_when_first_attribute_is_not_a_section() {
        let response = normalize_text(b"W1 OK done");
        assert_eq!(response.code, None);
        assert_eq!(response.human_readable.as_deref(), Some("done"));
    }
}
