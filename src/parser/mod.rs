//! Response parser for framed IMAP text.
//!
//! The parser turns one complete framed response (as handed off by
//! [`crate::framer::Framer`]) into a [`ResponseAst`]. It is modeled as a
//! trait so a caller may swap in a grammar-complete implementation; this
//! module ships [`SimpleParser`], a reference implementation sufficient to
//! exercise every dispatcher rule in the specification: tagged and untagged
//! responses, numeric-untagged forms, bracketed response codes, and
//! trailing human-readable text.

mod ast;
mod lexer;

pub use ast::{Attribute, ResponseAst};
pub use lexer::{Lexer, Token, is_atom_char};

use crate::Result;

/// Response codes that may carry a bracketed `[CODE ...]` section per RFC 3501 §7.1.
const RESPONSE_CODE_COMMANDS: [&str; 5] = ["OK", "NO", "BAD", "BYE", "PREAUTH"];

/// Parses framed response text into a [`ResponseAst`].
///
/// Implementations must not assume they are called with a trailing line
/// terminator: the framer strips CRLF/LF before handing text off.
pub trait Parser: Send + Sync {
    /// Parses one complete framed response.
    ///
    /// # Errors
    /// Returns [`crate::Error::Parser`] if `text` is not well-formed.
    fn parse(&self, text: &[u8]) -> Result<ResponseAst>;
}

/// Reference [`Parser`] implementation built on [`Lexer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleParser;

impl Parser for SimpleParser {
    fn parse(&self, text: &[u8]) -> Result<ResponseAst> {
        let mut lexer = Lexer::new(text);

        let tag = match lexer.next_token()? {
            Token::Asterisk => "*".to_string(),
            Token::Atom(s) => s.to_string(),
            other => return Err(parse_error(&lexer, &format!("expected tag, got {other:?}"))),
        };
        lexer.expect_space()?;

        let command = match lexer.next_token()? {
            Token::Atom(s) => s.to_string(),
            Token::Number(n) => n.to_string(),
            other => {
                return Err(parse_error(
                    &lexer,
                    &format!("expected command, got {other:?}"),
                ));
            }
        };

        if lexer.is_eof() {
            return Ok(ResponseAst {
                tag,
                command,
                attributes: Vec::new(),
            });
        }
        lexer.expect_space()?;

        let attributes = if RESPONSE_CODE_COMMANDS.contains(&command.to_ascii_uppercase().as_str())
        {
            parse_response_text(&mut lexer)?
        } else {
            parse_attribute_list(&mut lexer, None)?
        };

        Ok(ResponseAst {
            tag,
            command,
            attributes,
        })
    }
}

/// Parses `["[" resp-text-code "]" SP] text`, per RFC 3501's `resp-text` rule.
fn parse_response_text(lexer: &mut Lexer<'_>) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();

    if lexer.peek() == Some(b'[') {
        lexer.advance();
        let section = parse_attribute_list(lexer, Some(Token::RBracket))?;
        attributes.push(Attribute::Section(section));
        lexer.skip_spaces();
    }

    let rest = lexer.remaining();
    if !rest.is_empty() {
        let text = String::from_utf8_lossy(rest).into_owned();
        attributes.push(Attribute::Text(text));
    }

    Ok(attributes)
}

/// Parses a space-separated run of attributes, optionally terminated by `closing`.
///
/// When `closing` is `None`, consumes to end of input (a top-level attribute
/// list for commands like `CAPABILITY` or `LIST`).
fn parse_attribute_list(lexer: &mut Lexer<'_>, closing: Option<Token<'_>>) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();

    loop {
        lexer.skip_spaces();

        if lexer.is_eof() {
            return Ok(attributes);
        }
        let closes_here = match (&closing, lexer.peek()) {
            (Some(Token::RBracket), Some(b']')) | (Some(Token::RParen), Some(b')')) => true,
            _ => false,
        };
        if closes_here {
            lexer.advance();
            return Ok(attributes);
        }

        let token = lexer.next_token()?;
        let attribute = match token {
            Token::Atom(s) => Attribute::Atom(s.to_string()),
            Token::Number(n) => Attribute::Number(n),
            Token::QuotedString(s) => Attribute::Text(s),
            Token::Literal(data) => Attribute::Text(String::from_utf8_lossy(&data).into_owned()),
            Token::Nil => Attribute::Nil,
            Token::LParen => Attribute::List(parse_attribute_list(lexer, Some(Token::RParen))?),
            Token::LBracket => Attribute::Section(parse_attribute_list(lexer, Some(Token::RBracket))?),
            other => return Err(parse_error(lexer, &format!("unexpected token {other:?}"))),
        };
        attributes.push(attribute);
    }
}

fn parse_error(lexer: &Lexer<'_>, message: &str) -> crate::Error {
    crate::Error::Parser {
        position: lexer.position(),
        message: message.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tagged_ok_with_text() {
        let response = SimpleParser.parse(b"W1 OK done").unwrap();
        assert_eq!(response.tag, "W1");
        assert_eq!(response.command, "OK");
        assert_eq!(response.attributes, vec![Attribute::Text("done".into())]);
    }

    #[test]
    fn tagged_no_with_response_code() {
        let response = SimpleParser
            .parse(b"W4 NO [AUTHENTICATIONFAILED] bad creds")
            .unwrap();
        assert_eq!(response.command, "NO");
        assert_eq!(
            response.attributes,
            vec![
                Attribute::Section(vec![Attribute::Atom("AUTHENTICATIONFAILED".into())]),
                Attribute::Text("bad creds".into()),
            ]
        );
    }

    #[test]
    fn untagged_capability() {
        let response = SimpleParser
            .parse(b"* CAPABILITY IMAP4rev1 AUTH=PLAIN")
            .unwrap();
        assert_eq!(response.tag, "*");
        assert_eq!(response.command, "CAPABILITY");
        assert_eq!(
            response.attributes,
            vec![
                Attribute::Atom("IMAP4rev1".into()),
                Attribute::Atom("AUTH=PLAIN".into()),
            ]
        );
    }

    #[test]
    fn untagged_numeric_form() {
        let response = SimpleParser.parse(b"* 42 EXISTS").unwrap();
        assert_eq!(response.tag, "*");
        assert_eq!(response.command, "42");
        assert_eq!(response.attributes, vec![Attribute::Atom("EXISTS".into())]);
    }

    #[test]
    fn untagged_list_with_flags_and_literal_mailbox() {
        let response = SimpleParser
            .parse(b"* LIST (\\HasChildren) \"/\" INBOX")
            .unwrap();
        assert_eq!(response.command, "LIST");
        assert_eq!(
            response.attributes,
            vec![
                Attribute::List(vec![Attribute::Atom("\\HasChildren".into())]),
                Attribute::Text("/".into()),
                Attribute::Atom("INBOX".into()),
            ]
        );
    }

    #[test]
    fn fetch_with_embedded_literal_body() {
        let response = SimpleParser
            .parse(b"* 1 FETCH (BODY[] {11}\r\nhello world)")
            .unwrap();
        assert_eq!(response.command, "1");
        assert_eq!(
            response.attributes,
            vec![
                Attribute::Atom("FETCH".into()),
                Attribute::List(vec![
                    Attribute::Atom("BODY".into()),
                    Attribute::Section(vec![]),
                    Attribute::Text("hello world".into()),
                ]),
            ]
        );
    }

    #[test]
    fn bare_tagged_ok_no_text() {
        let response = SimpleParser.parse(b"W2 OK").unwrap();
        assert_eq!(response.attributes, Vec::<Attribute>::new());
    }

    #[test]
    fn rejects_missing_tag() {
        assert!(SimpleParser.parse(b"").is_err());
    }
}
