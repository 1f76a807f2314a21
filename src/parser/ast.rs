//! Generic response AST produced by the parser collaborator.
//!
//! The dispatcher (see [`crate::dispatcher`]) only ever inspects a response
//! through this shape: a tag, a command name, and an ordered list of typed
//! attributes. It never assumes anything about a particular IMAP command's
//! semantics — numeric-untagged normalization and response-code extraction
//! both operate purely on this generic tree.

/// One attribute inside a parsed response.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// An unquoted atom, e.g. `IMAP4rev1` or `\Seen`.
    Atom(String),
    /// A quoted string or literal body, carrying free-form text.
    Text(String),
    /// A bare number, e.g. a sequence number or count.
    Number(u32),
    /// The literal `NIL`.
    Nil,
    /// A parenthesized group, e.g. `(\HasChildren)`.
    List(Vec<Attribute>),
    /// A bracketed group, e.g. `[UIDNEXT 100]` or `[AUTHENTICATIONFAILED]`.
    Section(Vec<Attribute>),
}

impl Attribute {
    /// Returns the atom string if this attribute is an [`Attribute::Atom`].
    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the text if this attribute is an [`Attribute::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner elements if this attribute is a [`Attribute::Section`].
    #[must_use]
    pub fn as_section(&self) -> Option<&[Attribute]> {
        match self {
            Self::Section(items) => Some(items),
            _ => None,
        }
    }
}

/// A single parsed server response, before dispatcher normalization.
///
/// `tag` is `"*"` for untagged responses and the literal tag string (e.g.
/// `"W1"`) for tagged ones. Synthetic continuation responses (`tag == "+"`)
/// are constructed by the dispatcher directly and never flow through the
/// parser (see §4.2 step 1 of the specification).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseAst {
    /// `"*"` for untagged, or the echoed command tag.
    pub tag: String,
    /// The token immediately following the tag: a command name (`OK`,
    /// `CAPABILITY`, ...) or, for numeric-untagged responses, the decimal
    /// digits themselves (e.g. `"17"` in `* 17 EXISTS`).
    pub command: String,
    /// Whatever follows the command, in order.
    pub attributes: Vec<Attribute>,
}
