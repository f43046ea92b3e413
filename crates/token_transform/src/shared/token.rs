//! Token model shared by every transform phase.
//!
//! Tokens are owned values. A transform that rewrites a token produces new
//! tokens; nothing downstream holds references into an earlier chunk.

use std::collections::BTreeMap;

/// Byte range into the wikitext source the token was lexed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceRange {
    pub start: usize,
    pub end: usize,
}

impl SourceRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "source range start must be <= end");
        Self { start, end }
    }
}

/// String-keyed annotations attached to tags by earlier passes.
pub type DataBag = BTreeMap<String, String>;

/// One attribute: key and value are both token sequences, since either side
/// may contain templates that need expansion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KeyValue {
    pub k: Vec<Token>,
    pub v: Vec<Token>,
    pub src: Option<SourceRange>,
}

impl KeyValue {
    pub fn new(k: Vec<Token>, v: Vec<Token>) -> Self {
        Self { k, v, src: None }
    }

    /// Attribute with plain text on both sides. Empty strings become empty
    /// token lists.
    pub fn literal(k: &str, v: &str) -> Self {
        Self::new(text_tokens(k), text_tokens(v))
    }

    /// Both sides are already final: empty, or a single text token.
    pub fn is_literal(&self) -> bool {
        is_literal_tokens(&self.k) && is_literal_tokens(&self.v)
    }

    pub fn key_text(&self) -> Option<String> {
        tokens_to_text(&self.k)
    }

    pub fn value_text(&self) -> Option<String> {
        tokens_to_text(&self.v)
    }
}

fn text_tokens(s: &str) -> Vec<Token> {
    if s.is_empty() {
        Vec::new()
    } else {
        vec![Token::Text(s.to_string())]
    }
}

/// True for an empty list or a single text token.
pub fn is_literal_tokens(tokens: &[Token]) -> bool {
    matches!(tokens, [] | [Token::Text(_)])
}

/// Flattens a token list to a string when it only holds text and newlines.
pub fn tokens_to_text(tokens: &[Token]) -> Option<String> {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Newline { .. } => out.push('\n'),
            _ => return None,
        }
    }
    Some(out)
}

/// Removes every end-of-input marker, keeping the order of the rest.
pub fn strip_eof(mut tokens: Vec<Token>) -> Vec<Token> {
    tokens.retain(|token| !token.is_eof());
    tokens
}

#[cfg(feature = "serde")]
fn fold_tag_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name = <String as serde::Deserialize>::deserialize(deserializer)?;
    Ok(name.to_ascii_lowercase())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    /// ASCII-lowercase folded.
    #[cfg_attr(feature = "serde", serde(deserialize_with = "fold_tag_name"))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attrs: Vec<KeyValue>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: DataBag,
    #[cfg_attr(feature = "serde", serde(default))]
    pub src: Option<SourceRange>,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Case-insensitive, so tags built through the public field match too.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn with_attrs(mut self, attrs: Vec<KeyValue>) -> Self {
        self.attrs = attrs;
        self
    }

    /// Last attribute whose key flattens to `key`.
    pub fn attr(&self, key: &str) -> Option<&KeyValue> {
        self.attrs
            .iter()
            .rev()
            .find(|kv| kv.key_text().is_some_and(|k| k.trim() == key))
    }

    pub fn set_data(&mut self, key: &str, value: impl Into<String>) {
        self.data.insert(key.to_string(), value.into());
    }
}

/// Lexical token flowing through the transform phases.
///
/// Invariant: a complete top-level stream ends with exactly one
/// `EndOfInput`, which is the last token of the last chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "snake_case")
)]
pub enum Token {
    OpenTag(Tag),
    EndTag(Tag),
    SelfClosingTag(Tag),
    Text(String),
    Newline {
        #[cfg_attr(feature = "serde", serde(default))]
        src: Option<SourceRange>,
    },
    Comment {
        text: String,
        #[cfg_attr(feature = "serde", serde(default))]
        src: Option<SourceRange>,
    },
    EndOfInput,
}

/// Coarse token classification used to key transform registrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Tag,
    Text,
    Newline,
    Comment,
    End,
}

impl Token {
    pub fn text(value: impl Into<String>) -> Self {
        Token::Text(value.into())
    }

    pub fn open(name: &str) -> Self {
        Token::OpenTag(Tag::new(name))
    }

    pub fn close(name: &str) -> Self {
        Token::EndTag(Tag::new(name))
    }

    pub fn self_closing(name: &str) -> Self {
        Token::SelfClosingTag(Tag::new(name))
    }

    pub fn newline() -> Self {
        Token::Newline { src: None }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Token::Comment {
            text: text.into(),
            src: None,
        }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::OpenTag(_) | Token::EndTag(_) | Token::SelfClosingTag(_) => TokenKind::Tag,
            Token::Text(_) => TokenKind::Text,
            Token::Newline { .. } => TokenKind::Newline,
            Token::Comment { .. } => TokenKind::Comment,
            Token::EndOfInput => TokenKind::End,
        }
    }

    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Token::OpenTag(tag) | Token::EndTag(tag) | Token::SelfClosingTag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn tag_mut(&mut self) -> Option<&mut Tag> {
        match self {
            Token::OpenTag(tag) | Token::EndTag(tag) | Token::SelfClosingTag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag().map(|tag| tag.name.as_str())
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Token::EndOfInput)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Token::Text(_))
    }

    /// Builder-style attribute replacement for tag tokens; other tokens are
    /// returned untouched.
    pub fn with_attrs(mut self, attrs: Vec<KeyValue>) -> Self {
        if let Some(tag) = self.tag_mut() {
            tag.attrs = attrs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_folded() {
        let token = Token::open("DIV");
        assert_eq!(token.tag_name(), Some("div"));
        assert_eq!(token.kind(), TokenKind::Tag);
    }

    #[test]
    fn tag_name_match_ignores_case() {
        let tag = Tag {
            name: "Template".to_string(),
            ..Tag::default()
        };
        assert!(tag.is_named("template"));
        assert!(!tag.is_named("templatearg"));
    }

    #[test]
    fn literal_attributes() {
        assert!(KeyValue::literal("href", "x").is_literal());
        assert!(KeyValue::literal("", "").is_literal());
        let templated = KeyValue::new(
            vec![Token::text("href")],
            vec![Token::text("a"), Token::self_closing("template")],
        );
        assert!(!templated.is_literal());
        let single_tag = KeyValue::new(vec![], vec![Token::self_closing("template")]);
        assert!(!single_tag.is_literal());
    }

    #[test]
    fn attr_lookup_uses_last_binding() {
        let tag = Tag::new("a").with_attrs(vec![
            KeyValue::literal("href", "first"),
            KeyValue::literal(" href ", "second"),
        ]);
        assert_eq!(
            tag.attr("href").and_then(KeyValue::value_text).as_deref(),
            Some("second")
        );
    }

    #[test]
    fn strip_eof_keeps_order() {
        let tokens = vec![
            Token::text("a"),
            Token::EndOfInput,
            Token::newline(),
            Token::EndOfInput,
        ];
        assert_eq!(strip_eof(tokens), vec![Token::text("a"), Token::newline()]);
    }

    #[test]
    fn flatten_text_and_newlines() {
        let tokens = vec![Token::text("a"), Token::newline(), Token::text("b")];
        assert_eq!(tokens_to_text(&tokens).as_deref(), Some("a\nb"));
        assert_eq!(tokens_to_text(&[Token::open("b")]), None);
    }
}
