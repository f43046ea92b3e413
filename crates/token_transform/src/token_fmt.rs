//! Deterministic one-line token formatting for golden tests and the CLI.
//!
//! Attribute order is preserved. Attribute sides that are plain text print as
//! quoted strings; anything else prints as a parenthesised token list.

use std::fmt::Write;

use crate::shared::{KeyValue, Tag, Token, tokens_to_text};

pub fn format_token(token: &Token) -> String {
    match token {
        Token::OpenTag(tag) => format_tag("START", tag),
        Token::SelfClosingTag(tag) => format_tag("SELF", tag),
        Token::EndTag(tag) => format!("END name={}", tag.name),
        Token::Text(text) => format!("TEXT \"{}\"", escape_text(text)),
        Token::Newline { .. } => "NL".to_string(),
        Token::Comment { text, .. } => format!("COMMENT \"{}\"", escape_text(text)),
        Token::EndOfInput => "EOF".to_string(),
    }
}

pub fn format_tokens(tokens: &[Token]) -> Vec<String> {
    tokens.iter().map(format_token).collect()
}

fn format_tag(label: &str, tag: &Tag) -> String {
    let mut out = String::new();
    out.push_str(label);
    out.push_str(" name=");
    out.push_str(&tag.name);
    out.push_str(" attrs=[");
    for (i, attr) in tag.attrs.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        format_attr(&mut out, attr);
    }
    out.push(']');
    if !tag.data.is_empty() {
        out.push_str(" data={");
        for (i, (key, value)) in tag.data.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(&mut out, "{key}=\"{}\"", escape_text(value));
        }
        out.push('}');
    }
    out
}

fn format_attr(out: &mut String, attr: &KeyValue) {
    format_side(out, &attr.k);
    if !attr.v.is_empty() {
        out.push('=');
        format_side(out, &attr.v);
    }
}

fn format_side(out: &mut String, tokens: &[Token]) {
    match tokens_to_text(tokens) {
        Some(text) => {
            let _ = write!(out, "\"{}\"", escape_text(&text));
        }
        None => {
            out.push('(');
            for (i, token) in tokens.iter().enumerate() {
                if i > 0 {
                    out.push_str("; ");
                }
                out.push_str(&format_token(token));
            }
            out.push(')');
        }
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch < ' ' || ch == '\u{7f}' => {
                let _ = write!(&mut out, "\\u{{{:02X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_tags_with_attributes() {
        let token = Token::OpenTag(Tag::new("a").with_attrs(vec![
            KeyValue::literal("href", "x\"y"),
            KeyValue::literal("hidden", ""),
        ]));
        assert_eq!(
            format_token(&token),
            "START name=a attrs=[\"href\"=\"x\\\"y\" \"hidden\"]"
        );
    }

    #[test]
    fn formats_nested_attribute_tokens() {
        let token = Token::SelfClosingTag(Tag::new("img").with_attrs(vec![KeyValue::new(
            vec![Token::text("src")],
            vec![Token::text("a"), Token::EndOfInput],
        )]));
        assert_eq!(
            format_token(&token),
            "SELF name=img attrs=[\"src\"=(TEXT \"a\"; EOF)]"
        );
    }

    #[test]
    fn formats_simple_tokens() {
        assert_eq!(format_token(&Token::text("a\nb")), "TEXT \"a\\nb\"");
        assert_eq!(format_token(&Token::newline()), "NL");
        assert_eq!(format_token(&Token::comment("c")), "COMMENT \"c\"");
        assert_eq!(format_token(&Token::close("a")), "END name=a");
        assert_eq!(format_token(&Token::EndOfInput), "EOF");
    }
}
