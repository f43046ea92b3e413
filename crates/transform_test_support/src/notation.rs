//! Compact one-token-per-line notation for fixtures.
//!
//! ```text
//! START a href="{{ref}}" class="x"
//! SELF br
//! END a
//! TEXT "Hello {{{1|world}}}!"
//! NL
//! COMMENT "note"
//! EOF
//! ```
//!
//! Quoted strings may embed `{{title|arg|name=value}}` template calls and
//! `{{{name|default}}}` argument references; both nest. A `TEXT` line whose
//! string embeds calls yields several tokens.

use token_transform::{KeyValue, Tag, Token, template_arg_token, template_token};

pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Token>, String> {
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let tokens = parse_line(line.as_ref()).map_err(|err| format!("line {}: {err}", idx + 1))?;
        out.extend(tokens);
    }
    Ok(out)
}

pub fn parse_line(line: &str) -> Result<Vec<Token>, String> {
    let line = line.trim();
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match head {
        "START" | "SELF" => {
            let tag = parse_tag(rest)?;
            Ok(vec![if head == "START" {
                Token::OpenTag(tag)
            } else {
                Token::SelfClosingTag(tag)
            }])
        }
        "END" if !rest.is_empty() => Ok(vec![Token::close(rest)]),
        "TEXT" => {
            let mut cursor = Cursor::new(rest);
            let text = cursor.quoted()?;
            cursor.expect_end()?;
            parse_segments(&text)
        }
        "COMMENT" => {
            let mut cursor = Cursor::new(rest);
            let text = cursor.quoted()?;
            cursor.expect_end()?;
            Ok(vec![Token::comment(text)])
        }
        "NL" if rest.is_empty() => Ok(vec![Token::newline()]),
        "EOF" if rest.is_empty() => Ok(vec![Token::EndOfInput]),
        _ => Err(format!("unrecognised token line '{line}'")),
    }
}

fn parse_tag(rest: &str) -> Result<Tag, String> {
    let mut cursor = Cursor::new(rest);
    let name = cursor.word();
    if name.is_empty() {
        return Err("tag line without a name".to_string());
    }
    let mut attrs = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            break;
        }
        let key = if cursor.peek() == Some('"') {
            cursor.quoted()?
        } else {
            cursor.word_until('=')
        };
        let value = if cursor.eat('=') {
            cursor.quoted()?
        } else {
            String::new()
        };
        attrs.push(KeyValue::new(parse_segments(&key)?, parse_segments(&value)?));
    }
    Ok(Tag::new(&name).with_attrs(attrs))
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    fn at_end(&self) -> bool {
        self.rest.is_empty()
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn eat(&mut self, ch: char) -> bool {
        match self.rest.strip_prefix(ch) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn word(&mut self) -> String {
        self.word_until(' ')
    }

    fn word_until(&mut self, stop: char) -> String {
        let end = self
            .rest
            .find(|c: char| c == stop || c.is_whitespace())
            .unwrap_or(self.rest.len());
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        word.to_string()
    }

    fn quoted(&mut self) -> Result<String, String> {
        if !self.eat('"') {
            return Err(format!("expected a quoted string at '{}'", self.rest));
        }
        let mut out = String::new();
        let mut chars = self.rest.char_indices();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.rest = &self.rest[idx + 1..];
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                _ => out.push(ch),
            }
        }
        Err("unterminated quoted string".to_string())
    }

    fn expect_end(&mut self) -> Result<(), String> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(format!("trailing input '{}'", self.rest))
        }
    }
}

/// Splits a string into text and template tokens.
pub fn parse_segments(input: &str) -> Result<Vec<Token>, String> {
    let mut parser = SegmentParser { input, pos: 0 };
    let tokens = parser.sequence(&[])?;
    if parser.pos < input.len() {
        return Err(format!("unbalanced braces in '{input}'"));
    }
    Ok(tokens)
}

struct SegmentParser<'a> {
    input: &'a str,
    pos: usize,
}

impl SegmentParser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn sequence(&mut self, stops: &[&str]) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        let mut text = String::new();
        while !self.rest().is_empty() {
            if stops.iter().any(|stop| self.rest().starts_with(stop)) {
                break;
            }
            if self.rest().starts_with("{{{") {
                flush_text(&mut text, &mut tokens);
                tokens.push(self.template_arg()?);
            } else if self.rest().starts_with("{{") {
                flush_text(&mut text, &mut tokens);
                tokens.push(self.template()?);
            } else if self.rest().starts_with("}}") && stops.is_empty() {
                return Err(format!("stray '}}}}' in '{}'", self.input));
            } else if let Some(ch) = self.rest().chars().next() {
                text.push(ch);
                self.pos += ch.len_utf8();
            }
        }
        flush_text(&mut text, &mut tokens);
        Ok(tokens)
    }

    fn expect(&mut self, close: &str) -> Result<(), String> {
        if self.rest().starts_with(close) {
            self.pos += close.len();
            Ok(())
        } else {
            Err(format!("expected '{close}' in '{}'", self.input))
        }
    }

    fn template_arg(&mut self) -> Result<Token, String> {
        self.pos += 3;
        let name = self.sequence(&["|", "}}}"])?;
        let name = literal(&name, self.input)?;
        let default = if self.rest().starts_with('|') {
            self.pos += 1;
            Some(self.sequence(&["}}}"])?)
        } else {
            None
        };
        self.expect("}}}")?;
        Ok(template_arg_token(&name, default))
    }

    fn template(&mut self) -> Result<Token, String> {
        self.pos += 2;
        let title = self.sequence(&["|", "}}"])?;
        let title = literal(&title, self.input)?;
        let mut args = Vec::new();
        while self.rest().starts_with('|') {
            self.pos += 1;
            args.push(split_named(self.sequence(&["|", "}}"])?));
        }
        self.expect("}}")?;
        Ok(template_token(&title, args))
    }
}

fn flush_text(text: &mut String, tokens: &mut Vec<Token>) {
    if !text.is_empty() {
        tokens.push(Token::Text(std::mem::take(text)));
    }
}

fn literal(tokens: &[Token], input: &str) -> Result<String, String> {
    token_transform::shared::tokens_to_text(tokens)
        .ok_or_else(|| format!("template name must be plain text in '{input}'"))
}

/// `name=value` when the leading text holds `=`, positional otherwise.
fn split_named(mut tokens: Vec<Token>) -> KeyValue {
    if let Some(Token::Text(first)) = tokens.first()
        && let Some((name, value)) = first.split_once('=')
    {
        let name = name.to_string();
        let value = value.to_string();
        if value.is_empty() {
            tokens.remove(0);
        } else {
            tokens[0] = Token::Text(value);
        }
        return KeyValue::new(vec![Token::Text(name)], tokens);
    }
    KeyValue::new(Vec::new(), tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use token_transform::format_tokens;

    #[test]
    fn parses_plain_lines() {
        let tokens =
            parse_lines(&["START p class=\"x\"", "TEXT \"a\\\"b\"", "NL", "END p", "EOF"])
                .unwrap();
        assert_eq!(
            format_tokens(&tokens),
            vec![
                "START name=p attrs=[\"class\"=\"x\"]",
                "TEXT \"a\\\"b\"",
                "NL",
                "END name=p",
                "EOF",
            ]
        );
    }

    #[test]
    fn embedded_calls_become_template_tokens() {
        let tokens = parse_line("TEXT \"a{{T|x|k=v}}b\"").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1], template_token("T", vec![
            KeyValue::new(Vec::new(), vec![Token::text("x")]),
            KeyValue::literal("k", "v"),
        ]));
    }

    #[test]
    fn nested_argument_defaults() {
        let tokens = parse_segments("{{{1|{{D}}}}}").unwrap();
        assert_eq!(
            tokens,
            vec![template_arg_token("1", Some(vec![template_token("D", Vec::new())]))]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_line("BOGUS").is_err());
        assert!(parse_line("TEXT \"open").is_err());
        assert!(parse_segments("{{T").is_err());
    }
}
