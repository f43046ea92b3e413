pub mod fixture;
pub mod notation;
pub mod plans;

use token_transform::Token;

pub use token_transform::token_fmt::escape_text;

/// Golden-format lines for a token list.
pub fn token_lines(tokens: &[Token]) -> Vec<String> {
    token_transform::format_tokens(tokens)
}

/// Joins adjacent text tokens. Output chunk boundaries are not part of the
/// conversion contract, and text merging only happens within a chunk.
pub fn coalesce_text(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match (out.last_mut(), token) {
            (Some(Token::Text(prev)), Token::Text(text)) => prev.push_str(&text),
            (_, token) => out.push(token),
        }
    }
    out
}

pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    use std::fmt::Write;
    let max = expected.len().max(actual.len());
    let mut out = String::new();
    let missing = "<missing>";
    let mismatch = (0..max).find(|&i| expected.get(i) != actual.get(i));
    if let Some(i) = mismatch {
        let start = i.saturating_sub(2);
        let end = (i + 3).min(max);
        let _ = writeln!(
            &mut out,
            "first mismatch at line {} (showing {}..={}):",
            i + 1,
            start + 1,
            end
        );
        for line_idx in start..end {
            let left = expected.get(line_idx).map(String::as_str).unwrap_or(missing);
            let right = actual.get(line_idx).map(String::as_str).unwrap_or(missing);
            let marker = if line_idx == i { ">" } else { " " };
            let _ = writeln!(&mut out, "{marker} {:>4}  expected: {left}", line_idx + 1);
            let _ = writeln!(&mut out, "{marker} {:>4}    actual: {right}", line_idx + 1);
        }
    }
    let _ = writeln!(
        &mut out,
        "expected {} lines, actual {} lines",
        expected.len(),
        actual.len()
    );
    out
}

/// Panics with a line diff when the formatted tokens differ.
pub fn assert_token_lines(label: &str, expected: &[String], actual: &[Token]) {
    let actual = token_lines(actual);
    if expected != actual.as_slice() {
        panic!("{label}: token mismatch\n{}", diff_lines(expected, &actual));
    }
}

#[cfg(test)]
mod tests {
    use super::diff_lines;
    use token_transform::Token;

    #[test]
    fn deserialized_tag_names_are_folded() {
        let json = r#"{"type": "open_tag", "value": {"name": "DIV"}}"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert_eq!(token, Token::open("div"));
    }

    #[test]
    fn diff_points_at_first_mismatch() {
        let expected = vec!["A".to_string(), "B".to_string()];
        let actual = vec!["A".to_string(), "C".to_string(), "D".to_string()];
        let diff = diff_lines(&expected, &actual);
        assert!(diff.contains("first mismatch at line 2"), "{diff}");
        assert!(diff.contains("expected 2 lines, actual 3 lines"), "{diff}");
    }
}
