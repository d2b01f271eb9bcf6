//! Character-level terminals
//!
//! Strings reach the parser as one `Char` token per character. These
//! terminals look at the run of consecutive `Char` tokens starting at the
//! current position and match text against it. A match of `n` characters
//! consumes exactly `n` tokens. The run is borrowed from the string the
//! lexer attached to each character, so no attempt copies text.

use regex::Regex;

use crate::combinator::{Outcome, Parsed, Parser, Payload, TokenRange};
use crate::lexer::Token;

/// The text spelled by the consecutive `Char` tokens starting at `start`
pub fn char_run(tokens: &[Token], start: usize) -> &str {
    tokens.get(start).map(Token::rest).unwrap_or_default()
}

fn matched<T: Payload>(start: usize, text: &str) -> Outcome<T> {
    let width = text.chars().count();
    Outcome::Matched(Parsed::new(
        TokenRange::new(start, start + width),
        T::text(text.to_string()),
    ))
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Exactly the character `expected`
pub fn specific_char<T: Payload>(expected: char) -> Parser<T> {
    Parser::terminal(move |tokens, start| {
        match tokens.get(start).and_then(|t| t.kind.as_char()) {
            Some(c) if c == expected => matched(start, &c.to_string()),
            _ => Outcome::NoMatch,
        }
    })
}

/// Exactly the characters of `expected`, in order
pub fn specific_string<T: Payload>(expected: &'static str) -> Parser<T> {
    Parser::terminal(move |tokens, start| {
        if char_run(tokens, start).starts_with(expected) {
            matched(start, expected)
        } else {
            Outcome::NoMatch
        }
    })
}

/// Like [`specific_string`], but refuses to match the prefix of a longer
/// identifier (`else` does not match the start of `elsewhere`)
pub fn keyword<T: Payload>(word: &'static str) -> Parser<T> {
    let inner = specific_string::<T>(word);
    Parser::terminal(move |tokens, start| match inner.parse(tokens, start) {
        Outcome::Matched(parsed) => {
            let next = tokens.get(parsed.range.end).and_then(|t| t.kind.as_char());
            match next {
                Some(c) if is_identifier_char(c) => Outcome::NoMatch,
                _ => Outcome::Matched(parsed),
            }
        }
        other => other,
    })
}

/// The longest non-empty run of characters not containing `end`
///
/// Fails when the run is empty or starts with `end`.
pub fn string_until<T: Payload>(end: &'static str) -> Parser<T> {
    Parser::terminal(move |tokens, start| {
        let run = char_run(tokens, start);
        if run.is_empty() {
            return Outcome::NoMatch;
        }
        match run.find(end) {
            Some(0) => Outcome::NoMatch,
            Some(index) => matched(start, &run[..index]),
            None => matched(start, run),
        }
    })
}

/// A match of `pattern` anchored at the current position
pub fn regexp<T: Payload>(pattern: &'static Regex) -> Parser<T> {
    Parser::terminal(move |tokens, start| {
        let run = char_run(tokens, start);
        match pattern.find(run) {
            Some(m) if m.start() == 0 && !m.as_str().is_empty() => matched(start, m.as_str()),
            _ => Outcome::NoMatch,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::to_tokens;
    use lazy_static::lazy_static;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Text(String);

    impl Payload for Text {
        fn unit() -> Self {
            Text(String::new())
        }
        fn text(text: String) -> Self {
            Text(text)
        }
        fn repeat(_: Vec<Parsed<Self>>) -> Self {
            Text(String::new())
        }
        fn optional(_: Option<Parsed<Self>>) -> Self {
            Text(String::new())
        }
    }

    lazy_static! {
        static ref DIGITS: Regex = Regex::new(r"[0-9]+").unwrap();
    }

    fn run(parser: &Parser<Text>, input: &str, start: usize) -> Option<(String, TokenRange)> {
        let tokens = to_tokens(&json!(input));
        parser
            .parse(&tokens, start)
            .matched()
            .map(|p| (p.value.0, p.range))
    }

    #[test]
    fn test_char_run_stops_at_string_end() {
        let tokens = to_tokens(&json!("abc"));
        assert_eq!(char_run(&tokens, 1), "abc");
        assert_eq!(char_run(&tokens, 3), "c");
        assert_eq!(char_run(&tokens, 4), "");
    }

    #[test]
    fn test_specific_string() {
        let p = specific_string::<Text>("{{");
        assert_eq!(
            run(&p, "{{x", 1),
            Some(("{{".to_string(), TokenRange::new(1, 3)))
        );
        assert_eq!(run(&p, "{x", 1), None);
        assert_eq!(run(&p, "{", 1), None);
    }

    #[test]
    fn test_keyword_boundary() {
        let p = keyword::<Text>("else");
        assert!(run(&p, "else", 1).is_some());
        assert!(run(&p, "else if", 1).is_some());
        assert!(run(&p, "elsewhere", 1).is_none());
    }

    #[test]
    fn test_string_until() {
        let p = string_until::<Text>("{{");
        assert_eq!(
            run(&p, "ab{{c}}", 1),
            Some(("ab".to_string(), TokenRange::new(1, 3)))
        );
        assert_eq!(run(&p, "{{c}}", 1), None);
        assert_eq!(
            run(&p, "plain", 1),
            Some(("plain".to_string(), TokenRange::new(1, 6)))
        );
        assert_eq!(run(&p, "", 1), None);
    }

    #[test]
    fn test_string_until_counts_characters() {
        let p = string_until::<Text>("{{");
        assert_eq!(
            run(&p, "héllo{{", 1),
            Some(("héllo".to_string(), TokenRange::new(1, 6)))
        );
    }

    #[test]
    fn test_regexp_is_anchored() {
        let p = regexp::<Text>(&DIGITS);
        assert_eq!(
            run(&p, "42 apples", 1),
            Some(("42".to_string(), TokenRange::new(1, 3)))
        );
        assert_eq!(run(&p, "apples 42", 1), None);
    }
}
