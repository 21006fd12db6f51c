//! Key pattern translation for pattern-based invalidation.
//!
//! Patterns are glob-like:
//!
//! - `*` matches one or more characters, excluding the key separator
//! - `**` matches one or more characters of any kind, newlines included
//!
//! A pattern is turned into two independent predicates that are ANDed in a
//! single `DELETE`:
//!
//! ```
//! use sql_cache::pattern::{pattern_to_like, pattern_to_regex};
//!
//! // Coarse LIKE prefilter, lets the engine skip most rows cheaply
//! assert_eq!(pattern_to_like("user:*:profile"), "user:%:profile");
//!
//! // Exact, anchored regular expression
//! assert_eq!(pattern_to_regex("user:*", ':'), "^user:[^:]+$");
//! ```
//!
//! The LIKE string always selects a superset of what the regular expression
//! selects. Only the regular expression decides correctness.

use regex::Regex;
use std::sync::OnceLock;

/// Escape character used in the `LIKE ... ESCAPE` clause.
///
/// `!` has no special meaning in MySQL or SQLite string literals, so the same
/// clause works for both dialects.
pub const LIKE_ESCAPE: char = '!';

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    /// `*`
    Segment,
    /// `**`
    Any,
}

fn tokenize(pattern: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = pattern.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'*' {
            i += 1;
            continue;
        }

        if start < i {
            tokens.push(Token::Literal(&pattern[start..i]));
        }

        if bytes.get(i + 1) == Some(&b'*') {
            tokens.push(Token::Any);
            i += 2;
        } else {
            tokens.push(Token::Segment);
            i += 1;
        }
        start = i;
    }

    if start < bytes.len() {
        tokens.push(Token::Literal(&pattern[start..]));
    }

    tokens
}

/// Translate a key pattern into a `LIKE` prefilter.
///
/// Every run of wildcards collapses to a single `%`. Literal `%`, `_` and the
/// escape character itself are escaped with [`LIKE_ESCAPE`], so the statement
/// must use `LIKE ? ESCAPE '!'`.
pub fn pattern_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    let mut in_wildcard = false;

    for token in tokenize(pattern) {
        match token {
            Token::Segment | Token::Any => {
                if !in_wildcard {
                    like.push('%');
                }
                in_wildcard = true;
            }
            Token::Literal(text) => {
                in_wildcard = false;
                for ch in text.chars() {
                    if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
                        like.push(LIKE_ESCAPE);
                    }
                    like.push(ch);
                }
            }
        }
    }

    like
}

/// Translate a key pattern into an anchored regular expression.
///
/// `*` becomes `[^sep]+` and `**` becomes `[\s\S]+`. Literal parts are
/// escaped. `**` accepts every key `*` accepts, `\n` included, which `.`
/// would not in the `regex` crate or MySQL's ICU engine.
pub fn pattern_to_regex(pattern: &str, separator: char) -> String {
    let sep = regex::escape(separator.encode_utf8(&mut [0u8; 4]));
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');

    for token in tokenize(pattern) {
        match token {
            Token::Literal(text) => re.push_str(&regex::escape(text)),
            Token::Segment => {
                re.push_str("[^");
                re.push_str(&sep);
                re.push_str("]+");
            }
            Token::Any => re.push_str(r"[\s\S]+"),
        }
    }

    re.push('$');
    re
}

/// A translated key pattern, ready to be bound to a deletion statement.
///
/// The database evaluates the expression. A local [`Regex`] is only compiled
/// when [`KeyPattern::matches`] is called.
#[derive(Clone, Debug)]
pub struct KeyPattern {
    like: String,
    regex: String,
    compiled: OnceLock<Option<Regex>>,
}

impl KeyPattern {
    /// Translate `pattern` (already namespaced) using `separator`.
    pub fn new(pattern: &str, separator: char) -> Self {
        KeyPattern {
            like: pattern_to_like(pattern),
            regex: pattern_to_regex(pattern, separator),
            compiled: OnceLock::new(),
        }
    }

    /// The `LIKE` prefilter.
    pub fn like(&self) -> &str {
        &self.like
    }

    /// The anchored regular expression.
    pub fn regex(&self) -> &str {
        &self.regex
    }

    /// Evaluate the exact predicate locally.
    ///
    /// Returns `false` for every key if the expression does not compile.
    pub fn matches(&self, key: &str) -> bool {
        self.compiled
            .get_or_init(|| match Regex::new(&self.regex) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("⚠ Key pattern {} does not compile: {}", self.regex, e);
                    None
                }
            })
            .as_ref()
            .is_some_and(|re| re.is_match(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("a*b**c***"),
            vec![
                Token::Literal("a"),
                Token::Segment,
                Token::Literal("b"),
                Token::Any,
                Token::Literal("c"),
                Token::Any,
                Token::Segment,
            ]
        );
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_like_collapses_wildcards() {
        assert_eq!(pattern_to_like("user.*"), "user.%");
        assert_eq!(pattern_to_like("user.**"), "user.%");
        assert_eq!(pattern_to_like("a***b"), "a%b");
        assert_eq!(pattern_to_like("*"), "%");
    }

    #[test]
    fn test_like_escapes_metacharacters() {
        assert_eq!(pattern_to_like("50%_off!*"), "50!%!_off!!%");
    }

    #[test]
    fn test_regex_translation() {
        assert_eq!(pattern_to_regex("user.*", '.'), r"^user\.[^\.]+$");
        assert_eq!(pattern_to_regex("user.**", '.'), r"^user\.[\s\S]+$");
        assert_eq!(pattern_to_regex("a:*:b", ':'), "^a:[^:]+:b$");
        assert_eq!(pattern_to_regex("plain", ':'), "^plain$");
    }

    #[test]
    fn test_single_star_stops_at_separator() {
        let pattern = KeyPattern::new("user.*", '.');
        assert!(pattern.matches("user.1"));
        assert!(pattern.matches("user.2"));
        assert!(!pattern.matches("user.1.profile"));
        assert!(!pattern.matches("user."));
    }

    #[test]
    fn test_double_star_crosses_separator() {
        let pattern = KeyPattern::new("user.**", '.');
        assert!(pattern.matches("user.1"));
        assert!(pattern.matches("user.1.profile"));
        assert!(!pattern.matches("account.1"));
    }

    #[test]
    fn test_literal_regex_metacharacters() {
        let pattern = KeyPattern::new("price(usd)+*", ':');
        assert!(pattern.matches("price(usd)+10"));
        assert!(!pattern.matches("priceusd10"));
    }

    #[test]
    fn test_key_pattern_accessors() {
        let pattern = KeyPattern::new("app:user:*", ':');
        assert_eq!(pattern.like(), "app:user:%");
        assert_eq!(pattern.regex(), "^app:user:[^:]+$");
    }

    #[test]
    fn test_double_star_matches_newlines_like_single_star() {
        let segment = KeyPattern::new("a:*", ':');
        let any = KeyPattern::new("a:**", ':');

        assert!(segment.matches("a:x\ny"));
        assert!(any.matches("a:x\ny"));
        assert!(any.matches("a:\n:\n"));
    }

    #[test]
    fn test_matches_compiles_once() {
        let pattern = KeyPattern::new("a:*", ':');
        assert!(pattern.matches("a:1"));
        assert!(pattern.matches("a:2"));
        assert!(pattern.compiled.get().is_some_and(|re| re.is_some()));
    }
}
