//! Text predicate: a length gate and a keyword gate, both required.
//!
//! Keywords made only of ASCII word characters (`[A-Za-z0-9_]`) must stand
//! on their own: the characters immediately before and after the hit must not
//! be ASCII word characters. Any other keyword (CJK, mixed punctuation, ...)
//! matches as a plain substring, since those scripts have no spaces to
//! delimit words. In pattern mode each keyword is a regular expression instead.
//! Keywords are OR-ed; an empty keyword list matches nothing. Keywords are
//! NFC-normalised like record text, so a decomposed keyword still finds its
//! composed spelling.

use crate::record::normalize;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("min length {min} exceeds max length {max}")]
    InvertedBounds { min: usize, max: usize },

    #[error("empty keyword would match every record")]
    EmptyKeyword,

    #[error("invalid keyword pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// How configured keywords are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Literal keywords with the ASCII word-boundary rule.
    #[default]
    Literal,
    /// Each keyword is a regular expression.
    Pattern,
}

/// One compiled keyword.
#[derive(Debug, Clone)]
pub enum KeywordRule {
    /// ASCII word keyword, matched with boundaries.
    Word(Regex),
    /// Plain substring containment.
    Substring(String),
    /// User-supplied regular expression.
    Pattern(Regex),
}

impl KeywordRule {
    /// Compile a literal keyword, picking the rule by its script.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::EmptyKeyword`] for an empty keyword.
    pub fn literal(keyword: &str) -> Result<Self, MatcherError> {
        if keyword.is_empty() {
            return Err(MatcherError::EmptyKeyword);
        }
        if keyword.bytes().all(is_ascii_word) {
            let pattern = format!(
                "(?:^|[^0-9A-Za-z_]){}(?:[^0-9A-Za-z_]|$)",
                regex::escape(keyword)
            );
            let re = Regex::new(&pattern).map_err(|source| MatcherError::InvalidPattern {
                pattern,
                source,
            })?;
            Ok(Self::Word(re))
        } else {
            Ok(Self::Substring(keyword.to_string()))
        }
    }

    /// Compile a regular-expression keyword.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or invalid patterns.
    pub fn pattern(pattern: &str) -> Result<Self, MatcherError> {
        if pattern.is_empty() {
            return Err(MatcherError::EmptyKeyword);
        }
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| MatcherError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Word(re) | Self::Pattern(re) => re.is_match(text),
            Self::Substring(needle) => text.contains(needle.as_str()),
        }
    }
}

const fn is_ascii_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Compiled predicate.
#[derive(Debug, Clone)]
pub struct Matcher {
    min_len: usize,
    max_len: usize,
    rules: Vec<KeywordRule>,
    keywords: Vec<String>,
}

impl Matcher {
    /// Build a matcher over inclusive character-count bounds.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError`] if `min_len > max_len` or any keyword is
    /// empty or (in pattern mode) invalid.
    pub fn new<S: AsRef<str>>(
        min_len: usize,
        max_len: usize,
        keywords: &[S],
        mode: MatchMode,
    ) -> Result<Self, MatcherError> {
        if min_len > max_len {
            return Err(MatcherError::InvertedBounds {
                min: min_len,
                max: max_len,
            });
        }
        let keywords: Vec<String> = keywords.iter().map(|k| normalize(k.as_ref())).collect();
        let rules = keywords
            .iter()
            .map(|k| match mode {
                MatchMode::Literal => KeywordRule::literal(k),
                MatchMode::Pattern => KeywordRule::pattern(k),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            min_len,
            max_len,
            rules,
            keywords,
        })
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    #[must_use]
    pub const fn bounds(&self) -> (usize, usize) {
        (self.min_len, self.max_len)
    }

    /// Whether `text` passes both gates.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.matching_keyword(text).is_some()
    }

    /// The first keyword (in configured order) that accepts `text`, if the
    /// length gate passes.
    #[must_use]
    pub fn matching_keyword(&self, text: &str) -> Option<&str> {
        let len = text.chars().count();
        if len < self.min_len || len > self.max_len {
            return None;
        }
        self.rules
            .iter()
            .position(|rule| rule.is_match(text))
            .map(|i| self.keywords[i].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_selection_by_script() {
        assert!(matches!(KeywordRule::literal("rust_1").unwrap(), KeywordRule::Word(_)));
        assert!(matches!(KeywordRule::literal("ももクロ").unwrap(), KeywordRule::Substring(_)));
        assert!(matches!(KeywordRule::literal("c++").unwrap(), KeywordRule::Substring(_)));
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        let m = Matcher::new(4, 4, &["ク"], MatchMode::Literal).unwrap();
        assert!(m.matches("ももクロ"));
        assert!(!m.matches("ももクロ!"));
    }
}
