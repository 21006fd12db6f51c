//! Cache key management utilities.

use std::borrow::Cow;

/// Namespace prefix applied to every key and pattern before it reaches storage.
///
/// Several logical caches can share one physical table by using distinct
/// prefixes. The prefix never leaks back to callers: keys returned from bulk
/// reads are stripped with [`KeyNamespace::strip`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        KeyNamespace {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prepend the prefix to a key or pattern.
    pub fn apply<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if self.prefix.is_empty() {
            Cow::Borrowed(key)
        } else {
            Cow::Owned(format!("{}{}", self.prefix, key))
        }
    }

    /// Remove the prefix from a stored key.
    ///
    /// Keys that do not carry the prefix are returned unchanged.
    pub fn strip<'a>(&self, stored: &'a str) -> &'a str {
        stored.strip_prefix(self.prefix.as_str()).unwrap_or(stored)
    }
}
