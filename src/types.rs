//! Core data model: entries, entry kinds, shard ids and key normalization.

use crate::error::EntryError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Shard id used for keys that start with a digit or `_`.
pub const CATCH_ALL_SHARD: &str = "_";

/// Normalizes a display name or query into the searchable key alphabet.
///
/// Lowercases, then drops everything except ASCII letters, digits and `_`:
/// - `PeerFinder_test` → `peerfinder_test`
/// - `pair< int, Json::Value >` → `pairintjsonvalue`
pub fn normalize_key(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// What kind of symbol an entry documents.
///
/// Closed so that ranking by kind stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Namespace,
    Class,
    Struct,
    Function,
    Typedef,
    /// Points outside the local doc set (e.g. cppreference pages).
    #[serde(rename = "external")]
    ExternalReference,
}

impl EntryKind {
    /// Ranking tier: lower sorts first.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Namespace | Self::Class | Self::Struct => 0,
            Self::Function => 1,
            Self::Typedef => 2,
            Self::ExternalReference => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Function => "function",
            Self::Typedef => "typedef",
            Self::ExternalReference => "external",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a shard partition, e.g. `pe` or the catch-all `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    /// Wraps a name without checking it against the partition rules.
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The shard owning `key`, or `None` for an empty key.
    ///
    /// Letters bucket on the first two characters (`pe`, `p2`); a second character
    /// outside `[a-z0-9]`, or a one-character key, buckets as `<letter>_`. Keys
    /// starting with a digit or `_` all share the catch-all shard.
    pub fn for_key(key: &str) -> Option<Self> {
        let mut chars = key.chars();
        let first = chars.next()?;
        if !first.is_ascii_lowercase() {
            return Some(Self::catch_all());
        }
        let second = match chars.next() {
            Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => c,
            _ => '_',
        };
        Some(Self(format!("{first}{second}")))
    }

    pub fn catch_all() -> Self {
        Self(CATCH_ALL_SHARD.to_string())
    }

    /// Whether the name is one `for_key` can produce: `_`, or a letter followed
    /// by a letter, digit or `_`.
    pub fn is_well_formed(&self) -> bool {
        match self.0.as_bytes() {
            [b'_'] => true,
            [first, second] => {
                first.is_ascii_lowercase()
                    && (second.is_ascii_lowercase() || second.is_ascii_digit() || *second == b'_')
            }
            _ => false,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.0 == CATCH_ALL_SHARD
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ShardId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One documentable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    key: String,
    display_name: String,
    scope_label: String,
    target_url: String,
    kind: EntryKind,
}

impl Entry {
    /// Builds an entry, deriving its key from `display_name`.
    pub fn new(
        display_name: impl Into<String>,
        target_url: impl Into<String>,
        scope_label: impl Into<String>,
        kind: EntryKind,
    ) -> Result<Self, EntryError> {
        let display_name = display_name.into();
        let target_url = target_url.into();

        if target_url.trim().is_empty() {
            return Err(EntryError::EmptyTargetUrl { display_name });
        }
        let key = normalize_key(&display_name);
        if key.is_empty() {
            return Err(EntryError::EmptyKey { display_name });
        }

        Ok(Self {
            key,
            display_name,
            scope_label: scope_label.into(),
            target_url,
            kind,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn scope_label(&self) -> &str {
        &self.scope_label
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub const fn kind(&self) -> EntryKind {
        self.kind
    }

    /// The shard this entry belongs to.
    pub fn shard_id(&self) -> ShardId {
        // `new` rejects empty keys
        ShardId::for_key(&self.key).unwrap_or_else(ShardId::catch_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};
    use rstest::rstest;

    #[rstest]
    #[case("PeerFinder", "peerfinder")]
    #[case("PeerFinder_test", "peerfinder_test")]
    #[case("pair< int, Json::Value >", "pairintjsonvalue")]
    #[case("  WalletPropose_test ", "walletpropose_test")]
    #[case("operator==", "operator")]
    #[case("", "")]
    fn test_normalize_key(#[case] input: &str, #[case] expected: &str) {
        check!(normalize_key(input) == expected);
    }

    #[rstest]
    #[case("peerfinder", Some("pe"))]
    #[case("p2p", Some("p2"))]
    #[case("a", Some("a_"))]
    #[case("a_b", Some("a_"))]
    #[case("base64", Some("ba"))]
    #[case("2fa", Some("_"))]
    #[case("_internal", Some("_"))]
    #[case("", None)]
    fn test_shard_for_key(#[case] key: &str, #[case] expected: Option<&str>) {
        check!(ShardId::for_key(key).as_ref().map(ShardId::as_str) == expected);
    }

    #[rstest]
    #[case("pe", true)]
    #[case("p2", true)]
    #[case("a_", true)]
    #[case("_", true)]
    #[case("../x", false)]
    #[case("..", false)]
    #[case("Pe", false)]
    #[case("2a", false)]
    #[case("pee", false)]
    #[case("", false)]
    fn test_shard_id_well_formed(#[case] name: &str, #[case] expected: bool) {
        check!(ShardId::new_unchecked(name).is_well_formed() == expected);
    }

    #[test]
    fn test_entry_derives_key_and_shard() {
        let entry = Entry::new(
            "PeerFinder",
            "../classripple_1_1PeerFinder.html",
            "ripple",
            EntryKind::Class,
        )
        .unwrap();
        check!(entry.key() == "peerfinder");
        check!(entry.shard_id().as_str() == "pe");
        check!(entry.scope_label() == "ripple");
    }

    #[test]
    fn test_entry_rejects_empty_url() {
        let result = Entry::new("PeerFinder", "  ", "ripple", EntryKind::Class);
        let_assert!(Err(EntryError::EmptyTargetUrl { display_name }) = result);
        check!(display_name == "PeerFinder");
    }

    #[test]
    fn test_entry_rejects_symbol_only_names() {
        let result = Entry::new("==", "../a.html", "", EntryKind::Function);
        check!(matches!(result, Err(EntryError::EmptyKey { .. })));
    }

    #[test]
    fn test_kind_priority_order() {
        check!(EntryKind::Namespace.priority() == EntryKind::Class.priority());
        check!(EntryKind::Class.priority() < EntryKind::Typedef.priority());
        check!(EntryKind::Typedef.priority() < EntryKind::ExternalReference.priority());
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&EntryKind::ExternalReference).unwrap();
        check!(json == "\"external\"");
        let kind: EntryKind = serde_json::from_str("\"typedef\"").unwrap();
        check!(kind == EntryKind::Typedef);
    }
}
