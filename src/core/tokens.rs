//! BK-001: Placeholder tokens a recipe embeds instead of literal values.
//!
//! Tokens carry no resolution logic. `AutoIncId` and `NamedId` are identified
//! by a [`TokenKey`] minted when the token is created; copies of a token keep
//! its key, so every column holding a copy resolves to the same integer. The
//! resolver maps keys to values and never mutates a token.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a token instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey(u64);

impl TokenKey {
    /// Mint a key that no other token in this process holds.
    pub fn mint() -> Self {
        Self(NEXT_TOKEN_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// "The next sequence value for this table."
///
/// Reuse the same instance (it is `Copy`) wherever a column must hold the
/// generated value, e.g. a foreign key pointing at a primary key in the
/// same bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AutoIncId {
    key: TokenKey,
}

impl AutoIncId {
    pub fn new() -> Self {
        Self {
            key: TokenKey::mint(),
        }
    }

    pub fn key(&self) -> TokenKey {
        self.key
    }
}

impl Default for AutoIncId {
    fn default() -> Self {
        Self::new()
    }
}

/// A descriptive, per-table unique name for a generated ID, e.g.
/// `productWithRefund`.
///
/// Each `NamedId::new` is a separate definition: two of them with the same
/// name in the same table is an error. Clones share the key and count as one
/// definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedId {
    key: TokenKey,
    name: String,
}

impl NamedId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            key: TokenKey::mint(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> TokenKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A read of a named ID owned by a (possibly different) table.
///
/// Resolved by registry lookup, never cached on itself. It may be resolved
/// before the defining `NamedId` has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedIdRef {
    pub table: String,
    pub name: String,
}

/// Reference the named ID `name` defined in `table`.
pub fn get_named_id(table: impl Into<String>, name: impl Into<String>) -> NamedIdRef {
    NamedIdRef {
        table: table.into(),
        name: name.into(),
    }
}

/// A verbatim SQL fragment, emitted unquoted and unescaped (e.g. `CURDATE()`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawSql(String);

impl RawSql {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
