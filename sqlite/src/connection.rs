//! Connection settings and transaction modes

use serde::Deserialize;

/// SQLite transaction types
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    #[default]
    /// A deferred transaction is the default - it does not acquire locks until needed
    Deferred,
    /// An immediate transaction acquires a RESERVED lock immediately
    Immediate,
    /// An exclusive transaction acquires an EXCLUSIVE lock immediately
    Exclusive,
}

impl TransactionMode {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            TransactionMode::Deferred => "BEGIN DEFERRED",
            TransactionMode::Immediate => "BEGIN IMMEDIATE",
            TransactionMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

impl From<TransactionMode> for ::rusqlite::TransactionBehavior {
    fn from(mode: TransactionMode) -> Self {
        match mode {
            TransactionMode::Deferred => ::rusqlite::TransactionBehavior::Deferred,
            TransactionMode::Immediate => ::rusqlite::TransactionBehavior::Immediate,
            TransactionMode::Exclusive => ::rusqlite::TransactionBehavior::Exclusive,
        }
    }
}

fn default_path() -> String {
    ":memory:".to_string()
}

/// `[database]` section of the service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteConfig {
    /// File path, or `:memory:`
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub transaction: TransactionMode,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            transaction: TransactionMode::default(),
        }
    }
}

impl SqliteConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}
