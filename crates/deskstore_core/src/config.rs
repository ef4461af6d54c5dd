//! Database configuration.

/// Configuration for a [`Database`](crate::Database) handle.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether operations on an unopened or closed handle open it first.
    ///
    /// When disabled, such operations fail with
    /// [`CoreError::DatabaseUnavailable`](crate::CoreError::DatabaseUnavailable).
    pub auto_open: bool,

    /// Whether backups are pretty-printed.
    pub pretty_backups: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_open: true,
            pretty_backups: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether operations open the database on first use.
    #[must_use]
    pub const fn auto_open(mut self, value: bool) -> Self {
        self.auto_open = value;
        self
    }

    /// Sets whether backups are pretty-printed.
    #[must_use]
    pub const fn pretty_backups(mut self, value: bool) -> Self {
        self.pretty_backups = value;
        self
    }
}
