use crate::{Level, Record};

use std::fmt::Debug;

/// Decides whether a handler emits a record.
pub trait Filter: Debug + Send + Sync + 'static {
    /// Whether `record` should be emitted.
    fn should_emit(&self, record: &Record) -> bool;
}

/// Passes records at or above a minimum level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelFilter {
    min: Level,
}

impl LevelFilter {
    /// Creates a filter passing `min` and everything more severe.
    #[must_use]
    pub const fn new(min: Level) -> Self {
        Self { min }
    }

    /// The minimum level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.min
    }
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self::new(Level::Debug)
    }
}

impl Filter for LevelFilter {
    fn should_emit(&self, record: &Record) -> bool {
        record.level >= self.min
    }
}

/// Passes records of exactly one level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExactLevelFilter {
    level: Level,
}

impl ExactLevelFilter {
    /// Creates a filter passing only `level`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Filter for ExactLevelFilter {
    fn should_emit(&self, record: &Record) -> bool {
        record.level == self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let filter = LevelFilter::new(Level::Warning);

        assert!(!filter.should_emit(&Record::new(Level::Info, "t", "m")));
        assert!(filter.should_emit(&Record::new(Level::Warning, "t", "m")));
        assert!(filter.should_emit(&Record::new(Level::Critical, "t", "m")));
    }

    #[test]
    fn test_exact_level_filter() {
        let filter = ExactLevelFilter::new(Level::Error);

        assert!(!filter.should_emit(&Record::new(Level::Warning, "t", "m")));
        assert!(filter.should_emit(&Record::new(Level::Error, "t", "m")));
        assert!(!filter.should_emit(&Record::new(Level::Critical, "t", "m")));
    }
}
