//! Event severity levels.

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a trace event.
///
/// Ordering follows the trace convention: lower numeric values are more
/// severe, so `Critical < Error < Warning < Informational < Verbose`. A
/// subscription with a minimum level of `Warning` therefore admits
/// `Critical`, `Error` and `Warning` events and rejects the rest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Level {
    Critical = 1,
    Error = 2,
    Warning = 3,
    #[default]
    Informational = 4,
    Verbose = 5,
}

impl Level {
    /// All levels, most severe first.
    pub const ALL: [Level; 5] = [
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Informational,
        Level::Verbose,
    ];

    /// Single-letter tag used by the text line format.
    pub fn letter(&self) -> char {
        match self {
            Level::Critical => 'c',
            Level::Error => 'e',
            Level::Warning => 'w',
            Level::Informational => 'i',
            Level::Verbose => 'v',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Critical => "Critical",
            Level::Error => "Error",
            Level::Warning => "Warning",
            Level::Informational => "Informational",
            Level::Verbose => "Verbose",
        }
    }
}

impl FromStr for Level {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Level::Critical),
            "error" => Ok(Level::Error),
            "warning" => Ok(Level::Warning),
            "informational" => Ok(Level::Informational),
            "verbose" => Ok(Level::Verbose),
            _ => Err(EventError::InvalidArgument(format!(
                "unknown severity level '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Level::Critical < Level::Error);
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Informational);
        assert!(Level::Informational < Level::Verbose);
    }

    #[test]
    fn test_admission_uses_ordering() {
        // A Warning subscription admits anything at least as severe.
        let min = Level::Warning;
        assert!(Level::Critical <= min);
        assert!(Level::Warning <= min);
        assert!(Level::Informational > min);
    }

    #[test]
    fn test_level_letters() {
        let letters: String = Level::ALL.iter().map(Level::letter).collect();
        assert_eq!(letters, "cewiv");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("critical".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!("Informational".parse::<Level>().unwrap(), Level::Informational);
        assert!("fatal".parse::<Level>().is_err());
    }

    #[test]
    fn test_default_is_informational() {
        assert_eq!(Level::default(), Level::Informational);
    }
}
