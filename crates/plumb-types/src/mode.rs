//! Delivery modes: which attached reader(s) receive a given message.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlumbError;

/// Fan-out policy of a pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipeMode {
    /// Every attached reader gets its own copy.
    #[default]
    All,
    /// Exactly one reader, cycling in attachment order.
    RoundRobin,
    /// Exactly one reader, chosen uniformly at random.
    Random,
}

impl PipeMode {
    /// The name used on the command surface and in status tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipeMode::All => "all",
            PipeMode::RoundRobin => "round-robin",
            PipeMode::Random => "random",
        }
    }
}

impl fmt::Display for PipeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipeMode {
    type Err = PlumbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PipeMode::All),
            "round-robin" => Ok(PipeMode::RoundRobin),
            "random" => Ok(PipeMode::Random),
            other => Err(PlumbError::invalid(format!("invalid pipe mode: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("all", PipeMode::All)]
    #[case("round-robin", PipeMode::RoundRobin)]
    #[case("random", PipeMode::Random)]
    fn parses_and_displays(#[case] text: &str, #[case] mode: PipeMode) {
        assert_eq!(text.parse::<PipeMode>().unwrap(), mode);
        assert_eq!(mode.to_string(), text);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(matches!("fifo".parse::<PipeMode>(), Err(PlumbError::Validation(_))));
    }

    #[test]
    fn default_is_all() {
        assert_eq!(PipeMode::default(), PipeMode::All);
    }
}
