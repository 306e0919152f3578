use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger commitment level, weakest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Whether a record observed at `observed` satisfies this level.
    pub fn is_satisfied_by(&self, observed: Commitment) -> bool {
        observed >= *self
    }
}

impl Default for Commitment {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
