use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One unit of patient consent, and the capability an adapter may advertise.
///
/// A consent grant authorizes a subset of these; the broker refuses any fetch
/// whose scope is not in that subset, independent of adapter capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    Eligibility,
    Benefits,
    ClaimsHistory,
    PriorAuth,
}

impl DataScope {
    /// All four scopes, in canonical order.
    pub const ALL: [DataScope; 4] = [
        DataScope::Eligibility,
        DataScope::Benefits,
        DataScope::ClaimsHistory,
        DataScope::PriorAuth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligibility => "eligibility",
            Self::Benefits => "benefits",
            Self::ClaimsHistory => "claims_history",
            Self::PriorAuth => "prior_auth",
        }
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for free-text scope parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown data scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for DataScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eligibility" => Ok(Self::Eligibility),
            "benefits" => Ok(Self::Benefits),
            "claims_history" | "claims" => Ok(Self::ClaimsHistory),
            "prior_auth" | "prior_authorization" => Ok(Self::PriorAuth),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}
