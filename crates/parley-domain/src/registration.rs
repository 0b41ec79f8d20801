//! Registration lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// State of one ownership-verification attempt.
///
/// Transitions move forward only:
/// `Pending → Verifying → {Verified, Failed, Expired}`. The terminal states
/// never transition again; expiry is a state, not a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Pending,
    Verifying,
    Verified,
    Failed,
    Expired,
}

impl RegistrationState {
    /// Lowercase wire/storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Failed | Self::Expired)
    }

    /// Whether `self → to` is a forward edge of the lifecycle DAG.
    /// `Verifying → Verifying` is allowed (rechecks); terminal states have
    /// no outgoing edges.
    pub fn can_transition_to(self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Verifying | Self::Expired),
            Self::Verifying => matches!(
                to,
                Self::Verifying | Self::Verified | Self::Failed | Self::Expired
            ),
            Self::Verified | Self::Failed | Self::Expired => false,
        }
    }

    /// Human-readable reason surfaced to the user for terminal failures.
    pub fn failure_reason(self) -> Option<&'static str> {
        match self {
            Self::Failed => {
                Some("the verification code was never found on the claimed profile")
            }
            Self::Expired => {
                Some("the verification window elapsed before the code was found")
            }
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown registration state: {0}")]
pub struct ParseStateError(String);

impl FromStr for RegistrationState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verifying" => Ok(Self::Verifying),
            "verified" => Ok(Self::Verified),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            other => Err(ParseStateError(other.to_owned())),
        }
    }
}
