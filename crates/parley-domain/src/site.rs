//! External platforms a registration can claim an account on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// External platform hosting the claimed profile.
///
/// Wire format: lowercase string (`"github"`, `"v2ex"`). Adding a site means
/// adding a variant here and a fetch arm in the profile-fetcher adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Github,
    V2ex,
}

impl Site {
    /// Lowercase wire/storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::V2ex => "v2ex",
        }
    }

    /// Human-facing name, used in notification mails.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Github => "GitHub",
            Self::V2ex => "V2EX",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown site: {0}")]
pub struct ParseSiteError(String);

impl FromStr for Site {
    type Err = ParseSiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "v2ex" => Ok(Self::V2ex),
            other => Err(ParseSiteError(other.to_owned())),
        }
    }
}
