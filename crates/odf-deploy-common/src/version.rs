//! Platform / storage release versions
//!
//! Release versions in configuration are written as `4.9`, `4.10.3` or
//! `v4.12`. Ordering is numeric per component, so `4.10` sorts after `4.9`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::Error;

/// A `major.minor[.patch]` release version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformVersion {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component, 0 when omitted
    pub patch: u32,
}

/// First release shipping the `odf-operator` package
pub const VERSION_4_9: PlatformVersion = PlatformVersion::new(4, 9, 0);

impl PlatformVersion {
    /// Create a version from its components
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The `major.minor` form used in channel names (e.g. "4.10")
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl FromStr for PlatformVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let clean = trimmed.strip_prefix('v').unwrap_or(trimmed);
        // Pre-release and build suffixes don't take part in the comparison
        let core = clean.split(['-', '+']).next().unwrap_or(clean);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        let mut nums = [0u32; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| Error::InvalidVersion(s.to_string()))?;
        }

        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl<'de> Deserialize<'de> for PlatformVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // YAML reads `4.10` as the float 4.1, so unquoted numbers are refused
        let raw = serde_yaml::Value::deserialize(deserializer)?;
        let text = match raw {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => {
                return Err(serde::de::Error::custom(format!(
                    "version {} must be quoted, e.g. \"{}\"",
                    n, n
                )))
            }
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected version string, got {:?}",
                    other
                )))
            }
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}
