//! Version policy for the product check
//!
//! Maps a distribution tag to the minimum server version the client accepts.
//! The table is plain data so it can come from configuration; nothing here
//! touches the gate's state.

use crate::error::{ClientError, Result};
use crate::probe::ServerDescriptor;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Distribution tag assumed when the server does not report one
pub const DEFAULT_DISTRIBUTION: &str = "elasticsearch";

/// A structured `major.minor.patch` server version
///
/// Pre-release and build suffixes (`7.17.0-SNAPSHOT`, `6.0.0-beta1`) are
/// ignored for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let core = s
            .trim()
            .split(|c: char| c == '-' || c == '+')
            .next()
            .unwrap_or_default();

        let mut parts = [0u64; 3];
        let mut count = 0;
        for segment in core.split('.') {
            if count == parts.len() {
                return Err(ClientError::Config(format!("Invalid version '{}'", s)));
            }
            parts[count] = segment
                .parse()
                .map_err(|_| ClientError::Config(format!("Invalid version '{}'", s)))?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Outcome of classifying a server descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Supported,
    Unsupported,
}

/// Minimum acceptable version per distribution tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPolicy {
    default_distribution: String,
    minimums: HashMap<String, Version>,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        let mut minimums = HashMap::new();
        minimums.insert(DEFAULT_DISTRIBUTION.to_string(), Version::new(7, 0, 0));
        minimums.insert("opensearch".to_string(), Version::new(1, 0, 0));
        Self {
            default_distribution: DEFAULT_DISTRIBUTION.to_string(),
            minimums,
        }
    }
}

impl VersionPolicy {
    /// Create an empty policy; every distribution is unsupported until added
    pub fn new(default_distribution: impl Into<String>) -> Self {
        Self {
            default_distribution: default_distribution.into(),
            minimums: HashMap::new(),
        }
    }

    /// Build a policy from configured `tag -> minimum version` strings
    pub fn from_table(
        default_distribution: impl Into<String>,
        table: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut policy = Self::new(default_distribution);
        for (tag, minimum) in table {
            policy = policy.with_minimum(tag.clone(), minimum.parse()?);
        }
        Ok(policy)
    }

    /// Set the minimum version for a distribution tag
    pub fn with_minimum(mut self, distribution: impl Into<String>, minimum: Version) -> Self {
        self.minimums
            .insert(distribution.into().to_lowercase(), minimum);
        self
    }

    pub fn default_distribution(&self) -> &str {
        &self.default_distribution
    }

    pub fn minimum_for(&self, distribution: &str) -> Option<Version> {
        self.minimums.get(&distribution.to_lowercase()).copied()
    }

    /// Classify a descriptor produced by the prober
    ///
    /// Malformed descriptors, unparseable versions and unknown distribution
    /// tags are all unsupported.
    pub fn classify(&self, descriptor: &ServerDescriptor) -> Compatibility {
        if !descriptor.well_formed {
            return Compatibility::Unsupported;
        }

        let distribution = descriptor
            .distribution
            .as_deref()
            .unwrap_or(&self.default_distribution);

        let minimum = match self.minimum_for(distribution) {
            Some(v) => v,
            None => return Compatibility::Unsupported,
        };

        let version = match descriptor.version.as_deref().map(str::parse::<Version>) {
            Some(Ok(v)) => v,
            _ => return Compatibility::Unsupported,
        };

        if version >= minimum {
            Compatibility::Supported
        } else {
            Compatibility::Unsupported
        }
    }
}
