//! Identifiers accepted by the store.
//!
//! Every name that ends up as a path component is wrapped in a newtype that can
//! only be built through validation, so a raw caller string never reaches the
//! filesystem.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Length of a deployment id: `YYYYMMDD-HHMMSS` plus `-xxxx-xxxxxxxxxxxx`.
pub const DEPLOYMENT_ID_LEN: usize = 33;

/// Length of a commit hash (hex encoded SHA-1).
pub const COMMIT_HASH_LEN: usize = 40;

/// Maximum length of a project name.
pub const PROJECT_NAME_MAX_LEN: usize = 63;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LEN: usize = 15;

static PROJECT_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]{0,61}[A-Za-z0-9_]$").ok());

static COMMIT_HASH_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{40}$").ok());

static DEPLOYMENT_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8}-[0-9]{6}-[0-9a-z]{4}-[0-9a-z]{12}$").ok());

/// The kinds of caller-supplied identifier the store validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Project,
    Commit,
    Deployment,
}

impl IdentifierKind {
    fn pattern(self) -> Option<&'static Regex> {
        match self {
            IdentifierKind::Project => PROJECT_NAME_PATTERN.as_ref(),
            IdentifierKind::Commit => COMMIT_HASH_PATTERN.as_ref(),
            IdentifierKind::Deployment => DEPLOYMENT_ID_PATTERN.as_ref(),
        }
    }

    /// Exact-match `value` against this kind's pattern.
    ///
    /// Returns `false` if the pattern failed to compile, so nothing is ever
    /// accepted unchecked.
    pub fn is_match(self, value: &str) -> bool {
        self.pattern().is_some_and(|pattern| pattern.is_match(value))
    }

    fn check(self, value: &str) -> Result<()> {
        if self.is_match(value) {
            Ok(())
        } else {
            Err(Error::Validation {
                kind: self,
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentifierKind::Project => "project name",
            IdentifierKind::Commit => "commit hash",
            IdentifierKind::Deployment => "deployment id",
        };
        f.write_str(name)
    }
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate `value` and wrap it.
            pub fn parse(value: &str) -> Result<Self> {
                $kind.check(value)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                $kind.check(&value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// A project namespace, 2 to 63 characters of `[A-Za-z0-9_-]` that neither
    /// starts nor ends with a hyphen.
    ProjectName,
    IdentifierKind::Project
);

identifier!(
    /// A lowercase hex source-control commit hash.
    CommitHash,
    IdentifierKind::Commit
);

identifier!(
    /// Identifier of one immutable deployment.
    ///
    /// The leading UTC timestamp makes lexicographic order equal creation order.
    DeploymentId,
    IdentifierKind::Deployment
);

impl DeploymentId {
    /// Allocate a fresh id for the current second.
    ///
    /// The random tail comes from a v4 UUID; ids are not checked against
    /// existing deployments here.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    pub(crate) fn generate_at(now: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().hyphenated().to_string();
        // "-xxxx-xxxxxxxxxxxx": the last two groups of the UUID
        Self(format!("{}{}", now.format(TIMESTAMP_FORMAT), &random[18..]))
    }

    /// The creation second encoded in the id, if it is a real calendar time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0[..TIMESTAMP_LEN], TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_project_name_pattern() {
        for ok in ["ab", "my-site", "My_Site_2", "_x", "a".repeat(63).as_str()] {
            assert!(IdentifierKind::Project.is_match(ok), "{ok} should match");
        }
        for bad in ["", "a", "-ab", "ab-", "a/b", "a.b", "..", "a".repeat(64).as_str()] {
            assert!(!IdentifierKind::Project.is_match(bad), "{bad} should not match");
        }
    }

    #[test]
    fn test_commit_hash_pattern() {
        assert!(CommitHash::parse(&"a1".repeat(20)).is_ok());
        assert!(CommitHash::parse(&"A1".repeat(20)).is_err());
        assert!(CommitHash::parse(&"a".repeat(39)).is_err());
        assert!(CommitHash::parse(&"g".repeat(40)).is_err());
    }

    #[test]
    fn test_generated_id_shape() {
        let id = DeploymentId::generate();
        assert_eq!(id.as_str().len(), DEPLOYMENT_ID_LEN);
        assert!(IdentifierKind::Deployment.is_match(id.as_str()));
    }

    #[test]
    fn test_generated_id_encodes_time() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 22).unwrap();
        let id = DeploymentId::generate_at(now);

        assert!(id.as_str().starts_with("20240615-143022-"));
        assert_eq!(id.timestamp(), Some(now));
    }

    #[test]
    fn test_ids_sort_by_creation_time() {
        let earlier = DeploymentId::generate_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let later = DeploymentId::generate_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap());
        assert!(earlier < later);
    }

    #[test]
    fn test_validation_error_names_kind() {
        let err = DeploymentId::parse("nope").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation {
                kind: IdentifierKind::Deployment,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Invalid deployment id: \"nope\"");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ProjectName = serde_json::from_str("\"site\"").unwrap();
        assert_eq!(ok.as_str(), "site");
        assert!(serde_json::from_str::<ProjectName>("\"../etc\"").is_err());
    }
}
