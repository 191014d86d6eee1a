//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Identifier of a queued decision job.
///
/// Producers outside this crate may enqueue jobs with their own ids, so any
/// non-empty string is accepted. Ids minted here are UUID v4 strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random JobId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an externally supplied id, rejecting blank values.
    pub fn from_string(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("job_id"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

/// Identifier stamped on every decision, `int-` followed by 8 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(String);

impl IntentId {
    const PREFIX: &'static str = "int-";

    /// Mints a fresh intent id.
    pub fn new() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, &hex[..8]))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IntentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix(Self::PREFIX).ok_or_else(|| {
            ValidationError::invalid_format("intent_id", "missing 'int-' prefix")
        })?;
        if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::invalid_format(
                "intent_id",
                "expected 8 hex characters after prefix",
            ));
        }
        Ok(Self(s.to_string()))
    }
}

/// Stable identity of one worker unit: `<host>:<pid>:<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Creates a WorkerId, returning error if empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("worker_id"));
        }
        Ok(Self(id))
    }

    /// Builds the identity of worker `index` in the current process.
    pub fn for_process(index: usize) -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self(format!("{}:{}:{}", host, std::process::id(), index))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_new_generates_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn job_id_rejects_blank() {
        assert!(JobId::from_string("   ").is_err());
        assert_eq!(JobId::from_string(" j-1 ").unwrap().as_str(), "j-1");
    }

    #[test]
    fn job_id_serializes_transparently() {
        let id = JobId::from_string("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn intent_id_has_expected_shape() {
        let id = IntentId::new();
        assert!(id.as_str().starts_with("int-"));
        assert_eq!(id.as_str().len(), 12);
        assert!(id.as_str().parse::<IntentId>().is_ok());
    }

    #[test]
    fn intent_id_parse_rejects_bad_suffix() {
        assert!("int-xyz".parse::<IntentId>().is_err());
        assert!("abcd1234".parse::<IntentId>().is_err());
    }

    #[test]
    fn worker_id_for_process_includes_pid_and_index() {
        let id = WorkerId::for_process(3);
        let parts: Vec<&str> = id.as_str().rsplitn(3, ':').collect();
        assert_eq!(parts[0], "3");
        assert_eq!(parts[1], std::process::id().to_string());
    }

    #[test]
    fn worker_id_rejects_empty() {
        assert!(WorkerId::new("").is_err());
    }
}
