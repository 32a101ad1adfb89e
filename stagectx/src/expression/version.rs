//! Evaluator engine versions.

use crate::errors::PipelineBuildError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A dialect of the embedded expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorVersion {
    /// Legacy dialect: lenient property access, no null-safe operators.
    V3,
    /// Current dialect: strict property access, `?.` and `?:`.
    #[default]
    V4,
}

impl EvaluatorVersion {
    /// Parses an execution-level selector.
    ///
    /// `None` and blank selectors mean "unset"; anything other than `v3`/`v4`
    /// (case-insensitive) is a misconfiguration.
    pub fn parse_selector(selector: Option<&str>) -> Result<Option<Self>, PipelineBuildError> {
        match selector.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }

    /// Returns true if the dialect supports `?.` and `?:`.
    #[must_use]
    pub fn supports_null_safe_operators(self) -> bool {
        matches!(self, Self::V4)
    }

    /// Returns true if missing keys and indices are errors rather than null.
    #[must_use]
    pub fn strict_property_access(self) -> bool {
        matches!(self, Self::V4)
    }
}

impl FromStr for EvaluatorVersion {
    type Err = PipelineBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v3" => Ok(Self::V3),
            "v4" => Ok(Self::V4),
            _ => Err(PipelineBuildError::PolicyMisconfiguration {
                selector: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EvaluatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3 => write!(f, "v3"),
            Self::V4 => write!(f, "v4"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert_eq!(EvaluatorVersion::parse_selector(None).unwrap(), None);
        assert_eq!(EvaluatorVersion::parse_selector(Some("")).unwrap(), None);
        assert_eq!(
            EvaluatorVersion::parse_selector(Some("v3")).unwrap(),
            Some(EvaluatorVersion::V3)
        );
        assert_eq!(
            EvaluatorVersion::parse_selector(Some("V4")).unwrap(),
            Some(EvaluatorVersion::V4)
        );
    }

    #[test]
    fn test_unknown_selector_is_misconfiguration() {
        let err = EvaluatorVersion::parse_selector(Some("v2")).unwrap_err();
        assert_eq!(
            err,
            PipelineBuildError::PolicyMisconfiguration {
                selector: "v2".to_string()
            }
        );
    }

    #[test]
    fn test_version_serialize() {
        assert_eq!(serde_json::to_string(&EvaluatorVersion::V3).unwrap(), r#""v3""#);
        let v: EvaluatorVersion = serde_json::from_str(r#""v4""#).unwrap();
        assert_eq!(v, EvaluatorVersion::V4);
        assert_eq!(EvaluatorVersion::V3.to_string(), "v3");
    }
}
