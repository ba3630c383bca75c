//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that flow through the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Datatype name newtype wrapper
///
/// The unique key of an exportable entity (`users`, `courses`, ...). Names are
/// lowercase ASCII identifiers because they end up in table rows, setting
/// keys and artifact directory names.
///
/// # Examples
///
/// ```
/// use harvest::domain::ids::DatatypeName;
/// use std::str::FromStr;
///
/// let name = DatatypeName::from_str("courses").unwrap();
/// assert_eq!(name.as_str(), "courses");
/// assert!(DatatypeName::new("Bad Name").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatatypeName(String);

impl DatatypeName {
    /// Creates a new DatatypeName from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains characters other
    /// than lowercase letters, digits and underscores.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Datatype name cannot be empty".to_string());
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!(
                "Invalid datatype name '{name}': only lowercase letters, digits and '_' are allowed"
            ));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DatatypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatatypeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DatatypeName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DatatypeName> for String {
    fn from(name: DatatypeName) -> Self {
        name.0
    }
}

impl AsRef<str> for DatatypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validates a SQL identifier (table or column name)
///
/// Table and column names reach SQL text through introspection and
/// configuration, so they are restricted to plain identifiers.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_name_valid() {
        let name = DatatypeName::new("quiz_attempts").unwrap();
        assert_eq!(name.as_str(), "quiz_attempts");
        assert_eq!(name.to_string(), "quiz_attempts");
    }

    #[test]
    fn test_datatype_name_rejects_empty_and_uppercase() {
        assert!(DatatypeName::new("").is_err());
        assert!(DatatypeName::new("   ").is_err());
        assert!(DatatypeName::new("Users").is_err());
        assert!(DatatypeName::new("grade-items").is_err());
    }

    #[test]
    fn test_datatype_name_serde() {
        let name = DatatypeName::new("courses").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"courses\"");

        let back: DatatypeName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);

        assert!(serde_json::from_str::<DatatypeName>("\"Not Valid\"").is_err());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("mdl_user"));
        assert!(is_valid_identifier("_tmp1"));
        assert!(!is_valid_identifier("1user"));
        assert!(!is_valid_identifier("user; drop table x"));
        assert!(!is_valid_identifier(""));
    }
}
