//! Engine configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use subset_model::DEFAULT_NAME_SEPARATOR;

/// What happens to a subset's signature when deactivation trims a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureOnTrim {
    /// Keep the signature of the original selection; the subset keeps its identity
    #[default]
    Pinned,
    /// Re-sign over the remaining members, merging into an existing subset on collision
    Recompute,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Separator between list name and sequence in generated subset names
    pub name_separator: String,
    /// Times a save is re-run after losing a uniqueness race at commit
    pub conflict_retries: u32,
    /// Signature policy for deactivation trims
    pub signature_on_trim: SignatureOnTrim,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the TOML is malformed or a value is invalid
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the name separator is empty or numeric
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_separator.is_empty() {
            return Err(ConfigError::Invalid("name_separator must not be empty".into()));
        }
        if self.name_separator.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(
                "name_separator must not end with a digit".into(),
            ));
        }
        Ok(())
    }

    /// With name separator
    #[inline]
    #[must_use]
    pub fn with_name_separator(mut self, separator: impl Into<String>) -> Self {
        self.name_separator = separator.into();
        self
    }

    /// With conflict retries
    #[inline]
    #[must_use]
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// With trim signature policy
    #[inline]
    #[must_use]
    pub fn with_signature_on_trim(mut self, policy: SignatureOnTrim) -> Self {
        self.signature_on_trim = policy;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name_separator: DEFAULT_NAME_SEPARATOR.to_string(),
            conflict_retries: 1,
            signature_on_trim: SignatureOnTrim::Pinned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.name_separator, "_SUB");
        assert_eq!(config.conflict_retries, 1);
        assert_eq!(config.signature_on_trim, SignatureOnTrim::Pinned);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("signature_on_trim = \"recompute\"\n").unwrap();
        assert_eq!(config.signature_on_trim, SignatureOnTrim::Recompute);
        assert_eq!(config.name_separator, "_SUB");
    }

    #[test]
    fn full_toml() {
        let toml = r#"
            name_separator = "-S"
            conflict_retries = 3
            signature_on_trim = "pinned"
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config, EngineConfig::new().with_name_separator("-S").with_conflict_retries(3));
    }

    #[test]
    fn rejects_empty_separator() {
        let result = EngineConfig::from_toml_str("name_separator = \"\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_policy() {
        let result = EngineConfig::from_toml_str("signature_on_trim = \"sometimes\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
