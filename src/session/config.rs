//! Configuration for compiled sessions

use crate::error::{AotForgeError, ForgeResult};

/// Configuration for a [`CompiledSession`](super::CompiledSession)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model name/path, hashed into the model identity
    pub model_name: String,

    /// Devices required per attachment (one replica group)
    pub device_requirement: usize,
}

impl SessionConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        SessionConfig {
            model_name: model_name.into(),
            device_requirement: 1,
        }
    }

    /// Set the number of devices reserved as one atomic unit
    pub fn with_device_requirement(mut self, device_requirement: usize) -> Self {
        self.device_requirement = device_requirement;
        self
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> ForgeResult<()> {
        if self.model_name.is_empty() {
            return Err(AotForgeError::InvalidConfiguration(
                "model name must not be empty".to_string(),
            ));
        }
        if self.device_requirement == 0 {
            return Err(AotForgeError::InvalidConfiguration(
                "device requirement must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new("whisper-small");
        assert_eq!(config.model_name, "whisper-small");
        assert_eq!(config.device_requirement, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new("m").with_device_requirement(4);
        assert_eq!(config.device_requirement, 4);
    }

    #[test]
    fn test_session_config_validation() {
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("m")
            .with_device_requirement(0)
            .validate()
            .is_err());
    }
}
