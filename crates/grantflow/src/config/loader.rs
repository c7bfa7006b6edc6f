use std::path::Path;

use crate::config::schema::EngineConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.artifact_root.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "artifact_root must not be empty".to_string(),
        });
    }

    // The prefix becomes the first segment of every proposal code.
    let prefix_ok = !config.code_prefix.is_empty()
        && config.code_prefix.len() <= 8
        && config
            .code_prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !prefix_ok {
        return Err(ConfigError::Validation {
            message: format!(
                "code_prefix '{}' must be 1-8 uppercase letters or digits",
                config.code_prefix
            ),
        });
    }

    if config.render_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "render_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.notification_batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "notification_batch_size must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "artifact_root": "/var/lib/grantflow/artifacts",
            "code_prefix": "GP",
            "render_timeout_secs": 10
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.artifact_root, "/var/lib/grantflow/artifacts");
        assert_eq!(config.code_prefix, "GP");
        assert_eq!(config.render_timeout_secs, 10);
        assert_eq!(config.notification_batch_size, 50);
    }

    #[test]
    fn test_defaults_applied() {
        let config_json = r#"{ "artifact_root": "/artifacts" }"#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.code_prefix, "GP");
        assert_eq!(config.render_timeout_secs, 30);
        assert_eq!(config.mail_from, "noreply@grantflow.local");
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        for prefix in ["", "gp", "TOOLONGPREFIX", "G-P"] {
            let config_json = format!(
                r#"{{ "artifact_root": "/artifacts", "code_prefix": "{}" }}"#,
                prefix
            );
            assert!(load_config_from_str(&config_json).is_err(), "prefix {:?}", prefix);
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config_json = r#"{ "artifact_root": "/a", "render_timeout_secs": 0 }"#;
        assert!(load_config_from_str(config_json).is_err());
    }

    #[test]
    fn test_empty_artifact_root_rejected() {
        let config_json = r#"{ "artifact_root": "  " }"#;
        assert!(load_config_from_str(config_json).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(load_config_from_str("{ not json").is_err());
    }
}
