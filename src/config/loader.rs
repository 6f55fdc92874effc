//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::FleetConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<FleetConfig, ConfigError> {
    let config: FleetConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FleetConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[dependencies]]
            name = "ledger"
            retry_window_base_ms = 2000
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.dependencies[0].retry_window_base_ms, 2000);
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_config(
            r#"
            [[edges]]
            parent = "a"
            child = "b"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 2));
        assert!(err.to_string().starts_with("Validation failed: edges[0].parent"));
    }

    #[test]
    fn test_oversized_predictor_rejected() {
        let err = parse_config(
            r#"
            [[dependencies]]
            name = "ledger"

            [dependencies.predictor]
            weights = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("dependencies[0].predictor.weights"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
