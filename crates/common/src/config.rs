use serde::Deserialize;
use std::env;

/// Deployment flavour. Drives the log format chosen by [`crate::setup_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Reads `ENVIRONMENT`, falling back to development for anything unknown.
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .ok()
            .and_then(|s| Self::try_from(s).ok())
            .unwrap_or(Environment::Development)
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `development` or `production`.",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parses_short_and_long_names() {
        assert_eq!(
            Environment::try_from("prod".to_string()),
            Ok(Environment::Production)
        );
        assert_eq!(
            Environment::try_from("Development".to_string()),
            Ok(Environment::Development)
        );
    }

    #[test]
    fn test_rejects_unknown_environment() {
        let err = Environment::try_from("staging".to_string()).unwrap_err();
        assert!(err.contains("staging"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_to_development() {
        // SAFETY: serialized with the other env tests in this module.
        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);

        unsafe { env::set_var("ENVIRONMENT", "production") };
        assert_eq!(Environment::from_env(), Environment::Production);

        unsafe { env::set_var("ENVIRONMENT", "nonsense") };
        assert_eq!(Environment::from_env(), Environment::Development);

        unsafe { env::remove_var("ENVIRONMENT") };
    }
}
