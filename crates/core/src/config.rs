use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authorization::{Capability, CapabilityGrant};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub authorization: AuthorizationConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, Default)]
pub struct AuthorizationConfig {
    pub grants: Vec<CapabilityGrant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub grants: Option<Vec<CapabilityGrant>>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://ratify.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            authorization: AuthorizationConfig::default(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ratify.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(authorization) = patch.authorization {
            if let Some(grants) = authorization.grants {
                self.authorization.grants = grants;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RATIFY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RATIFY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("RATIFY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RATIFY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RATIFY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("RATIFY_LOGGING_LEVEL").or_else(|| read_env("RATIFY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RATIFY_LOGGING_FORMAT").or_else(|| read_env("RATIFY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("RATIFY_AUTHORIZATION_GRANTS") {
            self.authorization.grants = parse_grants("RATIFY_AUTHORIZATION_GRANTS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(grants) = overrides.grants {
            self.authorization.grants = grants;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_authorization(&self.authorization)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ratify.toml"), PathBuf::from("config/ratify.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Parses the compact grant syntax used by `RATIFY_AUTHORIZATION_GRANTS`:
/// `actor:subject_type:cap1|cap2`, entries separated by `;`.
pub fn parse_grants(key: &str, value: &str) -> Result<Vec<CapabilityGrant>, ConfigError> {
    let invalid =
        || ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() };

    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let (Some(actor), Some(subject_type), Some(capabilities)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid());
            };
            let capabilities = capabilities
                .split('|')
                .map(|capability| Capability::parse(capability).ok_or_else(invalid))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CapabilityGrant::new(actor.trim(), subject_type.trim(), capabilities))
        })
        .collect()
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_authorization(authorization: &AuthorizationConfig) -> Result<(), ConfigError> {
    for (index, grant) in authorization.grants.iter().enumerate() {
        if grant.actor.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "authorization.grants[{index}].actor must not be empty (use `*` for any actor)"
            )));
        }
        if grant.subject_type.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "authorization.grants[{index}].subject_type must not be empty (use `*` for any type)"
            )));
        }
        if grant.capabilities.is_empty() {
            return Err(ConfigError::Validation(format!(
                "authorization.grants[{index}].capabilities must list at least one capability"
            )));
        }
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    authorization: Option<AuthorizationPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizationPatch {
    grants: Option<Vec<CapabilityGrant>>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{parse_grants, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::authorization::{Capability, CapabilityGrant};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ENV_KEYS: &[&str] = &[
        "RATIFY_DATABASE_URL",
        "RATIFY_DATABASE_MAX_CONNECTIONS",
        "RATIFY_DATABASE_TIMEOUT_SECS",
        "RATIFY_LOGGING_LEVEL",
        "RATIFY_LOGGING_FORMAT",
        "RATIFY_LOG_LEVEL",
        "RATIFY_LOG_FORMAT",
        "RATIFY_AUTHORIZATION_GRANTS",
        "TEST_RATIFY_DB_URL",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars() {
        for var in ENV_KEYS {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation_and_grant_tables() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("TEST_RATIFY_DB_URL", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ratify.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_RATIFY_DB_URL}"

[[authorization.grants]]
actor = "u-lead"
subject_type = "item"
capabilities = ["approve", "rollback"]

[[authorization.grants]]
actor = "u-admin"
subject_type = "*"
capabilities = ["force"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.authorization.grants.len() == 2, "both grants should load")?;
            ensure(
                config.authorization.grants[0].capabilities
                    == vec![Capability::Approve, Capability::Rollback],
                "grant capabilities should deserialize in order",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn admin_alias_means_force_in_file_and_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ratify.toml");
            fs::write(
                &path,
                r#"
[[authorization.grants]]
actor = "u-root"
subject_type = "*"
capabilities = ["admin"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.authorization.grants[0].capabilities == vec![Capability::Force],
                "admin in the config file should load as force",
            )?;

            let from_env = parse_grants("RATIFY_AUTHORIZATION_GRANTS", "u-root:*:admin")
                .map_err(|err| err.to_string())?;
            ensure(
                from_env[0].capabilities == vec![Capability::Force],
                "admin in the env syntax should parse as force",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("RATIFY_LOG_LEVEL", "warn");
        env::set_var("RATIFY_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("RATIFY_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("RATIFY_AUTHORIZATION_GRANTS", "u-env:item:approve");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ratify.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"
max_connections = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.database.url == "sqlite://from-env.db", "env database url should win")?;
            ensure(config.database.max_connections == 2, "file value should beat the default")?;
            ensure(config.logging.level == "debug", "explicit override should win")?;
            ensure(
                config.authorization.grants
                    == vec![CapabilityGrant::new("u-env", "item", vec![Capability::Approve])],
                "env grants should replace the empty default",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("RATIFY_DATABASE_URL", "postgres://localhost/ratify");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("database.url")
            );
            ensure(has_message, "validation failure should mention database.url")
        })();

        clear_vars();
        result
    }

    #[test]
    fn grant_without_capabilities_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                grants: Some(vec![CapabilityGrant::new("u-1", "item", Vec::new())]),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let rejected = matches!(
            result,
            Err(ConfigError::Validation(ref message)) if message.contains("capabilities")
        );
        ensure(rejected, "empty capability list should fail validation")
    }

    #[test]
    fn compact_grant_syntax_parses_multiple_entries() {
        let grants = parse_grants("KEY", "u-1:item:approve|rollback; *:payment:cancel")
            .expect("valid grant list");

        assert_eq!(
            grants,
            vec![
                CapabilityGrant::new(
                    "u-1",
                    "item",
                    vec![Capability::Approve, Capability::Rollback]
                ),
                CapabilityGrant::new("*", "payment", vec![Capability::Cancel]),
            ]
        );
    }

    #[test]
    fn compact_grant_syntax_rejects_unknown_capability() {
        let error = parse_grants("KEY", "u-1:item:delete").expect_err("unknown capability");
        assert!(matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "KEY"));
    }
}
