//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::HarvestConfig;
use crate::config::secret_string;
use crate::domain::errors::HarvestError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into HarvestConfig
/// 4. Applies environment variable overrides (HARVEST_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if the file cannot be read, a referenced environment
/// variable is unset, TOML parsing fails or validation fails.
///
/// # Examples
///
/// ```no_run
/// use harvest::config::loader::load_config;
///
/// let config = load_config("harvest.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<HarvestConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(HarvestError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        HarvestError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_str(&contents)
}

/// Loads configuration from TOML text
///
/// # Errors
///
/// Same as [`load_config`], minus the file access.
pub fn load_config_str(contents: &str) -> Result<HarvestConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: HarvestConfig = toml::from_str(&contents)
        .map_err(|e| HarvestError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        HarvestError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern compiles")
    })
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = env_var_pattern();
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(HarvestError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_override<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        HarvestError::Configuration(format!("Invalid value for {name}: '{value}'"))
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Applies environment variable overrides using the HARVEST_* prefix
///
/// Environment variables follow the pattern `HARVEST_<SECTION>_<KEY>`, for
/// example `HARVEST_DATABASE_CONNECTION_STRING` or `HARVEST_EXPORT_FORMAT`.
/// List values are comma-separated.
fn apply_env_overrides(config: &mut HarvestConfig) -> Result<()> {
    let var = |name: &str| std::env::var(name).ok();

    // Application overrides
    if let Some(val) = var("HARVEST_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = var("HARVEST_APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_override("HARVEST_APPLICATION_DRY_RUN", &val)?;
    }

    // Database overrides
    if let Some(val) = var("HARVEST_DATABASE_CONNECTION_STRING") {
        config.database.connection_string = secret_string(val);
    }
    if let Some(val) = var("HARVEST_DATABASE_TABLE_PREFIX") {
        config.database.table_prefix = val;
    }
    if let Some(val) = var("HARVEST_DATABASE_MAX_CONNECTIONS") {
        config.database.max_connections =
            parse_override("HARVEST_DATABASE_MAX_CONNECTIONS", &val)?;
    }

    // Export overrides
    if let Some(val) = var("HARVEST_EXPORT_FORMAT") {
        config.export.format = val;
    }
    if let Some(val) = var("HARVEST_EXPORT_DEFAULT_STORAGE") {
        config.export.default_storage = val;
    }
    if let Some(val) = var("HARVEST_EXPORT_FLUSH_THRESHOLD") {
        config.export.flush_threshold = parse_override("HARVEST_EXPORT_FLUSH_THRESHOLD", &val)?;
    }
    if let Some(val) = var("HARVEST_EXPORT_PAGE_SIZE") {
        config.export.page_size = parse_override("HARVEST_EXPORT_PAGE_SIZE", &val)?;
    }
    if let Some(val) = var("HARVEST_EXPORT_MAX_TEXT_LENGTH") {
        config.export.max_text_length = parse_override("HARVEST_EXPORT_MAX_TEXT_LENGTH", &val)?;
    }
    if let Some(val) = var("HARVEST_EXPORT_TASK_TIMEOUT_SECONDS") {
        config.export.task_timeout_seconds =
            parse_override("HARVEST_EXPORT_TASK_TIMEOUT_SECONDS", &val)?;
    }
    if let Some(val) = var("HARVEST_EXPORT_EXCLUDED_TABLES") {
        config.export.excluded_tables = split_list(&val);
    }
    if let Some(val) = var("HARVEST_EXPORT_DISABLED_TABLES") {
        config.export.disabled_tables = split_list(&val);
    }

    // Migration overrides
    if let Some(val) = var("HARVEST_MIGRATION_BATCH_LIMIT") {
        config.migration.batch_limit = parse_override("HARVEST_MIGRATION_BATCH_LIMIT", &val)?;
    }

    // Storage overrides
    if let Some(val) = var("HARVEST_STORAGE_BUFFER_DIR") {
        config.storage.buffer_dir = PathBuf::from(val);
    }
    if let Some(val) = var("HARVEST_STORAGE_ARTIFACTS_DIR") {
        config.storage.artifacts_dir = PathBuf::from(val);
    }

    // Logging overrides
    if let Some(val) = var("HARVEST_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("HARVEST_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Some(val) = var("HARVEST_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = var("HARVEST_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("HARVEST_LOADER_TEST_VAR", "test_value");
        let input = "password = \"${HARVEST_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("HARVEST_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("HARVEST_LOADER_MISSING_VAR");
        let input = "password = \"${HARVEST_LOADER_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("HARVEST_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_env_vars_skips_comments() {
        std::env::remove_var("HARVEST_LOADER_COMMENTED");
        let input = "# connection_string = \"${HARVEST_LOADER_COMMENTED}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a*, b_* ,,c"), vec!["a*", "b_*", "c"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[application]
log_level = "debug"

[database]
connection_string = "postgresql://harvest:pw@localhost:5432/moodle"
table_prefix = "m_"

[export]
format = "csv"
default_storage = "file"

[migration]
batch_limit = 250
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.database.table_prefix, "m_");
        assert_eq!(config.export.format, "csv");
        assert_eq!(config.migration.batch_limit, 250);
        assert_eq!(config.export.flush_threshold, 10_000);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let toml_content = r#"
[database]
connection_string = "postgresql://harvest:pw@localhost:5432/moodle"

[migration]
batch_limit = 0
"#;
        let err = load_config_str(toml_content).unwrap_err();
        assert!(err.to_string().contains("batch_limit"));
    }
}
