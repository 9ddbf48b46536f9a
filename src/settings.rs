use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    #[serde(default)]
    pub access: Access,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    /// SeaORM/SQLx connection string
    /// Examples:
    /// - SQLite: sqlite://perimeter.db?mode=rwc
    /// - SQLite in memory: sqlite::memory:
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Access {
    /// Directory of `.kdl` system-policy files loaded at startup. Unset means none.
    pub policies_dir: Option<PathBuf>,
    /// Register the deny policies protecting builtin resources and roles.
    #[serde(default = "default_true")]
    pub builtin_guardrails: bool,
    /// Create the Owner / Engineer / Viewer roles if missing.
    #[serde(default = "default_true")]
    pub provision_builtin_roles: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8181,
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: "sqlite://perimeter.db?mode=rwc".to_string(),
        }
    }
}

impl Default for Access {
    fn default() -> Self {
        Self {
            policies_dir: None,
            builtin_guardrails: true,
            provision_builtin_roles: true,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("database.url", Database::default().url)
            .into_diagnostic()?
            .set_default("access.builtin_guardrails", true)
            .into_diagnostic()?
            .set_default("access.provision_builtin_roles", true)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PERIMETER__SERVER__PORT=9090, etc.
        builder =
            builder.add_source(config::Environment::with_prefix("PERIMETER").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize policies dir to be relative to current dir
        if let Some(dir) = &s.access.policies_dir {
            if dir.is_relative() {
                s.access.policies_dir =
                    Some(std::env::current_dir().into_diagnostic()?.join(dir));
            }
        }

        Ok(s)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_settings_load_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        // Load settings with nonexistent file - should use defaults
        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8181);
        assert_eq!(settings.database.url, "sqlite://perimeter.db?mode=rwc");
        assert!(settings.access.policies_dir.is_none());
        assert!(settings.access.builtin_guardrails);
    }

    #[test]
    fn test_settings_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 9090

[database]
url = "sqlite::memory:"

[access]
policies_dir = "/etc/perimeter/policies"
builtin_guardrails = false
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(
            settings.access.policies_dir,
            Some(PathBuf::from("/etc/perimeter/policies"))
        );
        assert!(!settings.access.builtin_guardrails);
        assert_eq!(settings.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn test_settings_env_override() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 8080
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        env::set_var("PERIMETER__ACCESS__PROVISION_BUILTIN_ROLES", "false");

        // Load settings - env should override file and defaults
        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(settings.server.host, "127.0.0.1");
        assert!(!settings.access.provision_builtin_roles);

        // Cleanup
        env::remove_var("PERIMETER__ACCESS__PROVISION_BUILTIN_ROLES");
    }

    #[test]
    fn test_policies_dir_normalization() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[access]
policies_dir = "relative/policies"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        let dir = settings.access.policies_dir.expect("policies_dir missing");
        assert!(dir.is_absolute());
        assert!(dir.ends_with("relative/policies"));
    }
}
