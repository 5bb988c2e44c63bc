use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// One of "memory", "sqlite", "postgres".
    pub backend: String,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.backend", "memory")?
            .set_default("database.url", "sqlite://data/authgate.db")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.jwt_secret", "development_secret")?
            .set_default("auth.access_ttl_minutes", 15)?
            .set_default("auth.refresh_ttl_days", 30)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allow_any_origin", true)?
            .set_default(
                "cors.allowed_origins",
                vec!["http://localhost:8080".to_string()],
            )?
            .set_default("cors.max_age", 300)?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn new_for_test() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("environment", "test")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.backend", "memory")?
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.max_connections", 2)?
            .set_default("auth.jwt_secret", "test_secret")?
            .set_default("auth.access_ttl_minutes", 15)?
            .set_default("auth.refresh_ttl_days", 1)?
            .set_default("cors.enabled", false)?
            .set_default("cors.allow_any_origin", false)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            .set_default("cors.max_age", 300)?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn cleanup_env() {
        env::remove_var("APP_SERVER__PORT");
        env::remove_var("APP_DATABASE__BACKEND");
        env::remove_var("APP_DATABASE__URL");
        env::remove_var("APP_AUTH__JWT_SECRET");
        env::remove_var("APP_AUTH__ACCESS_TTL_MINUTES");
    }

    #[test]
    fn test_settings_defaults() {
        cleanup_env();
        let settings = Settings::new_for_test().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.database.backend, "memory");
        assert_eq!(settings.auth.access_ttl_minutes, 15);
        assert_eq!(settings.auth.refresh_ttl_days, 1);
    }

    #[test]
    fn test_environment_override() {
        cleanup_env();

        env::set_var("APP_DATABASE__BACKEND", "sqlite");
        env::set_var("APP_DATABASE__URL", "sqlite://override.db");
        env::set_var("APP_AUTH__JWT_SECRET", "override_secret");
        env::set_var("APP_AUTH__ACCESS_TTL_MINUTES", "5");

        let config = Config::builder()
            .set_default("environment", "test").unwrap()
            .set_default("server.host", "127.0.0.1").unwrap()
            .set_default("server.port", 8080).unwrap()
            .set_default("server.workers", 2).unwrap()
            .set_default("database.backend", "memory").unwrap()
            .set_default("database.url", "sqlite::memory:").unwrap()
            .set_default("database.max_connections", 2).unwrap()
            .set_default("auth.jwt_secret", "test_secret").unwrap()
            .set_default("auth.access_ttl_minutes", 15).unwrap()
            .set_default("auth.refresh_ttl_days", 30).unwrap()
            .set_default("cors.enabled", false).unwrap()
            .set_default("cors.allow_any_origin", false).unwrap()
            .set_default("cors.allowed_origins", Vec::<String>::new()).unwrap()
            .set_default("cors.max_age", 300).unwrap()
            // Add environment variables last to override defaults
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()
            .expect("Failed to build config")
            .try_deserialize::<Settings>()
            .expect("Failed to deserialize settings");

        assert_eq!(config.database.backend, "sqlite");
        assert_eq!(config.database.url, "sqlite://override.db");
        assert_eq!(config.auth.jwt_secret, "override_secret");
        assert_eq!(config.auth.access_ttl_minutes, 5);

        cleanup_env();
    }
}
