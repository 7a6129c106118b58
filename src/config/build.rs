// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use config::Config;

use crate::error::Error;
use crate::settings::CargoveraSettings;

use super::params::Params;

/// Environment prefix, e.g. `CARGOVERA_SERVER__PORT=8080`.
pub const ENV_PREFIX: &str = "CARGOVERA";

/// Build the settings from an optional file (json, yaml or toml) and,
/// when `env` is set, the environment. Environment values win.
///
/// # Errors
///
/// * `Error::Config` - unreadable file, malformed values or a missing required setting
///
pub fn build_config(env: bool, file: &str) -> Result<CargoveraSettings, Error> {
    let mut config = Config::builder();

    // file configuration (json, yaml or toml)
    if !file.is_empty() {
        config = config.add_source(config::File::with_name(file));
    }

    // Env configuration
    if env {
        config = config.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );
    }

    // Logging is not set up yet: errors carry their context to the caller.
    let config = config
        .build()
        .map_err(|e| Error::Config(format!("cannot read settings: {}", e)))?;

    let params: Params = config
        .try_deserialize()
        .map_err(|e| Error::Config(format!("malformed settings: {}", e)))?;

    CargoveraSettings::try_from(params)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::TempDir;

    use super::build_config;
    use crate::error::Error;

    #[test]
    #[serial]
    fn test_env() {
        std::env::set_var("CARGOVERA_AUTH__JWT_SECRET", "from-env");
        std::env::set_var("CARGOVERA_SERVER__PORT", "8080");
        std::env::set_var("CARGOVERA_SERVER__CORS_ORIGINS", "http://a.com,http://b.com");
        std::env::set_var("CARGOVERA_FEDEX__BASE_URL", "https://apis-sandbox.fedex.com/");

        let settings = build_config(true, "").unwrap();

        std::env::remove_var("CARGOVERA_AUTH__JWT_SECRET");
        std::env::remove_var("CARGOVERA_SERVER__PORT");
        std::env::remove_var("CARGOVERA_SERVER__CORS_ORIGINS");
        std::env::remove_var("CARGOVERA_FEDEX__BASE_URL");

        assert_eq!(settings.auth.jwt_secret, "from-env");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(
            settings.server.cors_origins,
            vec!["http://a.com".to_owned(), "http://b.com".to_owned()]
        );
        assert_eq!(settings.fedex.base_url, "https://apis-sandbox.fedex.com");
    }

    #[test]
    #[serial]
    fn test_env_without_secret() {
        std::env::remove_var("CARGOVERA_AUTH__JWT_SECRET");
        assert!(matches!(build_config(true, ""), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_json() {
        let content = r#"
            {
              "server": { "port": 9000, "public_url": "https://api.cargovera.com/" },
              "database": { "path": "/app/data/cargovera.db" },
              "auth": { "jwt_secret": "file-secret" },
              "mail": { "host": "smtp.gmail.com", "username": "ops@cargovera.com" },
              "labels": { "dir": "/app/labels" },
              "debug": true
            }"#;
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("config.json");
        std::fs::write(&temp_file_path, content.as_bytes()).unwrap();

        let settings = build_config(false, temp_file_path.to_str().unwrap()).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.public_url, "https://api.cargovera.com");
        assert_eq!(settings.database.path, "/app/data/cargovera.db");
        assert_eq!(settings.mail.host, "smtp.gmail.com");
        assert_eq!(settings.mail.port, 465);
        assert!(settings.debug);
    }

    #[test]
    #[serial]
    fn test_yaml() {
        let content = r#"
        server:
            host: "127.0.0.1"
        auth:
            jwt_secret: "yaml-secret"
            token_ttl_mins: 15
        usps:
            base_url: "https://apis-tem.usps.com"
            client_id: "id"
            client_secret: "secret"
        "#;
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("config.yaml");
        std::fs::write(&temp_file_path, content.as_bytes()).unwrap();

        let settings = build_config(false, temp_file_path.to_str().unwrap()).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.auth.token_ttl_mins, 15);
        assert_eq!(settings.usps.client_id, "id");
    }

    #[test]
    #[serial]
    fn test_toml_with_env_override() {
        let content = r#"
        [server]
        port = 8081

        [auth]
        jwt_secret = "toml-secret"

        [stripe]
        secret_key = "sk_test"
        webhook_secret = "whsec_file"
        "#;
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("config.toml");
        std::fs::write(&temp_file_path, content.as_bytes()).unwrap();

        std::env::set_var("CARGOVERA_STRIPE__WEBHOOK_SECRET", "whsec_env");
        let settings = build_config(true, temp_file_path.to_str().unwrap()).unwrap();
        std::env::remove_var("CARGOVERA_STRIPE__WEBHOOK_SECRET");

        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.stripe.secret_key, "sk_test");
        assert_eq!(settings.stripe.webhook_secret, "whsec_env");
    }

    #[test]
    fn test_missing_file() {
        let Err(Error::Config(message)) = build_config(false, "/nonexistent/cargovera.toml") else {
            panic!("a missing file must be a configuration error");
        };
        assert!(message.starts_with("cannot read settings: "));
    }

    #[test]
    #[serial]
    fn test_malformed_value() {
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("config.json");
        std::fs::write(
            &temp_file_path,
            br#"{"auth": {"jwt_secret": "s"}, "server": {"port": "eighty"}}"#,
        )
        .unwrap();
        let Err(Error::Config(message)) = build_config(false, temp_file_path.to_str().unwrap())
        else {
            panic!("a malformed port must be a configuration error");
        };
        assert!(message.starts_with("malformed settings: "));
    }
}
