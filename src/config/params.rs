// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Deserializer};

use crate::error::Error;
use crate::settings::{
    AuthSettings, CargoveraSettings, CarrierSettings, DbSettings, LabelSettings, MailSettings,
    ServerSettings, StripeSettings,
};

/// Raw configuration parameters, as read from a file and the environment.
#[derive(Debug, Deserialize, Default)]
pub struct Params {
    #[serde(default)]
    server: ServerParams,
    #[serde(default)]
    database: DatabaseParams,
    #[serde(default)]
    auth: AuthParams,
    #[serde(default)]
    mail: MailParams,
    #[serde(default)]
    fedex: CarrierParams,
    #[serde(default)]
    usps: CarrierParams,
    #[serde(default)]
    stripe: StripeParams,
    #[serde(default)]
    labels: LabelParams,
    #[serde(default)]
    default_contact_phone: String,
    #[serde(default)]
    debug: bool,
}

impl TryFrom<Params> for CargoveraSettings {
    type Error = Error;

    fn try_from(params: Params) -> Result<Self, Self::Error> {
        if params.auth.jwt_secret.trim().is_empty() {
            return Err(Error::Config("auth.jwt_secret is required".to_owned()));
        }
        if params.database.path.trim().is_empty() {
            return Err(Error::Config("database.path is required".to_owned()));
        }
        let public_url = params
            .server
            .public_url
            .unwrap_or_else(|| format!("http://localhost:{}", params.server.port));
        Ok(Self {
            server: ServerSettings {
                host: params.server.host,
                port: params.server.port,
                public_url: public_url.trim_end_matches('/').to_owned(),
                cors_origins: params.server.cors_origins,
                metrics: params.server.metrics,
            },
            database: DbSettings {
                path: params.database.path,
            },
            auth: AuthSettings {
                jwt_secret: params.auth.jwt_secret,
                token_ttl_mins: params.auth.token_ttl_mins,
                link_ttl_secs: params.auth.link_ttl_secs,
            },
            mail: MailSettings {
                host: params.mail.host,
                port: params.mail.port,
                username: params.mail.username,
                password: params.mail.password,
                from: params.mail.from,
                app_name: params.mail.app_name,
            },
            fedex: params.fedex.into(),
            usps: params.usps.into(),
            stripe: StripeSettings {
                base_url: params.stripe.base_url,
                secret_key: params.stripe.secret_key,
                webhook_secret: params.stripe.webhook_secret,
            },
            labels: LabelSettings {
                dir: params.labels.dir,
                url_ttl_secs: params.labels.url_ttl_secs,
            },
            default_contact_phone: params.default_contact_phone,
            debug: params.debug,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ServerParams {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    public_url: Option<String>,
    #[serde(default = "default_cors_origins", deserialize_with = "deserialize_list")]
    cors_origins: Vec<String>,
    #[serde(default = "default_true")]
    metrics: bool,
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            cors_origins: default_cors_origins(),
            metrics: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    80
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_owned(),
        "http://127.0.0.1:5173".to_owned(),
        "http://localhost:3000".to_owned(),
        "https://www.cargovera.com".to_owned(),
    ]
}

/// Accept either a list or a comma separated string.
fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Text(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(list) => list,
        ListOrString::Text(text) => text
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct DatabaseParams {
    #[serde(default = "default_db_path")]
    path: String,
}

impl Default for DatabaseParams {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "cargovera.db".to_owned()
}

#[derive(Debug, Deserialize)]
struct AuthParams {
    #[serde(default)]
    jwt_secret: String,
    #[serde(default = "default_token_ttl_mins")]
    token_ttl_mins: i64,
    #[serde(default = "default_link_ttl_secs")]
    link_ttl_secs: i64,
}

impl Default for AuthParams {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_mins: default_token_ttl_mins(),
            link_ttl_secs: default_link_ttl_secs(),
        }
    }
}

fn default_token_ttl_mins() -> i64 {
    60
}

fn default_link_ttl_secs() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct MailParams {
    #[serde(default)]
    host: String,
    #[serde(default = "default_smtp_port")]
    port: u16,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_mail_from")]
    from: String,
    #[serde(default = "default_app_name")]
    app_name: String,
}

impl Default for MailParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_mail_from(),
            app_name: default_app_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    465
}

fn default_mail_from() -> String {
    "noreply@cargovera.com".to_owned()
}

fn default_app_name() -> String {
    "cargovera.com".to_owned()
}

#[derive(Debug, Deserialize, Default)]
struct CarrierParams {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    account_number: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

impl From<CarrierParams> for CarrierSettings {
    fn from(params: CarrierParams) -> Self {
        Self {
            base_url: params.base_url.trim_end_matches('/').to_owned(),
            account_number: params.account_number,
            client_id: params.client_id,
            client_secret: params.client_secret,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeParams {
    #[serde(default = "default_stripe_url")]
    base_url: String,
    #[serde(default)]
    secret_key: String,
    #[serde(default)]
    webhook_secret: String,
}

impl Default for StripeParams {
    fn default() -> Self {
        Self {
            base_url: default_stripe_url(),
            secret_key: String::new(),
            webhook_secret: String::new(),
        }
    }
}

fn default_stripe_url() -> String {
    "https://api.stripe.com".to_owned()
}

#[derive(Debug, Deserialize)]
struct LabelParams {
    #[serde(default = "default_labels_dir")]
    dir: String,
    #[serde(default = "default_url_ttl_secs")]
    url_ttl_secs: i64,
}

impl Default for LabelParams {
    fn default() -> Self {
        Self {
            dir: default_labels_dir(),
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

fn default_labels_dir() -> String {
    "labels".to_owned()
}

fn default_url_ttl_secs() -> i64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let mut params = Params::default();
        params.auth.jwt_secret = "secret".to_owned();
        let settings = CargoveraSettings::try_from(params).unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 80);
        assert_eq!(settings.server.public_url, "http://localhost:80");
        assert_eq!(settings.server.cors_origins.len(), 4);
        assert_eq!(settings.mail.port, 465);
        assert_eq!(settings.auth.token_ttl_mins, 60);
        assert_eq!(settings.stripe.base_url, "https://api.stripe.com");
    }

    #[test]
    fn test_missing_secret() {
        let result = CargoveraSettings::try_from(Params::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cors_from_text() {
        let params: Params = serde_json::from_str(
            r#"{"server": {"cors_origins": "http://a.com, http://b.com"}}"#,
        )
        .unwrap();
        assert_eq!(
            params.server.cors_origins,
            vec!["http://a.com".to_owned(), "http://b.com".to_owned()]
        );
    }
}
