// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Public base URL used to build links sent to clients (verification mail, label downloads).
    pub public_url: String,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Serve `/metrics`.
    pub metrics: bool,
}

/// Database settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DbSettings {
    /// Path of the SQLite database file, `:memory:` for a transient database.
    pub path: String,
}

/// Token settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub jwt_secret: String,
    /// Access token lifetime in minutes.
    pub token_ttl_mins: i64,
    /// Verification and reset token lifetime in seconds.
    pub link_ttl_secs: i64,
}

/// Outgoing mail settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MailSettings {
    /// SMTP relay host, mail is only logged when empty.
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub app_name: String,
}

/// Carrier API credentials.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CarrierSettings {
    pub base_url: String,
    pub account_number: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Stripe settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StripeSettings {
    pub base_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Label document storage.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSettings {
    /// Root directory of stored label documents.
    pub dir: String,
    /// Lifetime of signed download URLs.
    pub url_ttl_secs: i64,
}

/// Cargovera settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CargoveraSettings {
    pub server: ServerSettings,
    pub database: DbSettings,
    pub auth: AuthSettings,
    pub mail: MailSettings,
    pub fedex: CarrierSettings,
    pub usps: CarrierSettings,
    pub stripe: StripeSettings,
    pub labels: LabelSettings,
    /// Phone number used when a shipment contact has none.
    pub default_contact_phone: String,
    pub debug: bool,
}

impl CargoveraSettings {
    /// Settings for an in-memory instance, used by tests.
    pub fn ephemeral(labels_dir: &str) -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_owned(),
                port: 0,
                public_url: "http://localhost".to_owned(),
                cors_origins: vec![],
                metrics: true,
            },
            database: DbSettings {
                path: ":memory:".to_owned(),
            },
            auth: AuthSettings {
                jwt_secret: "test-secret".to_owned(),
                token_ttl_mins: 60,
                link_ttl_secs: 3600,
            },
            mail: MailSettings {
                host: String::new(),
                port: 465,
                username: String::new(),
                password: String::new(),
                from: "noreply@cargovera.com".to_owned(),
                app_name: "cargovera.com".to_owned(),
            },
            fedex: CarrierSettings::default(),
            usps: CarrierSettings::default(),
            stripe: StripeSettings {
                base_url: "https://api.stripe.com".to_owned(),
                secret_key: String::new(),
                webhook_secret: "whsec_test".to_owned(),
            },
            labels: LabelSettings {
                dir: labels_dir.to_owned(),
                url_ttl_secs: 3600,
            },
            default_contact_phone: String::new(),
            debug: true,
        }
    }
}
