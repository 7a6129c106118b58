// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Outgoing mail.
//!
//! Mail is handed to a [`Mailer`] in a background task; delivery failures are
//! logged and never reach the request that caused the mail.
//!

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::error::Error;
use crate::settings::MailSettings;

/// An HTML mail.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), Error>;
}

/// Send `email` without waiting for delivery.
pub fn send_in_background(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        let to = email.to.clone();
        let subject = email.subject.clone();
        match mailer.send(email).await {
            Ok(()) => log::debug!("Mail '{}' sent to {}", subject, to),
            Err(e) => log::error!("Failed to send mail '{}' to {}: {}", subject, to, e),
        }
    });
}

/// Build the mailer for the settings: SMTP when a relay host is configured,
/// otherwise a mailer that only logs.
pub fn build_mailer(settings: &MailSettings) -> Result<Arc<dyn Mailer>, Error> {
    if settings.host.is_empty() {
        log::warn!("No SMTP host configured, outgoing mail is logged and dropped");
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(SmtpMailer::new(settings)?))
}

/// SMTP relay with implicit TLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Result<Self, Error> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| Error::Config(format!("Invalid mail sender {}: {}", settings.from, e)))?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| Error::Config(format!("Invalid SMTP relay {}: {}", settings.host, e)))?
            .port(settings.port);
        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, email: Email) -> Result<Message, Error> {
        let mailbox = |address: &str| {
            address
                .parse::<Mailbox>()
                .map_err(|e| Error::BadRequest(format!("Invalid address {}: {}", address, e)))
        };
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(mailbox(&email.to)?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML);
        if let Some(cc) = email.cc.as_deref().filter(|cc| !cc.is_empty()) {
            builder = builder.cc(mailbox(cc)?);
        }
        builder
            .body(email.html)
            .map_err(|e| Error::Internal(format!("Mail build error: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), Error> {
        let message = self.message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| Error::External(format!("SMTP error: {}", e)))?;
        Ok(())
    }
}

/// Logs mail instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), Error> {
        log::info!("Mail to {} not sent: {}", email.to, email.subject);
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Mail with the e-mail verification link.
pub fn verification_email(to: &str, app_name: &str, link: &str) -> Email {
    Email {
        to: to.to_owned(),
        cc: None,
        subject: "Verify your email".to_owned(),
        html: format!(
            "<p>Welcome to {app}.</p>\
             <p>Click this link to verify your email: <a href=\"{link}\">{link}</a></p>",
            app = escape(app_name),
            link = escape(link)
        ),
    }
}

pub fn reset_password_email(to: &str, app_name: &str, link: &str) -> Email {
    Email {
        to: to.to_owned(),
        cc: None,
        subject: format!("[{}] reset your password", app_name),
        html: format!(
            "<p>Use this link to reset your password: <a href=\"{link}\">{link}</a></p>\
             <p>If you did not ask for a reset, ignore this mail.</p>",
            link = escape(link)
        ),
    }
}

/// A product line of a shipment notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentLine {
    pub name: String,
    pub upc: String,
    pub quantity: i64,
}

/// Mail asking a holder to ship a fulfillment request.
pub fn shipment_email(
    holder: &str,
    owner: &str,
    owner_name: &str,
    shipment_id: &str,
    products: &[ShipmentLine],
    notes: &str,
) -> Email {
    let rows: String = products
        .iter()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&p.name),
                escape(&p.upc),
                p.quantity
            )
        })
        .collect();
    Email {
        to: holder.to_owned(),
        cc: Some(owner.to_owned()),
        subject: format!("CARGOVERA Shipment Notification: {}", shipment_id),
        html: format!(
            "<p>{owner} requested shipment {id}.</p>\
             <table><tr><th>Product</th><th>UPC</th><th>Quantity</th></tr>{rows}</table>\
             <p>{notes}</p>",
            owner = escape(owner_name),
            id = escape(shipment_id),
            rows = rows,
            notes = escape(notes)
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[tokio::test]
    async fn test_send_in_background() {
        let mailer = Arc::new(RecordingMailer::default());
        send_in_background(
            mailer.clone(),
            verification_email("ada@example.com", "cargovera.com", "http://x/verify?token=t"),
        );
        let sent = mailer.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Verify your email");
        assert!(sent[0].html.contains("http://x/verify?token=t"));
    }

    #[test]
    fn test_shipment_email() {
        let email = shipment_email(
            "holder@example.com",
            "owner@example.com",
            "Owner <Inc>",
            "req-1",
            &[ShipmentLine {
                name: "Mug".to_owned(),
                upc: "036000291452".to_owned(),
                quantity: 3,
            }],
            "Please ship ASAP.",
        );
        assert_eq!(email.subject, "CARGOVERA Shipment Notification: req-1");
        assert_eq!(email.cc.as_deref(), Some("owner@example.com"));
        assert!(email.html.contains("Owner &lt;Inc&gt;"));
        assert!(email.html.contains("<td>036000291452</td><td>3</td>"));
    }

    #[test]
    fn test_build_mailer_without_host() {
        let settings = MailSettings {
            host: String::new(),
            port: 465,
            username: String::new(),
            password: String::new(),
            from: "noreply@cargovera.com".to_owned(),
            app_name: "cargovera.com".to_owned(),
        };
        assert!(build_mailer(&settings).is_ok());
        let mut bad = settings.clone();
        bad.host = "smtp.example.com".to_owned();
        bad.from = "not an address".to_owned();
        assert!(matches!(SmtpMailer::new(&bad), Err(Error::Config(_))));
    }
}
