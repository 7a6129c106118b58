// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::{params, Connection};

use crate::database::{new_id, now};
use crate::error::Error;
use crate::mail::{reset_password_email, send_in_background, verification_email};
use crate::model::user::{User, UserRegister};
use crate::security::{spawn_hash_password, spawn_verify_password};

use super::{user_by_email, user_by_id, CargoveraApi};

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Insert a new account. A taken e-mail is reported as already registered.
fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    phone: Option<&str>,
    password_hash: &str,
) -> Result<(), Error> {
    let now = now();
    conn.execute(
        "INSERT INTO users (id, name, email, phone, password_hash, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![new_id(), name, email, phone, password_hash, now],
    )
    .map_err(|e| match Error::from(e) {
        Error::Constraint(_) => Error::BadRequest("Email already registered".to_owned()),
        e => e,
    })?;
    Ok(())
}

impl CargoveraApi {
    fn send_verification(&self, email: &str) -> Result<(), Error> {
        let token = self.tokens.email_token(email)?;
        let link = format!(
            "{}/auth/verify?token={}",
            self.settings.server.public_url.trim_end_matches('/'),
            token
        );
        send_in_background(
            self.mailer.clone(),
            verification_email(email, &self.settings.mail.app_name, &link),
        );
        Ok(())
    }

    /// Check credentials and issue an access token.
    ///
    /// # Errors
    ///
    /// * `Error::Unauthorized` - unknown e-mail or wrong password
    /// * `Error::Forbidden` - e-mail not verified (a new link is mailed) or account inactive
    ///
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, Error> {
        log::info!("Login request received for {}", email);
        let invalid = || Error::Unauthorized("Invalid credentials".to_owned());
        let user = self
            .db
            .call(|conn| user_by_email(conn, email))?
            .ok_or_else(invalid)?;
        if !spawn_verify_password(password.to_owned(), user.password_hash.clone()).await {
            return Err(invalid());
        }
        if !user.is_email_verified {
            log::warn!("Email not verified for {}", email);
            self.send_verification(&user.email)?;
            return Err(Error::Forbidden(
                "Email not verified. A new verification link has been sent to your inbox."
                    .to_owned(),
            ));
        }
        if !user.is_active {
            log::warn!("Account not active for {}", email);
            return Err(Error::Forbidden("Account is not active".to_owned()));
        }
        let access_token = self.tokens.access_token(&user)?;
        log::info!("Login successful for {} {}", user.id, email);
        Ok(LoginOutcome { user, access_token })
    }

    /// User of an access token.
    ///
    /// # Errors
    ///
    /// * `Error::Unauthorized` - "Invalid token"
    /// * `Error::NotFound` - the user no longer exists
    ///
    pub fn authenticate(&self, token: &str) -> Result<User, Error> {
        let claims = self.tokens.verify_access(token)?;
        self.user(&claims.user_id.to_string())
    }

    /// Register an account and mail its verification link.
    pub async fn register(&self, request: UserRegister) -> Result<(), Error> {
        log::info!("Register request received for {}", request.email);
        let email = request.email.trim().to_owned();
        let name = request.name.trim().to_owned();
        if name.is_empty() {
            return Err(Error::BadRequest("name is required".to_owned()));
        }
        if !email.contains('@') {
            return Err(Error::BadRequest("invalid email".to_owned()));
        }
        if request.password.len() < MIN_PASSWORD_LEN {
            return Err(Error::BadRequest(format!(
                "password must have at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let password_hash = spawn_hash_password(request.password).await?;
        self.db.transaction(|conn| {
            if user_by_email(conn, &email)?.is_some() {
                log::warn!("Email already registered for {}", email);
                return Err(Error::BadRequest("Email already registered".to_owned()));
            }
            insert_user(conn, &name, &email, request.phone.as_deref(), &password_hash)
        })?;
        self.send_verification(&email)
    }

    /// Mark the e-mail of a verification token as verified.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - "Invalid or expired token"
    /// * `Error::NotFound` - "User not found"
    ///
    pub fn verify_email(&self, token: &str) -> Result<&'static str, Error> {
        let email = self
            .tokens
            .verify_email_token(token)
            .ok_or_else(|| Error::BadRequest("Invalid or expired token".to_owned()))?;
        self.db.transaction(|conn| {
            let user = user_by_email(conn, &email)?.ok_or_else(super::user_not_found)?;
            if user.is_email_verified {
                return Ok("Email already verified");
            }
            conn.execute(
                "UPDATE users SET is_email_verified = 1, updated_at = ?2 WHERE id = ?1",
                params![user.id.to_string(), now()],
            )?;
            log::info!("Email verified for {}", email);
            Ok("Email verified successfully")
        })
    }

    /// Mail a password reset link when the e-mail belongs to an account.
    pub fn forgot_password(&self, email: &str) -> Result<(), Error> {
        log::info!("Forgot password request received for {}", email);
        if let Some(user) = self.db.call(|conn| user_by_email(conn, email))? {
            let token = self.tokens.reset_token(&user.email)?;
            let link = format!(
                "{}/reset-password?token={}",
                self.settings.server.public_url.trim_end_matches('/'),
                token
            );
            send_in_background(
                self.mailer.clone(),
                reset_password_email(&user.email, &self.settings.mail.app_name, &link),
            );
        }
        Ok(())
    }

    /// Set a new password with a reset token.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - short password or "Invalid or expired token"
    /// * `Error::NotFound` - "User not found"
    ///
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), Error> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(Error::BadRequest(format!(
                "new_password must have at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let email = self
            .tokens
            .verify_reset_token(token)
            .ok_or_else(|| Error::BadRequest("Invalid or expired token".to_owned()))?;
        let password_hash = spawn_hash_password(new_password.to_owned()).await?;
        self.db.transaction(|conn| {
            let user = user_by_email(conn, &email)?.ok_or_else(super::user_not_found)?;
            conn.execute(
                "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
                params![user.id.to_string(), password_hash, now()],
            )?;
            user_by_id(conn, &user.id.to_string())
        })?;
        log::info!("Password reset for {}", email);
        Ok(())
    }
}
