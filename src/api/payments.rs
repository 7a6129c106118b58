// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Balance top ups through Stripe.
//!
//! A payment starts `initiated` when its intent is created. The webhook moves
//! it to `success` (crediting the balance once) or `failure`.

use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{new_id, now};
use crate::error::Error;
use crate::model::money::Money;
use crate::model::payment::{Payment, PaymentIntentRequest, PaymentIntentResponse, PaymentStatus};
use crate::model::transaction::{Transaction, TransactionType};
use crate::stripe::verify_webhook;
use crate::utils::is_valid_currency;

use super::labels::add_to_balance;
use super::CargoveraApi;

const MIN_AMOUNT: Money = Money::from_cents(2_500);
const MAX_AMOUNT: Money = Money::from_cents(100_000);

fn payment_of(conn: &Connection, intent_id: &str) -> Result<Option<Payment>, Error> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE intent_id = ?1", Payment::COLUMNS),
            params![intent_id],
            Payment::from_row,
        )
        .optional()?)
}

fn set_status(conn: &Connection, payment: &Payment, status: PaymentStatus) -> Result<(), Error> {
    conn.execute(
        "UPDATE payments SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![payment.id.to_string(), status, now()],
    )?;
    Ok(())
}

impl CargoveraApi {
    /// Create a Stripe payment intent for a top up.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - amount outside 25..1000 or invalid currency
    ///
    pub async fn create_payment_intent(
        &self,
        user_id: &str,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, Error> {
        let amount = Money::parse_floor(&request.amount.0)?;
        if amount < MIN_AMOUNT || amount >= MAX_AMOUNT {
            return Err(Error::BadRequest(format!(
                "amount must be at least {} and less than {}",
                MIN_AMOUNT.to_decimal_string(),
                MAX_AMOUNT.to_decimal_string()
            )));
        }
        if !is_valid_currency(&request.currency) {
            return Err(Error::BadRequest(
                "currency must be a 3 letter lowercase code".to_owned(),
            ));
        }
        let intent = self
            .gateway
            .create_intent(amount, &request.currency, user_id)
            .await?;
        self.db.call(|conn| {
            let now = now();
            conn.execute(
                "INSERT INTO payments (id, user_id, intent_id, amount_cents, status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    new_id(),
                    user_id,
                    intent.id,
                    amount.cents(),
                    PaymentStatus::Initiated,
                    now
                ],
            )?;
            Ok(())
        })?;
        log::info!("Payment intent {} created for user {} ({})", intent.id, user_id, amount);
        Ok(PaymentIntentResponse {
            client_secret: intent.client_secret,
        })
    }

    /// Apply a Stripe webhook event.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - missing or invalid signature, malformed payload
    ///
    pub fn stripe_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), Error> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::BadRequest("Missing signature".to_owned()))?;
        let event = verify_webhook(
            payload,
            signature,
            &self.settings.stripe.webhook_secret,
            chrono::Utc::now().timestamp(),
        )?;
        let event_type = event["type"].as_str().unwrap_or_default();
        let intent_id = event["data"]["object"]["id"].as_str().unwrap_or_default();
        match event_type {
            "payment_intent.succeeded" => self.payment_succeeded(intent_id),
            "payment_intent.payment_failed" => self.payment_failed(intent_id),
            other => {
                log::info!("Ignoring Stripe event {}", other);
                Ok(())
            }
        }
    }

    fn payment_succeeded(&self, intent_id: &str) -> Result<(), Error> {
        let credited = self.db.transaction(|conn| {
            let Some(payment) = payment_of(conn, intent_id)? else {
                log::warn!("Stripe reported unknown payment intent {}", intent_id);
                return Ok(None);
            };
            if payment.status == PaymentStatus::Success {
                log::info!("Payment {} already credited", intent_id);
                return Ok(None);
            }
            let user_id = payment.user_id.to_string();
            let balance = add_to_balance(conn, &user_id, payment.amount)?;
            Transaction::insert(
                conn,
                &user_id,
                payment.amount,
                balance,
                TransactionType::Deposit,
                &format!("funds from strip payment {}", intent_id),
            )?;
            set_status(conn, &payment, PaymentStatus::Success)?;
            Ok(Some(payment))
        })?;
        if let Some(payment) = credited {
            self.metrics.balance_credited(payment.amount.cents());
            log::info!(
                "Credited {} to user {} from payment {}",
                payment.amount,
                payment.user_id,
                intent_id
            );
        }
        Ok(())
    }

    fn payment_failed(&self, intent_id: &str) -> Result<(), Error> {
        self.db.transaction(|conn| {
            match payment_of(conn, intent_id)? {
                Some(payment) if payment.status != PaymentStatus::Success => {
                    set_status(conn, &payment, PaymentStatus::Failure)?;
                    log::info!("Payment {} failed", intent_id);
                }
                Some(_) => log::warn!("Failure reported for credited payment {}", intent_id),
                None => log::warn!("Stripe reported unknown payment intent {}", intent_id),
            }
            Ok(())
        })
    }
}
