// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Label quotes, purchases, cancellations and documents.
//!
//! A purchase debits the multiplied carrier price from the buyer's balance and
//! a cancellation refunds it. Both movements are written in the same database
//! transaction as the label change they pay for.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::database::{date_range, new_id, now, to_db_time, Filter, Listing};
use crate::error::Error;
use crate::model::label::{
    BuyLabelRequest, Carrier, Label, LabelDocument, LabelFilters, LabelStatus, LabelUrl,
    RatesRequest, ShipmentRate, UploadedFile, ValidationResult,
};
use crate::model::money::Money;
use crate::model::order::OrderStatus;
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::transaction::{Transaction, TransactionType};
use crate::storage::{content_type_of, LabelStore};

use super::{user_by_id, CargoveraApi};

pub const MAX_UPLOAD_FILES: usize = 10;
pub const MAX_UPLOAD_MB: usize = 5;
const UPLOAD_ORDER_NUMBER: &str = "0123456789";

fn label_not_found() -> Error {
    Error::NotFound("Label not found".to_owned())
}

fn label_by_tracking(
    conn: &Connection,
    user_id: &str,
    tracking_number: &str,
) -> Result<Option<Label>, Error> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM labels WHERE tracking_number = ?1 AND user_id = ?2 \
                 ORDER BY created_at DESC LIMIT 1",
                Label::COLUMNS
            ),
            params![tracking_number, user_id],
            Label::from_row,
        )
        .optional()?)
}

fn insert_label(conn: &Connection, label: &Label) -> Result<(), Error> {
    let created_at = to_db_time(&label.created_at);
    conn.execute(
        "INSERT INTO labels (id, user_id, order_number, tracking_number, label_url, carrier, \
         service_type, cost_estimate_cents, cost_actual_cents, status, invoice_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            label.id.to_string(),
            label.user_id.to_string(),
            label.order_number,
            label.tracking_number,
            label.label_url,
            label.carrier,
            label.service_type,
            label.cost_estimate.cents(),
            label.cost_actual.map(|c| c.cents()),
            label.status,
            label.invoice_id,
            created_at
        ],
    )?;
    Ok(())
}

/// Add `amount` to a balance, returning the new balance.
pub(crate) fn add_to_balance(conn: &Connection, user_id: &str, amount: Money) -> Result<Money, Error> {
    conn.execute(
        "UPDATE users SET balance_cents = balance_cents + ?2, updated_at = ?3 WHERE id = ?1",
        params![user_id, amount.cents(), now()],
    )?;
    Ok(user_by_id(conn, user_id)?.balance)
}

fn parse_uuid(id: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(id).map_err(|_| Error::BadRequest(format!("Invalid id {}", id)))
}

impl CargoveraApi {
    /// Quotes of every carrier able to ship the packages, in the user's prices,
    /// cheapest first.
    pub async fn rates(&self, user_id: &str, request: &RatesRequest) -> Result<Vec<ShipmentRate>, Error> {
        let user = self.user(user_id)?;
        let mut rates = if request.packages.len() == 1 {
            let (mut fedex, usps) = tokio::try_join!(
                self.carriers.fedex.rates(request),
                self.carriers.usps.rates(request)
            )?;
            fedex.extend(usps);
            fedex
        } else {
            self.carriers.fedex.rates(request).await?
        };
        for rate in rates.iter_mut() {
            rate.total_charge = user.multiplier.apply(rate.total_charge)?;
        }
        rates.sort_by_key(|rate| rate.total_charge);
        Ok(rates)
    }

    /// Buy the labels of a shipment and pay them from the user's balance.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedCarrier` - carrier other than FedEx or USPS
    /// * `Error::RateNotAvailable` - no quote for the requested service
    /// * `Error::InsufficientBalance` - balance below the multiplied quote
    ///
    pub async fn buy_label(
        &self,
        user_id: &str,
        carrier: Carrier,
        request: BuyLabelRequest,
    ) -> Result<Vec<Label>, Error> {
        let client = self.carriers.get(carrier)?;
        let user = self.user(user_id)?;

        let quote = client
            .rates(&request.rates_request())
            .await?
            .into_iter()
            .find(|rate| rate.service_type == request.service_type)
            .ok_or_else(|| Error::RateNotAvailable(request.service_type.clone()))?;
        let estimate = user.multiplier.apply(quote.total_charge)?;
        if user.balance < estimate {
            return Err(Error::InsufficientBalance {
                balance: user.balance,
                required: estimate,
            });
        }

        let purchased = client.buy(&request).await?;
        if purchased.is_empty() {
            return Err(Error::External(format!(
                "{} did not return label details.",
                carrier
            )));
        }

        let order_number = request.order_number.clone().filter(|o| !o.is_empty());
        let mut labels = Vec::with_capacity(purchased.len());
        for (idx, bought) in purchased.into_iter().enumerate() {
            let order_ref = order_number
                .clone()
                .unwrap_or_else(|| bought.tracking_number.clone());
            let key = match bought.document {
                LabelDocument::Url(url) => {
                    let key = LabelStore::label_key(carrier.as_str(), &order_ref, idx + 1, "pdf");
                    self.store.fetch_and_put(&url, &key).await?;
                    key
                }
                LabelDocument::Bytes { data, extension } => {
                    let key =
                        LabelStore::label_key(carrier.as_str(), &order_ref, idx + 1, &extension);
                    self.store.put(&key, &data).await?;
                    key
                }
            };
            let base = bought.cost.unwrap_or(quote.total_charge);
            labels.push(Label {
                id: Uuid::new_v4(),
                user_id: user.id,
                status: LabelStatus::New,
                order_number: order_number.clone(),
                tracking_number: bought.tracking_number,
                label_url: key,
                carrier,
                service_type: request.service_type.clone(),
                cost_estimate: user.multiplier.apply(base)?,
                cost_actual: Some(base),
                invoice_id: None,
                created_at: chrono::Utc::now(),
            });
        }

        self.db.transaction(|conn| {
            if let Some(order_number) = &order_number {
                conn.execute(
                    "UPDATE orders SET status = ?3, updated_at = ?4 \
                     WHERE order_number = ?1 AND user_id = ?2",
                    params![order_number, user_id, OrderStatus::Shipped, now()],
                )?;
            }
            for label in &labels {
                let balance = add_to_balance(conn, user_id, -label.cost_estimate)?;
                Transaction::insert(
                    conn,
                    user_id,
                    label.cost_estimate,
                    balance,
                    TransactionType::Usage,
                    &format!(
                        "Label purchase for tracking {} - {}",
                        label.tracking_number, label.service_type
                    ),
                )?;
                insert_label(conn, label)?;
            }
            Ok(())
        })?;
        self.metrics
            .labels_purchased(carrier.as_str(), labels.len() as u64);
        log::info!(
            "User {} bought {} {} label(s) for order {:?}",
            user_id,
            labels.len(),
            carrier,
            order_number
        );
        Ok(labels)
    }

    /// Check a shipment with the carrier without buying it.
    pub async fn validate_shipment(
        &self,
        carrier: Carrier,
        request: &BuyLabelRequest,
    ) -> Result<ValidationResult, Error> {
        self.carriers.get(carrier)?.validate(request).await
    }

    /// Cancel a label with its carrier and refund it.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - "Label not found"
    /// * `Error::BadRequest` - "Label already cancelled"
    ///
    pub async fn cancel_label(
        &self,
        user_id: &str,
        carrier: Carrier,
        tracking_number: &str,
    ) -> Result<(), Error> {
        let client = self.carriers.get(carrier)?;
        self.db
            .call(|conn| label_by_tracking(conn, user_id, tracking_number))?
            .ok_or_else(label_not_found)?;
        client.cancel(tracking_number).await?;

        self.db.transaction(|conn| {
            let label = label_by_tracking(conn, user_id, tracking_number)?
                .ok_or_else(label_not_found)?;
            if label.status == LabelStatus::Cancelled {
                return Err(Error::BadRequest("Label already cancelled".to_owned()));
            }
            conn.execute(
                "UPDATE labels SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![label.id.to_string(), LabelStatus::Cancelled, now()],
            )?;
            let balance = add_to_balance(conn, user_id, label.cost_estimate)?;
            Transaction::insert(
                conn,
                user_id,
                label.cost_estimate,
                balance,
                TransactionType::Refund,
                &format!(
                    "Refund label purchase for tracking {} - {}",
                    label.tracking_number, label.service_type
                ),
            )?;
            Ok(())
        })?;
        log::info!("User {} cancelled label {}", user_id, tracking_number);
        Ok(())
    }

    pub fn list_labels(
        &self,
        user_id: &str,
        filters: &LabelFilters,
        page: &PageQuery,
    ) -> Result<Paginated<Label>, Error> {
        let mut conditions = vec![Filter::eq("user_id", user_id.to_owned())];
        if let Some(status) = filters.status {
            conditions.push(Filter::eq("status", status));
        }
        if let Some(carrier) = filters.carrier {
            conditions.push(Filter::eq("carrier", carrier));
        }
        conditions.extend(date_range(
            "created_at",
            filters.date_from.as_deref(),
            filters.date_to.as_deref(),
        )?);
        let listing = Listing {
            columns: Label::COLUMNS,
            from: "labels",
            id_column: "id",
            created_column: "created_at",
            filters: conditions,
            base_path: "/labels",
        };
        self.db
            .call(|conn| listing.paginate(conn, page, Label::from_row))
    }

    fn signed(&self, label: &Label) -> Result<LabelUrl, Error> {
        Ok(LabelUrl {
            id: label.id,
            tracking_number: label.tracking_number.clone(),
            url: self.store.signed_url(&label.label_url)?,
        })
    }

    /// Download links of the user's labels of an order.
    pub fn labels_of_order(&self, user_id: &str, order_number: &str) -> Result<Vec<LabelUrl>, Error> {
        let labels = self.db.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM labels WHERE order_number = ?1 AND user_id = ?2 ORDER BY created_at",
                Label::COLUMNS
            ))?;
            let labels = stmt
                .query_map(params![order_number, user_id], Label::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(labels)
        })?;
        if labels.is_empty() {
            return Err(label_not_found());
        }
        labels.iter().map(|label| self.signed(label)).collect()
    }

    /// Download link of one label.
    pub fn label_url(&self, user_id: &str, id: &str) -> Result<LabelUrl, Error> {
        let not_found = || Error::NotFound(format!("label {} not found", id));
        let label = self
            .db
            .call(|conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM labels WHERE id = ?1 AND user_id = ?2",
                            Label::COLUMNS
                        ),
                        params![id, user_id],
                        Label::from_row,
                    )
                    .optional()?)
            })?
            .ok_or_else(not_found)?;
        self.signed(&label)
    }

    /// Stored document of a download token and its content type.
    pub async fn label_file(&self, token: &str) -> Result<(Vec<u8>, &'static str), Error> {
        let key = self.store.key_of_token(token)?;
        let bytes = self.store.read(&key).await?;
        Ok((bytes, content_type_of(&key)))
    }

    /// Store uploaded PDF labels.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - too many files, a file is not a PDF or a name repeats
    /// * `Error::PayloadTooLarge` - a file exceeds the size limit
    ///
    pub async fn upload_labels(&self, user_id: &str, files: Vec<UploadedFile>) -> Result<Vec<Uuid>, Error> {
        if files.len() > MAX_UPLOAD_FILES {
            return Err(Error::BadRequest(format!(
                "Maximum of {} files allowed.",
                MAX_UPLOAD_FILES
            )));
        }
        let user_uuid = parse_uuid(user_id)?;
        let mut seen = std::collections::HashSet::new();
        for file in &files {
            if file.content_type.as_deref() != Some("application/pdf") {
                return Err(Error::BadRequest(format!("{} is not a PDF.", file.filename)));
            }
            if !seen.insert(file.filename.to_lowercase()) {
                return Err(Error::BadRequest(format!("Duplicate file: {}", file.filename)));
            }
            if file.data.len() > MAX_UPLOAD_MB * 1024 * 1024 {
                return Err(Error::PayloadTooLarge(format!(
                    "{} exceeds the {}MB size limit.",
                    file.filename, MAX_UPLOAD_MB
                )));
            }
        }

        let mut labels = Vec::with_capacity(files.len());
        for file in files {
            let id = new_id();
            let key = LabelStore::upload_key(&id, &file.filename);
            self.store.put(&key, &file.data).await?;
            labels.push(Label {
                id: parse_uuid(&id)?,
                user_id: user_uuid,
                status: LabelStatus::New,
                order_number: Some(UPLOAD_ORDER_NUMBER.to_owned()),
                tracking_number: "n/a".to_owned(),
                label_url: key,
                carrier: Carrier::Other,
                service_type: "default".to_owned(),
                cost_estimate: Money::ZERO,
                cost_actual: Some(Money::ZERO),
                invoice_id: None,
                created_at: chrono::Utc::now(),
            });
        }
        self.db.transaction(|conn| {
            for label in &labels {
                insert_label(conn, label)?;
            }
            Ok(())
        })?;
        log::info!("User {} uploaded {} label(s)", user_id, labels.len());
        Ok(labels.into_iter().map(|label| label.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::testing::*;
    use super::*;
    use crate::carriers::testing::FakeCarrier;
    use crate::model::label::AddressSchema;
    use crate::model::transaction::TransactionFilters;

    fn address() -> AddressSchema {
        AddressSchema {
            contact_name: "Ada Lovelace".to_owned(),
            company_name: None,
            street_line1: "1 Main St".to_owned(),
            street_line2: None,
            city: "Springfield".to_owned(),
            state: "IL".to_owned(),
            postal_code: "62701".to_owned(),
            country_code: "US".to_owned(),
            phone: None,
            email: None,
        }
    }

    fn buy_request(service_type: &str, order_number: Option<&str>) -> BuyLabelRequest {
        BuyLabelRequest {
            order_number: order_number.map(str::to_owned),
            service_type: service_type.to_owned(),
            pickup_type: None,
            total_weight: None,
            ship_date: None,
            label_stock_type: None,
            merge_label_doc_option: None,
            shipper: address(),
            recipient: address(),
            packages: vec![json!({"weight": {"value": 1}})],
            signature_option: "none".to_owned(),
        }
    }

    fn set_multiplier(t: &TestApi, user_id: &str, hundredths: i64) {
        t.api
            .db
            .call(|conn| {
                Ok(conn.execute(
                    "UPDATE users SET multiplier = ?2 WHERE id = ?1",
                    params![user_id, hundredths],
                )?)
            })
            .unwrap();
    }

    fn api_with_labels() -> TestApi {
        test_api_with(
            FakeCarrier::new(
                Carrier::FedEx,
                &[("FEDEX_GROUND", "10.00"), ("FEDEX_2_DAY", "20.00")],
            )
            .with_label("794600000001", Some("9.50"))
            .with_label("794600000002", None),
            FakeCarrier::new(Carrier::Usps, &[("PRIORITY_MAIL", "8.00")]),
        )
    }

    #[tokio::test]
    async fn test_rates_apply_multiplier_and_sort() {
        let t = test_api();
        let user = create_user(&t.api, "ada@example.com", false, 0);
        let id = user.id.to_string();
        set_multiplier(&t, &id, 150);
        let mut request = buy_request("FEDEX_GROUND", None).rates_request();

        let rates = t.api.rates(&id, &request).await.unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].service_provider, "USPS");
        assert_eq!(rates[0].total_charge, Money::from_cents(1200));
        assert_eq!(rates[1].total_charge, Money::from_cents(1500));

        request.packages.push(json!({"weight": {"value": 2}}));
        let rates = t.api.rates(&id, &request).await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].service_provider, "FedEx");
    }

    #[tokio::test]
    async fn test_buy_label_debits_balance() {
        let t = api_with_labels();
        let user = create_user(&t.api, "ada@example.com", false, 5000);
        let id = user.id.to_string();
        set_multiplier(&t, &id, 110);
        t.api
            .db
            .call(|conn| {
                Ok(conn.execute(
                    "INSERT INTO orders (id, user_id, store_name, order_number, item_name, item_sku, \
                     item_qty, order_date, buyer_address, created_at, updated_at) \
                     VALUES ('o1', ?1, 'shop', '1001', 'Mug', 'SKU', 1, '2024-01-01', '{}', ?2, ?2)",
                    params![id, now()],
                )?)
            })
            .unwrap();

        let labels = t
            .api
            .buy_label(&id, Carrier::FedEx, buy_request("FEDEX_GROUND", Some("1001")))
            .await
            .unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].cost_estimate, Money::from_cents(1045));
        assert_eq!(labels[0].cost_actual, Some(Money::from_cents(950)));
        assert_eq!(labels[1].cost_estimate, Money::from_cents(1100));
        assert_eq!(labels[0].label_url, "labels/FedEx/1001_1.pdf");
        assert_eq!(labels[1].label_url, "labels/FedEx/1001_2.pdf");
        assert!(t.dir.path().join("labels/FedEx/1001_2.pdf").exists());

        assert_eq!(t.api.user(&id).unwrap().balance, Money::from_cents(5000 - 2145));
        let status: String = t
            .api
            .db
            .call(|conn| Ok(conn.query_row("SELECT status FROM orders", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(status, "shipped");

        let ledger = t
            .api
            .list_transactions(&id, &TransactionFilters::default(), &PageQuery::default())
            .unwrap();
        assert_eq!(ledger.data.len(), 2);
        assert!(ledger.data.iter().all(|tx| tx.trans_type == TransactionType::Usage));
        assert!(ledger
            .data
            .iter()
            .any(|tx| tx.note.as_deref()
                == Some("Label purchase for tracking 794600000001 - FEDEX_GROUND")));
    }

    #[tokio::test]
    async fn test_buy_label_rejections() {
        let t = api_with_labels();
        let user = create_user(&t.api, "ada@example.com", false, 1000);
        let id = user.id.to_string();

        assert_eq!(
            t.api
                .buy_label(&id, Carrier::Ups, buy_request("GROUND", None))
                .await
                .unwrap_err(),
            Error::UnsupportedCarrier("UPS".to_owned())
        );
        assert_eq!(
            t.api
                .buy_label(&id, Carrier::FedEx, buy_request("OVERNIGHT", None))
                .await
                .unwrap_err(),
            Error::RateNotAvailable("OVERNIGHT".to_owned())
        );
        let err = t
            .api
            .buy_label(&id, Carrier::FedEx, buy_request("FEDEX_2_DAY", None))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient balance: 10.00 available, 20.00 required"
        );
        assert_eq!(t.api.user(&id).unwrap().balance, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn test_cancel_label_refunds() {
        let t = api_with_labels();
        let user = create_user(&t.api, "ada@example.com", false, 5000);
        let id = user.id.to_string();
        t.api
            .buy_label(&id, Carrier::FedEx, buy_request("FEDEX_GROUND", None))
            .await
            .unwrap();
        assert_eq!(t.api.user(&id).unwrap().balance, Money::from_cents(5000 - 1950));

        t.api
            .cancel_label(&id, Carrier::FedEx, "794600000001")
            .await
            .unwrap();
        assert_eq!(t.api.user(&id).unwrap().balance, Money::from_cents(5000 - 1000));
        assert_eq!(
            t.api
                .cancel_label(&id, Carrier::FedEx, "794600000001")
                .await
                .unwrap_err(),
            Error::BadRequest("Label already cancelled".to_owned())
        );
        assert_eq!(
            t.api
                .cancel_label(&id, Carrier::FedEx, "unknown")
                .await
                .unwrap_err(),
            Error::NotFound("Label not found".to_owned())
        );

        let cancelled = t
            .api
            .list_labels(
                &id,
                &LabelFilters {
                    status: Some(LabelStatus::Cancelled),
                    ..Default::default()
                },
                &PageQuery::default(),
            )
            .unwrap();
        assert_eq!(cancelled.data.len(), 1);
        assert_eq!(cancelled.data[0].tracking_number, "794600000001");
    }

    #[tokio::test]
    async fn test_label_links_and_download() {
        let t = api_with_labels();
        let user = create_user(&t.api, "ada@example.com", false, 5000);
        let id = user.id.to_string();
        let labels = t
            .api
            .buy_label(&id, Carrier::FedEx, buy_request("FEDEX_GROUND", Some("A-7")))
            .await
            .unwrap();

        let links = t.api.labels_of_order(&id, "A-7").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            t.api.labels_of_order(&id, "nope").unwrap_err(),
            Error::NotFound("Label not found".to_owned())
        );

        let link = t.api.label_url(&id, &labels[0].id.to_string()).unwrap();
        let token = link.url.rsplit('/').next().unwrap();
        let (bytes, content_type) = t.api.label_file(token).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 label".to_vec());
        assert_eq!(content_type, "application/pdf");

        let other = create_user(&t.api, "bob@example.com", false, 0);
        let missing = labels[0].id.to_string();
        assert_eq!(
            t.api.label_url(&other.id.to_string(), &missing).unwrap_err(),
            Error::NotFound(format!("label {} not found", missing))
        );
    }

    fn pdf(name: &str, size: usize) -> UploadedFile {
        UploadedFile {
            filename: name.to_owned(),
            content_type: Some("application/pdf".to_owned()),
            data: vec![b'%'; size],
        }
    }

    #[tokio::test]
    async fn test_upload_labels() {
        let t = test_api();
        let user = create_user(&t.api, "ada@example.com", false, 0);
        let id = user.id.to_string();

        let ids = t
            .api
            .upload_labels(&id, vec![pdf("a.pdf", 10), pdf("b.pdf", 10)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        let page = t
            .api
            .list_labels(&id, &LabelFilters::default(), &PageQuery::default())
            .unwrap();
        assert!(page
            .data
            .iter()
            .all(|l| l.carrier == Carrier::Other && l.tracking_number == "n/a"));

        assert_eq!(
            t.api
                .upload_labels(&id, vec![pdf("a.pdf", 1), pdf("A.PDF", 1)])
                .await
                .unwrap_err(),
            Error::BadRequest("Duplicate file: A.PDF".to_owned())
        );
        let mut text = pdf("notes.txt", 1);
        text.content_type = Some("text/plain".to_owned());
        assert_eq!(
            t.api.upload_labels(&id, vec![text]).await.unwrap_err(),
            Error::BadRequest("notes.txt is not a PDF.".to_owned())
        );
        assert_eq!(
            t.api
                .upload_labels(&id, vec![pdf("big.pdf", 5 * 1024 * 1024 + 1)])
                .await
                .unwrap_err(),
            Error::PayloadTooLarge("big.pdf exceeds the 5MB size limit.".to_owned())
        );
        let many = (0..11).map(|i| pdf(&format!("{}.pdf", i), 1)).collect();
        assert!(matches!(
            t.api.upload_labels(&id, many).await,
            Err(Error::BadRequest(_))
        ));
    }
}
