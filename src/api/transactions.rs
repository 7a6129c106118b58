// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::database::{date_range, Filter, Listing};
use crate::error::Error;
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::transaction::{Transaction, TransactionFilters};

use super::CargoveraApi;

impl CargoveraApi {
    /// Balance movements of a user.
    pub fn list_transactions(
        &self,
        user_id: &str,
        filters: &TransactionFilters,
        page: &PageQuery,
    ) -> Result<Paginated<Transaction>, Error> {
        let mut conditions = vec![Filter::eq("user_id", user_id.to_owned())];
        if let Some(trans_type) = filters.trans_type {
            conditions.push(Filter::eq("trans_type", trans_type));
        }
        conditions.extend(date_range(
            "created_at",
            filters.date_from.as_deref(),
            filters.date_to.as_deref(),
        )?);
        let listing = Listing {
            columns: Transaction::COLUMNS,
            from: "transactions",
            id_column: "id",
            created_column: "created_at",
            filters: conditions,
            base_path: "/transactions",
        };
        self.db
            .call(|conn| listing.paginate(conn, page, Transaction::from_row))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::money::Money;
    use crate::model::transaction::TransactionType;

    #[test]
    fn test_filters() {
        let t = test_api();
        let id = create_user(&t.api, "ada@example.com", false, 0).id.to_string();
        t.api
            .db
            .transaction(|conn| {
                Transaction::insert(
                    conn,
                    &id,
                    Money::from_cents(500),
                    Money::from_cents(500),
                    TransactionType::Deposit,
                    "in",
                )?;
                Transaction::insert(
                    conn,
                    &id,
                    Money::from_cents(200),
                    Money::from_cents(300),
                    TransactionType::Usage,
                    "out",
                )?;
                Ok(())
            })
            .unwrap();

        let deposits = t
            .api
            .list_transactions(
                &id,
                &TransactionFilters {
                    trans_type: Some(TransactionType::Deposit),
                    ..Default::default()
                },
                &PageQuery::default(),
            )
            .unwrap();
        assert_eq!(deposits.data.len(), 1);
        assert_eq!(deposits.data[0].new_balance, Money::from_cents(500));

        let future = TransactionFilters {
            date_from: Some("2999-01-01".to_owned()),
            ..Default::default()
        };
        assert!(t
            .api
            .list_transactions(&id, &future, &PageQuery::default())
            .unwrap()
            .data
            .is_empty());
        assert!(matches!(
            t.api.list_transactions(
                &id,
                &TransactionFilters {
                    date_to: Some("yesterday".to_owned()),
                    ..Default::default()
                },
                &PageQuery::default()
            ),
            Err(Error::BadRequest(_))
        ));
    }
}
