// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::params;

use crate::database::{now, Filter, Listing};
use crate::error::Error;
use crate::model::money::{Money, Multiplier};
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::transaction::{Transaction, TransactionType};
use crate::model::user::{AdminUserFilters, MultiplierRequest, TopupRequest, User, UserMe};

use super::labels::add_to_balance;
use super::{user_by_id, CargoveraApi};

impl CargoveraApi {
    /// Every account, for administrators.
    pub fn admin_list_users(
        &self,
        filters: &AdminUserFilters,
        page: &PageQuery,
    ) -> Result<Paginated<UserMe>, Error> {
        let mut conditions = vec![];
        if let Some(is_active) = filters.is_active {
            conditions.push(Filter::eq("is_active", is_active));
        }
        if let Some(email) = filters.email.as_deref() {
            conditions.push(Filter::search(&["email"], email));
        }
        let listing = Listing {
            columns: User::COLUMNS,
            from: "users",
            id_column: "id",
            created_column: "created_at",
            filters: conditions,
            base_path: "/admin/users",
        };
        self.db
            .call(|conn| listing.paginate(conn, page, User::from_row))?
            .try_map(|user| Ok(UserMe::from(&user)))
    }

    pub fn activate_user(&self, user_id: &str) -> Result<UserMe, Error> {
        let user = self.db.transaction(|conn| {
            user_by_id(conn, user_id)?;
            conn.execute(
                "UPDATE users SET is_active = 1, updated_at = ?2 WHERE id = ?1",
                params![user_id, now()],
            )?;
            user_by_id(conn, user_id)
        })?;
        log::info!("User {} activated", user_id);
        Ok(UserMe::from(&user))
    }

    /// # Errors
    ///
    /// * `Error::BadRequest` - "Multiplier must be between 1.00 and 1.99"
    /// * `Error::NotFound` - "User not found"
    ///
    pub fn set_multiplier(&self, user_id: &str, request: &MultiplierRequest) -> Result<UserMe, Error> {
        let multiplier = Multiplier::parse(&request.multiplier.0)?;
        let user = self.db.transaction(|conn| {
            user_by_id(conn, user_id)?;
            conn.execute(
                "UPDATE users SET multiplier = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, multiplier.hundredths(), now()],
            )?;
            user_by_id(conn, user_id)
        })?;
        log::info!("Multiplier of user {} set to {}", user_id, multiplier);
        Ok(UserMe::from(&user))
    }

    /// Credit (or debit, with a negative amount) a balance by hand.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - zero amount or a resulting negative balance
    /// * `Error::NotFound` - "User not found"
    ///
    pub fn topup(&self, user_id: &str, request: &TopupRequest) -> Result<UserMe, Error> {
        let amount = Money::parse(&request.amount.0)?;
        if amount == Money::ZERO {
            return Err(Error::BadRequest("amount must not be zero".to_owned()));
        }
        let note = request
            .note
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "balance adjustment".to_owned());
        let user = self.db.transaction(|conn| {
            let user = user_by_id(conn, user_id)?;
            let adjusted = user
                .balance
                .checked_add(amount)
                .ok_or_else(|| Error::BadRequest(format!("Invalid amount: {}", request.amount.0)))?;
            if adjusted.is_negative() {
                return Err(Error::BadRequest(format!(
                    "Balance can't go negative: {} available",
                    user.balance.to_decimal_string()
                )));
            }
            let balance = add_to_balance(conn, user_id, amount)?;
            Transaction::insert(
                conn,
                user_id,
                amount,
                balance,
                TransactionType::Adjustment,
                &note,
            )?;
            user_by_id(conn, user_id)
        })?;
        log::info!("Balance of user {} adjusted by {}", user_id, amount);
        Ok(UserMe::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::money::DecimalText;
    use crate::model::transaction::TransactionFilters;

    #[test]
    fn test_list_and_activate() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 0).id.to_string();
        create_user(&t.api, "bob@example.com", true, 0);
        t.api
            .db
            .call(|conn| {
                Ok(conn.execute(
                    "UPDATE users SET is_active = 0 WHERE id = ?1",
                    params![ada],
                )?)
            })
            .unwrap();

        let inactive = AdminUserFilters {
            is_active: Some(false),
            email: None,
        };
        let page = t.api.admin_list_users(&inactive, &PageQuery::default()).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].email, "ada@example.com");

        assert!(t.api.activate_user(&ada).unwrap().is_active);
        let by_email = AdminUserFilters {
            is_active: None,
            email: Some("bob".to_owned()),
        };
        assert_eq!(
            t.api
                .admin_list_users(&by_email, &PageQuery::default())
                .unwrap()
                .data
                .len(),
            1
        );
        assert!(matches!(t.api.activate_user("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_set_multiplier() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 0).id.to_string();
        let request = |m: &str| MultiplierRequest {
            multiplier: DecimalText(m.to_owned()),
        };
        let me = t.api.set_multiplier(&ada, &request("1.25")).unwrap();
        assert_eq!(me.multiplier.hundredths(), 125);
        assert_eq!(
            t.api.set_multiplier(&ada, &request("2.0")).unwrap_err(),
            Error::BadRequest("Multiplier must be between 1.00 and 1.99".to_owned())
        );
    }

    #[test]
    fn test_topup() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 1000).id.to_string();
        let request = |amount: &str| TopupRequest {
            amount: DecimalText(amount.to_owned()),
            note: None,
        };

        assert_eq!(
            t.api.topup(&ada, &request("15.50")).unwrap().balance,
            Money::from_cents(2550)
        );
        assert_eq!(
            t.api.topup(&ada, &request("-5")).unwrap().balance,
            Money::from_cents(2050)
        );
        assert!(matches!(t.api.topup(&ada, &request("0")), Err(Error::BadRequest(_))));
        assert!(matches!(
            t.api.topup(&ada, &request("-30")),
            Err(Error::BadRequest(_))
        ));
        assert_eq!(
            t.api.topup(&ada, &request("92233720368547758.07")).unwrap_err(),
            Error::BadRequest("Invalid amount: 92233720368547758.07".to_owned())
        );

        let ledger = t
            .api
            .list_transactions(&ada, &TransactionFilters::default(), &PageQuery::default())
            .unwrap();
        assert_eq!(ledger.data.len(), 2);
        assert!(ledger
            .data
            .iter()
            .all(|tx| tx.trans_type == TransactionType::Adjustment));
    }
}
