// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::params;
use uuid::Uuid;

use crate::database::{now, Filter, Listing};
use crate::error::Error;
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::product::{AddProductRequest, Product, ProductFilters};
use crate::utils::is_valid_upc;

use super::CargoveraApi;

impl CargoveraApi {
    /// Catalog search by name and exact UPC.
    pub fn list_products(
        &self,
        filters: &ProductFilters,
        page: &PageQuery,
    ) -> Result<Paginated<Product>, Error> {
        let mut conditions = vec![Filter::search(
            &["name"],
            filters.q.as_deref().unwrap_or_default(),
        )];
        if let Some(upc) = filters.upc.clone().filter(|u| !u.is_empty()) {
            conditions.push(Filter::eq("upc", upc));
        }
        let listing = Listing {
            columns: Product::COLUMNS,
            from: "products",
            id_column: "id",
            created_column: "created_at",
            filters: conditions,
            base_path: "/products",
        };
        self.db
            .call(|conn| listing.paginate(conn, page, Product::from_row))
    }

    /// # Errors
    ///
    /// * `Error::BadRequest` - "invalid upc code"
    /// * `Error::Conflict` - "upc already exists."
    ///
    pub fn add_product(&self, user_id: &str, request: AddProductRequest) -> Result<Product, Error> {
        let upc = request.upc.trim();
        if !is_valid_upc(upc) {
            return Err(Error::BadRequest("invalid upc code".to_owned()));
        }
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("name is required".to_owned()));
        }
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            upc: upc.to_owned(),
            description: request.description.clone(),
        };
        self.db
            .call(|conn| {
                let now = now();
                conn.execute(
                    "INSERT INTO products (id, user_id, upc, name, description, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![
                        product.id.to_string(),
                        user_id,
                        product.upc,
                        product.name,
                        product.description,
                        now
                    ],
                )?;
                Ok(())
            })
            .map_err(|e| match e {
                Error::Constraint(_) => Error::Conflict("upc already exists.".to_owned()),
                e => e,
            })?;
        log::info!("Product {} ({}) added by user {}", product.id, product.upc, user_id);
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn request(name: &str, upc: &str) -> AddProductRequest {
        AddProductRequest {
            name: name.to_owned(),
            upc: upc.to_owned(),
            description: None,
        }
    }

    #[test]
    fn test_add_and_search() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 0).id.to_string();
        t.api.add_product(&ada, request("Coffee Mug", "036000291452")).unwrap();
        t.api.add_product(&ada, request("Tea Pot", "012345678905")).unwrap();

        assert_eq!(
            t.api.add_product(&ada, request("Other", "036000291453")).unwrap_err(),
            Error::BadRequest("invalid upc code".to_owned())
        );
        assert_eq!(
            t.api.add_product(&ada, request("Dup", "036000291452")).unwrap_err(),
            Error::Conflict("upc already exists.".to_owned())
        );

        let mugs = ProductFilters {
            q: Some("mug".to_owned()),
            upc: None,
        };
        let page = t.api.list_products(&mugs, &PageQuery::default()).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "Coffee Mug");

        let by_upc = ProductFilters {
            q: None,
            upc: Some("012345678905".to_owned()),
        };
        let page = t.api.list_products(&by_upc, &PageQuery::default()).unwrap();
        assert_eq!(page.data[0].name, "Tea Pot");
    }
}
