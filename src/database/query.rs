// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Filtered, paginated listings.
//!

use chrono::{Duration, NaiveDate};
use rusqlite::{params_from_iter, types::Value, Connection, Row};

use crate::error::Error;
use crate::model::pagination::{
    Cursor, PageQuery, Paginated, PaginationInfo, PaginationLinks, SortOrder,
};

use super::{parse_time, to_db_time};

/// A condition of a listing.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, Value),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
    /// Case-insensitive substring match on any of the columns.
    Search(Vec<&'static str>, String),
}

impl Filter {
    pub fn eq<V: Into<Value>>(column: &'static str, value: V) -> Self {
        Filter::Eq(column, value.into())
    }

    pub fn search(columns: &[&'static str], term: &str) -> Self {
        Filter::Search(columns.to_vec(), term.to_owned())
    }
}

/// Range filters for `YYYY-MM-DD` bounds, both inclusive.
///
/// # Errors
///
/// * `Error::BadRequest` - a bound is not a valid date
///
pub fn date_range(
    column: &'static str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<Filter>, Error> {
    let start_of = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .map(|dt| to_db_time(&dt.and_utc()))
            .ok_or_else(|| Error::BadRequest("Invalid date".to_owned()))
    };
    let mut filters = vec![];
    if let Some(from) = from.filter(|s| !s.is_empty()) {
        filters.push(Filter::Gte(column, Value::Text(start_of(parse_day(from)?)?)));
    }
    if let Some(to) = to.filter(|s| !s.is_empty()) {
        let next_day = parse_day(to)? + Duration::days(1);
        filters.push(Filter::Lt(column, Value::Text(start_of(next_day)?)));
    }
    Ok(filters)
}

/// Like [`date_range`] for columns holding plain `YYYY-MM-DD` dates.
pub fn day_range(
    column: &'static str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<Filter>, Error> {
    let mut filters = vec![];
    if let Some(from) = from.filter(|s| !s.is_empty()) {
        filters.push(Filter::Gte(column, Value::Text(parse_day(from)?.to_string())));
    }
    if let Some(to) = to.filter(|s| !s.is_empty()) {
        let next_day = parse_day(to)? + Duration::days(1);
        filters.push(Filter::Lt(column, Value::Text(next_day.to_string())));
    }
    Ok(filters)
}

fn parse_day(text: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| Error::BadRequest(format!("Invalid date {}, expected YYYY-MM-DD", text)))
}

/// A listing over one table (or join).
pub struct Listing<'a> {
    /// Selected columns, read by index in the row mapper.
    pub columns: &'a str,
    /// `FROM` clause body.
    pub from: &'a str,
    /// Primary key column used as tie breaker.
    pub id_column: &'static str,
    /// Creation time column used for sorting.
    pub created_column: &'static str,
    pub filters: Vec<Filter>,
    /// Path used to build navigation links.
    pub base_path: &'a str,
}

impl<'a> Listing<'a> {
    fn where_clause(&self, extra: Option<String>) -> (String, Vec<Value>) {
        let mut clauses = vec![];
        let mut values = vec![];
        for filter in &self.filters {
            match filter {
                Filter::Eq(column, value) => {
                    clauses.push(format!("{} = ?", column));
                    values.push(value.clone());
                }
                Filter::Gte(column, value) => {
                    clauses.push(format!("{} >= ?", column));
                    values.push(value.clone());
                }
                Filter::Lt(column, value) => {
                    clauses.push(format!("{} < ?", column));
                    values.push(value.clone());
                }
                Filter::Search(columns, term) => {
                    if columns.is_empty() || term.trim().is_empty() {
                        continue;
                    }
                    let any: Vec<String> = columns
                        .iter()
                        .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
                        .collect();
                    clauses.push(format!("({})", any.join(" OR ")));
                    let pattern = format!("%{}%", escape_like(term.trim()));
                    values.extend(columns.iter().map(|_| Value::Text(pattern.clone())));
                }
            }
        }
        if let Some(extra) = extra {
            clauses.push(extra);
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }

    /// Run the listing with offset or cursor pagination.
    pub fn paginate<T, F>(
        &self,
        conn: &Connection,
        query: &PageQuery,
        map: F,
    ) -> Result<Paginated<T>, Error>
    where
        F: Fn(&Row) -> rusqlite::Result<T>,
    {
        let limit = query.checked_limit()?;
        let order = query.sort_order.unwrap_or_default();
        match query.cursor.as_deref().filter(|c| !c.is_empty()) {
            Some(cursor) => self.cursor_page(conn, Cursor::decode(cursor)?, cursor, limit, order, map),
            None => self.offset_page(conn, query.page, limit, order, map),
        }
    }

    fn select_sql(&self, where_clause: &str, order: SortOrder) -> String {
        format!(
            "SELECT {cols}, {id} AS cursor_id, {created} AS cursor_created FROM {from} {where_clause} \
             ORDER BY {created} {dir}, {id} {dir} LIMIT ? OFFSET ?",
            cols = self.columns,
            id = self.id_column,
            created = self.created_column,
            from = self.from,
            where_clause = where_clause,
            dir = order.as_sql(),
        )
    }

    fn offset_page<T, F>(
        &self,
        conn: &Connection,
        page: Option<u32>,
        limit: u32,
        order: SortOrder,
        map: F,
    ) -> Result<Paginated<T>, Error>
    where
        F: Fn(&Row) -> rusqlite::Result<T>,
    {
        let (where_clause, values) = self.where_clause(None);
        let total_items: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} {}", self.from, where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let total_items = total_items as u64;
        let total_pages = total_items.div_ceil(limit as u64) as u32;
        let page = page.unwrap_or(1).max(1);
        if total_pages > 0 && page > total_pages {
            return Err(Error::NotFound("Page not found".to_owned()));
        }

        let mut params = values;
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer((i64::from(page) - 1) * i64::from(limit)));
        let mut stmt = conn.prepare(&self.select_sql(&where_clause, order))?;
        let data = stmt
            .query_map(params_from_iter(params.iter()), |row| map(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let link = |p: u32| {
            format!(
                "{}?page={}&limit={}&sort_by=created_at&sort_order={}",
                self.base_path,
                p,
                limit,
                order.as_str()
            )
        };
        let links = PaginationLinks {
            first: (total_pages > 0).then(|| link(1)),
            previous: (page > 1).then(|| link(page - 1)),
            next: (page < total_pages).then(|| link(page + 1)),
            last: (total_pages > 0).then(|| link(total_pages)),
        };
        Ok(Paginated {
            data,
            pagination: PaginationInfo {
                current_page: Some(page),
                total_pages: Some(total_pages),
                total_items: Some(total_items),
                items_per_page: limit,
                has_next: page < total_pages,
                has_previous: page > 1,
                next_cursor: None,
                previous_cursor: None,
            },
            links: Some(links),
        })
    }

    fn cursor_page<T, F>(
        &self,
        conn: &Connection,
        cursor: Cursor,
        raw_cursor: &str,
        limit: u32,
        order: SortOrder,
        map: F,
    ) -> Result<Paginated<T>, Error>
    where
        F: Fn(&Row) -> rusqlite::Result<T>,
    {
        let cmp = match order {
            SortOrder::Desc => "<",
            SortOrder::Asc => ">",
        };
        let keyset = format!(
            "({created} {cmp} ? OR ({created} = ? AND {id} {cmp} ?))",
            created = self.created_column,
            id = self.id_column,
            cmp = cmp
        );
        let (where_clause, mut params) = self.where_clause(Some(keyset));
        let created_at = to_db_time(&cursor.created_at);
        params.push(Value::Text(created_at.clone()));
        params.push(Value::Text(created_at));
        params.push(Value::Text(cursor.id.clone()));
        params.push(Value::Integer(limit as i64 + 1));
        params.push(Value::Integer(0));

        let mut stmt = conn.prepare(&self.select_sql(&where_clause, order))?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut data = vec![];
        let mut last: Option<(String, String)> = None;
        let mut has_next = false;
        while let Some(row) = rows.next()? {
            if data.len() == limit as usize {
                has_next = true;
                break;
            }
            data.push(map(row)?);
            last = Some((row.get("cursor_id")?, row.get("cursor_created")?));
        }

        let next_cursor = match (has_next, last) {
            (true, Some((id, created))) => Some(
                Cursor {
                    id,
                    created_at: parse_time(&created)
                        .map_err(|e| Error::Database(e.to_string()))?,
                    sort_field: Some("created_at".to_owned()),
                    sort_value: None,
                }
                .encode()?,
            ),
            _ => None,
        };
        let link = |c: &str| format!("{}?cursor={}&limit={}", self.base_path, c, limit);
        Ok(Paginated {
            data,
            pagination: PaginationInfo {
                current_page: None,
                total_pages: None,
                total_items: None,
                items_per_page: limit,
                has_next,
                has_previous: true,
                next_cursor: next_cursor.clone(),
                previous_cursor: Some(raw_cursor.to_owned()),
            },
            links: Some(PaginationLinks {
                first: None,
                previous: Some(link(raw_cursor)),
                next: next_cursor.as_deref().map(link),
                last: None,
            }),
        })
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn seed(db: &Database, n: usize) {
        db.call(|conn| {
            for i in 0..n {
                conn.execute(
                    "INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'h', ?4, ?4)",
                    rusqlite::params![
                        format!("user-{:02}", i),
                        format!("Name {}", i),
                        format!("user{}@example.com", i),
                        format!("2024-01-{:02}T00:00:00.000000Z", i + 1)
                    ],
                )?;
            }
            Ok(())
        })
        .unwrap();
    }

    fn listing(filters: Vec<Filter>) -> Listing<'static> {
        Listing {
            columns: "id",
            from: "users",
            id_column: "id",
            created_column: "created_at",
            filters,
            base_path: "/admin/users",
        }
    }

    #[test]
    fn test_offset_pages() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 5);
        let query = PageQuery {
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        };
        let page = db
            .call(|conn| listing(vec![]).paginate(conn, &query, |row| row.get::<_, String>(0)))
            .unwrap();
        assert_eq!(page.data, vec!["user-02".to_owned(), "user-01".to_owned()]);
        assert_eq!(page.pagination.total_pages, Some(3));
        assert_eq!(page.pagination.total_items, Some(5));
        assert!(page.pagination.has_next && page.pagination.has_previous);
        let links = page.links.unwrap();
        assert_eq!(
            links.next.as_deref(),
            Some("/admin/users?page=3&limit=2&sort_by=created_at&sort_order=desc")
        );
    }

    #[test]
    fn test_page_out_of_range() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 3);
        let query = PageQuery {
            page: Some(3),
            limit: Some(2),
            ..Default::default()
        };
        let result =
            db.call(|conn| listing(vec![]).paginate(conn, &query, |row| row.get::<_, String>(0)));
        assert_eq!(result.unwrap_err(), Error::NotFound("Page not found".to_owned()));
    }

    #[test]
    fn test_empty_listing_has_one_virtual_page() {
        let db = Database::open_in_memory().unwrap();
        let page = db
            .call(|conn| {
                listing(vec![]).paginate(conn, &PageQuery::default(), |row| {
                    row.get::<_, String>(0)
                })
            })
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total_pages, Some(0));
        assert_eq!(page.pagination.current_page, Some(1));
    }

    #[test]
    fn test_huge_page_on_empty_listing() {
        let db = Database::open_in_memory().unwrap();
        let query = PageQuery {
            page: Some(u32::MAX),
            limit: Some(100),
            ..Default::default()
        };
        let page = db
            .call(|conn| listing(vec![]).paginate(conn, &query, |row| row.get::<_, String>(0)))
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.current_page, Some(u32::MAX));
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn test_filters_and_search() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 5);
        let mut filters = vec![Filter::search(&["email", "name"], "USER3@")];
        let page = db
            .call(|conn| {
                listing(filters.clone()).paginate(conn, &PageQuery::default(), |row| {
                    row.get::<_, String>(0)
                })
            })
            .unwrap();
        assert_eq!(page.data, vec!["user-03".to_owned()]);

        filters = date_range("created_at", Some("2024-01-02"), Some("2024-01-03")).unwrap();
        let page = db
            .call(|conn| {
                listing(filters).paginate(conn, &PageQuery::default(), |row| {
                    row.get::<_, String>(0)
                })
            })
            .unwrap();
        assert_eq!(page.data, vec!["user-02".to_owned(), "user-01".to_owned()]);
    }

    #[test]
    fn test_day_range_bounds() {
        let filters = day_range("order_date", Some("2024-03-01"), Some("2024-03-31")).unwrap();
        match (&filters[0], &filters[1]) {
            (Filter::Gte(_, Value::Text(from)), Filter::Lt(_, Value::Text(to))) => {
                assert_eq!(from, "2024-03-01");
                assert_eq!(to, "2024-04-01");
            }
            other => panic!("unexpected filters {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date() {
        assert!(matches!(
            date_range("created_at", Some("01/02/2024"), None),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_cursor_walk() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 5);
        let start = Cursor {
            id: "user-99".to_owned(),
            created_at: parse_time("2024-02-01T00:00:00.000000Z").unwrap(),
            sort_field: None,
            sort_value: None,
        };
        let query = PageQuery {
            limit: Some(3),
            cursor: Some(start.encode().unwrap()),
            ..Default::default()
        };
        let page = db
            .call(|conn| listing(vec![]).paginate(conn, &query, |row| row.get::<_, String>(0)))
            .unwrap();
        assert_eq!(page.data.len(), 3);
        assert!(page.pagination.has_next);
        let next = page.pagination.next_cursor.clone().unwrap();

        let query = PageQuery {
            limit: Some(3),
            cursor: Some(next),
            ..Default::default()
        };
        let page = db
            .call(|conn| listing(vec![]).paginate(conn, &query, |row| row.get::<_, String>(0)))
            .unwrap();
        assert_eq!(page.data, vec!["user-01".to_owned(), "user-00".to_owned()]);
        assert!(!page.pagination.has_next);
    }
}
