// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    password_hash TEXT NOT NULL,
    is_email_verified INTEGER NOT NULL DEFAULT 0,
    is_admin INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 0,
    multiplier INTEGER NOT NULL DEFAULT 100,
    balance_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS addresses (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    alias TEXT NOT NULL,
    company_name TEXT,
    contact_name TEXT NOT NULL,
    phone TEXT NOT NULL,
    street_line1 TEXT NOT NULL,
    street_line2 TEXT,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    zip_code TEXT NOT NULL,
    country TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_addresses_user_id ON addresses(user_id);

CREATE TABLE IF NOT EXISTS webstores (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    store_type TEXT NOT NULL,
    name TEXT NOT NULL,
    store_id TEXT NOT NULL,
    auth_config TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    store_name TEXT NOT NULL,
    order_number TEXT NOT NULL UNIQUE,
    item_name TEXT NOT NULL,
    item_sku TEXT NOT NULL,
    item_qty INTEGER NOT NULL,
    order_date TEXT NOT NULL,
    ship_by TEXT,
    deliver_by TEXT,
    status TEXT NOT NULL DEFAULT 'new',
    total_amount_cents INTEGER NOT NULL DEFAULT 0,
    delivery_notes TEXT,
    buyer_address TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    order_number TEXT,
    tracking_number TEXT NOT NULL,
    label_url TEXT NOT NULL,
    carrier TEXT NOT NULL,
    service_type TEXT NOT NULL,
    cost_estimate_cents INTEGER NOT NULL,
    cost_actual_cents INTEGER,
    status TEXT NOT NULL DEFAULT 'new',
    invoice_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_labels_user_id ON labels(user_id);
CREATE INDEX IF NOT EXISTS idx_labels_tracking_number ON labels(tracking_number);
CREATE INDEX IF NOT EXISTS idx_labels_order_number ON labels(order_number);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    amount_cents INTEGER NOT NULL,
    new_balance_cents INTEGER NOT NULL,
    trans_type TEXT NOT NULL,
    note TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_user_id ON transactions(user_id);

CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    intent_id TEXT NOT NULL UNIQUE,
    amount_cents INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const MIGRATION_002: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    upc TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);

CREATE TABLE IF NOT EXISTS inventories (
    id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL REFERENCES products(id),
    holder_id TEXT NOT NULL REFERENCES users(id),
    owner_id TEXT NOT NULL REFERENCES users(id),
    available_qty INTEGER NOT NULL,
    reserved_qty INTEGER NOT NULL DEFAULT 0,
    location TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inventories_product_owner ON inventories(product_id, owner_id);

CREATE TABLE IF NOT EXISTS inventory_transactions (
    id TEXT PRIMARY KEY,
    inventory_id TEXT NOT NULL REFERENCES inventories(id),
    product_id TEXT NOT NULL REFERENCES products(id),
    created_by TEXT NOT NULL REFERENCES users(id),
    transaction_type TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    source TEXT NOT NULL,
    source_ref_id TEXT,
    note TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inventory_transactions_inventory ON inventory_transactions(inventory_id);

CREATE TABLE IF NOT EXISTS fulfillment_requests (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id),
    holder_id TEXT NOT NULL REFERENCES users(id),
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_fulfillment_owner_id ON fulfillment_requests(owner_id);
CREATE INDEX IF NOT EXISTS ix_fulfillment_holder_id ON fulfillment_requests(holder_id);

CREATE TABLE IF NOT EXISTS fulfillment_items (
    id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL REFERENCES fulfillment_requests(id) ON DELETE CASCADE,
    inventory_id TEXT NOT NULL REFERENCES inventories(id),
    quantity INTEGER NOT NULL,
    label_urls TEXT NOT NULL DEFAULT '[]',
    note TEXT,
    fulfilled_at TEXT
);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "accounts_labels_ledger",
        sql: MIGRATION_001,
    },
    Migration {
        version: 2,
        name: "products_inventories_fulfillments",
        sql: MIGRATION_002,
    },
];
