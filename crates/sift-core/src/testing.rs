//! Shared test fixtures: a small commerce schema with semantic entities.

use sift_db::queries::entities;
use sift_db::{run_migrations, DbPool};

const COMMERCE: &str = "
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE,
    lifetime_value REAL NOT NULL DEFAULT 0,
    created_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL REFERENCES customers(id),
    total REAL NOT NULL,
    status TEXT NOT NULL
);
CREATE TABLE products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    price REAL
);
CREATE TABLE order_items (
    id INTEGER PRIMARY KEY,
    order_id INTEGER NOT NULL REFERENCES orders(id),
    product_id INTEGER NOT NULL REFERENCES products(id),
    quantity INTEGER NOT NULL
);
CREATE TABLE tags (
    id INTEGER PRIMARY KEY,
    label TEXT NOT NULL
);
CREATE TABLE product_tags (
    product_id INTEGER NOT NULL REFERENCES products(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (product_id, tag_id)
);
CREATE TABLE profiles (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER UNIQUE REFERENCES customers(id),
    bio TEXT
);

INSERT INTO customers (id, name, email, lifetime_value, created_at) VALUES
    (1, 'Acme Corp', 'ops@acme.io', 12500.0, '2024-03-01 09:30:00'),
    (2, 'Globex', 'buy@globex.com', 300.0, '2024-05-12'),
    (3, 'Initech', 'it@initech.com', 0, NULL);
INSERT INTO orders VALUES
    (10, 1, 500.0, 'shipped'),
    (11, 1, 120.0, 'open'),
    (12, 2, 80.0, 'open');
INSERT INTO products VALUES
    (100, 'Steel Widget', 'A sturdy widget for heavy loads', 9.5),
    (101, 'Copper Gear', 'Gear that fits every widget', 20.0);
INSERT INTO order_items VALUES
    (1, 10, 100, 2),
    (2, 10, 101, 1),
    (3, 12, 100, 5);
INSERT INTO tags VALUES (1, 'hardware'), (2, 'metal');
INSERT INTO product_tags VALUES (100, 1), (100, 2), (101, 2);
INSERT INTO profiles VALUES (1, 1, 'Key account');
";

/// Migrated in-memory store holding the commerce tables and rows.
pub(crate) fn commerce_pool() -> DbPool {
    let pool = DbPool::in_memory().unwrap();
    run_migrations(&pool).unwrap();
    pool.execute_batch(COMMERCE).unwrap();
    pool
}

/// `commerce_pool` plus customer, order, product and tag entities.
///
/// `customer` carries the explicit alias "client".
pub(crate) fn seeded_pool() -> DbPool {
    let pool = commerce_pool();
    seed_entities(&pool);
    pool
}

pub(crate) fn seed_entities(pool: &DbPool) {
    entities::upsert_entity(
        pool,
        "customer",
        "Customer",
        Some("A buying organisation"),
        "customers",
        Some("sales"),
        r#"[{"name":"name","type":"text","searchable":true},
            {"name":"email","type":"identifier","searchable":true,"filterable":true},
            {"name":"lifetime_value","type":"decimal"},
            {"name":"created_at","type":"timestamp"},
            {"name":"is_active","type":"boolean","filterable":true}]"#,
        r#"[{"target":"order","kind":"HAS_MANY"}]"#,
        2.0,
    )
    .unwrap();
    entities::upsert_entity(
        pool,
        "order",
        "Order",
        None,
        "orders",
        Some("sales"),
        r#"[{"name":"status","type":"text","searchable":true},
            {"name":"total","type":"decimal"}]"#,
        r#"[{"target":"customer","kind":"BELONGS_TO"}]"#,
        1.0,
    )
    .unwrap();
    entities::upsert_entity(
        pool,
        "product",
        "Product",
        None,
        "products",
        Some("catalog"),
        r#"[{"name":"name","type":"text","searchable":true},
            {"name":"description","type":"text","searchable":true},
            {"name":"price","type":"decimal"}]"#,
        r#"[{"target":"tag","kind":"TAGGED","weight":0.5}]"#,
        1.0,
    )
    .unwrap();
    entities::upsert_entity(
        pool,
        "tag",
        "Tag",
        None,
        "tags",
        None,
        r#"[{"name":"label","type":"text","searchable":true}]"#,
        "[]",
        1.0,
    )
    .unwrap();
    entities::add_alias(pool, "client", "customer").unwrap();
    entities::add_alias(pool, "purchase", "order").unwrap();
}
