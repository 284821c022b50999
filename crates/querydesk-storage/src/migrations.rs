//! Database schema migrations and sample data.
//!
//! Applies the sample business schema (users, categories, products, orders,
//! sales, analytics) tracked through the schema_migrations table.

use rusqlite::Connection;
use tracing::{debug, info};

use querydesk_core::error::QueryDeskError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), QueryDeskError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| QueryDeskError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            QueryDeskError::Storage(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: sample_schema");
    }

    Ok(())
}

/// Version 1: sample business schema.
fn apply_v1(conn: &Connection) -> Result<(), QueryDeskError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            age         INTEGER,
            city        TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS categories (
            id          INTEGER PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS products (
            id              INTEGER PRIMARY KEY,
            name            TEXT NOT NULL,
            price           REAL NOT NULL,
            category        TEXT NOT NULL,
            stock_quantity  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS orders (
            id            INTEGER PRIMARY KEY,
            user_id       INTEGER NOT NULL REFERENCES users(id),
            product_id    INTEGER NOT NULL REFERENCES products(id),
            quantity      INTEGER NOT NULL DEFAULT 1,
            total_amount  REAL NOT NULL,
            order_date    TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'completed'
        );

        CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id);
        CREATE INDEX IF NOT EXISTS idx_orders_product ON orders (product_id);

        CREATE TABLE IF NOT EXISTS sales (
            id          INTEGER PRIMARY KEY,
            product_id  INTEGER NOT NULL REFERENCES products(id),
            region      TEXT NOT NULL,
            quarter     TEXT NOT NULL,
            revenue     REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analytics (
            id           INTEGER PRIMARY KEY,
            metric       TEXT NOT NULL,
            value        REAL NOT NULL,
            recorded_at  TEXT NOT NULL
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'sample_schema');
        ",
    )
    .map_err(|e| QueryDeskError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

/// Load the sample rows. No-op when the users table already has data.
pub fn seed_sample_data(conn: &Connection) -> Result<(), QueryDeskError> {
    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(|e| QueryDeskError::Storage(format!("Failed to count users: {}", e)))?;
    if existing > 0 {
        debug!(existing, "Sample data already present, skipping seed");
        return Ok(());
    }

    conn.execute_batch(
        "
        BEGIN;

        INSERT INTO users (id, name, email, age, city, created_at) VALUES
            (1, 'Alice Johnson', 'alice@example.com', 34, 'New York', '2023-01-12 09:30:00'),
            (2, 'Bob Smith', 'bob@example.com', 28, 'Los Angeles', '2023-02-03 14:10:00'),
            (3, 'Carol White', 'carol@example.com', 45, 'Chicago', '2023-02-21 11:45:00'),
            (4, 'David Brown', 'david@example.com', 39, 'New York', '2023-03-08 16:20:00'),
            (5, 'Eva Green', 'eva@example.com', 31, 'Boston', '2023-04-15 08:05:00'),
            (6, 'Frank Miller', 'frank@example.com', 52, 'Seattle', '2023-05-02 13:55:00'),
            (7, 'Grace Lee', 'grace@example.com', 26, 'Chicago', '2023-06-19 10:40:00'),
            (8, 'Henry Wilson', 'henry@example.com', 47, 'Los Angeles', '2023-07-07 17:25:00');

        INSERT INTO categories (id, name, description) VALUES
            (1, 'Electronics', 'Computers, phones and accessories'),
            (2, 'Books', 'Printed and digital books'),
            (3, 'Home', 'Furniture and household goods'),
            (4, 'Sports', 'Equipment and apparel');

        INSERT INTO products (id, name, price, category, stock_quantity) VALUES
            (1, 'Laptop', 1299.99, 'Electronics', 15),
            (2, 'Headphones', 199.99, 'Electronics', 60),
            (3, 'Smartphone', 899.00, 'Electronics', 25),
            (4, 'Rust Programming Book', 49.99, 'Books', 120),
            (5, 'Desk Lamp', 39.50, 'Home', 80),
            (6, 'Office Chair', 249.00, 'Home', 20),
            (7, 'Running Shoes', 119.95, 'Sports', 45),
            (8, 'Yoga Mat', 29.99, 'Sports', 100);

        INSERT INTO orders (id, user_id, product_id, quantity, total_amount, order_date, status) VALUES
            (1, 1, 1, 1, 1299.99, '2024-01-05', 'completed'),
            (2, 2, 2, 2, 399.98, '2024-01-11', 'completed'),
            (3, 3, 4, 3, 149.97, '2024-01-19', 'completed'),
            (4, 1, 5, 2, 79.00, '2024-02-02', 'completed'),
            (5, 4, 3, 1, 899.00, '2024-02-14', 'shipped'),
            (6, 5, 7, 1, 119.95, '2024-02-27', 'completed'),
            (7, 6, 6, 1, 249.00, '2024-03-06', 'completed'),
            (8, 7, 8, 2, 59.98, '2024-03-18', 'pending'),
            (9, 8, 1, 1, 1299.99, '2024-03-29', 'completed'),
            (10, 2, 4, 1, 49.99, '2024-04-04', 'completed'),
            (11, 3, 2, 1, 199.99, '2024-04-16', 'cancelled'),
            (12, 4, 7, 2, 239.90, '2024-04-28', 'completed');

        INSERT INTO sales (id, product_id, region, quarter, revenue) VALUES
            (1, 1, 'East', '2024-Q1', 2599.98),
            (2, 2, 'West', '2024-Q1', 399.98),
            (3, 3, 'East', '2024-Q1', 899.00),
            (4, 4, 'Midwest', '2024-Q1', 149.97),
            (5, 1, 'West', '2024-Q2', 1299.99),
            (6, 7, 'East', '2024-Q2', 239.90);

        INSERT INTO analytics (id, metric, value, recorded_at) VALUES
            (1, 'daily_active_users', 132, '2024-04-01'),
            (2, 'daily_active_users', 147, '2024-04-02'),
            (3, 'conversion_rate', 0.034, '2024-04-01'),
            (4, 'conversion_rate', 0.041, '2024-04-02'),
            (5, 'avg_order_value', 370.45, '2024-04-02');

        COMMIT;
        ",
    )
    .map_err(|e| QueryDeskError::Storage(format!("Failed to seed sample data: {}", e)))?;

    info!("Seeded sample data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_all_sample_tables_exist() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        for table in ["users", "categories", "products", "orders", "sales", "analytics"] {
            assert_eq!(count(&conn, table), 0, "table {} should start empty", table);
        }
    }

    #[test]
    fn test_seed_populates_tables() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        seed_sample_data(&conn).unwrap();

        assert_eq!(count(&conn, "users"), 8);
        assert_eq!(count(&conn, "products"), 8);
        assert_eq!(count(&conn, "orders"), 12);
        assert!(count(&conn, "sales") > 0);
        assert!(count(&conn, "analytics") > 0);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        seed_sample_data(&conn).unwrap();
        seed_sample_data(&conn).unwrap();
        assert_eq!(count(&conn, "users"), 8);
    }

    #[test]
    fn test_orders_reference_users() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        seed_sample_data(&conn).unwrap();

        let orphaned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM orders o LEFT JOIN users u ON u.id = o.user_id
                 WHERE u.id IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphaned, 0);
    }
}
