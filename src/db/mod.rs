pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Timestamp layout used for every stored and serialized instant.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas are per-connection, so they run on every pooled connection.
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        register_functions(conn)
    });
    let pool = Pool::builder().max_size(8).build(manager)?;

    Ok(pool)
}

/// SQL helpers every connection needs. `casefold(x)` lowercases with full
/// Unicode rules, which `LIKE` alone only does for ASCII.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> DbPool {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        Pool::builder().max_size(1).build(manager).unwrap()
    }

    fn insert_user(conn: &rusqlite::Connection, email: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (email, password_hash, date_joined) VALUES (?1, 'x', ?2)",
            params![email, now_timestamp()],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn insert_ad(conn: &rusqlite::Connection, author: i64) -> i64 {
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO ads (title, price_cents, author_id, created_at, updated_at)
             VALUES ('Bike', 1000, ?1, ?2, ?2)",
            params![author, now],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn insert_comment(conn: &rusqlite::Connection, author: i64, ad: i64) {
        conn.execute(
            "INSERT INTO comments (text, author_id, ad_id, created_at) VALUES ('hi', ?1, ?2, ?3)",
            params![author, ad, now_timestamp()],
        )
        .unwrap();
    }

    fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        let conn = pool.get().unwrap();
        assert!(db_path.exists());
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        let fks: bool = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert!(fks);
    }

    #[test]
    fn casefold_handles_non_ascii() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();
        let folded: String = conn
            .query_row("SELECT casefold('ВелоСИПЕД Ärger')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "велосипед ärger");
        let missing: Option<String> = conn
            .query_row("SELECT casefold(NULL)", [], |row| row.get(0))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn migrations_run_successfully() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for table in ["users", "sessions", "ads", "comments", "schema_version"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        assert_eq!(count(&conn, "schema_version"), MIGRATIONS.len() as i64);
    }

    #[test]
    fn deleting_user_cascades_to_ads_and_their_comments() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();

        let seller = insert_user(&conn, "seller@mail.com");
        let buyer = insert_user(&conn, "buyer@mail.com");
        let ad = insert_ad(&conn, seller);
        insert_comment(&conn, buyer, ad);

        // The buyer stays protected until their comment is gone.
        conn.execute("DELETE FROM users WHERE id = ?1", params![seller])
            .unwrap();
        assert_eq!(count(&conn, "ads"), 0);
        assert_eq!(count(&conn, "comments"), 0);
        conn.execute("DELETE FROM users WHERE id = ?1", params![buyer])
            .unwrap();
        assert_eq!(count(&conn, "users"), 0);
    }

    #[test]
    fn comment_on_own_ad_blocks_author_delete() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();

        let seller = insert_user(&conn, "seller@mail.com");
        let ad = insert_ad(&conn, seller);
        insert_comment(&conn, seller, ad);

        let err = conn
            .execute("DELETE FROM users WHERE id = ?1", params![seller])
            .unwrap_err();
        assert_eq!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
        assert_eq!(count(&conn, "users"), 1);
        assert_eq!(count(&conn, "ads"), 1);
        assert_eq!(count(&conn, "comments"), 1);
    }

    #[test]
    fn deleting_comment_author_is_rejected() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();

        let seller = insert_user(&conn, "seller@mail.com");
        let buyer = insert_user(&conn, "buyer@mail.com");
        let ad = insert_ad(&conn, seller);
        insert_comment(&conn, buyer, ad);

        let result = conn.execute("DELETE FROM users WHERE id = ?1", params![buyer]);
        assert!(result.is_err());
        assert_eq!(count(&conn, "users"), 2);
    }

    #[test]
    fn negative_price_is_rejected() {
        let pool = test_pool();
        run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();

        let now = now_timestamp();
        let result = conn.execute(
            "INSERT INTO ads (title, price_cents, created_at, updated_at) VALUES ('x', -1, ?1, ?1)",
            params![now],
        );
        assert!(result.is_err());
    }
}
