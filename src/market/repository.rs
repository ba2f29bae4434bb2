// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::models::{Ad, Comment, Role, User};
use crate::db::now_timestamp;
use crate::market::domain::{AdChanges, AdDraft, ProfileChanges};
use crate::market::listing::{AdFilter, ListRequest};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found")]
    NotFound,

    #[error("Conflict on {field}: {message}")]
    Conflict {
        field: &'static str,
        message: String,
    },

    #[error("Protected: {0}")]
    Protected(String),
}

#[async_trait]
pub trait AdRepository: Send + Sync {
    /// One page of ads matching `filter`, plus the total match count.
    async fn list(
        &self,
        filter: &AdFilter,
        request: &ListRequest,
    ) -> Result<(Vec<Ad>, u64), RepositoryError>;

    async fn get(&self, id: i64) -> Result<Option<Ad>, RepositoryError>;

    async fn create(&self, author_id: i64, draft: &AdDraft) -> Result<Ad, RepositoryError>;

    async fn update(&self, id: i64, changes: &AdChanges) -> Result<Ad, RepositoryError>;

    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

/// Comments are only ever addressed through their parent ad.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn list_for_ad(
        &self,
        ad_id: i64,
        request: &ListRequest,
    ) -> Result<(Vec<Comment>, u64), RepositoryError>;

    /// Compound-key lookup. A comment filed under another ad is NotFound,
    /// exactly like a comment that does not exist.
    async fn resolve(&self, ad_id: i64, comment_id: i64) -> Result<Comment, RepositoryError>;

    async fn create(
        &self,
        ad_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<Comment, RepositoryError>;

    async fn update(
        &self,
        ad_id: i64,
        comment_id: i64,
        text: Option<&str>,
    ) -> Result<Comment, RepositoryError>;

    async fn delete(&self, ad_id: i64, comment_id: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, RepositoryError>;

    async fn get(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// All users, or only `only` when set.
    async fn list(
        &self,
        only: Option<i64>,
        request: &ListRequest,
    ) -> Result<(Vec<User>, u64), RepositoryError>;

    async fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<User, RepositoryError>;

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), RepositoryError>;

    /// Cascades to the user's ads and sessions; refused while the user
    /// authors any comment, including one on their own ad.
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

// --- Row mapping ---

const AD_COLUMNS: &str =
    "a.id, a.title, a.price_cents, a.description, a.author_id, a.created_at, a.updated_at";
const COMMENT_COLUMNS: &str = "c.id, c.ad_id, c.author_id, c.text, c.created_at";
const USER_COLUMNS: &str = "u.id, u.email, u.first_name, u.last_name, u.phone, u.role, \
     u.is_active, u.password_hash, u.date_joined";

fn ad_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ad> {
    Ok(Ad {
        id: row.get(0)?,
        title: row.get(1)?,
        price: Decimal::new(row.get(2)?, 2),
        description: row.get(3)?,
        author: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        ad: row.get(1)?,
        author: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        role: role.parse().unwrap_or_default(),
        is_active: row.get(6)?,
        password_hash: row.get(7)?,
        date_joined: row.get(8)?,
    })
}

fn fetch_ad(conn: &Connection, id: i64) -> Result<Option<Ad>, RepositoryError> {
    Ok(conn
        .query_row(
            &format!("SELECT {AD_COLUMNS} FROM ads a WHERE a.id = ?1"),
            params![id],
            ad_from_row,
        )
        .optional()?)
}

fn fetch_comment(
    conn: &Connection,
    ad_id: i64,
    comment_id: i64,
) -> Result<Comment, RepositoryError> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = ?1 AND c.ad_id = ?2"),
        params![comment_id, ad_id],
        comment_from_row,
    )
    .optional()?
    .ok_or(RepositoryError::NotFound)
}

fn fetch_user(conn: &Connection, id: i64) -> Result<Option<User>, RepositoryError> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?)
}

/// `%needle%` with LIKE wildcards in the needle taken literally.
fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Numbered-parameter WHERE builder.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Conditions {
    fn push(&mut self, clause: &str, value: Value) {
        self.values.push(value);
        self.clauses
            .push(clause.replace("{}", &format!("?{}", self.values.len())));
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Appends LIMIT/OFFSET parameters and returns their SQL.
    fn page_sql(&mut self, request: &ListRequest) -> String {
        self.values.push(Value::Integer(to_sql_int(request.page.size)));
        self.values
            .push(Value::Integer(to_sql_int(request.page.offset())));
        let n = self.values.len();
        format!("LIMIT ?{} OFFSET ?{}", n - 1, n)
    }
}

fn count(conn: &Connection, sql: &str, values: &[Value]) -> Result<u64, RepositoryError> {
    let total: i64 = conn.query_row(sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(u64::try_from(total).unwrap_or_default())
}

fn constraint_message(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(e, message)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(message.as_deref().unwrap_or_default())
        }
        _ => None,
    }
}

/// Unique violations on users become field conflicts.
fn user_conflict(err: rusqlite::Error) -> RepositoryError {
    let field = match constraint_message(&err) {
        Some(msg) if msg.contains("users.email") => Some("email"),
        Some(msg) if msg.contains("users.phone") => Some("phone"),
        _ => None,
    };
    match field {
        Some(field) => RepositoryError::Conflict {
            field,
            message: format!("user with this {field} already exists."),
        },
        None => err.into(),
    }
}

// --- SQLite implementations ---

pub struct SqliteAdRepository {
    pool: DbPool,
}

impl SqliteAdRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdRepository for SqliteAdRepository {
    async fn list(
        &self,
        filter: &AdFilter,
        request: &ListRequest,
    ) -> Result<(Vec<Ad>, u64), RepositoryError> {
        let conn = self.pool.get()?;

        let mut conditions = Conditions::default();
        if let Some(author_id) = filter.author_id {
            conditions.push("a.author_id = {}", Value::Integer(author_id));
        }
        for (column, needle) in [
            ("a.title", &filter.title),
            ("a.description", &filter.description),
            ("u.email", &filter.author_email),
        ] {
            if let Some(needle) = needle {
                conditions.push(
                    &format!("casefold({column}) LIKE {{}} ESCAPE '\\'"),
                    Value::Text(contains_pattern(&needle.to_lowercase())),
                );
            }
        }
        if let Some(min) = filter.min_price_cents {
            conditions.push("a.price_cents >= {}", Value::Integer(min));
        }
        if let Some(max) = filter.max_price_cents {
            conditions.push("a.price_cents <= {}", Value::Integer(max));
        }

        let from = format!(
            "FROM ads a LEFT JOIN users u ON u.id = a.author_id {}",
            conditions.where_sql()
        );

        let tx = conn.unchecked_transaction()?;
        let total = count(&tx, &format!("SELECT COUNT(*) {from}"), &conditions.values)?;
        let page = conditions.page_sql(request);
        let sql = format!(
            "SELECT {AD_COLUMNS} {from} ORDER BY {} {page}",
            request.ordering.to_sql()
        );
        let ads = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(conditions.values.iter()), ad_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        tracing::debug!(total, returned = ads.len(), "Listed ads");
        Ok((ads, total))
    }

    async fn get(&self, id: i64) -> Result<Option<Ad>, RepositoryError> {
        let conn = self.pool.get()?;
        fetch_ad(&conn, id)
    }

    async fn create(&self, author_id: i64, draft: &AdDraft) -> Result<Ad, RepositoryError> {
        let conn = self.pool.get()?;
        let now = now_timestamp();

        conn.execute(
            "INSERT INTO ads (title, price_cents, description, author_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![draft.title, draft.price_cents, draft.description, author_id, now],
        )?;

        fetch_ad(&conn, conn.last_insert_rowid())?.ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, id: i64, changes: &AdChanges) -> Result<Ad, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE ads SET
               title = COALESCE(?1, title),
               price_cents = COALESCE(?2, price_cents),
               description = CASE WHEN ?3 THEN ?4 ELSE description END,
               updated_at = ?5
             WHERE id = ?6",
            params![
                changes.title,
                changes.price_cents,
                changes.description.is_some(),
                changes.description.clone().flatten(),
                now_timestamp(),
                id
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }

        fetch_ad(&conn, id)?.ok_or(RepositoryError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM ads WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

pub struct SqliteCommentRepository {
    pool: DbPool,
}

impl SqliteCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn list_for_ad(
        &self,
        ad_id: i64,
        request: &ListRequest,
    ) -> Result<(Vec<Comment>, u64), RepositoryError> {
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;

        if fetch_ad(&tx, ad_id)?.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let mut conditions = Conditions::default();
        conditions.push("c.ad_id = {}", Value::Integer(ad_id));
        let from = format!("FROM comments c {}", conditions.where_sql());

        let total = count(&tx, &format!("SELECT COUNT(*) {from}"), &conditions.values)?;
        let page = conditions.page_sql(request);
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} {from} ORDER BY {} {page}",
            request.ordering.to_sql()
        );
        let comments = {
            let mut stmt = tx.prepare(&sql)?;
            let rows =
                stmt.query_map(params_from_iter(conditions.values.iter()), comment_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        Ok((comments, total))
    }

    async fn resolve(&self, ad_id: i64, comment_id: i64) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;
        fetch_comment(&conn, ad_id, comment_id)
    }

    async fn create(
        &self,
        ad_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;

        // Parent existence and insert in one statement.
        let rows = conn.execute(
            "INSERT INTO comments (text, author_id, ad_id, created_at)
             SELECT ?1, ?2, a.id, ?4 FROM ads a WHERE a.id = ?3",
            params![text, author_id, ad_id, now_timestamp()],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }

        fetch_comment(&conn, ad_id, conn.last_insert_rowid())
    }

    async fn update(
        &self,
        ad_id: i64,
        comment_id: i64,
        text: Option<&str>,
    ) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE comments SET text = COALESCE(?1, text) WHERE id = ?2 AND ad_id = ?3",
            params![text, comment_id, ad_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }

        fetch_comment(&conn, ad_id, comment_id)
    }

    async fn delete(&self, ad_id: i64, comment_id: i64) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM comments WHERE id = ?1 AND ad_id = ?2",
            params![comment_id, ad_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO users (email, password_hash, role, is_active, date_joined)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![email, password_hash, role.as_str(), now_timestamp()],
        )
        .map_err(user_conflict)?;

        fetch_user(&conn, conn.last_insert_rowid())?.ok_or(RepositoryError::NotFound)
    }

    async fn get(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        fetch_user(&conn, id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?)
    }

    async fn list(
        &self,
        only: Option<i64>,
        request: &ListRequest,
    ) -> Result<(Vec<User>, u64), RepositoryError> {
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;

        let mut conditions = Conditions::default();
        if let Some(id) = only {
            conditions.push("u.id = {}", Value::Integer(id));
        }
        let from = format!("FROM users u {}", conditions.where_sql());

        let total = count(&tx, &format!("SELECT COUNT(*) {from}"), &conditions.values)?;
        let page = conditions.page_sql(request);
        let sql = format!(
            "SELECT {USER_COLUMNS} {from} ORDER BY {} {page}",
            request.ordering.to_sql()
        );
        let users = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(conditions.values.iter()), user_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        Ok((users, total))
    }

    async fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn
            .execute(
                "UPDATE users SET
                   email = COALESCE(?1, email),
                   first_name = CASE WHEN ?2 THEN ?3 ELSE first_name END,
                   last_name = CASE WHEN ?4 THEN ?5 ELSE last_name END,
                   phone = CASE WHEN ?6 THEN ?7 ELSE phone END
                 WHERE id = ?8",
                params![
                    changes.email,
                    changes.first_name.is_some(),
                    changes.first_name.clone().flatten(),
                    changes.last_name.is_some(),
                    changes.last_name.clone().flatten(),
                    changes.phone.is_some(),
                    changes.phone.clone().flatten(),
                    id
                ],
            )
            .map_err(user_conflict)?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }

        fetch_user(&conn, id)?.ok_or(RepositoryError::NotFound)
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let result = conn.execute("DELETE FROM users WHERE id = ?1", params![id]);
        match result {
            Ok(0) => Err(RepositoryError::NotFound),
            Ok(_) => Ok(()),
            Err(e) if constraint_message(&e).is_some() => Err(RepositoryError::Protected(
                "Cannot delete a user who still authors comments.".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}
