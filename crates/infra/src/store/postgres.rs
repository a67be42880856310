//! Postgres-backed account store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `DuplicateEmail` | Insert/update to an email already in use |
//! | Database (foreign key violation) | `23503` | `NotFound` | Token or grant for a user that does not exist |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | RowNotFound | N/A | `NotFound` | Lookup matched nothing |
//! | Other | N/A | `Backend` | Pool closed, network errors, etc. |
//!
//! Version conflicts are detected by `UPDATE … WHERE id = $ AND version = $`
//! returning no row, which maps to `EditConflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;

use bankapi_auth::{
    AccountStore, NewUser, PasswordHash, Permission, Permissions, Scope, StoreError, Token, User,
};
use bankapi_core::UserId;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const USER_COLUMNS: &str = "users.id, users.created_at, users.name, users.email, users.password_hash, users.activated, users.version";

#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema. Safe to run on every start.
    #[instrument(skip_all, err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(&format!("migrate statement {}", index + 1), e))?;
        }
        tracing::info!("account schema applied");
        Ok(())
    }

    async fn fetch_user(
        &self,
        operation: &str,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<User, StoreError> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(StoreError::NotFound)?;
        user_from_row(&row).map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    #[instrument(skip_all, fields(user_id = %id), err)]
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.id = $1");
        self.fetch_user("get_user_by_id", sqlx::query(&sql).bind(id.get()))
            .await
    }

    #[instrument(skip_all, err)]
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.email = $1");
        self.fetch_user("get_user_by_email", sqlx::query(&sql).bind(email))
            .await
    }

    #[instrument(skip_all, fields(scope = %scope), err)]
    async fn get_user_for_token(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let hash = bankapi_auth::TokenHash::of(plaintext);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             INNER JOIN tokens ON users.id = tokens.user_id \
             WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3"
        );
        self.fetch_user(
            "get_user_for_token",
            sqlx::query(&sql)
                .bind(&hash.as_bytes()[..])
                .bind(scope.as_str())
                .bind(now),
        )
        .await
    }

    #[instrument(skip_all, err)]
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.password.as_str())
        .bind(user.activated)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("insert_user", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        let version: i32 = row
            .try_get("version")
            .map_err(|e| map_sqlx_error("insert_user", e))?;

        Ok(User {
            id: UserId::new(id),
            username: user.username,
            email: user.email,
            password: user.password,
            activated: user.activated,
            version,
            created_at,
        })
    }

    #[instrument(skip_all, fields(user_id = %user.id, version = user.version), err)]
    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.password.as_str())
        .bind(user.activated)
        .bind(user.id.get())
        .bind(user.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?
        .ok_or(StoreError::EditConflict)?;

        let mut stored = user.clone();
        stored.version = row
            .try_get("version")
            .map_err(|e| map_sqlx_error("update_user", e))?;
        Ok(stored)
    }

    #[instrument(skip_all, fields(user_id = %token.user_id, scope = %token.scope), err)]
    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.hash.as_bytes()[..])
        .bind(token.user_id.get())
        .bind(token.expiry)
        .bind(token.scope.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_token", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %user_id, scope = %scope), err)]
    async fn delete_tokens_for_user(
        &self,
        scope: Scope,
        user_id: UserId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope.as_str())
            .bind(user_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_tokens_for_user", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(user_id = %user_id), err)]
    async fn get_permissions_for_user(&self, user_id: UserId) -> Result<Permissions, StoreError> {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_permissions_for_user", e))?;

        Ok(codes.into_iter().map(Permission::new).collect())
    }

    #[instrument(skip_all, fields(user_id = %user_id, count = codes.len()), err)]
    async fn grant_permissions(
        &self,
        user_id: UserId,
        codes: &[Permission],
    ) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_string()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("grant_permissions", e))?;

        sqlx::query(
            r#"
            INSERT INTO permissions (code)
            SELECT unnest($1::text[])
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&codes[..])
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("grant_permissions", e))?;

        sqlx::query(
            r#"
            INSERT INTO users_permissions (user_id, permission_id)
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id.get())
        .bind(&codes[..])
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("grant_permissions", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("grant_permissions", e))?;
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let password_hash: String = row.try_get("password_hash")?;
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("name")?,
        email: row.try_get("email")?,
        password: PasswordHash::from_stored(password_hash),
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
    })
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

/// Map SQLx errors to store errors (see the module docs for the table).
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::DuplicateEmail,
            Some("23503") => StoreError::NotFound,
            _ => StoreError::backend(format!(
                "database error in {}: {}",
                operation,
                db_err.message()
            )),
        },
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::backend(format!("sqlx error in {}: {}", operation, other)),
    }
}
