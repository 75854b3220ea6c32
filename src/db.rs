use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::models::{Role, UserProfile};
use crate::session::{Session, SessionStore, StoreError};

const SCHEMA: &str = include_str!("../migrations/001_bff_session.sql");

pub async fn connect_pg(database_url: &str) -> anyhow::Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Sessions persisted in Postgres so they survive a portal restart.
pub struct PgSessionStore {
    db: sqlx::PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    token_hash: String,
    upstream_token: String,
    user_id: String,
    user_name: String,
    user_email: String,
    user_phone: Option<String>,
    user_role: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.user_role)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown role {}", row.user_role)))?;
        Ok(Session {
            session_id: row.session_id,
            token_hash: row.token_hash,
            upstream_token: row.upstream_token,
            user: UserProfile {
                id: row.user_id,
                name: row.user_name,
                email: row.user_email,
                phone: row.user_phone,
                role,
            },
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

impl PgSessionStore {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO portal_session
                (session_id, token_hash, upstream_token, user_id, user_name,
                 user_email, user_phone, user_role, created_at, expires_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (session_id) DO UPDATE
                SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(session.session_id)
        .bind(&session.token_hash)
        .bind(&session.upstream_token)
        .bind(&session.user.id)
        .bind(&session.user.name)
        .bind(&session.user.email)
        .bind(session.user.phone.as_deref())
        .bind(session.user.role.as_str())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, token_hash, upstream_token, user_id, user_name,
                   user_email, user_phone, user_role, created_at, expires_at
            FROM portal_session
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > now()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Touch last_seen_at (best-effort)
        let _ = sqlx::query("UPDATE portal_session SET last_seen_at = now() WHERE session_id = $1")
            .bind(row.session_id)
            .execute(&self.db)
            .await;

        Session::try_from(row).map(Some)
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE portal_session
            SET revoked_at = now()
            WHERE session_id = $1
              AND revoked_at IS NULL
              AND expires_at > now()
            "#,
        )
        .bind(session_id)
        .execute(&self.db)
        .await?;
        Ok(rows.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM portal_session
            WHERE expires_at <= now()
               OR revoked_at IS NOT NULL
            RETURNING session_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }
}
