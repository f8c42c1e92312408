use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{NewLocalUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already taken")]
    Duplicate(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.into())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Persistence seam for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the username is in use.
    async fn create_local(&self, new: NewLocalUser) -> Result<User, StoreError>;

    /// Returns the user linked to `external_id`, creating it first if needed.
    /// The flag is `true` when this call created the record.
    async fn find_or_create_external(&self, external_id: &str)
        -> Result<(User, bool), StoreError>;

    /// Overwrites the secret. `None` when no such user exists.
    async fn set_secret(&self, id: Uuid, secret: &str) -> Result<Option<User>, StoreError>;

    /// Every user with a secret, oldest account first.
    async fn list_with_secrets(&self) -> Result<Vec<User>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, external_id, secret, created_at
            FROM users
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, external_id, secret, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, external_id, secret, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_local(&self, new: NewLocalUser) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, external_id, secret, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate("username")),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_or_create_external(
        &self,
        external_id: &str,
    ) -> Result<(User, bool), StoreError> {
        if let Some(user) = self.find_by_external_id(external_id).await? {
            return Ok((user, false));
        }

        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, external_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING id, username, password_hash, external_id, secret, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(external_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.db)
        .await?;

        match inserted {
            Some(user) => Ok((user, true)),
            // Lost the race to a concurrent first login; that row wins.
            None => self
                .find_by_external_id(external_id)
                .await?
                .map(|u| (u, false))
                .ok_or_else(|| {
                    StoreError::Backend(anyhow::anyhow!(
                        "external user vanished after insert conflict"
                    ))
                }),
        }
    }

    async fn set_secret(&self, id: Uuid, secret: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET secret = $2
            WHERE id = $1
            RETURNING id, username, password_hash, external_id, secret, created_at
            "#,
        )
        .bind(id)
        .bind(secret)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_with_secrets(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, external_id, secret, created_at
            FROM users
            WHERE secret IS NOT NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }
}
