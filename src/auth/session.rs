// Server-side sessions. The browser holds a random token in an HttpOnly
// cookie; only its SHA-256 is stored, mapped to the signed-in user id.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;

/// Hex-encoded random bytes from the OS RNG.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Unexpired sessions only.
    async fn user_for(&self, token_hash: &str, now: OffsetDateTime)
        -> anyhow::Result<Option<Uuid>>;

    async fn remove(&self, token_hash: &str) -> anyhow::Result<()>;

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("insert session")?;
        Ok(())
    }

    async fn user_for(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT user_id
            FROM sessions
            WHERE token_hash = $1 AND expires_at > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("lookup session")?;
        Ok(row.map(|(id,)| id))
    }

    async fn remove(&self, token_hash: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.db)
            .await
            .context("delete session")?;
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await
            .context("purge expired sessions")?;
        Ok(res.rows_affected())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, (Uuid, OffsetDateTime)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        self.sessions
            .write()
            .insert(token_hash.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn user_for(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>> {
        Ok(self
            .sessions
            .read()
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user_id, _)| *user_id))
    }

    async fn remove(&self, token_hash: &str) -> anyhow::Result<()> {
        self.sessions.write().remove(token_hash);
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

/// Issues, resolves and revokes session tokens, and builds the cookie
/// that carries them.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_minutes.saturating_mul(60))
    }

    /// Stores a new session for `user_id` and returns the raw token.
    pub async fn create(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let purged = self.store.purge_expired(now).await?;
        if purged > 0 {
            debug!(purged, "expired sessions removed");
        }

        let expires_at = now
            .checked_add(self.ttl())
            .ok_or_else(|| anyhow::anyhow!("session ttl of {} minutes is out of range", self.config.ttl_minutes))?;
        let token = random_token(32);
        self.store
            .insert(&hash_token(&token), user_id, expires_at)
            .await?;
        debug!(user_id = %user_id, "session created");
        Ok(token)
    }

    pub async fn resolve(&self, token: &str) -> anyhow::Result<Option<Uuid>> {
        self.store
            .user_for(&hash_token(token), OffsetDateTime::now_utc())
            .await
    }

    pub async fn destroy(&self, token: &str) -> anyhow::Result<()> {
        self.store.remove(&hash_token(token)).await
    }

    /// Raw token from the request cookies, if any.
    pub fn token_from(&self, jar: &CookieJar) -> Option<String> {
        jar.get(self.cookie_name())
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .secure(self.config.secure_cookie)
            .same_site(SameSite::Lax)
            .max_age(self.ttl())
            .build()
    }

    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build((self.config.cookie_name.clone(), "")).path("/"))
    }
}
