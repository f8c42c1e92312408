use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                      // unique user ID
    pub username: Option<String>,      // absent for Google-only accounts
    pub password_hash: Option<String>, // Argon2 hash
    pub external_id: Option<String>,   // Google profile id
    pub secret: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Insert payload for a password account.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
    pub username: String,
    pub password_hash: String,
}
