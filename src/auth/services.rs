use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        oauth::ExternalIdentity,
        password::{hash_password, verify_password},
    },
    error::AppError,
    users::{NewLocalUser, User, UserStore},
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^\S{1,64}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub(crate) fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim();
    if !is_valid_username(username) {
        return Err(AppError::Validation(
            "Username must be 1 to 64 characters without spaces".into(),
        ));
    }
    Ok(username.to_string())
}

pub(crate) fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "Password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Owns password hashing and verification, and external-account linking.
/// Users stay plain records; nothing here is attached to them.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = normalize_username(username)?;
        validate_password(password)?;

        let plain = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .context("password hashing task")??;

        let user = self
            .users
            .create_local(NewLocalUser {
                username,
                password_hash,
            })
            .await?;
        info!(user_id = %user.id, "local user registered");
        Ok(user)
    }

    /// Unknown usernames and wrong passwords are indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::InvalidCredentials);
        }

        let Some(user) = self.users.find_by_username(username).await? else {
            warn!(%username, "login unknown username");
            return Err(AppError::InvalidCredentials);
        };
        let Some(stored) = user.password_hash.clone() else {
            warn!(user_id = %user.id, "password login on external-only account");
            return Err(AppError::InvalidCredentials);
        };

        let plain = password.to_owned();
        let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &stored))
            .await
            .context("password verify task")??;

        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }
        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    pub async fn find_or_create_external(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<User, AppError> {
        if identity.id.trim().is_empty() {
            return Err(AppError::OAuth("provider returned an empty subject".into()));
        }
        let (user, created) = self.users.find_or_create_external(&identity.id).await?;
        if created {
            info!(
                user_id = %user.id,
                external_id = %identity.id,
                display_name = ?identity.display_name,
                "external user created"
            );
        } else {
            info!(user_id = %user.id, "external user signed in");
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::MemoryUserStore;

    fn verifier() -> (CredentialVerifier, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (CredentialVerifier::new(store.clone()), store)
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("alice@example.com"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("two words"));
        assert!(!is_valid_username(&"x".repeat(65)));
        assert_eq!(normalize_username("  bob ").unwrap(), "bob");
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let (verifier, _) = verifier();
        let user = verifier.register("alice", "correct-horse").await.unwrap();
        assert!(user.external_id.is_none());
        assert_ne!(user.password_hash.as_deref(), Some("correct-horse"));

        let again = verifier.authenticate("alice", "correct-horse").await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_invalid_credentials() {
        let (verifier, _) = verifier();
        verifier.register("alice", "correct-horse").await.unwrap();

        let err = verifier.authenticate("alice", "wrong-horse").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        let err = verifier.authenticate("mallory", "whatever1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_store_unchanged() {
        let (verifier, store) = verifier();
        verifier.register("alice", "correct-horse").await.unwrap();
        let err = verifier.register("alice", "another-pass").await.unwrap_err();
        assert!(matches!(err, AppError::UsernameTaken));
        assert_eq!(store.count().await.unwrap(), 1);

        // the first registration's password still works
        verifier.authenticate("alice", "correct-horse").await.unwrap();
    }

    #[tokio::test]
    async fn external_identity_is_found_or_created_once() {
        let (verifier, store) = verifier();
        let identity = ExternalIdentity {
            id: "g-1".into(),
            display_name: None,
        };
        verifier.find_or_create_external(&identity).await.unwrap();
        let again = verifier.find_or_create_external(&identity).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(again.username.is_none());
    }

    #[tokio::test]
    async fn empty_external_subject_is_rejected() {
        let (verifier, store) = verifier();
        let identity = ExternalIdentity {
            id: " ".into(),
            display_name: None,
        };
        let err = verifier.find_or_create_external(&identity).await.unwrap_err();
        assert!(matches!(err, AppError::OAuth(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
