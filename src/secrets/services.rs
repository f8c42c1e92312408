use uuid::Uuid;

use crate::{
    error::AppError,
    users::{User, UserStore},
};

pub const MAX_SECRET_LEN: usize = 2000;

pub(crate) fn normalize_secret(raw: &str) -> Result<String, AppError> {
    let secret = raw.trim();
    if secret.is_empty() {
        return Err(AppError::Validation("Your secret cannot be empty".into()));
    }
    if secret.chars().count() > MAX_SECRET_LEN {
        return Err(AppError::Validation(format!(
            "Secrets are limited to {MAX_SECRET_LEN} characters"
        )));
    }
    Ok(secret.to_string())
}

/// Replaces the user's secret. `None` when the account no longer exists.
pub async fn post_secret(
    users: &dyn UserStore,
    user_id: Uuid,
    raw: &str,
) -> Result<Option<User>, AppError> {
    let secret = normalize_secret(raw)?;
    Ok(users.set_secret(user_id, &secret).await?)
}

/// Secret texts for the board, in account creation order.
pub async fn board(users: &dyn UserStore) -> Result<Vec<String>, AppError> {
    Ok(users
        .list_with_secrets()
        .await?
        .into_iter()
        .filter_map(|u| u.secret)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{MemoryUserStore, NewLocalUser};

    #[test]
    fn secret_rules() {
        assert_eq!(normalize_secret("  psst  ").unwrap(), "psst");
        assert!(matches!(normalize_secret("   "), Err(AppError::Validation(_))));
        assert!(normalize_secret(&"s".repeat(MAX_SECRET_LEN)).is_ok());
        assert!(normalize_secret(&"s".repeat(MAX_SECRET_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn resubmission_overwrites() {
        let store = MemoryUserStore::new();
        let user = store
            .create_local(NewLocalUser {
                username: "dave".into(),
                password_hash: "$argon2id$fake".into(),
            })
            .await
            .unwrap();

        post_secret(&store, user.id, "S").await.unwrap();
        post_secret(&store, user.id, "T").await.unwrap();
        assert_eq!(board(&store).await.unwrap(), vec!["T".to_string()]);
    }

    #[tokio::test]
    async fn empty_secret_leaves_previous_one() {
        let store = MemoryUserStore::new();
        let user = store
            .create_local(NewLocalUser {
                username: "erin".into(),
                password_hash: "$argon2id$fake".into(),
            })
            .await
            .unwrap();

        post_secret(&store, user.id, "kept").await.unwrap();
        assert!(post_secret(&store, user.id, "").await.is_err());
        assert_eq!(board(&store).await.unwrap(), vec!["kept".to_string()]);
    }
}
