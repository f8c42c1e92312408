// In-memory user store for running without Postgres and for tests.
// Everything is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::{
    repo::{StoreError, UserStore},
    repo_types::{NewLocalUser, User},
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn create_local(&self, new: NewLocalUser) -> Result<User, StoreError> {
        let mut users = self.users.write();
        if users
            .values()
            .any(|u| u.username.as_deref() == Some(new.username.as_str()))
        {
            return Err(StoreError::Duplicate("username"));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: Some(new.username),
            password_hash: Some(new.password_hash),
            external_id: None,
            secret: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_or_create_external(
        &self,
        external_id: &str,
    ) -> Result<(User, bool), StoreError> {
        let mut users = self.users.write();
        if let Some(existing) = users
            .values()
            .find(|u| u.external_id.as_deref() == Some(external_id))
        {
            return Ok((existing.clone(), false));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: None,
            password_hash: None,
            external_id: Some(external_id.to_string()),
            secret: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok((user, true))
    }

    async fn set_secret(&self, id: Uuid, secret: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write();
        Ok(users.get_mut(&id).map(|u| {
            u.secret = Some(secret.to_string());
            u.clone()
        }))
    }

    async fn list_with_secrets(&self) -> Result<Vec<User>, StoreError> {
        let mut rows: Vec<User> = self
            .users
            .read()
            .values()
            .filter(|u| u.secret.is_some())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.users.read().len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str) -> NewLocalUser {
        NewLocalUser {
            username: name.into(),
            password_hash: "$argon2id$fake".into(),
        }
    }

    #[tokio::test]
    async fn create_local_rejects_duplicate_username() {
        let store = MemoryUserStore::new();
        store.create_local(local("alice")).await.expect("first insert");
        let err = store.create_local(local("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("username")));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_or_create_external_reuses_record() {
        let store = MemoryUserStore::new();
        let (first, created) = store.find_or_create_external("g-123").await.unwrap();
        assert!(created);
        let (second, created) = store.find_or_create_external("g-123").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(second.external_id.as_deref(), Some("g-123"));
        assert!(second.password_hash.is_none());
    }

    #[tokio::test]
    async fn set_secret_overwrites_and_lists() {
        let store = MemoryUserStore::new();
        let user = store.create_local(local("bob")).await.unwrap();
        store.create_local(local("carol")).await.unwrap();

        store.set_secret(user.id, "S").await.unwrap();
        store.set_secret(user.id, "T").await.unwrap();

        let listed = store.list_with_secrets().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, user.id);
        assert_eq!(listed[0].secret.as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn set_secret_on_unknown_user_is_none() {
        let store = MemoryUserStore::new();
        let res = store.set_secret(Uuid::new_v4(), "nope").await.unwrap();
        assert!(res.is_none());
        assert!(store.list_with_secrets().await.unwrap().is_empty());
    }
}
