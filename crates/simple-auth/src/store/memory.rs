//! In-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use simple_auth_core::{AuthError, AuthResult};

use super::{duplicate_email, duplicate_group_name, unknown_group, GroupStore, UserStore};
use crate::group::Group;
use crate::user::User;

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    last_user_id: i64,
    last_group_id: i64,
}

/// A store backed by maps; cloning shares the data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn save_user(&self, user: &mut User) -> AuthResult<()> {
        let mut candidate = user.clone();
        candidate.pre_save();

        let mut state = self.state.write().await;
        let taken = state
            .users
            .values()
            .any(|u| u.id != candidate.id && u.email.eq_ignore_ascii_case(&candidate.email));
        if taken {
            return Err(duplicate_email());
        }
        if let Some(name) = candidate
            .groups
            .iter()
            .find(|name| !state.groups.values().any(|g| &g.name == *name))
        {
            return Err(unknown_group(name));
        }

        let id = match candidate.id {
            Some(id) if state.users.contains_key(&id) => id,
            Some(id) => return Err(AuthError::DoesNotExist(format!("User matching id {id}"))),
            None => {
                state.last_user_id += 1;
                state.last_user_id
            }
        };
        candidate.id = Some(id);
        state.users.insert(id, candidate.clone());
        drop(state);

        *user = candidate;
        Ok(())
    }

    async fn get_user(&self, id: i64) -> AuthResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AuthResult<bool> {
        let email = email.to_lowercase();
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .any(|u| u.email == email && (exclude_id.is_none() || u.id != exclude_id)))
    }

    async fn list_users(&self) -> AuthResult<Vec<User>> {
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn count_users(&self) -> AuthResult<usize> {
        Ok(self.state.read().await.users.len())
    }
}

#[async_trait]
impl GroupStore for InMemoryStore {
    async fn save_group(&self, group: &mut Group) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state
            .groups
            .values()
            .any(|g| g.id != group.id && g.name == group.name)
        {
            return Err(duplicate_group_name());
        }

        let id = match group.id {
            Some(id) => {
                let Some(previous) = state.groups.get(&id).map(|g| g.name.clone()) else {
                    return Err(AuthError::DoesNotExist(format!("Group matching id {id}")));
                };
                if previous != group.name {
                    for user in state.users.values_mut() {
                        for name in &mut user.groups {
                            if *name == previous {
                                name.clone_from(&group.name);
                            }
                        }
                    }
                }
                id
            }
            None => {
                state.last_group_id += 1;
                state.last_group_id
            }
        };
        group.id = Some(id);
        state.groups.insert(id, group.clone());
        Ok(())
    }

    async fn get_group(&self, id: i64) -> AuthResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn get_group_by_name(&self, name: &str) -> AuthResult<Option<Group>> {
        Ok(self
            .state
            .read()
            .await
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn list_groups(&self) -> AuthResult<Vec<Group>> {
        let mut groups: Vec<Group> = self.state.read().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_ids_and_lowercases() {
        let store = InMemoryStore::new();
        let mut a = User::new("A@Example.com");
        let mut b = User::new("b@example.com");
        store.save_user(&mut a).await.unwrap();
        store.save_user(&mut b).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
        assert_eq!(a.email, "a@example.com");
        assert_eq!(store.count_users().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_case_insensitively() {
        let store = InMemoryStore::new();
        store.save_user(&mut User::new("test@example.com")).await.unwrap();

        let mut dup = User::new("TEST@example.com");
        let err = store.save_user(&mut dup).await.unwrap_err();
        assert!(matches!(err, AuthError::IntegrityError(_)));
        assert!(dup.id.is_none());
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_existing() {
        let store = InMemoryStore::new();
        let mut user = User::new("test@example.com");
        store.save_user(&mut user).await.unwrap();

        user.first_name = "Thomas".into();
        store.save_user(&mut user).await.unwrap();
        let loaded = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(loaded.first_name, "Thomas");
        assert!(store.email_exists("TEST@example.com", None).await.unwrap());
        assert!(!store.email_exists("test@example.com", Some(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let store = InMemoryStore::new();
        let mut user = User {
            id: Some(42),
            ..User::new("ghost@example.com")
        };
        assert!(matches!(
            store.save_user(&mut user).await,
            Err(AuthError::DoesNotExist(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_group_rejected() {
        let store = InMemoryStore::new();
        let mut user = User {
            groups: vec!["editors".into()],
            ..User::new("test@example.com")
        };
        assert!(store.save_user(&mut user).await.is_err());

        store.save_group(&mut Group::new("editors")).await.unwrap();
        store.save_user(&mut user).await.unwrap();
        assert_eq!(store.groups_named(&user.groups).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_group_rename_follows_members() {
        let store = InMemoryStore::new();
        let mut group = Group::new("editors");
        store.save_group(&mut group).await.unwrap();
        let mut user = User {
            groups: vec!["editors".into()],
            ..User::new("test@example.com")
        };
        store.save_user(&mut user).await.unwrap();

        group.name = "writers".into();
        store.save_group(&mut group).await.unwrap();
        let loaded = store.get_user_by_email("test@example.com").await.unwrap().unwrap();
        assert_eq!(loaded.groups, vec!["writers".to_string()]);
        assert!(store.get_group_by_name("editors").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_group_name() {
        let store = InMemoryStore::new();
        store.save_group(&mut Group::new("editors")).await.unwrap();
        assert!(store.save_group(&mut Group::new("editors")).await.is_err());
        assert_eq!(store.list_groups().await.unwrap().len(), 1);
    }
}
