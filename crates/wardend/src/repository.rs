//! Boundaries to externally owned data: server records, moderator display
//! names, and chat visibility.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use warden_core::{Server, ServerId, UserId};

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store could not be reached
    #[error("server repository unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the fleet's server records.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    /// Returns the record for `id`, or `None` if it no longer exists.
    async fn get_by_id(&self, id: ServerId) -> Result<Option<Server>, RepositoryError>;

    /// Returns every server record.
    async fn list(&self) -> Result<Vec<Server>, RepositoryError>;
}

/// In-memory repository, typically built from the config file.
#[derive(Debug, Default)]
pub struct StaticServerRepository {
    servers: RwLock<BTreeMap<ServerId, Server>>,
}

impl StaticServerRepository {
    pub fn new(servers: impl IntoIterator<Item = Server>) -> Self {
        Self {
            servers: RwLock::new(servers.into_iter().map(|s| (s.id, s)).collect()),
        }
    }

    /// Inserts or replaces a record.
    pub fn upsert(&self, server: Server) -> Option<Server> {
        self.servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server.id, server)
    }

    pub fn remove(&self, id: ServerId) -> Option<Server> {
        self.servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

#[async_trait]
impl ServerRepository for StaticServerRepository {
    async fn get_by_id(&self, id: ServerId) -> Result<Option<Server>, RepositoryError> {
        Ok(self
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Server>, RepositoryError> {
        Ok(self
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }
}

/// Resolves moderator display names.
pub trait UserDirectory: Send + Sync {
    fn display_name(&self, user: &UserId) -> Option<String>;
}

/// Fixed user id -> display name table.
#[derive(Debug, Default, Clone)]
pub struct StaticUserDirectory {
    names: HashMap<UserId, String>,
}

impl StaticUserDirectory {
    pub fn new(names: impl IntoIterator<Item = (UserId, String)>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }
}

impl UserDirectory for StaticUserDirectory {
    fn display_name(&self, user: &UserId) -> Option<String> {
        self.names.get(user).cloned()
    }
}

/// Decides which moderators may see a server's chat.
pub trait AccessPolicy: Send + Sync {
    fn can_view_chat(&self, user: &UserId, server: ServerId) -> bool;
}

/// Every authenticated moderator sees every server.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_view_chat(&self, _user: &UserId, _server: ServerId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_repository_lookup() {
        let repo = StaticServerRepository::new(vec![
            Server::new(1, "a:1", "pw", "mordhau"),
            Server::new(2, "b:2", "pw", "mordhau"),
        ]);

        assert_eq!(repo.list().await.unwrap().len(), 2);
        assert_eq!(
            repo.get_by_id(ServerId::new(2)).await.unwrap().map(|s| s.address),
            Some("b:2".to_string())
        );

        repo.remove(ServerId::new(2));
        assert!(repo.get_by_id(ServerId::new(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_record() {
        let repo = StaticServerRepository::default();
        assert!(repo.upsert(Server::new(1, "old:1", "", "mordhau")).is_none());
        assert!(repo.upsert(Server::new(1, "new:1", "", "mordhau")).is_some());

        let server = repo.get_by_id(ServerId::new(1)).await.unwrap().unwrap();
        assert_eq!(server.address, "new:1");
    }

    #[test]
    fn test_user_directory() {
        let users = StaticUserDirectory::new(vec![(UserId::new("u1"), "Alice".to_string())]);
        assert_eq!(users.display_name(&UserId::new("u1")).as_deref(), Some("Alice"));
        assert!(users.display_name(&UserId::new("u2")).is_none());
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.can_view_chat(&UserId::new("anyone"), ServerId::new(7)));
    }
}
