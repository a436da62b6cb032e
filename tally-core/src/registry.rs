use crate::{Connection, ConnectionConfig, Database, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Named databases owned by the caller.
pub struct Registry<C: Connection> {
    databases: RwLock<HashMap<String, Database<C>>>,
}

impl<C: Connection> Default for Registry<C> {
    fn default() -> Self {
        Self {
            databases: Default::default(),
        }
    }
}

impl<C: Connection> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new database, or return the existing one with the same name (the config
    /// is ignored in that case).
    ///
    /// Connecting happens without holding the registry lock. When two calls race on the same
    /// name the first one registered wins and the other connection is closed.
    pub async fn create_connection(&self, config: ConnectionConfig, name: &str) -> Result<Database<C>> {
        if let Some(database) = self.get_connection(name).await {
            return Ok(database);
        }
        let database = Database::connect(config, name).await?;
        let existing = {
            let mut databases = self.databases.write().await;
            match databases.get(name) {
                Some(existing) => Some(existing.clone()),
                None => {
                    databases.insert(name.to_string(), database.clone());
                    None
                }
            }
        };
        let Some(existing) = existing else {
            return Ok(database);
        };
        log::debug!("[{}] - Already registered, closing the new connection", name);
        if let Err(e) = database.close().await {
            log::warn!("[{}] - Could not release the duplicate connection: {:#}", name, e);
        }
        Ok(existing)
    }

    pub async fn get_connection(&self, name: &str) -> Option<Database<C>> {
        self.databases.read().await.get(name).cloned()
    }

    /// Forget the database and release its connection, unknown names are ignored.
    pub async fn close_connection(&self, name: &str) -> Result<()> {
        let Some(database) = self.databases.write().await.remove(name) else {
            return Ok(());
        };
        database.close().await
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
