//! Named-terminal directory (§3, §4.1): one `TerminalSession` per name, created
//! lazily on first use and kept for the life of the process.
//!
//! `get_or_create` uses double-checked insertion: the map lock is held only
//! long enough to insert (or fetch) a placeholder `OnceCell` for the name, so
//! spawning the pty and awaiting the first prompt for one name never blocks a
//! concurrent `get_or_create` of a different name.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::error::HostResult;
use crate::terminal::session::TerminalSession;

pub struct TerminalRegistry {
    workdir: PathBuf,
    sessions: Mutex<HashMap<String, Arc<OnceCell<Arc<TerminalSession>>>>>,
}

impl TerminalRegistry {
    pub fn new(workdir: PathBuf) -> Self {
        Self {
            workdir,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the named session, spawning a fresh shell the first time this
    /// name is seen. Distinct names never block each other; concurrent calls
    /// for the *same* name that race share a single in-flight creation.
    pub async fn get_or_create(&self, name: &str) -> HostResult<Arc<TerminalSession>> {
        let cell = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let workdir = self.workdir.clone();
        let owned_name = name.to_string();
        let session = cell
            .get_or_try_init(|| async move {
                TerminalSession::new(owned_name, workdir).await.map(Arc::new)
            })
            .await?;
        Ok(session.clone())
    }

    /// `reset_all`: tear down and forget every known terminal; the next
    /// `get_or_create` respawns from scratch.
    pub async fn reset_all(&self) -> HostResult<()> {
        let cells: Vec<_> = {
            let sessions = self.sessions.lock().await;
            sessions.values().cloned().collect()
        };
        for cell in &cells {
            if let Some(session) = cell.get() {
                session.reset().await?;
            }
        }
        self.sessions.lock().await.clear();
        Ok(())
    }

    pub async fn remove(&self, name: &str) {
        self.sessions.lock().await.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_session_for_same_name() {
        let registry = TerminalRegistry::new(std::env::temp_dir());
        let a = registry.get_or_create("main").await.unwrap();
        let b = registry.get_or_create("main").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_creation_of_distinct_names_does_not_deadlock() {
        let registry = Arc::new(TerminalRegistry::new(std::env::temp_dir()));
        let r1 = registry.clone();
        let r2 = registry.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { r1.get_or_create("a").await }),
            tokio::spawn(async move { r2.get_or_create("b").await }),
        );
        assert!(a.unwrap().is_ok());
        assert!(b.unwrap().is_ok());
    }
}
