//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! The store, caller resolution and all services are built here and made
//! available to handlers through AppState.

use crate::config::{ServerConfig, StorageBackend};
use crate::database::{
    create_pool, CreateUserRequest, DocumentStore, MemoryStore, Repository, ResilientStore,
    RetryPolicy, Role, SqliteStore, User,
};
use crate::error::Result;
use crate::services::{
    CallerResolver, HeaderCallerResolver, Services, SessionSigner, SessionTokenResolver,
};
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub repo: Repository,
    pub callers: Arc<dyn CallerResolver>,
    /// Present when signed session tokens are enabled
    pub signer: Option<Arc<SessionSigner>>,
    pub services: Services,
}

impl AppState {
    /// Assemble state over an already built store
    pub fn new(config: ServerConfig, store: Arc<dyn DocumentStore>) -> Self {
        let repo = Repository::new(store);

        let signer = config
            .session_secret
            .as_deref()
            .map(|secret| Arc::new(SessionSigner::new(secret, config.session_ttl)));

        let callers: Arc<dyn CallerResolver> = match &signer {
            Some(signer) => {
                tracing::info!("Session token authentication enabled");
                Arc::new(SessionTokenResolver::new(repo.clone(), signer.clone()))
            }
            None => {
                tracing::warn!("No SESSION_SECRET set, trusting the x-user-id header");
                Arc::new(HeaderCallerResolver::new(repo.clone()))
            }
        };

        Self {
            config: Arc::new(config),
            services: Services::new(repo.clone()),
            repo,
            callers,
            signer,
        }
    }
}

async fn open_store(storage: &StorageBackend) -> Result<Arc<dyn DocumentStore>> {
    let inner: Arc<dyn DocumentStore> = match storage {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory document store");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Sqlite(path) => {
            let pool = create_pool(path).await?;
            Arc::new(SqliteStore::new(pool))
        }
    };

    Ok(Arc::new(ResilientStore::new(inner, RetryPolicy::default())))
}

/// Application setup - called once on startup
pub async fn setup(config: ServerConfig) -> Result<AppState> {
    tracing::info!("Initializing application");

    let store = open_store(&config.storage).await?;
    let state = AppState::new(config, store);

    let admin = seed_admin(&state).await?;

    // Token auth has no login flow; hand the operator a first admin session
    if let (Some(signer), Some(admin)) = (&state.signer, &admin) {
        let token = signer.sign(&admin.id, chrono::Utc::now())?;
        tracing::info!("Bootstrap admin session token: {}", token);
    }

    tracing::info!("Application initialized successfully");

    Ok(state)
}

/// Create the configured bootstrap admin unless the email is already taken
async fn seed_admin(state: &AppState) -> Result<Option<User>> {
    let Some(admin) = state.config.bootstrap_admin.as_ref() else {
        return Ok(None);
    };

    if let Some(existing) = state.repo.find_user_by_email(&admin.email).await? {
        tracing::debug!("Bootstrap admin already present: {}", existing.id);
        return Ok(Some(existing));
    }

    let user = state
        .repo
        .create_user(CreateUserRequest {
            email: admin.email.clone(),
            name: admin.name.clone(),
            role: Some(Role::Admin),
        })
        .await?;
    tracing::info!("Seeded bootstrap admin {} ({})", user.email, user.id);

    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapAdmin;
    use tempfile::TempDir;

    fn with_admin(storage: StorageBackend) -> ServerConfig {
        ServerConfig {
            storage,
            bootstrap_admin: Some(BootstrapAdmin {
                email: "root@school.test".to_string(),
                name: "Root".to_string(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_setup_seeds_admin_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.db");

        let state = setup(with_admin(StorageBackend::Sqlite(path.clone())))
            .await
            .unwrap();
        let users = state.repo.list::<User>().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, Role::Admin);

        // Restarting against the same file must not duplicate the admin
        let state = setup(with_admin(StorageBackend::Sqlite(path))).await.unwrap();
        assert_eq!(state.repo.list::<User>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_signer_follows_secret() {
        let state = setup(ServerConfig::default()).await.unwrap();
        assert!(state.signer.is_none());

        let state = setup(ServerConfig {
            session_secret: Some("0123456789abcdef0123".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(state.signer.is_some());
    }
}
