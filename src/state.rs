use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::{
        oauth::{GoogleProvider, IdentityProvider},
        services::CredentialVerifier,
        session::{MemorySessionStore, PgSessionStore, SessionManager, SessionStore},
    },
    config::AppConfig,
    db,
    users::{MemoryUserStore, PgUserStore, UserStore},
};

/// Everything a handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub verifier: CredentialVerifier,
    pub sessions: SessionManager,
    pub google: Option<Arc<dyn IdentityProvider>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (users, sessions): (Arc<dyn UserStore>, Arc<dyn SessionStore>) =
            match &config.database_url {
                Some(url) => {
                    let db = db::connect(url).await?;
                    db::migrate(&db).await?;
                    (
                        Arc::new(PgUserStore::new(db.clone())),
                        Arc::new(PgSessionStore::new(db)),
                    )
                }
                None => {
                    warn!("DATABASE_URL not set; using the in-memory store, data is lost on restart");
                    (
                        Arc::new(MemoryUserStore::new()),
                        Arc::new(MemorySessionStore::new()),
                    )
                }
            };

        let google = match &config.google {
            Some(cfg) => Some(Arc::new(GoogleProvider::new(cfg)?) as Arc<dyn IdentityProvider>),
            None => {
                info!("Google login disabled: CLIENT_ID / CLIENT_SECRET not set");
                None
            }
        };

        Ok(Self::from_parts(config, users, sessions, google))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        google: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            verifier: CredentialVerifier::new(users.clone()),
            sessions: SessionManager::new(sessions, config.session.clone()),
            users,
            google,
            config,
        }
    }
}
