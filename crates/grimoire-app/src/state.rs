use std::sync::Arc;

use grimoire_auth::TokenManager;
use grimoire_dal::Pool;
use grimoire_store::file_store::FileStore;
use url::Url;

#[derive(Clone)]
pub struct AppState {
    state: Arc<AppStateInner>,
}

impl AppState {
    pub fn new(app_config: AppConfig, pool: Pool, store: FileStore, tokens: TokenManager) -> Self {
        AppState {
            state: Arc::new(AppStateInner {
                app_config,
                pool,
                store,
                tokens,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.app_config
    }

    pub fn pool(&self) -> &Pool {
        &self.state.pool
    }

    pub fn store(&self) -> &FileStore {
        &self.state.store
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.state.tokens
    }
}

struct AppStateInner {
    pool: Pool,
    store: FileStore,
    tokens: TokenManager,
    app_config: AppConfig,
}

pub struct AppConfig {
    pub base_url: Url,
    pub top_rated_limit: u32,
    pub upload_limit_mb: usize,
}
