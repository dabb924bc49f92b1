use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::app::error::{GemtrailError, Result};
use crate::config::{Config, SettingsProvider};
use crate::fetcher::{GeminiClient, ProtocolClient, RedirectPolicy};
use crate::navigator::{Navigator, Prompter};
use crate::renderer::{ImagePipeline, Renderer};
use crate::store::{CacheStore, SqliteStore};

pub struct AppContext {
    pub config: Arc<Config>,
    pub cache: Arc<CacheStore>,
    pub store: Arc<SqliteStore>,
    pub navigator: Navigator,
}

impl AppContext {
    pub async fn new(config: Config, prompter: Arc<dyn Prompter + Send + Sync>) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(Self::default_db_path()?)?);
        let download_dir = match dirs::download_dir() {
            Some(dir) => dir,
            None => Self::data_dir()?.join("downloads"),
        };
        Self::with_store(config, prompter, store, download_dir).await
    }

    /// Wire everything around an already opened history store.
    pub async fn with_store(
        config: Config,
        prompter: Arc<dyn Prompter + Send + Sync>,
        store: Arc<SqliteStore>,
        download_dir: PathBuf,
    ) -> Result<Self> {
        let cache_dir = config
            .cache_dir()
            .map_err(|e| GemtrailError::Config(e.to_string()))?;
        let cache = Arc::new(CacheStore::new(cache_dir));
        cache.ensure_version(env!("CARGO_PKG_VERSION")).await?;

        let base = GeminiClient::with_deferred_trust()?
            .timeout(config.network.timeout())
            .allow_ipv6(config.network.allow_ipv6);
        let page_client: Arc<dyn ProtocolClient + Send + Sync> =
            Arc::new(base.clone().redirect_policy(config.network.redirects));
        let image_client: Arc<dyn ProtocolClient + Send + Sync> =
            Arc::new(base.redirect_policy(RedirectPolicy::Never));

        let config = Arc::new(config);
        let settings: Arc<dyn SettingsProvider + Send + Sync> = config.clone();

        let images = ImagePipeline::new(image_client, cache.clone(), &config.images);
        let renderer = Renderer::new(cache.clone(), images, settings.clone());
        let navigator = Navigator::new(
            page_client,
            cache.clone(),
            renderer,
            settings,
            prompter,
            download_dir,
        )
        .with_history(store.clone());

        info!("Cache at {}", cache.root().display());

        Ok(Self {
            config,
            cache,
            store,
            navigator,
        })
    }

    fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| GemtrailError::Config("Could not find data directory".into()))?;
        let gemtrail_dir = data_dir.join("gemtrail");
        std::fs::create_dir_all(&gemtrail_dir)?;
        Ok(gemtrail_dir)
    }

    fn default_db_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("history.db"))
    }
}
