use std::sync::Arc;

use crate::analysis::AnalysisService;
use crate::api::{AnalysisApi, ApiClient};
use crate::auth::{AuthClient, TokenStorage};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::poller::TaskPoller;
use crate::search::SearchService;
use crate::stores::{PremiumStore, TokensStore};
use crate::transport::HttpClient;

#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<ClientConfig>,
    pub auth: Arc<AuthClient>,
    pub api: Arc<dyn AnalysisApi>,
    pub poller: TaskPoller,
    pub analysis: Arc<AnalysisService>,
    pub search: Arc<SearchService>,
    pub premium: Arc<PremiumStore>,
    pub tokens: Arc<TokensStore>,
}

impl AppServices {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let http = HttpClient::new(config.connect_timeout)?;
        let token_storage = Arc::new(TokenStorage::default());
        let tokens = Arc::new(TokensStore::default());
        let premium = Arc::new(PremiumStore::new(config.premium));

        let api: Arc<dyn AnalysisApi> = Arc::new(ApiClient::new(
            http.clone(),
            config.api_url.clone(),
            config.bundle_id.clone(),
            token_storage.clone(),
        ));
        let auth = Arc::new(AuthClient::new(
            http,
            config.api_url.clone(),
            token_storage,
            tokens.clone(),
        ));
        let poller = TaskPoller::new(api.clone(), config.poller);

        let analysis = Arc::new(AnalysisService::new(
            auth.clone(),
            api.clone(),
            poller.clone(),
            config.apphud_id.clone(),
        ));
        let search = Arc::new(SearchService::new(
            auth.clone(),
            api.clone(),
            poller.clone(),
            config.apphud_id.clone(),
        ));

        tracing::info!(api_url = %config.api_url, bundle_id = %config.bundle_id, "services ready");
        Ok(Self {
            config: Arc::new(config),
            auth,
            api,
            poller,
            analysis,
            search,
            premium,
            tokens,
        })
    }

    pub fn cancel_all(&self) {
        self.analysis.cancel_current();
        self.search.cancel_current();
    }
}
