use std::{collections::HashSet, sync::Arc};

use reqwest::Url;
use serde::Serialize;
use uuid::Uuid;

use crate::api::AnalysisApi;
use crate::auth::AuthClient;
use crate::cancel::{guarded, CancelSignal, RequestSlot};
use crate::error::ServiceError;
use crate::models::ReverseSearchTask;
use crate::poller::TaskPoller;
use crate::transport::FilePart;

// One visual match, normalised across engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageHit {
    pub id: Uuid,
    pub title: String,
    pub source: String,
    pub thumbnail_url: Option<String>,
    pub link_url: Option<String>,
}

impl ImageHit {
    fn new(title: &str, source: &str, thumbnail: Option<&str>, link: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            source: source.to_string(),
            thumbnail_url: thumbnail.and_then(parse_url),
            link_url: parse_url(link),
        }
    }

    fn dedupe_key(&self) -> String {
        match &self.link_url {
            Some(link) => link.clone(),
            None => format!("{}|{}", self.title, self.source),
        }
    }
}

fn parse_url(raw: &str) -> Option<String> {
    Url::parse(raw.trim()).ok().map(String::from)
}

pub struct SearchService {
    auth: Arc<AuthClient>,
    api: Arc<dyn AnalysisApi>,
    poller: TaskPoller,
    apphud_id: String,
    slot: RequestSlot,
}

impl SearchService {
    pub fn new(
        auth: Arc<AuthClient>,
        api: Arc<dyn AnalysisApi>,
        poller: TaskPoller,
        apphud_id: String,
    ) -> Self {
        Self {
            auth,
            api,
            poller,
            apphud_id,
            slot: RequestSlot::new(),
        }
    }

    pub fn cancel_current(&self) {
        self.slot.cancel_current();
    }

    pub async fn search_by_image(&self, jpeg: Vec<u8>) -> Result<Vec<ImageHit>, ServiceError> {
        let cancel = self.slot.begin();
        let outcome = self.run(jpeg, &cancel).await;
        self.slot.finish(&cancel);

        let snapshot = outcome?;
        let hits = flatten_hits(&snapshot);
        tracing::info!(hits = hits.len(), "reverse search mapped");
        Ok(hits)
    }

    async fn run(
        &self,
        jpeg: Vec<u8>,
        cancel: &CancelSignal,
    ) -> Result<ReverseSearchTask, ServiceError> {
        guarded(cancel, self.auth.ensure_authorized(&self.apphud_id)).await?;
        guarded(cancel, self.auth.me()).await?;
        let image = FilePart::jpeg("image", jpeg);
        let task_id = guarded(cancel, self.api.create_reverse_search(image)).await?;

        // Engines need a while before the first poll is worth making.
        let warmup = self.poller.config().reverse_min_interval;
        Ok(self
            .poller
            .wait_for_reverse_search_result(task_id, warmup, cancel)
            .await?)
    }
}

// First hit per link wins, or per `title|source` when the link is not a valid URL.
pub fn flatten_hits(snapshot: &ReverseSearchTask) -> Vec<ImageHit> {
    let results = &snapshot.results;
    let google = results
        .google_matches()
        .iter()
        .map(|m| ImageHit::new(&m.title, &m.source, m.thumbnail.as_deref(), &m.link));
    let yandex = results.yandex_matches().iter().map(|m| {
        let thumbnail = m.thumbnail.as_ref().and_then(|t| t.link.as_deref());
        ImageHit::new(&m.title, &m.source, thumbnail, &m.link)
    });
    let bing = results.bing_matches().iter().map(|m| {
        let source = m.source.as_deref().unwrap_or("bing");
        ImageHit::new(&m.title, source, m.thumbnail.as_deref(), &m.link)
    });

    let mut seen = HashSet::new();
    google
        .chain(yandex)
        .chain(bing)
        .filter(|hit| seen.insert(hit.dedupe_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStorage;
    use crate::error::ApiError;
    use crate::models::AnalysisTask;
    use crate::poller::{PollerConfig, TaskPoller};
    use crate::stores::TokensStore;
    use crate::transport::HttpClient;
    use async_trait::async_trait;
    use std::time::Duration;

    struct UnreachableApi;

    #[async_trait]
    impl AnalysisApi for UnreachableApi {
        async fn create_analysis_task(
            &self,
            _files: Vec<FilePart>,
            _conversation: Option<&str>,
        ) -> Result<AnalysisTask, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }

        async fn create_place_task(
            &self,
            _file: FilePart,
            _conversation: Option<&str>,
        ) -> Result<AnalysisTask, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }

        async fn get_analysis_task(&self, _id: Uuid) -> Result<AnalysisTask, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }

        async fn create_reverse_search(&self, _image: FilePart) -> Result<Uuid, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }

        async fn get_reverse_search(&self, _id: Uuid) -> Result<ReverseSearchTask, ApiError> {
            Err(ApiError::InvalidRequest("not scripted".into()))
        }
    }

    #[tokio::test]
    async fn cancel_current_unwinds_hung_profile_refresh() {
        // Accepts connections through the backlog but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();

        let tokens = Arc::new(TokenStorage::default());
        tokens.set_access_token(Some("preauthorized".into()));
        let auth = Arc::new(AuthClient::new(
            HttpClient::new(Duration::from_secs(1)).unwrap(),
            base,
            tokens,
            Arc::new(TokensStore::default()),
        ));
        let api: Arc<dyn AnalysisApi> = Arc::new(UnreachableApi);
        let poller = TaskPoller::new(api.clone(), PollerConfig::default());
        let service = Arc::new(SearchService::new(auth, api, poller, "debug-test".into()));

        let running = {
            let service = service.clone();
            tokio::spawn(async move { service.search_by_image(vec![0xff, 0xd8]).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        service.cancel_current();

        let outcome = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("search kept waiting on the profile request")
            .unwrap();
        assert!(outcome.unwrap_err().is_cancelled());
        drop(listener);
    }

    fn snapshot(json: &str) -> ReverseSearchTask {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn hits_follow_engine_order_and_dedupe_by_link() {
        let snapshot = snapshot(
            r#"{
                "status":{"google":"completed","yandex":"completed","bing":"completed"},
                "results":{
                    "google":{"visual_matches":[
                        {"position":1,"title":"Profile","link":"https://social.example/u/anna","source":"social.example","thumbnail":"https://cdn.example/a.jpg"}
                    ]},
                    "yandex":{"image_results":[
                        {"title":"Same profile","link":"https://social.example/u/anna","source":"yandex"},
                        {"title":"Blog","link":"https://blog.example/post","source":"blog.example","thumbnail":{"link":"https://cdn.example/b.jpg"}}
                    ]},
                    "bing":{"related_content":[
                        {"title":"Stock","link":"https://stock.example/1"}
                    ]}
                }
            }"#,
        );

        let hits = flatten_hits(&snapshot);
        let titles: Vec<&str> = hits.iter().map(|hit| hit.title.as_str()).collect();
        assert_eq!(titles, vec!["Profile", "Blog", "Stock"]);
        assert_eq!(hits[0].thumbnail_url.as_deref(), Some("https://cdn.example/a.jpg"));
        assert_eq!(hits[1].thumbnail_url.as_deref(), Some("https://cdn.example/b.jpg"));
        assert_eq!(hits[2].source, "bing");
        assert!(hits[2].thumbnail_url.is_none());
    }

    #[test]
    fn unparsable_links_dedupe_by_title_and_source() {
        let snapshot = snapshot(
            r#"{
                "status":{"google":"running","yandex":"running","bing":"running"},
                "results":{
                    "google":{"visual_matches":[
                        {"title":"A","link":"not a url","source":"x"},
                        {"title":"A","link":"also not a url","source":"x"},
                        {"title":"A","link":"","source":"y"}
                    ]}
                }
            }"#,
        );

        let hits = flatten_hits(&snapshot);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.link_url.is_none()));
        assert_eq!(hits[1].source, "y");
    }

    #[test]
    fn empty_snapshot_has_no_hits() {
        let snapshot = snapshot(
            r#"{"status":{"google":"completed","yandex":"completed","bing":"completed"}}"#,
        );
        assert!(flatten_hits(&snapshot).is_empty());
    }
}
