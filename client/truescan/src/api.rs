use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, RequestBuilder, Url};
use uuid::Uuid;

use crate::auth::TokenStorage;
use crate::error::ApiError;
use crate::models::{AnalysisTask, ReverseSearchCreated, ReverseSearchTask};
use crate::transport::{multipart_form, FilePart, HttpClient};

#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn create_analysis_task(
        &self,
        files: Vec<FilePart>,
        conversation: Option<&str>,
    ) -> Result<AnalysisTask, ApiError>;

    async fn create_place_task(
        &self,
        file: FilePart,
        conversation: Option<&str>,
    ) -> Result<AnalysisTask, ApiError>;

    async fn get_analysis_task(&self, id: Uuid) -> Result<AnalysisTask, ApiError>;

    async fn create_reverse_search(&self, image: FilePart) -> Result<Uuid, ApiError>;

    async fn get_reverse_search(&self, id: Uuid) -> Result<ReverseSearchTask, ApiError>;
}

pub struct ApiClient {
    http: HttpClient,
    base_url: Url,
    bundle_id: String,
    tokens: Arc<TokenStorage>,
}

impl ApiClient {
    pub fn new(
        http: HttpClient,
        base_url: Url,
        bundle_id: String,
        tokens: Arc<TokenStorage>,
    ) -> Self {
        Self {
            http,
            base_url,
            bundle_id,
            tokens,
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        authorize(request, &self.tokens)
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        endpoint(&self.base_url, path)
    }
}

#[async_trait]
impl AnalysisApi for ApiClient {
    async fn create_analysis_task(
        &self,
        files: Vec<FilePart>,
        conversation: Option<&str>,
    ) -> Result<AnalysisTask, ApiError> {
        if files.is_empty() && conversation.is_none() {
            return Err(ApiError::InvalidRequest(
                "analysis needs files or conversation text".to_string(),
            ));
        }
        let files = files.into_iter().map(|file| file.renamed("files")).collect();
        let form = multipart_form(
            &[
                ("conversation", conversation),
                ("app_bundle", Some(self.bundle_id.as_str())),
            ],
            files,
        )?;
        let request = self.authed(self.http.post(self.url("api/task")?)).multipart(form);
        let task: AnalysisTask = self.http.send(request).await?;
        tracing::info!(task_id = %task.id, status = task.status.as_str(), "analysis task created");
        Ok(task)
    }

    async fn create_place_task(
        &self,
        file: FilePart,
        conversation: Option<&str>,
    ) -> Result<AnalysisTask, ApiError> {
        let form = multipart_form(
            &[
                ("conversation", conversation),
                ("app_bundle", Some(self.bundle_id.as_str())),
            ],
            vec![file.renamed("file")],
        )?;
        let request = self
            .authed(self.http.post(self.url("api/task/place")?))
            .multipart(form);
        let task: AnalysisTask = self.http.send(request).await?;
        tracing::info!(task_id = %task.id, status = task.status.as_str(), "place task created");
        Ok(task)
    }

    async fn get_analysis_task(&self, id: Uuid) -> Result<AnalysisTask, ApiError> {
        // Hyphenated uuids are rendered lowercase, which the server expects.
        let url = self.url(&format!("api/task/{}", id.hyphenated()))?;
        self.http.send(self.authed(self.http.get(url))).await
    }

    async fn create_reverse_search(&self, image: FilePart) -> Result<Uuid, ApiError> {
        let form = multipart_form(&[], vec![image.renamed("image")])?;
        let request = self
            .authed(self.http.post(self.url("api/search")?))
            .multipart(form);
        let created: ReverseSearchCreated = self.http.send(request).await?;
        tracing::info!(task_id = %created.task_id, "reverse search created");
        Ok(created.task_id)
    }

    async fn get_reverse_search(&self, id: Uuid) -> Result<ReverseSearchTask, ApiError> {
        let url = self.url(&format!("api/search/{}", id.hyphenated()))?;
        self.http.send(self.authed(self.http.get(url))).await
    }
}

pub(crate) fn authorize(request: RequestBuilder, tokens: &TokenStorage) -> RequestBuilder {
    match tokens.access_token() {
        Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
        None => request,
    }
}

// Joins `path` onto the base url, keeping any base path prefix.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, ApiError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|err| ApiError::InvalidRequest(format!("bad endpoint {path}: {err}")))
}
