use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct UserCreate {
    pub apphud_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRead {
    pub id: Uuid,
    pub apphud_id: String,
    pub tokens: i64,
}

#[derive(Deserialize)]
pub struct AuthorizeRequest {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub risk_score: u8,
    pub red_flags: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Report(RiskReport),
    Text(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRead {
    pub id: Uuid,
    pub status: &'static str,
    pub result: Option<TaskOutput>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct SearchCreated {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub google: &'static str,
    pub yandex: &'static str,
    pub bing: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleMatch {
    pub position: u32,
    pub title: String,
    pub link: String,
    pub source: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct YandexThumbnail {
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct YandexMatch {
    pub title: String,
    pub link: String,
    pub source: String,
    pub thumbnail: YandexThumbnail,
}

#[derive(Debug, Clone, Serialize)]
pub struct BingMatch {
    pub position: u32,
    pub title: String,
    pub link: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleSection {
    pub visual_matches: Vec<GoogleMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YandexSection {
    pub image_results: Vec<YandexMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BingSection {
    pub related_content: Vec<BingMatch>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yandex: Option<YandexSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bing: Option<BingSection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRead {
    pub status: EngineStatus,
    pub results: SearchResults,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
