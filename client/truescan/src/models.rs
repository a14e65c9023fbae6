use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Started,
    Finished,
    Failed,
    // Any status string this client does not know yet.
    #[serde(other)]
    Other,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    // Position in the server lifecycle; a later fetch never ranks lower.
    pub fn progress_rank(self) -> u8 {
        match self {
            TaskStatus::Queued => 0,
            TaskStatus::Started | TaskStatus::Other => 1,
            TaskStatus::Finished | TaskStatus::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Started => "started",
            TaskStatus::Finished => "finished",
            TaskStatus::Failed => "failed",
            TaskStatus::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub risk_score: u8,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    Details(AnalysisReport),
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: Uuid,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseSearchCreated {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatuses {
    pub google: String,
    pub yandex: String,
    pub bing: String,
}

impl EngineStatuses {
    pub fn all_completed(&self) -> bool {
        [&self.google, &self.yandex, &self.bing]
            .iter()
            .all(|status| status.eq_ignore_ascii_case("completed"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleVisualMatch {
    #[serde(default)]
    pub position: Option<u32>,
    pub title: String,
    pub link: String,
    pub source: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleResults {
    #[serde(default)]
    pub visual_matches: Option<Vec<GoogleVisualMatch>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YandexThumbnail {
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YandexImageResult {
    pub title: String,
    pub link: String,
    pub source: String,
    #[serde(default)]
    pub thumbnail: Option<YandexThumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YandexResults {
    #[serde(default)]
    pub image_results: Option<Vec<YandexImageResult>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BingRelatedContent {
    #[serde(default)]
    pub position: Option<u32>,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BingResults {
    #[serde(default)]
    pub related_content: Option<Vec<BingRelatedContent>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineResults {
    #[serde(default)]
    pub google: Option<GoogleResults>,
    #[serde(default)]
    pub yandex: Option<YandexResults>,
    #[serde(default)]
    pub bing: Option<BingResults>,
}

impl EngineResults {
    pub fn google_matches(&self) -> &[GoogleVisualMatch] {
        self.google
            .as_ref()
            .and_then(|google| google.visual_matches.as_deref())
            .unwrap_or_default()
    }

    pub fn yandex_matches(&self) -> &[YandexImageResult] {
        self.yandex
            .as_ref()
            .and_then(|yandex| yandex.image_results.as_deref())
            .unwrap_or_default()
    }

    pub fn bing_matches(&self) -> &[BingRelatedContent] {
        self.bing
            .as_ref()
            .and_then(|bing| bing.related_content.as_deref())
            .unwrap_or_default()
    }

    pub fn match_counts(&self) -> [usize; 3] {
        [
            self.google_matches().len(),
            self.yandex_matches().len(),
            self.bing_matches().len(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseSearchTask {
    pub status: EngineStatuses,
    #[serde(default)]
    pub results: EngineResults,
}

impl ReverseSearchTask {
    pub fn all_engines_completed(&self) -> bool {
        self.status.all_completed()
    }

    pub fn has_any_visuals(&self) -> bool {
        self.results.match_counts().iter().any(|count| *count > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRead {
    pub id: Uuid,
    pub apphud_id: String,
    pub tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateUser<'a> {
    pub apphud_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeUser {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}
