use axum::http::StatusCode;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{
    BingMatch, BingSection, EngineStatus, ErrorResponse, GoogleMatch, GoogleSection, RiskReport,
    SearchCreated, SearchRead, SearchResults, TaskOutput, TaskRead, TokenResponse, UserCreate,
    UserRead, YandexMatch, YandexSection, YandexThumbnail,
};
use crate::state::{AnalysisJob, AppState, JobKind, Scenario, SearchJob, Store, Upload};

const RED_FLAGS: &[(&str, &str)] = &[
    ("money", "Asks for money"),
    ("gift card", "Requests gift cards"),
    ("crypto", "Pushes cryptocurrency payments"),
    ("urgent", "Creates artificial urgency"),
    ("bank", "Asks about bank details"),
    ("password", "Asks for passwords or codes"),
    ("investment", "Promises investment returns"),
];

const PLACES: &[&str] = &[
    "Old Town, Tallinn, Estonia",
    "Alfama, Lisbon, Portugal",
    "Shibuya Crossing, Tokyo, Japan",
    "Charles Bridge, Prague, Czechia",
    "Bondi Beach, Sydney, Australia",
    "Gamla Stan, Stockholm, Sweden",
];

pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message: message.into(),
            },
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "missing or unknown bearer token")
    }

    fn not_found(what: &str, id: Uuid) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} {id} not found"))
    }

    fn unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "worker pool is warming up",
        )
    }
}

fn require_user(store: &Store, bearer: Option<&str>) -> Result<Uuid, ServiceError> {
    bearer
        .and_then(|token| store.tokens.get(token).copied())
        .filter(|user_id| store.users.contains_key(user_id))
        .ok_or_else(ServiceError::unauthorized)
}

pub async fn register_user(state: &AppState, payload: UserCreate) -> Result<UserRead, ServiceError> {
    let apphud_id = payload.apphud_id.trim();
    if apphud_id.is_empty() {
        return Err(ServiceError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_apphud_id",
            "apphud_id must not be empty",
        ));
    }

    let mut store = state.store.lock().await;
    if let Some(existing) = store.users.values().find(|user| user.apphud_id == apphud_id) {
        return Ok(existing.clone());
    }
    let user = UserRead {
        id: Uuid::new_v4(),
        apphud_id: apphud_id.to_string(),
        tokens: state.scenario.initial_tokens,
    };
    store.users.insert(user.id, user.clone());
    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub async fn authorize_user(state: &AppState, user_id: Uuid) -> Result<TokenResponse, ServiceError> {
    let mut store = state.store.lock().await;
    if !store.users.contains_key(&user_id) {
        return Err(ServiceError::not_found("user", user_id));
    }
    let access_token = Uuid::new_v4().simple().to_string();
    store.tokens.insert(access_token.clone(), user_id);
    Ok(TokenResponse {
        access_token,
        token_type: "bearer",
    })
}

pub async fn current_user(state: &AppState, bearer: Option<&str>) -> Result<UserRead, ServiceError> {
    let store = state.store.lock().await;
    let user_id = require_user(&store, bearer)?;
    store
        .users
        .get(&user_id)
        .cloned()
        .ok_or_else(ServiceError::unauthorized)
}

pub async fn create_analysis(
    state: &AppState,
    bearer: Option<&str>,
    kind: JobKind,
    upload: Upload,
) -> Result<TaskRead, ServiceError> {
    validate_upload(kind, &upload)?;

    let mut store = state.store.lock().await;
    let user_id = require_user(&store, bearer)?;
    let user = store
        .users
        .get_mut(&user_id)
        .ok_or_else(ServiceError::unauthorized)?;
    if user.tokens <= 0 {
        return Err(ServiceError::new(
            StatusCode::PAYMENT_REQUIRED,
            "no_tokens",
            "analysis token balance is exhausted",
        ));
    }
    user.tokens -= 1;

    let id = Uuid::new_v4();
    let job = AnalysisJob {
        kind,
        upload,
        gets: 0,
    };
    let task = render_analysis(id, &job, 0, &state.scenario);
    store.analyses.insert(id, job);
    tracing::info!(task_id = %id, kind = ?kind, status = task.status, "analysis task created");
    Ok(task)
}

fn validate_upload(kind: JobKind, upload: &Upload) -> Result<(), ServiceError> {
    let invalid = |message: &str| {
        Err(ServiceError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_upload",
            message,
        ))
    };
    match kind {
        JobKind::Analysis => {
            let has_text = upload
                .conversation
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty());
            if upload.files.is_empty() && !has_text {
                return invalid("provide files or conversation text");
            }
            if upload.files.iter().any(|file| file.field != "files") {
                return invalid("analysis files must use the `files` field");
            }
        }
        JobKind::Place => {
            if upload.files.len() != 1 || upload.files[0].field != "file" {
                return invalid("place identification takes exactly one `file`");
            }
        }
    }
    Ok(())
}

pub async fn get_analysis(
    state: &AppState,
    bearer: Option<&str>,
    id: Uuid,
) -> Result<TaskRead, ServiceError> {
    let mut store = state.store.lock().await;
    require_user(&store, bearer)?;
    let scenario = state.scenario;
    let job = store
        .analyses
        .get_mut(&id)
        .ok_or_else(|| ServiceError::not_found("task", id))?;

    job.gets += 1;
    if job.gets <= scenario.fail_first_gets {
        tracing::debug!(task_id = %id, gets = job.gets, "injecting server error");
        return Err(ServiceError::unavailable());
    }
    let polls = job.gets - scenario.fail_first_gets;
    Ok(render_analysis(id, job, polls, &scenario))
}

fn render_analysis(id: Uuid, job: &AnalysisJob, polls: u32, scenario: &Scenario) -> TaskRead {
    if polls < scenario.analysis_polls_to_finish {
        return TaskRead {
            id,
            status: if polls == 0 { "queued" } else { "started" },
            result: None,
            error: None,
        };
    }

    let upload = &job.upload;
    let empty = upload.files.iter().all(|file| file.data.is_empty())
        && upload
            .conversation
            .as_deref()
            .map_or(true, |text| text.trim().is_empty());
    if empty {
        return TaskRead {
            id,
            status: "failed",
            result: None,
            error: Some("uploaded content is empty".to_string()),
        };
    }

    let output = match job.kind {
        JobKind::Analysis => {
            let mut text = upload.conversation.clone().unwrap_or_default();
            for file in &upload.files {
                if file.content_type.starts_with("text/") {
                    text.push('\n');
                    text.push_str(&String::from_utf8_lossy(&file.data));
                }
            }
            TaskOutput::Report(assess_risk(&text))
        }
        JobKind::Place => {
            let data = upload
                .files
                .first()
                .map(|file| file.data.as_slice())
                .unwrap_or_default();
            TaskOutput::Text(guess_place(data))
        }
    };
    TaskRead {
        id,
        status: "finished",
        result: Some(output),
        error: None,
    }
}

// Keyword heuristic standing in for the model.
pub fn assess_risk(text: &str) -> RiskReport {
    let lowered = text.to_lowercase();
    let red_flags: Vec<String> = RED_FLAGS
        .iter()
        .filter(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, flag)| flag.to_string())
        .collect();
    let risk_score = (10 + 25 * red_flags.len()).min(100) as u8;
    let recommendations = if red_flags.is_empty() {
        vec!["No obvious red flags; keep an eye on requests for money".to_string()]
    } else {
        vec![
            "Do not send money or codes".to_string(),
            "Verify the person through a video call".to_string(),
        ]
    };
    RiskReport {
        risk_score,
        red_flags,
        recommendations,
    }
}

pub fn guess_place(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    PLACES[digest[0] as usize % PLACES.len()].to_string()
}

pub async fn create_search(
    state: &AppState,
    bearer: Option<&str>,
    upload: Upload,
) -> Result<SearchCreated, ServiceError> {
    let image = match upload.files.as_slice() {
        [image] if image.field == "image" => image,
        _ => {
            return Err(ServiceError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_upload",
                "reverse search takes exactly one `image`",
            ))
        }
    };
    let results = mock_hits(&image.data);

    let mut store = state.store.lock().await;
    require_user(&store, bearer)?;
    let task_id = Uuid::new_v4();
    store.searches.insert(task_id, SearchJob { results, gets: 0 });
    tracing::info!(%task_id, bytes = image.data.len(), "reverse search created");
    Ok(SearchCreated { task_id })
}

pub async fn get_search(
    state: &AppState,
    bearer: Option<&str>,
    id: Uuid,
) -> Result<SearchRead, ServiceError> {
    let mut store = state.store.lock().await;
    require_user(&store, bearer)?;
    let scenario = state.scenario;
    let job = store
        .searches
        .get_mut(&id)
        .ok_or_else(|| ServiceError::not_found("search", id))?;

    job.gets += 1;
    if job.gets <= scenario.fail_first_gets {
        tracing::debug!(task_id = %id, gets = job.gets, "injecting server error");
        return Err(ServiceError::unavailable());
    }
    let polls = job.gets - scenario.fail_first_gets;
    Ok(render_search(job, polls, &scenario))
}

fn render_search(job: &SearchJob, polls: u32, scenario: &Scenario) -> SearchRead {
    if polls >= scenario.search_polls_to_complete {
        return SearchRead {
            status: EngineStatus {
                google: "completed",
                yandex: "completed",
                bing: "completed",
            },
            results: job.results.clone(),
        };
    }
    let running = EngineStatus {
        google: "running",
        yandex: "running",
        bing: "running",
    };
    if polls >= scenario.search_polls_to_first_match {
        // Google reports first; the others are still working.
        return SearchRead {
            status: running,
            results: SearchResults {
                google: job.results.google.clone(),
                ..SearchResults::default()
            },
        };
    }
    SearchRead {
        status: running,
        results: SearchResults::default(),
    }
}

// Deterministic fake matches seeded by the image digest; empty images match nothing.
pub fn mock_hits(data: &[u8]) -> SearchResults {
    if data.is_empty() {
        return SearchResults {
            google: Some(GoogleSection {
                visual_matches: Vec::new(),
            }),
            yandex: Some(YandexSection {
                image_results: Vec::new(),
            }),
            bing: Some(BingSection {
                related_content: Vec::new(),
            }),
        };
    }

    let digest = Sha256::digest(data);
    let seed: String = digest.iter().take(6).map(|byte| format!("{byte:02x}")).collect();
    let link = |site: &str, i: usize| format!("https://{site}/match/{seed}-{i}");
    let thumb = |i: usize| format!("https://picsum.photos/seed/{seed}{i}/400/300");

    let visual_matches: Vec<GoogleMatch> = (0..3)
        .map(|i| GoogleMatch {
            position: i as u32 + 1,
            title: format!("Similar photo #{}", i + 1),
            link: link("social.example", i),
            source: "social.example".to_string(),
            thumbnail: thumb(i),
        })
        .collect();

    // The first Yandex result repeats a Google link, as real engines often do.
    let image_results = vec![
        YandexMatch {
            title: "Profile photo".to_string(),
            link: link("social.example", 0),
            source: "social.example".to_string(),
            thumbnail: YandexThumbnail { link: thumb(0) },
        },
        YandexMatch {
            title: "Dating profile".to_string(),
            link: link("dating.example", 0),
            source: "dating.example".to_string(),
            thumbnail: YandexThumbnail { link: thumb(10) },
        },
    ];

    let related_content = (0..2)
        .map(|i| BingMatch {
            position: i as u32 + 1,
            title: format!("Related image {}", i + 1),
            link: link("stock.example", i),
            thumbnail: thumb(20 + i),
        })
        .collect();

    SearchResults {
        google: Some(GoogleSection { visual_matches }),
        yandex: Some(YandexSection { image_results }),
        bing: Some(BingSection { related_content }),
    }
}
