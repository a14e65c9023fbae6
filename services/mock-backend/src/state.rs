use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use truescan_common::env_or;
use uuid::Uuid;

use crate::models::{SearchResults, UserRead};

#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub analysis_polls_to_finish: u32,
    pub search_polls_to_first_match: u32,
    pub search_polls_to_complete: u32,
    // The first N GETs of every task answer 503.
    pub fail_first_gets: u32,
    pub initial_tokens: i64,
}

impl Scenario {
    pub fn from_env() -> Self {
        Self {
            analysis_polls_to_finish: env_or("ANALYSIS_POLLS_TO_FINISH", 2),
            search_polls_to_first_match: env_or("SEARCH_POLLS_TO_FIRST_MATCH", 1),
            search_polls_to_complete: env_or("SEARCH_POLLS_TO_COMPLETE", 4),
            fail_first_gets: env_or("FAIL_FIRST_GETS", 0),
            initial_tokens: env_or("INITIAL_TOKENS", 10),
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            analysis_polls_to_finish: 2,
            search_polls_to_first_match: 1,
            search_polls_to_complete: 4,
            fail_first_gets: 0,
            initial_tokens: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Analysis,
    Place,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub files: Vec<UploadedFile>,
    pub conversation: Option<String>,
    pub app_bundle: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub kind: JobKind,
    pub upload: Upload,
    pub gets: u32,
}

#[derive(Debug, Clone)]
pub struct SearchJob {
    pub results: SearchResults,
    pub gets: u32,
}

#[derive(Debug, Default)]
pub struct Store {
    pub users: HashMap<Uuid, UserRead>,
    pub tokens: HashMap<String, Uuid>,
    pub analyses: HashMap<Uuid, AnalysisJob>,
    pub searches: HashMap<Uuid, SearchJob>,
}

#[derive(Clone)]
pub struct AppState {
    pub scenario: Scenario,
    pub store: Arc<Mutex<Store>>,
}

impl AppState {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            store: Arc::new(Mutex::new(Store::default())),
        }
    }
}
