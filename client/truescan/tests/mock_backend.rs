use std::time::Duration;

use mock_backend::{build_router, AppState, Scenario};
use reqwest::Url;
use truescan::{
    api::AnalysisApi,
    config::BackoffConfig,
    transport::FilePart,
    ApiError, AppServices, ClientConfig, PollerConfig, ServiceError,
};
use uuid::Uuid;

async fn spawn_backend(scenario: Scenario) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(AppState::new(scenario));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

fn fast_backoff(factor: f64) -> BackoffConfig {
    BackoffConfig {
        start: Duration::from_millis(50),
        factor,
        max_delay: Duration::from_millis(200),
        jitter_min: 1.0,
        jitter_max: 1.0,
    }
}

// Default policy with every wait shrunk so a test finishes in seconds.
async fn services(scenario: Scenario) -> AppServices {
    let mut config = ClientConfig::for_url(spawn_backend(scenario).await);
    config.poller = PollerConfig {
        max_duration: Duration::from_secs(20),
        analysis_min_interval: Duration::from_millis(10),
        reverse_min_interval: Duration::from_millis(20),
        analysis_backoff: fast_backoff(2.0),
        reverse_backoff: fast_backoff(1.6),
        server_error_penalty: Duration::from_millis(10),
        ..PollerConfig::default()
    };
    AppServices::new(config).unwrap()
}

fn screenshot() -> Vec<FilePart> {
    vec![FilePart::new("files", "chat.png", b"\x89PNG fake".to_vec())]
}

#[tokio::test]
async fn analysis_runs_create_poll_and_spends_a_token() {
    let services = services(Scenario::default()).await;

    let report = services
        .analysis
        .analyze(screenshot(), Some("URGENT, send money today"))
        .await
        .unwrap();
    assert_eq!(report.red_flags.len(), 2);
    assert_eq!(report.risk_score, 60);
    assert!(!report.recommendations.is_empty());

    let user = services.auth.me().await.unwrap();
    assert_eq!(user.apphud_id, "debug-dev.truescan");
    assert_eq!(user.tokens, 9);
    assert_eq!(services.tokens.balance(), Some(9));
}

#[tokio::test]
async fn place_identification_returns_text() {
    let services = services(Scenario::default()).await;

    let place = services
        .analysis
        .identify_place(FilePart::jpeg("file", b"\xff\xd8street".to_vec()), None)
        .await
        .unwrap();
    assert!(place.contains(','), "unexpected place {place:?}");
}

#[tokio::test]
async fn finished_on_create_needs_no_poll() {
    let services = services(Scenario {
        analysis_polls_to_finish: 0,
        fail_first_gets: 100,
        ..Scenario::default()
    })
    .await;

    let report = services
        .analysis
        .analyze(Vec::new(), Some("dinner at eight?"))
        .await
        .unwrap();
    assert!(report.red_flags.is_empty());
}

#[tokio::test]
async fn analysis_survives_tolerated_server_errors() {
    let services = services(Scenario {
        fail_first_gets: 2,
        ..Scenario::default()
    })
    .await;

    let report = services
        .analysis
        .analyze(screenshot(), None)
        .await
        .unwrap();
    assert_eq!(report.risk_score, 10);
}

#[tokio::test]
async fn analysis_escalates_persistent_server_errors() {
    let services = services(Scenario {
        fail_first_gets: 50,
        ..Scenario::default()
    })
    .await;

    let err = services
        .analysis
        .analyze(screenshot(), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ServiceError::Api(ApiError::Http { status: 503, .. })),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn search_returns_early_with_first_engine() {
    let services = services(Scenario {
        search_polls_to_first_match: 1,
        search_polls_to_complete: 10,
        ..Scenario::default()
    })
    .await;

    let hits = services
        .search
        .search_by_image(b"\xff\xd8face".to_vec())
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|hit| hit.source == "social.example"));
}

#[tokio::test]
async fn completed_search_merges_engines_without_duplicates() {
    let services = services(Scenario {
        search_polls_to_first_match: 1,
        search_polls_to_complete: 1,
        ..Scenario::default()
    })
    .await;

    let hits = services
        .search
        .search_by_image(b"\xff\xd8face".to_vec())
        .await
        .unwrap();
    // 3 google + 2 yandex (one repeats a google link) + 2 bing.
    assert_eq!(hits.len(), 6);
    let links: Vec<&str> = hits
        .iter()
        .filter_map(|hit| hit.link_url.as_deref())
        .collect();
    assert!(links[3].contains("dating.example"));
    assert!(links[4].contains("stock.example"));
}

#[tokio::test]
async fn search_without_matches_waits_for_completion() {
    let services = services(Scenario {
        search_polls_to_first_match: 1,
        search_polls_to_complete: 3,
        ..Scenario::default()
    })
    .await;

    let hits = services.search.search_by_image(Vec::new()).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let services = services(Scenario::default()).await;

    let err = services
        .api
        .get_analysis_task(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));

    services
        .auth
        .ensure_authorized(&services.config.apphud_id)
        .await
        .unwrap();
    let err = services
        .api
        .get_analysis_task(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn cancel_stops_an_in_flight_analysis() {
    let services = services(Scenario {
        analysis_polls_to_finish: 1_000,
        ..Scenario::default()
    })
    .await;

    let running = {
        let services = services.clone();
        tokio::spawn(async move {
            services
                .analysis
                .analyze(screenshot(), None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    services.cancel_all();

    let err = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancelled());
}
