//! HTTP session and HTML extractor against a mock server

use ripple_harvest::config::{Config, FieldRule, SourceConfig};
use ripple_harvest::extractor::{ExtractionError, Extractor, HtmlExtractor};
use ripple_harvest::session::{HttpSessionFactory, Session, SessionError, SessionFactory};
use ripple_harvest::state::{ExtractionOutcome, RunState, WorkItem};
use ripple_harvest::storage::{Ledger, SqliteLedger};
use ripple_harvest::Orchestrator;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fast_config;

const TRACK_PAGE: &str = r#"
<html>
  <head>
    <title>Track</title>
    <meta property="og:image" content="https://img.example.com/abc.jpg">
  </head>
  <body>
    <h1>Blue Monday</h1>
    <div class="lyrics"><p>How does it feel</p><p>To treat me like you do</p></div>
  </body>
</html>
"#;

fn source_for(server: &MockServer) -> SourceConfig {
    let rule = |name: &str, selector: &str, attribute: Option<&str>, multiple: bool| FieldRule {
        name: name.to_string(),
        selector: selector.to_string(),
        attribute: attribute.map(str::to_string),
        multiple,
    };

    SourceConfig {
        url_template: format!("{}/track/{{id}}", server.uri()),
        fields: vec![
            rule("title", "h1", None, false),
            rule("cover_image_url", "meta[property='og:image']", Some("content"), false),
            rule("lyrics", "div.lyrics p", None, true),
            rule("credits", "ul.credits li", None, true),
        ],
        ..SourceConfig::default()
    }
}

fn config_for(server: &MockServer) -> Config {
    let mut config = fast_config();
    config.source = source_for(server);
    config.run.max_retries = 1;
    config
}

#[tokio::test]
async fn test_extracts_fields_from_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TRACK_PAGE))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let factory = HttpSessionFactory::new(config.session.clone());
    let extractor = HtmlExtractor::new(&config.source).unwrap();

    let mut session = factory.acquire().await.unwrap();
    let outcome = extractor
        .extract(&mut session, &WorkItem::new("abc", "Blue Monday"))
        .await
        .unwrap();

    match outcome {
        ExtractionOutcome::Success { fields, .. } => {
            assert_eq!(fields["title"], "Blue Monday");
            assert_eq!(fields["cover_image_url"], "https://img.example.com/abc.jpg");
            assert_eq!(fields["lyrics"], "How does it feel\nTo treat me like you do");
            assert_eq!(fields["credits"], "Not found");
            assert_eq!(fields["item_url"], format!("{}/track/abc", server.uri()));
        }
        other => panic!("expected success, got {:?}", other),
    }

    session.release().await;
}

#[tokio::test]
async fn test_http_error_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let factory = HttpSessionFactory::new(config.session.clone());
    let extractor = HtmlExtractor::new(&config.source).unwrap();

    let mut session = factory.acquire().await.unwrap();
    let outcome = extractor
        .extract(&mut session, &WorkItem::new("gone", "Lost Track"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExtractionOutcome::Failure {
            reason: "HTTP 404".to_string(),
            elapsed_millis: outcome.elapsed_millis(),
        }
    );
}

#[tokio::test]
async fn test_released_session_cannot_extract() {
    let server = MockServer::start().await;
    let config = config_for(&server);
    let factory = HttpSessionFactory::new(config.session.clone());
    let extractor = HtmlExtractor::new(&config.source).unwrap();

    let mut session = factory.acquire().await.unwrap();
    session.release().await;

    let result = extractor
        .extract(&mut session, &WorkItem::new("abc", "x"))
        .await;
    assert!(matches!(result, Err(ExtractionError::SessionClosed)));
}

#[tokio::test]
async fn test_warmup_cookie_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc123; Path=/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/track/abc"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TRACK_PAGE))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.session.warmup_url = Some(format!("{}/", server.uri()));

    let factory = HttpSessionFactory::new(config.session.clone());
    let extractor = HtmlExtractor::new(&config.source).unwrap();

    let mut session = factory.acquire().await.unwrap();
    let outcome = extractor
        .extract(&mut session, &WorkItem::new("abc", "Blue Monday"))
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_failed_warmup_is_an_init_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.session.warmup_url = Some(format!("{}/", server.uri()));

    let factory = HttpSessionFactory::new(config.session.clone());
    let result = factory.acquire().await;
    assert!(matches!(result, Err(SessionError::Init(_))));
}

#[tokio::test]
async fn test_full_harvest_over_http() {
    let server = MockServer::start().await;
    for id in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/track/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(TRACK_PAGE))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/track/missing"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let factory = Arc::new(HttpSessionFactory::new(config.session.clone()));
    let extractor = Arc::new(HtmlExtractor::new(&config.source).unwrap());
    let ledger = Arc::new(Mutex::new(SqliteLedger::in_memory().unwrap()));

    let items = vec![
        WorkItem::new("a", "First"),
        WorkItem::new("missing", "Gone"),
        WorkItem::new("b", "Second"),
        WorkItem::new("c", "Third"),
    ];

    let report = Orchestrator::new(config, "http-test", factory, extractor, ledger.clone())
        .run(items)
        .await;

    assert_eq!(report.final_state, RunState::Completed);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);

    let ledger = ledger.lock().unwrap();
    let pending = ledger.pending_failures().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item.id, "missing");
    assert_eq!(pending[0].attempt_count, 2);
    assert!(pending[0].reason.starts_with("HTTP 500"));

    let ids: Vec<String> = ledger
        .latest_results()
        .unwrap()
        .into_iter()
        .map(|r| r.item.id)
        .collect();
    assert_eq!(ids, vec!["a", "missing", "b", "c"]);
}
