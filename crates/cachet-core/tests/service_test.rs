// Request service tests: stub mode, real HTTP against wiremock, and the
// merge processor's ordering and abandonment behaviour.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cachet_api::StubResponses;
use cachet_core::{
    Backend, BackendOptions, ChangeEvent, CoreError, Entity, MemoryStore, ModelCache,
    PersistentStore, Settings,
};

use common::{Article, CREATE_ECHO, LIST_WITH_INCLUDED, Person, single};

// ── Helpers ─────────────────────────────────────────────────────────

fn stub_responses() -> StubResponses {
    StubResponses::default()
        .with_list(LIST_WITH_INCLUDED)
        .with_create(CREATE_ECHO)
}

async fn testing_backend() -> Backend {
    let cache = Arc::new(common::cache());
    let backend = Backend::new(cache, Settings::default().with_testing(true)).unwrap();
    backend.start().await;
    backend
}

async fn http_backend(server: &MockServer) -> Backend {
    let cache = Arc::new(common::cache());
    let base: Url = server.uri().parse().unwrap();
    let settings = Settings::default()
        .with_base_url(base)
        .with_token(SecretString::from("secret-token".to_owned()));
    let backend = Backend::new(cache, settings).unwrap();
    backend.start().await;
    backend
}

// ── Stub mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn stub_list_merges_into_cache() {
    let backend = testing_backend().await;
    let service = backend.service::<Article>().with_stub_responses(stub_responses());

    let articles = service.list().await.unwrap();

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title.as_deref(), Some("JSON API paints my bikeshed!"));
    assert_eq!(articles[0].body.as_deref(), Some("The shortest article. Ever."));
    assert!(articles[0].is_cached());
    assert_eq!(backend.cache().len::<Article>(), 1);
    assert!(backend.cache().get_all::<Person>().is_empty());
}

#[tokio::test]
async fn stub_create_without_id_is_returned_uncached() {
    let backend = testing_backend().await;
    let service = backend.service::<Article>().with_stub_responses(stub_responses());

    let mut draft = Article::new("", "test title");
    draft.body = Some("test body".into());
    draft.author_id = "test id".into();

    let created = service.create(&draft).await.unwrap();

    assert_eq!(created.title.as_deref(), Some("test title"));
    assert_eq!(created.body.as_deref(), Some("test body"));
    assert_eq!(created.author_id, "test id");
    assert!(!created.is_cached());
    assert!(backend.cache().is_empty::<Article>());
}

#[tokio::test]
async fn stub_list_elements_without_id_are_returned_uncached() {
    let backend = testing_backend().await;
    let body = r#"{"data":[
        {"type":"people","attributes":{"name":"A"}},
        {"type":"people","attributes":{"name":"B"}}
    ]}"#;
    let service = backend
        .service::<Person>()
        .with_stub_responses(StubResponses::default().with_list(body));

    let people = service.list().await.unwrap();

    let names: Vec<&str> = people.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(people.iter().all(|p| !p.is_cached()));
    assert!(backend.cache().is_empty::<Person>());
}

#[tokio::test]
async fn stub_delete_evicts_from_memory() {
    let backend = testing_backend().await;
    backend.cache().add(Article::new("1", "doomed"));
    let service = backend.service::<Article>().with_stub_responses(stub_responses());

    service.delete(&Article::new("1", "doomed")).await.unwrap();

    assert!(backend.cache().get_by_id::<Article>("1").is_none());
}

#[tokio::test]
async fn stub_without_body_is_a_wire_error() {
    let backend = testing_backend().await;
    let err = backend.service::<Article>().list().await.unwrap_err();
    assert!(matches!(err, CoreError::WireFormat { .. }));
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn requests_before_start_are_rejected() {
    let cache = Arc::new(common::cache());
    let backend = Backend::new(cache, Settings::default().with_testing(true)).unwrap();

    let err = backend.service::<Article>().list().await.unwrap_err();
    assert!(matches!(err, CoreError::NotRunning));
}

#[tokio::test]
async fn backend_can_restart_after_shutdown() {
    let backend = testing_backend().await;
    backend.shutdown().await;
    assert!(!backend.is_running());

    let service = backend.service::<Article>().with_stub_responses(stub_responses());
    assert!(matches!(service.list().await, Err(CoreError::NotRunning)));

    backend.start().await;
    assert_eq!(service.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn member_operations_without_id_fail_fast() {
    let backend = testing_backend().await;
    let service = backend.service::<Article>();

    let err = service.update(&Article::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::MissingId { operation: "update", .. }));

    let err = service.delete(&Article::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::MissingId { operation: "delete", .. }));
}

// ── HTTP ────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_over_http_sends_bearer_and_merges() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/articles"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIST_WITH_INCLUDED))
        .expect(1)
        .mount(&server)
        .await;

    let backend = http_backend(&server).await;
    let articles = backend.service::<Article>().list().await.unwrap();

    assert_eq!(articles.len(), 1);
    assert_eq!(backend.cache().get_by_id::<Article>("1").unwrap().author_id, "42");
}

#[tokio::test]
async fn update_patches_member_path() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/articles/7"))
        .and(body_partial_json(json!({ "data": { "type": "articles", "id": "7" } })))
        .respond_with(ResponseTemplate::new(200).set_body_string(single("7", "edited")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = http_backend(&server).await;
    let updated = backend
        .service::<Article>()
        .update(&Article::new("7", "edited"))
        .await
        .unwrap();

    assert_eq!(updated.title.as_deref(), Some("edited"));
    assert!(updated.is_cached());
}

#[tokio::test]
async fn http_error_status_surfaces_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/articles"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let backend = http_backend(&server).await;
    let err = backend.service::<Article>().list().await.unwrap_err();

    let CoreError::Transport(inner) = err else {
        panic!("expected transport error, got {err:?}");
    };
    assert_eq!(inner.status(), Some(404));
    assert!(inner.is_not_found());
    assert!(backend.cache().is_empty::<Article>());
}

#[tokio::test]
async fn missing_base_url_is_a_transport_error() {
    let backend = Backend::new(Arc::new(common::cache()), Settings::default()).unwrap();
    backend.start().await;

    let err = backend.service::<Article>().list().await.unwrap_err();
    assert!(matches!(err, CoreError::Transport(cachet_api::Error::MissingBaseUrl)));
}

#[tokio::test]
async fn settings_are_read_when_a_request_is_issued() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for server in [&first, &second] {
        Mock::given(method("GET"))
            .and(path("/people"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": []}"#))
            .expect(1)
            .mount(server)
            .await;
    }

    let backend = http_backend(&first).await;
    let service = backend.service::<Person>();
    service.list().await.unwrap();

    backend.set_base_url(second.uri().parse().unwrap());
    service.list().await.unwrap();
}

// ── Merge processor ─────────────────────────────────────────────────

#[tokio::test]
async fn abandoned_request_still_merges() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/articles"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(LIST_WITH_INCLUDED)
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let backend = http_backend(&server).await;
    let service = backend.service::<Article>();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), service.list()).await;
    assert!(abandoned.is_err());
    assert!(backend.cache().is_empty::<Article>());

    let mut merged = false;
    for _ in 0..50 {
        if backend.cache().len::<Article>() == 1 {
            merged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(merged, "abandoned request was never merged");
}

#[tokio::test]
async fn request_merges_fire_bus_events() {
    let backend = testing_backend().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    backend
        .cache()
        .bus()
        .register::<Article, _>(move |event: &ChangeEvent<Article>| {
            sink.lock().unwrap().push(event.is_added());
        });

    let service = backend.service::<Article>().with_stub_responses(stub_responses());
    service.list().await.unwrap();
    service.list().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn persist_after_merge_saves_the_cache() {
    let store = Arc::new(MemoryStore::new());
    let cache = ModelCache::new(store.clone());
    cache.register(&[Article::descriptor(), Person::descriptor()]);

    let backend = Backend::with_config(
        Arc::new(cache),
        Settings::default().with_testing(true),
        &cachet_api::TransportConfig::default(),
        BackendOptions {
            persist_after_merge: true,
        },
    )
    .unwrap();
    backend.start().await;

    let service = backend.service::<Article>().with_stub_responses(stub_responses());
    service.list().await.unwrap();

    let saved = store.read("articles").unwrap().unwrap();
    let saved: serde_json::Value = serde_json::from_slice(&saved).unwrap();
    assert_eq!(saved["1"]["title"], "JSON API paints my bikeshed!");
}
