//! End-to-end spec runs: record, replay, re-record and reconcile.

use autorecord::interception::{RequestId, UNMATCHED_STATUS};
use autorecord::recording::MockIndex;
use autorecord::{
    AutorecordConfig, FsHost, HostLayout, InMemoryHost, Interception, LogLevel, Reply, ReplyBody,
    RequestEvent, ResponseBody, ResponseEvent, SpecSession, TestInfo, TestMode,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const LOGIN_SPEC: &str = "cypress/integration/login.spec";

fn memory_host() -> InMemoryHost {
    InMemoryHost::new(HostLayout::new("cypress/fixtures", "cypress/integration"))
}

fn session(host: &InMemoryHost, options: &AutorecordConfig, spec: &str) -> SpecSession {
    let config = Arc::new(options.compile().unwrap());
    SpecSession::new(config, Arc::new(host.clone()), spec)
}

fn request(id: RequestId, method: &str, url: &str, body: Option<Value>) -> RequestEvent {
    RequestEvent {
        id,
        method: method.to_string(),
        url: url.to_string(),
        headers: IndexMap::new(),
        body,
    }
}

fn response(id: RequestId, status: u16, body: Value) -> ResponseEvent {
    let mut headers = IndexMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("x-request-id".to_string(), format!("req-{id}"));
    ResponseEvent {
        request_id: id,
        status,
        headers,
        body: ResponseBody::Json(body),
    }
}

/// Drive one recorded exchange through the session.
fn exchange(session: &mut SpecSession, id: RequestId, method: &str, url: &str, data: Value) {
    let interception = session.on_request(request(id, method, url, None));
    assert_eq!(interception, Interception::Passthrough { observe: true });
    session.on_response(response(id, 200, data));
}

fn external(id: &str, url: &str) -> Value {
    json!({"fixtureId": id, "url": url, "method": "GET", "status": 200, "headers": {}, "body": null})
}

fn inline(url: &str, data: Value) -> Value {
    json!({"url": url, "method": "GET", "status": 200, "headers": {}, "body": null, "response": data})
}

#[tokio::test]
async fn test_record_then_replay() {
    let host = memory_host();
    let options = AutorecordConfig {
        whitelist_headers: vec!["^content-type$".to_string()],
        ..AutorecordConfig::default()
    };
    let test = TestInfo::new("t1", "signs in").with_parents(["user"]);

    let mut first = session(&host, &options, LOGIN_SPEC);
    first.before_spec().await.unwrap();
    assert_eq!(first.before_each(&test).unwrap(), TestMode::Recording);
    exchange(&mut first, 1, "GET", "/api/me", json!({"id": 1}));
    first.after_each().await.unwrap();
    first.after_spec().await.unwrap();

    let stored = host.json("cypress/mocks/login.json").unwrap();
    assert_eq!(stored["$version"], json!(1));
    let record = &stored["user > signs in"][0];
    assert_eq!(record["url"], json!("/api/me"));
    assert_eq!(record["method"], json!("GET"));
    assert_eq!(record["status"], json!(200));
    assert_eq!(record["response"], json!({"id": 1}));
    assert_eq!(record["headers"], json!({"content-type": "application/json"}));
    assert!(record.get("fixtureId").map_or(true, Value::is_null));

    let mut second = session(&host, &options, LOGIN_SPEC);
    second.before_spec().await.unwrap();
    assert_eq!(second.before_each(&test).unwrap(), TestMode::Replaying);
    let Interception::Reply(reply) = second.on_request(request(1, "GET", "/api/me", None)) else {
        panic!("replay must answer the request");
    };
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, ReplyBody::Inline(json!({"id": 1})));
    assert_eq!(reply.headers.get("content-type").map(String::as_str), Some("application/json"));
    second.after_each().await.unwrap();
    second.after_spec().await.unwrap();

    assert_eq!(host.json("cypress/mocks/login.json").unwrap(), stored);
}

#[tokio::test]
async fn test_force_record_replaces_existing_mocks() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({"refresh": [external("old-fixture", "/api/token")]}),
    );
    host.insert_json("cypress/fixtures/old-fixture.json", &json!({"token": "old"}));

    let mut session = session(&host, &AutorecordConfig::default(), LOGIN_SPEC);
    session.before_spec().await.unwrap();
    let mode = session
        .before_each(&TestInfo::new("t1", "refresh [r]"))
        .unwrap();
    assert_eq!(mode, TestMode::Recording);
    exchange(&mut session, 1, "GET", "/api/token", json!({"token": "new"}));

    let outcome = session.after_each().await.unwrap();
    assert_eq!(outcome.fqtn, "refresh");
    assert!(outcome.replaced);
    assert_eq!(session.staging().removals().collect::<Vec<_>>(), vec!["old-fixture"]);

    let summary = session.after_spec().await.unwrap();
    assert_eq!(summary.deleted_fixtures, vec!["old-fixture".to_string()]);
    assert!(!host.exists("cypress/fixtures/old-fixture.json"));

    let stored = host.json("cypress/mocks/login.json").unwrap();
    assert_eq!(stored["refresh"][0]["response"], json!({"token": "new"}));
    assert!(stored.get("refresh [r]").is_none());
}

#[tokio::test]
async fn test_record_tests_allow_list_forces_recording() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({"pinned": [inline("/api/a", json!(1))]}),
    );
    let options = AutorecordConfig {
        record_tests: vec!["pinned".to_string()],
        ..AutorecordConfig::default()
    };

    let mut session = session(&host, &options, LOGIN_SPEC);
    session.before_spec().await.unwrap();
    assert_eq!(
        session.before_each(&TestInfo::new("t1", "pinned")).unwrap(),
        TestMode::Recording
    );
}

#[tokio::test]
async fn test_ignored_attribute_still_matches() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({"search": [{
            "url": "/api/search",
            "method": "POST",
            "status": 200,
            "headers": {},
            "body": {"q": "x", "timestamp": 1},
            "response": {"hits": 3}
        }]}),
    );
    let options = AutorecordConfig {
        ignored_request_body_attributes: vec!["timestamp".to_string()],
        ..AutorecordConfig::default()
    };

    let mut session = session(&host, &options, LOGIN_SPEC);
    session.before_spec().await.unwrap();
    session.before_each(&TestInfo::new("t1", "search")).unwrap();

    let incoming = request(1, "POST", "/api/search", Some(json!({"q": "x", "timestamp": 2})));
    let Interception::Reply(reply) = session.on_request(incoming) else {
        panic!("expected a stubbed reply");
    };
    assert_eq!(reply.body, ReplyBody::Inline(json!({"hits": 3})));

    let different = request(2, "POST", "/api/search", Some(json!({"q": "y", "timestamp": 1})));
    assert_eq!(session.on_request(different), Interception::Reply(Reply::unmatched()));
}

#[tokio::test]
async fn test_shared_fixture_is_not_deleted() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({"t": [external("abc123", "/api/big")]}),
    );
    host.insert_json(
        "cypress/mocks/cart.json",
        &json!({"cart > holds": [external("abc123", "/api/big")]}),
    );
    host.insert_json("cypress/fixtures/abc123.json", &json!({"rows": []}));

    let mut session = session(&host, &AutorecordConfig::default(), LOGIN_SPEC);
    session.before_spec().await.unwrap();
    session.before_each(&TestInfo::new("t1", "t [r]")).unwrap();
    exchange(&mut session, 1, "GET", "/api/small", json!({"ok": true}));
    session.after_each().await.unwrap();

    assert!(session.staging().removals().next().is_none());
    let warnings: Vec<_> = host
        .logs()
        .into_iter()
        .filter(|log| log.level == LogLevel::Warn)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].msg.contains("abc123"));
    assert!(warnings[0].msg.contains("\"cart > holds\" (cart)"));

    session.after_spec().await.unwrap();
    assert!(host.exists("cypress/fixtures/abc123.json"));
}

#[tokio::test]
async fn test_fixture_shared_within_spec_is_not_deleted() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({
            "a": [external("shared", "/api/big")],
            "b": [external("shared", "/api/big")],
        }),
    );
    host.insert_json("cypress/fixtures/shared.json", &json!([1]));

    let mut session = session(&host, &AutorecordConfig::default(), LOGIN_SPEC);
    session.before_spec().await.unwrap();
    session.before_each(&TestInfo::new("t1", "a [r]")).unwrap();
    exchange(&mut session, 1, "GET", "/api/other", json!(2));
    session.after_each().await.unwrap();
    session.after_spec().await.unwrap();

    assert!(host.exists("cypress/fixtures/shared.json"));
    assert!(host.logs()[0].msg.contains("\"b\" (login)"));
}

#[tokio::test]
async fn test_oversized_response_is_externalized() {
    let host = memory_host();
    // 16 UTF-16 units
    let options = AutorecordConfig {
        max_inline_size_mb: 16.0 / (1024.0 * 1024.0),
        ..AutorecordConfig::default()
    };

    let mut session = session(&host, &options, LOGIN_SPEC);
    session.before_spec().await.unwrap();
    session.before_each(&TestInfo::new("t1", "export")).unwrap();
    // Serialized with quotes: 16 units, kept inline
    exchange(&mut session, 1, "GET", "/api/at-limit", json!("abcdefghijklmn"));
    // 17 units, externalized
    exchange(&mut session, 2, "GET", "/api/over-limit", json!("abcdefghijklmno"));
    session.after_each().await.unwrap();
    let summary = session.after_spec().await.unwrap();

    let records = session.index().get("export").unwrap();
    assert_eq!(records[0].response(), Some(&json!("abcdefghijklmn")));
    let fixture_id = records[1].fixture_id().unwrap();
    assert!(uuid::Uuid::parse_str(fixture_id).is_ok());
    assert!(records[1].response().is_none());
    assert_eq!(summary.written_fixtures, vec![fixture_id.to_string()]);

    let path = format!("cypress/fixtures/{fixture_id}.json");
    assert_eq!(host.json(&path), Some(json!("abcdefghijklmno")));
    let stored = host.json("cypress/mocks/login.json").unwrap();
    assert!(stored["export"][1].get("response").is_none());
}

#[tokio::test]
async fn test_unmatched_request_gets_sentinel() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({"home": [inline("/api/me", json!({"id": 1}))]}),
    );

    let mut session = session(&host, &AutorecordConfig::default(), LOGIN_SPEC);
    session.before_spec().await.unwrap();
    session.before_each(&TestInfo::new("t1", "home")).unwrap();

    let Interception::Reply(reply) = session.on_request(request(1, "GET", "/api/unknown", None))
    else {
        panic!("unmatched requests are answered");
    };
    assert_eq!(reply.status, UNMATCHED_STATUS);
    assert_eq!(
        reply.body,
        ReplyBody::Inline(json!("cypress-autorecord forced 408 Request Timeout"))
    );
    assert!(session.should_swallow_uncaught("Request failed with status code 408"));
    assert!(!session.should_swallow_uncaught("TypeError: x is undefined"));

    session.after_each().await.unwrap();
    session.after_spec().await.unwrap();
    let index = MockIndex::from_value(host.json("cypress/mocks/login.json").unwrap()).unwrap();
    assert_eq!(index.get("home").unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_traffic_keeps_previous_mocks() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({"quiet": [external("keep-me", "/api/a")]}),
    );
    host.insert_json("cypress/fixtures/keep-me.json", &json!(1));

    let mut session = session(&host, &AutorecordConfig::default(), LOGIN_SPEC);
    session.before_spec().await.unwrap();
    session.before_each(&TestInfo::new("t1", "quiet [r]")).unwrap();
    let outcome = session.after_each().await.unwrap();
    assert_eq!(outcome.recorded, 0);
    assert!(!outcome.replaced);

    session.before_each(&TestInfo::new("t2", "fresh")).unwrap();
    session.after_each().await.unwrap();
    session.after_spec().await.unwrap();

    let stored = host.json("cypress/mocks/login.json").unwrap();
    assert_eq!(stored["quiet"][0]["fixtureId"], json!("keep-me"));
    assert!(stored.get("fresh").is_none());
    assert!(host.exists("cypress/fixtures/keep-me.json"));
}

#[tokio::test]
async fn test_recording_is_idempotent() {
    let host = memory_host();
    let options = AutorecordConfig {
        separate_mock_files: true,
        ..AutorecordConfig::default()
    };

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let mut session = session(&host, &options, LOGIN_SPEC);
        session.before_spec().await.unwrap();
        session.before_each(&TestInfo::new("t1", "orders [r]")).unwrap();
        exchange(&mut session, 1, "GET", "https://api.example.com/v1/orders?page=1", json!([1]));
        let post = request(2, "POST", "https://api.example.com/v1/orders", Some(json!({"sku": 7})));
        assert_eq!(session.on_request(post), Interception::Passthrough { observe: true });
        session.on_response(response(2, 201, json!({"id": 99})));
        session.after_each().await.unwrap();
        session.after_spec().await.unwrap();
        snapshots.push(host.json("cypress/mocks/login.json").unwrap());
    }
    assert_eq!(snapshots[0], snapshots[1]);

    let records = &snapshots[0]["orders"];
    let get_id = records[0]["fixtureId"].as_str().unwrap();
    let post_id = records[1]["fixtureId"].as_str().unwrap();
    assert!(get_id.starts_with("api.example.com/"));
    assert!(get_id.ends_with("_GET_200"));
    assert!(post_id.contains("_POST_201_"));
    assert!(host.exists(format!("cypress/fixtures/{get_id}.json")));
    assert!(host.exists(format!("cypress/fixtures/{post_id}.json")));
}

#[tokio::test]
async fn test_clean_mode_prunes_tests_not_run() {
    let host = memory_host();
    host.insert_json(
        "cypress/mocks/login.json",
        &json!({
            "still here": [inline("/api/a", json!(1))],
            "deleted test": [external("stale", "/api/b")],
        }),
    );
    host.insert_json("cypress/fixtures/stale.json", &json!(2));
    let options = AutorecordConfig {
        clean_mocks: true,
        ..AutorecordConfig::default()
    };

    let mut session = session(&host, &options, LOGIN_SPEC);
    session.before_spec().await.unwrap();
    assert_eq!(
        session.before_each(&TestInfo::new("t1", "still here")).unwrap(),
        TestMode::Replaying
    );
    session.after_each().await.unwrap();
    // Recorded traffic is not persisted in clean mode
    session.before_each(&TestInfo::new("t2", "new test")).unwrap();
    exchange(&mut session, 1, "GET", "/api/c", json!(3));
    session.after_each().await.unwrap();

    let summary = session.after_spec().await.unwrap();
    assert_eq!(summary.dropped_tests, vec!["deleted test".to_string()]);
    assert_eq!(summary.deleted_fixtures, vec!["stale".to_string()]);

    let stored = host.json("cypress/mocks/login.json").unwrap();
    assert!(stored.get("still here").is_some());
    assert!(stored.get("deleted test").is_none());
    assert!(stored.get("new test").is_none());
    assert!(!host.exists("cypress/fixtures/stale.json"));
}

#[tokio::test]
async fn test_filesystem_round_trip() {
    let dir = TempDir::new().unwrap();
    let layout = HostLayout::new(
        dir.path().join("cypress/fixtures"),
        dir.path().join("cypress/integration"),
    );
    let options = AutorecordConfig {
        separate_mock_files: true,
        ..AutorecordConfig::default()
    };
    let config = Arc::new(options.compile().unwrap());
    let test = TestInfo::new("t1", "loads profile").with_parents(["profile"]);

    let mut first = SpecSession::new(config.clone(), Arc::new(FsHost::new(layout.clone())), LOGIN_SPEC);
    first.before_spec().await.unwrap();
    first.before_each(&test).unwrap();
    exchange(&mut first, 1, "GET", "https://api.example.com/me", json!({"name": "Ada"}));
    first.after_each().await.unwrap();
    first.after_spec().await.unwrap();

    let index_path = layout.index_path("login");
    let text = std::fs::read_to_string(&index_path).unwrap();
    assert!(text.starts_with("{\n  \"$version\": 1,"));

    let mut second = SpecSession::new(config, Arc::new(FsHost::new(layout.clone())), LOGIN_SPEC);
    second.before_spec().await.unwrap();
    assert_eq!(second.before_each(&test).unwrap(), TestMode::Replaying);
    let Interception::Reply(reply) = second.on_request(request(1, "GET", "https://api.example.com/me", None))
    else {
        panic!("expected a fixture reply");
    };
    let ReplyBody::Fixture { ref path, .. } = reply.body else {
        panic!("separate-file mode replies with fixtures");
    };
    assert!(path.exists());
    assert_eq!(
        second.resolve_body(&reply.body).await.unwrap(),
        json!({"name": "Ada"})
    );
}

#[tokio::test]
async fn test_dollar_test_name_survives_next_run() {
    let host = memory_host();
    let options = AutorecordConfig {
        include_parent_test_name: false,
        ..AutorecordConfig::default()
    };
    let test = TestInfo::new("t1", "$version").with_parents(["meta"]);

    let mut first = session(&host, &options, LOGIN_SPEC);
    first.before_spec().await.unwrap();
    assert_eq!(first.before_each(&test).unwrap(), TestMode::Recording);
    exchange(&mut first, 1, "GET", "/api/version", json!({"v": "1.2.3"}));
    first.after_each().await.unwrap();
    first.after_spec().await.unwrap();

    let stored = host.json("cypress/mocks/login.json").unwrap();
    assert_eq!(stored["$version"], json!(1));

    let mut second = session(&host, &options, LOGIN_SPEC);
    second.before_spec().await.unwrap();
    assert!(second.index().contains("$version"));
    assert_eq!(second.before_each(&test).unwrap(), TestMode::Replaying);
    let Interception::Reply(reply) = second.on_request(request(1, "GET", "/api/version", None))
    else {
        panic!("replay must answer the request");
    };
    assert_eq!(reply.body, ReplyBody::Inline(json!({"v": "1.2.3"})));
    second.after_each().await.unwrap();
    second.after_spec().await.unwrap();

    assert_eq!(host.json("cypress/mocks/login.json").unwrap(), stored);
}
