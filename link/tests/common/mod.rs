#![allow(dead_code)]
//! Shared helpers for the wiremock-backed integration tests.
//!
//! The mock server stands in for the msgbus endpoint: RPCs are matched
//! on `/msgbus/request` by a body substring (the method name and, for
//! paged fetches, the offset), traps are served from `/msgbus/trap`.

use logdb_link::{LogDbClient, SessionTimeouts};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method as http_method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Route client logs through the test harness; safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const NONCE: &str = "abc123";
/// `sha1(hex(sha1("password")) + "abc123")`
pub const PASSWORD_HASH: &str = "ad148a4a837d6107bd06a628b2e235ca01c62e8f";

/// Two-element response envelope without error fields.
pub fn response_envelope(method_name: &str, params: Value) -> Value {
    json!([
        {
            "guid": "00000000-0000-0000-0000-000000000001",
            "type": "Response",
            "source": "0",
            "target": "0",
            "method": method_name
        },
        params
    ])
}

/// Response envelope carrying an error code.
pub fn error_envelope(method_name: &str, code: &str, message: &str) -> Value {
    json!([
        {
            "guid": "00000000-0000-0000-0000-000000000001",
            "type": "Response",
            "method": method_name,
            "errorCode": code,
            "errorMessage": message
        },
        {}
    ])
}

/// Pushed trap envelope for a query topic.
pub fn trap_envelope(topic: &str, params: Value) -> Value {
    json!([
        {
            "guid": "00000000-0000-0000-0000-000000000002",
            "type": "Trap",
            "source": "0",
            "target": "0",
            "method": topic
        },
        params
    ])
}

/// Mount an RPC mock matched by a body substring.
pub async fn mount_rpc(server: &MockServer, needle: &str, response: Value) {
    Mock::given(http_method("POST"))
        .and(path("/msgbus/request"))
        .and(body_string_contains(needle))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

/// Mount the hello/login handshake; the hello response pins the cookie.
pub async fn mount_login(server: &MockServer, cookie: &str) {
    Mock::given(http_method("POST"))
        .and(path("/msgbus/request"))
        .and(body_string_contains("LoginPlugin.hello"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(response_envelope(
                    "org.krakenapps.dom.msgbus.LoginPlugin.hello",
                    json!({ "nonce": NONCE }),
                ))
                .insert_header("Set-Cookie", format!("{}; Path=/", cookie).as_str()),
        )
        .mount(server)
        .await;

    mount_rpc(
        server,
        "LoginPlugin.login",
        response_envelope("org.krakenapps.dom.msgbus.LoginPlugin.login", json!({})),
    )
    .await;
}

/// Mount subscribe/unsubscribe acks for the per-query trap topics.
pub async fn mount_subscriptions(server: &MockServer) {
    mount_rpc(
        server,
        "PushPlugin.subscribe",
        response_envelope("org.krakenapps.msgbus.PushPlugin.subscribe", json!({})),
    )
    .await;
    mount_rpc(
        server,
        "PushPlugin.unsubscribe",
        response_envelope("org.krakenapps.msgbus.PushPlugin.unsubscribe", json!({})),
    )
    .await;
}

/// One poll's worth of trap events, delivered after a short delay so
/// the caller has time to register the query, followed by idle polls.
pub async fn mount_traps_once(server: &MockServer, events: Value) {
    Mock::given(http_method("GET"))
        .and(path("/msgbus/trap"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(events)
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    mount_idle_traps(server).await;
}

/// Catch-all long-poll mock answering "no events"; the small delay
/// keeps the re-poll loop from hammering the mock server.
pub async fn mount_idle_traps(server: &MockServer) {
    Mock::given(http_method("GET"))
        .and(path("/msgbus/trap"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(25)),
        )
        .mount(server)
        .await;
}

pub fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

/// Connect with the test credentials ("admin" / "password").
pub async fn connect(server: &MockServer) -> LogDbClient {
    init_logging();
    LogDbClient::builder()
        .host(host_of(server))
        .nick("admin")
        .password("password")
        .timeouts(SessionTimeouts::fast())
        .connect()
        .await
        .expect("connect against mock server")
}

/// Rows `offset .. offset + count` as plain JSON numbers.
pub fn rows(offset: u64, count: u64) -> Value {
    let items: Vec<Value> = (offset..offset + count).map(|i| json!(i)).collect();
    json!(items)
}

/// `getResult` response for one window.
pub fn result_page(offset: u64, count: u64) -> Value {
    response_envelope(
        "org.krakenapps.logdb.msgbus.LogQueryPlugin.getResult",
        json!({ "result": rows(offset, count), "count": count }),
    )
}
