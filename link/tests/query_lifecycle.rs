//! End-to-end query lifecycle tests: trap-driven completion, cursor
//! pagination and autoclose, against a wiremock msgbus.

mod common;

use common::{
    connect, mount_idle_traps, mount_login, mount_rpc, mount_subscriptions, mount_traps_once,
    response_envelope, result_page, trap_envelope,
};
use logdb_link::{LogDbError, QueryStatus};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method as http_method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_create_query(server: &MockServer, id: u64) {
    mount_rpc(
        server,
        "createQuery",
        response_envelope(
            "org.krakenapps.logdb.msgbus.LogQueryPlugin.createQuery",
            json!({ "id": id }),
        ),
    )
    .await;
}

/// Mount a `getResult` window keyed on its offset; `expect` pins the
/// number of fetches the cursor may issue at that offset.
async fn mount_result_window(server: &MockServer, offset: u64, count: u64, expect: u64) {
    Mock::given(http_method("POST"))
        .and(path("/msgbus/request"))
        .and(body_string_contains("getResult"))
        .and(body_string_contains(format!("\"offset\":{}", offset).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_page(offset, count)))
        .expect(expect)
        .mount(server)
        .await;
}

#[tokio::test]
async fn traps_drive_a_query_to_completion() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_rpc(
        &server,
        "startQuery",
        response_envelope(
            "org.krakenapps.logdb.msgbus.LogQueryPlugin.startQuery",
            json!({}),
        ),
    )
    .await;
    mount_traps_once(
        &server,
        json!([
            trap_envelope("logstorage-query-timeline-7", json!({ "id": 7, "count": 50 })),
            trap_envelope(
                "logstorage-query-7",
                json!({ "id": 7, "type": "eof", "total_count": 120 })
            ),
        ]),
    )
    .await;
    mount_result_window(&server, 0, 50, 1).await;

    let client = connect(&server).await;

    let id = client.create_query("table events").await.expect("create");
    assert_eq!(id, 7);
    assert_eq!(client.query_info(7).unwrap().status, QueryStatus::Created);

    client.start_query(7).await.expect("start");

    let total = client.wait_until(7, None).await.expect("wait for eof");
    assert_eq!(total, 120);

    let info = client.query_info(7).unwrap();
    assert_eq!(info.status, QueryStatus::Ended);
    assert_eq!(info.loaded_count, 120);
    assert_eq!(info.query_string, "table events");

    let page = client.get_result(7, 0, 50).await.expect("first page");
    assert_eq!(page.rows.len(), 50);
    assert_eq!(page.rows[0], json!(0));
    assert_eq!(page.rows[49], json!(49));

    client.close().await;
}

#[tokio::test]
async fn threshold_wait_resolves_on_a_count_update() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_traps_once(
        &server,
        json!([trap_envelope(
            "logstorage-query-timeline-7",
            json!({ "id": 7, "count": 50 })
        )]),
    )
    .await;

    let client = connect(&server).await;
    client.create_query("table events").await.expect("create");

    let count = client
        .wait_until_timeout(7, Some(30), Duration::from_secs(5))
        .await
        .expect("woken by the count=50 update");
    assert!(count >= 30, "got {}", count);

    // Already satisfied: must resolve without another trap.
    let again = client
        .wait_until_timeout(7, Some(30), Duration::from_secs(1))
        .await
        .expect("no missed wakeup for a late registration");
    assert!(again >= 30);

    client.close().await;
}

#[tokio::test]
async fn wait_until_timeout_expires_without_traps() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_idle_traps(&server).await;

    let client = connect(&server).await;
    client.create_query("table events").await.expect("create");

    let err = client
        .wait_until_timeout(7, None, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, LogDbError::TimeoutError(_)), "got {:?}", err);

    client.close().await;
}

#[tokio::test]
async fn cursor_pages_through_fixed_windows() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_idle_traps(&server).await;
    mount_result_window(&server, 0, 1000, 1).await;
    mount_result_window(&server, 1000, 1000, 1).await;
    mount_result_window(&server, 2000, 1000, 1).await;

    let client = connect(&server).await;
    client.create_query("table events").await.expect("create");

    let cursor = client.open_cursor(7, 0, 2500, false).expect("open");
    let rows = cursor.collect().await.expect("collect");

    assert_eq!(rows.len(), 2500);
    assert_eq!(rows[0], json!(0));
    assert_eq!(rows[999], json!(999));
    assert_eq!(rows[1000], json!(1000));
    assert_eq!(rows[2499], json!(2499));

    client.close().await;
}

#[tokio::test]
async fn cursor_stops_at_a_short_window() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_idle_traps(&server).await;
    mount_result_window(&server, 0, 1000, 1).await;
    // Second window is short: iteration must stop there, far below the
    // requested limit, and no third fetch may be issued.
    mount_result_window(&server, 1000, 700, 1).await;

    let client = connect(&server).await;
    client.create_query("table events").await.expect("create");

    let cursor = client.open_cursor(7, 0, 2500, false).expect("open");
    let rows = cursor.collect().await.expect("collect");

    assert_eq!(rows.len(), 1700);
    assert_eq!(rows[1699], json!(1699));

    client.close().await;
}

#[tokio::test]
async fn autoclose_removes_the_query_exactly_once() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_idle_traps(&server).await;
    mount_result_window(&server, 0, 5, 1).await;

    Mock::given(http_method("POST"))
        .and(path("/msgbus/request"))
        .and(body_string_contains("removeQuery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_envelope(
            "org.krakenapps.logdb.msgbus.LogQueryPlugin.removeQuery",
            json!({}),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = connect(&server).await;
    client.create_query("table events").await.expect("create");

    let cursor = client.open_cursor(7, 0, 5, true).expect("open");
    let rows = cursor.collect().await.expect("collect");
    assert_eq!(rows.len(), 5);

    // The registry entry is gone; the guard fires before any RPC.
    let err = client.remove_query(7).await.unwrap_err();
    assert!(matches!(err, LogDbError::QueryNotFound(7)), "got {:?}", err);

    client.close().await;
}

#[tokio::test]
async fn removing_the_query_unblocks_a_pending_waiter() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_idle_traps(&server).await;
    mount_rpc(
        &server,
        "removeQuery",
        response_envelope(
            "org.krakenapps.logdb.msgbus.LogQueryPlugin.removeQuery",
            json!({}),
        ),
    )
    .await;

    let client = connect(&server).await;
    client.create_query("table events").await.expect("create");

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_until(7, None).await })
    };
    // Let the waiter register before the query disappears.
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.remove_query(7).await.expect("remove");

    let outcome = waiter.await.expect("waiter task");
    assert!(
        matches!(outcome, Err(LogDbError::QueryNotFound(7))),
        "got {:?}",
        outcome
    );

    client.close().await;
}

#[tokio::test]
async fn lifecycle_calls_guard_against_unknown_ids() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_idle_traps(&server).await;

    let client = connect(&server).await;

    assert!(matches!(
        client.start_query(42).await.unwrap_err(),
        LogDbError::QueryNotFound(42)
    ));
    assert!(matches!(
        client.stop_query(42).await.unwrap_err(),
        LogDbError::QueryNotFound(42)
    ));
    assert!(matches!(
        client.remove_query(42).await.unwrap_err(),
        LogDbError::QueryNotFound(42)
    ));
    assert!(matches!(
        client.get_result(42, 0, 10).await.unwrap_err(),
        LogDbError::QueryNotFound(42)
    ));
    assert!(matches!(
        client.open_cursor(42, 0, 10, false).unwrap_err(),
        LogDbError::QueryNotFound(42)
    ));

    client.close().await;
}

#[tokio::test]
async fn one_shot_query_returns_an_autoclosing_cursor() {
    let server = MockServer::start().await;
    mount_login(&server, "SID=one").await;
    mount_subscriptions(&server).await;
    mount_create_query(&server, 7).await;
    mount_rpc(
        &server,
        "startQuery",
        response_envelope(
            "org.krakenapps.logdb.msgbus.LogQueryPlugin.startQuery",
            json!({}),
        ),
    )
    .await;
    mount_rpc(
        &server,
        "removeQuery",
        response_envelope(
            "org.krakenapps.logdb.msgbus.LogQueryPlugin.removeQuery",
            json!({}),
        ),
    )
    .await;
    mount_traps_once(
        &server,
        json!([trap_envelope(
            "logstorage-query-7",
            json!({ "id": 7, "type": "eof", "total_count": 42 })
        )]),
    )
    .await;
    mount_result_window(&server, 0, 42, 1).await;

    let client = connect(&server).await;

    let cursor = client.query("table events").await.expect("one-shot query");
    let rows = cursor.collect().await.expect("collect");
    assert_eq!(rows.len(), 42);

    // Autoclose already removed the query.
    assert!(client.queries().is_empty());

    client.close().await;
}
