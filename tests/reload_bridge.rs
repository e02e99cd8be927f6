//! End-to-end reload behaviour over a real socket.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reload_proxy::bridge::{DeliveryOutcome, IncomingRequest};
use reload_proxy::config::DeliveryStrategy;

use common::{config, error_code, post, start, wait_for_pending, PollingHost, PING, PONG};

#[tokio::test(flavor = "multi_thread")]
async fn callback_host_answers_ping() {
    let (server, addr) = start(config(DeliveryStrategy::Callback, 5_000));
    server
        .bridge()
        .register_handler(Some(Arc::new(|request: IncomingRequest| {
            request.respond(PONG);
        })));

    let (status, body) = post(addr, PING).await;
    assert_eq!(status, 200);
    assert_eq!(body, PONG);
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn polling_host_answers_ping() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 5_000));
    let host = PollingHost::spawn(server.bridge(), common::pong);

    let (status, body) = post(addr, PING).await;
    assert_eq!(status, 200);
    assert_eq!(body, PONG);

    drop(host);
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_host_times_out_with_exact_envelope() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 300));

    let started = Instant::now();
    let (status, body) = post(addr, PING).await;
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Timed out waiting for the host to become ready."},"id":1}"#
    );
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn request_survives_a_host_reload() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 5_000));
    let bridge = server.bridge();

    let call = tokio::spawn(post(addr, PING));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!call.is_finished(), "request should be held while the host is away");

    let host = PollingHost::spawn(Arc::clone(&bridge), common::pong);
    let (status, body) = call.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, PONG);

    drop(host);
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_mid_flight_interrupts_quickly() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 30_000));
    let bridge = server.bridge();
    bridge.set_ready(true);

    let call = tokio::spawn(post(addr, r#"{"jsonrpc":"2.0","method":"slow","id":"r-1"}"#));
    let pending = {
        let bridge = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || wait_for_pending(&bridge))
            .await
            .unwrap()
    };

    let started = Instant::now();
    bridge.set_ready(false);
    let (status, body) = call.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Request interrupted by host reset. Please retry."},"id":"r-1"}"#
    );

    // The host comes back and answers the stale request: nobody gets it.
    bridge.set_ready(true);
    assert_eq!(pending.respond(PONG), DeliveryOutcome::Discarded);
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn late_reply_goes_nowhere_and_next_request_gets_its_own() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 300));
    let bridge = server.bridge();
    bridge.set_ready(true);

    let first = tokio::spawn(post(addr, r#"{"id":1}"#));
    let stale = {
        let bridge = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || wait_for_pending(&bridge))
            .await
            .unwrap()
    };
    let (_, body) = first.await.unwrap();
    assert_eq!(error_code(&body), -32000);
    assert!(body.contains("Request processing timed out."));

    assert_eq!(stale.respond(r#"{"id":1,"result":"late"}"#), DeliveryOutcome::Discarded);

    let second = tokio::spawn(post(addr, r#"{"id":2}"#));
    let fresh = {
        let bridge = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || wait_for_pending(&bridge))
            .await
            .unwrap()
    };
    fresh.respond(r#"{"id":2,"result":"fresh"}"#);
    let (_, body) = second.await.unwrap();
    assert_eq!(body, r#"{"id":2,"result":"fresh"}"#);
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_callers_are_serialized() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 5_000));
    let host = PollingHost::spawn(server.bridge(), |request: &IncomingRequest| {
        std::thread::sleep(Duration::from_millis(20));
        request.body().to_string()
    });

    let bodies = [r#"{"id":1}"#, r#"{"id":2}"#, r#"{"id":3}"#, r#"{"id":4}"#];
    let calls: Vec<_> = bodies.iter().map(|&body| tokio::spawn(post(addr, body))).collect();
    for (call, body) in calls.into_iter().zip(bodies) {
        let (status, reply) = call.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(reply, body, "each caller gets the reply to its own request");
    }

    drop(host);
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_answers_waiting_requests_with_shutdown() {
    let (server, addr) = start(config(DeliveryStrategy::Polling, 30_000));

    let call = tokio::spawn(post(addr, PING));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let server = tokio::task::spawn_blocking(move || {
        server.stop();
        server
    })
    .await
    .unwrap();
    let (status, body) = call.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Server is shutting down."},"id":1}"#
    );
    assert!(!server.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_host_reply_becomes_internal_error() {
    let mut cfg = config(DeliveryStrategy::Callback, 5_000);
    cfg.bridge.max_response_bytes = 1024;
    let (server, addr) = start(cfg);
    server
        .bridge()
        .register_handler(Some(Arc::new(|request: IncomingRequest| {
            request.respond("x".repeat(4096));
        })));

    let (status, body) = post(addr, PING).await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error: Response too large"},"id":1}"#
    );
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_that_never_replies_is_interrupted() {
    let (server, addr) = start(config(DeliveryStrategy::Callback, 5_000));
    server
        .bridge()
        .register_handler(Some(Arc::new(|_request: IncomingRequest| {})));

    let (status, body) = post(addr, r#"{"jsonrpc":"2.0","method":"x","id":null}"#).await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Request interrupted by host reset. Please retry."},"id":null}"#
    );
    server.stop();
}
