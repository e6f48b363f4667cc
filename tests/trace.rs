//! Real captures against local servers.

mod common;

use std::time::Duration;

use oxytrace::config::app_config::setup_tls_connector;
use oxytrace::emitter::Emitter;
use oxytrace::http_probe::prelude::*;
use serde_json::Value;

fn client() -> TraceClient {
    TraceClient::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client")
}

#[tokio::test]
async fn test_delayed_server_timings() {
    let (addr, _heads) = common::delayed_server(Duration::from_millis(50)).await;
    let url = format!("http://{addr}/slow");

    let record = client().capture(&url).await.unwrap();

    let ttfb = record.ttfb.expect("first byte observed");
    assert!(ttfb >= 0.050, "ttfb {ttfb}");
    assert!(record.total >= 0.050, "total {}", record.total);
    assert!(record.total >= ttfb);
    assert!(record.is_ordered(), "{record:?}");
    assert_eq!(record.url, url);
}

#[tokio::test]
async fn test_ip_literal_skips_dns_but_not_connect() {
    let (addr, _heads) = common::delayed_server(Duration::ZERO).await;

    let record = client().capture(&format!("http://{addr}/")).await.unwrap();

    assert_eq!(record.dns_start, None);
    assert_eq!(record.dns_done, None);
    assert_eq!(record.tls_handshake_start, None);
    let get_conn = record.get_conn.unwrap();
    let connect_start = record.connect_start.unwrap();
    let connect_done = record.connect_done.unwrap();
    let got_conn = record.got_conn.unwrap();
    let wrote = record.wrote_request.unwrap();
    let ttfb = record.ttfb.unwrap();
    assert!(0.0 <= get_conn && get_conn <= connect_start);
    assert!(connect_start <= connect_done && connect_done <= got_conn);
    assert!(got_conn <= wrote && wrote <= ttfb && ttfb <= record.total);
}

#[tokio::test]
async fn test_hostname_is_resolved() {
    let (addr, _heads) = common::delayed_server(Duration::ZERO).await;

    let record = client()
        .capture(&format!("http://localhost:{}/", addr.port()))
        .await
        .unwrap();

    let dns_start = record.dns_start.expect("lookup started");
    let dns_done = record.dns_done.expect("lookup finished");
    assert!(dns_start <= dns_done);
    assert!(dns_done <= record.connect_start.unwrap());
    assert!(record.is_ordered());
}

#[tokio::test]
async fn test_request_is_fresh_get_with_close() {
    let (addr, mut heads) = common::delayed_server(Duration::ZERO).await;

    client()
        .capture(&format!("http://{addr}/health?deep=1"))
        .await
        .unwrap();

    let head = heads.recv().await.unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /health?deep=1 http/1.1\r\n"), "{head}");
    assert!(head.contains(&format!("host: {addr}\r\n")), "{head}");
    assert!(head.contains("connection: close\r\n"), "{head}");
    assert!(head.contains("user-agent: oxytrace/"), "{head}");
}

#[tokio::test]
async fn test_back_to_back_polls_are_independent() {
    let (addr, mut heads) = common::delayed_server(Duration::ZERO).await;
    let client = client();
    let url = format!("http://{addr}/");

    let first = client.capture(&url).await.unwrap();
    let second = client.capture(&url).await.unwrap();

    assert!(first.timestamp <= second.timestamp);
    assert!(first.connect_start.is_some() && second.connect_start.is_some());
    // Two requests, two connections.
    assert!(heads.recv().await.is_some());
    assert!(heads.recv().await.is_some());
}

#[tokio::test]
async fn test_refused_connection_becomes_error_line() {
    let outcome: PollOutcome = client().capture("http://127.0.0.1:1").await.into();

    let mut emitter = Emitter::new(Vec::new());
    assert!(emitter.emit(&outcome));

    let line: Value = serde_json::from_slice(emitter.get_ref()).unwrap();
    assert!(line.get("data").is_none());
    let errors = line["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    let detail = errors[0]["detail"].as_str().unwrap();
    assert!(detail.starts_with("dial tcp 127.0.0.1:1"), "{detail}");
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let addr = common::silent_server().await;
    let client = TraceClient::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let err = client.capture(&format!("http://{addr}/")).await.unwrap_err();

    assert!(matches!(err, ProbeError::Timeout(d) if d == Duration::from_millis(300)));
    assert_eq!(err.to_string(), "request timed out after 300ms");
}

#[tokio::test]
async fn test_malformed_url_is_request_error() {
    let outcome: PollOutcome = client().capture("http//missing-colon").await.into();
    match outcome {
        PollOutcome::Failed { detail } => assert!(detail.starts_with("invalid url"), "{detail}"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_is_followed_to_final_response() {
    let (addr, mut heads) = common::redirect_server(Duration::from_millis(100)).await;
    let url = format!("http://{addr}/start");

    let record = client().capture(&url).await.unwrap();

    assert!(heads.recv().await.unwrap().starts_with("GET /start "));
    assert!(heads.recv().await.unwrap().starts_with("GET /final "));
    let ttfb = record.ttfb.expect("first byte of the final hop");
    assert!(ttfb >= 0.100, "ttfb {ttfb}");
    assert!(record.total >= 0.100, "total {}", record.total);
    assert!(record.is_ordered(), "{record:?}");
    assert_eq!(record.url, url);
}

#[tokio::test]
async fn test_redirect_loop_stops_after_ten_requests() {
    let (addr, mut heads) = common::redirect_server(Duration::ZERO).await;

    let err = client()
        .capture(&format!("http://{addr}/loop"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::TooManyRedirects(10)), "{err:?}");
    assert_eq!(err.to_string(), "stopped after 10 redirects");
    let mut requests = 0;
    while heads.try_recv().is_ok() {
        requests += 1;
    }
    assert_eq!(requests, 10);
}

#[tokio::test]
async fn test_tls_handshake_is_timed() {
    let addr = common::tls_server().await;
    let client = TraceClient::builder()
        .tls_connector(setup_tls_connector(true).unwrap())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let record = client
        .capture(&format!("https://127.0.0.1:{}/", addr.port()))
        .await
        .unwrap();

    let connect_done = record.connect_done.unwrap();
    let tls_start = record.tls_handshake_start.expect("handshake started");
    let tls_done = record.tls_handshake_done.expect("handshake finished");
    let got_conn = record.got_conn.unwrap();
    assert!(connect_done <= tls_start && tls_start <= tls_done && tls_done <= got_conn);
    assert!(record.ttfb.is_some());
    assert!(record.is_ordered(), "{record:?}");
}

#[tokio::test]
async fn test_self_signed_certificate_is_rejected_when_verifying() {
    let addr = common::tls_server().await;
    let client = TraceClient::builder()
        .tls_connector(setup_tls_connector(false).unwrap())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let err = client
        .capture(&format!("https://127.0.0.1:{}/", addr.port()))
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::Tls { .. }), "{err:?}");
}
