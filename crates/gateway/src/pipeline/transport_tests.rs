// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::extract::RawQuery;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::*;
use crate::test_support::ensure_crypto_provider;

#[test]
fn url_joins_base_and_path() -> anyhow::Result<()> {
    ensure_crypto_provider();
    for (base, path, expected) in [
        ("http://remote/api/v1/", "/events", "http://remote/api/v1/events"),
        ("http://remote/api/v1", "events", "http://remote/api/v1/events"),
        ("http://remote//", "/a", "http://remote/a"),
    ] {
        let transport = HttpTransport::new(base, Duration::from_secs(1))?;
        assert_eq!(transport.url(path), expected, "base {base:?} path {path:?}");
    }
    Ok(())
}

async fn echo(RawQuery(query): RawQuery, headers: HeaderMap) -> Json<Value> {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok()).map(str::to_owned);
    Json(json!({ "query": query, "content_type": content_type }))
}

#[tokio::test]
async fn sends_query_and_default_content_type() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, Router::new().route("/echo", get(echo))).await.ok();
    });

    let transport = HttpTransport::new(&format!("http://{addr}/"), Duration::from_secs(5))?;
    let resp = transport.execute(&ApiRequest::get("/echo").query("page", "2")).await?;

    assert_eq!(resp.status, 200);
    let body: Value = resp.json()?;
    assert_eq!(body["query"], "page=2");
    assert_eq!(body["content_type"], "application/json");
    Ok(())
}

#[tokio::test]
async fn unreachable_remote_is_a_transport_error() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let transport = HttpTransport::new(&format!("http://{addr}"), Duration::from_secs(5))?;
    let result = transport.execute(&ApiRequest::get("/echo")).await;

    assert!(matches!(result, Err(ApiError::Transport(_))));
    Ok(())
}

#[test]
fn base_url_drops_trailing_slashes() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let transport = HttpTransport::new("http://remote/api/v1//", Duration::from_secs(1))?;
    assert_eq!(transport.base_url(), "http://remote/api/v1");
    Ok(())
}
