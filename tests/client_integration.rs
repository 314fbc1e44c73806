// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ProxyClient against a running relay.

use kvu_proxy::{ClientError, ProxyClient, normalize_url, validate_url};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{start_proxy, upstream_url};

#[tokio::test]
async fn test_client_reads_pages_and_audio_through_relay() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/war-and-peace"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<title>Война и мир</title>", "text/html; charset=utf-8"),
        )
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/a/01.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0xffu8, 0xfb, 0x90], "audio/mpeg"))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/meta.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"chapters": ["1", "2"]})),
        )
        .mount(&upstream)
        .await;

    let proxy = start_proxy("app", &upstream).await;
    let client = ProxyClient::new(proxy.url("/api/proxy"));

    let html = client
        .fetch_html(&upstream_url(&upstream, "/book/war-and-peace"))
        .await
        .unwrap();
    assert_eq!(html, "<title>Война и мир</title>");

    let audio = client
        .download_file(&upstream_url(&upstream, "/a/01.mp3"))
        .await
        .unwrap();
    assert_eq!(audio.as_ref(), &[0xff, 0xfb, 0x90]);

    let meta: serde_json::Value = client
        .fetch_json(&upstream_url(&upstream, "/meta.json"))
        .await
        .unwrap();
    assert_eq!(meta["chapters"][1], "2");

    proxy.stop().await;
}

#[tokio::test]
async fn test_client_surfaces_relay_errors() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;

    let proxy = start_proxy("function", &upstream).await;
    let client = ProxyClient::new(proxy.url("/api/proxy"));

    match client.fetch_html("https://example.com/book").await {
        Err(ClientError::Proxy { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Only knigavuhe.org URLs are allowed");
        }
        other => panic!("expected forbidden, got {other:?}"),
    }

    match client.fetch_html(&upstream_url(&upstream, "/down")).await {
        Err(ClientError::Proxy { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "Failed to fetch: Service Unavailable");
        }
        other => panic!("expected mirrored 503, got {other:?}"),
    }

    proxy.stop().await;
}

#[test]
fn test_user_typed_links() {
    let typed = "  knigavuhe.org/book/master-i-margarita/ ";
    assert!(validate_url(typed));
    assert_eq!(
        normalize_url(typed),
        "https://knigavuhe.org/book/master-i-margarita"
    );
    assert!(!validate_url("youtube.com/watch?v=knigavuhe"));
}
