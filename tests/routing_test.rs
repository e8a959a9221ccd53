// ============================================================================
// Routing and Middleware Tests
// ============================================================================
//
// - Content storage by key
// - 404 for unknown paths, 501 for unsupported methods on known paths
// - HTTPS redirect
// - Health and metrics
//
// ============================================================================

use muttr_pod::config::Config;
use serde_json::Value;

use test_utils::{spawn_app, spawn_app_with, POD_HOST};

#[tokio::test]
async fn test_store_and_fetch_content() {
    let app = spawn_app().await;
    let blob = b"opaque ciphertext".to_vec();

    let res = app
        .client
        .post(app.url("/messages"))
        .body(blob.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let stored: Value = res.json().await.unwrap();
    let key = stored["key"].as_str().unwrap().to_string();
    assert_eq!(key, muttr_crypto::content_key(&blob));

    let res = app
        .client
        .get(app.url(&format!("/messages/{key}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.bytes().await.unwrap().to_vec(), blob);

    let res = app
        .client
        .get(app.url(&format!("/messages/{}", "0".repeat(40))))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = app
        .client
        .get(app.url("/messages/not-a-key"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_empty_content_is_rejected() {
    let app = spawn_app().await;
    let res = app.post_raw("/messages", String::new()).await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = spawn_app().await;

    let res = app.client.get(app.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Resource Not Found");
}

#[tokio::test]
async fn test_unsupported_method_is_not_implemented() {
    let app = spawn_app().await;

    let res = app.client.put(app.url("/aliases")).send().await.unwrap();
    assert_eq!(res.status(), 501);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Not Implemented");

    let res = app.client.get(app.url("/tokens")).send().await.unwrap();
    assert_eq!(res.status(), 501);

    let res = app.client.patch(app.url("/inboxes")).send().await.unwrap();
    assert_eq!(res.status(), 501);
}

#[tokio::test]
async fn test_force_https_redirects_plain_requests() {
    let mut config = Config::local(POD_HOST);
    config.force_https = true;
    let app = spawn_app_with(config).await;

    let res = app
        .client
        .get(app.url("/aliases/alice?x=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(
        res.headers()["location"],
        format!("https://{}/aliases/alice?x=1", app.address).as_str()
    );

    let res = app
        .client
        .get(app.url("/health"))
        .header("X-Forwarded-Proto", "https")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = spawn_app().await;

    let res = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "OK");

    // A rejected token is counted before the response goes out
    let res = app
        .client
        .get(app.url("/inboxes?token=missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = app.client.get(app.url("/metrics")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let text = res.text().await.unwrap();
    assert!(text.contains("muttr_auth_failures_total{reason=\"token\"}"));
}
