// ============================================================================
// Identity and Alias Tests
// ============================================================================
//
// - Registration is idempotent per key
// - Signed alias creation with replay protection
// - Public alias lookup and token-gated alias removal
//
// ============================================================================

use serde_json::{json, Value};

use test_utils::{spawn_app, TestUser};

#[tokio::test]
async fn test_register_same_key_twice_returns_same_identity() {
    let app = spawn_app().await;
    let user = TestUser::new();

    let first: Value = app.register(&user).await.json().await.unwrap();
    let second: Value = app.register(&user).await.json().await.unwrap();

    assert_eq!(first["pubkeyhash"], user.pubkeyhash());
    assert_eq!(first["pubkeyhash"], second["pubkeyhash"]);
    assert_eq!(first["pubkey"], user.armored_key());
    assert_eq!(first["lastNonce"], 0);
}

#[tokio::test]
async fn test_register_rejects_garbage() {
    let app = spawn_app().await;

    let res = app.post_raw("/", "definitely not a key".to_string()).await;
    assert_eq!(res.status(), 400);

    let res = app.post_raw("/", String::new()).await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_alias_creation_rejects_replayed_nonce() {
    let app = spawn_app().await;
    let user = TestUser::new();
    assert_eq!(app.register(&user).await.status(), 200);

    let body = user.sign_with_nonce(json!({ "alias": "alice" }), 5);
    let res = app.post_raw("/aliases", body.clone()).await;
    assert_eq!(res.status(), 200);
    let alias: Value = res.json().await.unwrap();
    assert_eq!(alias["name"], "alice");
    assert_eq!(alias["pubkeyhash"], user.pubkeyhash());

    // Exact replay
    let res = app.post_raw("/aliases", body).await;
    assert_eq!(res.status(), 401);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "Invalid nonce supplied");

    // Same nonce, different payload
    let res = app
        .post_raw(
            "/aliases",
            user.sign_with_nonce(json!({ "alias": "alice2" }), 5),
        )
        .await;
    assert_eq!(res.status(), 401);

    let res = app
        .post_raw(
            "/aliases",
            user.sign_with_nonce(json!({ "alias": "alice" }), 6),
        )
        .await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_alias_creation_requires_valid_signature() {
    let app = spawn_app().await;
    let mut owner = TestUser::new();
    let stranger = TestUser::new();
    assert_eq!(app.register(&owner).await.status(), 200);

    // Unsigned body
    let res = app
        .post_raw("/aliases", json!({ "alias": "x" }).to_string())
        .await;
    assert_eq!(res.status(), 400);

    // Signed by an unregistered key
    let res = app
        .post_raw(
            "/aliases",
            stranger.sign_with_nonce(json!({ "alias": "x" }), 1),
        )
        .await;
    assert_eq!(res.status(), 401);

    // Claims the owner's identity but signed by someone else
    let forged = stranger.sign_claim(&json!({
        "identity": owner.pubkeyhash(),
        "identity_type": "pubkeyhash",
        "nonce": 1,
        "alias": "x",
    }));
    let res = app.post_raw("/aliases", forged).await;
    assert_eq!(res.status(), 401);

    // Missing nonce
    let no_nonce = owner.sign_claim(&json!({
        "identity": owner.pubkeyhash(),
        "identity_type": "pubkeyhash",
        "alias": "x",
    }));
    let res = app.post_raw("/aliases", no_nonce).await;
    assert_eq!(res.status(), 401);

    // Missing parameter
    let res = app.post_signed("/aliases", &mut owner, json!({})).await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_alias_conflict_and_validation() {
    let app = spawn_app().await;
    let mut alice = TestUser::new();
    let mut mallory = TestUser::new();
    app.onboard(&mut alice, "alice").await;
    assert_eq!(app.register(&mallory).await.status(), 200);

    let res = app
        .post_signed("/aliases", &mut mallory, json!({ "alias": "alice" }))
        .await;
    assert_eq!(res.status(), 400);

    let res = app
        .post_signed("/aliases", &mut mallory, json!({ "alias": "has space" }))
        .await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn test_alias_lookup_serves_armored_key() {
    let app = spawn_app().await;
    let mut alice = TestUser::new();
    app.onboard(&mut alice, "alice").await;

    let res = app
        .client
        .get(app.url("/aliases/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), alice.armored_key());

    let res = app
        .client
        .get(app.url("/aliases/nobody"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_alias_removal_with_token() {
    let app = spawn_app().await;
    let mut alice = TestUser::new();
    app.onboard(&mut alice, "alice").await;

    let res = app
        .client
        .delete(app.url("/aliases/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404, "removal without a token must fail");

    let token = app.token(&mut alice, "DELETE", "/aliases/alice").await;
    let res = app
        .client
        .delete(app.url(&format!("/aliases/alice?token={token}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let res = app
        .client
        .get(app.url("/aliases/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}
