//! End-to-end account lifecycle through the public crate API.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use portero::{
    auth::{AuthConfig, AuthError, AuthService, PasswordHasher, UserQuery},
    portero::app,
    store::{MemoryBlacklist, MemoryResetStore, MemoryUserStore, Role, Stores, UserStore as _},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret-integration-xx";

fn service() -> Result<(Arc<AuthService>, Arc<MemoryUserStore>)> {
    let users = Arc::new(MemoryUserStore::default());
    let stores = Stores {
        users: users.clone(),
        blacklist: Arc::new(MemoryBlacklist::default()),
        resets: Arc::new(MemoryResetStore::new(users.clone())),
    };
    let service = AuthService::new(
        stores,
        SecretString::from(SECRET.to_string()),
        AuthConfig::default(),
    )
    .with_hasher(PasswordHasher::with_params(1024, 1, 1)?);
    Ok((Arc::new(service), users))
}

#[tokio::test]
async fn account_lifecycle() -> Result<()> {
    let (auth, users) = service()?;

    let account = auth
        .register("Grace", "Grace@Example.com", "firstpassw0rd")
        .await?;
    assert_eq!(account.email, "grace@example.com");
    assert_eq!(account.role, Role::User);

    let token = auth.login("grace@example.com", "firstpassw0rd").await?;
    let profile = auth.get_profile(Some(&token)).await?;
    assert_eq!(profile.id, account.id);

    auth.update_profile(Some(&token), "Grace H", "grace.h@example.com")
        .await?;
    let profile = auth.get_profile(Some(&token)).await?;
    assert_eq!(profile.name, "Grace H");
    assert_eq!(profile.email, "grace.h@example.com");

    let reset = auth.request_password_reset("grace.h@example.com").await?;
    auth.reset_password(&reset, "secondpassw0rd").await?;
    assert!(matches!(
        auth.reset_password(&reset, "thirdpassw0rd").await,
        Err(AuthError::InvalidOrExpiredToken)
    ));
    assert!(matches!(
        auth.login("grace.h@example.com", "firstpassw0rd").await,
        Err(AuthError::BadCredentials)
    ));
    let token = auth.login("grace.h@example.com", "secondpassw0rd").await?;

    auth.delete_profile(Some(&token)).await?;
    assert!(users.find_active_by_id(account.id).await?.is_none());
    assert!(matches!(
        auth.login("grace.h@example.com", "secondpassw0rd").await,
        Err(AuthError::BadCredentials)
    ));

    // The address is free again once the account is gone.
    auth.register("Grace", "grace.h@example.com", "anotherpassw0rd")
        .await?;
    Ok(())
}

#[tokio::test]
async fn admin_sees_only_active_accounts() -> Result<()> {
    let (auth, users) = service()?;

    let admin = auth
        .register("Root", "root@example.com", "rootpassw0rd")
        .await?;
    assert!(users.set_role(admin.id, Role::Admin));
    let admin_token = auth.login("root@example.com", "rootpassw0rd").await?;

    auth.register("Alan", "alan@example.com", "alanpassw0rd")
        .await?;
    auth.register("Edsger", "edsger@example.com", "edsgerpassw0rd")
        .await?;
    let edsger = auth.login("edsger@example.com", "edsgerpassw0rd").await?;
    auth.delete_profile(Some(&edsger)).await?;

    let listing = auth.list_users(Some(&admin_token), UserQuery::default()).await?;
    assert_eq!(listing.total, 2);
    assert!(listing
        .users
        .iter()
        .all(|user| user.email != "edsger@example.com"));

    let alan = auth.login("alan@example.com", "alanpassw0rd").await?;
    assert!(matches!(
        auth.list_users(Some(&alan), UserQuery::default()).await,
        Err(AuthError::PermissionDenied)
    ));
    Ok(())
}

async fn post(
    router: &axum::Router,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string()))?)
        .await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, json))
}

#[tokio::test]
async fn http_session_is_revoked_by_logout() -> Result<()> {
    let (auth, _) = service()?;
    let router = app(auth);

    let (status, _) = post(
        &router,
        "/v1/register",
        None,
        json!({"name": "Ada", "email": "ada@example.com", "password": "longpassw0rd"}),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post(
        &router,
        "/v1/login",
        None,
        json!({"email": "ada@example.com", "password": "longpassw0rd"}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"]
        .as_str()
        .context("access_token missing")?
        .to_string();

    let me = |token: &str| {
        Request::builder()
            .uri("/v1/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
    };

    let response = router.clone().oneshot(me(&token)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = post(&router, "/v1/logout", Some(&token), json!({})).await?;
    assert_eq!(status, StatusCode::OK);

    let response = router.clone().oneshot(me(&token)?).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
