//! HTTP surface of the reference host.
//!
//! Every route except `/health` and `/onboarding/*` runs inside the tenant
//! resolved from the request host. Onboarding acts on behalf of the caller
//! named by `x-subject-id` / `x-subject-kind`.
//!
//! # Security
//!
//! These headers are plain client input. Anyone who can reach the listener
//! directly can claim to be a platform admin. They are only honoured when
//! `server.trust_subject_headers` is enabled, and that flag must only be set
//! when the server sits behind an authenticating proxy that strips any
//! client-supplied `x-subject-*` and `x-forwarded-for` headers and sets its
//! own. With the flag off (the default) every onboarding call is refused
//! with 401.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, FromRequestParts, Path, State},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use http::{StatusCode, Uri, request::Parts};
use sea_orm::ActiveValue::{NotSet, Set};
use serde::Deserialize;
use tenancy_db::{AccessError, TenantGuard};
use tenancy_security::{Subject, SubjectKind, Tenant};
use tenant_resolver::{
    NewTenant, OnboardingMonitor, Problem, TenancyModule, TenantProvisioning,
    tenant_context_middleware,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::notes;

pub const SUBJECT_ID_HEADER: &str = "x-subject-id";
pub const SUBJECT_KIND_HEADER: &str = "x-subject-kind";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Clone)]
struct AppState {
    guard: TenantGuard,
    provisioning: TenantProvisioning,
    onboarding: Arc<OnboardingMonitor>,
    trust_subject_headers: bool,
}

/// Build the application router over `guard` and the tenancy services.
///
/// `trust_subject_headers` enables the identity headers described in the
/// module docs.
#[must_use]
pub fn router(guard: TenantGuard, module: &TenancyModule, trust_subject_headers: bool) -> Router {
    if trust_subject_headers {
        tracing::warn!("trusting x-subject-* headers; an authenticating proxy must strip client copies");
    }
    let state = AppState {
        guard,
        provisioning: module.provisioning.clone(),
        onboarding: Arc::clone(&module.onboarding),
        trust_subject_headers,
    };

    Router::new()
        .route("/health", get(health))
        .route("/whoami", get(whoami))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", get(get_note).delete(delete_note))
        .route("/onboarding/tenants", post(create_tenant))
        .route("/onboarding/tenants/{key}/activate", post(activate_tenant))
        .route("/onboarding/tenants/{key}/suspend", post(suspend_tenant))
        .with_state(state)
        .layer(from_fn_with_state(
            Arc::clone(&module.resolver),
            tenant_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Caller identity taken from the authentication headers.
#[derive(Debug, Clone)]
struct Caller(Subject);

impl FromRequestParts<AppState> for Caller {
    type Rejection = Problem;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthenticated = |detail: &str| {
            Problem::new(StatusCode::UNAUTHORIZED, "Unauthenticated", detail)
                .with_code("UNAUTHENTICATED")
                .with_instance(parts.uri.path())
        };
        if !state.trust_subject_headers {
            tracing::debug!("subject headers ignored, trust_subject_headers is off");
            return Err(unauthenticated("caller identity is not accepted on this listener"));
        }
        let invalid = || unauthenticated("missing or invalid subject headers");
        let id = header(parts, SUBJECT_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(invalid)?;
        let kind: SubjectKind = header(parts, SUBJECT_KIND_HEADER)
            .and_then(|v| serde_json::from_value(serde_json::Value::from(v)).ok())
            .ok_or_else(invalid)?;
        Ok(Self(Subject::new(id, kind)))
    }
}

/// Where an onboarding attempt came from: the first `x-forwarded-for` hop
/// behind a trusted proxy, otherwise the peer address.
#[derive(Debug, Clone)]
struct ClientAddr(String);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = header(parts, FORWARDED_FOR_HEADER)
            .filter(|_| state.trust_subject_headers)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let addr = match forwarded {
            Some(hop) => hop.to_owned(),
            None => parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map_or_else(|| "unknown".to_owned(), |ci| ci.0.ip().to_string()),
        };
        Ok(Self(addr))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn access_problem(err: &AccessError, instance: &str) -> Problem {
    let (status, title, code) = match err {
        AccessError::NotFound => (StatusCode::NOT_FOUND, "Not Found", "NOT_FOUND"),
        AccessError::ScopedUniquenessViolation { .. } => {
            (StatusCode::CONFLICT, "Conflict", "DUPLICATE_IN_TENANT")
        }
        AccessError::TenantMismatch { .. } => {
            (StatusCode::FORBIDDEN, "Tenant Mismatch", "TENANT_MISMATCH")
        }
        AccessError::Invalid(_) => (StatusCode::BAD_REQUEST, "Bad Request", "INVALID_ACCESS"),
        AccessError::NoTenantContext { .. } | AccessError::Db(_) => {
            tracing::error!(error = %err, "data access failed");
            return Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "request could not be completed",
            )
            .with_code("INTERNAL")
            .with_instance(instance);
        }
    };
    Problem::new(status, title, err.to_string())
        .with_code(code)
        .with_instance(instance)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn whoami(Extension(tenant): Extension<Tenant>) -> Json<Tenant> {
    Json(tenant)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NewNote {
    title: String,
    #[serde(default)]
    body: String,
}

async fn list_notes(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<Vec<notes::Model>>, Problem> {
    state
        .guard
        .list::<notes::Entity>()
        .await
        .map(Json)
        .map_err(|e| access_problem(&e, uri.path()))
}

async fn create_note(
    State(state): State<AppState>,
    uri: Uri,
    Json(req): Json<NewNote>,
) -> Result<impl IntoResponse, Problem> {
    let am = notes::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: NotSet,
        title: Set(req.title),
        body: Set(req.body),
    };
    let note = state
        .guard
        .create::<notes::Entity>(am)
        .await
        .map_err(|e| access_problem(&e, uri.path()))?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(state): State<AppState>,
    uri: Uri,
    Path(id): Path<Uuid>,
) -> Result<Json<notes::Model>, Problem> {
    state
        .guard
        .get::<notes::Entity>(id)
        .await
        .map(Json)
        .map_err(|e| access_problem(&e, uri.path()))
}

async fn delete_note(
    State(state): State<AppState>,
    uri: Uri,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Problem> {
    state
        .guard
        .delete::<notes::Entity>(id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|e| access_problem(&e, uri.path()))
}

async fn create_tenant(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    caller: Result<Caller, Problem>,
    uri: Uri,
    Json(req): Json<NewTenant>,
) -> Result<impl IntoResponse, Problem> {
    let outcome = match caller {
        Ok(Caller(subject)) => state
            .provisioning
            .create_tenant(&subject, req)
            .await
            .map_err(|e| Problem::from_provisioning_error(&e, uri.path())),
        Err(rejected) => Err(rejected),
    };
    state.onboarding.record(&source, outcome.is_ok()).await;
    Ok((StatusCode::CREATED, Json(outcome?)))
}

async fn activate_tenant(
    State(state): State<AppState>,
    Caller(subject): Caller,
    uri: Uri,
    Path(key): Path<String>,
) -> Result<Json<Tenant>, Problem> {
    state
        .provisioning
        .activate(&subject, &key)
        .await
        .map(Json)
        .map_err(|e| Problem::from_provisioning_error(&e, uri.path()))
}

async fn suspend_tenant(
    State(state): State<AppState>,
    Caller(subject): Caller,
    uri: Uri,
    Path(key): Path<String>,
) -> Result<Json<Tenant>, Problem> {
    state
        .provisioning
        .suspend(&subject, &key)
        .await
        .map(Json)
        .map_err(|e| Problem::from_provisioning_error(&e, uri.path()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, header};
    use http_body_util::BodyExt;
    use tenancy_db::{Db, DbConfig};
    use tenant_resolver::TenancyConfig;
    use tower::ServiceExt;

    async fn app_with(trust_subject_headers: bool) -> (Router, TenancyModule) {
        let db = Db::connect(&DbConfig::default()).await.unwrap();
        db.migrate().await.unwrap();
        db.register_entity::<notes::Entity>().await.unwrap();
        let module = TenancyModule::new(&db, &TenancyConfig::default());
        (router(db.guard(), &module, trust_subject_headers), module)
    }

    async fn app() -> Router {
        app_with(true).await.0
    }

    fn request(method: &str, host: &str, path: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, host);
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn as_admin(mut req: Request<Body>) -> Request<Body> {
        let headers = req.headers_mut();
        headers.insert(SUBJECT_ID_HEADER, Uuid::new_v4().to_string().parse().unwrap());
        headers.insert(SUBJECT_KIND_HEADER, "platform_admin".parse().unwrap());
        req
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn onboard(app: &Router, key: &str) {
        let body = serde_json::json!({ "key": key, "name": format!("{key} shop") });
        let (status, _) = send(
            app,
            as_admin(request("POST", "example.com", "/onboarding/tenants", Some(body))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let path = format!("/onboarding/tenants/{key}/activate");
        let (status, tenant) = send(app, as_admin(request("POST", "example.com", &path, None))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tenant["status"], "active");
    }

    #[tokio::test]
    async fn notes_stay_inside_their_tenant() {
        let app = app().await;
        onboard(&app, "acme").await;
        onboard(&app, "globex").await;

        let (status, note) = send(
            &app,
            request(
                "POST",
                "acme.example.com",
                "/notes",
                Some(serde_json::json!({ "title": "launch", "body": "soon" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = note["id"].as_str().unwrap().to_owned();

        let (_, acme) = send(&app, request("GET", "acme.example.com", "/notes", None)).await;
        assert_eq!(acme.as_array().unwrap().len(), 1);
        let (_, globex) = send(&app, request("GET", "globex.example.com", "/notes", None)).await;
        assert_eq!(globex.as_array().unwrap().len(), 0);

        let path = format!("/notes/{id}");
        let (status, problem) = send(&app, request("GET", "globex.example.com", &path, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(problem["code"], "NOT_FOUND");
        let (status, _) = send(&app, request("DELETE", "globex.example.com", &path, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, request("GET", "acme.example.com", &path, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_title_conflicts_only_within_a_tenant() {
        let app = app().await;
        onboard(&app, "acme").await;
        onboard(&app, "globex").await;
        let body = serde_json::json!({ "title": "roadmap" });

        for host in ["acme.example.com", "globex.example.com"] {
            let (status, _) = send(&app, request("POST", host, "/notes", Some(body.clone()))).await;
            assert_eq!(status, StatusCode::CREATED, "{host}");
        }
        let (status, problem) = send(
            &app,
            request("POST", "acme.example.com", "/notes", Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(problem["code"], "DUPLICATE_IN_TENANT");
    }

    #[tokio::test]
    async fn whoami_reports_the_resolved_tenant() {
        let app = app().await;
        onboard(&app, "acme").await;
        let (status, tenant) = send(&app, request("GET", "acme.example.com:8087", "/whoami", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tenant["key"], "acme");
    }

    #[tokio::test]
    async fn unknown_and_suspended_tenants_are_refused() {
        let app = app().await;
        onboard(&app, "acme").await;
        let (status, problem) = send(&app, request("GET", "ghost.example.com", "/notes", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(problem["code"], "UNKNOWN_TENANT");

        let (status, _) = send(
            &app,
            as_admin(request("POST", "example.com", "/onboarding/tenants/acme/suspend", None)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, problem) = send(&app, request("GET", "acme.example.com", "/notes", None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(problem["code"], "TENANT_SUSPENDED");
    }

    #[tokio::test]
    async fn onboarding_requires_a_platform_admin() {
        let app = app().await;
        let body = serde_json::json!({ "key": "acme", "name": "Acme" });

        let (status, problem) = send(
            &app,
            request("POST", "example.com", "/onboarding/tenants", Some(body.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(problem["code"], "UNAUTHENTICATED");

        let mut req = request("POST", "example.com", "/onboarding/tenants", Some(body));
        req.headers_mut()
            .insert(SUBJECT_ID_HEADER, Uuid::new_v4().to_string().parse().unwrap());
        req.headers_mut()
            .insert(SUBJECT_KIND_HEADER, "tenant_user".parse().unwrap());
        let (status, problem) = send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(problem["code"], "UNAUTHORIZED_ESCAPE");
    }

    #[tokio::test]
    async fn reserved_key_cannot_be_onboarded() {
        let app = app().await;
        let body = serde_json::json!({ "key": "admin", "name": "Sneaky" });
        let (status, problem) = send(
            &app,
            as_admin(request("POST", "example.com", "/onboarding/tenants", Some(body))),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(problem["code"], "INVALID_TENANT_KEY");
    }

    #[tokio::test]
    async fn subject_headers_are_ignored_unless_trusted() {
        let (app, _) = app_with(false).await;
        let body = serde_json::json!({ "key": "acme", "name": "Acme" });
        let (status, problem) = send(
            &app,
            as_admin(request("POST", "example.com", "/onboarding/tenants", Some(body))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(problem["code"], "UNAUTHENTICATED");

        let (status, _) = send(
            &app,
            as_admin(request("POST", "example.com", "/onboarding/tenants/acme/activate", None)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn failed_onboarding_attempts_are_counted_per_client() {
        let (app, module) = app_with(true).await;
        let from = |req: Request<Body>| {
            let mut req = as_admin(req);
            req.headers_mut()
                .insert(FORWARDED_FOR_HEADER, "203.0.113.9, 10.0.0.1".parse().unwrap());
            req
        };

        for _ in 0..5 {
            let body = serde_json::json!({ "key": "admin", "name": "Sneaky" });
            let (status, _) = send(
                &app,
                from(request("POST", "example.com", "/onboarding/tenants", Some(body))),
            )
            .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        }
        assert_eq!(module.onboarding.failures("203.0.113.9").await, 5);
        assert_eq!(module.onboarding.failures("10.0.0.1").await, 0);

        let body = serde_json::json!({ "key": "acme", "name": "Acme" });
        let (status, _) = send(
            &app,
            from(request("POST", "example.com", "/onboarding/tenants", Some(body))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(module.onboarding.failures("203.0.113.9").await, 0);
    }

    #[tokio::test]
    async fn rejected_callers_count_against_the_peer_address() {
        let (app, module) = app_with(false).await;
        let body = serde_json::json!({ "key": "acme", "name": "Acme" });
        let mut req = as_admin(request("POST", "example.com", "/onboarding/tenants", Some(body)));
        req.headers_mut()
            .insert(FORWARDED_FOR_HEADER, "203.0.113.9".parse().unwrap());
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 40_000))));

        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        // the forwarded hop is not believed without a trusted proxy
        assert_eq!(module.onboarding.failures("192.0.2.1").await, 1);
        assert_eq!(module.onboarding.failures("203.0.113.9").await, 0);
    }
}
