//! Axum middleware binding the resolved tenant around each request.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/products", get(list_products))
//!     .layer(axum::middleware::from_fn_with_state(
//!         resolver.clone(),
//!         tenant_context_middleware,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::header;
use tenancy_security::context;
use tracing::Instrument;

use crate::api::problem::Problem;
use crate::domain::resolver::{InboundRequest, Resolution, TenantResolver};

/// Resolve the tenant and run the rest of the stack inside its context.
///
/// On success the [`Tenant`](tenancy_security::Tenant) is also inserted into
/// request extensions. Exempt routes run with an explicit "no tenant"
/// binding. Everything the handler logs carries a `tenant` span with the
/// tenant id and key, or `tenant = "none"` on exempt routes. Resolution
/// failures short-circuit with a problem response; the handler never runs.
pub async fn tenant_context_middleware(
    State(resolver): State<Arc<TenantResolver>>,
    mut req: Request,
    next: Next,
) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(http::uri::Authority::as_str))
        .unwrap_or_default()
        .to_owned();
    let path = req.uri().path().to_owned();

    let inbound = InboundRequest {
        host: &host,
        path: &path,
    };
    match resolver.resolve(&inbound).await {
        Ok(Resolution::Tenant(tenant)) => {
            let span = tracing::info_span!("tenant", tenant_id = %tenant.id, tenant_key = %tenant.key);
            req.extensions_mut().insert(tenant.clone());
            context::bind(Some(tenant), next.run(req))
                .instrument(span)
                .await
        }
        Ok(Resolution::Exempt) => {
            context::bind(None, next.run(req))
                .instrument(tracing::info_span!("tenant", tenant = "none"))
                .await
        }
        Err(e) => Problem::from_resolve_error(&e, &path).into_response(),
    }
}
