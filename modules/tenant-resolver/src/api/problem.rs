//! RFC 9457 problem responses for tenancy rejections.

use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::provisioning::ProvisioningError;
use crate::domain::resolver::ResolveError;

/// Content type for Problem Details as per RFC 9457.
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

#[allow(clippy::trivially_copy_pass_by_ref)] // serde requires &T signature
fn serialize_status_code<S>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u16(status.as_u16())
}

fn deserialize_status_code<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
where
    D: Deserializer<'de>,
{
    let code = u16::deserialize(deserializer)?;
    StatusCode::from_u16(code).map_err(serde::de::Error::custom)
}

/// RFC 9457 Problem Details body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    #[serde(
        serialize_with = "serialize_status_code",
        deserialize_with = "deserialize_status_code"
    )]
    pub status: StatusCode,
    pub detail: String,
    pub instance: String,
    /// Machine-readable error code.
    pub code: String,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: "about:blank".to_owned(),
            title: title.into(),
            status,
            detail: detail.into(),
            instance: String::new(),
            code: String::new(),
        }
    }

    pub fn with_instance(mut self, uri: impl Into<String>) -> Self {
        self.instance = uri.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Problem for a failed tenant resolution.
    pub fn from_resolve_error(err: &ResolveError, instance: &str) -> Self {
        let (status, title) = match err {
            ResolveError::MalformedKey { .. } => (StatusCode::BAD_REQUEST, "Malformed Tenant Key"),
            ResolveError::UnknownTenant { .. } => (StatusCode::NOT_FOUND, "Unknown Tenant"),
            ResolveError::Suspended { .. } => (StatusCode::FORBIDDEN, "Tenant Suspended"),
            ResolveError::Timeout => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Tenant Resolution Timeout",
            ),
            ResolveError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "Tenant Store Unavailable"),
        };
        // store internals stay in the logs
        let detail = match err {
            ResolveError::Store(_) => "tenant directory is unavailable".to_owned(),
            other => other.to_string(),
        };
        Self::new(status, title, detail)
            .with_code(err.code())
            .with_instance(instance)
    }

    /// Problem for a failed provisioning call.
    pub fn from_provisioning_error(err: &ProvisioningError, instance: &str) -> Self {
        let (status, title, code) = match err {
            ProvisioningError::InvalidKey { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid Tenant Key",
                "INVALID_TENANT_KEY",
            ),
            ProvisioningError::InvalidName { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid Tenant Name",
                "INVALID_TENANT_NAME",
            ),
            ProvisioningError::KeyTaken { .. } => {
                (StatusCode::CONFLICT, "Tenant Key Taken", "TENANT_KEY_TAKEN")
            }
            ProvisioningError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, "Tenant Not Found", "TENANT_NOT_FOUND")
            }
            ProvisioningError::Unauthorized { .. } => (
                StatusCode::FORBIDDEN,
                "Unauthorized Escape",
                "UNAUTHORIZED_ESCAPE",
            ),
            ProvisioningError::Access(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "INTERNAL",
            ),
        };
        let detail = match err {
            ProvisioningError::Access(_) => "tenant provisioning failed".to_owned(),
            other => other.to_string(),
        };
        Self::new(status, title, detail)
            .with_code(code)
            .with_instance(instance)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status;
        let mut resp = axum::Json(self).into_response();
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
        );
        resp
    }
}
