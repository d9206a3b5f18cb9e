use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// Operator of the whole platform. The only kind allowed to leave tenant scope.
    PlatformAdmin,
    /// End user belonging to a single tenant.
    TenantUser,
    /// Internal service or job runner.
    Service,
}

/// Authenticated actor on whose behalf an operation runs.
///
/// Issued by the authentication layer; this crate only consumes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub(crate) id: Uuid,
    pub(crate) kind: SubjectKind,
}

impl Subject {
    #[must_use]
    pub fn new(id: Uuid, kind: SubjectKind) -> Self {
        Self { id, kind }
    }

    #[must_use]
    pub fn platform_admin(id: Uuid) -> Self {
        Self::new(id, SubjectKind::PlatformAdmin)
    }

    #[must_use]
    pub fn tenant_user(id: Uuid) -> Self {
        Self::new(id, SubjectKind::TenantUser)
    }

    #[must_use]
    pub fn service(id: Uuid) -> Self {
        Self::new(id, SubjectKind::Service)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    /// Returns true if this subject may use the escape hatch.
    #[must_use]
    pub fn is_platform_admin(&self) -> bool {
        self.kind == SubjectKind::PlatformAdmin
    }
}
