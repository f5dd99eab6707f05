use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::app_error::AppError;

/// Header the upstream gateway sets after authenticating the caller.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant the current request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext(pub Uuid);

pub async fn tenant_context_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let tenant_id = tenant_from(&request).ok_or(AppError::MissingTenant)?;

    tracing::Span::current().record("tenant_id", tracing::field::display(tenant_id));
    request.extensions_mut().insert(TenantContext(tenant_id));

    Ok(next.run(request).await)
}

fn tenant_from(req: &Request) -> Option<Uuid> {
    let raw = req.headers().get(TENANT_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw.trim()).ok()
}
