use serde::Serialize;
use uuid::Uuid;

/// Billing view of a tenant account. Owned by the tenant module; this crate
/// only writes `gateway_customer_id`.
#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub owner_email: String,
    pub gateway_customer_id: Option<String>,
}
