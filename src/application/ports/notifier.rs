use async_trait::async_trait;

use crate::{app_error::AppResult, domain::entities::notification::BillingNotification};

/// Hands lifecycle notifications to whatever delivers them.
#[async_trait]
pub trait BillingNotifier: Send + Sync {
    async fn dispatch(&self, notification: BillingNotification) -> AppResult<()>;
}
