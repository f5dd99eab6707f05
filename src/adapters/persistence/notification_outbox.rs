use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::ports::notifier::BillingNotifier,
    domain::entities::notification::BillingNotification,
};

/// Notifications are written to `notification_outbox`; delivery happens
/// outside this service.
#[async_trait]
impl BillingNotifier for PostgresPersistence {
    async fn dispatch(&self, notification: BillingNotification) -> AppResult<()> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO notification_outbox (id, tenant_id, kind, payload)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(id)
        .bind(notification.tenant_id)
        .bind(notification.kind.as_ref())
        .bind(&notification.payload)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        debug!(
            outbox_id = %id,
            tenant_id = %notification.tenant_id,
            kind = %notification.kind,
            "Notification queued"
        );
        Ok(())
    }
}
