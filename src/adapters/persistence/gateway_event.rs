use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    use_cases::gateway_webhook::GatewayEventRepo,
};

#[async_trait]
impl GatewayEventRepo for PostgresPersistence {
    async fn claim(&self, event_id: &str, event_type: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO gateway_events (event_id, event_type)
               VALUES ($1, $2)
               ON CONFLICT (event_id) DO NOTHING"#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, event_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM gateway_events WHERE event_id = $1")
            .bind(event_id)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}
