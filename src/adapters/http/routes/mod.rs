pub mod features;
pub mod invoices;
pub mod payment_methods;
pub mod plans;
pub mod subscription;
pub mod usage;
pub mod webhooks;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/subscription", subscription::router())
        .nest("/features", features::router())
        .nest("/plans", plans::router())
        .nest("/payment-methods", payment_methods::router())
        .nest("/invoices", invoices::router())
        .nest("/usage", usage::router())
        .nest("/webhooks", webhooks::router())
}
