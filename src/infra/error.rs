use thiserror::Error;

/// Infrastructure errors that can occur during startup.
///
/// Display messages never include connection strings or keys. Log with `%e`.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("Database connection failed. Check DATABASE_URL and ensure the database is running.")]
    DatabaseConnection(#[source] sqlx::Error),

    #[error("Database migration failed")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Configuration error: environment variable {var} not set")]
    ConfigMissing { var: &'static str },

    #[error("Configuration error: environment variable {var} is invalid")]
    ConfigInvalid { var: &'static str },

    #[error("HTTP client initialization failed")]
    HttpClient(#[source] reqwest::Error),

    #[error("Job scheduler error")]
    Scheduler(#[source] tokio_cron_scheduler::JobSchedulerError),

    #[error("TCP bind failed")]
    TcpBind(#[source] std::io::Error),

    #[error("Server error")]
    Server(#[source] std::io::Error),
}

impl From<sqlx::Error> for InfraError {
    fn from(e: sqlx::Error) -> Self {
        InfraError::DatabaseConnection(e)
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for InfraError {
    fn from(e: tokio_cron_scheduler::JobSchedulerError) -> Self {
        InfraError::Scheduler(e)
    }
}
