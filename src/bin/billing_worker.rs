//! Runs the reconciliation jobs on their cron schedules.
//!
//! `billing-worker --once <job>` runs a single pass and exits.

use dotenvy::dotenv;
use tracing::info;

use tenant_billing::{
    infra::{
        scheduler::{build_scheduler, run_once},
        setup::{init_services, init_tracing},
    },
    use_cases::reconciliation::JobKind,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let services = init_services().await?;

    let mut args = std::env::args().skip(1);
    if let Some(flag) = args.next() {
        anyhow::ensure!(flag == "--once", "unknown argument {flag}; usage: --once <job>");
        let job = args
            .next()
            .ok_or_else(|| anyhow::anyhow!("--once needs a job name"))?;
        let kind: JobKind = job
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown job {job}"))?;
        run_once(&services.jobs, kind).await;
        return Ok(());
    }

    let mut scheduler = build_scheduler(services.jobs.clone(), &services.config.schedules).await?;
    scheduler.start().await?;
    info!("Billing worker started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    scheduler.shutdown().await?;

    Ok(())
}
