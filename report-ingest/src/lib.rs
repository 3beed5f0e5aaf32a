pub mod backend;
pub mod batch;
pub mod beacon;
pub mod classify;
pub mod config;
pub mod errors;
pub mod jsurl;
pub mod metrics_defs;
pub mod normalize;
pub mod service;
pub mod tenants;

#[cfg(test)]
mod testutils;

use crate::backend::HttpBackend;
use crate::errors::IngestError;
use crate::service::ReportService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

pub async fn run(config: config::Config) -> Result<(), IngestError> {
    config.validate()?;
    tracing::info!(tenants = config.tenants.len(), "starting report ingest");

    let backend = Arc::new(HttpBackend::new(&config.backend));
    let report_service = ReportService::new(&config, backend);

    let report_task = run_http_service(&config.listener.host, config.listener.port, report_service);

    // The report service is fully constructed before either listener binds.
    let admin_service = AdminService::<_, IngestError>::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(report_task, admin_task)?;
    Ok(())
}
