pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod notifications;
pub mod token;

#[cfg(test)]
pub mod test_util;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::OtpMailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mailer: OtpMailer,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let mailer = OtpMailer::new(config.email.clone());
        Self {
            config,
            db,
            mailer,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
