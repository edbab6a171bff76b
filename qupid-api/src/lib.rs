pub mod app;
pub mod config;
pub mod extractors;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod schema;
pub mod services;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use qupid_shared::clients::db::DbPool;
use qupid_shared::clients::email::EmailClient;
use qupid_shared::middleware::AuthState;

use config::AppConfig;
use realtime::directory::{ConnectionDirectory, InMemoryDirectory};
use services::rate_limiter::{InMemoryRateCounter, RateCounter};
use services::uploads::UploadStore;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub allowed_domains: Vec<String>,
    /// `None` when delivery is disabled; codes are logged instead.
    pub email: Option<EmailClient>,
    pub rate_limiter: Arc<dyn RateCounter>,
    pub connections: Arc<dyn ConnectionDirectory>,
    pub uploads: UploadStore,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// State with process-local rate limiting and connection tracking.
    pub fn new(config: AppConfig, db: DbPool, metrics_handle: PrometheusHandle) -> Self {
        let email = config.email_enabled.then(|| {
            EmailClient::new(&config.email_api_key, &config.email_from, &config.app_name)
        });
        Self {
            allowed_domains: config.allowed_domains(),
            uploads: UploadStore::new(&config.upload_dir),
            db,
            email,
            rate_limiter: Arc::new(InMemoryRateCounter::new()),
            connections: Arc::new(InMemoryDirectory::new()),
            metrics_handle,
            config,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateCounter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

impl AuthState for AppState {
    fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}

pub type SharedState = Arc<AppState>;
