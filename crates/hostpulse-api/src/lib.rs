//! Contract between the agent core and the remote monitoring service.
//!
//! The core only talks to the service through [`MonitoringApi`]; the
//! [`http::HttpApiClient`] implementation speaks JSON over HTTP, and tests
//! substitute in-memory fakes.

pub mod error;
pub mod http;

use async_trait::async_trait;
use hostpulse_common::types::{CheckReport, Host, HostSpec, MetricSample};

pub use error::{ApiError, Result};

/// Remote operations the agent depends on.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Registers a new host and returns the id assigned by the service.
    async fn create_host(&self, spec: &HostSpec) -> Result<String>;

    async fn find_host(&self, host_id: &str) -> Result<Host>;

    /// Looks a host up by its custom identifier; `ApiError::NotFound` when
    /// no host carries it.
    async fn find_host_by_custom_identifier(&self, custom_identifier: &str) -> Result<Host>;

    async fn update_host(&self, host_id: &str, spec: &HostSpec) -> Result<()>;

    async fn update_host_status(&self, host_id: &str, status: &str) -> Result<()>;

    /// Posts one delivery worth of samples. The samples may belong to
    /// several hosts.
    async fn post_metrics_values(&self, values: &[MetricSample]) -> Result<()>;

    async fn report_check_monitors(&self, host_id: &str, reports: &[CheckReport]) -> Result<()>;
}
