use hostpulse_api::MonitoringApi;
use hostpulse_collector::spec::HostSpecSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Periodically re-sends the host's descriptive metadata.
///
/// Best-effort: failures are logged and the next refresh happens on
/// schedule.
pub struct HostSpecRefresher {
    api: Arc<dyn MonitoringApi>,
    host_id: String,
    source: Arc<dyn HostSpecSource>,
    interval: Duration,
}

impl HostSpecRefresher {
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        host_id: impl Into<String>,
        source: Arc<dyn HostSpecSource>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            host_id: host_id.into(),
            source,
            interval,
        }
    }

    /// Collects and sends the host spec once. Returns whether it was accepted.
    pub async fn refresh_once(&self) -> bool {
        let source = Arc::clone(&self.source);
        let spec = match tokio::task::spawn_blocking(move || source.collect()).await {
            Ok(Ok(spec)) => spec,
            Ok(Err(e)) => {
                tracing::error!(error = %format!("{e:#}"), "Failed to collect host specs");
                return false;
            }
            Err(e) => {
                tracing::error!(error = %e, "Host spec collection task failed");
                return false;
            }
        };

        match self.api.update_host(&self.host_id, &spec).await {
            Ok(()) => {
                tracing::debug!(host_id = %self.host_id, "Host specs updated");
                true
            }
            Err(e) => {
                tracing::error!(host_id = %self.host_id, error = %e, "Error while updating host specs");
                false
            }
        }
    }

    /// Refreshes right away, then every interval, until a termination signal
    /// or the termination channel closes.
    pub async fn run(self, mut termination: mpsc::Receiver<()>) {
        loop {
            self.refresh_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = termination.recv() => break,
            }
        }
        tracing::debug!("Host spec refresh stopped");
    }
}
