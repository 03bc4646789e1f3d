use crate::aggregator::{check_pipeline, discard_terminations};
use crate::checker::CheckerRunner;
use crate::config::AgentConfig;
use crate::delay::delay_by_host;
use crate::error::{AgentError, Result};
use crate::ingest::Ingestor;
use crate::producer::MetricsProducer;
use crate::queue::post_queue;
use crate::registration::{resolve_custom_identifier_hosts, HostIdStore, Registrar};
use crate::scheduler::PostScheduler;
use crate::spec_refresh::HostSpecRefresher;
use crate::termination::{QuitSignal, TaskGroup, TerminationFanout};
use hostpulse_api::MonitoringApi;
use hostpulse_checks::Checker;
use hostpulse_collector::spec::HostSpecSource;
use hostpulse_collector::Collector;
use hostpulse_common::types::Host;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A registered host together with everything needed to report for it.
pub struct Agent {
    config: AgentConfig,
    api: Arc<dyn MonitoringApi>,
    host: Host,
    custom_hosts: HashMap<String, Host>,
    spec_source: Arc<dyn HostSpecSource>,
    collectors: Vec<Box<dyn Collector>>,
    checkers: Vec<Arc<dyn Checker>>,
}

impl Agent {
    /// Resolves the host (creating it if needed) and the hosts of custom
    /// identifiers declared by `collectors`.
    pub async fn prepare(
        config: AgentConfig,
        api: Arc<dyn MonitoringApi>,
        spec_source: Arc<dyn HostSpecSource>,
        collectors: Vec<Box<dyn Collector>>,
        checkers: Vec<Arc<dyn Checker>>,
        store: Box<dyn HostIdStore>,
    ) -> Result<Self> {
        let spec = spec_source
            .collect()
            .map_err(|e| AgentError::Registration(format!("failed to collect host specs: {e:#}")))?;

        let host = Registrar::new(Arc::clone(&api), store)
            .prepare_host(&spec, config.host_status.on_start.as_deref())
            .await?;

        let custom_hosts = resolve_custom_identifier_hosts(
            api.as_ref(),
            collectors.iter().filter_map(|c| c.custom_identifier()),
        )
        .await;

        Ok(Self::new(
            config,
            api,
            host,
            custom_hosts,
            spec_source,
            collectors,
            checkers,
        ))
    }

    /// Builds an agent for an already resolved host.
    pub fn new(
        config: AgentConfig,
        api: Arc<dyn MonitoringApi>,
        host: Host,
        custom_hosts: HashMap<String, Host>,
        spec_source: Arc<dyn HostSpecSource>,
        collectors: Vec<Box<dyn Collector>>,
        checkers: Vec<Arc<dyn Checker>>,
    ) -> Self {
        Self {
            config,
            api,
            host,
            custom_hosts,
            spec_source,
            collectors,
            checkers,
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Runs until the post queue has drained after a termination signal on
    /// `termination`, then applies the configured stop status.
    ///
    /// # Errors
    ///
    /// [`AgentError::ForcedTermination`] when a second termination signal
    /// arrives while draining.
    pub async fn run(self, termination: mpsc::Receiver<()>) -> Result<()> {
        let api = Arc::clone(&self.api);
        let host_id = self.host.id.clone();
        let on_stop = self.config.host_status.on_stop.clone();

        self.run_loop(termination).await?;

        if let Some(status) = on_stop {
            match api.update_host_status(&host_id, &status).await {
                Ok(()) => tracing::info!(host_id = %host_id, status = %status, "Host status updated"),
                Err(e) => {
                    tracing::error!(host_id = %host_id, status = %status, error = %e, "Failed to update host status on stop")
                }
            }
        }
        tracing::info!("Agent stopped");
        Ok(())
    }

    async fn run_loop(self, termination: mpsc::Receiver<()>) -> Result<()> {
        let Agent {
            config,
            api,
            host,
            custom_hosts,
            spec_source,
            collectors,
            checkers,
        } = self;

        let quit = QuitSignal::new();
        let mut fanout = TerminationFanout::new();
        let mut tasks = TaskGroup::new();

        let settings = config.post_settings();
        let post_delay = delay_by_host(&host.id, settings.post_interval);
        tracing::info!(
            host_id = %host.id,
            post_delay_secs = post_delay.as_secs(),
            checks = checkers.len(),
            "Starting agent loop"
        );

        let refresher = HostSpecRefresher::new(
            Arc::clone(&api),
            host.id.clone(),
            spec_source,
            Duration::from_secs(config.host_spec_interval_secs),
        );
        tasks.spawn("spec-refresh", refresher.run(fanout.register("spec-refresh")));

        let (queue_tx, queue) = post_queue(config.connection.post_metrics_buffer_size);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        let producer = MetricsProducer::new(
            collectors,
            Duration::from_secs(config.metrics_interval_secs),
        );
        tasks.spawn("producer", producer.run(snapshot_tx, quit.listener()));
        let ingestor = Ingestor::new(host.id.clone(), custom_hosts, queue_tx);
        tasks.spawn("ingest", ingestor.run(snapshot_rx, fanout.register("ingest")));

        let checks_termination = fanout.register("checks");
        if checkers.is_empty() {
            tasks.spawn("checks", discard_terminations(checks_termination));
        } else {
            let (intake, aggregator) = check_pipeline(
                Arc::clone(&api),
                host.id.clone(),
                Duration::from_secs(config.check_report_interval_secs),
            );
            for checker in checkers {
                let name = format!("check:{}", checker.name());
                let runner = CheckerRunner::new(checker);
                tasks.spawn(name, runner.run(intake.clone(), quit.listener()));
            }
            tasks.spawn("checks", aggregator.run(checks_termination));
        }

        let mut scheduler_termination = fanout.register("scheduler");
        tasks.spawn("termination", fanout.run(termination, quit.listener()));

        let initial = post_delay / 2;
        tracing::debug!(delay_secs = initial.as_secs(), "Waiting before the first post");
        let terminated_early = tokio::select! {
            _ = tokio::time::sleep(initial) => false,
            Some(()) = scheduler_termination.recv() => true,
        };

        let result = if terminated_early {
            tracing::info!("Terminated before the first post");
            Ok(())
        } else {
            PostScheduler::new(api, queue, settings, post_delay)
                .run(scheduler_termination)
                .await
        };

        quit.trigger();
        match &result {
            Err(AgentError::ForcedTermination) => tasks.abort_all().await,
            _ => tasks.wait_all().await,
        }
        result
    }
}
