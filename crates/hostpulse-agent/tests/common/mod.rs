#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use hostpulse_agent::config::AgentConfig;
use hostpulse_api::{ApiError, MonitoringApi};
use hostpulse_checks::Checker;
use hostpulse_collector::spec::HostSpecSource;
use hostpulse_collector::{Collector, Values};
use hostpulse_common::types::{CheckReport, CheckStatus, Host, HostSpec, MetricSample};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Everything the fake service has seen, plus scripted failures.
#[derive(Default)]
pub struct Recorded {
    pub hosts: HashMap<String, Host>,
    pub created: Vec<HostSpec>,
    pub find_calls: usize,
    pub custom_lookups: usize,
    pub spec_updates: Vec<(String, HostSpec)>,
    pub status_updates: Vec<(String, String)>,
    pub posts: Vec<(Instant, Vec<MetricSample>)>,
    pub post_attempts: usize,
    pub reports: Vec<(Instant, Vec<CheckReport>)>,
    /// Number of upcoming metric posts that fail with a 503.
    pub fail_posts: usize,
    /// Number of upcoming check reports that fail with a 503.
    pub fail_reports: usize,
    /// Status returned by every `create_host` call when set.
    pub create_error: Option<u16>,
    /// Number of upcoming `create_host` calls that fail with a 500.
    pub fail_creates: usize,
    /// Status returned by every custom identifier lookup when set.
    pub lookup_error: Option<u16>,
    /// Status returned by every `update_host_status` call when set.
    pub status_error: Option<u16>,
}

/// In-memory stand-in for the monitoring service.
#[derive(Default)]
pub struct RecordingApi {
    state: Mutex<Recorded>,
}

impl RecordingApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_host(host: Host) -> Arc<Self> {
        let api = Self::default();
        api.state().hosts.insert(host.id.clone(), host);
        Arc::new(api)
    }

    pub fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap()
    }

    pub fn posted_samples(&self) -> Vec<MetricSample> {
        self.state()
            .posts
            .iter()
            .flat_map(|(_, samples)| samples.clone())
            .collect()
    }
}

fn unavailable() -> ApiError {
    ApiError::Server {
        status: 503,
        message: "unavailable".into(),
    }
}

fn take(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl MonitoringApi for RecordingApi {
    async fn create_host(&self, spec: &HostSpec) -> hostpulse_api::Result<String> {
        let mut state = self.state();
        if let Some(status) = state.create_error {
            return Err(ApiError::from_status(status, "rejected"));
        }
        if take(&mut state.fail_creates) {
            return Err(ApiError::Server {
                status: 500,
                message: "try again".into(),
            });
        }
        let id = format!("host-{}", state.created.len() + 1);
        state.hosts.insert(
            id.clone(),
            Host {
                id: id.clone(),
                name: spec.name.clone(),
                status: "standby".into(),
                custom_identifier: spec.custom_identifier.clone(),
            },
        );
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn find_host(&self, host_id: &str) -> hostpulse_api::Result<Host> {
        let mut state = self.state();
        state.find_calls += 1;
        state
            .hosts
            .get(host_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("host {host_id}")))
    }

    async fn find_host_by_custom_identifier(&self, custom_identifier: &str) -> hostpulse_api::Result<Host> {
        let mut state = self.state();
        state.custom_lookups += 1;
        if let Some(status) = state.lookup_error {
            return Err(ApiError::from_status(status, "down"));
        }
        state
            .hosts
            .values()
            .find(|host| host.custom_identifier.as_deref() == Some(custom_identifier))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("custom identifier {custom_identifier}")))
    }

    async fn update_host(&self, host_id: &str, spec: &HostSpec) -> hostpulse_api::Result<()> {
        self.state()
            .spec_updates
            .push((host_id.to_string(), spec.clone()));
        Ok(())
    }

    async fn update_host_status(&self, host_id: &str, status: &str) -> hostpulse_api::Result<()> {
        let mut state = self.state();
        if let Some(status) = state.status_error {
            return Err(ApiError::from_status(status, "forbidden"));
        }
        if let Some(host) = state.hosts.get_mut(host_id) {
            host.status = status.to_string();
        }
        state
            .status_updates
            .push((host_id.to_string(), status.to_string()));
        Ok(())
    }

    async fn post_metrics_values(&self, values: &[MetricSample]) -> hostpulse_api::Result<()> {
        let mut state = self.state();
        state.post_attempts += 1;
        if take(&mut state.fail_posts) {
            return Err(unavailable());
        }
        state.posts.push((Instant::now(), values.to_vec()));
        Ok(())
    }

    async fn report_check_monitors(&self, _host_id: &str, reports: &[CheckReport]) -> hostpulse_api::Result<()> {
        let mut state = self.state();
        if take(&mut state.fail_reports) {
            return Err(unavailable());
        }
        state.reports.push((Instant::now(), reports.to_vec()));
        Ok(())
    }
}

pub fn host(id: &str, status: &str) -> Host {
    Host {
        id: id.into(),
        name: "web-01".into(),
        status: status.into(),
        custom_identifier: None,
    }
}

/// Host spec source returning a fixed spec.
pub struct StaticSpec(pub HostSpec);

impl HostSpecSource for StaticSpec {
    fn collect(&self) -> Result<HostSpec> {
        Ok(self.0.clone())
    }
}

pub fn static_spec(custom_identifier: Option<&str>) -> StaticSpec {
    StaticSpec(HostSpec {
        name: "web-01".into(),
        meta: serde_json::json!({ "agent-version": "test" }),
        custom_identifier: custom_identifier.map(str::to_string),
        ..Default::default()
    })
}

/// Collector emitting a counter that grows by one per run.
pub struct Counter {
    pub runs: f64,
}

impl Collector for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn collect(&mut self) -> Result<Values> {
        self.runs += 1.0;
        Ok(Values::from([("custom.counter".to_string(), self.runs)]))
    }
}

/// Checker replaying a fixed sequence of results, repeating the last one.
pub struct ScriptedChecker {
    name: String,
    interval: Duration,
    script: Mutex<VecDeque<(CheckStatus, String)>>,
    last: Mutex<(CheckStatus, String)>,
}

impl ScriptedChecker {
    pub fn new(name: &str, interval: Duration, script: &[(CheckStatus, &str)]) -> Self {
        Self {
            name: name.to_string(),
            interval,
            script: Mutex::new(
                script
                    .iter()
                    .map(|(status, message)| (*status, message.to_string()))
                    .collect(),
            ),
            last: Mutex::new((CheckStatus::Unknown, String::new())),
        }
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn check(&self) -> Result<CheckReport> {
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = next {
            *last = next;
        }
        Ok(CheckReport::new(&self.name, last.0, last.1.clone()))
    }
}

pub fn config(extra: &str) -> AgentConfig {
    AgentConfig::from_toml(&format!("apikey = \"test-key\"\n{extra}")).unwrap()
}
