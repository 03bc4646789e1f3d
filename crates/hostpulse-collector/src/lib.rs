//! Metric generators for the hostpulse agent.
//!
//! Each [`Collector`] gathers one category of host metrics (CPU, memory,
//! filesystems, load average, network interfaces) and returns them as a flat
//! name → value map. The agent's producer loop runs every registered
//! collector once per metrics tick and packs the results into a
//! [`hostpulse_common::types::MetricsSnapshot`].

pub mod cpu;
pub mod filesystem;
pub mod load;
pub mod memory;
pub mod network;
pub mod spec;

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;

/// Metric name → value, as produced by one collector run.
pub type Values = HashMap<String, f64>;

/// A metric generator that runs on the agent host.
///
/// Implementations keep whatever state they need between runs (previous
/// counters for deltas, refreshed `sysinfo` handles) and are called from a
/// single producer task, so `collect` takes `&mut self`.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"cpu"`, `"filesystem"`), used for logging.
    fn name(&self) -> &str;

    /// Collects the current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Values>;

    /// Values from a collector with a custom identifier are posted for the
    /// host registered under that identifier instead of the agent's host.
    fn custom_identifier(&self) -> Option<&str> {
        None
    }
}

/// The built-in collector set, in the order the producer runs them.
pub fn default_collectors(filesystem_ignore: Option<Regex>) -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(cpu::CpuCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(filesystem::FilesystemCollector::new(filesystem_ignore)),
        Box::new(load::LoadCollector::new()),
        Box::new(network::NetworkCollector::new()),
    ]
}

/// Replaces every character outside `[A-Za-z0-9_-]` so the result can be
/// embedded in a dotted metric name.
///
/// # Examples
///
/// ```
/// use hostpulse_collector::sanitize_metric_key;
///
/// assert_eq!(sanitize_metric_key("mapper/vg0-root"), "mapper_vg0-root");
/// assert_eq!(sanitize_metric_key("eth0.100"), "eth0_100");
/// ```
pub fn sanitize_metric_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
