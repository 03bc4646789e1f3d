use crate::{sanitize_metric_key, Collector, Values};
use anyhow::Result;
use std::collections::HashMap;
use sysinfo::Networks;

/// Per-interface received/transmitted byte deltas since the previous run.
///
/// The first observation of an interface reports a delta of zero.
pub struct NetworkCollector {
    networks: Networks,
    prev_received: HashMap<String, u64>,
    prev_transmitted: HashMap<String, u64>,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            prev_received: HashMap::new(),
            prev_transmitted: HashMap::new(),
        }
    }
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn delta(prev: &mut HashMap<String, u64>, name: &str, current: u64) -> u64 {
    let last = prev.insert(name.to_string(), current).unwrap_or(current);
    current.saturating_sub(last)
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        "interface"
    }

    fn collect(&mut self) -> Result<Values> {
        self.networks.refresh();
        let mut values = Values::new();

        for (name, data) in self.networks.iter() {
            if name == "lo" {
                continue;
            }
            let key = sanitize_metric_key(name);
            let rx = delta(&mut self.prev_received, name, data.total_received());
            let tx = delta(&mut self.prev_transmitted, name, data.total_transmitted());
            values.insert(format!("interface.{key}.rxBytes.delta"), rx as f64);
            values.insert(format!("interface.{key}.txBytes.delta"), tx as f64);
        }

        Ok(values)
    }
}
