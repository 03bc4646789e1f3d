use crate::{Collector, Values};
use anyhow::Result;
use sysinfo::System;

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Values> {
        // Usage is computed against the previous refresh, so the first
        // collection after startup reads close to zero.
        self.system.refresh_cpu_all();

        let mut values = Values::new();
        values.insert(
            "cpu.usage.percentage".to_string(),
            self.system.global_cpu_usage() as f64,
        );
        Ok(values)
    }
}
