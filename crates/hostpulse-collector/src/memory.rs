use crate::{Collector, Values};
use anyhow::Result;
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Values> {
        self.system.refresh_memory();

        let mut values = Values::new();
        values.insert("memory.total".to_string(), self.system.total_memory() as f64);
        values.insert("memory.used".to_string(), self.system.used_memory() as f64);
        values.insert(
            "memory.available".to_string(),
            self.system.available_memory() as f64,
        );
        values.insert("memory.swap_total".to_string(), self.system.total_swap() as f64);
        values.insert("memory.swap_free".to_string(), self.system.free_swap() as f64);
        Ok(values)
    }
}
