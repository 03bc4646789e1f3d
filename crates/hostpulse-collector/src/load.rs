use crate::{Collector, Values};
use anyhow::Result;
use sysinfo::System;

pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "loadavg"
    }

    fn collect(&mut self) -> Result<Values> {
        let load_avg = System::load_average();

        let mut values = Values::new();
        values.insert("loadavg1".to_string(), load_avg.one);
        values.insert("loadavg5".to_string(), load_avg.five);
        values.insert("loadavg15".to_string(), load_avg.fifteen);
        Ok(values)
    }
}
