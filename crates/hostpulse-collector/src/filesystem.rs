use crate::{sanitize_metric_key, Collector, Values};
use anyhow::Result;
use regex::Regex;
use sysinfo::Disks;

const DOCKER_MAPPER_PREFIX: &str = "/dev/mapper/docker-";

/// Size and usage of every block-device backed filesystem.
///
/// Only devices under `/dev/` are reported; docker devicemapper volumes and
/// names matching the configured ignore pattern are skipped.
pub struct FilesystemCollector {
    disks: Disks,
    ignore: Option<Regex>,
}

impl FilesystemCollector {
    pub fn new(ignore: Option<Regex>) -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
            ignore,
        }
    }
}

/// Returns the metric key for a device name, or `None` when the device is
/// not reported.
fn device_key(name: &str, ignore: Option<&Regex>) -> Option<String> {
    if name.starts_with(DOCKER_MAPPER_PREFIX) || ignore.is_some_and(|re| re.is_match(name)) {
        return None;
    }
    name.strip_prefix("/dev/").map(sanitize_metric_key)
}

impl Collector for FilesystemCollector {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn collect(&mut self) -> Result<Values> {
        self.disks.refresh_list();
        let mut values = Values::new();

        for disk in self.disks.iter() {
            let name = disk.name().to_string_lossy();
            let Some(device) = device_key(&name, self.ignore.as_ref()) else {
                continue;
            };

            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            values.insert(format!("filesystem.{device}.size"), total as f64);
            values.insert(format!("filesystem.{device}.used"), used as f64);
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_dev_devices() {
        assert_eq!(device_key("/dev/sda1", None).as_deref(), Some("sda1"));
        assert_eq!(device_key("tmpfs", None), None);
        assert_eq!(device_key("overlay", None), None);
    }

    #[test]
    fn sanitizes_nested_device_names() {
        assert_eq!(
            device_key("/dev/mapper/vg0-root", None).as_deref(),
            Some("mapper_vg0-root")
        );
    }

    #[test]
    fn skips_docker_and_ignored_devices() {
        assert_eq!(device_key("/dev/mapper/docker-8:1-1234-abcdef", None), None);

        let ignore = Regex::new("^/dev/loop").unwrap();
        assert_eq!(device_key("/dev/loop3", Some(&ignore)), None);
        assert_eq!(device_key("/dev/nvme0n1p2", Some(&ignore)).as_deref(), Some("nvme0n1p2"));
    }
}
