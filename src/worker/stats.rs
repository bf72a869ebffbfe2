//! Node statistics for the worker's `/stats` endpoint.

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, ProcessStatus, System};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemStats {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskStats {
    pub all: u64,
    pub used: u64,
    pub free: u64,
    #[serde(rename = "freeInodes")]
    pub free_inodes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuStats {
    pub id: String,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadStats {
    #[serde(rename = "last1min")]
    pub last_1_min: f64,
    #[serde(rename = "last5min")]
    pub last_5_min: f64,
    #[serde(rename = "last15min")]
    pub last_15_min: f64,
    pub process_running: u64,
    pub process_total: u64,
    pub last_pid: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stats {
    pub mem_stats: MemStats,
    pub disk_stats: DiskStats,
    pub cpu_stats: CpuStats,
    pub load_stats: LoadStats,
    pub task_count: u64,
}

/// Snapshot the host's stats. Raw per-mode CPU jiffies are not exposed by
/// the host introspection layer and stay zero.
pub fn get_stats(system: &System, task_count: u64) -> Stats {
    let disks = Disks::new_with_refreshed_list();
    let disk_total: u64 = disks.iter().map(|d| d.total_space()).sum();
    let disk_free: u64 = disks.iter().map(|d| d.available_space()).sum();

    let load = System::load_average();
    let process_running = system
        .processes()
        .values()
        .filter(|p| matches!(p.status(), ProcessStatus::Run))
        .count() as u64;

    Stats {
        mem_stats: MemStats {
            mem_total: system.total_memory() / 1024,
            mem_free: system.free_memory() / 1024,
            mem_available: system.available_memory() / 1024,
        },
        disk_stats: DiskStats {
            all: disk_total,
            used: disk_total.saturating_sub(disk_free),
            free: disk_free,
            free_inodes: 0,
        },
        cpu_stats: CpuStats {
            id: "cpu".to_string(),
            ..Default::default()
        },
        load_stats: LoadStats {
            last_1_min: load.one,
            last_5_min: load.five,
            last_15_min: load.fifteen,
            process_running,
            process_total: system.processes().len() as u64,
            last_pid: 0,
        },
        task_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_carry_the_task_count() {
        let system = System::new_all();
        let stats = get_stats(&system, 3);
        assert_eq!(stats.task_count, 3);
        assert!(stats.mem_stats.mem_total > 0);
    }

    #[test]
    fn stats_wire_names_match_the_contract() {
        let value = serde_json::to_value(Stats::default()).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["MemStats", "DiskStats", "CpuStats", "LoadStats", "TaskCount"] {
            assert!(obj.contains_key(key), "missing wire field {key}");
        }
        assert!(value["MemStats"].get("mem_total").is_some());
        assert!(value["DiskStats"].get("freeInodes").is_some());
        assert!(value["LoadStats"].get("last1min").is_some());
        assert_eq!(value["CpuStats"]["id"], "cpu");
    }
}
