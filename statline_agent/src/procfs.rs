//! Readers for the handful of procfs files the agent needs. The root is
//! configurable so a containerized agent can read the host's `/proc`.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::metrics::InterfaceCounters;

/// Aggregate CPU jiffies from the first line of `stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub total: u64,
    /// idle + iowait
    pub idle: u64,
}

impl CpuTimes {
    /// Busy percentage between `prev` and `self`; 0 when no time elapsed.
    pub fn busy_percent_since(&self, prev: &CpuTimes) -> f64 {
        let dt = self.total.saturating_sub(prev.total);
        if dt == 0 {
            return 0.0;
        }
        let didle = self.idle.saturating_sub(prev.idle);
        let busy = dt.saturating_sub(didle) as f64;
        (busy / dt as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone)]
pub struct Procfs {
    root: PathBuf,
}

impl Procfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, rel: &str) -> io::Result<String> {
        fs::read_to_string(self.root.join(rel))
    }

    pub fn cpu_times(&self) -> io::Result<CpuTimes> {
        parse_cpu_times(&self.read("stat")?)
    }

    pub fn uptime_secs(&self) -> io::Result<u64> {
        parse_uptime(&self.read("uptime")?)
    }

    pub fn load_one(&self) -> io::Result<f64> {
        parse_loadavg(&self.read("loadavg")?)
    }

    pub fn net_dev(&self) -> io::Result<Vec<InterfaceCounters>> {
        Ok(parse_net_dev(&self.read("net/dev")?))
    }
}

fn bad_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

// "cpu  user nice system idle iowait irq softirq steal ..."
pub fn parse_cpu_times(s: &str) -> io::Result<CpuTimes> {
    let line = s
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| bad_data("no aggregate cpu line"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|t| t.parse::<u64>().unwrap_or(0))
        .collect();
    if fields.len() < 4 {
        return Err(bad_data("short cpu line"));
    }
    let total = fields.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
    let idle = fields[3].saturating_add(fields.get(4).copied().unwrap_or(0));
    Ok(CpuTimes { total, idle })
}

pub fn parse_uptime(s: &str) -> io::Result<u64> {
    s.split_whitespace()
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .map(|secs| secs as u64)
        .ok_or_else(|| bad_data("unparseable uptime"))
}

pub fn parse_loadavg(s: &str) -> io::Result<f64> {
    s.split_whitespace()
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| bad_data("unparseable loadavg"))
}

// Two header lines, then "  eth0: rx_bytes rx_packets ... (8 rx fields) tx_bytes ..."
pub fn parse_net_dev(s: &str) -> Vec<InterfaceCounters> {
    s.lines()
        .skip(2)
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let mut it = rest.split_whitespace();
            let rx = it.next()?.parse::<u64>().ok()?;
            let tx = it.nth(7)?.parse::<u64>().ok()?;
            Some(InterfaceCounters::new(name.trim(), rx, tx))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
  eth0: 9876543    5000    0    0    0     0          0        12  1234567    4000    0    0    0     0       0          0
docker0:    5555      10    0    0    0     0          0         0     6666      12    0    0    0     0       0          0
";

    #[test]
    fn net_dev_rows() {
        let rows = parse_net_dev(NET_DEV);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], InterfaceCounters::new("eth0", 9_876_543, 1_234_567));
        assert_eq!(rows[2].name, "docker0");
    }

    #[test]
    fn cpu_line_and_busy_percent() {
        let a = parse_cpu_times("cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 1 2 3 4\n").unwrap();
        assert_eq!(a, CpuTimes { total: 1000, idle: 800 });
        let b = CpuTimes { total: 1200, idle: 950 };
        assert!((b.busy_percent_since(&a) - 25.0).abs() < 1e-9);
        assert_eq!(a.busy_percent_since(&a), 0.0);
    }

    #[test]
    fn uptime_and_load() {
        assert_eq!(parse_uptime("35000.71 120000.02\n").unwrap(), 35000);
        assert!((parse_loadavg("0.42 0.30 0.25 1/123 4567\n").unwrap() - 0.42).abs() < 1e-9);
        assert!(parse_loadavg("").is_err());
        assert!(parse_cpu_times("intr 1 2 3").is_err());
    }
}
