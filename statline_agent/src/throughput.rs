//! Sliding-window network throughput from cumulative interface counters.

use std::collections::VecDeque;

use crate::metrics::InterfaceCounters;

pub const WINDOW_CAPACITY: usize = 10;

/// Substrings marking loopback, tunnel, container and bridge interfaces.
const EXCLUDED_INTERFACES: &[&str] = &[
    "lo", "tun", "kube", "docker", "vmbr", "br-", "vnet", "veth",
];

/// Cumulative (rx, tx) bytes summed over counted interfaces at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounterSample {
    pub rx: u64,
    pub tx: u64,
}

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if dq.len() == cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Case-sensitive substring match, so `wlo1` is excluded along with `lo`.
pub fn is_counted_interface(name: &str) -> bool {
    let name = name.trim();
    !EXCLUDED_INTERFACES.iter().any(|bad| name.contains(bad))
}

impl RawCounterSample {
    pub fn aggregate<'a, I>(ifaces: I) -> Self
    where
        I: IntoIterator<Item = &'a InterfaceCounters>,
    {
        ifaces
            .into_iter()
            .filter(|i| is_counted_interface(&i.name))
            .fold(Self::default(), |acc, i| Self {
                rx: acc.rx.saturating_add(i.rx_bytes),
                tx: acc.tx.saturating_add(i.tx_bytes),
            })
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    samples: VecDeque<RawCounterSample>,
    interval_secs: u64,
}

impl ThroughputWindow {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW_CAPACITY),
            interval_secs: interval_secs.max(1),
        }
    }

    pub fn observe(&mut self, sample: RawCounterSample) {
        push_capped(&mut self.samples, sample, WINDOW_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average (rx, tx) bytes/sec across the window. Counter resets show up
    /// as negative deltas and are passed through.
    pub fn rate(&self) -> (i64, i64) {
        if self.is_empty() {
            return (0, 0);
        }
        let n = self.samples.len() as i64;
        let (drx, dtx) = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .fold((0i64, 0i64), |(rx, tx), (older, newer)| {
                (
                    rx + (newer.rx as i64 - older.rx as i64),
                    tx + (newer.tx as i64 - older.tx as i64),
                )
            });
        let denom = n * self.interval_secs as i64;
        (drx / denom, dtx / denom)
    }

    /// Most recent raw sample, or zeros before the first observation.
    pub fn total(&self) -> RawCounterSample {
        self.samples.back().copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx(v: u64) -> RawCounterSample {
        RawCounterSample { rx: v, tx: 0 }
    }

    #[test]
    fn window_length_is_capped() {
        let mut w = ThroughputWindow::new(1);
        for i in 0..25u64 {
            w.observe(rx(i * 10));
            assert_eq!(w.len(), (i as usize + 1).min(WINDOW_CAPACITY));
        }
        assert_eq!(w.total(), rx(240));
    }

    #[test]
    fn empty_window_reports_zeros() {
        let w = ThroughputWindow::new(1);
        assert!(w.is_empty());
        assert_eq!(w.rate(), (0, 0));
        assert_eq!(w.total(), RawCounterSample::default());
    }

    #[test]
    fn rate_averages_over_window_length() {
        let mut w = ThroughputWindow::new(1);
        for v in [100, 150, 220] {
            w.observe(rx(v));
        }
        assert_eq!(w.rate(), (40, 0));
        assert_eq!(w.total(), rx(220));
    }

    #[test]
    fn rate_divides_by_interval() {
        let mut w = ThroughputWindow::new(2);
        w.observe(RawCounterSample { rx: 0, tx: 1000 });
        w.observe(RawCounterSample { rx: 400, tx: 1400 });
        assert_eq!(w.rate(), (100, 100));
    }

    #[test]
    fn single_sample_has_zero_rate() {
        let mut w = ThroughputWindow::new(1);
        w.observe(RawCounterSample { rx: 5_000, tx: 9_000 });
        assert_eq!(w.rate(), (0, 0));
        assert_eq!(w.total(), RawCounterSample { rx: 5_000, tx: 9_000 });
    }

    #[test]
    fn counter_reset_gives_negative_rate() {
        let mut w = ThroughputWindow::new(1);
        w.observe(rx(1_000));
        w.observe(rx(100));
        assert_eq!(w.rate(), (-450, 0));
    }

    #[test]
    fn oldest_sample_evicted_first() {
        let mut w = ThroughputWindow::new(1);
        for i in 0..=WINDOW_CAPACITY as u64 {
            w.observe(rx(i * 100));
        }
        // window now holds 100..=1000: nine deltas of 100 over ten samples
        assert_eq!(w.rate(), (90, 0));
    }

    #[test]
    fn interface_filter_is_substring_based() {
        assert!(is_counted_interface("eth0"));
        assert!(is_counted_interface("enp3s0"));
        assert!(is_counted_interface(" ens5 "));
        assert!(!is_counted_interface("docker0"));
        assert!(!is_counted_interface("veth1234"));
        assert!(!is_counted_interface("lo"));
        assert!(!is_counted_interface("br-4f2a"));
        assert!(!is_counted_interface("tun0"));
        assert!(!is_counted_interface("wlo1"));
        assert!(is_counted_interface("Docker0"));
    }

    #[test]
    fn aggregate_skips_filtered_interfaces() {
        let ifaces = vec![
            InterfaceCounters::new("eth0", 100, 10),
            InterfaceCounters::new("docker0", 5_000, 5_000),
            InterfaceCounters::new("eth1", 20, 2),
            InterfaceCounters::new("lo", 7, 7),
        ];
        assert_eq!(
            RawCounterSample::aggregate(&ifaces),
            RawCounterSample { rx: 120, tx: 12 }
        );
    }
}
