//! Per-session sampling loop: gather a snapshot every interval and stream it
//! to the collector.

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::AgentError;
use crate::metrics::HostMetrics;
use crate::probe::{IpFamily, ProbeCountdown, ProbeTargets};
use crate::throughput::{RawCounterSample, ThroughputWindow};
use crate::types::Snapshot;

/// State that lives exactly as long as one collector connection.
pub struct Reporter {
    interval_secs: u64,
    probe_family: IpFamily,
    targets: ProbeTargets,
    window: ThroughputWindow,
    countdown: ProbeCountdown,
}

impl Reporter {
    pub fn new(interval_secs: u64, probe_family: IpFamily) -> Self {
        Self {
            interval_secs,
            probe_family,
            targets: ProbeTargets::default(),
            window: ThroughputWindow::new(interval_secs),
            countdown: ProbeCountdown::default(),
        }
    }

    pub fn with_probe_targets(mut self, targets: ProbeTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn window(&self) -> &ThroughputWindow {
        &self.window
    }

    pub fn countdown(&self) -> &ProbeCountdown {
        &self.countdown
    }

    /// Build this tick's snapshot. Probes reachability when the countdown
    /// has run out.
    ///
    /// Provider calls are synchronous (procfs reads, filesystem stats) and
    /// block the task while they run, Ctrl-C handling included.
    pub async fn sample<H: HostMetrics>(
        &mut self,
        host: &mut H,
    ) -> Result<Snapshot, AgentError> {
        let cpu = host.cpu_percent().map_err(AgentError::Unclassified)?;

        let ifaces = host.interface_counters().map_err(AgentError::Unclassified)?;
        self.window.observe(RawCounterSample::aggregate(&ifaces));
        let (network_rx, network_tx) = self.window.rate();
        let total = self.window.total();

        let uptime = host.uptime_secs().map_err(AgentError::Unclassified)?;
        let load = host.load_one().unwrap_or(-1.0);
        let mem = host.memory().map_err(AgentError::Unclassified)?;
        let hdd = host.disk().map_err(AgentError::Unclassified)?;

        let mut snap = Snapshot {
            online4: None,
            online6: None,
            uptime,
            load,
            memory_total: mem.mem_total,
            memory_used: mem.mem_used,
            swap_total: mem.swap_total,
            swap_used: mem.swap_used,
            hdd_total: hdd.total,
            hdd_used: hdd.used,
            cpu,
            network_rx,
            network_tx,
            network_in: total.rx,
            network_out: total.tx,
        };

        if self.countdown.tick(self.interval_secs) {
            let up = self.targets.probe(self.probe_family).await;
            debug!(family = %self.probe_family, up, "reachability probe");
            snap.set_online(self.probe_family, up);
        }
        Ok(snap)
    }

    /// Stream snapshots until something fails. Only returns with the error
    /// that ended the session.
    pub async fn run<H: HostMetrics>(
        &mut self,
        host: &mut H,
        conn: &mut ConnectionManager,
    ) -> AgentError {
        let period = std::time::Duration::from_secs(self.interval_secs);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // start the cpu delta at the session boundary
        if let Err(e) = host.cpu_percent() {
            return AgentError::Unclassified(e);
        }

        loop {
            ticker.tick().await;
            let line = match self.sample(host).await {
                Ok(snap) => match snap.to_update_line() {
                    Ok(line) => line,
                    Err(e) => return e.into(),
                },
                Err(e) => return e,
            };
            if let Err(e) = conn.send_update(&line).await {
                return e;
            }
            debug!(bytes = line.len(), window = self.window.len(), "update sent");
        }
    }
}
