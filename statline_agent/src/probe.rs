//! Outbound reachability checks for one IP family.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Seconds between reachability probes.
pub const PROBE_PERIOD_SECS: i64 = 150;

const V4_HOST: &str = "ipv4.google.com";
const V6_HOST: &str = "ipv6.google.com";
const PROBE_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn number(self) -> u8 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        }
    }

    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPv{}", self.number())
    }
}

/// Where reachability is checked for each family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTargets {
    pub v4: (String, u16),
    pub v6: (String, u16),
    pub limit: Duration,
}

impl Default for ProbeTargets {
    fn default() -> Self {
        Self {
            v4: (V4_HOST.into(), PROBE_PORT),
            v6: (V6_HOST.into(), PROBE_PORT),
            limit: PROBE_TIMEOUT,
        }
    }
}

impl ProbeTargets {
    pub async fn probe(&self, family: IpFamily) -> bool {
        let (host, port) = match family {
            IpFamily::V4 => &self.v4,
            IpFamily::V6 => &self.v6,
        };
        reachable(host, *port, family, self.limit).await
    }
}

/// True iff a TCP connection over `family` to `host:port` opens within
/// `limit` (resolution included). Each resolved address of that family is
/// tried in turn; the socket is closed immediately.
pub async fn reachable(host: &str, port: u16, family: IpFamily, limit: Duration) -> bool {
    let attempt = async {
        let addrs = lookup_host((host, port)).await.ok()?;
        connect_any(addrs.filter(|a| family.matches(a))).await
    };
    match timeout(limit, attempt).await {
        Ok(Some(stream)) => {
            drop(stream);
            true
        }
        Ok(None) => {
            debug!(%host, %family, "probe failed");
            false
        }
        Err(_) => {
            debug!(%host, %family, "probe timed out");
            false
        }
    }
}

async fn connect_any<I>(addrs: I) -> Option<TcpStream>
where
    I: IntoIterator<Item = SocketAddr>,
{
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Some(stream),
            Err(e) => debug!(%addr, error = %e, "connect failed"),
        }
    }
    None
}

/// Ticks until the next reachability probe, counted down in interval steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCountdown {
    remaining: i64,
}

impl Default for ProbeCountdown {
    fn default() -> Self {
        Self {
            remaining: PROBE_PERIOD_SECS,
        }
    }
}

impl ProbeCountdown {
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Advance one tick; returns true when this tick should probe.
    pub fn tick(&mut self, interval_secs: u64) -> bool {
        if self.remaining <= 0 {
            self.remaining = PROBE_PERIOD_SECS;
            true
        } else {
            self.remaining -= interval_secs as i64;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn firing_ticks(interval: u64, ticks: usize) -> Vec<usize> {
        let mut c = ProbeCountdown::default();
        (1..=ticks).filter(|_| c.tick(interval)).collect()
    }

    #[test]
    fn countdown_with_dividing_interval() {
        // 150 / 5 = 30 decrements, then the next tick probes
        assert_eq!(firing_ticks(5, 70), vec![31, 62]);
        assert_eq!(firing_ticks(1, 151), vec![151]);
    }

    #[test]
    fn countdown_with_non_dividing_interval() {
        // 150 - 22*7 = -4: overshoot still counts as expired
        assert_eq!(firing_ticks(7, 50), vec![23, 46]);
        let mut c = ProbeCountdown::default();
        for _ in 0..22 {
            assert!(!c.tick(7));
        }
        assert_eq!(c.remaining(), -4);
        assert!(c.tick(7));
        assert_eq!(c.remaining(), PROBE_PERIOD_SECS);
    }

    #[test]
    fn family_helpers() {
        assert_eq!(IpFamily::V4.number(), 4);
        assert_eq!(IpFamily::V6.number(), 6);
        assert_eq!(IpFamily::V6.to_string(), "IPv6");
    }

    #[tokio::test]
    async fn reachable_respects_family() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let limit = Duration::from_secs(2);
        assert!(reachable("127.0.0.1", port, IpFamily::V4, limit).await);
        assert!(!reachable("127.0.0.1", port, IpFamily::V6, limit).await);
    }

    #[test]
    fn default_targets_are_family_specific() {
        let t = ProbeTargets::default();
        assert_eq!(t.v4, ("ipv4.google.com".to_string(), 80));
        assert_eq!(t.v6, ("ipv6.google.com".to_string(), 80));
        assert_eq!(t.limit, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn falls_through_to_later_addresses() {
        let dead: SocketAddr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap();
        assert!(connect_any([dead, live]).await.is_some());
        assert!(connect_any([dead]).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_port_is_false() {
        // bind then drop to get a port nobody listens on
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        assert!(!reachable("127.0.0.1", port, IpFamily::V4, Duration::from_secs(2)).await);
    }
}
