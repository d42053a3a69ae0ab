//! Retry driver: connect, stream until failure, wait, start over. Runs
//! until the surrounding task is cancelled.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::{AgentError, ErrorKind};
use crate::metrics::HostMetrics;
use crate::reporter::Reporter;

/// Fixed pause between a failure and the next connection attempt.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

/// One connect + stream cycle. Always ends with the error that stopped it.
async fn session<H: HostMetrics>(conn: &mut ConnectionManager, host: &mut H) -> AgentError {
    let probe_family = match conn.establish().await {
        Ok(f) => f,
        Err(e) => return e,
    };
    info!(state = %conn.state(), probe = %probe_family, "streaming to collector");
    // window and countdown are per-connection
    let mut reporter = Reporter::new(conn.config().interval_secs, probe_family);
    reporter.run(host, conn).await
}

fn report_failure(err: &AgentError) {
    match err.kind() {
        ErrorKind::Unclassified => warn!(error = %err, "Caught error"),
        kind => warn!(%kind, error = %err, "Disconnected..."),
    }
}

/// Run forever. Cancellation (dropping this future) is the only way out.
pub async fn run<H: HostMetrics>(config: Config, mut host: H) {
    info!(
        server = %config.server,
        port = config.port,
        interval_secs = config.interval_secs,
        "agent starting"
    );
    let mut conn = ConnectionManager::new(config);
    loop {
        info!("Connecting...");
        let err = session(&mut conn, &mut host).await;
        conn.fail();
        report_failure(&err);
        sleep(RETRY_DELAY).await;
    }
}
