//! Entry point for statline_agent. Parses config and runs the reporting loop
//! until interrupted.

use statline_agent::agent;
use statline_agent::config::{Config, ConfigError};
use statline_agent::logging;
use statline_agent::metrics::LocalHost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = match Config::from_process() {
        Ok(c) => c,
        Err(ConfigError::Help(usage)) => {
            println!("{usage}");
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", statline_agent::config::usage("statline_agent"));
            std::process::exit(2);
        }
    };

    let hostname = hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "unknown".into());
    tracing::info!(%hostname, procfs = %config.procfs_path.display(), "reporting host");

    let host = LocalHost::new(&config);
    tokio::select! {
        _ = agent::run(config, host) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("interrupted, exiting");
        }
    }
    Ok(())
}
