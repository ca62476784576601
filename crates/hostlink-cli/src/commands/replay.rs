//! `hostlink replay` — Report recorded events to an analysis host.

use std::path::PathBuf;

use clap::Args;
use hostlink_common::config::{HostEndpoint, HostlinkConfig};
use hostlink_common::constants::{ENV_HOST, ENV_PORT};
use hostlink_common::types::DescriptionPolicy;
use hostlink_reporter::reporter::EventReporter;
use hostlink_reporter::source::JsonLinesSource;

use crate::output::format_summary;

/// Arguments for the `replay` command.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON lines file with one API event per line.
    pub events: PathBuf,

    /// Analysis host address (overrides the config file).
    #[arg(long, env = ENV_HOST)]
    pub host: Option<String>,

    /// Analysis host port (overrides the config file).
    #[arg(long, env = ENV_PORT)]
    pub port: Option<u16>,

    /// JSON configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Re-send each API's description before every call.
    ///
    /// By default a description is sent once per connection, before the
    /// API's first call. Use this flag for hosts that expect a description
    /// in front of every call record.
    #[arg(long)]
    pub every_call: bool,
}

/// Builds the effective configuration: file (or defaults), then flags.
fn resolve_config(args: &ReplayArgs) -> anyhow::Result<HostlinkConfig> {
    let mut config = match &args.config {
        Some(path) => HostlinkConfig::from_file(path).map_err(|e| anyhow::anyhow!("{e}"))?,
        None => HostlinkConfig::default(),
    };

    if args.host.is_some() || args.port.is_some() {
        config.endpoint = HostEndpoint::new(
            args.host
                .clone()
                .unwrap_or_else(|| config.endpoint.host().to_owned()),
            args.port.unwrap_or(config.endpoint.port()),
        );
    }
    if args.every_call {
        config.description_policy = DescriptionPolicy::EveryCall;
    }
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(config)
}

/// Executes the `replay` command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the events file cannot
/// be read or parsed, or any event fails to report.
pub fn execute(args: ReplayArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    tracing::info!(
        endpoint = %config.endpoint,
        policy = %config.description_policy,
        events = %args.events.display(),
        "replaying events"
    );

    let reporter = EventReporter::from_config(&config);
    let mut source = JsonLinesSource::open(&args.events).map_err(|e| anyhow::anyhow!("{e}"))?;
    let drained = reporter.drain(&mut source);
    let connections = reporter.shutdown();
    let summary = drained.map_err(|e| {
        anyhow::anyhow!("{}:{}: {e}", args.events.display(), source.line_no())
    })?;

    eprintln!("{}", format_summary(&summary, connections, &config.endpoint));

    if summary.failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} events failed to report",
            summary.failed,
            summary.failed + summary.reported
        ));
    }
    Ok(())
}
