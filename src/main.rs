use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use netreach::cli::{Args, Mode};
use netreach::config::{PingConfig, TraceConfig};
use netreach::export::export_json;
use netreach::lookup::{BlockingDns, DnsLookup, NumericNamer, resolve_target};
use netreach::ping::{PingEngine, PingTermination};
use netreach::probe::{RawChannel, check_permissions};
use netreach::state::Target;
use netreach::trace::TracerouteEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(args.verbose);

    // Check permissions early
    if let Err(e) = check_permissions() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let resolved = match resolve_target(&args.target)
        .with_context(|| format!("Failed to resolve target: {}", args.target))
    {
        Ok(ip) => ip,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    let target = Target::new(args.target.clone(), resolved);
    debug!(target = %target.original, ip = %target.resolved, "target resolved");

    // Ctrl+C stops the engine between probes
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    let result = match args.mode() {
        Mode::Ping => run_ping(&args, target, cancel).await,
        Mode::Traceroute => run_traceroute(&args, target, cancel).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "netreach=debug" } else { "netreach=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Stream output to stdout, or discard it when a JSON report is requested
fn output(json: bool) -> Box<dyn io::Write + Send> {
    if json {
        Box::new(io::sink())
    } else {
        Box::new(io::stdout())
    }
}

async fn run_ping(args: &Args, target: Target, cancel: CancellationToken) -> Result<()> {
    let config = PingConfig::from(args);
    let channel = RawChannel::open_icmp()?;
    let out = output(args.json);

    let report = tokio::task::spawn_blocking(move || {
        PingEngine::new(channel, out, config, target, cancel).run()
    })
    .await
    .context("ping task panicked")??;

    if let PingTermination::Unreachable { code } = report.termination {
        debug!(code, "destination unreachable");
    }

    if args.json {
        export_json(&report, io::stdout())?;
    }
    Ok(())
}

async fn run_traceroute(args: &Args, target: Target, cancel: CancellationToken) -> Result<()> {
    let config = TraceConfig::from(args);
    let channel = RawChannel::open_icmp()?;
    let out = output(args.json);

    let report = if config.dns_enabled {
        let namer = BlockingDns::new(Arc::new(DnsLookup::new()?), Handle::current());
        tokio::task::spawn_blocking(move || {
            TracerouteEngine::new(channel, out, namer, config, target, cancel).run()
        })
        .await
        .context("traceroute task panicked")??
    } else {
        tokio::task::spawn_blocking(move || {
            TracerouteEngine::new(channel, out, NumericNamer, config, target, cancel).run()
        })
        .await
        .context("traceroute task panicked")??
    };

    if args.json {
        export_json(&report, io::stdout())?;
    }
    Ok(())
}
