//! game-link-demo: drive a session on its worker thread from a UI-style loop
//!
//! Starts the session worker, attaches a cargo proxy from the main thread,
//! posts a batch of asynchronous mutations, then reads the result back
//! through a blocking downlink while the main loop keeps dispatching replies.
//!
//! Usage: game-link-demo [--config <path>] [--count <n>] [--verbose]

use anyhow::{Context, Result, bail};
use game_link_core::LinkConfig;
use game_link_dispatch::{Downlink, EventLoop, WorkerThread};
use game_link_session::{CargoKind, CargoProxy, Planet, Session};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

struct Args {
    config: Option<PathBuf>,
    count: i64,
    verbose: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        count: 1000,
        verbose: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--count" => {
                let value = iter.next().context("--count needs a number")?;
                args.count = value.parse().with_context(|| format!("Invalid count: {}", value))?;
            }
            "--verbose" | "-v" => args.verbose = true,
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // Initialize logging; RUST_LOG overrides the default level
    let level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::default(),
    };
    info!("Starting game-link demo with {:?}", config);

    let (worker, session) = WorkerThread::spawn(&config, Session::demo)?;
    let ui = EventLoop::new();
    let link = Downlink::new(&ui);

    let proxy = CargoProxy::new(&session, ui.dispatcher(), 1);
    let updates = Rc::new(Cell::new(0usize));
    let counter = updates.clone();
    proxy.on_change(move |status| {
        counter.set(counter.get() + 1);
        if let Some(error) = &status.last_error {
            warn!("Planet {} rejected a change: {}", status.planet, error);
        }
    });

    for _ in 0..args.count {
        proxy.add_cargo(CargoKind::Supplies, 1);
    }
    let status = proxy.get_status(&link)?;
    info!(
        "{} now stores {} supplies after {} loads",
        status.name, status.cargo.supplies, args.count
    );

    // Rejected on the worker; reported back through the status reply
    proxy.transfer(2, CargoKind::Money, i64::MAX);
    if let Some(error) = proxy.get_status(&link)?.last_error {
        info!("Transfer not applied: {}", error);
    }
    ui.run_pending();

    proxy.set_planet(2);
    session.post_request(Session::add_planet, Planet::new(4, "Rigel"));
    session.post_new_request(|s| {
        s.advance_turn();
    });

    let status = proxy.get_status(&link)?;
    ui.run_pending();
    for kind in CargoKind::ALL {
        info!("{} {}: {}", status.name, kind, status.cargo.get(kind));
    }
    info!("UI thread processed {} status updates", updates.get());

    let (turn, planets) = link.call(&session, |s| (s.turn(), s.planets().count()))?;
    let hash = session.call_async(|s| s.state_hash()).await??;
    info!("Turn {}, {} planets, state hash {}", turn, planets, hash);

    drop(proxy);
    worker.shutdown()?;
    info!("Demo finished");
    Ok(())
}
