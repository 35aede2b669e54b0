use std::io;
use std::os::fd::AsFd;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pty_bridge::{Bridge, BridgeOptions};
use pty_manager::NativeSpawner;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pty-helper", version)]
#[command(about = "Runs a program on a pseudo-terminal, driven by JSON lines on stdin")]
struct Args {
    /// Exit once the child has exited instead of waiting for another spawn
    #[arg(long)]
    exit_on_child_exit: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("pty_helper=debug,pty_bridge=debug,pty_manager=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pty_helper=warn,pty_bridge=warn,pty_manager=warn"))
    };

    // stdout carries the protocol, so logs must stay off it
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let input = io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .context("failed to duplicate stdin")?;

    let options = BridgeOptions {
        exit_on_child_exit: args.exit_on_child_exit,
        ..Default::default()
    };
    info!(?options, "Starting pty-helper");

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let mut bridge = Bridge::new(NativeSpawner::new(), io::stdout(), options);
    bridge.run(input, interrupt).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pty-helper error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
