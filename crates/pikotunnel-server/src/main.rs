// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! pikotunnel relay binary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pikotunnel_common::{IpAllocator, RelayEndpoint};
use pikotunnel_config::{backup_config_file, PikotunnelConfig, SYSTEM_CONFIG_PATH};
use pikotunnel_db::{
	backup_database, create_pool, default_backup_path, AccessRuleRepository, PeerRepository,
};
use pikotunnel_netdriver::{
	ensure_root, ensure_tools, DriverConfig, NetworkDriver, SystemCommandRunner, REQUIRED_TOOLS,
};
use pikotunnel_reconciler::{job_queue, BootstrapRecovery, ConvergenceWorker, TunnelService};
use pikotunnel_server::{create_router, AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// WireGuard relay with per-pair access rules.
#[derive(Parser, Debug)]
#[command(name = "pikotunnel", about = "WireGuard relay with per-pair access rules", version)]
struct Args {
	/// Config file; defaults to /etc/pikotunnel/pikotunnel.toml
	#[arg(long, short, env = "PIKOTUNNEL_CONFIG", global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Reset the interface, recover stored state and serve the API (default)
	Server,
	/// Reset the interface and filter chain without touching the store
	Flush,
	/// Write a snapshot of the database and a copy of the config file
	Backup {
		/// Destination file; defaults to backup_<timestamp>.db. The config
		/// copy is written beside it with a .toml extension
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let command = args.command.unwrap_or(Command::Server);

	if let Command::Version = command {
		println!("pikotunnel {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config_path = args
		.config
		.clone()
		.unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH));
	let config = match &args.config {
		Some(path) => pikotunnel_config::load_config_with_file(path),
		None => pikotunnel_config::load_config(),
	}
	.context("failed to load configuration")?;

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	match command {
		Command::Server => run_server(config).await,
		Command::Flush => flush(config).await,
		Command::Backup { output } => backup(config, &config_path, output).await,
		Command::Version => Ok(()),
	}
}

fn preflight() -> anyhow::Result<()> {
	ensure_root()?;
	ensure_tools(REQUIRED_TOOLS)?;
	Ok(())
}

fn build_driver(config: &PikotunnelConfig) -> NetworkDriver {
	NetworkDriver::new(
		Arc::new(SystemCommandRunner::new()),
		DriverConfig {
			interface: config.wireguard.interface.clone(),
			chain: config.wireguard.chain.clone(),
			relay_cidr: config.wireguard.subnet,
			listen_port: config.wireguard.listen_port,
			private_key: config.wireguard.private_key.clone(),
		},
	)
}

async fn run_server(config: PikotunnelConfig) -> anyhow::Result<()> {
	preflight()?;

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		interface = %config.wireguard.interface,
		subnet = %config.wireguard.subnet,
		"starting pikotunnel"
	);

	let pool = create_pool(&config.database.url).await?;
	let peers = PeerRepository::new(pool.clone());
	let rules = AccessRuleRepository::new(pool);
	let driver = Arc::new(build_driver(&config));

	let allocator = IpAllocator::from_relay_cidr(
		config.wireguard.subnet,
		config.worker.max_allocation_attempts,
	)?;
	let relay = RelayEndpoint {
		public_key: config.wireguard.public_key.clone(),
		public_ip: config.wireguard.relay_public_ip.clone(),
		listen_port: config.wireguard.listen_port,
		client_subnet: config.wireguard.client_subnet(),
	};

	let (jobs_tx, jobs_rx) = job_queue(config.worker.queue_capacity);
	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	// Started before recovery so a large backlog cannot fill the queue.
	let worker = ConvergenceWorker::new(peers.clone(), rules.clone(), driver.clone());
	let worker_handle = tokio::spawn(worker.run(jobs_rx, shutdown_rx));

	BootstrapRecovery::new(peers.clone(), rules.clone(), driver.clone(), jobs_tx.clone())
		.run()
		.await?;

	let service = TunnelService::new(peers, rules, driver, jobs_tx, allocator, relay);
	let app = create_router(AppState::new(service), config.http.api_token.clone());

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;
	tracing::info!(%addr, "listening");

	let served = axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await;
	if let Err(e) = &served {
		tracing::error!(error = %e, "server error");
	}

	tracing::info!("draining job queue");
	let _ = shutdown_tx.send(true);
	match worker_handle.await {
		Ok(stats) => tracing::info!(?stats, "shutdown complete"),
		Err(e) => tracing::error!(error = %e, "convergence worker task failed"),
	}

	served.map_err(Into::into)
}

async fn shutdown_signal() {
	match tokio::signal::ctrl_c().await {
		Ok(()) => tracing::info!("received shutdown signal"),
		Err(e) => {
			tracing::error!(error = %e, "failed to listen for shutdown signal");
			std::future::pending::<()>().await;
		}
	}
}

async fn flush(config: PikotunnelConfig) -> anyhow::Result<()> {
	preflight()?;
	build_driver(&config).initialize_interface().await?;
	tracing::info!(interface = %config.wireguard.interface, "interface reset");
	Ok(())
}

async fn backup(
	config: PikotunnelConfig,
	config_path: &Path,
	output: Option<PathBuf>,
) -> anyhow::Result<()> {
	let pool = create_pool(&config.database.url).await?;
	let destination = output.unwrap_or_else(default_backup_path);
	backup_database(&pool, &destination).await?;
	println!("{}", destination.display());

	match backup_config_file(config_path, &destination)? {
		Some(copy) => println!("{}", copy.display()),
		None => tracing::warn!(
			path = %config_path.display(),
			"config file not found, relay keys from the environment are not in the backup"
		),
	}
	Ok(())
}
