// Copyright 2026 the zonegate authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The `zonegate` binary: an RFC 2136 dynamic-update gateway in front of a
//! hosted DNS provider.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zonegate_server::config::Config;
use zonegate_server::forwarder::Forwarder;
use zonegate_server::store::remote::RemoteStore;
use zonegate_server::{Gateway, ServerFuture};

/// Command line arguments of the `zonegate` binary.
#[derive(Debug, Parser)]
#[command(name = "zonegate", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long, default_value = "/etc/zonegate.toml")]
    config: PathBuf,

    /// Override the listening port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Turn on `DEBUG` messages (default is only `INFO`)
    #[arg(short, long, conflicts_with = "quiet")]
    debug: bool,

    /// Disable `INFO` messages, `WARN` and `ERROR` will remain
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self, config_level: Option<&str>) -> String {
        if self.debug {
            "debug".to_string()
        } else if self.quiet {
            "warn".to_string()
        } else {
            config_level.unwrap_or("info").to_string()
        }
    }
}

fn init_logging(level: &str) {
    // RUST_LOG wins over flags and config
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::read_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to read config {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    init_logging(&cli.log_level(config.log_level()));

    info!("zonegate {} starting", zonegate_server::version());

    let store = match RemoteStore::from_config(config.store()) {
        Ok(store) => store,
        Err(e) => {
            error!("failed to build the zone store client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let forwarder = Forwarder::from_config(config.forward());
    let gateway = Gateway::new(Arc::new(store), forwarder);
    let mut server = ServerFuture::new(gateway);

    let listen_addrs = match config.listen_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            error!("invalid listen address in config: {e}");
            return ExitCode::FAILURE;
        }
    };
    let port = cli.port.unwrap_or_else(|| config.listen_port());

    for ip in listen_addrs {
        let addr = SocketAddr::new(ip, port);
        match UdpSocket::bind(addr).await {
            Ok(socket) => {
                info!("listening for UDP on {addr}");
                server.register_socket(socket);
            }
            Err(e) => {
                error!("could not bind to UDP socket {addr}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    // a dead listener is fatal, per-request failures never bubble up here
    if let Err(e) = server.block_until_done().await {
        error!("server failure: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
