// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::process::ExitCode;

use clap::Parser;
use cargovera::config::{build_config, ENV_PREFIX};
use cargovera::{shutdown_signal, CargoveraServer};

/// Cargovera shipping and fulfillment service.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (json, yaml or toml).
    #[arg(short, long, default_value = "")]
    file: String,

    /// Read settings from `CARGOVERA_*` environment variables.
    #[arg(short, long)]
    env: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match build_config(args.env, &args.file) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!(
                "Invalid configuration: {} (file {:?}, env prefix {})",
                e, args.file, ENV_PREFIX
            );
            return ExitCode::FAILURE;
        }
    };

    let level = if settings.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let server = match CargoveraServer::build(settings) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };
    server.bind_with_shutdown(shutdown_signal());
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
