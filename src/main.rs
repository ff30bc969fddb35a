// main.rs - main program
//
// ts6-pseudoserver - TS6 pseudo-server
// Copyright (C) 2022  Mateusz Szpakowski
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 2.1 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA

mod command;
mod config;
mod help;
mod matcher;
mod reply;
mod state;
mod utils;

use clap::Parser;
use std::process;
use tracing::*;
use tracing_subscriber::EnvFilter;

use config::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match MainConfig::new(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let default_level = if config.options.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting {} ({}) as {}", config.server.name, config.server.sid,
            config.bot.nick);
    if let Err(e) = state::run(config).await {
        error!("Error: {}", e);
        process::exit(1);
    }
}
