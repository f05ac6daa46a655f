// SPDX-License-Identifier: GPL-3.0-or-later

use clap::Parser;
use grab_arbiter::{cli::Cli, config::Config};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    let fallback = cli
        .log
        .as_deref()
        .or(config.log_filter.as_deref())
        .unwrap_or(DEFAULT_LOG_FILTER);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(fallback)?,
    };

    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    cli.run(&config)
}
