// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use anyhow::Context;
use clap::ValueHint;
use tracing::info;

use crate::{config::Config, script::Script, state::Arbiter};

/// The main CLI struct.
#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use the config file at this path instead of the default one
    #[arg(short, long, value_name("FILE"), value_hint(ValueHint::FilePath))]
    pub config: Option<PathBuf>,

    /// Log filter directives, overriding the config's
    ///
    /// `RUST_LOG` still wins over both.
    #[arg(long, value_name("FILTER"))]
    pub log: Option<String>,

    /// Cli subcommands
    #[command(subcommand)]
    pub subcommand: CliSubcommand,
}

/// Cli subcommands.
#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
pub enum CliSubcommand {
    /// Replay a script of requests and events and print what each step did
    Replay {
        /// The script to replay
        #[arg(value_hint(ValueHint::FilePath))]
        script: PathBuf,
    },
    /// Parse the config and print the device topology it describes
    CheckConfig,
}

impl Cli {
    /// Runs the subcommand against an already loaded config.
    pub fn run(&self, config: &Config) -> anyhow::Result<()> {
        let registry = config
            .build_registry()
            .context("Config describes an invalid device topology")?;

        match &self.subcommand {
            CliSubcommand::Replay { script } => {
                let script = Script::load(script)?;
                let mut arbiter = Arbiter::new(registry);

                for (index, outcome) in script.replay(&mut arbiter).into_iter().enumerate() {
                    println!("{}: {outcome}", index + 1);
                }
            }
            CliSubcommand::CheckConfig => {
                for device in registry.devices() {
                    println!(
                        "{:?}: {:?}, paired with {:?}, attached to {:?}",
                        device.id, device.role, device.paired, device.master
                    );
                }
                info!(
                    devices = config.devices.len(),
                    windows = config.windows.len(),
                    cursors = config.cursors.len(),
                    "Config ok"
                );
            }
        }

        Ok(())
    }
}
