// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

use std::path::PathBuf;

use clap::Parser;

/// Main CLI structure for parsing command-line arguments and options.
#[derive(Debug, Parser)]
#[clap(version, about, author)]
pub struct TraderCli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available top-level commands.
#[derive(Parser, Debug)]
pub enum Commands {
    /// Runs the trader until interrupted.
    Run(RunOpt),
    /// Validates a config file, including every cron expression it names.
    CheckConfig(ConfigOpt),
}

/// Where the config is loaded from.
#[derive(Parser, Debug, Clone)]
pub struct ConfigOpt {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, short, env = "TRADER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Options for the `run` command.
#[derive(Parser, Debug, Clone)]
pub struct RunOpt {
    #[clap(flatten)]
    pub config: ConfigOpt,
    /// Uses an in-process message bus instead of Redis.
    #[arg(long)]
    pub in_memory: bool,
}
