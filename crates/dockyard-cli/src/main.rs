//! dockyard CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Overrides;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "Declare and wire a container delivery stack", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, env = "DOCKYARD_CONFIG", default_value = "dockyard.kdl")]
    config: PathBuf,

    /// Override the configured namespace
    #[arg(long, env = "DOCKYARD_NAMESPACE")]
    namespace: Option<String>,

    /// Override the target account
    #[arg(long, env = "DOCKYARD_ACCOUNT")]
    account: Option<String>,

    /// Override the target region
    #[arg(long, env = "DOCKYARD_REGION")]
    region: Option<String>,

    /// Parameter state file
    #[arg(long, env = "DOCKYARD_STATE", default_value = ".dockyard/state.json")]
    state: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and the unit graph
    Validate,
    /// Print the declared state as JSON without touching the state file
    Synth {
        /// Only render this unit
        #[arg(long)]
        unit: Option<String>,
    },
    /// Provision units into the state file
    Deploy {
        /// Provision a single unit; its predecessors must already be deployed
        #[arg(long)]
        unit: Option<String>,
    },
    /// Tear down every unit, dependents first
    Destroy,
    /// Inspect published parameters
    Params {
        #[command(subcommand)]
        command: ParamCommands,
    },
    /// Match a registry event against the declared rules
    Event {
        /// Event JSON file, or `-` for stdin
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum ParamCommands {
    /// List parameters
    List {
        /// Key prefix, defaults to the namespace
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Show one parameter
    Get {
        /// Full key, e.g. `demo-ecrrepository`
        key: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let overrides = Overrides {
        namespace: cli.namespace,
        account: cli.account,
        region: cli.region,
    };
    let config = commands::load_config(&cli.config, &overrides)?;

    match cli.command {
        Commands::Validate => {
            commands::validate(&config)?;
        }
        Commands::Synth { unit } => {
            commands::deploy::synth(&config, unit.as_deref()).await?;
        }
        Commands::Deploy { unit } => {
            commands::deploy::deploy(&config, &cli.state, unit.as_deref()).await?;
        }
        Commands::Destroy => {
            commands::deploy::destroy(&config, &cli.state).await?;
        }
        Commands::Params { command } => match command {
            ParamCommands::List { prefix } => {
                commands::params::list(&config, &cli.state, prefix).await?;
            }
            ParamCommands::Get { key } => {
                commands::params::get(&cli.state, &key).await?;
            }
        },
        Commands::Event { path } => {
            commands::event::route(&config, &path).await?;
        }
    }

    Ok(())
}
