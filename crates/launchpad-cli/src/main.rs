use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use launchpad_iam::ActorKind;
use launchpad_rollout::DeploymentStatus;

mod commands;
mod local;

use commands::Workspace;
use commands::deploy::DeployArgs;

#[derive(Parser)]
#[command(
    name = "launchpad",
    about = "Launchpad — provision a compute stack and roll out application revisions",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Stack configuration file
    #[arg(short, long, global = true, default_value = "launchpad.toml")]
    config: PathBuf,
    /// Directory holding the resource ledger
    #[arg(long, global = true, default_value = ".launchpad")]
    state_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a launchpad.toml scaffold
    Init {
        #[arg(long)]
        stack: String,
        #[arg(long, default_value = "dev")]
        environment: String,
        #[arg(long)]
        application: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show what `apply` would change
    Plan,
    /// Reconcile the ledger with the stack configuration
    Apply,
    /// Print role trust and permission documents
    Grant {
        /// pipeline, build, deploy or compute (default: all)
        actor: Option<ActorKind>,
    },
    /// Render the deployment descriptor (appspec.yml)
    Appspec {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a build archive to the artifact bucket
    Upload {
        file: PathBuf,
        #[arg(long)]
        build_id: String,
        #[arg(long, default_value = "dist")]
        archive: String,
    },
    /// Roll an uploaded artifact out to the stack's deployment group
    Deploy {
        /// Object key, e.g. backend/abc123/dist.zip
        key: String,
        /// Pin an object version
        #[arg(long)]
        version: Option<String>,
        /// Unpacked revision holding the hook scripts
        #[arg(long, default_value = ".")]
        revision: PathBuf,
        /// Keep going when ApplicationStop fails
        #[arg(long)]
        ignore_stop_failures: bool,
        /// Run non-root hooks through sudo
        #[arg(long)]
        sudo: bool,
        /// Host answering health probes during traffic cutover
        #[arg(long, default_value = "127.0.0.1")]
        probe_host: String,
    },
    /// Show a deployment, or list all of them
    Status { id: Option<String> },
    /// Expire noncurrent artifact versions past retention
    Gc,
    /// Probe the application's health endpoint once
    Probe {
        /// host:port (default: localhost on the application port)
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("launchpad=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Init {
        stack,
        environment,
        application,
        force,
    } = &cli.command
    {
        return commands::init::init(&cli.config, stack, environment, application, *force);
    }

    let ws = Workspace::load(&cli.config, &cli.state_dir)?;
    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Plan => commands::stack::plan(&ws).map(drop),
        Commands::Apply => commands::stack::apply(&ws).map(drop),
        Commands::Grant { actor } => commands::grant::grant_cmd(&ws, actor),
        Commands::Appspec { output } => commands::appspec::appspec(&ws, output.as_deref()),
        Commands::Upload {
            file,
            build_id,
            archive,
        } => commands::artifacts::upload(&ws, &file, &build_id, &archive).map(drop),
        Commands::Deploy {
            key,
            version,
            revision,
            ignore_stop_failures,
            sudo,
            probe_host,
        } => {
            let args = DeployArgs {
                key,
                version,
                revision_dir: revision,
                ignore_stop_failures,
                sudo,
                probe_host,
            };
            let info = commands::deploy::deploy(&ws, args).await?;
            if info.status != DeploymentStatus::Succeeded {
                bail!("deployment {} finished {:?}", info.id, info.status);
            }
            Ok(())
        }
        Commands::Status { id } => commands::deploy::status(&ws, id.as_deref()),
        Commands::Gc => commands::artifacts::gc(&ws).map(drop),
        Commands::Probe { address, path } => {
            commands::probe::probe(&ws, address.as_deref(), path.as_deref()).await
        }
    }
}
