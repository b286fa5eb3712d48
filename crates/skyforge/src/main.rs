mod commands;

use clap::{Parser, Subcommand};
use skyforge_core::TargetKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyforge")]
#[command(about = "Converge declared cloud infrastructure", long_about = None)]
struct Cli {
    /// Settings file (skips discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cluster name, overriding the manifest and settings
    #[arg(long, global = true)]
    cluster: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the order tasks are converged in
    Order {
        /// Cluster manifest
        manifest: PathBuf,
    },
    /// Emit a Terraform or CloudFormation document
    Render {
        /// Cluster manifest
        manifest: PathBuf,
        /// terraform or cloudformation (defaults to the settings file)
        #[arg(short, long)]
        target: Option<TargetKind>,
        /// Write the document here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Converge into an in-memory cloud twice, then tear it down
    Simulate {
        /// Cluster manifest
        manifest: PathBuf,
    },
    /// Show version information
    Version,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Version needs no settings
    if matches!(cli.command, Commands::Version) {
        println!("skyforge {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = match &cli.config {
        Some(path) => skyforge_config::load_from(path)?,
        None => skyforge_config::load()?,
    };
    if let Some(source) = &settings.source {
        tracing::debug!(path = %source.display(), "loaded settings");
    }
    let session = commands::Session::new(settings, cli.cluster);

    match cli.command {
        Commands::Order { manifest } => {
            commands::order::handle(&session, &manifest)?;
        }
        Commands::Render {
            manifest,
            target,
            out,
        } => {
            commands::render::handle(&session, &manifest, target, out.as_deref()).await?;
        }
        Commands::Simulate { manifest } => {
            commands::simulate::handle(&session, &manifest).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before settings are loaded");
        }
    }

    Ok(())
}
