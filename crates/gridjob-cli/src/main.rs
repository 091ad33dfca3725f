use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "gridjob",
    about = "GridJob — ship and run computation graphs on a cluster",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy resources, run a graph to completion, then destroy the job.
    ///
    /// The graph file is JSON: `{"body": ..., "references": ["name", ...]}`.
    Submit {
        /// Client configuration (gridjob.toml).
        #[arg(short, long, default_value = "gridjob.toml")]
        config: PathBuf,
        /// Cluster-unique job name.
        #[arg(short, long)]
        name: String,
        /// Graph file.
        #[arg(short, long)]
        graph: PathBuf,
        /// Directory code identifiers are resolved against.
        #[arg(long, default_value = ".")]
        code_root: PathBuf,
        /// Code identifier, e.g. `com.acme.Tokenizer`.
        #[arg(long = "code")]
        code: Vec<String>,
        /// Archive locator (path, file:// or http(s):// URL).
        #[arg(long = "archive")]
        archives: Vec<String>,
        /// Data file locator.
        #[arg(long = "data")]
        data: Vec<String>,
    },
    /// Manage gridjob.toml.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a gridjob.toml scaffold.
    Init {
        /// Address of gridjobd.
        #[arg(short, long, default_value = "127.0.0.1:8470")]
        address: String,
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridjob=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            config,
            name,
            graph,
            code_root,
            code,
            archives,
            data,
        } => commands::submit::run(commands::submit::SubmitArgs {
            config,
            name,
            graph,
            code_root,
            code,
            archives,
            data,
        }),
        Commands::Config { action } => match action {
            ConfigAction::Init { address, path } => commands::config::init(&path, &address),
        },
    }
}
