mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splitscreen")]
#[command(about = "Offline diagnostics for the Halo MCC split screen mod")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve offsets in a memory image dumped from the game
    Scan {
        /// Raw image of the game module
        #[arg(short, long)]
        dump: PathBuf,

        /// Address the image was mapped at (hex)
        #[arg(short, long, default_value = "0x140000000")]
        base: String,

        /// Signature set to use instead of the built-in one (JSON)
        #[arg(short, long)]
        signatures: Option<PathBuf>,

        /// Window title of the dumped game, used to name the export
        #[arg(short, long)]
        title: Option<String>,

        /// Write an offsets export into this directory
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Show the recorded fallback offsets for a game and platform
    Fallback {
        /// Game, e.g. "ce", "h2a", "Halo 3"
        #[arg(short, long)]
        game: String,

        /// Platform: steam or store
        #[arg(short, long, default_value = "steam")]
        platform: String,

        /// Module base to resolve displacements against (hex)
        #[arg(short, long)]
        base: Option<String>,

        /// Config file whose fallback table replaces the built-in one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print or save the built-in signature set
    Signatures {
        /// Output file (JSON); prints to stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("splitscreen_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            dump,
            base,
            signatures,
            title,
            export,
        } => commands::scan::run(
            &dump,
            &base,
            signatures.as_deref(),
            title.as_deref(),
            export.as_deref(),
        ),
        Command::Fallback {
            game,
            platform,
            base,
            config,
        } => commands::fallback::run(&game, &platform, base.as_deref(), config.as_deref()),
        Command::Signatures { output } => commands::signatures::run(output.as_deref()),
    }
}
