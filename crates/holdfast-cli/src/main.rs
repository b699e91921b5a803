mod commands;
mod fleet;
mod signal;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::CliError;
use fleet::FleetConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "holdfast",
    version,
    about = "Fleet bootstrap engine for self-hosted infrastructure services"
)]
struct Cli {
    /// Path to the fleet configuration file.
    #[arg(long, default_value = "holdfast.toml")]
    config: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the dependency-resolved install order without installing.
    Resolve {
        /// Component names to resolve.
        #[arg(required = true)]
        components: Vec<String>,
    },
    /// Install components and their dependencies on the target.
    Install {
        /// Component names to install.
        #[arg(required = true)]
        components: Vec<String>,
    },
    /// Report the observed state of components (all when none are named).
    Status {
        /// Component names to inspect.
        components: Vec<String>,
    },
    /// Remove components from the target. Dependencies are kept.
    Uninstall {
        /// Component names to remove.
        #[arg(required = true)]
        components: Vec<String>,
    },
    /// List registered components and their dependencies.
    List,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("HOLDFAST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    signal::install_signal_handler();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<u8, CliError> {
    let config = FleetConfig::load_or_default(&cli.config).map_err(CliError::Config)?;
    let registry = commands::build_fleet(&config)?;

    match &cli.command {
        Commands::Resolve { components } => commands::resolve::run(&registry, components, cli.json),
        Commands::Install { components } => commands::install::run(&registry, &config, components),
        Commands::Status { components } => commands::status::run(&registry, components, cli.json),
        Commands::Uninstall { components } => commands::uninstall::run(&registry, components),
        Commands::List => commands::list::run(&registry, cli.json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(*shell),
    }
}
