mod commands;
mod console_ui;

use clap::{Parser, Subcommand};
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "podbake",
    version,
    about = "Build container images by driving podman through its command line"
)]
struct Cli {
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
    /// Run a build: start a container, provision it, and capture the result.
    Build {
        /// Path to the build TOML file.
        #[arg(default_value = "podbake.toml")]
        config: PathBuf,
        /// Directory under which the host scratch dir is created.
        #[arg(long)]
        temp_root: Option<PathBuf>,
    },
    /// Parse and validate a build file without running anything.
    Validate {
        /// Path to the build TOML file.
        #[arg(default_value = "podbake.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration, defaults applied, as JSON.
    InspectConfig {
        /// Path to the build TOML file.
        #[arg(default_value = "podbake.toml")]
        config: PathBuf,
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
            tracing_subscriber::EnvFilter::try_from_env("PODBAKE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let skip_prereqs = std::env::var("PODBAKE_SKIP_PREREQS").as_deref() == Ok("1");

    let result = match cli.command {
        Commands::Build { config, temp_root } => {
            commands::build::run(&config, temp_root.as_deref(), skip_prereqs, json_output)
        }
        Commands::Validate { config } => commands::validate::run(&config, json_output),
        Commands::InspectConfig { config } => commands::inspect_config::run(&config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(commands::CONFIG_ERROR_PREFIX) {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
