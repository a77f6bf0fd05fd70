use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mysql_bindgen::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Export MySQL DDL as migration files and generate C++ headers for stored procedures
#[derive(Parser)]
#[command(name = "mysql-bindgen", version, about)]
struct Opts {
    /// Configuration file, JSON (or RON when the name ends in .ron)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

fn main() -> ExitCode {
    // Parse the program options
    let opts = Opts::parse();

    // Diagnostics go to stderr, controlled by RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

fn run(opts: &Opts) -> mysql_bindgen::Result<()> {
    let config = Config::load(&opts.config)?;
    info!("Loaded configuration from {}", opts.config.display());

    println!("Connecting to database...");
    let summary = mysql_bindgen::run(&config)?;
    info!(
        "Generated {} headers in {}",
        summary.headers.len(),
        config.output.directory.display()
    );
    Ok(())
}
