//! proctest CLI - Process-orchestration test harness.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use proctest::config::{self, TestConfig};
use proctest::report::{print_summary, write_junit};

#[derive(Parser)]
#[command(name = "proctest")]
#[command(about = "Process-orchestration test harness", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "proctest.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test group
    Run {
        /// JUnit XML output path
        #[arg(long)]
        junit: Option<PathBuf>,

        /// Override the shared working directory
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Override the warm-up delay in milliseconds, for every test
        #[arg(long)]
        warmup_ms: Option<u64>,

        /// Run commands on the host even if a container is configured
        #[arg(long)]
        no_container: bool,
    },

    /// Validate configuration file
    Validate {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Initialize a new configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            junit,
            working_dir,
            warmup_ms,
            no_container,
        } => run_tests(&cli.config, junit, working_dir, warmup_ms, no_container).await,
        Commands::Validate { format } => validate_config(&cli.config, &format),
        Commands::Init => init_config(&cli.config),
    }
}

async fn run_tests(
    config_path: &Path,
    junit_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    warmup_ms: Option<u64>,
    no_container: bool,
) -> Result<()> {
    // Load configuration
    let mut config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Apply overrides
    if let Some(dir) = working_dir {
        config.harness.working_dir = Some(dir);
    }
    if let Some(ms) = warmup_ms {
        config.override_warmup(ms);
    }
    if no_container {
        config.container = None;
    }

    info!("Loaded configuration from {}", config_path.display());

    let base_dir = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let harness = config.to_harness(&base_dir)?;
    info!(
        "Running {} tests in {}",
        config.test_count(),
        harness.runner().working_dir().display()
    );

    let outcome = match harness.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    println!("\n\nTest Results:\n=============");
    outcome
        .report
        .render(&mut std::io::stdout(), &mut std::io::stderr())
        .context("Failed to print report")?;
    print_summary(&outcome.report, outcome.passed, outcome.duration);

    if let Some(path) = junit_path {
        write_junit(&outcome.report, &path, "proctest", outcome.duration)?;
    }

    std::process::exit(outcome.exit_code());
}

fn validate_config(config_path: &Path, format: &str) -> Result<()> {
    let config = match config::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if format == "json" {
        let json = serde_json::to_string_pretty(&config)?;
        println!("{}", json);
        return Ok(());
    }

    println!("Configuration is valid!");
    println!();
    println!("Settings:");
    println!("  Warm-up: {}ms", config.harness.warmup_ms);
    match &config.container {
        Some(container) => println!("  Container: {} ({})", container.image, container.runtime),
        None => println!("  Container: none"),
    }
    if let Some(build) = &config.build {
        println!("  Build: {}", build.command.to_command()?.to_shell_string());
    }
    println!("  Tests: {}", config.test_count());

    for group in &config.groups {
        println!();
        println!("  [{}]", group.name);
        for test in &group.tests {
            println!("    {}", describe_test(test));
        }
    }

    Ok(())
}

fn describe_test(test: &TestConfig) -> String {
    match test {
        TestConfig::ExitCode(cfg) => format!(
            "exit_code {} (expects {})",
            cfg.command.to_command().to_shell_string(),
            cfg.expected_code
        ),
        TestConfig::Output(cfg) => {
            let label = cfg
                .name
                .clone()
                .unwrap_or_else(|| cfg.command.to_command().to_shell_string());
            if cfg.background.is_empty() {
                format!("output {}", label)
            } else {
                format!("output {} ({} background)", label, cfg.background.len())
            }
        }
        TestConfig::Group(group) => format!("group {} ({} tests)", group.name, group.tests.len()),
    }
}

fn init_config(path: &Path) -> Result<()> {
    let config = r#"# proctest configuration file

[harness]
working_dir = "."
warmup_ms = 1000
truncate_lines = 100

# Uncomment to run every command inside a container.
# [container]
# image = "debian:stable-slim"
# volumes = ["build:/build"]
# network = "host"

# Uncomment to build before testing.
# [build]
# command = "make"
# artifacts = ["build/app"]

[[groups]]
name = "smoke"

[[groups.tests]]
kind = "exit_code"
program = "true"
expected_code = 0

[[groups.tests]]
kind = "output"
name = "echo"
program = "echo"
args = ["hello"]
expected = "hello"
"#;

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            path.display()
        );
        std::process::exit(1);
    }

    std::fs::write(path, config)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  proctest run");

    Ok(())
}
