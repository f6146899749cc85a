use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use message_window::WindowConfig;
use std::path::{Path, PathBuf};
use window_sim::logging::{self, LogConfig, LogFormat, LogLevel};
use window_sim::Scenario;

#[derive(Parser, Debug)]
#[command(
    name = "window-sim",
    about = "Replay scripted sessions against a chat history window",
    version
)]
struct Cli {
    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "MSGWIN_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-format",
        global = true,
        value_enum,
        env = "MSGWIN_LOG_FORMAT",
        default_value_t = LogFormat::Compact,
        help = "Log line format (compact, full, json)"
    )]
    format: LogFormat,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "MSGWIN_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    file: Option<PathBuf>,
}

impl From<&LoggingArgs> for LogConfig {
    fn from(args: &LoggingArgs) -> Self {
        LogConfig {
            level: args.level,
            format: args.format,
            file: args.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and print one JSON report per step.
    Run {
        scenario: PathBuf,

        #[arg(
            long,
            value_name = "PATH",
            help = "Window config TOML; the scenario's [window] table takes precedence"
        )]
        config: Option<PathBuf>,

        #[arg(long, help = "Pretty-print each report")]
        pretty: bool,
    },
    /// Parse and validate a scenario without running it.
    Check { scenario: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig::from(&cli.logging)).context("failed to initialize logging")?;

    match cli.command {
        Command::Run {
            scenario,
            config,
            pretty,
        } => run(&scenario, config.as_deref(), pretty).await,
        Command::Check { scenario } => {
            let parsed = load_scenario(&scenario)?;
            println!(
                "{}: {} chat(s), {} step(s)",
                scenario.display(),
                parsed.chats.len(),
                parsed.steps.len()
            );
            Ok(())
        }
    }
}

async fn run(path: &Path, config: Option<&Path>, pretty: bool) -> Result<()> {
    let scenario = load_scenario(path)?;
    let config = window_config(&scenario, config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let steps = window_sim::scenario::run(&scenario, config, |report| {
        window_sim::scenario::write_report(&mut out, report, pretty)
    })
    .await
    .with_context(|| format!("scenario {} failed", path.display()))?;

    tracing::info!(target: "window_sim", steps, "scenario complete");
    Ok(())
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    Scenario::from_path(path).with_context(|| format!("invalid scenario {}", path.display()))
}

/// Defaults, then the `--config` file, then the scenario's own `[window]`
/// table, with `MSGWIN_*` variables applied last.
fn window_config(scenario: &Scenario, path: Option<&Path>) -> Result<WindowConfig> {
    let base = match (&scenario.window, path) {
        (Some(window), _) => window.clone(),
        (None, Some(path)) => WindowConfig::from_path(path)?,
        (None, None) => WindowConfig::default(),
    };
    Ok(base.with_env_overrides()?)
}
