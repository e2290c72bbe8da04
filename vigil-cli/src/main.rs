use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::CliError;

#[derive(Parser, Debug)]
#[command(name = "vigil", version)]
#[command(about = "Vigil - supervised agents communicating over message queues")]
struct Cli {
    /// Configuration file (default: $VIGIL_CONFIG or config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the orchestrator and all enabled agents until shutdown
    Start,
    /// Ask a running orchestrator to shut down
    Stop,
    /// Show queue sizes and backend health
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Publish a message directly into an agent's queue
    Inject {
        /// Recipient agent
        #[arg(long)]
        agent: String,
        /// Payload as a JSON object
        #[arg(long)]
        payload: String,
        /// Sender recorded on the message
        #[arg(long, default_value = "cli")]
        sender: String,
    },
    /// Discard every message waiting in the configured agents' queues
    Clear,
}

fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = commands::load_config(cli.config)?;
    match cli.command {
        Commands::Start => commands::start(config).await,
        Commands::Stop => commands::stop(config).await,
        Commands::Status { json } => commands::status(config, json).await,
        Commands::Inject {
            agent,
            payload,
            sender,
        } => commands::inject(config, &sender, &agent, &payload).await,
        Commands::Clear => commands::clear(config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inject() {
        let cli = Cli::parse_from([
            "vigil",
            "--log-format",
            "pretty",
            "inject",
            "--agent",
            "watchtower",
            "--payload",
            r#"{"disaster_event": {}}"#,
        ]);
        assert_eq!(cli.log_format, LogFormat::Pretty);
        match cli.command {
            Commands::Inject { agent, sender, .. } => {
                assert_eq!(agent, "watchtower");
                assert_eq!(sender, "cli");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["vigil", "status", "--json", "--config", "other.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("other.yaml")));
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }
}
