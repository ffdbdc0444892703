#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use sqs_connector::{daemon, Config, ConfigCommands, RunArgs};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Invoke gateway functions for messages popped off an SQS queue.
#[derive(Parser, Debug)]
#[command(name = "sqs-connector")]
#[command(version)]
#[command(about = "Invoke gateway functions for messages popped off an SQS queue.", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume the queue and invoke functions until SIGINT/SIGTERM
    Run(RunArgs),

    /// Inspect the resolved configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Completions and the schema must stay stdout-only and do not need a config.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        println!("{}", Config::json_schema()?);
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            config.validate()?;
            init_logging(&config.log_level)?;
            info!(version = env!("CARGO_PKG_VERSION"), "Starting sqs-connector");
            daemon::run(config).await
        }
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                print!("{}", config.redacted().to_toml_string()?);
                Ok(())
            }
            ConfigCommands::Schema => unreachable!(),
        },
        Commands::Completions { .. } => unreachable!(),
    }
}

/// `RUST_LOG` wins; otherwise the configured level applies.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_cli_accepts_queue_overrides() {
        let cli = Cli::try_parse_from([
            "sqs-connector",
            "run",
            "--queue-url",
            "https://sqs.eu-west-1.amazonaws.com/123/jobs",
            "--region",
            "eu-west-1",
            "--max-number-of-messages",
            "10",
            "--max-wait-time",
            "20",
            "--visibility-timeout",
            "60",
        ])
        .expect("run invocation should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.region.as_deref(), Some("eu-west-1"));
                assert_eq!(args.max_number_of_messages, Some(10));
                assert_eq!(args.max_wait_time, Some(20));
                assert_eq!(args.visibility_timeout, Some(60));
                assert!(args.gateway_url.is_none());
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn run_cli_accepts_openfaas_gateway_url_alias() {
        let cli = Cli::try_parse_from([
            "sqs-connector",
            "run",
            "--openfaas-gateway-url",
            "http://gateway.openfaas:8080",
        ])
        .expect("legacy gateway flag should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.gateway_url.as_deref(), Some("http://gateway.openfaas:8080"));
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["sqs-connector", "config", "show", "--config", "/etc/c.toml"])
            .expect("config show should parse");

        assert_eq!(cli.config, Some(PathBuf::from("/etc/c.toml")));
        match cli.command {
            Commands::Config { config_command } => assert_eq!(config_command, ConfigCommands::Show),
            other => panic!("expected config command, got {other:?}"),
        }
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["sqs-connector", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(
            script.contains("sqs-connector"),
            "completion script should reference binary name"
        );
    }
}
