mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use commands::GenerateOptions;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Route generation requests across AI providers", long_about = None)]
struct Args {
    /// Path to the relay TOML config
    #[arg(long, env = "RELAY_CONFIG", default_value = "relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a response and print it with provider stats
    Generate {
        #[arg(long)]
        prompt: String,

        /// Provider to try first
        #[arg(long)]
        provider: Option<String>,

        /// Use only --provider, without failover
        #[arg(long, default_value_t = false, requires = "provider")]
        only: bool,

        /// Domain tag selecting fallback text
        #[arg(long)]
        domain: Option<String>,

        /// System message
        #[arg(long)]
        system: Option<String>,

        /// Send the same request this many times (repeats hit the cache)
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// List providers with model info and circuit state
    Providers,
    /// Probe provider connectivity
    Check {
        #[arg(long)]
        provider: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let orchestrator = commands::load_orchestrator(&args.config)?;
    info!(
        config = %args.config.display(),
        providers = orchestrator.provider_ids().len(),
        "Relay starting"
    );

    let ok = match args.command {
        Command::Generate {
            prompt,
            provider,
            only,
            domain,
            system,
            repeat,
        } => {
            let options = GenerateOptions {
                prompt,
                provider,
                only,
                domain,
                system,
                repeat,
            };
            let report = commands::generate(&orchestrator, &options).await;
            print_json(&report)?;
            report.all_succeeded()
        }
        Command::Providers => {
            print_json(&commands::providers(&orchestrator))?;
            true
        }
        Command::Check { provider } => {
            let results = commands::check(&orchestrator, provider.as_deref()).await;
            print_json(&results)?;
            !results.is_empty() && results.values().all(|ok| *ok)
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate() {
        let args = Args::try_parse_from([
            "relay",
            "--config",
            "alt.toml",
            "generate",
            "--prompt",
            "hi",
            "--provider",
            "openai",
            "--only",
            "--repeat",
            "3",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("alt.toml"));
        match args.command {
            Command::Generate {
                prompt,
                provider,
                only,
                repeat,
                ..
            } => {
                assert_eq!(prompt, "hi");
                assert_eq!(provider.as_deref(), Some("openai"));
                assert!(only);
                assert_eq!(repeat, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_only_requires_provider() {
        assert!(Args::try_parse_from(["relay", "generate", "--prompt", "hi", "--only"]).is_err());
    }

    #[test]
    fn test_parse_check() {
        let args = Args::try_parse_from(["relay", "check", "--provider", "claude"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Check { provider: Some(ref p) } if p == "claude"
        ));
    }
}
