//! rouw-bot entry point.
//!
//! Startup: `.env`, config, logger, store + service, then the HTTP API
//! until Ctrl-C. `-v` flags on the command line beat the configured level.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::info;

use rouw_bot::{api, config, error::AppError, logger, service::BotService};

const USAGE: &str = "\
Usage: rouw-bot [OPTIONS]

Options:
  -h, --help             Print help
  -f, --config <PATH>    Configuration file (default: config/default.toml)
  -v, -vv, -vvv, -vvvv   Log verbosity (warn, info, debug, trace)";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    verbosity: u8,
    config_path: Option<String>,
    help: bool,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut out = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--" => break,
                "-h" | "--help" => out.help = true,
                "-f" | "--config" => {
                    let path = args.next().ok_or("-f/--config requires a path argument")?;
                    out.config_path = Some(path);
                }
                "--verbose" => out.verbosity = out.verbosity.saturating_add(1),
                flag if flag.len() > 1 && flag.starts_with('-') && flag[1..].chars().all(|c| c == 'v') => {
                    out.verbosity = out.verbosity.saturating_add((flag.len() - 1) as u8);
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn log_level(&self) -> Option<&'static str> {
        match self.verbosity {
            0 => None,
            1 => Some("warn"),
            2 => Some("info"),
            3 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {msg}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    // Optional; a missing .env is not an error.
    let _ = dotenvy::dotenv();

    let config = config::load(args.config_path.as_deref())?;
    let level = args.log_level().unwrap_or(config.log_level.as_str());
    logger::init(level, config.log_file.as_deref())?;
    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        log_level = level,
        "config loaded"
    );

    let service = BotService::from_config(&config)?;
    if !config.http.enabled {
        info!("http disabled in config; nothing to serve");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            on_ctrl_c.cancel();
        }
    });

    api::serve(&config.http.bind, service, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn verbosity_flags_accumulate() {
        let args = parse(&["-vv", "--verbose"]).unwrap();
        assert_eq!(args.verbosity, 3);
        assert_eq!(args.log_level(), Some("debug"));
    }

    #[test]
    fn config_path_requires_value() {
        assert_eq!(parse(&["-f", "x.toml"]).unwrap().config_path.as_deref(), Some("x.toml"));
        assert!(parse(&["--config"]).is_err());
    }

    #[test]
    fn arguments_after_double_dash_are_ignored() {
        let args = parse(&["--", "-vvvv"]).unwrap();
        assert_eq!(args, CliArgs::default());
        assert_eq!(args.log_level(), None);
    }
}
