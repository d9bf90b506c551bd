//! askdb: ask questions of a SQL database in plain language.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Run the selected console mode (inspect, pipeline, checkpoints, resume,
//!      or interactive)

use tracing::info;

use askdb::checkpoint::CheckpointStore;
use askdb::console::Console;
use askdb::context::AppContext;
use askdb::db::Database;
use askdb::error::AppError;
use askdb::{config, logger};

const USAGE: &str = "\
Usage: askdb [OPTIONS]

Options:
  -h, --help                 Print help
  -f, --config <PATH>        Path to configuration file (default: config/default.toml)
  -v, -vv, -vvv, -vvvv       Increase logging verbosity
      --inspect              Print dialect, tables and sample rows, then exit
      --pipeline             Write a query, confirm, execute, answer
      --checkpoints          List saved workflow threads, then exit
      --resume <THREAD_ID>   Continue a saved thread from its checkpoint";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Interactive,
    Pipeline,
    Inspect,
    Checkpoints,
    Resume(String),
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    mode: Mode,
    help: bool,
}

impl CliArgs {
    fn set_mode(&mut self, mode: Mode) -> Result<(), String> {
        if self.mode != Mode::Interactive && self.mode != mode {
            return Err("--inspect, --pipeline, --checkpoints and --resume are mutually exclusive".into());
        }
        self.mode = mode;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args(std::env::args().skip(1)).map_err(AppError::Config)?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        app_name = %config.app_name,
        work_dir = %config.work_dir.display(),
        database = %config.database.uri,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        mode = ?args.mode,
        "config loaded"
    );

    let mut console = Console::stdio();
    match args.mode {
        Mode::Inspect => {
            let db = Database::open(&config.database)?;
            console.inspect(&db)?;
        }
        Mode::Pipeline => {
            let ctx = AppContext::build(config).await?;
            console.run_pipeline(&ctx.pipeline).await?;
        }
        Mode::Checkpoints => {
            let store = CheckpointStore::open(&config.checkpoint_dir())?;
            console.list_checkpoints(&store)?;
        }
        Mode::Resume(thread_id) => {
            let ctx = AppContext::build(config).await?.with_turn_observer(|msg| println!("{msg}\n"));
            console.resume(&ctx, &thread_id).await?;
        }
        Mode::Interactive => {
            let ctx = AppContext::build(config).await?.with_turn_observer(|msg| println!("{msg}\n"));
            console.run_interactive(&ctx).await?;
        }
    }

    info!("bye");
    Ok(())
}

fn parse_cli_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut verbosity = 0u8;
    let mut out = CliArgs::default();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => out.help = true,
            "-f" | "--config" => match iter.next() {
                Some(path) => out.config_path = Some(path),
                None => return Err("-f/--config requires a path argument".into()),
            },
            "--inspect" => out.set_mode(Mode::Inspect)?,
            "--pipeline" => out.set_mode(Mode::Pipeline)?,
            "--checkpoints" => out.set_mode(Mode::Checkpoints)?,
            "--resume" => match iter.next() {
                Some(id) => out.set_mode(Mode::Resume(id))?,
                None => return Err("--resume requires a thread id".into()),
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => return Err(format!("unrecognised argument: {other}")),
        }
    }

    out.log_level = logger::level_for_verbosity(verbosity);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        parse_cli_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_to_interactive() {
        assert_eq!(parse(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn verbosity_accumulates() {
        assert_eq!(parse(&["-v"]).unwrap().log_level, Some("warn"));
        assert_eq!(parse(&["-vv", "-v"]).unwrap().log_level, Some("debug"));
        assert_eq!(parse(&["-vvvvv"]).unwrap().log_level, Some("trace"));
    }

    #[test]
    fn config_path_and_mode() {
        let args = parse(&["-f", "my.toml", "--pipeline"]).unwrap();
        assert_eq!(args.config_path.as_deref(), Some("my.toml"));
        assert_eq!(args.mode, Mode::Pipeline);
        assert_eq!(parse(&["--inspect"]).unwrap().mode, Mode::Inspect);
        assert_eq!(parse(&["--checkpoints"]).unwrap().mode, Mode::Checkpoints);
        assert_eq!(
            parse(&["--resume", "0190b6d2-7c1a-7000-8000-000000000000"]).unwrap().mode,
            Mode::Resume("0190b6d2-7c1a-7000-8000-000000000000".into())
        );
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse(&["-f"]).is_err());
        assert!(parse(&["--inspect", "--pipeline"]).is_err());
        assert!(parse(&["--checkpoints", "--resume", "x"]).is_err());
        assert!(parse(&["--resume"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }
}
