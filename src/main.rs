use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use draftsman::config::Config;
use draftsman::git_ops::CommitOutcome;
use draftsman::workflow::{Approval, BatchCommit, BatchReport, Rejection, Session};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DRAFTSMAN_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "draftsman",
    about = "Turn code blocks from model responses into reviewed, committed file changes",
    version
)]
struct Args {
    /// Project directory (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    project: PathBuf,

    /// Config file to use instead of the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new project with a README and an initial commit
    New {
        dir: PathBuf,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Propose the code blocks of a response ("-" reads stdin)
    Propose {
        response: PathBuf,
        /// The message that produced the response, used to infer filenames
        #[arg(short, long, default_value = "")]
        message: String,
        /// Approve without prompting
        #[arg(long, conflicts_with = "no")]
        yes: bool,
        /// Reject without prompting
        #[arg(long)]
        no: bool,
    },
    /// Show recent commits
    History {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Revert the last commit
    Undo,
    /// Reset the project to a commit
    Revert { reference: String },
    /// Commit every current change
    Snapshot { description: String },
    /// List modified files
    Status,
    /// List backups
    Backups,
    /// Restore a file from a backup
    Restore { backup: PathBuf, path: String },
    /// Show the effective config, or write it out with --init
    Config {
        #[arg(long)]
        init: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match args.command {
        Command::Config { init } => {
            let location = match &args.config {
                Some(path) => path.display().to_string(),
                None => Config::config_location(),
            };
            if init {
                match &args.config {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
                println!("Wrote {}", location);
            } else {
                println!("# {}", location);
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        Command::New { dir, description } => {
            let session = Session::create_project(&dir, &description, config)?;
            println!("Created project at {}", session.root().display());
        }
        Command::Propose {
            response,
            message,
            yes,
            no,
        } => {
            let mut session = Session::open(&args.project, config)?;
            let text = read_response(&response)?;
            propose(&mut session, &text, &message, yes, no)?;
        }
        Command::History { limit } => {
            let session = Session::open(&args.project, config)?;
            let limit = limit.unwrap_or(session.config().history_limit);
            let records = session.history(limit)?;
            if records.is_empty() {
                println!("No commits yet");
            }
            for record in records {
                println!("{}", record);
            }
        }
        Command::Undo => {
            let session = Session::open(&args.project, config)?;
            session
                .undo_last()
                .context("Could not revert the last change")?;
            println!("Reverted the last change");
        }
        Command::Revert { reference } => {
            let session = Session::open(&args.project, config)?;
            session
                .revert_to(&reference)
                .with_context(|| format!("Could not revert to {}", reference))?;
            println!("Reverted to {}", reference);
        }
        Command::Snapshot { description } => {
            let session = Session::open(&args.project, config)?;
            match session.snapshot(&description)? {
                CommitOutcome::Committed(record) => println!("Created snapshot {}", record),
                CommitOutcome::NothingToCommit => println!("Nothing to snapshot"),
            }
        }
        Command::Status => {
            let session = Session::open(&args.project, config)?;
            let files = session.status()?;
            if files.is_empty() {
                println!("No modified files");
            } else {
                println!("Modified files:");
                for file in files {
                    println!("  - {}", file);
                }
            }
        }
        Command::Backups => {
            let session = Session::open(&args.project, config)?;
            let backups = session.backups();
            if backups.is_empty() {
                println!("No backups");
            }
            for backup in backups {
                let shown = backup.strip_prefix(session.root()).unwrap_or(&backup);
                println!("{}", shown.display());
            }
        }
        Command::Restore { backup, path } => {
            let session = Session::open(&args.project, config)?;
            let backup = if backup.is_absolute() {
                backup
            } else {
                session.root().join(backup)
            };
            session.restore(&backup, &path)?;
            println!("Restored {} from {}", path, backup.display());
        }
    }

    Ok(())
}

fn read_response(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read response from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read response {}", source.display()))
}

fn propose(session: &mut Session, text: &str, message: &str, yes: bool, no: bool) -> Result<()> {
    let report = session.ingest(text, message);
    for name in &report.invalid {
        println!("Skipping invalid filename: {}", name);
    }

    let preview_chars = session.config().preview_chars;
    for (i, proposal) in session.pending().iter().enumerate() {
        println!();
        println!("{}", proposal.render(i + 1, preview_chars));
    }

    if session.pending().is_empty() {
        println!("No file changes detected in the response");
        return Ok(());
    }

    let approve = if yes {
        true
    } else if no {
        false
    } else {
        println!();
        println!("{}", "=".repeat(70));
        println!("Detected {} file(s) in the response.", session.pending().len());
        print!("Press Enter to approve all changes, or type 'q' to reject: ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
    };

    if approve {
        if let Approval::Applied(report) = session.approve() {
            print_batch(&report);
        }
    } else if let Rejection::Rejected(paths) = session.reject() {
        println!("Rejected {} proposed change(s):", paths.len());
        for path in paths {
            println!("  - {}", path);
        }
    }
    Ok(())
}

fn print_batch(report: &BatchReport) {
    for change in &report.outcome.succeeded {
        println!("{} file: {}", change.action.verb(), change.path);
    }
    for failure in &report.outcome.failed {
        println!("Failed to apply change to {}: {}", failure.path, failure.reason);
    }

    let succeeded = report.outcome.succeeded.len();
    let failed = report.outcome.failed.len();
    if succeeded > 0 {
        println!();
        println!("Successfully processed {} file(s)", succeeded);
        if failed > 0 {
            println!(
                "Failed to process {} file(s): {}",
                failed,
                report.outcome.failed_paths().join(", ")
            );
        }
    } else {
        println!("Failed to process all {} file(s)", failed);
    }

    match &report.commit {
        BatchCommit::Committed(record) => println!("Committed {}", record),
        BatchCommit::NothingToCommit => println!("Nothing new to commit"),
        BatchCommit::Skipped => {}
        BatchCommit::Failed(reason) => println!("Changes written but not committed: {}", reason),
    }
}
