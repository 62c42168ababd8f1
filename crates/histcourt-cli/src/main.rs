use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use histcourt_core::{
    ConfigLoader, CourtResources, CourtSettings, SessionOptions, SessionOutcome, SessionStatus,
    TelemetryOptions, UserInput, init_metrics_from_env, init_telemetry, remove_session_logs,
    run_court_session, trace_path,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "histcourt",
    version,
    about = "Put a historical figure or event on trial"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open an interactive court session.
    Run(RunArgs),
    /// Remove the logs and trace of a previous session.
    Forget(ForgetArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// First message sent to the greeter, e.g. a topic to investigate.
    #[arg(long)]
    topic: Option<String>,

    /// Optional session ID (a UUID is generated otherwise).
    #[arg(long)]
    session: Option<String>,

    /// Path to a TOML config file (defaults to `histcourt.toml` when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory where the session trace is written as JSON.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Print the agent trace after the verdict.
    #[arg(long, default_value_t = false)]
    show_trace: bool,
}

#[derive(Args, Debug)]
struct ForgetArgs {
    /// Session ID whose records should be removed.
    #[arg(long)]
    session: String,

    /// Directory holding session traces.
    #[arg(long)]
    trace_dir: Option<PathBuf>,
}

/// Reads user messages from stdin after echoing the greeter's reply.
struct StdinInput;

impl UserInput for StdinInput {
    fn next_message(&mut self, greeter_reply: Option<&str>) -> Option<String> {
        if let Some(reply) = greeter_reply {
            println!("{reply}");
        }

        loop {
            print!("> ");
            io::stdout().flush().ok()?;

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let message = line.trim();
                    if !message.is_empty() {
                        return Some(message.to_string());
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to read from stdin");
                    return None;
                }
            }
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
            Command::Forget(args) => forget_command(args)?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config).context("failed to load configuration")?;

    init_telemetry(TelemetryOptions {
        env_filter: Some(config.logging.level.clone()),
        ..TelemetryOptions::default()
    })?;
    init_metrics_from_env("histcourt")?;

    info!(model = %config.model.name, "opening court session");

    let resources = CourtResources::from_config(&config)?;
    let mut options = SessionOptions::new(CourtSettings::from(&config)).with_session_log(true);

    if let Some(session_id) = args.session {
        options = options.with_session_id(session_id);
    }
    if let Some(topic) = args.topic {
        options = options.with_first_message(topic);
    }
    if let Some(dir) = args.trace_dir {
        options = options.with_trace_dir(dir);
    }

    let outcome = run_court_session(resources, options, &mut StdinInput).await?;
    print_outcome(&outcome);
    if args.show_trace {
        println!();
        print!("{}", outcome.trace.summary().render_markdown());
    }
    Ok(())
}

fn forget_command(args: ForgetArgs) -> Result<()> {
    init_telemetry(TelemetryOptions::default())?;

    remove_session_logs(&args.session)
        .with_context(|| format!("failed to remove logs of session {}", args.session))?;

    if let Some(dir) = args.trace_dir {
        let path = trace_path(&dir, &args.session);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove trace {}", path.display()))?;
        }
    }

    info!(session = %args.session, "session records removed");
    Ok(())
}

fn print_outcome(outcome: &SessionOutcome) {
    match outcome.status {
        SessionStatus::Abandoned => {
            println!("Session {} closed before a topic was chosen.", outcome.session_id);
            return;
        }
        SessionStatus::Completed => {}
    }

    if let Some(summary) = outcome.summary.as_deref() {
        println!("{summary}");
    }
    println!();
    println!("Session: {}", outcome.session_id);
    if let Some(termination) = outcome.termination {
        println!("Trial ended: {termination}");
    }
    for file in &outcome.written_files {
        println!("Verdict written to {file}");
    }
    if let Some(path) = outcome.trace_path.as_ref() {
        println!("Trace saved to {}", path.display());
    }
}
