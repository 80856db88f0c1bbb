//! webterm CLI - attach the local terminal to a web-terminal session.
//!
//! This is the main binary entry point. See the `webterm` library for the
//! connection machinery.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, LeaveAlternateScreen},
};
use mimalloc::MiMalloc;
use webterm::connection::{self, AttachOptions, AttachOutcome};
use webterm::env::Environment;
use webterm::status::display;
use webterm::surface::{CrosstermSurface, TerminalSurface};
use webterm::{Config, StatusClient, StatusPoller};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "webterm")]
#[command(version)]
#[command(about = "Attach the local terminal to a web-terminal session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to a session; Ctrl+] detaches
    Attach {
        /// Session identifier
        session_id: String,
        /// Text to paste into the session once connected
        #[arg(long, value_name = "TEXT")]
        send: Option<String>,
        #[command(flatten)]
        overrides: AttachOverrides,
    },
    /// Print a one-line status for a session
    Status {
        /// Session identifier
        session_id: String,
        /// Server base URL (http:// or https://)
        #[arg(long)]
        server: Option<String>,
    },
    /// Print the effective configuration as JSON
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Command-line overrides, applied on top of file and environment config.
#[derive(Args)]
struct AttachOverrides {
    /// Server base URL (http:// or https://)
    #[arg(long)]
    server: Option<String>,
    /// Consecutive failed reconnect attempts before giving up
    #[arg(long)]
    max_reconnects: Option<u32>,
    /// Delay before the first reconnect attempt
    #[arg(long)]
    base_delay_ms: Option<u64>,
    /// Ceiling for the reconnect delay
    #[arg(long)]
    max_delay_ms: Option<u64>,
    /// Seconds between status polls
    #[arg(long)]
    poll_interval: Option<u64>,
}

impl AttachOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(server) = self.server {
            config.server_url = server;
        }
        if let Some(n) = self.max_reconnects {
            config.max_reconnect_attempts = n;
        }
        if let Some(ms) = self.base_delay_ms {
            config.base_delay_ms = ms;
        }
        if let Some(ms) = self.max_delay_ms {
            config.max_delay_ms = ms;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval = secs;
        }
    }
}

/// Log to a file: stdout and stderr belong to the remote terminal.
fn init_logging() {
    let log_path = std::env::var("WEBTERM_LOG_FILE")
        .map(PathBuf::from)
        .or_else(|_| Config::config_dir().map(|dir| dir.join("webterm.log")));

    let target: Box<dyn std::io::Write + Send> =
        match log_path.and_then(|path| Ok(std::fs::File::create(path)?)) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(std::io::sink()),
        };

    let filter = Environment::current().default_log_filter();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .target(env_logger::Target::Pipe(target))
        .format_timestamp_secs()
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn attach(session_id: &str, send: Option<String>, overrides: AttachOverrides) -> Result<i32> {
    let mut config = Config::load()?;
    overrides.apply(&mut config);
    log::info!(
        "webterm v{} attaching to {} on {}",
        env!("CARGO_PKG_VERSION"),
        session_id,
        config.base_url()
    );

    let outcome = runtime()?.block_on(async {
        let client = StatusClient::new(config.base_url())?;
        let (status_rx, poll_task) =
            StatusPoller::new(client, session_id, config.poll_interval()).spawn();

        let mut surface = CrosstermSurface::new();
        surface.attach().context("failed to take over the terminal")?;

        let options = AttachOptions {
            paste: send,
            ..AttachOptions::from_config(&config, session_id)
        };
        let outcome = connection::run_attach(&mut surface, options, Some(status_rx)).await;

        poll_task.abort();
        surface.dispose();
        Ok::<_, anyhow::Error>(outcome)
    })?;

    match outcome {
        AttachOutcome::SessionEnded => println!("[webterm] session {session_id} ended"),
        AttachOutcome::Detached => println!("[webterm] detached from {session_id}"),
        AttachOutcome::Disconnected => eprintln!(
            "[webterm] lost connection to {session_id} after {} reconnect attempts; \
             run the command again to reattach",
            config.max_reconnect_attempts
        ),
    }
    Ok(outcome.exit_code())
}

fn status(session_id: &str, server: Option<String>) -> Result<i32> {
    let mut config = Config::load()?;
    if let Some(server) = server {
        config.server_url = server;
    }

    let client = StatusClient::new(config.base_url())?;
    let found = runtime()?
        .block_on(client.find_session(session_id))
        .with_context(|| format!("failed to query {}", client.sessions_url()))?;

    match found {
        Some(session) => {
            println!(
                "{}",
                display::status_line(&session, None, chrono::Utc::now())
            );
            Ok(0)
        }
        None => {
            eprintln!("Session {session_id} not found");
            Ok(1)
        }
    }
}

fn main() -> Result<()> {
    init_logging();

    // Restore the terminal before the default panic output
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        let _ = disable_raw_mode();
        let _ = execute!(
            std::io::stdout(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        );
        default_hook(panic_info);
    }));

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Attach {
            session_id,
            send,
            overrides,
        } => attach(&session_id, send, overrides)?,
        Commands::Status { session_id, server } => status(&session_id, server)?,
        Commands::Config { save } => {
            let config = Config::load()?;
            if save {
                config.save()?;
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
