use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use liveloop_core::{LivingConfig, LivingController, LogBook, LogEntry, Status, WorkerInfo};

/// Keep one background thread alive and feed it a task every interval.
///
/// Commands are read from stdin, one per line: start, stop, status, log, help, quit.
#[derive(Debug, Parser)]
#[command(name = "liveloop", version)]
struct Cli {
    /// JSON config file (dispatch_interval_ms, label_length, separator, worker_stack_size).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the dispatch period in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Override the worker label length.
    #[arg(long)]
    label_length: Option<usize>,

    /// Print log entries and status as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Status,
    Log,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(Command::Start),
            "stop" | "x" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "log" => Ok(Command::Log),
            "help" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => bail!("unknown command: {other:?} (try `help`)"),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    status: Status,
    worker: Option<&'a WorkerInfo>,
    dispatcher_armed: bool,
    live_workers: usize,
}

/// stdout 側の表示。ログは届いた分だけ順に流す
struct LogView {
    book: LogBook,
    printed: usize,
    json: bool,
}

impl LogView {
    fn new(book: LogBook, json: bool) -> Self {
        Self {
            book,
            printed: 0,
            json,
        }
    }

    fn flush(&mut self) -> Result<()> {
        let fresh = self.book.entries_since(self.printed);
        self.printed += fresh.len();
        for entry in &fresh {
            self.print(entry)?;
        }
        Ok(())
    }

    fn print(&self, entry: &LogEntry) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(entry)?);
        } else {
            println!("[{}] {}", entry.at.format("%H:%M:%S%.3f"), entry.line);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;
    tracing::debug!(?config, "config loaded");

    let mut controller = LivingController::new(config).context("create controller")?;
    let mut view = LogView::new(controller.log(), cli.json);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    if !cli.json {
        print_help();
    }

    loop {
        tokio::select! {
            open = view.book.changed() => {
                view.flush()?;
                if !open {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                match command {
                    Command::Start => {
                        match controller.start_living() {
                            Ok(transition) if !transition.is_applied() => eprintln!("already running"),
                            Ok(_) => {}
                            Err(err) => eprintln!("start failed: {err}"),
                        }
                    }
                    Command::Stop => {
                        if !controller.stop_living().is_applied() {
                            eprintln!("already stopped");
                        }
                    }
                    Command::Status => print_status(&controller, cli.json)?,
                    Command::Log => {
                        if !cli.json {
                            print!("{}", view.book.render());
                        }
                    }
                    Command::Help => print_help(),
                    Command::Quit => break,
                }
            }
        }
    }

    controller.shutdown().await.context("shut down workers")?;

    // 終了行がドレインされるのを少しだけ待つ
    let _ = tokio::time::timeout(Duration::from_secs(1), view.book.wait_until(|_| false)).await;
    view.flush()?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<LivingConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            LivingConfig::from_json_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => LivingConfig::default(),
    };

    if let Some(ms) = cli.interval_ms {
        config.dispatch_interval_ms = ms;
    }
    if let Some(len) = cli.label_length {
        config.label_length = len;
    }
    config.validate()?;
    Ok(config)
}

fn print_status(controller: &LivingController, json: bool) -> Result<()> {
    let report = StatusReport {
        status: controller.status(),
        worker: controller.current_worker(),
        dispatcher_armed: controller.is_dispatcher_armed(),
        live_workers: controller.live_workers(),
    };
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        let worker = report
            .worker
            .map(|w| format!("{} ({})", w.label, w.id))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "status={:?} worker={} dispatcher_armed={} live_workers={}",
            report.status, worker, report.dispatcher_armed, report.live_workers
        );
    }
    Ok(())
}

fn print_help() {
    println!("commands: start | stop | status | log | help | quit");
}
