use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use quota_monitor::config::{ConfigLoader, ConfigStore, FileStore, MemoryStore, Settings};
use quota_monitor::content::RemotePage;
use quota_monitor::parser::{Pacing, ParserSet};
use quota_monitor::source::{self, SOURCES};
use quota_monitor::{Agent, AgentCommand, AgentOptions, AgentState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "quota-monitor")]
#[command(version = "0.1.0")]
#[command(about = "Watches billing and usage pages and forwards changes to a local collector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a page until Ctrl-C
    Run {
        /// Page to monitor; its host selects the source
        #[arg(short = 'u', long)]
        page: String,

        /// Settings file (JSON/YAML/TOML); settings last for the session without it
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Show a status spinner (stderr)
        #[arg(short, long, default_value_t = false)]
        progress: bool,
    },
    /// Extract a page once and print the record
    Check {
        #[arg(short = 'u', long)]
        page: String,
    },
    /// List the known sources
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = indicatif::MultiProgress::new();

    match cli.command {
        Commands::Run { page, store, progress } => {
            let level = logger.filter();
            if progress {
                indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init()?;
            } else {
                log::set_boxed_logger(Box::new(logger))?;
            }
            log::set_max_level(level);

            let source = source::for_url(&page)
                .with_context(|| format!("No known source serves {}", page))?;
            let store: Arc<dyn ConfigStore> = match store {
                Some(path) => {
                    log::info!("Loading settings from {:?}", path);
                    Arc::new(FileStore::open(&path)?)
                }
                None => Arc::new(MemoryStore::new()),
            };
            let settings = Arc::new(Settings::load(store));
            settings.apply_overrides(&ConfigLoader::env_overrides()?);

            log::info!("Opening {} ({})", page, source.label);
            let content = Arc::new(RemotePage::open(&page).await?);
            let agent = Agent::new(source, content, settings, AgentOptions::default())?;
            agent.start().await;
            let commands = agent.commands().await;

            let stdin_task = tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<AgentCommand>() {
                        Ok(command) => {
                            if commands.send(command).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("{} (try: run | stop | resume | set <interval> <reload> [url])", e),
                    }
                }
            });

            let mut spinner_task = None;
            let mut spinner: Option<ProgressBar> = None;
            if progress {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
                pb.enable_steady_tick(Duration::from_millis(120));

                let mut state_rx = agent.watch_state();
                let pb_clone = pb.clone();
                spinner = Some(pb);
                spinner_task = Some(tokio::spawn(async move {
                    while state_rx.changed().await.is_ok() {
                        let state: AgentState = state_rx.borrow().clone();
                        pb_clone.set_message(status_line(&state));
                    }
                }));
            }

            tokio::signal::ctrl_c().await?;
            log::info!("Shutting down...");
            agent.shutdown().await;
            stdin_task.abort();
            if let Some(task) = spinner_task {
                task.abort();
            }
            if let Some(pb) = spinner {
                pb.finish_with_message(status_line(&agent.state().await));
            }

            let stats = agent.stats();
            let state = agent.state().await;
            println!("\n✅ Monitoring stopped: {}", source.label);
            println!("   Cycles: {} run, {} skipped", stats.cycles_started, stats.cycles_skipped);
            println!(
                "   Pushes: {} sent, {} unchanged, {} failed ({:.1}% ok, avg {}ms)",
                stats.pushes_sent,
                stats.pushes_unchanged,
                stats.push_failures,
                stats.push_success_rate,
                stats.avg_push_time_ms
            );
            println!("   Polls: {} ({} failed, {} refresh commands)", stats.polls, stats.poll_failures, stats.refresh_commands);
            println!("   Reloads: {}", stats.document_reloads);
            println!("   Uptime: {:.1}s", stats.uptime_seconds);
            if let Some(data) = state.last_data {
                println!("   Last data:");
                for line in data.preview().lines() {
                    println!("     {}", line);
                }
            }
        }
        Commands::Check { page } => {
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(log::LevelFilter::Info);

            let Some(source) = source::for_url(&page) else {
                eprintln!("❌ No known source serves {}", page);
                std::process::exit(1);
            };
            let content = RemotePage::open(&page).await?;
            let record = ParserSet::new(Pacing::Immediate)
                .extract(source.key, &content)
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if !record.has_data() {
                eprintln!("❌ No data found on {}", page);
                std::process::exit(1);
            }
        }
        Commands::Sources => {
            for source in &SOURCES {
                println!("{:<16} {:<20} every {:>4}s  {}", source.key, source.label, source.default_interval_secs, source.page_url);
            }
        }
    }

    Ok(())
}

fn status_line(state: &AgentState) -> String {
    let sent = state
        .last_sent_at
        .map(|at| at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let mut line = format!("{:?} | last sent {}", state.status, sent);
    if !state.last_error.is_empty() {
        line.push_str(&format!(" | {}", state.last_error));
    }
    line
}
