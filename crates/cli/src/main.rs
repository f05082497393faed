use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kennel_api::{CareApi, MemoryApi, NoticeReceiver};
use kennel_core::{CareBoard, CareCategory, CareEvent, Dog};
use kennel_ops::{CareSession, SessionConfig};
use kennel_store::BoardBuilder;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kennelctl", version, about = "Kennel care CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a scripted care-grid session against the in-memory backend
    Simulate {
        /// Inject a backend write failure mid-script to show the revert path
        #[arg(long = "inject-failure", action = ArgAction::SetTrue)]
        inject_failure: bool,
    },
    /// Rebuild a care board from a JSON array of care events
    Board {
        /// Path to a JSON file of care events
        file: PathBuf,
        /// Category to project, e.g. "pottybreaks" or "feeding"
        #[arg(long = "category", default_value = "pottybreaks")]
        category: CareCategory,
    },
}

fn init_tracing() {
    let env = std::env::var("KENNEL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KENNEL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KENNEL_METRICS_ADDR; expected host:port");
        }
    }
}

fn print_board(board: &CareBoard, names: &[(String, String)], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            if board.is_empty() {
                println!("(board empty)");
            }
            for (dog_id, slots) in board.dogs() {
                let name = names
                    .iter()
                    .find(|(id, _)| id == dog_id)
                    .map(|(_, n)| n.as_str())
                    .unwrap_or(dog_id.as_str());
                println!("{} • {}", name, slots.join(", "));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(board)?),
    }
    Ok(())
}

fn drain_notices(rx: &mut NoticeReceiver) -> Vec<kennel_api::Notice> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

async fn wait_for_settles(counter: &AtomicUsize, at_least: usize, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while counter.load(Ordering::SeqCst) < at_least {
        if Instant::now() >= deadline {
            return Err(anyhow!("queue did not settle within {:?}", timeout));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

async fn run_simulate(output: Output, inject_failure: bool) -> Result<()> {
    let dogs = vec![
        Dog { id: uuid::Uuid::new_v4().to_string(), name: "Rex".to_string() },
        Dog { id: uuid::Uuid::new_v4().to_string(), name: "Willow".to_string() },
    ];
    let names: Vec<(String, String)> =
        dogs.iter().map(|d| (d.id.clone(), d.name.clone())).collect();
    let api = Arc::new(MemoryApi::new(dogs.clone()));

    let settles = Arc::new(AtomicUsize::new(0));
    let settles_hook = Arc::clone(&settles);
    let cfg = SessionConfig::from_env();
    let (session, mut notices) = CareSession::with_on_settle(
        api.clone(),
        cfg,
        Some(Box::new(move || {
            settles_hook.fetch_add(1, Ordering::SeqCst);
        })),
    );

    let rex = &dogs[0];
    let willow = &dogs[1];

    info!("simulate: potty-break phase");
    // Rapid double-click on the same cell: must coalesce to one remote add.
    session.on_cell_click(rex, "8:00 AM", CareCategory::PottyBreaks);
    session.on_cell_click(rex, "8:00 AM", CareCategory::PottyBreaks);
    session.on_cell_click(willow, "8:00 AM", CareCategory::PottyBreaks);
    session.on_cell_click(rex, "12:00 PM", CareCategory::PottyBreaks);
    wait_for_settles(&settles, 1, Duration::from_secs(30)).await?;

    if inject_failure {
        info!("simulate: injected-failure phase");
        api.set_fail_writes(true);
        session.on_cell_click(rex, "3:00 PM", CareCategory::PottyBreaks);
        wait_for_settles(&settles, 2, Duration::from_secs(30)).await?;
        api.set_fail_writes(false);
    }

    info!("simulate: feeding phase");
    session.set_active_category(CareCategory::Feeding);
    session.on_cell_click(rex, "Breakfast", CareCategory::Feeding);
    // A click for the now-inactive category must be ignored.
    session.on_cell_click(willow, "8:00 AM", CareCategory::PottyBreaks);
    let target = if inject_failure { 3 } else { 2 };
    wait_for_settles(&settles, target, Duration::from_secs(30)).await?;

    // Settle refresh: re-prime the board from confirmed backend events.
    let events = api.care_events(CareCategory::PottyBreaks).await?;
    session.prime(events);

    let collected = drain_notices(&mut notices);
    match output {
        Output::Human => {
            println!("notices:");
            for n in &collected {
                println!("[{:?}] {}: {}", n.kind, n.title, n.body);
            }
            println!("settled board (potty breaks):");
            print_board(&session.board(), &names, output)?;
            println!(
                "stats: clicks {}, settles {}",
                session.clicks(),
                settles.load(Ordering::SeqCst)
            );
        }
        Output::Json => {
            let summary = serde_json::json!({
                "notices": collected,
                "board": &*session.board(),
                "clicks": session.clicks(),
                "settles": settles.load(Ordering::SeqCst),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    session.shutdown();
    Ok(())
}

fn run_board(output: Output, file: PathBuf, category: CareCategory) -> Result<()> {
    let raw = std::fs::read_to_string(&file)?;
    let events: Vec<CareEvent> = serde_json::from_str(&raw)?;
    info!(count = events.len(), category = %category, "board: events loaded");
    let mut builder = BoardBuilder::new(category);
    builder.apply(events);
    let board = builder.freeze();
    print_board(&board, &[], output)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { inject_failure } => run_simulate(cli.output, inject_failure).await,
        Commands::Board { file, category } => run_board(cli.output, file, category),
    }
}
