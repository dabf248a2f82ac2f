// raidwall/src/main.rs
//
// Raidwall: join-burst raid detection and escalation daemon
//
// Two operational modes:
//   tail    tail a JSONL join feed as it grows (staging, live bridges)
//   replay  replay a captured join feed at scaled speed (testing/research)
//
// Usage:
//   raidwall --mode tail --path /var/log/joins.jsonl --spaces spaces.json
//   raidwall --mode replay --path captured.jsonl --spaces spaces.json --speed 10.0
//   raidwall --mode tail --path joins.jsonl --spaces spaces.json --metrics-port 9464

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use raidwall::collab::local::{self, SpaceDirectoryFile};
use raidwall::events::{JoinRecord, MemberJoin};
use raidwall::metrics::MetricsServer;
use raidwall::{Antiraid, AntiraidConfig, EscalationReport, JoinOutcome, SystemClock};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "raidwall",
    about   = "Join-burst raid detection and escalation",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "tail")]
    mode: Mode,

    #[arg(long, default_value = "/tmp/raidwall_joins.jsonl",
          help = "JSONL join feed path")]
    path: PathBuf,

    #[arg(long, default_value = "1.0", help = "Replay speed multiplier")]
    speed: f64,

    #[arg(long, help = "Space directory JSON (settings, rosters, mod-log channels)")]
    spaces: PathBuf,

    #[arg(long, help = "Engine config JSON; defaults apply when omitted")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "/tmp/raidwall_output",
          help = "Effect output directory")]
    output: PathBuf,

    #[arg(long, help = "Serve Prometheus metrics on this port")]
    metrics_port: Option<u16>,

    #[arg(long, help = "Incident window in seconds (overrides config)")]
    trigger_lifetime: Option<f64>,

    #[arg(long, help = "Join log record lifetime in seconds (overrides config)")]
    trigger_record_lifetime: Option<f64>,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Tail,    // tail a live JSONL feed
    Replay,  // replay a static JSONL file at scaled speed
}

impl Cli {
    fn engine_config(&self) -> Result<AntiraidConfig> {
        let mut cfg = match &self.config {
            Some(path) => AntiraidConfig::load(path)?,
            None       => AntiraidConfig::default(),
        };
        if let Some(secs) = self.trigger_lifetime {
            cfg.trigger_lifetime = Duration::try_from_secs_f64(secs)
                .context("--trigger-lifetime must be a non-negative number of seconds")?;
        }
        if let Some(secs) = self.trigger_record_lifetime {
            cfg.trigger_record_lifetime = Duration::try_from_secs_f64(secs)
                .context("--trigger-record-lifetime must be a non-negative number of seconds")?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_banner() {
    println!("\x1b[1m");
    println!("  ┏━┓┏━┓╻╺┳┓╻ ╻┏━┓╻  ╻  ");
    println!("  ┣┳┛┣━┫┃ ┃┃┃╻┃┣━┫┃  ┃  ");
    println!("  ╹┗╸╹ ╹╹╺┻┛┗┻┛╹ ╹┗━╸┗━╸");
    println!("\x1b[0m");
    println!("  \x1b[90mJoin-burst raid detection and escalation | Rust\x1b[0m\n");
}

fn print_escalation(join: &MemberJoin, report: &EscalationReport) {
    let red   = "\x1b[91;1m";
    let reset = "\x1b[0m";
    let mark  = |ok: bool| if ok { "\x1b[92mok\x1b[0m" } else { "\x1b[91mfailed\x1b[0m" };

    println!("\n{}⚠ RAID{} space {}{}{}", red, reset, red, join.space_id, reset);
    println!("  Trigger   : {} ({})", join.display_name, join.actor_id);
    println!("  Admission : {}", mark(report.admission_raised));
    println!("  Alerts    : {}/{} delivered", report.delivered, report.recipients);
    println!("  Mod log   : {}", if report.mod_log_notified { "notified" } else { "-" });
    println!("  Verify    : {}", if report.verification_enabled { "forced on" } else { "-" });
}

async fn print_stats_loop(antiraid: Arc<Antiraid>, start: Instant) {
    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let m       = antiraid.metrics();
        let elapsed = start.elapsed().as_secs_f64();
        let joins   = m.joins.load(Ordering::Relaxed);
        println!(
            "\n\x1b[1m── stats  uptime={:.0}s  joins={}  jps={:.1}  spaces={}  incidents={}  escalations={} ──\x1b[0m",
            elapsed, joins, joins as f64 / elapsed,
            antiraid.tracked_spaces(), antiraid.live_incidents(),
            m.escalations.load(Ordering::Relaxed),
        );
    }
}

// ── Event sources ─────────────────────────────────────────────────────────────

fn parse_join(line: &str) -> Option<(JoinRecord, MemberJoin)> {
    let record: JoinRecord = match serde_json::from_str(line) {
        Ok(r)  => r,
        Err(e) => { warn!("Parse error: {}", e); return None; }
    };
    match MemberJoin::try_from(record.clone()) {
        Ok(join) => Some((record, join)),
        Err(e)   => { warn!(space = %record.space_id, actor = %record.user_id, "Rejected join: {}", e); None }
    }
}

async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<MemberJoin>, seek_end: bool) -> Result<()> {
    let file = tokio::fs::File::open(&path).await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    if seek_end {
        while lines.next_line().await?.is_some() {}  // consume existing
    }

    info!("Tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                let line = line.trim();
                if line.is_empty() { continue; }
                if let Some((_, join)) = parse_join(line) {
                    if tx.send(join).await.is_err() { break; }
                }
            }
            None => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    Ok(())
}

async fn replay_jsonl(path: PathBuf, tx: mpsc::Sender<MemberJoin>, speed: f64) -> Result<()> {
    let content = tokio::fs::read_to_string(&path).await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut joins: Vec<(i64, MemberJoin)> = content.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(parse_join)
        .map(|(rec, join)| (rec.timestamp.timestamp_millis(), join))
        .collect();

    if joins.is_empty() { return Ok(()); }
    joins.sort_by_key(|(ts, _)| *ts);

    let speed     = if speed > 0.0 { speed } else { 1.0 };
    let base_ts   = joins[0].0;
    let base_wall = Instant::now();

    for (ts, join) in joins {
        // Offsets too large for an Instant (absurdly slow speeds) send at once.
        if let Some(target) = replay_offset(ts - base_ts, speed).and_then(|d| base_wall.checked_add(d)) {
            let now = Instant::now();
            if target > now {
                tokio::time::sleep(target - now).await;
            }
        }
        if tx.send(join).await.is_err() { break; }
    }
    Ok(())
}

/// Wall-clock offset of a record `delta_ms` after the first one.
fn replay_offset(delta_ms: i64, speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64((delta_ms as f64 / speed / 1000.0).max(0.0)).ok()
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("raidwall=info".parse()?))
        .compact().init();

    let cli     = Cli::parse();
    let config  = cli.engine_config()?;
    let spaces  = SpaceDirectoryFile::load(&cli.spaces)?;
    let collab  = local::build(&spaces, &cli.output)?;
    let antiraid = Antiraid::new(config, collab, Arc::new(SystemClock));
    let start   = Instant::now();
    let (tx, mut rx) = mpsc::channel::<MemberJoin>(16384);

    print_banner();
    info!(spaces = spaces.spaces.len(), "space directory loaded");

    tokio::spawn(print_stats_loop(Arc::clone(&antiraid), start));
    let _sweeper = antiraid.spawn_sweeper();

    if let Some(port) = cli.metrics_port {
        let server = MetricsServer::new(Arc::clone(&antiraid), SocketAddr::from(([0, 0, 0, 0], port)));
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    let path = cli.path.clone();
    match cli.mode {
        Mode::Tail => {
            println!("  Mode: \x1b[96mTAIL\x1b[0m  |  {}", path.display());
            println!("  Output: \x1b[90m{}\x1b[0m\n", cli.output.display());
            tokio::spawn(async move {
                if let Err(e) = tail_jsonl(path, tx, true).await { error!("Tail failed: {:#}", e); }
            });
        }
        Mode::Replay => {
            println!("  Mode: \x1b[93mREPLAY\x1b[0m  |  {}  speed={:.1}x", path.display(), cli.speed);
            println!("  Output: \x1b[90m{}\x1b[0m\n", cli.output.display());
            let speed = cli.speed;
            tokio::spawn(async move {
                if let Err(e) = replay_jsonl(path, tx, speed).await { error!("Replay failed: {:#}", e); }
            });
        }
    }

    println!("  Press Ctrl+C to stop.\n");

    // One task per join; spaces never wait on each other.
    while let Some(join) = rx.recv().await {
        let a = Arc::clone(&antiraid);
        tokio::spawn(async move {
            if let JoinOutcome::Escalated(report) = a.on_member_join(&join).await {
                print_escalation(&join, &report);
            }
        });
    }

    Ok(())
}
