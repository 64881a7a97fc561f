//! `vigil-cli` – access point client for the biometric verifier
//!
//! This binary runs one continuous validation session at an access point.
//! It:
//!
//! 1. Checks for `~/.vigil/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Probes the verifier and resolves this device's address when it is not
//!    configured.
//! 3. Starts the validation session over the frame directory, rendering
//!    verdicts on the console, in the access journal and on the door lamp.
//! 4. Intercepts **Ctrl-C** to tear the session down (camera released last)
//!    and print the session report.
//!
//! `vigil summary` and `vigil recent [granted|denied]` read the journal.

mod config;
mod console;
mod probe;

use std::sync::Arc;

use colored::Colorize;
use tokio::sync::Notify;
use tracing::{info, warn};

use vigil_hal::registry::DEFAULT_DOOR_LAYOUT;
use vigil_hal::{DirectoryCamera, LineSignalController, SignalRouter};
use vigil_journal::{AccessEvent, AccessJournal, EventFilter};
use vigil_runtime::{
    DoorSignalSink, FanoutSink, JournalSink, SessionReport, ValidationLoop, ValidationSession,
    VerifierClient, init_tracing,
};

use crate::config::Config;
use crate::console::ConsoleSink;

/// Rows shown by `vigil recent`.
const RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Summary,
    Recent(EventFilter),
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        match args.first().map(String::as_str) {
            None | Some("run") => Ok(Command::Run),
            Some("summary") => Ok(Command::Summary),
            Some("recent") => match args.get(1).map(String::as_str) {
                None | Some("all") => Ok(Command::Recent(EventFilter::All)),
                Some("granted") => Ok(Command::Recent(EventFilter::Granted)),
                Some("denied") => Ok(Command::Recent(EventFilter::Denied)),
                Some(other) => Err(format!(
                    "unknown filter `{other}` (expected granted, denied or all)"
                )),
            },
            Some("help" | "-h" | "--help") => Ok(Command::Help),
            Some(other) => Err(format!("unknown command `{other}`")),
        }
    }
}

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"), VIGIL_LOG_FORMAT=json switches to
    // JSON lines and OTEL_EXPORTER_OTLP_ENDPOINT enables span export. User
    // facing output still goes through println!.
    let _telemetry = init_tracing("vigil");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            print_usage();
            std::process::exit(2);
        }
    };

    let result = match command {
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Run => {
            print_banner();
            run(load_config(true))
        }
        Command::Summary => print_summary(&load_config(false)),
        Command::Recent(filter) => print_recent(&load_config(false), filter),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Load the config, running the wizard on first use when `interactive`.
fn load_config(interactive: bool) -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            if interactive {
                println!(
                    "  Config loaded from {}",
                    config::config_path().display().to_string().bold()
                );
            }
            cfg
        }
        Ok(None) if interactive => {
            let mut cfg = run_first_run_wizard();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// vigil run
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: Config) -> Result<(), String> {
    // ── Verifier probe ────────────────────────────────────────────────────
    print!("\n  Probing verifier at {} … ", cfg.verifier_url.dimmed());
    match probe::verifier_status(&cfg.verifier_url) {
        Ok(greeting) if greeting.is_empty() => println!("{}", "online".green()),
        Ok(greeting) => println!("{} ({})", "online".green(), greeting),
        Err(e) => {
            // Rounds against an offline verifier are transport errors; the
            // session still starts and recovers when it comes back.
            println!("{}", "offline".yellow());
            warn!(error = %e, "verifier probe failed");
        }
    }

    // ── Device address ────────────────────────────────────────────────────
    let device_ip = if cfg.device_ip.is_empty() {
        print!("  Resolving device address … ");
        let ip = probe::resolve_public_ip().map_err(|e| {
            println!("{}", "failed".red());
            format!("{e}\n  Set `device_ip` in the config or VIGIL_DEVICE_IP.")
        })?;
        println!("{}", ip.bold());
        ip
    } else {
        cfg.device_ip.clone()
    };

    // ── Feedback sinks ────────────────────────────────────────────────────
    let journal_path = cfg.journal_path();
    if let Some(parent) = journal_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create journal directory: {}", e))?;
    }
    let journal = AccessJournal::open(&journal_path.to_string_lossy())
        .map_err(|e| format!("Failed to open journal at {}: {}", journal_path.display(), e))?;

    let mut sinks = FanoutSink::new()
        .with(Arc::new(ConsoleSink::new()))
        .with(Arc::new(JournalSink::new(journal, cfg.zone.clone())));
    if let Some(door) = cfg.door {
        match build_signal_router(&cfg) {
            Some(router) if router.controller_for(door).is_some() => {
                println!("  Door {} lamp: {}", door, "connected".green());
                sinks = sinks.with(Arc::new(DoorSignalSink::new(router, door)));
            }
            _ => println!(
                "  Door {} lamp: {}",
                door,
                "no controller configured".yellow()
            ),
        }
    }

    let validation = ValidationLoop::new(cfg.validation_config(), Arc::new(sinks))
        .map_err(|e| e.to_string())?;
    let verifier =
        VerifierClient::new(cfg.verifier_config(&device_ip)).map_err(|e| e.to_string())?;
    let camera = DirectoryCamera::new("frames", &cfg.frames_dir);

    // ── Session ───────────────────────────────────────────────────────────
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;

    let stop = Arc::new(Notify::new());
    let stop_ctrlc = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping validation …".yellow().bold());
        stop_ctrlc.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the session with SIGKILL");
    }

    let report = runtime.block_on(async move {
        let handle = ValidationSession::start(validation, camera, Arc::new(verifier))
            .map_err(|e| format!("{e}\n  Check `frames_dir` ({}).", cfg.frames_dir))?;
        info!(zone = %cfg.zone, device_ip = %device_ip, "validation running");
        println!(
            "\n  Validating zone {} every {} ms. Press {} to stop.\n",
            cfg.zone.bold(),
            cfg.tick_interval_ms,
            "Ctrl-C".bold().cyan()
        );
        stop.notified().await;
        handle.shutdown().await.map_err(|e| e.to_string())
    })?;

    println!("{}", "  ✓ Camera released.".green());
    print_report(&report);
    Ok(())
}

/// Router over the controllers that have a serial port configured.
fn build_signal_router(cfg: &Config) -> Option<SignalRouter> {
    let mut router = SignalRouter::new();
    let mut any = false;
    for (id, doors) in DEFAULT_DOOR_LAYOUT {
        let Some(port) = cfg.signal_ports.get(*id) else {
            continue;
        };
        match LineSignalController::open(*id, port) {
            Ok(controller) => {
                router.register_controller(controller, doors);
                any = true;
            }
            Err(e) => warn!(controller = *id, error = %e, "lamp controller unavailable"),
        }
    }
    any.then_some(router)
}

fn print_report(report: &SessionReport) {
    println!();
    println!("  {}", "Session report".bold());
    let rows = [
        ("rounds", report.rounds),
        ("granted", report.grants),
        ("denied", report.denials),
        ("  of which zone-permission", report.permission_denials),
        ("retries", report.retries),
        ("transport errors", report.transport_errors),
        ("capture failures", report.capture_failures),
        ("dropped ticks", report.dropped_ticks),
        ("intrusion alerts", report.intrusions),
    ];
    for (label, value) in rows {
        println!("    {:<28} {}", label, value);
    }
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// vigil summary / vigil recent
// ─────────────────────────────────────────────────────────────────────────────

fn open_journal(cfg: &Config) -> Result<AccessJournal, String> {
    let path = cfg.journal_path();
    if !path.exists() {
        return Err(format!(
            "no journal at {} (run `vigil` first)",
            path.display()
        ));
    }
    AccessJournal::open(&path.to_string_lossy())
        .map_err(|e| format!("Failed to open journal at {}: {}", path.display(), e))
}

fn print_summary(cfg: &Config) -> Result<(), String> {
    let journal = open_journal(cfg)?;
    let today = chrono::Utc::now().date_naive();
    let summary = journal.daily_summary(today).map_err(|e| e.to_string())?;

    println!();
    println!("  {} {}", "Access summary for".bold(), today.to_string().bold());
    println!("    {:<12} {}", "total", summary.total);
    println!("    {:<12} {}", "granted", summary.granted.to_string().green());
    println!("    {:<12} {}", "denied", summary.denied.to_string().red());
    println!("    {:<12} {}", "intrusions", summary.intrusions.to_string().red().bold());
    println!();
    Ok(())
}

fn print_recent(cfg: &Config, filter: EventFilter) -> Result<(), String> {
    let journal = open_journal(cfg)?;
    let events = journal
        .filter(filter, RECENT_LIMIT)
        .map_err(|e| e.to_string())?;

    println!();
    if events.is_empty() {
        println!("  {}", "No matching access events.".dimmed());
    }
    for event in &events {
        println!("{}", event_line(event));
    }
    println!();
    Ok(())
}

fn event_line(event: &AccessEvent) -> String {
    let result = format!("{:<9}", event.result.to_string());
    let result = match event.result {
        vigil_journal::AccessResult::Granted => result.green(),
        vigil_journal::AccessResult::Denied => result.red(),
        vigil_journal::AccessResult::Retry => result.yellow(),
        vigil_journal::AccessResult::Intrusion => result.red().bold(),
    };
    format!(
        "  {}  {}  {:<20} {:<6} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        result,
        event.subject.as_deref().unwrap_or("-"),
        event.zone.as_deref().unwrap_or("-"),
        event.note.dimmed()
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Vigil First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up this access point.\n");

    let mut cfg = Config::default();

    cfg.verifier_url = prompt_line(
        &format!("  Verifier URL [{}]: ", cfg.verifier_url),
        &cfg.verifier_url,
    );
    cfg.zone = prompt_line(&format!("  Zone guarded here [{}]: ", cfg.zone), &cfg.zone);
    cfg.frames_dir = prompt_line(
        &format!("  Frame directory [{}]: ", cfg.frames_dir),
        &cfg.frames_dir,
    );
    let door = prompt_line("  Door lamp number (empty for none): ", "");
    if let Ok(d) = door.trim().parse::<u8>() {
        cfg.door = Some(d);
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _   ___     _ _ "#.bold().cyan());
    println!("{}", r#" | | / (_)__ (_) |"#.bold().cyan());
    println!("{}", r#" | |/ / / _ `/ / |"#.bold().cyan());
    println!("{}", r#" |___/_/\_, /_/_/ "#.bold().cyan());
    println!("{}", r#"       /___/      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Vigil".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Continuous access validation");
    println!();
}

fn print_usage() {
    println!("Usage:");
    println!("  vigil [run]                      start validating at this access point");
    println!("  vigil summary                    today's access totals");
    println!("  vigil recent [granted|denied]    latest access events");
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
