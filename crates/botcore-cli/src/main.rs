//! `botcore` – runs the stock behaviors against the simulated robot.
//!
//! 1. Loads `~/.botcore/config.toml` (or `--config <path>`), falling back to
//!    defaults when the file is absent.
//! 2. Seeds the simulated robot with a scene and registers the stock
//!    behaviors in the configured priority order.
//! 3. Runs the control loop at `tick_hz` until `max_ticks` or **Ctrl-C**,
//!    which cancels every queued action before exiting.
//! 4. Prints a summary of the objectives the behaviors achieved.
//!
//! `botcore --print-schema` prints the JSON schema of the config file.

mod config;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::{error, warn};

use crate::config::Config;
use crate::session::{Session, print_summary};

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    scene: Option<String>,
    max_ticks: Option<u64>,
    print_schema: bool,
    help: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--scene" => parsed.scene = Some(args.next().ok_or("--scene needs a name")?),
            "--ticks" => {
                let raw = args.next().ok_or("--ticks needs a number")?;
                let ticks = raw
                    .parse::<u64>()
                    .map_err(|_| format!("--ticks expects a number, got '{raw}'"))?;
                parsed.max_ticks = Some(ticks);
            }
            "--print-schema" => parsed.print_schema = true,
            "-h" | "--help" => parsed.help = true,
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(parsed)
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            print_usage();
            std::process::exit(2);
        }
    };
    if args.help {
        print_usage();
        return;
    }
    if args.print_schema {
        match config::schema_json() {
            Ok(schema) => println!("{schema}"),
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Held until exit so pending spans are flushed.
    let _tracing = botcore_runtime::init_tracing("botcore-cli");

    print_banner();

    let mut cfg = load_config(args.config.as_ref());
    if let Some(scene) = args.scene {
        cfg.seed_scene = scene;
    }
    if let Some(ticks) = args.max_ticks {
        cfg.max_ticks = ticks;
    }

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the run can only end at max_ticks");
    }

    let mut session = match Session::new(&cfg) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "cannot start session");
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "  Scene {} at {} Hz, {}",
        cfg.seed_scene.bold(),
        cfg.tick_hz,
        if cfg.max_ticks == 0 {
            "until Ctrl-C".to_string()
        } else {
            format!("{} ticks", cfg.max_ticks)
        }
    );
    println!();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: failed to start runtime: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    };
    let summary = runtime.block_on(session.run(shutdown));
    print_summary(&summary);
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let (shown, loaded) = match path {
        Some(p) => (p.clone(), config::load_from(p)),
        None => (config::config_path(), config::load()),
    };
    match loaded {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", shown.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {} – using defaults.",
                shown.display().to_string().dimmed()
            );
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __          __                   "#.bold().cyan());
    println!("{}", r#"  / /_  ____  / /__________  ________ "#.bold().cyan());
    println!("{}", r#" / __ \/ __ \/ __/ ___/ __ \/ ___/ _ \"#.bold().cyan());
    println!("{}", r#"/_.___/\____/\__/\___/\____/_/   \___/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "botcore".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Behavior arbitration on a simulated robot");
    println!();
}

fn print_usage() {
    println!("Usage: botcore [--config <path>] [--scene <name>] [--ticks <n>] [--print-schema]");
    println!();
    println!("  --config <path>   read this file instead of ~/.botcore/config.toml");
    println!("  --scene <name>    starting layout: empty, two_blocks, tipped");
    println!("  --ticks <n>       stop after n ticks (0 runs until Ctrl-C)");
    println!("  --print-schema    print the config file's JSON schema and exit");
}
