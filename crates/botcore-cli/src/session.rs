//! A control session: one simulated robot driven by the stock behaviors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use botcore_hal::{Scene, SimRobot};
use botcore_runtime::{
    BehaviorArbiter, ControlLoop, CycleReport, EventBus, ObjectiveRecord, register_stock,
};
use colored::Colorize;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::Config;

/// What a finished session did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub scene: Scene,
    pub ticks: u64,
    pub commands_issued: usize,
    pub activations: usize,
    pub objectives: Vec<ObjectiveRecord>,
    pub total_score: u64,
    pub interrupted: bool,
}

pub struct Session {
    scene: Scene,
    max_ticks: u64,
    period: Duration,
    robot: SimRobot,
    bus: EventBus,
    control: ControlLoop,
    last_active: Option<String>,
    activations: usize,
}

impl Session {
    pub fn new(cfg: &Config) -> Result<Self, String> {
        cfg.validate()?;
        let scene = cfg.scene()?;
        let mut arbiter = BehaviorArbiter::new();
        let registered = register_stock(&mut arbiter, &cfg.priorities, &cfg.behaviors)
            .map_err(|e| format!("Failed to register behaviors: {e}"))?;
        info!(scene = %scene, behaviors = registered.len(), "session ready");

        let bus = EventBus::new(256);
        let control = ControlLoop::new(arbiter).with_event_bus(&bus);
        Ok(Self {
            scene,
            max_ticks: cfg.max_ticks,
            period: Duration::from_secs_f64(1.0 / f64::from(cfg.tick_hz)),
            robot: scene.build(cfg.sim.to_sim_config()),
            bus,
            control,
            last_active: None,
            activations: 0,
        })
    }

    /// Publish the robot's pending events, run one control cycle and let
    /// simulated time pass.
    pub fn step(&mut self) -> CycleReport {
        for event in self.robot.drain_events() {
            if let Err(e) = self.bus.publish(event) {
                warn!(error = %e, "event dropped");
            }
        }
        let (world, motors) = self.robot.parts();
        let report = self.control.step(world, motors);
        self.robot.advance();

        if report.active_name != self.last_active {
            if let Some(name) = &report.active_name {
                self.activations += 1;
                println!(
                    "  {} {} {}",
                    format!("[{:>5}]", report.tick).dimmed(),
                    "▶".green(),
                    name.bold()
                );
            }
            self.last_active = report.active_name.clone();
        }
        report
    }

    pub fn is_finished(&self) -> bool {
        self.max_ticks > 0 && self.control.tick() >= self.max_ticks
    }

    /// Step at the configured rate until `max_ticks` or `shutdown`.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> RunSummary {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut interrupted = false;
        while !self.is_finished() {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }
            self.step();
        }
        self.finish(interrupted)
    }

    /// Stop everything the robot is doing and summarise the run.
    pub fn finish(&mut self, interrupted: bool) -> RunSummary {
        let (world, motors) = self.robot.parts();
        self.control.shutdown(world, motors);
        self.robot.advance();

        let ledger = self.control.arbiter().ledger();
        RunSummary {
            scene: self.scene,
            ticks: self.control.tick(),
            commands_issued: self.robot.motors().history().len(),
            activations: self.activations,
            objectives: ledger.records().to_vec(),
            total_score: ledger.total(),
            interrupted,
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "═══════════════════════════════════════".bold());
    println!("{}", "             Run Summary               ".bold().cyan());
    println!("{}", "═══════════════════════════════════════".bold());
    println!("  Scene            : {}", summary.scene.to_string().bold());
    println!("  Ticks            : {}", summary.ticks);
    println!("  Activations      : {}", summary.activations);
    println!("  Motor commands   : {}", summary.commands_issued);
    if summary.objectives.is_empty() {
        println!("  Objectives       : {}", "none".dimmed());
    } else {
        println!("  Objectives       :");
        for record in &summary.objectives {
            println!(
                "    {} {} by {} (+{}) at tick {}",
                "✓".green(),
                record.objective.bold(),
                record.behavior_name,
                record.score,
                record.tick
            );
        }
    }
    println!("  Total score      : {}", summary.total_score.to_string().bold());
    if summary.interrupted {
        println!("  {}", "Stopped by operator.".yellow());
    }
    println!("{}", "═══════════════════════════════════════".bold());
}
