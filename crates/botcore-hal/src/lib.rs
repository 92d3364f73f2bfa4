//! `botcore-hal` – hosts the control loop can drive.
//!
//! Only a simulated host ships today:
//!
//! - [`sim`] – [`SimRobot`]: blocks, robot pose and a face, with motor
//!   commands that settle after a configurable number of ticks.
//! - [`scene`] – named starting layouts ([`Scene`]).
//!
//! A host plugs into `botcore-runtime` through the two boundary traits from
//! `botcore-actions`: [`SimWorld`] implements `WorldView` and [`SimMotors`]
//! implements `CommandSink`.  Events the simulation produces are drained with
//! [`SimRobot::drain_events`] and published on the runtime's event bus.

use thiserror::Error;

pub mod scene;
pub mod sim;

pub use scene::Scene;
pub use sim::{BLOCK_SIZE_MM, SimConfig, SimMotors, SimRobot, SimRobotBuilder, SimWorld};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("unknown scene: {0} (expected one of empty, two_blocks, tipped)")]
    UnknownScene(String),
}
