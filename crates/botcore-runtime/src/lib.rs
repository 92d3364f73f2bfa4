//! `botcore-runtime` – behavior arbitration and the control loop.
//!
//! Sits on top of the action engine in `botcore-actions` and decides *which*
//! goal-directed behavior gets to queue actions at any moment.
//!
//! # Modules
//!
//! - [`behavior`] – the [`Behavior`] contract and the
//!   [`BehaviorContext`] through which a behavior acts, suppresses reflexes,
//!   writes the whiteboard and reports objectives.
//! - [`arbiter`] – [`BehaviorArbiter`]: priority-based selection with
//!   preemption, continuation dispatch and cleanup on deactivation.
//! - [`control_loop`] – [`ControlLoop`]: routes events, runs the arbiter and
//!   ticks the action queue once per cycle.
//! - [`event_bus`] – [`EventBus`]: in-process broadcast of world events.
//! - [`pose_selection`] – which side of an object to approach.
//! - [`behaviors`] – the stock behaviors and [`register_stock`].
//! - [`score`] – [`ScoreLedger`] of achieved objectives.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable export.
//!
//! # Example
//!
//! ```
//! use botcore_runtime::{BehaviorArbiter, ControlLoop, register_stock};
//! # use botcore_actions::{CommandSink, WorldView};
//! # use botcore_types::*;
//! # struct Empty;
//! # impl WorldView for Empty {
//! #     fn located_object(&self, _: ObjectId) -> Option<ObjectHandle> { None }
//! #     fn last_observed_face(&self) -> Option<FaceObservation> { None }
//! #     fn object_on_top_of(&self, _: ObjectId, _: f32) -> Option<ObjectHandle> { None }
//! #     fn robot_pose(&self) -> Pose { Pose::new(0.0, 0.0, 0.0) }
//! #     fn located_objects(&self) -> Vec<ObjectHandle> { Vec::new() }
//! # }
//! # struct Instant(u64);
//! # impl CommandSink for Instant {
//! #     fn issue(&mut self, _: MotorCommand) -> CommandId { self.0 += 1; CommandId(self.0) }
//! #     fn poll(&mut self, _: CommandId) -> ActionResult { ActionResult::Success }
//! #     fn abort(&mut self, _: CommandId) {}
//! # }
//!
//! let mut arbiter = BehaviorArbiter::new();
//! register_stock(&mut arbiter, &[], &Default::default()).unwrap();
//! let mut control = ControlLoop::new(arbiter);
//!
//! // With nothing in view only the idle fallback is eligible.
//! let report = control.step(&Empty, &mut Instant(0));
//! assert_eq!(report.active_name.as_deref(), Some("look_around"));
//! ```

pub mod arbiter;
pub mod behavior;
pub mod behaviors;
pub mod control_loop;
pub mod event_bus;
pub mod pose_selection;
pub mod score;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use arbiter::{BehaviorArbiter, Lifecycle};
pub use behavior::{
    Behavior, BehaviorContext, BehaviorError, BehaviorStatus, Continuation, EventSubscriptions,
    reaction_trigger_for,
};
pub use behaviors::{STOCK_BEHAVIORS, register_stock};
pub use control_loop::{ControlLoop, CycleReport};
pub use event_bus::{BusError, EventBus, EventReceiver};
pub use pose_selection::{FacePreference, FaceReference, PoseSelection, select_approach_pose};
pub use score::{ObjectiveRecord, ScoreLedger};
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing};
