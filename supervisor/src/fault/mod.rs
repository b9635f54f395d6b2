//! Fault generation and injection.
//!
//! - [`FaultModel`] decides when a single-event upset fires and where it
//!   lands, from a seeded generator.
//! - [`FaultInjector`] applies the resulting [`FaultEvent`] to region memory.

mod event;
mod injector;
mod model;

pub use event::{CorruptionKind, FaultEvent};
pub use injector::{FaultInjector, InjectionError, InjectionReport, InjectorStats};
pub use model::{FaultModel, FaultModelConfig, FaultSchedule, RegionWeights};
