pub mod host;
pub mod lifecycle;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use host::{BookHost, GuideHost};
pub use lifecycle::{Lifecycle, Session};
pub use scheduler::{EngineBuilder, GuideEngine};
pub use state::{EngineState, InvalidTransition, StateMachine, Transition};
pub use stats::{EngineStats, StatsCollector};
