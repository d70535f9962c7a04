//! Domain models: evolving state, flushed series and the driver event log

pub mod event;
pub mod series;
pub mod state;

// Re-exports
pub use event::{DriverEvent, EventLog};
pub use series::{FlushSample, FlushSeries};
pub use state::{Clock, Domain, FieldState, SimulationState};
