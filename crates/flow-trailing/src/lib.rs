//! flow-trailing
//!
//! Trailing-Stop Service (spec §4.12): one in-memory dormant→active state
//! machine per (symbol, subaccount) live position, atomic SL replacement
//! through the narrow [`StopOrderExecutor`] interface.

mod engine;
mod executor;
mod types;

pub use engine::TrailingBook;
pub use executor::StopOrderExecutor;
pub use types::{PositionKey, PositionState, TrailingConfig};
