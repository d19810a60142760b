//! flow-execution
//!
//! Execution Client Adapter (spec §4.13): the narrow [`Venue`] trait every
//! broker integration implements, plus symbol normalization and subaccount
//! selection shared by any adapter.

mod normalize;
mod subaccount;
mod types;
mod venue;

pub use normalize::normalize_symbol;
pub use subaccount::select_subaccount;
pub use types::{AccountBalance, AssetMetadata, HealthStatus, OrderAck, Position, TriggerKind};
pub use venue::Venue;
