//! Strategy code loader (spec §6): turns the bytes stored against a
//! `strategies` row into a [`StrategyCapability`] object. A `NativeLoader`
//! backed by the [`crate::dsl`] interpreter is the only implementation for
//! now; the trait exists so an eventual sandboxed/WASM loader can be
//! substituted without touching callers.

use std::sync::Arc;

use anyhow::{Context, Result};
use flow_cache::OhlcvBar;

use crate::dsl::{self, Program};
use crate::types::{IndicatorFrame, StrategyCapability, StrategyDescriptor};

/// Loads strategy source bytes into a runnable capability object. Any error
/// returned here is a `LoaderError` (spec §7): the caller deletes the
/// strategy row rather than retrying.
pub trait StrategyLoader: Send + Sync {
    fn load(&self, name: &str, code: &[u8]) -> Result<Box<dyn StrategyCapability>>;
}

struct NativeStrategy {
    program: Arc<Program>,
}

impl StrategyCapability for NativeStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        self.program.descriptor()
    }

    fn calculate_indicators(&self, bars: &[OhlcvBar]) -> Result<IndicatorFrame> {
        self.program.evaluate(bars)
    }
}

/// Loads the textual DSL described in [`crate::dsl`]. The only loader this
/// crate ships.
#[derive(Default)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl StrategyLoader for NativeLoader {
    fn load(&self, name: &str, code: &[u8]) -> Result<Box<dyn StrategyCapability>> {
        let text = std::str::from_utf8(code)
            .with_context(|| format!("strategy '{name}' is not valid utf-8"))?;
        let program = dsl::parse(text)
            .with_context(|| format!("strategy '{name}' failed to parse"))?;
        Ok(Box::new(NativeStrategy {
            program: Arc::new(program),
        }))
    }
}
