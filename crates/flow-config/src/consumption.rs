//! Declares, per long-running process, which configuration pointers it is
//! expected to read. Used by process main.rs files to fail fast if an
//! unexpected process name is passed, and by tests asserting that each
//! binary's required surface is actually present in `flow-config`'s typed
//! `PipelineConfig`.

/// One of the five long-running processes (spec §1–2 process→binary map).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// `flow-validator`: claims GENERATED rows, runs the strategy loader.
    Validator,
    /// `flow-backtester`: the Backtester Orchestrator worker pool.
    Backtester,
    /// `flow-rotator`: promotes ACTIVE strategies into LIVE.
    Rotator,
    /// `flow-executor`: execution adapter + trailing-stop + risk validator.
    Executor,
    /// `flow-scheduler`: periodic maintenance.
    Scheduler,
}

pub fn consumed_pointers(mode: RunMode) -> &'static [&'static str] {
    match mode {
        RunMode::Validator => VALIDATOR,
        RunMode::Backtester => BACKTESTER,
        RunMode::Rotator => ROTATOR,
        RunMode::Executor => EXECUTOR,
        RunMode::Scheduler => SCHEDULER,
    }
}

static VALIDATOR: &[&str] = &["/backtesting/threads/validated"];

static BACKTESTER: &[&str] = &[
    "/backtesting",
    "/pipeline/backpressure",
    "/pipeline/monitoring",
    "/parametric",
    "/scorer/weights",
];

static ROTATOR: &[&str] = &["/active_pool", "/scorer/weights"];

static EXECUTOR: &[&str] = &["/risk", "/venue"];

static SCHEDULER: &[&str] = &["/pipeline/monitoring", "/backtesting/retest/interval_days"];
