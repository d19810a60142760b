//! flow-eval
//!
//! Training/Holdout Evaluator & Anti-Overfit Gate (§4.5), Coin-Set Selection
//! "scroll-down" (§4.6), and the Scorer (§4.7) — the three stages between a
//! backtest run and a strategy's pool-leaderboard score.

pub mod coinset;
pub mod evaluator;
pub mod scorer;
pub mod types;

pub use coinset::{scroll_down, CandidateFacts, RejectReason, ScrollDownResult};
pub use evaluator::{compute_final_score, evaluate, require_training_trades, validate_holdout};
pub use scorer::{score_from_backtest_result, score_from_trades, LiveScoreError, LiveScorerConfig};
pub use types::{EvaluationOutcome, EvaluatorConfig, HoldoutValidation};
