use std::collections::BTreeMap;

use uuid::Uuid;

use crate::types::{AdmissionOutcome, PoolConfig};

/// The ACTIVE-pool leaderboard: `strategy_id -> score_backtest` (spec §4.8).
/// Callers own persistence; this module only decides admission/eviction.
pub type ActivePool = BTreeMap<Uuid, f64>;

/// `argmin(score_backtest) over ACTIVE`. Ties break on the lower `Uuid` so
/// the choice is deterministic regardless of map iteration order.
fn worst(active: &ActivePool) -> Option<(Uuid, f64)> {
    active
        .iter()
        .fold(None, |acc, (&id, &score)| match acc {
            None => Some((id, score)),
            Some((best_id, best_score)) => {
                if score < best_score || (score == best_score && id < best_id) {
                    Some((id, score))
                } else {
                    Some((best_id, best_score))
                }
            }
        })
}

fn below_pool_minimum_reason(score: f64, minimum: f64) -> String {
    format!("Score {:.1} <= pool minimum {:.1}", score, minimum)
}

fn below_entry_floor_reason(score: f64, min_score_entry: f64) -> String {
    format!("Score {:.1} below minimum entry score {:.1}", score, min_score_entry)
}

/// Admit a freshly-evaluated candidate (spec §4.8's `try_enter_pool`).
///
/// Idempotent: calling this twice with the same `(id, score)` while nothing
/// else mutates `active` between the calls yields the same outcome both
/// times (the second call simply finds `id` already present at `score`).
pub fn try_enter_pool(cfg: &PoolConfig, active: &mut ActivePool, id: Uuid, score: f64) -> AdmissionOutcome {
    if score < cfg.min_score_entry {
        active.remove(&id);
        return AdmissionOutcome::Retired { reason: below_entry_floor_reason(score, cfg.min_score_entry) };
    }

    if active.contains_key(&id) || active.len() < cfg.max_size {
        active.insert(id, score);
        return AdmissionOutcome::Admitted { evicted: None };
    }

    match worst(active) {
        Some((worst_id, worst_score)) if score > worst_score => {
            active.remove(&worst_id);
            active.insert(id, score);
            AdmissionOutcome::Admitted { evicted: Some(worst_id) }
        }
        Some((_, worst_score)) => AdmissionOutcome::Retired { reason: below_pool_minimum_reason(score, worst_score) },
        None => {
            active.insert(id, score);
            AdmissionOutcome::Admitted { evicted: None }
        }
    }
}

/// Re-apply the same floor/leaderboard check to a strategy already in the
/// pool (spec §4.8's `revalidate_after_retest`). The strategy is excluded
/// from its own leaderboard comparison — it cannot evict itself.
pub fn revalidate_after_retest(cfg: &PoolConfig, active: &mut ActivePool, id: Uuid, new_score: f64) -> AdmissionOutcome {
    active.remove(&id);

    if new_score < cfg.min_score_entry {
        return AdmissionOutcome::Retired { reason: below_entry_floor_reason(new_score, cfg.min_score_entry) };
    }

    if active.len() < cfg.max_size {
        active.insert(id, new_score);
        return AdmissionOutcome::Admitted { evicted: None };
    }

    match worst(active) {
        Some((worst_id, worst_score)) if new_score > worst_score => {
            active.remove(&worst_id);
            active.insert(id, new_score);
            AdmissionOutcome::Admitted { evicted: Some(worst_id) }
        }
        Some((_, worst_score)) => AdmissionOutcome::Retired { reason: below_pool_minimum_reason(new_score, worst_score) },
        None => {
            active.insert(id, new_score);
            AdmissionOutcome::Admitted { evicted: None }
        }
    }
}
