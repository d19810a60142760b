//! Coin-Set Selection ("Scroll-Down", spec §4.6): one routine, used by both
//! AI strategies (candidates ordered by venue volume) and pattern strategies
//! (candidates ordered by pattern edge), guaranteeing the coins backtested
//! are the coins live-traded.

/// Per-candidate facts the scroll-down filter needs, already looked up by
/// the caller (liquidity/cache/coverage are all external-system concerns).
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFacts {
    pub symbol: String,
    pub in_active_trading_set: bool,
    pub cache_file_exists: bool,
    pub cached_coverage_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientLiquidity,
    InsufficientCache,
    InsufficientCoverage,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InsufficientLiquidity => "insufficient_liquidity",
            RejectReason::InsufficientCache => "insufficient_cache",
            RejectReason::InsufficientCoverage => "insufficient_coverage",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrollDownResult {
    Selected(Vec<String>),
    Rejected { reason: RejectReason, passed_count: usize },
}

/// Select up to `target_count` symbols from `candidates`, already ordered by
/// the caller's ranking (pattern edge or venue volume — the routine doesn't
/// care which).
///
/// Filters apply in order, and the *entire* candidate list is scanned for
/// each filter — never break early, so lower-ranked candidates still get a
/// chance when higher-ranked ones fail a later filter.
pub fn scroll_down(
    candidates: &[CandidateFacts],
    target_count: usize,
    min_count: usize,
    min_coverage_pct: f64,
    training_days: f64,
    holdout_days: f64,
) -> ScrollDownResult {
    let required_coverage_days = min_coverage_pct * (training_days + holdout_days);

    let liquid: Vec<&CandidateFacts> = candidates.iter().filter(|c| c.in_active_trading_set).collect();
    if liquid.len() < min_count {
        return ScrollDownResult::Rejected {
            reason: RejectReason::InsufficientLiquidity,
            passed_count: liquid.len(),
        };
    }

    let cached: Vec<&&CandidateFacts> = liquid.iter().filter(|c| c.cache_file_exists).collect();
    if cached.len() < min_count {
        return ScrollDownResult::Rejected {
            reason: RejectReason::InsufficientCache,
            passed_count: cached.len(),
        };
    }

    let covered: Vec<&&&CandidateFacts> = cached
        .iter()
        .filter(|c| c.cached_coverage_days >= required_coverage_days)
        .collect();
    if covered.len() < min_count {
        return ScrollDownResult::Rejected {
            reason: RejectReason::InsufficientCoverage,
            passed_count: covered.len(),
        };
    }

    let selected = covered.iter().take(target_count).map(|c| c.symbol.clone()).collect();
    ScrollDownResult::Selected(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(symbol: &str, liquid: bool, cached: bool, coverage: f64) -> CandidateFacts {
        CandidateFacts {
            symbol: symbol.to_string(),
            in_active_trading_set: liquid,
            cache_file_exists: cached,
            cached_coverage_days: coverage,
        }
    }

    #[test]
    fn lower_ranked_candidates_are_still_considered_when_higher_ranked_fail() {
        let candidates = vec![
            candidate("A", false, true, 100.0),
            candidate("B", true, true, 100.0),
            candidate("C", true, true, 100.0),
        ];
        let result = scroll_down(&candidates, 2, 2, 0.9, 50.0, 10.0);
        assert_eq!(result, ScrollDownResult::Selected(vec!["B".to_string(), "C".to_string()]));
    }

    #[test]
    fn coverage_boundary_exactly_meets_required_days() {
        // required = 0.9 * (50+10) = 54.0 days
        let candidates = vec![candidate("A", true, true, 54.0), candidate("B", true, true, 53.999)];
        let result = scroll_down(&candidates, 2, 1, 0.9, 50.0, 10.0);
        assert_eq!(result, ScrollDownResult::Selected(vec!["A".to_string()]));
    }

    #[test]
    fn insufficient_liquidity_is_reported_before_cache_or_coverage() {
        let candidates = vec![candidate("A", false, true, 100.0)];
        let result = scroll_down(&candidates, 1, 1, 0.9, 50.0, 10.0);
        assert_eq!(
            result,
            ScrollDownResult::Rejected {
                reason: RejectReason::InsufficientLiquidity,
                passed_count: 0
            }
        );
    }

    #[test]
    fn target_count_caps_the_selection_below_all_survivors() {
        let candidates = vec![
            candidate("A", true, true, 100.0),
            candidate("B", true, true, 100.0),
            candidate("C", true, true, 100.0),
        ];
        let result = scroll_down(&candidates, 2, 1, 0.5, 10.0, 10.0);
        assert_eq!(result, ScrollDownResult::Selected(vec!["A".to_string(), "B".to_string()]));
    }
}
