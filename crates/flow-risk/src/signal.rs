//! Signal validity checks (spec §4.10): direction plus SL/TP price ordering.

/// Trading direction a signal requests. `Close` carries no SL/TP ordering
/// constraint — it only ever reduces risk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalDirection {
    Long,
    Short,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalValidityError {
    /// Long requires `sl < entry`; short requires `entry < sl`.
    StopOnWrongSide,
    /// Long requires `entry < tp`; short requires `tp < entry`.
    TakeProfitOnWrongSide,
}

/// Validate a signal's direction against its SL/entry/TP prices.
///
/// For `Long`: `sl < entry < tp` (if `tp` is set).
/// For `Short`: `tp < entry < sl` (if `tp` is set).
/// `Close` is always valid — it carries no SL/TP ordering constraint.
pub fn validate_signal(
    direction: SignalDirection,
    entry: f64,
    sl_price: f64,
    tp_price: Option<f64>,
) -> Result<(), SignalValidityError> {
    match direction {
        SignalDirection::Close => Ok(()),
        SignalDirection::Long => {
            if sl_price >= entry {
                return Err(SignalValidityError::StopOnWrongSide);
            }
            if let Some(tp) = tp_price {
                if entry >= tp {
                    return Err(SignalValidityError::TakeProfitOnWrongSide);
                }
            }
            Ok(())
        }
        SignalDirection::Short => {
            if sl_price <= entry {
                return Err(SignalValidityError::StopOnWrongSide);
            }
            if let Some(tp) = tp_price {
                if tp >= entry {
                    return Err(SignalValidityError::TakeProfitOnWrongSide);
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_requires_sl_below_entry_below_tp() {
        assert!(validate_signal(SignalDirection::Long, 100.0, 95.0, Some(110.0)).is_ok());
        assert_eq!(
            validate_signal(SignalDirection::Long, 100.0, 105.0, Some(110.0)),
            Err(SignalValidityError::StopOnWrongSide)
        );
        assert_eq!(
            validate_signal(SignalDirection::Long, 100.0, 95.0, Some(90.0)),
            Err(SignalValidityError::TakeProfitOnWrongSide)
        );
    }

    #[test]
    fn short_requires_tp_below_entry_below_sl() {
        assert!(validate_signal(SignalDirection::Short, 100.0, 105.0, Some(90.0)).is_ok());
        assert_eq!(
            validate_signal(SignalDirection::Short, 100.0, 95.0, Some(90.0)),
            Err(SignalValidityError::StopOnWrongSide)
        );
        assert_eq!(
            validate_signal(SignalDirection::Short, 100.0, 105.0, Some(110.0)),
            Err(SignalValidityError::TakeProfitOnWrongSide)
        );
    }

    #[test]
    fn signal_without_take_profit_only_checks_stop_side() {
        assert!(validate_signal(SignalDirection::Long, 100.0, 95.0, None).is_ok());
        assert!(validate_signal(SignalDirection::Short, 100.0, 105.0, None).is_ok());
    }

    #[test]
    fn close_direction_is_always_valid() {
        assert!(validate_signal(SignalDirection::Close, 100.0, 1_000.0, Some(-5.0)).is_ok());
    }
}
