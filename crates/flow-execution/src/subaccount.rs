//! Subaccount rotation (expansion, grounded on
//! `original_source/src/executor/subaccount_manager.py`): simple FIFO
//! selection, no load balancing across funded subaccounts (out of scope —
//! spec §1 excludes exchange authentication detail beyond credential
//! selection).

use chrono::{DateTime, Utc};
use flow_schemas::Credential;

/// The first usable credential in table order, or `None` if every
/// subaccount is inactive or expired.
pub fn select_subaccount(credentials: &[Credential], now: DateTime<Utc>) -> Option<&Credential> {
    credentials.iter().find(|c| c.is_usable(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn credential(subaccount_id: i64, is_active: bool, expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            id: Uuid::nil(),
            subaccount_id,
            signing_material: vec![],
            is_active,
            expires_at,
        }
    }

    #[test]
    fn picks_the_first_active_unexpired_credential() {
        let now = Utc::now();
        let credentials = vec![
            credential(1, false, None),
            credential(2, true, None),
            credential(3, true, None),
        ];
        let picked = select_subaccount(&credentials, now).unwrap();
        assert_eq!(picked.subaccount_id, 2);
    }

    #[test]
    fn skips_expired_credentials() {
        let now = Utc::now();
        let credentials = vec![
            credential(1, true, Some(now - chrono::Duration::hours(1))),
            credential(2, true, None),
        ];
        let picked = select_subaccount(&credentials, now).unwrap();
        assert_eq!(picked.subaccount_id, 2);
    }

    #[test]
    fn returns_none_when_every_subaccount_is_unusable() {
        let now = Utc::now();
        let credentials = vec![credential(1, false, None)];
        assert!(select_subaccount(&credentials, now).is_none());
    }
}
