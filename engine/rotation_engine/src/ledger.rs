//! Contribution accounting against the chain's funding target.
//!
//! `record_contribution` mutates chain-local state only. The actual token
//! transfer belongs to the external ledger collaborator; callers must
//! sequence this strictly after that transfer succeeds.

use crate::errors::{EngineError, Result};
use crate::types::Chain;

/// Raw funding progress in percent. May exceed 100; 0 when the target is 0.
pub fn progress_percent(chain: &Chain) -> f64 {
    if chain.total_funds == 0 {
        return 0.0;
    }
    chain.current_funds as f64 / chain.total_funds as f64 * 100.0
}

/// Funding progress clamped to `[0, 100]` for display.
pub fn display_progress(chain: &Chain) -> f64 {
    progress_percent(chain).clamp(0.0, 100.0)
}

/// Number of members that have contributed in the active round.
pub fn contributed_count(chain: &Chain) -> usize {
    chain.members.iter().filter(|m| m.contributed).count()
}

/// Record a member's contribution for the active round.
///
/// Rejects non-positive amounts, unknown members, and a second contribution
/// within the same round. Returns the updated snapshot; the caller commits
/// it only after the external funding transfer has succeeded.
pub fn record_contribution(chain: &Chain, member_id: &str, amount: i128) -> Result<Chain> {
    if amount <= 0 {
        return Err(EngineError::InvalidContribution(format!(
            "amount must be positive, got {amount}"
        )));
    }

    let member = chain.member(member_id).ok_or_else(|| {
        EngineError::InvalidContribution(format!("{member_id} is not a member of this chain"))
    })?;

    if member.contributed {
        return Err(EngineError::InvalidContribution(format!(
            "{member_id} already contributed in round {}",
            chain.current_round
        )));
    }

    let mut updated = chain.clone();
    for m in &mut updated.members {
        if m.id == member_id {
            m.contributed = true;
        }
    }
    updated.current_funds += amount;
    Ok(updated)
}

/// Clear every member's contributed flag for a new round.
///
/// An explicit transition: the scheduler invokes it when TimeMath reports
/// the active round's boundary has passed, never automatically.
pub fn reset_round_contributions(chain: &Chain) -> Chain {
    let mut updated = chain.clone();
    for m in &mut updated.members {
        m.contributed = false;
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants;
    use crate::types::{ChainKind, ChainParams, Member};
    use chrono::{TimeZone, Utc};

    fn chain_with_members() -> Chain {
        let mut chain = Chain::new(ChainParams {
            id: "chain-1".to_string(),
            name: "Weekly five".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            round_duration_secs: 604_800,
            total_rounds: 5,
            currency: "ICP".to_string(),
            total_funds: 5_000,
            interest_rate: 5.0,
            fine_rate: 2.0,
            kind: ChainKind::Social,
        })
        .unwrap();
        chain.members.push(Member::new("alice", "Alice", "wallet-a", 1_000, true));
        chain.members.push(Member::new("bob", "Bob", "wallet-b", 1_000, false));
        chain
    }

    #[test]
    fn seventy_percent_progress() {
        let mut chain = chain_with_members();
        chain.current_funds = 3_500;
        assert_eq!(progress_percent(&chain), 70.0);
        assert_eq!(display_progress(&chain), 70.0);
    }

    #[test]
    fn zero_target_yields_zero_progress() {
        let mut chain = chain_with_members();
        chain.total_funds = 0;
        chain.current_funds = 3_500;
        assert_eq!(progress_percent(&chain), 0.0);
    }

    #[test]
    fn display_progress_clamps_overshoot() {
        let mut chain = chain_with_members();
        chain.current_funds = 6_000;
        assert_eq!(progress_percent(&chain), 120.0);
        assert_eq!(display_progress(&chain), 100.0);
    }

    #[test]
    fn contribution_sets_flag_and_accumulates() {
        let chain = chain_with_members();
        let updated = record_contribution(&chain, "alice", 1_000).unwrap();
        assert!(updated.member("alice").unwrap().contributed);
        assert!(!updated.member("bob").unwrap().contributed);
        assert_eq!(updated.current_funds, 1_000);
        assert_eq!(contributed_count(&updated), 1);
        invariants::assert_funds_in_range(&updated);
        // Source snapshot untouched.
        assert_eq!(chain.current_funds, 0);
    }

    #[test]
    fn second_contribution_same_round_is_rejected() {
        let chain = chain_with_members();
        let updated = record_contribution(&chain, "alice", 1_000).unwrap();
        let err = record_contribution(&updated, "alice", 1_000).unwrap_err();
        assert!(matches!(err, EngineError::InvalidContribution(_)));
        assert_eq!(updated.current_funds, 1_000);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let chain = chain_with_members();
        assert!(matches!(
            record_contribution(&chain, "alice", 0),
            Err(EngineError::InvalidContribution(_))
        ));
        assert!(matches!(
            record_contribution(&chain, "alice", -50),
            Err(EngineError::InvalidContribution(_))
        ));
    }

    #[test]
    fn unknown_member_is_rejected() {
        let chain = chain_with_members();
        assert!(matches!(
            record_contribution(&chain, "mallory", 100),
            Err(EngineError::InvalidContribution(_))
        ));
    }

    #[test]
    fn reset_clears_flags_and_allows_recontribution() {
        let chain = chain_with_members();
        let round_one = record_contribution(&chain, "alice", 1_000).unwrap();
        let round_two = reset_round_contributions(&round_one);
        assert_eq!(contributed_count(&round_two), 0);
        // Funds survive the reset; only the flags roll over.
        assert_eq!(round_two.current_funds, 1_000);
        let again = record_contribution(&round_two, "alice", 1_000).unwrap();
        assert_eq!(again.current_funds, 2_000);
    }
}
