//! The merged read model the scheduler republishes on every tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger;
use crate::timemath;
use crate::types::{Chain, ChainKind, Loan, Member, TimeWindow};

/// Everything the presentation layer reads: progress, remaining windows,
/// loans, members. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainView {
    pub chain_id: String,
    pub name: String,
    pub kind: ChainKind,
    pub currency: String,
    pub current_round: u32,
    pub total_rounds: u32,
    pub round_remaining: TimeWindow,
    pub season_remaining: TimeWindow,
    /// Final round reached and the season boundary passed. The scheduler
    /// keeps ticking for display but stops advancing rounds.
    pub season_complete: bool,
    pub current_funds: i128,
    pub total_funds: i128,
    /// Raw ratio; may exceed 100.
    pub progress_percent: f64,
    /// Clamped to `[0, 100]`.
    pub display_progress: f64,
    pub contributed_count: usize,
    pub member_count: usize,
    pub members: Vec<Member>,
    pub loans: Vec<Loan>,
}

/// Derive the merged view of a chain snapshot at `now`.
pub fn derive_view(chain: &Chain, now: DateTime<Utc>) -> ChainView {
    let round_remaining = timemath::remaining(timemath::round_end(chain, now), now);
    let season_remaining = timemath::remaining(timemath::season_end(chain), now);
    ChainView {
        chain_id: chain.id.clone(),
        name: chain.name.clone(),
        kind: chain.kind,
        currency: chain.currency.clone(),
        current_round: chain.current_round,
        total_rounds: chain.total_rounds,
        round_remaining,
        season_remaining,
        season_complete: chain.current_round == chain.total_rounds
            && season_remaining.is_elapsed(),
        current_funds: chain.current_funds,
        total_funds: chain.total_funds,
        progress_percent: ledger::progress_percent(chain),
        display_progress: ledger::display_progress(chain),
        contributed_count: ledger::contributed_count(chain),
        member_count: chain.members.len(),
        members: chain.members.clone(),
        loans: chain.loans.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainParams;
    use chrono::{Duration, TimeZone};

    fn chain() -> Chain {
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
        chain.current_funds = 3_500;
        chain
    }

    #[test]
    fn view_merges_progress_and_windows() {
        let chain = chain();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let view = derive_view(&chain, now);
        assert_eq!(view.progress_percent, 70.0);
        assert_eq!(view.round_remaining.days, 7);
        assert_eq!(view.season_remaining.days, 35);
        assert!(!view.season_complete);
    }

    #[test]
    fn season_completes_only_past_the_final_boundary() {
        let mut chain = chain();
        chain.current_round = 5;
        let end = timemath::season_end(&chain);

        let before = derive_view(&chain, end - Duration::seconds(1));
        assert!(!before.season_complete);

        let after = derive_view(&chain, end);
        assert!(after.season_complete);
        assert!(after.round_remaining.is_elapsed());
    }
}
