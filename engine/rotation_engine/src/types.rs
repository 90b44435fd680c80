//! # Types
//!
//! Shared data structures used across all modules of the rotation engine.
//!
//! ## Design decisions
//!
//! ### Snapshot ownership
//!
//! A [`Chain`] is an in-memory snapshot of the directory service's record.
//! Engine operations never mutate a snapshot in place: they take `&Chain`
//! and return an updated copy, so a single owner (the scheduler) decides
//! when a new snapshot becomes current.
//!
//! ### Status as a Finite-State Machine
//!
//! [`LoanStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Pending ──► Approved ──► Repaid
//!                  └──────► Defaulted
//! ```
//!
//! Backward transitions and transitions out of terminal states (`Repaid`,
//! `Defaulted`) are rejected by the loan operations in [`crate::loans`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// Classification of a chain, deciding its admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Members join immediately via an invite link.
    Social,
    /// Admission is gated behind an external vetting step.
    Global,
}

/// A participant in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Principal / account identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Wallet address funds move through.
    pub wallet: String,
    /// Whether the member has contributed in the active round.
    pub contributed: bool,
    /// Amount the member commits per round.
    pub contribution_amount: i128,
    /// Whether the member may extend loans.
    pub is_lender: bool,
}

impl Member {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        wallet: impl Into<String>,
        contribution_amount: i128,
        is_lender: bool,
    ) -> Self {
        Member {
            id: id.into(),
            name: name.into(),
            wallet: wallet.into(),
            contributed: false,
            contribution_amount,
            is_lender,
        }
    }
}

/// Lifecycle status of a peer-to-peer loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Requested by the borrower, awaiting a lender.
    Pending,
    /// Funded by a lender, awaiting repayment.
    Approved,
    /// Repaid in full before or at the due date. Terminal.
    Repaid,
    /// Past due without repayment. Terminal.
    Defaulted,
}

impl LoanStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Repaid | LoanStatus::Defaulted)
    }
}

/// A peer-to-peer loan extended within a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    /// Sequential per-chain identifier (insertion order = creation order).
    pub id: u64,
    pub borrower_id: String,
    /// `None` until a lender-capable member approves an unassigned request.
    pub lender_id: Option<String>,
    pub amount: i128,
    /// Copied from the chain at request time; later chain changes don't apply.
    pub interest_rate: f64,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
    /// Set only on the transition to `Repaid`.
    pub repayment_date: Option<DateTime<Utc>>,
}

/// Seed parameters supplied by the chain creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub round_duration_secs: i64,
    pub total_rounds: u32,
    pub currency: String,
    pub total_funds: i128,
    pub interest_rate: f64,
    pub fine_rate: f64,
    pub kind: ChainKind,
}

/// A rotating savings group: the aggregate the scheduler owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    /// Fixed round length in seconds. Rounds are elapsed-seconds windows,
    /// never calendar months.
    pub round_duration_secs: i64,
    pub total_rounds: u32,
    /// 1-indexed active round, always within `[1, total_rounds]`.
    pub current_round: u32,
    pub currency: String,
    /// Funding target for the season.
    pub total_funds: i128,
    /// Accumulated contributions.
    pub current_funds: i128,
    /// Percent rate applied to loans at request time.
    pub interest_rate: f64,
    /// Percent penalty for late payment.
    pub fine_rate: f64,
    pub kind: ChainKind,
    pub members: Vec<Member>,
    /// Insertion order = creation order.
    pub loans: Vec<Loan>,
}

impl Chain {
    /// Build a fresh chain from creator-supplied seed parameters.
    ///
    /// Rejects non-positive round durations, zero round counts, and
    /// non-positive funding targets with [`EngineError::InvalidChain`].
    pub fn new(params: ChainParams) -> Result<Self> {
        if params.round_duration_secs <= 0 {
            return Err(EngineError::InvalidChain(format!(
                "round duration must be positive, got {}",
                params.round_duration_secs
            )));
        }
        if params.total_rounds == 0 {
            return Err(EngineError::InvalidChain(
                "a chain needs at least one round".to_string(),
            ));
        }
        if params.total_funds <= 0 {
            return Err(EngineError::InvalidChain(format!(
                "funding target must be positive, got {}",
                params.total_funds
            )));
        }

        Ok(Chain {
            id: params.id,
            name: params.name,
            start_date: params.start_date,
            round_duration_secs: params.round_duration_secs,
            total_rounds: params.total_rounds,
            current_round: 1,
            currency: params.currency,
            total_funds: params.total_funds,
            current_funds: 0,
            interest_rate: params.interest_rate,
            fine_rate: params.fine_rate,
            kind: params.kind,
            members: Vec::new(),
            loans: Vec::new(),
        })
    }

    /// Look up a member by principal id.
    pub fn member(&self, member_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    /// Look up a loan by id.
    pub fn loan(&self, loan_id: u64) -> Option<&Loan> {
        self.loans.iter().find(|l| l.id == loan_id)
    }

    /// Next sequential loan id.
    pub fn next_loan_id(&self) -> u64 {
        self.loans.iter().map(|l| l.id).max().map_or(1, |id| id + 1)
    }
}

/// Non-negative time remaining to a boundary, decomposed for display.
///
/// Derived on every tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl TimeWindow {
    /// All fields zero: the boundary has been reached or passed.
    pub fn is_elapsed(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }

    /// Total seconds the window represents.
    pub fn total_seconds(&self) -> u64 {
        self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> ChainParams {
        ChainParams {
            id: "chain-1".to_string(),
            name: "Lunch club".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            round_duration_secs: 604_800,
            total_rounds: 5,
            currency: "ICP".to_string(),
            total_funds: 5_000,
            interest_rate: 5.0,
            fine_rate: 2.0,
            kind: ChainKind::Social,
        }
    }

    #[test]
    fn new_chain_starts_at_round_one_with_no_funds() {
        let chain = Chain::new(params()).unwrap();
        assert_eq!(chain.current_round, 1);
        assert_eq!(chain.current_funds, 0);
        assert!(chain.members.is_empty());
        assert!(chain.loans.is_empty());
    }

    #[test]
    fn new_chain_rejects_zero_round_duration() {
        let mut p = params();
        p.round_duration_secs = 0;
        assert!(matches!(
            Chain::new(p),
            Err(EngineError::InvalidChain(_))
        ));
    }

    #[test]
    fn new_chain_rejects_zero_rounds() {
        let mut p = params();
        p.total_rounds = 0;
        assert!(matches!(Chain::new(p), Err(EngineError::InvalidChain(_))));
    }

    #[test]
    fn new_chain_rejects_non_positive_target() {
        let mut p = params();
        p.total_funds = 0;
        assert!(matches!(Chain::new(p), Err(EngineError::InvalidChain(_))));
    }

    #[test]
    fn next_loan_id_is_sequential() {
        let mut chain = Chain::new(params()).unwrap();
        assert_eq!(chain.next_loan_id(), 1);
        chain.loans.push(Loan {
            id: 1,
            borrower_id: "alice".to_string(),
            lender_id: None,
            amount: 100,
            interest_rate: 5.0,
            due_date: chain.start_date,
            status: LoanStatus::Pending,
            repayment_date: None,
        });
        assert_eq!(chain.next_loan_id(), 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!LoanStatus::Pending.is_terminal());
        assert!(!LoanStatus::Approved.is_terminal());
        assert!(LoanStatus::Repaid.is_terminal());
        assert!(LoanStatus::Defaulted.is_terminal());
    }

    #[test]
    fn chain_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChainKind::Social).unwrap(),
            "\"social\""
        );
        assert_eq!(
            serde_json::to_string(&LoanStatus::Defaulted).unwrap(),
            "\"defaulted\""
        );
    }
}
