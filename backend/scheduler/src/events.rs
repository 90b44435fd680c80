//! Rotation events journaled by the scheduler.
//!
//! One event per derived or commanded state transition: round advances the
//! tick loop computes, contributions and loan actions the command handlers
//! commit. The REST API serves these back as the chain's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All rotation-event kinds the scheduler journals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The tick loop advanced the chain into a new round.
    RoundAdvanced,
    /// The final round's boundary passed; the season is over.
    SeasonCompleted,
    /// A member's per-round contribution was recorded.
    ContributionRecorded,
    /// A member joined the chain.
    MemberJoined,
    /// A member left the chain.
    MemberLeft,
    /// A loan request entered the book.
    LoanRequested,
    /// A lender approved and funded a loan.
    LoanApproved,
    /// A borrower repaid a loan.
    LoanRepaid,
    /// The tick loop defaulted an overdue loan.
    LoanDefaulted,
}

impl EventKind {
    /// Identifier string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundAdvanced => "round_advanced",
            Self::SeasonCompleted => "season_completed",
            Self::ContributionRecorded => "contribution_recorded",
            Self::MemberJoined => "member_joined",
            Self::MemberLeft => "member_left",
            Self::LoanRequested => "loan_requested",
            Self::LoanApproved => "loan_approved",
            Self::LoanRepaid => "loan_repaid",
            Self::LoanDefaulted => "loan_defaulted",
        }
    }

    /// Parse a stored identifier back into an [`EventKind`].
    #[allow(dead_code)]
    pub fn from_record(s: &str) -> Option<Self> {
        match s {
            "round_advanced" => Some(Self::RoundAdvanced),
            "season_completed" => Some(Self::SeasonCompleted),
            "contribution_recorded" => Some(Self::ContributionRecorded),
            "member_joined" => Some(Self::MemberJoined),
            "member_left" => Some(Self::MemberLeft),
            "loan_requested" => Some(Self::LoanRequested),
            "loan_approved" => Some(Self::LoanApproved),
            "loan_repaid" => Some(Self::LoanRepaid),
            "loan_defaulted" => Some(Self::LoanDefaulted),
            _ => None,
        }
    }
}

/// A rotation event ready to be journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEvent {
    pub chain_id: String,
    pub kind: EventKind,
    pub member_id: Option<String>,
    pub loan_id: Option<u64>,
    pub amount: Option<i128>,
    pub round: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

impl RotationEvent {
    pub fn new(chain_id: &str, kind: EventKind, occurred_at: DateTime<Utc>) -> Self {
        RotationEvent {
            chain_id: chain_id.to_string(),
            kind,
            member_id: None,
            loan_id: None,
            amount: None,
            round: None,
            occurred_at,
        }
    }

    pub fn member(mut self, member_id: &str) -> Self {
        self.member_id = Some(member_id.to_string());
        self
    }

    pub fn loan(mut self, loan_id: u64) -> Self {
        self.loan_id = Some(loan_id);
        self
    }

    pub fn amount(mut self, amount: i128) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }
}

/// A journal row as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub chain_id: String,
    pub event_type: String,
    pub member_id: Option<String>,
    pub loan_id: Option<i64>,
    pub amount: Option<String>,
    pub round: Option<i64>,
    pub occurred_at: i64,
    pub created_at: i64,
}
