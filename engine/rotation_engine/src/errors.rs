//! Engine-wide error types.
//!
//! Every variant here is a *local* validation failure: it is detected
//! synchronously against the in-memory chain snapshot and returned to the
//! caller before any external collaborator is contacted.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid chain parameters: {0}")]
    InvalidChain(String),

    #[error("invalid contribution: {0}")]
    InvalidContribution(String),

    #[error("invalid loan: {0}")]
    InvalidLoan(String),

    #[error("insufficient funds: lender balance {balance} is below loan amount {amount}")]
    InsufficientFunds { balance: i128, amount: i128 },

    #[error("invalid loan state: {0}")]
    InvalidState(String),

    #[error("invalid invite token: {0}")]
    InvalidInviteToken(String),

    #[error("vetting approval is required to join a global chain")]
    VettingRequired,
}

pub type Result<T> = std::result::Result<T, EngineError>;
