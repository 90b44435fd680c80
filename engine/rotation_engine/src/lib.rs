//! # Chain Rotation & Ledger Engine
//!
//! Domain rules for rotational savings chains: how a chain advances through
//! rounds and a season, how member contributions accumulate toward a funding
//! target, and how peer-to-peer loans move through their lifecycle.
//!
//! | Concern        | Module                                        |
//! |----------------|-----------------------------------------------|
//! | Data model     | [`types`]                                     |
//! | Round/season math | [`timemath`]                               |
//! | Contributions  | [`ledger`]                                    |
//! | Loan lifecycle | [`loans`]                                     |
//! | Invites & admission | [`membership`]                           |
//! | Merged read model | [`view`]                                   |
//! | Time source    | [`clock`]                                     |
//!
//! ## Architecture
//!
//! The engine is synchronous and pure: no I/O, no async, no ambient state.
//! Every operation reads a [`types::Chain`] snapshot and returns an updated
//! copy; a single owner (the scheduler service) decides when a returned
//! snapshot becomes current. All wall-clock inputs arrive as parameters or
//! through the injectable [`clock::Clock`] trait. Balance queries, fund
//! transfers, and chain persistence belong to external collaborators — the
//! engine only validates against their answers.

pub mod clock;
pub mod errors;
pub mod ledger;
pub mod loans;
pub mod membership;
pub mod timemath;
pub mod types;
pub mod view;

#[cfg(test)]
mod invariants;

pub use clock::{Clock, SystemClock};
pub use errors::EngineError;
pub use types::{Chain, ChainKind, ChainParams, Loan, LoanStatus, Member, TimeWindow};
pub use view::{derive_view, ChainView};
