//! Invite-link handling and member admission.
//!
//! The invite token is a URL in one of two shapes, and the extraction rule
//! differs per shape. Both branches are kept as-is: collapsing them into a
//! single structured token format is a product decision the engine does not
//! make unilaterally.

use crate::errors::{EngineError, Result};
use crate::types::{Chain, ChainKind, Member};

/// Substring marking an invite that targets a local canister host
/// (`http://localhost:<port>/join/<id>`). Those URLs carry the chain id in
/// the third colon-delimited segment rather than after the double slash.
const CANISTER_HOST_MARKER: &str = "localhost";

/// Externally produced admission capability for global chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vetting {
    /// No vetting decision held. Sufficient for social chains only.
    Unverified,
    /// The vetting collaborator approved this candidate.
    Approved,
}

/// Extract the chain id from an invite token.
///
/// * Canister-host tokens (`http://localhost:4943/join/abc`): the id is the
///   third slash-delimited component of the third colon-delimited segment.
/// * Generic tokens (`https://app.example.com/join/abc`): the id is the
///   third slash-delimited component after the double slash.
///
/// An empty extraction fails with [`EngineError::InvalidInviteToken`].
pub fn parse_invite_token(token: &str) -> Result<String> {
    let id = if token.contains(CANISTER_HOST_MARKER) {
        token
            .split(':')
            .nth(2)
            .unwrap_or("")
            .split('/')
            .nth(2)
            .unwrap_or("")
    } else {
        token.split('/').nth(4).unwrap_or("")
    };

    if id.is_empty() {
        return Err(EngineError::InvalidInviteToken(format!(
            "no chain id in invite token {token:?}"
        )));
    }
    Ok(id.to_string())
}

/// Produce a shareable invite link for a chain.
///
/// Appends `/join/{chain_id}` to the origin, or just `/{chain_id}` when the
/// origin already ends in a `join` path segment.
pub fn invite_link(origin: &str, chain_id: &str) -> String {
    let origin = origin.trim_end_matches('/');
    if origin.split('/').any(|segment| segment == "join") {
        format!("{origin}/{chain_id}")
    } else {
        format!("{origin}/join/{chain_id}")
    }
}

/// Admit a member to a chain with default posture (`contributed = false`).
///
/// Social chains admit immediately. Global chains require the caller to
/// hold [`Vetting::Approved`], produced by the external vetting
/// collaborator before this call.
pub fn admit(
    chain: &Chain,
    member_id: &str,
    name: &str,
    wallet: &str,
    contribution_amount: i128,
    is_lender: bool,
    vetting: Vetting,
) -> Result<Chain> {
    if chain.kind == ChainKind::Global && vetting != Vetting::Approved {
        return Err(EngineError::VettingRequired);
    }
    if chain.member(member_id).is_some() {
        return Err(EngineError::InvalidState(format!(
            "{member_id} is already a member of chain {}",
            chain.id
        )));
    }
    if contribution_amount <= 0 {
        return Err(EngineError::InvalidContribution(format!(
            "per-round commitment must be positive, got {contribution_amount}"
        )));
    }

    let mut updated = chain.clone();
    updated
        .members
        .push(Member::new(member_id, name, wallet, contribution_amount, is_lender));
    Ok(updated)
}

/// Remove a member from a chain.
///
/// Blocked while the member appears on any loan that still owes money
/// (pending or approved); terminal loans don't pin a member.
pub fn remove_member(chain: &Chain, member_id: &str) -> Result<Chain> {
    if chain.member(member_id).is_none() {
        return Err(EngineError::InvalidState(format!(
            "{member_id} is not a member of chain {}",
            chain.id
        )));
    }
    let outstanding = chain.loans.iter().any(|loan| {
        !loan.status.is_terminal()
            && (loan.borrower_id == member_id || loan.lender_id.as_deref() == Some(member_id))
    });
    if outstanding {
        return Err(EngineError::InvalidState(format!(
            "{member_id} has outstanding loans in chain {}",
            chain.id
        )));
    }

    let mut updated = chain.clone();
    updated.members.retain(|m| m.id != member_id);
    Ok(updated)
}
