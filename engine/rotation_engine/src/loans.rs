//! Loan lifecycle state machine.
//!
//! Transitions are snapshot-in / snapshot-out; the scheduler commits the
//! returned chain only after any required external call (balance query,
//! fund transfer) has succeeded. The eligibility balance for `approve_loan`
//! is queried from the ledger collaborator by the caller and passed in, so
//! this module never blocks.

use chrono::{DateTime, Utc};

use crate::errors::{EngineError, Result};
use crate::types::{Chain, Loan, LoanStatus};

/// Create a loan request in `Pending` state.
///
/// `lender_id` may be left unassigned; any lender-capable member can then
/// approve. Returns the updated snapshot and the new loan's id.
pub fn request_loan(
    chain: &Chain,
    borrower_id: &str,
    lender_id: Option<&str>,
    amount: i128,
    due_date: DateTime<Utc>,
) -> Result<(Chain, u64)> {
    if amount <= 0 {
        return Err(EngineError::InvalidLoan(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if chain.member(borrower_id).is_none() {
        return Err(EngineError::InvalidLoan(format!(
            "borrower {borrower_id} is not a member of this chain"
        )));
    }
    if let Some(lender) = lender_id {
        if lender == borrower_id {
            return Err(EngineError::InvalidLoan(
                "borrower and lender must be distinct members".to_string(),
            ));
        }
        if chain.member(lender).is_none() {
            return Err(EngineError::InvalidLoan(format!(
                "lender {lender} is not a member of this chain"
            )));
        }
    }

    let mut updated = chain.clone();
    let id = updated.next_loan_id();
    updated.loans.push(Loan {
        id,
        borrower_id: borrower_id.to_string(),
        lender_id: lender_id.map(str::to_string),
        amount,
        interest_rate: chain.interest_rate,
        due_date,
        status: LoanStatus::Pending,
        repayment_date: None,
    });
    Ok((updated, id))
}

/// Local validity checks for an approval, independent of balance.
///
/// Lets callers reject bad approvals before querying the ledger
/// collaborator for the lender's balance.
pub fn validate_approval(chain: &Chain, loan_id: u64, lender_id: &str) -> Result<()> {
    let loan = find_loan(chain, loan_id)?;

    if loan.status != LoanStatus::Pending {
        return Err(EngineError::InvalidState(format!(
            "loan {loan_id} cannot be approved from {:?}",
            loan.status
        )));
    }
    if loan.borrower_id == lender_id {
        return Err(EngineError::InvalidLoan(
            "a borrower cannot approve their own loan".to_string(),
        ));
    }
    match &loan.lender_id {
        Some(designated) => {
            if designated != lender_id {
                return Err(EngineError::InvalidLoan(format!(
                    "loan {loan_id} is designated to lender {designated}"
                )));
            }
        }
        None => {
            let approver = chain.member(lender_id).ok_or_else(|| {
                EngineError::InvalidLoan(format!(
                    "lender {lender_id} is not a member of this chain"
                ))
            })?;
            if !approver.is_lender {
                return Err(EngineError::InvalidLoan(format!(
                    "{lender_id} is not a lender-capable member"
                )));
            }
        }
    }
    Ok(())
}

/// Approve a pending loan.
///
/// Valid only from `Pending`, only by the designated lender — or, when the
/// request left the lender unassigned, by any lender-capable member, who
/// then becomes the lender of record. `lender_available_balance` is the
/// ledger collaborator's answer for the approver; the check fails with
/// [`EngineError::InsufficientFunds`] before any transfer is attempted.
pub fn approve_loan(
    chain: &Chain,
    loan_id: u64,
    lender_id: &str,
    lender_available_balance: i128,
) -> Result<Chain> {
    validate_approval(chain, loan_id, lender_id)?;

    let loan = find_loan(chain, loan_id)?;
    if lender_available_balance < loan.amount {
        return Err(EngineError::InsufficientFunds {
            balance: lender_available_balance,
            amount: loan.amount,
        });
    }

    let mut updated = chain.clone();
    if let Some(loan) = updated.loans.iter_mut().find(|l| l.id == loan_id) {
        loan.status = LoanStatus::Approved;
        loan.lender_id = Some(lender_id.to_string());
    }
    Ok(updated)
}

/// Repay an approved loan, stamping the repayment date.
///
/// Repay/expire tie-break: a repayment processed before the next scheduler
/// tick wins even when the due date has already passed; once a tick has
/// defaulted the loan, repayment is rejected as a terminal-state transition.
pub fn repay_loan(
    chain: &Chain,
    loan_id: u64,
    borrower_id: &str,
    now: DateTime<Utc>,
) -> Result<Chain> {
    let loan = find_loan(chain, loan_id)?;

    if loan.status != LoanStatus::Approved {
        return Err(EngineError::InvalidState(format!(
            "loan {loan_id} cannot be repaid from {:?}",
            loan.status
        )));
    }
    if loan.borrower_id != borrower_id {
        return Err(EngineError::InvalidLoan(format!(
            "loan {loan_id} belongs to borrower {}",
            loan.borrower_id
        )));
    }

    let mut updated = chain.clone();
    if let Some(loan) = updated.loans.iter_mut().find(|l| l.id == loan_id) {
        loan.status = LoanStatus::Repaid;
        loan.repayment_date = Some(now);
    }
    Ok(updated)
}

/// Default every approved loan whose due date has passed.
///
/// A derived transition the scheduler evaluates on every tick, never a
/// direct user action. Returns the updated snapshot and the ids that
/// transitioned.
pub fn expire_due_loans(chain: &Chain, now: DateTime<Utc>) -> (Chain, Vec<u64>) {
    let mut updated = chain.clone();
    let mut defaulted = Vec::new();
    for loan in &mut updated.loans {
        if loan.status == LoanStatus::Approved && now > loan.due_date {
            loan.status = LoanStatus::Defaulted;
            defaulted.push(loan.id);
        }
    }
    (updated, defaulted)
}

/// Principal plus simple interest at the rate copied from the chain.
pub fn repayment_amount(loan: &Loan) -> i128 {
    loan.amount + (loan.amount as f64 * loan.interest_rate / 100.0).round() as i128
}

fn find_loan(chain: &Chain, loan_id: u64) -> Result<&Loan> {
    chain
        .loan(loan_id)
        .ok_or_else(|| EngineError::InvalidLoan(format!("no loan with id {loan_id}")))
}
