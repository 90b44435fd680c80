#![allow(dead_code)]

//! Test-only invariant assertions, driven from the module tests.

use crate::types::{Chain, Loan, LoanStatus};

/// INV-1: the active round stays within `[1, total_rounds]`.
pub fn assert_round_in_range(chain: &Chain) {
    assert!(
        chain.current_round >= 1 && chain.current_round <= chain.total_rounds,
        "INV-1 violated: chain {} round {} outside [1, {}]",
        chain.id,
        chain.current_round,
        chain.total_rounds
    );
}

/// INV-2: accumulated funds stay within `[0, total_funds]`.
pub fn assert_funds_in_range(chain: &Chain) {
    assert!(
        chain.current_funds >= 0 && chain.current_funds <= chain.total_funds,
        "INV-2 violated: chain {} funds {} outside [0, {}]",
        chain.id,
        chain.current_funds,
        chain.total_funds
    );
}

/// INV-3: loan transition validity. Only forward transitions are allowed:
///   Pending  -> Approved
///   Approved -> Repaid | Defaulted
///   Repaid   -> (none)
///   Defaulted-> (none)
pub fn assert_loan_transition(from: LoanStatus, to: LoanStatus) {
    let valid = matches!(
        (from, to),
        (LoanStatus::Pending, LoanStatus::Approved)
            | (LoanStatus::Approved, LoanStatus::Repaid)
            | (LoanStatus::Approved, LoanStatus::Defaulted)
    );
    assert!(
        valid,
        "INV-3 violated: invalid loan transition {from:?} -> {to:?}"
    );
}

/// INV-4: repayment dates exist exactly on repaid loans.
pub fn assert_repayment_date_consistency(loan: &Loan) {
    match loan.status {
        LoanStatus::Repaid => assert!(
            loan.repayment_date.is_some(),
            "INV-4 violated: repaid loan {} has no repayment date",
            loan.id
        ),
        _ => assert!(
            loan.repayment_date.is_none(),
            "INV-4 violated: loan {} in {:?} carries a repayment date",
            loan.id,
            loan.status
        ),
    }
}

/// INV-5: a contribution of `amount` moves the balance by exactly `amount`.
pub fn assert_contribution_delta(before: i128, after: i128, amount: i128) {
    assert_eq!(
        after,
        before + amount,
        "INV-5 violated: {before} + {amount} != {after}"
    );
}

/// Run the stateless chain invariants.
pub fn assert_chain_invariants(chain: &Chain) {
    assert_round_in_range(chain);
    assert_funds_in_range(chain);
    for loan in &chain.loans {
        assert_repayment_date_consistency(loan);
    }
}
