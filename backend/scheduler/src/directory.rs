//! Chain directory collaborator — the authoritative source of truth for
//! chains. The scheduler's in-memory snapshot is a cache refreshed on
//! explicit fetch, never a replicated store.
//!
//! The directory's wire format tags variants as single-key objects with a
//! null payload (`{"social": null}`, `{"pending": null}`). Those shapes
//! exist only here: they are translated to the core enums at this boundary
//! and nowhere else.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use rotation_engine::{Chain, ChainKind, ChainParams, Loan, LoanStatus, Member};

use crate::errors::{Result, SchedulerError};
use crate::rpc;

#[async_trait]
pub trait ChainDirectory: Send + Sync {
    async fn get_chain(&self, id: &str) -> Result<Chain>;
    async fn create_chain(&self, params: &ChainParams) -> Result<String>;
    async fn get_all_chains(&self) -> Result<Vec<Chain>>;
    async fn add_member(&self, chain_id: &str, member: &Member) -> Result<()>;
    async fn get_member_loans(&self, user_id: &str, chain_id: &str) -> Result<Vec<Loan>>;
    async fn update_loan_status(
        &self,
        chain_id: &str,
        loan_id: u64,
        status: LoanStatus,
    ) -> Result<()>;
}

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

/// `{"social": null}` / `{"global": null}` on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum WireChainKind {
    #[serde(rename = "social")]
    Social(()),
    #[serde(rename = "global")]
    Global(()),
}

impl From<WireChainKind> for ChainKind {
    fn from(kind: WireChainKind) -> Self {
        match kind {
            WireChainKind::Social(()) => ChainKind::Social,
            WireChainKind::Global(()) => ChainKind::Global,
        }
    }
}

impl From<ChainKind> for WireChainKind {
    fn from(kind: ChainKind) -> Self {
        match kind {
            ChainKind::Social => WireChainKind::Social(()),
            ChainKind::Global => WireChainKind::Global(()),
        }
    }
}

/// `{"pending": null}` etc. on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum WireLoanStatus {
    #[serde(rename = "pending")]
    Pending(()),
    #[serde(rename = "approved")]
    Approved(()),
    #[serde(rename = "repaid")]
    Repaid(()),
    #[serde(rename = "defaulted")]
    Defaulted(()),
}

impl From<WireLoanStatus> for LoanStatus {
    fn from(status: WireLoanStatus) -> Self {
        match status {
            WireLoanStatus::Pending(()) => LoanStatus::Pending,
            WireLoanStatus::Approved(()) => LoanStatus::Approved,
            WireLoanStatus::Repaid(()) => LoanStatus::Repaid,
            WireLoanStatus::Defaulted(()) => LoanStatus::Defaulted,
        }
    }
}

impl From<LoanStatus> for WireLoanStatus {
    fn from(status: LoanStatus) -> Self {
        match status {
            LoanStatus::Pending => WireLoanStatus::Pending(()),
            LoanStatus::Approved => WireLoanStatus::Approved(()),
            LoanStatus::Repaid => WireLoanStatus::Repaid(()),
            LoanStatus::Defaulted => WireLoanStatus::Defaulted(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLoan {
    pub id: u64,
    pub borrower_id: String,
    pub lender_id: Option<String>,
    pub amount: i128,
    pub interest_rate: f64,
    /// Unix seconds.
    pub due_date: i64,
    pub status: WireLoanStatus,
    pub repayment_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireChain {
    pub id: String,
    pub name: String,
    /// Unix seconds.
    pub start_date: i64,
    pub round_duration: i64,
    pub total_rounds: u32,
    /// 0 / absent means the source of record holds no round yet.
    #[serde(default)]
    pub current_round: u32,
    pub currency: String,
    pub total_funds: i128,
    pub current_funds: i128,
    pub interest_rate: f64,
    pub fine_rate: f64,
    pub kind: WireChainKind,
    pub members: Vec<Member>,
    pub loans: Vec<WireLoan>,
}

fn instant(secs: i64, what: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| SchedulerError::ExternalCall(format!("{what}: bad timestamp {secs}")))
}

pub fn decode_loan(wire: WireLoan) -> Result<Loan> {
    let due_date = instant(wire.due_date, "loan.due_date")?;
    let repayment_date = match wire.repayment_date {
        Some(secs) => Some(instant(secs, "loan.repayment_date")?),
        None => None,
    };
    Ok(Loan {
        id: wire.id,
        borrower_id: wire.borrower_id,
        lender_id: wire.lender_id,
        amount: wire.amount,
        interest_rate: wire.interest_rate,
        due_date,
        status: wire.status.into(),
        repayment_date,
    })
}

pub fn decode_chain(wire: WireChain) -> Result<Chain> {
    if wire.round_duration <= 0 {
        return Err(SchedulerError::ExternalCall(format!(
            "chain {}: non-positive round duration {}",
            wire.id, wire.round_duration
        )));
    }
    if wire.total_rounds == 0 {
        return Err(SchedulerError::ExternalCall(format!(
            "chain {}: zero total rounds",
            wire.id
        )));
    }
    let start_date = instant(wire.start_date, "chain.start_date")?;
    let loans = wire
        .loans
        .into_iter()
        .map(decode_loan)
        .collect::<Result<Vec<_>>>()?;
    Ok(Chain {
        id: wire.id,
        name: wire.name,
        start_date,
        round_duration_secs: wire.round_duration,
        total_rounds: wire.total_rounds,
        // The snapshot defaults to round 1 when the record holds none.
        current_round: wire.current_round.max(1),
        currency: wire.currency,
        total_funds: wire.total_funds,
        current_funds: wire.current_funds,
        interest_rate: wire.interest_rate,
        fine_rate: wire.fine_rate,
        kind: wire.kind.into(),
        members: wire.members,
        loans,
    })
}

// ─────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────

pub struct HttpDirectory {
    client: Client,
    url: String,
}

impl HttpDirectory {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        HttpDirectory {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ChainDirectory for HttpDirectory {
    async fn get_chain(&self, id: &str) -> Result<Chain> {
        let wire: WireChain =
            rpc::call(&self.client, &self.url, "get_chain", json!({ "id": id })).await?;
        decode_chain(wire)
    }

    async fn create_chain(&self, params: &ChainParams) -> Result<String> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created = rpc::call(
            &self.client,
            &self.url,
            "create_chain",
            json!({
                "id": params.id,
                "name": params.name,
                "start_date": params.start_date.timestamp(),
                "round_duration": params.round_duration_secs,
                "total_rounds": params.total_rounds,
                "currency": params.currency,
                "total_funds": params.total_funds,
                "interest_rate": params.interest_rate,
                "fine_rate": params.fine_rate,
                "kind": WireChainKind::from(params.kind),
            }),
        )
        .await?;
        Ok(created.id)
    }

    async fn get_all_chains(&self) -> Result<Vec<Chain>> {
        let wires: Vec<WireChain> =
            rpc::call(&self.client, &self.url, "get_all_chains", json!({})).await?;
        wires.into_iter().map(decode_chain).collect()
    }

    async fn add_member(&self, chain_id: &str, member: &Member) -> Result<()> {
        let _: serde_json::Value = rpc::call(
            &self.client,
            &self.url,
            "add_member",
            json!({ "chain_id": chain_id, "member": member }),
        )
        .await?;
        Ok(())
    }

    async fn get_member_loans(&self, user_id: &str, chain_id: &str) -> Result<Vec<Loan>> {
        let wires: Vec<WireLoan> = rpc::call(
            &self.client,
            &self.url,
            "get_member_loans",
            json!({ "user_id": user_id, "chain_id": chain_id }),
        )
        .await?;
        wires.into_iter().map(decode_loan).collect()
    }

    async fn update_loan_status(
        &self,
        chain_id: &str,
        loan_id: u64,
        status: LoanStatus,
    ) -> Result<()> {
        let _: serde_json::Value = rpc::call(
            &self.client,
            &self.url,
            "update_loan_status",
            json!({
                "chain_id": chain_id,
                "loan_id": loan_id,
                "status": WireLoanStatus::from(status),
            }),
        )
        .await?;
        Ok(())
    }
}
