//! Ledger/wallet collaborator — balances, transfers, and account-identifier
//! derivation. The scheduler never computes balances itself; the loan
//! eligibility check is a pass-through query to this service.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::Result;
use crate::rpc;

#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// Available balance on an account.
    async fn balance_of(&self, account: &str) -> Result<i128>;
    /// Move `amount` between accounts. Either fully applied or failed.
    async fn transfer(&self, from: &str, to: &str, amount: i128) -> Result<()>;
    /// Derive the account identifier for a cryptographic principal.
    async fn account_id_of(&self, principal: &str) -> Result<String>;
}

pub struct HttpWallet {
    client: Client,
    url: String,
}

impl HttpWallet {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        HttpWallet {
            client,
            url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    balance: i128,
}

#[derive(Debug, Deserialize)]
struct AccountResult {
    account_id: String,
}

#[async_trait]
impl WalletLedger for HttpWallet {
    async fn balance_of(&self, account: &str) -> Result<i128> {
        let result: BalanceResult = rpc::call(
            &self.client,
            &self.url,
            "balance_of",
            json!({ "account": account }),
        )
        .await?;
        Ok(result.balance)
    }

    async fn transfer(&self, from: &str, to: &str, amount: i128) -> Result<()> {
        let _: serde_json::Value = rpc::call(
            &self.client,
            &self.url,
            "transfer",
            json!({ "from": from, "to": to, "amount": amount }),
        )
        .await?;
        Ok(())
    }

    async fn account_id_of(&self, principal: &str) -> Result<String> {
        let result: AccountResult = rpc::call(
            &self.client,
            &self.url,
            "account_id_of",
            json!({ "principal": principal }),
        )
        .await?;
        Ok(result.account_id)
    }
}
