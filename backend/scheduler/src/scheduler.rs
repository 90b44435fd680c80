//! The rotation scheduler: single owner of a live chain snapshot.
//!
//! One task runs [`RotationScheduler::run`], looping over a cancellation
//! token, a periodic tick, and a command channel. Each tick recomputes the
//! time windows, advances the round when its boundary has passed (resetting
//! contribution flags), defaults overdue approved loans, and republishes
//! the merged view on a watch channel. Commands from the API are handled
//! between ticks: local validation first, then the external collaborator
//! call, then the snapshot commit — a failed collaborator call leaves the
//! snapshot untouched.
//!
//! Because every select arm runs to completion before cancellation is
//! observed again, a tick (and each command) is atomic with respect to
//! shutdown: fully applied or not started.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rotation_engine::membership::{self, Vetting};
use rotation_engine::{
    derive_view, ledger, loans, timemath, Chain, ChainView, Clock, EngineError, LoanStatus,
    Member,
};

use crate::db;
use crate::directory::ChainDirectory;
use crate::errors::{Result, SchedulerError};
use crate::events::{EventKind, RotationEvent};
use crate::wallet::WalletLedger;

/// A joining member, as accepted by the join command.
#[derive(Debug, Clone)]
pub struct JoinMember {
    pub member_id: String,
    pub name: String,
    pub wallet: String,
    pub contribution_amount: i128,
    pub is_lender: bool,
    /// Whether the external vetting step has approved this candidate.
    pub vetted: bool,
}

/// Commands forwarded from the presentation layer.
pub enum Command {
    Contribute {
        member_id: String,
        amount: i128,
        reply: oneshot::Sender<Result<()>>,
    },
    Join {
        member: JoinMember,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        member_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestLoan {
        borrower_id: String,
        lender_id: Option<String>,
        amount: i128,
        due_date: DateTime<Utc>,
        reply: oneshot::Sender<Result<u64>>,
    },
    ApproveLoan {
        loan_id: u64,
        lender_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RepayLoan {
        loan_id: u64,
        borrower_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable handle the API uses to read the view and issue commands.
#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<Command>,
    view_rx: watch::Receiver<ChainView>,
}

impl SchedulerHandle {
    /// Latest published view.
    pub fn view(&self) -> ChainView {
        self.view_rx.borrow().clone()
    }

    pub async fn contribute(&self, member_id: String, amount: i128) -> Result<()> {
        self.send(|reply| Command::Contribute {
            member_id,
            amount,
            reply,
        })
        .await
    }

    pub async fn join(&self, member: JoinMember) -> Result<()> {
        self.send(|reply| Command::Join { member, reply }).await
    }

    pub async fn leave(&self, member_id: String) -> Result<()> {
        self.send(|reply| Command::Leave { member_id, reply }).await
    }

    pub async fn request_loan(
        &self,
        borrower_id: String,
        lender_id: Option<String>,
        amount: i128,
        due_date: DateTime<Utc>,
    ) -> Result<u64> {
        self.send(|reply| Command::RequestLoan {
            borrower_id,
            lender_id,
            amount,
            due_date,
            reply,
        })
        .await
    }

    pub async fn approve_loan(&self, loan_id: u64, lender_id: String) -> Result<()> {
        self.send(|reply| Command::ApproveLoan {
            loan_id,
            lender_id,
            reply,
        })
        .await
    }

    pub async fn repay_loan(&self, loan_id: u64, borrower_id: String) -> Result<()> {
        self.send(|reply| Command::RepayLoan {
            loan_id,
            borrower_id,
            reply,
        })
        .await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.send(|reply| Command::Refresh { reply }).await
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)?
    }
}

pub struct RotationScheduler {
    chain: Chain,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn ChainDirectory>,
    wallet: Arc<dyn WalletLedger>,
    pool: SqlitePool,
    tick_interval: Duration,
    cancel: CancellationToken,
    season_announced: bool,
    view_tx: watch::Sender<ChainView>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl RotationScheduler {
    pub fn new(
        mut chain: Chain,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn ChainDirectory>,
        wallet: Arc<dyn WalletLedger>,
        pool: SqlitePool,
        tick_interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, SchedulerHandle) {
        // The source of record may hold no round yet.
        chain.current_round = chain.current_round.max(1).min(chain.total_rounds.max(1));

        let (view_tx, view_rx) = watch::channel(derive_view(&chain, clock.now()));
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let scheduler = RotationScheduler {
            chain,
            clock,
            directory,
            wallet,
            pool,
            tick_interval,
            cancel,
            season_announced: false,
            view_tx,
            cmd_rx,
        };
        (scheduler, SchedulerHandle { cmd_tx, view_rx })
    }

    /// Drive the tick loop until cancellation.
    pub async fn run(mut self) {
        info!(
            "Scheduler starting — chain: {} ({} rounds)",
            self.chain.id, self.chain.total_rounds
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Scheduler stopping — chain: {}", self.chain.id);
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
            }
        }
    }

    /// One recomputation pass: round advance, loan expiry, view publication
    /// — strictly in that order.
    async fn tick(&mut self) {
        let now = self.clock.now();

        let derived = timemath::current_round_at(&self.chain, now);
        if derived > self.chain.current_round {
            let mut advanced = ledger::reset_round_contributions(&self.chain);
            advanced.current_round = derived;
            self.chain = advanced;
            info!(
                "Chain {} advanced to round {}/{}",
                self.chain.id, derived, self.chain.total_rounds
            );
            self.journal(
                RotationEvent::new(&self.chain.id, EventKind::RoundAdvanced, now).round(derived),
            )
            .await;
        }

        // Once the final boundary passes the scheduler keeps ticking for
        // display but stops advancing; the completion is journaled once.
        if !self.season_announced
            && self.chain.current_round == self.chain.total_rounds
            && timemath::remaining(timemath::season_end(&self.chain), now).is_elapsed()
        {
            self.season_announced = true;
            info!("Chain {} season complete", self.chain.id);
            self.journal(RotationEvent::new(
                &self.chain.id,
                EventKind::SeasonCompleted,
                now,
            ))
            .await;
        }

        let (updated, defaulted) = loans::expire_due_loans(&self.chain, now);
        self.chain = updated;
        for loan_id in defaulted {
            warn!("Loan {loan_id} in chain {} defaulted", self.chain.id);
            self.journal(
                RotationEvent::new(&self.chain.id, EventKind::LoanDefaulted, now).loan(loan_id),
            )
            .await;
            if let Err(e) = self
                .directory
                .update_loan_status(&self.chain.id, loan_id, LoanStatus::Defaulted)
                .await
            {
                warn!("Directory sync for defaulted loan {loan_id} failed: {e}");
            }
        }

        self.publish(now);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Contribute {
                member_id,
                amount,
                reply,
            } => {
                let result = self.do_contribute(&member_id, amount).await;
                let _ = reply.send(result);
            }
            Command::Join { member, reply } => {
                let result = self.do_join(member).await;
                let _ = reply.send(result);
            }
            Command::Leave { member_id, reply } => {
                let result = self.do_leave(&member_id).await;
                let _ = reply.send(result);
            }
            Command::RequestLoan {
                borrower_id,
                lender_id,
                amount,
                due_date,
                reply,
            } => {
                let result = self
                    .do_request_loan(&borrower_id, lender_id.as_deref(), amount, due_date)
                    .await;
                let _ = reply.send(result);
            }
            Command::ApproveLoan {
                loan_id,
                lender_id,
                reply,
            } => {
                let result = self.do_approve_loan(loan_id, &lender_id).await;
                let _ = reply.send(result);
            }
            Command::RepayLoan {
                loan_id,
                borrower_id,
                reply,
            } => {
                let result = self.do_repay_loan(loan_id, &borrower_id).await;
                let _ = reply.send(result);
            }
            Command::Refresh { reply } => {
                let result = self.do_refresh().await;
                let _ = reply.send(result);
            }
        }
    }

    /// Record a contribution: validate locally, transfer into the chain's
    /// pool account, then commit. The local record is sequenced strictly
    /// after the funding transfer succeeds.
    async fn do_contribute(&mut self, member_id: &str, amount: i128) -> Result<()> {
        let updated = ledger::record_contribution(&self.chain, member_id, amount)?;
        let member_wallet = self
            .chain
            .member(member_id)
            .map(|m| m.wallet.clone())
            .ok_or_else(|| {
                EngineError::InvalidContribution(format!(
                    "{member_id} is not a member of this chain"
                ))
            })?;

        let pool_account = self.wallet.account_id_of(&self.chain.id).await?;
        self.wallet
            .transfer(&member_wallet, &pool_account, amount)
            .await?;

        let round = updated.current_round;
        self.chain = updated;
        let now = self.clock.now();
        self.journal(
            RotationEvent::new(&self.chain.id, EventKind::ContributionRecorded, now)
                .member(member_id)
                .amount(amount)
                .round(round),
        )
        .await;
        self.publish(now);
        Ok(())
    }

    async fn do_join(&mut self, member: JoinMember) -> Result<()> {
        let vetting = if member.vetted {
            Vetting::Approved
        } else {
            Vetting::Unverified
        };
        let updated = membership::admit(
            &self.chain,
            &member.member_id,
            &member.name,
            &member.wallet,
            member.contribution_amount,
            member.is_lender,
            vetting,
        )?;

        let record = Member::new(
            member.member_id.clone(),
            member.name.clone(),
            member.wallet.clone(),
            member.contribution_amount,
            member.is_lender,
        );
        self.directory.add_member(&self.chain.id, &record).await?;

        self.chain = updated;
        let now = self.clock.now();
        self.journal(
            RotationEvent::new(&self.chain.id, EventKind::MemberJoined, now)
                .member(&member.member_id),
        )
        .await;
        self.publish(now);
        Ok(())
    }

    async fn do_leave(&mut self, member_id: &str) -> Result<()> {
        let updated = membership::remove_member(&self.chain, member_id)?;
        self.chain = updated;
        let now = self.clock.now();
        self.journal(
            RotationEvent::new(&self.chain.id, EventKind::MemberLeft, now).member(member_id),
        )
        .await;
        self.publish(now);
        Ok(())
    }

    async fn do_request_loan(
        &mut self,
        borrower_id: &str,
        lender_id: Option<&str>,
        amount: i128,
        due_date: DateTime<Utc>,
    ) -> Result<u64> {
        let (updated, loan_id) =
            loans::request_loan(&self.chain, borrower_id, lender_id, amount, due_date)?;
        self.chain = updated;
        let now = self.clock.now();
        self.journal(
            RotationEvent::new(&self.chain.id, EventKind::LoanRequested, now)
                .loan(loan_id)
                .member(borrower_id)
                .amount(amount),
        )
        .await;
        self.publish(now);
        Ok(loan_id)
    }

    /// Approve a loan: validate locally, query the lender's balance, apply
    /// the transition (which re-checks eligibility), transfer the
    /// principal, then commit.
    async fn do_approve_loan(&mut self, loan_id: u64, lender_id: &str) -> Result<()> {
        loans::validate_approval(&self.chain, loan_id, lender_id)?;
        let loan = self
            .chain
            .loan(loan_id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidLoan(format!("no loan with id {loan_id}")))?;
        let lender_wallet = self
            .chain
            .member(lender_id)
            .map(|m| m.wallet.clone())
            .ok_or_else(|| {
                EngineError::InvalidLoan(format!("lender {lender_id} is not a member"))
            })?;
        let borrower_wallet = self
            .chain
            .member(&loan.borrower_id)
            .map(|m| m.wallet.clone())
            .ok_or_else(|| {
                EngineError::InvalidLoan(format!(
                    "borrower {} is not a member",
                    loan.borrower_id
                ))
            })?;

        // Eligibility is a pass-through query; InsufficientFunds surfaces
        // before any transfer is attempted.
        let balance = self.wallet.balance_of(&lender_wallet).await?;
        let updated = loans::approve_loan(&self.chain, loan_id, lender_id, balance)?;

        self.wallet
            .transfer(&lender_wallet, &borrower_wallet, loan.amount)
            .await?;

        self.chain = updated;
        let now = self.clock.now();
        self.journal(
            RotationEvent::new(&self.chain.id, EventKind::LoanApproved, now)
                .loan(loan_id)
                .member(lender_id)
                .amount(loan.amount),
        )
        .await;
        self.sync_loan_status(loan_id, LoanStatus::Approved).await;
        self.publish(now);
        Ok(())
    }

    async fn do_repay_loan(&mut self, loan_id: u64, borrower_id: &str) -> Result<()> {
        let now = self.clock.now();
        let updated = loans::repay_loan(&self.chain, loan_id, borrower_id, now)?;
        let loan = self
            .chain
            .loan(loan_id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidLoan(format!("no loan with id {loan_id}")))?;
        let lender_id = loan.lender_id.clone().ok_or_else(|| {
            EngineError::InvalidState(format!("loan {loan_id} has no lender of record"))
        })?;
        let borrower_wallet = self
            .chain
            .member(borrower_id)
            .map(|m| m.wallet.clone())
            .ok_or_else(|| {
                EngineError::InvalidLoan(format!("borrower {borrower_id} is not a member"))
            })?;
        let lender_wallet = self
            .chain
            .member(&lender_id)
            .map(|m| m.wallet.clone())
            .ok_or_else(|| {
                EngineError::InvalidLoan(format!("lender {lender_id} is not a member"))
            })?;

        let amount = loans::repayment_amount(&loan);
        self.wallet
            .transfer(&borrower_wallet, &lender_wallet, amount)
            .await?;

        self.chain = updated;
        self.journal(
            RotationEvent::new(&self.chain.id, EventKind::LoanRepaid, now)
                .loan(loan_id)
                .member(borrower_id)
                .amount(amount),
        )
        .await;
        self.sync_loan_status(loan_id, LoanStatus::Repaid).await;
        self.publish(now);
        Ok(())
    }

    /// Replace the snapshot from the source of record.
    async fn do_refresh(&mut self) -> Result<()> {
        let mut fresh = self.directory.get_chain(&self.chain.id).await?;
        fresh.current_round = fresh.current_round.max(1).min(fresh.total_rounds.max(1));
        self.chain = fresh;
        self.publish(self.clock.now());
        Ok(())
    }

    /// Push a status change to the directory. Best-effort once the funds
    /// have already moved: the local transition must stand, and the
    /// directory reconverges on the next refresh.
    async fn sync_loan_status(&self, loan_id: u64, status: LoanStatus) {
        if let Err(e) = self
            .directory
            .update_loan_status(&self.chain.id, loan_id, status)
            .await
        {
            warn!("Directory sync for loan {loan_id} ({status:?}) failed: {e}");
        }
    }

    async fn journal(&self, event: RotationEvent) {
        if let Err(e) = db::insert_event(&self.pool, &event).await {
            error!("Journal write failed: {e}");
        }
    }

    fn publish(&self, now: DateTime<Utc>) {
        let _ = self.view_tx.send(derive_view(&self.chain, now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rotation_engine::{ChainKind, ChainParams, Loan};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Self {
            ManualClock {
                now: Mutex::new(start),
            }
        }

        fn advance(&self, delta: ChronoDuration) {
            let mut now = self.now.lock().unwrap();
            *now += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct FakeDirectory {
        chain: Mutex<Option<Chain>>,
        status_updates: Mutex<Vec<(u64, LoanStatus)>>,
        added_members: Mutex<Vec<Member>>,
    }

    #[async_trait]
    impl ChainDirectory for FakeDirectory {
        async fn get_chain(&self, _id: &str) -> Result<Chain> {
            self.chain
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SchedulerError::ExternalCall("no chain".to_string()))
        }

        async fn create_chain(&self, params: &ChainParams) -> Result<String> {
            Ok(params.id.clone())
        }

        async fn get_all_chains(&self) -> Result<Vec<Chain>> {
            Ok(self.chain.lock().unwrap().clone().into_iter().collect())
        }

        async fn add_member(&self, _chain_id: &str, member: &Member) -> Result<()> {
            self.added_members.lock().unwrap().push(member.clone());
            Ok(())
        }

        async fn get_member_loans(&self, _user_id: &str, _chain_id: &str) -> Result<Vec<Loan>> {
            Ok(Vec::new())
        }

        async fn update_loan_status(
            &self,
            _chain_id: &str,
            loan_id: u64,
            status: LoanStatus,
        ) -> Result<()> {
            self.status_updates.lock().unwrap().push((loan_id, status));
            Ok(())
        }
    }

    struct FakeWallet {
        balance: Mutex<i128>,
        fail_transfers: AtomicBool,
        transfers: Mutex<Vec<(String, String, i128)>>,
    }

    impl FakeWallet {
        fn with_balance(balance: i128) -> Self {
            FakeWallet {
                balance: Mutex::new(balance),
                fail_transfers: AtomicBool::new(false),
                transfers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WalletLedger for FakeWallet {
        async fn balance_of(&self, _account: &str) -> Result<i128> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn transfer(&self, from: &str, to: &str, amount: i128) -> Result<()> {
            if self.fail_transfers.load(Ordering::SeqCst) {
                return Err(SchedulerError::ExternalCall(
                    "transfer rejected".to_string(),
                ));
            }
            self.transfers
                .lock()
                .unwrap()
                .push((from.to_string(), to.to_string(), amount));
            Ok(())
        }

        async fn account_id_of(&self, principal: &str) -> Result<String> {
            Ok(format!("acct-{principal}"))
        }
    }

    fn start_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_chain() -> Chain {
        let mut chain = Chain::new(ChainParams {
            id: "chain-1".to_string(),
            name: "Weekly five".to_string(),
            start_date: start_date(),
            round_duration_secs: 604_800,
            total_rounds: 5,
            currency: "ICP".to_string(),
            total_funds: 5_000,
            interest_rate: 5.0,
            fine_rate: 2.0,
            kind: ChainKind::Social,
        })
        .unwrap();
        chain
            .members
            .push(Member::new("alice", "Alice", "wallet-a", 1_000, true));
        chain
            .members
            .push(Member::new("bob", "Bob", "wallet-b", 1_000, false));
        chain
    }

    struct Fixture {
        scheduler: RotationScheduler,
        handle: SchedulerHandle,
        clock: Arc<ManualClock>,
        directory: Arc<FakeDirectory>,
        wallet: Arc<FakeWallet>,
        pool: SqlitePool,
    }

    async fn fixture(chain: Chain, balance: i128) -> Fixture {
        let clock = Arc::new(ManualClock::new(start_date()));
        let directory = Arc::new(FakeDirectory::default());
        let wallet = Arc::new(FakeWallet::with_balance(balance));
        let pool = db::memory_pool().await;
        let (scheduler, handle) = RotationScheduler::new(
            chain,
            clock.clone(),
            directory.clone(),
            wallet.clone(),
            pool.clone(),
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        Fixture {
            scheduler,
            handle,
            clock,
            directory,
            wallet,
            pool,
        }
    }

    #[tokio::test]
    async fn tick_advances_round_and_resets_flags() {
        let mut fx = fixture(test_chain(), 10_000).await;
        fx.scheduler.do_contribute("alice", 1_000).await.unwrap();
        assert_eq!(fx.handle.view().contributed_count, 1);

        // Nine days in: round 2.
        fx.clock.advance(ChronoDuration::days(9));
        fx.scheduler.tick().await;

        let view = fx.handle.view();
        assert_eq!(view.current_round, 2);
        assert_eq!(view.contributed_count, 0);
        assert_eq!(view.current_funds, 1_000);

        let events = db::get_events_for_chain(&fx.pool, "chain-1").await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(kinds.contains(&"round_advanced"));
    }

    #[tokio::test]
    async fn tick_does_not_advance_twice_for_one_boundary() {
        let mut fx = fixture(test_chain(), 0).await;
        fx.clock.advance(ChronoDuration::days(9));
        fx.scheduler.tick().await;
        fx.scheduler.tick().await;

        let events = db::get_events_for_chain(&fx.pool, "chain-1").await.unwrap();
        let advances = events
            .iter()
            .filter(|e| e.event_type == "round_advanced")
            .count();
        assert_eq!(advances, 1);
        assert_eq!(fx.handle.view().current_round, 2);
    }

    #[tokio::test]
    async fn tick_defaults_overdue_approved_loan() {
        let mut fx = fixture(test_chain(), 1_000).await;
        let due = start_date() + ChronoDuration::days(3);
        let loan_id = fx
            .scheduler
            .do_request_loan("bob", Some("alice"), 500, due)
            .await
            .unwrap();
        fx.scheduler.do_approve_loan(loan_id, "alice").await.unwrap();

        fx.clock.advance(ChronoDuration::days(4));
        fx.scheduler.tick().await;

        let view = fx.handle.view();
        let loan = view.loans.iter().find(|l| l.id == loan_id).unwrap();
        assert_eq!(loan.status, LoanStatus::Defaulted);
        assert!(fx
            .directory
            .status_updates
            .lock()
            .unwrap()
            .contains(&(loan_id, LoanStatus::Defaulted)));

        let events = db::get_events_for_chain(&fx.pool, "chain-1").await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "loan_defaulted"));
    }

    #[tokio::test]
    async fn approve_with_insufficient_balance_moves_no_funds() {
        let mut fx = fixture(test_chain(), 400).await;
        let due = start_date() + ChronoDuration::days(14);
        let loan_id = fx
            .scheduler
            .do_request_loan("bob", Some("alice"), 500, due)
            .await
            .unwrap();

        let err = fx.scheduler.do_approve_loan(loan_id, "alice").await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Engine(EngineError::InsufficientFunds {
                balance: 400,
                amount: 500
            })
        ));
        assert!(fx.wallet.transfers.lock().unwrap().is_empty());
        let view = fx.handle.view();
        assert_eq!(
            view.loans.iter().find(|l| l.id == loan_id).unwrap().status,
            LoanStatus::Pending
        );
    }

    #[tokio::test]
    async fn approve_with_sufficient_balance_transfers_principal() {
        let mut fx = fixture(test_chain(), 600).await;
        let due = start_date() + ChronoDuration::days(14);
        let loan_id = fx
            .scheduler
            .do_request_loan("bob", Some("alice"), 500, due)
            .await
            .unwrap();
        fx.scheduler.do_approve_loan(loan_id, "alice").await.unwrap();

        let transfers = fx.wallet.transfers.lock().unwrap().clone();
        assert_eq!(
            transfers,
            vec![("wallet-a".to_string(), "wallet-b".to_string(), 500)]
        );
        assert_eq!(
            fx.handle
                .view()
                .loans
                .iter()
                .find(|l| l.id == loan_id)
                .unwrap()
                .status,
            LoanStatus::Approved
        );
    }

    #[tokio::test]
    async fn repay_transfers_principal_plus_interest() {
        let mut fx = fixture(test_chain(), 600).await;
        let due = start_date() + ChronoDuration::days(14);
        let loan_id = fx
            .scheduler
            .do_request_loan("bob", Some("alice"), 500, due)
            .await
            .unwrap();
        fx.scheduler.do_approve_loan(loan_id, "alice").await.unwrap();
        fx.scheduler.do_repay_loan(loan_id, "bob").await.unwrap();

        let transfers = fx.wallet.transfers.lock().unwrap().clone();
        // 500 principal out, 525 back at 5%.
        assert_eq!(transfers[1], ("wallet-b".to_string(), "wallet-a".to_string(), 525));
        let view = fx.handle.view();
        let loan = view.loans.iter().find(|l| l.id == loan_id).unwrap();
        assert_eq!(loan.status, LoanStatus::Repaid);
        assert!(loan.repayment_date.is_some());
    }

    #[tokio::test]
    async fn failed_transfer_leaves_snapshot_unchanged() {
        let mut fx = fixture(test_chain(), 10_000).await;
        fx.wallet.fail_transfers.store(true, Ordering::SeqCst);

        let err = fx.scheduler.do_contribute("alice", 1_000).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ExternalCall(_)));

        let view = fx.handle.view();
        assert_eq!(view.current_funds, 0);
        assert_eq!(view.contributed_count, 0);
        let events = db::get_events_for_chain(&fx.pool, "chain-1").await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn contribution_transfer_is_sequenced_before_commit() {
        let mut fx = fixture(test_chain(), 10_000).await;
        fx.scheduler.do_contribute("alice", 1_000).await.unwrap();

        let transfers = fx.wallet.transfers.lock().unwrap().clone();
        assert_eq!(
            transfers,
            vec![(
                "wallet-a".to_string(),
                "acct-chain-1".to_string(),
                1_000
            )]
        );
        assert_eq!(fx.handle.view().current_funds, 1_000);

        // Second contribution in the same round is rejected locally, before
        // any further transfer.
        let err = fx.scheduler.do_contribute("alice", 1_000).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Engine(EngineError::InvalidContribution(_))
        ));
        assert_eq!(fx.wallet.transfers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_admits_and_reaches_directory() {
        let mut fx = fixture(test_chain(), 0).await;
        fx.scheduler
            .do_join(JoinMember {
                member_id: "carol".to_string(),
                name: "Carol".to_string(),
                wallet: "wallet-c".to_string(),
                contribution_amount: 1_000,
                is_lender: false,
                vetted: false,
            })
            .await
            .unwrap();

        assert_eq!(fx.handle.view().member_count, 3);
        assert_eq!(fx.directory.added_members.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn season_completion_journals_once_and_stops_advancing() {
        let mut fx = fixture(test_chain(), 0).await;
        // Far past the 35-day season.
        fx.clock.advance(ChronoDuration::days(40));
        fx.scheduler.tick().await;
        fx.scheduler.tick().await;

        let view = fx.handle.view();
        assert_eq!(view.current_round, 5);
        assert!(view.season_complete);
        assert!(view.round_remaining.is_elapsed());

        let events = db::get_events_for_chain(&fx.pool, "chain-1").await.unwrap();
        let completions = events
            .iter()
            .filter(|e| e.event_type == "season_completed")
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_and_commands_fail() {
        let fx = fixture(test_chain(), 0).await;
        let cancel = fx.scheduler.cancel.clone();
        let handle = fx.handle.clone();

        let task = tokio::spawn(fx.scheduler.run());
        cancel.cancel();
        task.await.unwrap();

        let err = handle.contribute("alice".to_string(), 1_000).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Stopped));
    }
}
