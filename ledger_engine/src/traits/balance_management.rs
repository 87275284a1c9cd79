use crate::{
    db_types::{NewReward, Reward},
    traits::{data_objects::BalanceEntry, LedgerError},
};

/// Read access to everything that contributes to a user's balance.
#[allow(async_fn_in_trait)]
pub trait BalanceManagement {
    /// Every ledger row that contributes to the user's balance, one entry per contribution:
    /// * completed payments where the user is the seller (gross amount, and the recorded fee as a separate debit),
    /// * rewards,
    /// * completed deposits,
    /// * withdrawals that are `complete`, `pending` or `delayed`,
    /// * completed balance-funded payments where the user is the buyer.
    ///
    /// All entries are read in a single statement so that they describe one consistent snapshot of the ledger.
    async fn fetch_balance_entries(&self, user_id: i64) -> Result<Vec<BalanceEntry>, LedgerError>;

    async fn insert_reward(&self, reward: NewReward) -> Result<Reward, LedgerError>;

    async fn fetch_rewards(&self, user_id: i64) -> Result<Vec<Reward>, LedgerError>;
}
