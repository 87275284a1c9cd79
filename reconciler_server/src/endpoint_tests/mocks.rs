use ledger_engine::{
    db_types::{NewReward, Reward},
    traits::{BalanceEntry, BalanceManagement, LedgerError},
};
use mockall::mock;

mock! {
    pub BalanceManager {}
    impl BalanceManagement for BalanceManager {
        async fn fetch_balance_entries(&self, user_id: i64) -> Result<Vec<BalanceEntry>, LedgerError>;
        async fn insert_reward(&self, reward: NewReward) -> Result<Reward, LedgerError>;
        async fn fetch_rewards(&self, user_id: i64) -> Result<Vec<Reward>, LedgerError>;
    }
}
