use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewReward, Reward};

pub async fn insert_reward(reward: NewReward, conn: &mut SqliteConnection) -> Result<Reward, sqlx::Error> {
    let reward: Reward = sqlx::query_as(
        r#"
            INSERT INTO rewards (user_id, amount, currency, reason, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(reward.user_id)
    .bind(reward.amount.to_string())
    .bind(reward.currency)
    .bind(reward.reason)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Reward #{} of {} granted to user {}", reward.id, reward.amount, reward.user_id);
    Ok(reward)
}

pub async fn fetch_rewards(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Reward>, sqlx::Error> {
    let rewards = sqlx::query_as("SELECT * FROM rewards WHERE user_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(rewards)
}
