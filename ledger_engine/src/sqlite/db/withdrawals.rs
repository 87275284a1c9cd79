use chrono::Utc;
use log::{debug, trace};
use serde_json::Value;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewWithdrawal, Withdrawal, WithdrawalStatus},
    helpers::merge_metadata,
    traits::{LedgerError, TransitionResult, WithdrawalQueryFilter},
};

pub async fn insert_withdrawal(
    withdrawal: NewWithdrawal,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, sqlx::Error> {
    let withdrawal: Withdrawal = sqlx::query_as(
        r#"
            INSERT INTO withdrawal (
                user_id,
                amount,
                fee,
                currency,
                type,
                status,
                created_at,
                updated_at,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(withdrawal.user_id)
    .bind(withdrawal.amount.to_string())
    .bind(withdrawal.fee.to_string())
    .bind(withdrawal.currency)
    .bind(withdrawal.withdrawal_type)
    .bind(WithdrawalStatus::Pending)
    .bind(withdrawal.created_at)
    .bind(Json(withdrawal.metadata))
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Withdrawal #{} of {} for user {} inserted", withdrawal.id, withdrawal.amount, withdrawal.user_id);
    Ok(withdrawal)
}

pub async fn fetch_withdrawal(id: i64, conn: &mut SqliteConnection) -> Result<Option<Withdrawal>, sqlx::Error> {
    let withdrawal = sqlx::query_as("SELECT * FROM withdrawal WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(withdrawal)
}

/// Oldest first, by creation time and then by id.
pub async fn fetch_oldest_withdrawal(
    status: WithdrawalStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    let withdrawal =
        sqlx::query_as("SELECT * FROM withdrawal WHERE status = $1 ORDER BY created_at ASC, id ASC LIMIT 1")
            .bind(status)
            .fetch_optional(conn)
            .await?;
    Ok(withdrawal)
}

/// Fetches withdrawals according to criteria specified in the `WithdrawalQueryFilter`
///
/// Resulting withdrawals are ordered by `created_at` in ascending order
pub async fn search_withdrawals(
    query: WithdrawalQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM withdrawal ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if !query.statuses.is_empty() {
        where_clause.push("status IN (");
        for (i, status) in query.statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let withdrawals = builder.build_query_as::<Withdrawal>().fetch_all(conn).await?;
    Ok(withdrawals)
}

/// Moves the withdrawal from `from` to `to`, but only if it is still in `from`.
///
/// The legality check, the read of the current metadata and the conditional update all use the same connection, so
/// call this inside a transaction to make the metadata merge atomic.
pub async fn transition_withdrawal(
    id: i64,
    from: WithdrawalStatus,
    to: WithdrawalStatus,
    external_id: Option<&str>,
    patch: Value,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult, LedgerError> {
    if !from.can_transition_to(to) {
        return Err(LedgerError::IllegalTransition { from, to });
    }
    let current = fetch_withdrawal(id, &mut *conn).await?.ok_or(LedgerError::WithdrawalNotFound(id))?;
    if current.status != from {
        debug!("🗃️ Withdrawal #{id} is {}, not {from}. Leaving it alone.", current.status);
        return Ok(TransitionResult::Conflict(current.status));
    }
    let metadata = merge_metadata(&current.metadata.0, &patch);
    let updated: Option<Withdrawal> = sqlx::query_as(
        r#"
        UPDATE withdrawal
        SET status = $1, external_id = COALESCE($2, external_id), metadata = $3, updated_at = $4
        WHERE id = $5 AND status = $6
        RETURNING *;
        "#,
    )
    .bind(to)
    .bind(external_id)
    .bind(Json(metadata))
    .bind(Utc::now())
    .bind(id)
    .bind(from)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(withdrawal) => {
            debug!("🗃️ Withdrawal #{id} moved from {from} to {to}");
            Ok(TransitionResult::Applied(withdrawal))
        },
        None => {
            let status = fetch_withdrawal(id, conn).await?.map(|w| w.status).unwrap_or(current.status);
            Ok(TransitionResult::Conflict(status))
        },
    }
}
