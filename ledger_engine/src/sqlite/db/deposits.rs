use chrono::Utc;
use ledger_common::Usd;
use log::{debug, trace};
use serde_json::Value;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Deposit, DepositStatus, DepositType, NewDeposit},
    helpers::merge_metadata,
    traits::{CompleteDepositResult, DepositQueryFilter, LedgerError},
};

pub async fn insert_deposit(deposit: NewDeposit, conn: &mut SqliteConnection) -> Result<Deposit, sqlx::Error> {
    let deposit: Deposit = sqlx::query_as(
        r#"
            INSERT INTO deposit (
                user_id,
                amount,
                currency,
                type,
                external_id,
                status,
                created_at,
                updated_at,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(deposit.user_id)
    .bind(deposit.amount.to_string())
    .bind(deposit.currency)
    .bind(deposit.deposit_type)
    .bind(deposit.external_id)
    .bind(DepositStatus::Pending)
    .bind(deposit.created_at)
    .bind(Json(deposit.metadata))
    .fetch_one(conn)
    .await?;
    debug!("🗃️ {} deposit #{} for user {} inserted", deposit.deposit_type, deposit.id, deposit.user_id);
    Ok(deposit)
}

pub async fn fetch_deposit(id: i64, conn: &mut SqliteConnection) -> Result<Option<Deposit>, sqlx::Error> {
    let deposit = sqlx::query_as("SELECT * FROM deposit WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(deposit)
}

pub async fn fetch_pending_deposits(
    deposit_type: DepositType,
    conn: &mut SqliteConnection,
) -> Result<Vec<Deposit>, sqlx::Error> {
    let deposits =
        sqlx::query_as("SELECT * FROM deposit WHERE status = $1 AND type = $2 ORDER BY created_at ASC, id ASC")
            .bind(DepositStatus::Pending)
            .bind(deposit_type)
            .fetch_all(conn)
            .await?;
    Ok(deposits)
}

/// Fetches deposits according to criteria specified in the `DepositQueryFilter`, oldest first.
pub async fn search_deposits(
    query: DepositQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Deposit>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM deposit ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(deposit_type) = query.deposit_type {
        where_clause.push("type = ");
        where_clause.push_bind_unseparated(deposit_type);
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
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let deposits = builder.build_query_as::<Deposit>().fetch_all(conn).await?;
    Ok(deposits)
}

/// Returns the id of a deposit other than `exclude_id` that already carries `tx_hash`, if there is one.
pub async fn deposit_with_tx_hash(
    tx_hash: &str,
    exclude_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, sqlx::Error> {
    let id = sqlx::query_scalar("SELECT id FROM deposit WHERE tx_hash = $1 AND id != $2 LIMIT 1")
        .bind(tx_hash)
        .bind(exclude_id)
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

/// Merges `patch` into the metadata of a pending deposit. Returns `None` if the deposit has already left `pending`.
pub async fn update_pending_deposit(
    id: i64,
    external_id: Option<&str>,
    patch: Value,
    conn: &mut SqliteConnection,
) -> Result<Option<Deposit>, LedgerError> {
    let deposit = fetch_deposit(id, &mut *conn).await?.ok_or(LedgerError::DepositNotFound(id))?;
    if deposit.status != DepositStatus::Pending {
        trace!("🗃️ Deposit #{id} is already {}", deposit.status);
        return Ok(None);
    }
    let metadata = merge_metadata(&deposit.metadata.0, &patch);
    let updated = sqlx::query_as(
        r#"
        UPDATE deposit SET external_id = COALESCE($1, external_id), metadata = $2, updated_at = $3
        WHERE id = $4 AND status = $5
        RETURNING *;
        "#,
    )
    .bind(external_id)
    .bind(Json(metadata))
    .bind(Utc::now())
    .bind(id)
    .bind(DepositStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Completes a pending deposit. If `tx_hash` is already attached to a different deposit, nothing is written and
/// `DuplicateTxHash` is returned.
///
/// This is not atomic on its own. Call it with a transaction.
pub async fn complete_deposit(
    id: i64,
    amount: Usd,
    tx_hash: Option<&str>,
    patch: Value,
    conn: &mut SqliteConnection,
) -> Result<CompleteDepositResult, LedgerError> {
    let deposit = fetch_deposit(id, &mut *conn).await?.ok_or(LedgerError::DepositNotFound(id))?;
    if deposit.status != DepositStatus::Pending {
        return Ok(CompleteDepositResult::NotPending(deposit));
    }
    if let Some(hash) = tx_hash {
        if let Some(other_deposit_id) = deposit_with_tx_hash(hash, id, &mut *conn).await? {
            debug!("🗃️ Transaction {hash} is already credited to deposit #{other_deposit_id}");
            return Ok(CompleteDepositResult::DuplicateTxHash { other_deposit_id });
        }
    }
    let metadata = merge_metadata(&deposit.metadata.0, &patch);
    let updated: Option<Deposit> = sqlx::query_as(
        r#"
        UPDATE deposit
        SET status = $1, amount = $2, tx_hash = COALESCE($3, tx_hash), external_id = COALESCE($3, external_id),
            metadata = $4, updated_at = $5
        WHERE id = $6 AND status = $7
        RETURNING *;
        "#,
    )
    .bind(DepositStatus::Complete)
    .bind(amount.to_string())
    .bind(tx_hash)
    .bind(Json(metadata))
    .bind(Utc::now())
    .bind(id)
    .bind(DepositStatus::Pending)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(d) => {
            debug!("🗃️ Deposit #{id} completed for {amount}");
            Ok(CompleteDepositResult::Completed(d))
        },
        None => {
            let current = fetch_deposit(id, conn).await?.ok_or(LedgerError::DepositNotFound(id))?;
            Ok(CompleteDepositResult::NotPending(current))
        },
    }
}

/// Marks a pending deposit failed, merging `patch` into its metadata. Returns `None` if it is no longer pending.
pub async fn fail_deposit(id: i64, patch: Value, conn: &mut SqliteConnection) -> Result<Option<Deposit>, LedgerError> {
    let deposit = fetch_deposit(id, &mut *conn).await?.ok_or(LedgerError::DepositNotFound(id))?;
    if deposit.status != DepositStatus::Pending {
        trace!("🗃️ Deposit #{id} is already {}", deposit.status);
        return Ok(None);
    }
    let metadata = merge_metadata(&deposit.metadata.0, &patch);
    let updated = sqlx::query_as(
        r#"
        UPDATE deposit SET status = $1, metadata = $2, updated_at = $3
        WHERE id = $4 AND status = $5
        RETURNING *;
        "#,
    )
    .bind(DepositStatus::Failed)
    .bind(Json(metadata))
    .bind(Utc::now())
    .bind(id)
    .bind(DepositStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}
