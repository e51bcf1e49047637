//! Postgres-backed store.
//!
//! One transaction per [`ChangeSet`]. Touched streams and outward-moving keys
//! are serialised with transaction-scoped advisory locks taken in sorted
//! order, so version checks, balance reads and appends form one critical
//! section per stream and per key.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (check violation) | `23514` | `InvalidAppend` |
//! | Database (other) | any | `InvalidAppend` |
//! | PoolClosed / PoolTimedOut / Io / Tls | n/a | `Unavailable` |
//! | Other | n/a | `InvalidAppend` |

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, instrument};
use uuid::Uuid;

use tradeledger_core::{AggregateId, ExpectedVersion};
use tradeledger_inventory::{Direction, LedgerEntry, LedgerFilter, StockKey};

use super::r#trait::{
    ChangeSet, CommitReceipt, EventStore, LedgerStore, SequenceStore, StoreError, StoredEvent,
    StreamAppend, UncommittedEvent, UnitOfWork, single_stream,
};

/// Schema applied by [`PostgresStore::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_ledger_schema.sql");

/// Postgres-backed store: events, ledger entries and sequence counters.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(stored_event_from_row).collect()
    }

    #[instrument(
        skip(self, changes),
        fields(streams = changes.streams.len(), entries = changes.ledger.len()),
        err
    )]
    pub async fn commit_async(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        changes.validate()?;
        if changes.is_empty() {
            return Ok(CommitReceipt::default());
        }
        let movements = changes.net_movements()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Streams, then touched keys, each in sorted order: a stable lock order.
        let mut stream_ids: Vec<_> = changes.streams.iter().map(|s| s.aggregate_id).collect();
        stream_ids.sort();
        for aggregate_id in stream_ids {
            lock_stream(&mut tx, aggregate_id).await?;
        }
        for (key, net) in movements {
            lock_key(&mut tx, &key).await?;
            let available = balance_in(&mut *tx, &key).await?;
            let checked = changes.balance_after(available, &key).and_then(|after| {
                if net < Decimal::ZERO && after < Decimal::ZERO {
                    Err(StoreError::InsufficientStock {
                        key,
                        available,
                        requested: -net,
                    })
                } else {
                    Ok(())
                }
            });
            if let Err(err) = checked {
                rollback(tx).await?;
                return Err(err);
            }
        }

        let mut receipt = CommitReceipt::default();
        for append in changes.streams {
            match append_stream(&mut tx, append).await {
                Ok(stored) => receipt.events.extend(stored),
                Err(err) => {
                    rollback(tx).await?;
                    return Err(err);
                }
            }
        }

        let now = Utc::now();
        for entry in changes.ledger {
            let entry_id = Uuid::now_v7();
            let row = sqlx::query(
                r#"
                INSERT INTO ledger_entries
                    (entry_id, key_scheme, key_code, direction, quantity, reference, note, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING sequence
                "#,
            )
            .bind(entry_id)
            .bind(entry.key.scheme())
            .bind(entry.key.code())
            .bind(entry.direction.as_str())
            .bind(entry.quantity)
            .bind(&entry.reference)
            .bind(&entry.note)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_ledger_entry", e))?;
            let sequence: i64 = row
                .try_get("sequence")
                .map_err(|e| map_sqlx_error("insert_ledger_entry", e))?;
            receipt.entries.push(entry.commit(entry_id, sequence as u64, now));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(
            events = receipt.events.len(),
            entries = receipt.entries.len(),
            "change set committed"
        );
        Ok(receipt)
    }

    pub async fn balance_async(&self, key: &StockKey) -> Result<Decimal, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        balance_in(&mut *conn, key).await
    }

    pub async fn list_entries_async(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, entry_id, key_scheme, key_code, direction, quantity,
                   reference, note, created_at
            FROM ledger_entries
            WHERE ($1::TEXT IS NULL OR (key_scheme = $1 AND key_code = $2))
              AND ($3::TEXT IS NULL OR direction = $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at >= $4)
              AND ($5::TIMESTAMPTZ IS NULL OR created_at <= $5)
            ORDER BY sequence ASC
            "#,
        )
        .bind(filter.key.as_ref().map(StockKey::scheme))
        .bind(filter.key.as_ref().map(|k| k.code().to_string()))
        .bind(filter.direction.map(Direction::as_str))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entries", e))?;

        rows.iter().map(ledger_entry_from_row).collect()
    }

    pub async fn next_sequence_async(&self, scope: &str) -> Result<u32, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequences (scope, last_value) VALUES ($1, 1)
            ON CONFLICT (scope) DO UPDATE SET last_value = sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(scope)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_sequence", e))?;
        let value: i32 = row
            .try_get("last_value")
            .map_err(|e| map_sqlx_error("next_sequence", e))?;
        Ok(value as u32)
    }

    /// Run an async store call from the synchronous store traits.
    ///
    /// Needs a multi-threaded tokio runtime: the current worker is handed
    /// over to the blocking call with `block_in_place`.
    fn block_on<F: Future>(&self, fut: F) -> Result<F::Output, StoreError> {
        let handle = Handle::try_current().map_err(|_| {
            StoreError::Unavailable("PostgresStore requires a tokio runtime".to_string())
        })?;
        if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(StoreError::Unavailable(
                "PostgresStore requires a multi-threaded tokio runtime".to_string(),
            ));
        }
        Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
    }
}

impl UnitOfWork for PostgresStore {
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        self.block_on(self.commit_async(changes))?
    }
}

impl EventStore for PostgresStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        match single_stream(events, expected_version) {
            Some(changes) => Ok(self.commit(changes)?.events),
            None => Ok(vec![]),
        }
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, StoreError> {
        self.block_on(self.load_stream_async(aggregate_id))?
    }
}

impl LedgerStore for PostgresStore {
    fn balance(&self, key: &StockKey) -> Result<Decimal, StoreError> {
        self.block_on(self.balance_async(key))?
    }

    fn list_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        self.block_on(self.list_entries_async(filter))?
    }
}

impl SequenceStore for PostgresStore {
    fn next_sequence(&self, scope: &str) -> Result<u32, StoreError> {
        self.block_on(self.next_sequence_async(scope))?
    }
}

async fn lock_key(tx: &mut Transaction<'_, Postgres>, key: &StockKey) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_key", e))?;
    Ok(())
}

async fn lock_stream(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("stream:{aggregate_id}"))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stream", e))?;
    Ok(())
}

async fn balance_in(
    conn: &mut sqlx::PgConnection,
    key: &StockKey,
) -> Result<Decimal, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(CASE WHEN direction = 'IN' THEN quantity ELSE -quantity END), 0)::NUMERIC
            AS balance
        FROM ledger_entries
        WHERE key_scheme = $1 AND key_code = $2
        "#,
    )
    .bind(key.scheme())
    .bind(key.code())
    .fetch_one(conn)
    .await
    .map_err(|e| map_sqlx_error("balance", e))?;

    row.try_get("balance")
        .map_err(|e| map_sqlx_error("balance", e))
}

async fn append_stream(
    tx: &mut Transaction<'_, Postgres>,
    append: StreamAppend,
) -> Result<Vec<StoredEvent>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence_number), 0) AS current_version,
               MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = $1
        "#,
    )
    .bind(append.aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;
    let existing_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;
    let current = current as u64;

    if !append.expected.matches(current) {
        return Err(StoreError::Concurrency(format!(
            "stream {}: expected {:?}, found {current}",
            append.aggregate_id, append.expected
        )));
    }
    // A guard: the version check is all it contributes.
    let Some(first) = append.events.first() else {
        return Ok(vec![]);
    };
    if let Some(existing) = existing_type {
        if existing != first.aggregate_type {
            return Err(StoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{existing}', attempted append with '{}'",
                first.aggregate_type
            )));
        }
    }

    let mut next = current + 1;
    let mut stored = Vec::with_capacity(append.events.len());
    for event in append.events {
        sqlx::query(
            r#"
            INSERT INTO events (
                event_id, aggregate_id, aggregate_type, sequence_number,
                event_type, event_version, occurred_at, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id)
        .bind(event.aggregate_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(next as i64)
        .bind(&event.event_type)
        .bind(event.event_version as i32)
        .bind(event.occurred_at)
        .bind(&event.payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_event", e))?;

        stored.push(StoredEvent {
            event_id: event.event_id,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type,
            sequence_number: next,
            event_type: event.event_type,
            event_version: event.event_version,
            occurred_at: event.occurred_at,
            payload: event.payload,
        });
        next += 1;
    }
    Ok(stored)
}

async fn rollback(tx: Transaction<'_, Postgres>) -> Result<(), StoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))
}

fn stored_event_from_row(row: &PgRow) -> Result<StoredEvent, StoreError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_event", e);
    let aggregate_id: Uuid = row.try_get("aggregate_id").map_err(read)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}

fn ledger_entry_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_ledger_entry", e);
    let scheme: String = row.try_get("key_scheme").map_err(read)?;
    let code: String = row.try_get("key_code").map_err(read)?;
    let direction: String = row.try_get("direction").map_err(read)?;
    let sequence: i64 = row.try_get("sequence").map_err(read)?;

    Ok(LedgerEntry {
        entry_id: row.try_get("entry_id").map_err(read)?,
        sequence: sequence as u64,
        key: StockKey::from_parts(&scheme, &code)
            .map_err(|e| StoreError::InvalidAppend(e.to_string()))?,
        direction: Direction::parse(&direction)
            .map_err(|e| StoreError::InvalidAppend(e.to_string()))?,
        quantity: row.try_get("quantity").map_err(read)?,
        reference: row.try_get("reference").map_err(read)?,
        note: row.try_get("note").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            map_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        other => StoreError::InvalidAppend(format!("sqlx error in {operation}: {other}")),
    }
}

/// Unique violations, serialization failures and deadlocks all mean another
/// writer got there first; the caller may reload and retry.
fn map_sqlstate(code: Option<&str>, msg: String) -> StoreError {
    match code {
        Some("23505" | "40001" | "40P01") => StoreError::Concurrency(msg),
        _ => StoreError::InvalidAppend(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::{EngineError, ErrorKind};

    #[test]
    fn retryable_sqlstates_are_concurrency_conflicts() {
        for code in ["23505", "40001", "40P01"] {
            let err = map_sqlstate(Some(code), format!("state {code}"));
            assert!(matches!(err, StoreError::Concurrency(_)), "{code}");
            assert_eq!(EngineError::from(err).kind(), ErrorKind::Conflict);
        }
    }

    #[test]
    fn other_sqlstates_stay_storage_failures() {
        for code in [Some("23503"), Some("42P01"), None] {
            let err = map_sqlstate(code, "boom".to_string());
            assert!(matches!(err, StoreError::InvalidAppend(_)));
            assert_eq!(EngineError::from(err).kind(), ErrorKind::Storage);
        }
    }
}
