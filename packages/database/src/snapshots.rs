//! Append-only metric snapshot table.
//!
//! `captured_at` is stored as epoch milliseconds, so anything finer is
//! truncated on write. Rows sharing a timestamp are ordered by insertion.

use std::path::Path;

use chrono::{DateTime, Utc};
use cityscope_models::{MetricSnapshot, NeighborhoodId};
use duckdb::Connection;

use crate::DbError;

const SNAPSHOT_COLUMNS: &str =
    "neighborhood_id, avg_rent, transit_count, mall_count, score, captured_at";

/// Opens (or creates) the snapshot database at `path`.
///
/// # Errors
///
/// Returns [`DbError`] if the parent directory, connection, or schema cannot
/// be created.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    log::debug!("Opening snapshot database at {}", path.display());
    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Opens a throwaway in-memory snapshot database.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema cannot be created.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS metric_snapshots_id_seq START 1;

        CREATE TABLE IF NOT EXISTS metric_snapshots (
            id BIGINT PRIMARY KEY DEFAULT nextval('metric_snapshots_id_seq'),
            neighborhood_id BIGINT NOT NULL,
            avg_rent DOUBLE NOT NULL,
            transit_count BIGINT NOT NULL,
            mall_count BIGINT NOT NULL,
            score BIGINT NOT NULL,
            captured_at BIGINT NOT NULL
        );",
    )?;
    Ok(())
}

/// Appends `snapshots` in a single transaction.
///
/// Returns the number of rows written. Either every row is written or none
/// are.
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails.
pub fn append(conn: &Connection, snapshots: &[MetricSnapshot]) -> Result<usize, DbError> {
    if snapshots.is_empty() {
        return Ok(0);
    }

    conn.execute_batch("BEGIN TRANSACTION")?;

    match insert_all(conn, snapshots) {
        Ok(count) => {
            conn.execute_batch("COMMIT")?;
            log::info!("Recorded {count} metric snapshots");
            Ok(count)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback after failed snapshot insert also failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn insert_all(conn: &Connection, snapshots: &[MetricSnapshot]) -> Result<usize, DbError> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO metric_snapshots ({SNAPSHOT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"
    ))?;

    let mut count = 0;
    for s in snapshots {
        count += stmt.execute(duckdb::params![
            s.neighborhood_id,
            s.avg_rent,
            i64::from(s.transit_count),
            i64::from(s.mall_count),
            i64::from(s.score),
            s.captured_at.timestamp_millis(),
        ])?;
    }

    Ok(count)
}

/// Returns the most recent snapshot for `neighborhood_id`, if any.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be converted.
pub fn latest(
    conn: &Connection,
    neighborhood_id: NeighborhoodId,
) -> Result<Option<MetricSnapshot>, DbError> {
    Ok(history(conn, neighborhood_id, Some(1))?.into_iter().next())
}

/// Returns the most recent snapshot of each neighborhood in `ids`, ordered
/// by neighborhood id.
///
/// An empty `ids` means every neighborhood with history. Ids without any
/// snapshot are absent from the result.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be converted.
pub fn latest_many(
    conn: &Connection,
    ids: &[NeighborhoodId],
) -> Result<Vec<MetricSnapshot>, DbError> {
    let filter = if ids.is_empty() {
        String::new()
    } else {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        format!("WHERE neighborhood_id IN ({placeholders})")
    };

    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM (
            SELECT *, ROW_NUMBER() OVER (
                PARTITION BY neighborhood_id ORDER BY captured_at DESC, id DESC
            ) AS rn
            FROM metric_snapshots
            {filter}
        )
        WHERE rn = 1
        ORDER BY neighborhood_id"
    );

    let mut stmt = conn.prepare(&sql)?;
    for (i, id) in ids.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, id)?;
    }
    stmt.raw_execute()?;

    let mut results = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        results.push(read_snapshot(row)?);
    }

    Ok(results)
}

/// Returns snapshots for `neighborhood_id`, newest first, at most `limit`
/// of them when given.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be converted.
pub fn history(
    conn: &Connection,
    neighborhood_id: NeighborhoodId,
    limit: Option<usize>,
) -> Result<Vec<MetricSnapshot>, DbError> {
    let limit = limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS}
         FROM metric_snapshots
         WHERE neighborhood_id = ?
         ORDER BY captured_at DESC, id DESC
         {limit}"
    );

    let mut stmt = conn.prepare(&sql)?;
    stmt.raw_bind_parameter(1, neighborhood_id)?;
    stmt.raw_execute()?;

    let mut results = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        results.push(read_snapshot(row)?);
    }

    Ok(results)
}

/// Total number of stored snapshots.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn
        .prepare("SELECT COUNT(*) FROM metric_snapshots")?
        .query_row([], |row| row.get(0))?;
    u64::try_from(count).map_err(|e| DbError::Conversion {
        message: format!("negative row count {count}: {e}"),
    })
}

fn read_snapshot(row: &duckdb::Row<'_>) -> Result<MetricSnapshot, DbError> {
    let neighborhood_id: NeighborhoodId = row.get(0)?;
    let avg_rent: f64 = row.get(1)?;
    let transit_count: i64 = row.get(2)?;
    let mall_count: i64 = row.get(3)?;
    let score: i64 = row.get(4)?;
    let captured_at_ms: i64 = row.get(5)?;

    let conversion = |field: &str, value: i64| DbError::Conversion {
        message: format!("{field} {value} out of range for neighborhood {neighborhood_id}"),
    };

    Ok(MetricSnapshot {
        neighborhood_id,
        avg_rent,
        transit_count: u32::try_from(transit_count)
            .map_err(|_| conversion("transit_count", transit_count))?,
        mall_count: u32::try_from(mall_count).map_err(|_| conversion("mall_count", mall_count))?,
        score: u8::try_from(score).map_err(|_| conversion("score", score))?,
        captured_at: DateTime::<Utc>::from_timestamp_millis(captured_at_ms)
            .ok_or_else(|| conversion("captured_at", captured_at_ms))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
    }

    fn snapshot(neighborhood_id: NeighborhoodId, score: u8, captured_at: i64) -> MetricSnapshot {
        MetricSnapshot {
            neighborhood_id,
            avg_rent: 2000.0 + f64::from(score),
            transit_count: u32::from(score) / 10,
            mall_count: 1,
            score,
            captured_at: at(captured_at),
        }
    }

    #[test]
    fn empty_store_has_no_history() {
        let conn = open_in_memory().unwrap();
        assert_eq!(latest(&conn, 1).unwrap(), None);
        assert!(latest_many(&conn, &[]).unwrap().is_empty());
        assert!(history(&conn, 1, None).unwrap().is_empty());
        assert_eq!(count(&conn).unwrap(), 0);
        assert_eq!(append(&conn, &[]).unwrap(), 0);
    }

    #[test]
    fn latest_returns_newest_snapshot() {
        let conn = open_in_memory().unwrap();
        append(
            &conn,
            &[
                snapshot(1, 40, 1_000),
                snapshot(1, 60, 3_000),
                snapshot(1, 50, 2_000),
                snapshot(2, 70, 5_000),
            ],
        )
        .unwrap();

        let newest = latest(&conn, 1).unwrap().unwrap();
        assert_eq!(newest.score, 60);
        assert_eq!(newest.captured_at, at(3_000));
        assert_eq!(newest.transit_count, 6);
        assert!((newest.avg_rent - 2060.0).abs() < f64::EPSILON);
        assert_eq!(count(&conn).unwrap(), 4);
    }

    #[test]
    fn timestamp_ties_prefer_later_insert() {
        let conn = open_in_memory().unwrap();
        append(&conn, &[snapshot(1, 10, 1_000)]).unwrap();
        append(&conn, &[snapshot(1, 20, 1_000)]).unwrap();

        assert_eq!(latest(&conn, 1).unwrap().unwrap().score, 20);
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let conn = open_in_memory().unwrap();
        append(
            &conn,
            &[
                snapshot(1, 10, 1_000),
                snapshot(1, 30, 3_000),
                snapshot(1, 20, 2_000),
                snapshot(2, 99, 4_000),
            ],
        )
        .unwrap();

        let scores: Vec<_> = history(&conn, 1, None)
            .unwrap()
            .iter()
            .map(|s| s.score)
            .collect();
        assert_eq!(scores, vec![30, 20, 10]);

        let limited = history(&conn, 1, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].score, 30);

        assert!(history(&conn, 1, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn latest_many_filters_and_orders_by_id() {
        let conn = open_in_memory().unwrap();
        append(
            &conn,
            &[
                snapshot(3, 30, 1_000),
                snapshot(1, 10, 1_000),
                snapshot(1, 15, 2_000),
                snapshot(2, 20, 1_000),
            ],
        )
        .unwrap();

        let all: Vec<_> = latest_many(&conn, &[])
            .unwrap()
            .iter()
            .map(|s| (s.neighborhood_id, s.score))
            .collect();
        assert_eq!(all, vec![(1, 15), (2, 20), (3, 30)]);

        let some: Vec<_> = latest_many(&conn, &[3, 1, 42])
            .unwrap()
            .iter()
            .map(|s| (s.neighborhood_id, s.score))
            .collect();
        assert_eq!(some, vec![(1, 15), (3, 30)]);
    }

    #[test]
    fn snapshots_persist_across_connections() {
        let dir = std::env::temp_dir().join(format!("cityscope-snapshots-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("history.duckdb");

        {
            let conn = open(&path).unwrap();
            append(&conn, &[snapshot(7, 77, 7_000)]).unwrap();
        }

        let conn = open(&path).unwrap();
        let stored = latest(&conn, 7).unwrap().unwrap();
        assert_eq!(stored.score, 77);
        assert_eq!(stored.captured_at, at(7_000));

        drop(conn);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
