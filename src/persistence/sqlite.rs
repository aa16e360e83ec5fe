use super::{assemble_summaries, PeriodRange, SummaryStore, UNASSIGNED_CODE};
use crate::boxes::BoxCode;
use crate::error::{Result, VatSummaryError};
use crate::report::{BoxTotal, PeriodSummary};
use log::debug;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vat_box_totals (
    period TEXT NOT NULL,
    box_code TEXT NOT NULL,
    amount TEXT NOT NULL,
    vat TEXT NOT NULL,
    transaction_count INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (period, box_code)
);
CREATE TABLE IF NOT EXISTS vat_period_counts (
    period TEXT PRIMARY KEY,
    transaction_count INTEGER NOT NULL,
    skipped_row_count INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed [`SummaryStore`].
///
/// Money is stored as decimal text so nothing is lost to floating point.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`. Concurrent writers
    /// are waited on for up to `busy_timeout` before a write fails.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        debug!("Opened summary store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    fn box_rows(&self) -> Result<Vec<(String, BoxCode, BoxTotal)>> {
        let mut stmt = self.conn.prepare(
            "SELECT period, box_code, amount, vat, transaction_count FROM vat_box_totals",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(period, code, amount, vat, count)| -> Result<(String, BoxCode, BoxTotal)> {
                let total = BoxTotal::new(
                    parse_stored_decimal(&amount)?,
                    parse_stored_decimal(&vat)?,
                    count.max(0) as usize,
                );
                Ok((period, BoxCode::new(code), total))
            })
            .collect()
    }

    fn count_rows(&self) -> Result<Vec<(String, usize, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT period, transaction_count, skipped_row_count FROM vat_period_counts")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?.max(0) as usize,
                    row.get::<_, i64>(2)?.max(0) as usize,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn parse_stored_decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str(text).map_err(|e| {
        VatSummaryError::PersistenceFailure(format!("stored amount '{}' is not a decimal: {}", text, e))
    })
}

fn write_box(conn: &Connection, period: &str, box_code: &BoxCode, total: &BoxTotal) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO vat_box_totals(period, box_code, amount, vat, transaction_count)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(period, box_code) DO UPDATE SET
            amount=excluded.amount,
            vat=excluded.vat,
            transaction_count=excluded.transaction_count,
            updated_at=datetime('now')
        "#,
        params![
            period,
            box_code.as_str(),
            total.amount.to_string(),
            total.vat.to_string(),
            total.transaction_count as i64
        ],
    )?;
    Ok(())
}

fn write_counts(
    conn: &Connection,
    period: &str,
    transaction_count: usize,
    skipped_row_count: usize,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO vat_period_counts(period, transaction_count, skipped_row_count)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(period) DO UPDATE SET
            transaction_count=excluded.transaction_count,
            skipped_row_count=excluded.skipped_row_count,
            updated_at=datetime('now')
        "#,
        params![period, transaction_count as i64, skipped_row_count as i64],
    )?;
    Ok(())
}

impl SummaryStore for SqliteStore {
    fn upsert(&mut self, period: &str, box_code: &BoxCode, total: &BoxTotal) -> Result<()> {
        write_box(&self.conn, period, box_code, total)
    }

    fn upsert_counts(
        &mut self,
        period: &str,
        transaction_count: usize,
        skipped_row_count: usize,
    ) -> Result<()> {
        write_counts(&self.conn, period, transaction_count, skipped_row_count)
    }

    /// One transaction per period: a failed write rolls back the whole
    /// period and leaves its previous rows in place.
    fn upsert_summary(&mut self, summary: &PeriodSummary) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (code, total) in &summary.totals {
            write_box(&tx, &summary.period, code, total)?;
        }
        write_box(
            &tx,
            &summary.period,
            &BoxCode::new(UNASSIGNED_CODE),
            &summary.unassigned,
        )?;
        write_counts(
            &tx,
            &summary.period,
            summary.transaction_count,
            summary.skipped_row_count,
        )?;
        tx.commit()?;
        debug!("Stored summary for {}", summary.period);
        Ok(())
    }

    fn fetch_summaries(&self, range: &PeriodRange) -> Result<Vec<PeriodSummary>> {
        Ok(assemble_summaries(self.box_rows()?, self.count_rows()?, range))
    }
}

/// Opens the store at `path`, runs `f` and closes the store again, also when
/// `f` fails. `f`'s error wins over a close error.
pub fn with_store<T, F>(path: impl AsRef<Path>, busy_timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce(&mut SqliteStore) -> Result<T>,
{
    let mut store = SqliteStore::open(path, busy_timeout)?;
    let result = f(&mut store);
    let closed = store.close();
    let value = result?;
    closed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_roundtrip_keeps_decimals_exact() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("Jan", &BoxCode::new("A"), &BoxTotal::new(dec!(1234.56), dec!(61.73), 3))
            .unwrap();
        store.upsert_counts("Jan", 3, 1).unwrap();

        let summaries = store.fetch_summaries(&PeriodRange::all()).unwrap();
        assert_eq!(summaries.len(), 1);
        let a = summaries[0].total("A").unwrap();
        assert_eq!(a.amount, dec!(1234.56));
        assert_eq!(a.vat, dec!(61.73));
        assert_eq!(a.transaction_count, 3);
        assert_eq!(summaries[0].skipped_row_count, 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let total = BoxTotal::new(dec!(-200), dec!(-10), 1);
        for _ in 0..3 {
            store.upsert("Feb", &BoxCode::new("A"), &total).unwrap();
        }
        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM vat_box_totals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_with_store_closes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.db");

        with_store(&path, Duration::from_millis(250), |store| {
            store.upsert("Mar", &BoxCode::new("C"), &BoxTotal::new(dec!(40), dec!(2), 1))
        })
        .unwrap();

        let summaries = with_store(&path, Duration::from_millis(250), |store| {
            store.fetch_summaries(&PeriodRange::single("Mar"))
        })
        .unwrap();
        assert_eq!(summaries[0].total("C").unwrap().vat, dec!(2));
    }

    #[test]
    fn test_failed_summary_write_keeps_previous_period() {
        let boxes = crate::boxes::BoxDefinition::uae_standard();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let mut old = PeriodSummary::empty("Apr", &boxes);
        old.totals.insert(BoxCode::new("A"), BoxTotal::new(dec!(100), dec!(5), 1));
        old.totals.insert(BoxCode::new("D"), BoxTotal::new(dec!(0), dec!(5), 0));
        old.transaction_count = 1;
        store.upsert_summary(&old).unwrap();

        // the fourth box write of the next run fails
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_d BEFORE INSERT ON vat_box_totals \
                 WHEN NEW.box_code = 'D' BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let mut new = old.clone();
        new.totals.insert(BoxCode::new("A"), BoxTotal::new(dec!(900), dec!(45), 3));
        new.transaction_count = 3;
        let err = store.upsert_summary(&new).unwrap_err();
        assert!(matches!(err, VatSummaryError::PersistenceFailure(_)));

        let stored = store.fetch_summaries(&PeriodRange::single("Apr")).unwrap();
        assert_eq!(stored, vec![old]);
    }
}
