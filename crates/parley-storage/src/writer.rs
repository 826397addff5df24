// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-transaction helpers.
//!
//! All writes in parley-storage are serialized through `tokio-rusqlite`'s
//! single background thread. The `Database` struct IS the single writer.
//! Multi-statement writes that guard an invariant (one active conversation
//! per key, idempotent message insert) additionally run inside an
//! `IMMEDIATE` transaction, which takes the SQLite write lock up front so a
//! second process sharing the file cannot interleave between the check and
//! the write.
//!
//! **Do NOT create additional Connection instances for writes.**

use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Runs `f` inside an `IMMEDIATE` transaction, committing on `Ok` and rolling
/// back (on drop) on `Err`.
pub fn immediate<T, F>(conn: &mut Connection, f: F) -> Result<T, rusqlite::Error>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, rusqlite::Error>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER NOT NULL UNIQUE);")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn commits_on_success() {
        let mut conn = conn();
        immediate(&mut conn, |tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO t (v) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn rolls_back_every_statement_on_error() {
        let mut conn = conn();
        let result = immediate(&mut conn, |tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&conn), 0);
    }
}
