use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub const ADJUST_MAX_TARGETS: usize = 500;

/// Ledger invariant: `students.total_points` must equal the sum of that
/// student's `point_logs.amount` rows at all times. Every write path in
/// this module keeps the balance column and the log inside one transaction.
#[derive(Debug)]
pub enum LedgerError {
    InvalidReason,
    ZeroAmount,
    EmptyTargets,
    TooManyTargets(usize),
    StudentNotFound,
    Store { code: &'static str, message: String },
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidReason => "invalid_reason",
            LedgerError::ZeroAmount => "bad_params",
            LedgerError::EmptyTargets => "bad_params",
            LedgerError::TooManyTargets(_) => "bad_params",
            LedgerError::StudentNotFound => "not_found",
            LedgerError::Store { code, .. } => code,
        }
    }

    pub fn message(&self) -> String {
        match self {
            LedgerError::InvalidReason => "reason must not be blank".to_string(),
            LedgerError::ZeroAmount => "amount must be a non-zero integer".to_string(),
            LedgerError::EmptyTargets => "studentIds must not be empty".to_string(),
            LedgerError::TooManyTargets(n) => format!(
                "too many targets: {} > {}",
                n, ADJUST_MAX_TARGETS
            ),
            LedgerError::StudentNotFound => "student not found".to_string(),
            LedgerError::Store { message, .. } => message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppliedAdjustment {
    pub log_id: String,
    pub new_balance: i64,
}

pub struct AdjustOutcome {
    pub student_id: String,
    pub result: Result<AppliedAdjustment, LedgerError>,
}

fn validate_reason(reason: &str) -> Result<&str, LedgerError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidReason);
    }
    Ok(trimmed)
}

/// Adjust one student's balance by a signed delta and append the matching
/// log entry. Both writes commit together or not at all.
#[allow(dead_code)]
pub fn apply_adjustment(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    reason: &str,
) -> Result<AppliedAdjustment, LedgerError> {
    let reason = validate_reason(reason)?;
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    adjust_one(conn, student_id, amount, reason)
}

/// Adjust several students independently. Validation failures reject the
/// whole call before any store interaction; after that, one student's
/// failure never blocks the others.
pub fn adjust_many(
    conn: &Connection,
    targets: &[String],
    amount: i64,
    reason: &str,
) -> Result<Vec<AdjustOutcome>, LedgerError> {
    let reason = validate_reason(reason)?;
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    if targets.is_empty() {
        return Err(LedgerError::EmptyTargets);
    }
    if targets.len() > ADJUST_MAX_TARGETS {
        return Err(LedgerError::TooManyTargets(targets.len()));
    }

    Ok(targets
        .iter()
        .map(|id| AdjustOutcome {
            student_id: id.clone(),
            result: adjust_one(conn, id, amount, reason),
        })
        .collect())
}

fn adjust_one(
    conn: &Connection,
    student_id: &str,
    amount: i64,
    reason: &str,
) -> Result<AppliedAdjustment, LedgerError> {
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => {
            return Err(LedgerError::Store {
                code: "db_tx_failed",
                message: e.to_string(),
            })
        }
    };

    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    // Atomic increment in SQL. The daemon never computes the new balance
    // from a previously read value, so concurrent adjusters cannot lose an
    // update to a stale read.
    let changed = match tx.execute(
        "UPDATE students SET total_points = total_points + ?2, updated_at = ?3 WHERE id = ?1",
        (student_id, amount, &now),
    ) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return Err(LedgerError::Store {
                code: "db_update_failed",
                message: e.to_string(),
            });
        }
    };
    if changed == 0 {
        let _ = tx.rollback();
        return Err(LedgerError::StudentNotFound);
    }

    let log_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO point_logs(id, student_id, amount, reason, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&log_id, student_id, amount, reason, &now),
    ) {
        let _ = tx.rollback();
        return Err(LedgerError::Store {
            code: "db_insert_failed",
            message: e.to_string(),
        });
    }

    // Report what the store now holds, not oldBalance + amount computed by
    // a caller that may be stale.
    let new_balance: i64 = match tx.query_row(
        "SELECT total_points FROM students WHERE id = ?",
        [student_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return Err(LedgerError::Store {
                code: "db_query_failed",
                message: e.to_string(),
            });
        }
    };

    if let Err(e) = tx.commit() {
        return Err(LedgerError::Store {
            code: "db_commit_failed",
            message: e.to_string(),
        });
    }

    Ok(AppliedAdjustment { log_id, new_balance })
}

pub fn stored_balance(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT total_points FROM students WHERE id = ?",
        [student_id],
        |r| r.get(0),
    )
    .optional()
}

pub fn ledger_total(conn: &Connection, student_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM point_logs WHERE student_id = ?",
        [student_id],
        |r| r.get(0),
    )
}

#[derive(Debug)]
pub struct DriftRow {
    pub student_id: String,
    pub name: String,
    pub balance: i64,
    pub ledger_total: i64,
}

/// Recompute every ledger total for a class and report students whose
/// stored balance disagrees. An empty drift list is the invariant holding.
pub fn audit_class(
    conn: &Connection,
    class_id: &str,
) -> rusqlite::Result<(usize, Vec<DriftRow>)> {
    let mut stmt = conn.prepare(
        "SELECT
           s.id,
           s.name,
           s.total_points,
           COALESCE((SELECT SUM(pl.amount) FROM point_logs pl WHERE pl.student_id = s.id), 0)
         FROM students s
         WHERE s.class_id = ?
         ORDER BY s.name",
    )?;

    let rows = stmt.query_map([class_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut checked = 0usize;
    let mut drift = Vec::new();
    for row in rows {
        let (student_id, name, balance, total) = row?;
        checked += 1;
        if balance != total {
            drift.push(DriftRow {
                student_id,
                name,
                balance,
                ledger_total: total,
            });
        }
    }
    Ok((checked, drift))
}
