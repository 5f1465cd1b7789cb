use rand::Rng;
use rusqlite::{Connection, OptionalExtension};

/// Codes are drawn from the 36-symbol uppercase alphanumeric alphabet;
/// login lookups uppercase user input before matching.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const LOGIN_CODE_LEN: usize = 8;
pub const INVITE_CODE_LEN: usize = 6;

const MAX_ATTEMPTS: usize = 20;

pub fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Student login codes are unique across the whole workspace, not per
/// class: login resolves a bare code with no class context.
pub fn unique_login_code(conn: &Connection) -> anyhow::Result<String> {
    unique_code(
        conn,
        LOGIN_CODE_LEN,
        "SELECT 1 FROM students WHERE login_code = ?",
    )
}

pub fn unique_invite_code(conn: &Connection) -> anyhow::Result<String> {
    unique_code(
        conn,
        INVITE_CODE_LEN,
        "SELECT 1 FROM classes WHERE invite_code = ?",
    )
}

fn unique_code(conn: &Connection, len: usize, probe_sql: &str) -> anyhow::Result<String> {
    for _ in 0..MAX_ATTEMPTS {
        let code = random_code(len);
        let taken: Option<i64> = conn
            .query_row(probe_sql, [&code], |r| r.get(0))
            .optional()?;
        if taken.is_none() {
            return Ok(code);
        }
    }
    Err(anyhow::anyhow!(
        "no free code after {} attempts",
        MAX_ATTEMPTS
    ))
}
