use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "writequest.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Two devices can share a workspace over a synced folder; wait out
    // short writer collisions instead of failing immediately.
    conn.busy_timeout(Duration::from_millis(5000))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            invite_code TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            login_code TEXT NOT NULL UNIQUE,
            total_points INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS point_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_point_logs_student ON point_logs(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_point_logs_student_created
         ON point_logs(student_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS writing_missions(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            title TEXT NOT NULL,
            guide TEXT NOT NULL,
            genre TEXT NOT NULL,
            min_chars INTEGER NOT NULL DEFAULT 100,
            min_paragraphs INTEGER NOT NULL DEFAULT 2,
            base_reward INTEGER NOT NULL DEFAULT 100,
            bonus_threshold INTEGER NOT NULL DEFAULT 100,
            bonus_reward INTEGER NOT NULL DEFAULT 10,
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    // Early workspaces predate the bonus system. Add and backfill if needed.
    ensure_mission_bonus_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_writing_missions_class ON writing_missions(class_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_mission_bonus_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "writing_missions", "bonus_threshold")? {
        conn.execute(
            "ALTER TABLE writing_missions ADD COLUMN bonus_threshold INTEGER NOT NULL DEFAULT 100",
            [],
        )?;
    }
    if !table_has_column(conn, "writing_missions", "bonus_reward")? {
        conn.execute(
            "ALTER TABLE writing_missions ADD COLUMN bonus_reward INTEGER NOT NULL DEFAULT 10",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
