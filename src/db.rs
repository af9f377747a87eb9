use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result, Row};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, Time};

use crate::domain::calendar::{format_date, format_time, parse_date, parse_time};
use crate::domain::recurrence::RecurrenceType;
use crate::domain::task::{Reminder, Task};

pub const CURRENT_SCHEMA_VERSION: i64 = 3;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 3] = [
    Migration {
        version: 1,
        name: "baseline_task_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    name TEXT NOT NULL,
    day TEXT NOT NULL,
    is_done INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL DEFAULT 0,
    is_recurring INTEGER NOT NULL DEFAULT 0,
    recurrence_type TEXT,
    recurrence_end_date TEXT,
    parent_id INTEGER
);

CREATE TABLE IF NOT EXISTS reminder (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL UNIQUE REFERENCES task(id) ON DELETE CASCADE,
    time TEXT NOT NULL,
    date TEXT NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_task_day ON task(day);
CREATE INDEX IF NOT EXISTS idx_task_parent_id ON task(parent_id);
"#,
    },
    Migration {
        version: 2,
        name: "series_lease_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS series_lease (
    series_id INTEGER PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL
);
"#,
    },
    Migration {
        version: 3,
        name: "task_series_anchor_v1",
        sql: r#"
ALTER TABLE task ADD COLUMN series_anchor TEXT;
"#,
    },
];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_speed(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure_for_speed(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.name,
                now_utc_rfc3339()
            ],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

const TASK_SELECT: &str = r#"
SELECT t.id, t.created_at, t.name, t.day, t.is_done, t.position, t.is_recurring,
       t.recurrence_type, t.recurrence_end_date, t.parent_id,
       r.id, r.time, r.date, r.is_enabled
FROM task t
LEFT JOIN reminder r ON r.task_id = t.id
"#;

fn date_column(row: &Row<'_>, idx: usize) -> Result<Date> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).map_err(|err| conversion_error(idx, err))
}

fn optional_date_column(row: &Row<'_>, idx: usize) -> Result<Option<Date>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| parse_date(&value).map_err(|err| conversion_error(idx, err)))
        .transpose()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn map_task(row: &Row<'_>) -> Result<Task> {
    let recurrence_type = row
        .get::<_, Option<String>>(7)?
        .map(|raw| raw.parse::<RecurrenceType>().map_err(|err| conversion_error(7, err)))
        .transpose()?;

    let reminder_id: Option<i64> = row.get(10)?;
    let reminder = match reminder_id {
        Some(id) => {
            let raw_time: String = row.get(11)?;
            Some(Reminder {
                id,
                time: parse_time(&raw_time).map_err(|err| conversion_error(11, err))?,
                date: date_column(row, 12)?,
                is_enabled: row.get(13)?,
            })
        }
        None => None,
    };

    Ok(Task {
        id: row.get(0)?,
        created_at: date_column(row, 1)?,
        name: row.get(2)?,
        day: date_column(row, 3)?,
        is_done: row.get(4)?,
        position: row.get(5)?,
        is_recurring: row.get(6)?,
        recurrence_type,
        recurrence_end_date: optional_date_column(row, 8)?,
        parent_id: row.get(9)?,
        reminder,
    })
}

pub struct NewTaskRow<'a> {
    pub created_at: Date,
    pub name: &'a str,
    pub day: Date,
    pub position: i64,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_end_date: Option<Date>,
    pub parent_id: Option<i64>,
}

pub fn insert_task(conn: &Connection, args: &NewTaskRow<'_>) -> Result<i64> {
    conn.execute(
        r#"
INSERT INTO task (
    created_at, name, day, is_done, position, is_recurring,
    recurrence_type, recurrence_end_date, parent_id
)
VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8)
"#,
        params![
            format_date(args.created_at),
            args.name,
            format_date(args.day),
            args.position,
            args.is_recurring,
            args.recurrence_type.map(RecurrenceType::as_str),
            args.recurrence_end_date.map(format_date),
            args.parent_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn upsert_reminder(
    conn: &Connection,
    task_id: i64,
    time: Time,
    date: Date,
    is_enabled: bool,
) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO reminder (task_id, time, date, is_enabled)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(task_id) DO UPDATE SET
    time = excluded.time,
    date = excluded.date,
    is_enabled = excluded.is_enabled
"#,
        params![task_id, format_time(time), format_date(date), is_enabled],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    conn.query_row(&format!("{TASK_SELECT} WHERE t.id = ?1"), params![id], map_task)
        .optional()
}

pub fn list_tasks(conn: &Connection, day: Option<Date>) -> Result<Vec<Task>> {
    let sql = match day {
        Some(_) => format!("{TASK_SELECT} WHERE t.day = ?1 ORDER BY t.position ASC, t.id ASC"),
        None => format!("{TASK_SELECT} ORDER BY t.day ASC, t.position ASC, t.id ASC"),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match day {
        Some(day) => stmt.query_map(params![format_date(day)], map_task)?,
        None => stmt.query_map([], map_task)?,
    };
    rows.collect()
}

pub fn count_tasks(conn: &Connection, day: Option<Date>) -> Result<i64> {
    match day {
        Some(day) => conn.query_row(
            "SELECT COUNT(*) FROM task WHERE day = ?1",
            params![format_date(day)],
            |row| row.get(0),
        ),
        None => conn.query_row("SELECT COUNT(*) FROM task", [], |row| row.get(0)),
    }
}

pub fn update_task_fields(conn: &Connection, id: i64, name: &str, day: Date) -> Result<usize> {
    conn.execute(
        "UPDATE task SET name = ?2, day = ?3 WHERE id = ?1",
        params![id, name, format_date(day)],
    )
}

pub fn set_task_done(conn: &Connection, id: i64, is_done: bool) -> Result<usize> {
    conn.execute(
        "UPDATE task SET is_done = ?2 WHERE id = ?1",
        params![id, is_done],
    )
}

pub fn set_task_position(conn: &Connection, id: i64, position: i64) -> Result<usize> {
    conn.execute(
        "UPDATE task SET position = ?2 WHERE id = ?1",
        params![id, position],
    )
}

pub fn delete_task(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM task WHERE id = ?1", params![id])
}

pub fn next_position(conn: &Connection, day: Date) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(position), 0) + 1 FROM task WHERE day = ?1",
        params![format_date(day)],
        |row| row.get(0),
    )
}

/// Rows of the series (template included) scheduled strictly after `from`.
pub fn count_future_occurrences(conn: &Connection, series_id: i64, from: Date) -> Result<i64> {
    conn.query_row(
        r#"
SELECT COUNT(*)
FROM task
WHERE (id = ?1 OR parent_id = ?1) AND day > ?2
"#,
        params![series_id, format_date(from)],
        |row| row.get(0),
    )
}

pub fn series_days(conn: &Connection, series_id: i64) -> Result<Vec<Date>> {
    let mut stmt =
        conn.prepare("SELECT day FROM task WHERE id = ?1 OR parent_id = ?1 ORDER BY day ASC")?;
    let rows = stmt.query_map(params![series_id], |row| date_column(row, 0))?;
    rows.collect()
}

pub fn list_series(conn: &Connection, series_id: i64) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT} WHERE t.id = ?1 OR t.parent_id = ?1 ORDER BY t.day ASC, t.id ASC"
    ))?;
    let rows = stmt.query_map(params![series_id], map_task)?;
    rows.collect()
}

pub fn set_series_end_date(conn: &Connection, series_id: i64, end: Option<Date>) -> Result<usize> {
    conn.execute(
        "UPDATE task SET recurrence_end_date = ?2 WHERE id = ?1 OR parent_id = ?1",
        params![series_id, end.map(format_date)],
    )
}

/// Day the series cadence is measured from: the template's own day unless
/// the template was replaced by a promoted occurrence.
pub fn series_anchor(conn: &Connection, template_id: i64) -> Result<Option<Date>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT COALESCE(series_anchor, day) FROM task WHERE id = ?1",
            params![template_id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|value| parse_date(&value).map_err(|err| conversion_error(0, err)))
        .transpose()
}

/// Makes `new_template_id` the template of every row still pointing at
/// `old_series_id`. The promoted row keeps the series cadence at `anchor`.
pub fn reparent_series(
    conn: &Connection,
    old_series_id: i64,
    new_template_id: i64,
    anchor: Date,
) -> Result<()> {
    conn.execute(
        "UPDATE task SET parent_id = NULL, series_anchor = ?2 WHERE id = ?1",
        params![new_template_id, format_date(anchor)],
    )?;
    conn.execute(
        "UPDATE task SET parent_id = ?2 WHERE parent_id = ?1 AND id != ?2",
        params![old_series_id, new_template_id],
    )?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub series_id: i64,
    pub holder: String,
    pub acquired_at_ms: i64,
    pub expires_at_ms: i64,
}

/// Inserts the lease, or takes over an expired one. Returns false when a
/// live lease is held by someone else.
pub fn try_insert_lease(conn: &Connection, lease: &LeaseRecord) -> Result<bool> {
    let changed = conn.execute(
        r#"
INSERT INTO series_lease (series_id, holder, acquired_at_ms, expires_at_ms)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(series_id) DO UPDATE SET
    holder = excluded.holder,
    acquired_at_ms = excluded.acquired_at_ms,
    expires_at_ms = excluded.expires_at_ms
WHERE series_lease.expires_at_ms <= excluded.acquired_at_ms
"#,
        params![
            lease.series_id,
            lease.holder,
            lease.acquired_at_ms,
            lease.expires_at_ms
        ],
    )?;
    Ok(changed == 1)
}

pub fn get_lease(conn: &Connection, series_id: i64) -> Result<Option<LeaseRecord>> {
    conn.query_row(
        r#"
SELECT series_id, holder, acquired_at_ms, expires_at_ms
FROM series_lease
WHERE series_id = ?1
"#,
        params![series_id],
        |row| {
            Ok(LeaseRecord {
                series_id: row.get(0)?,
                holder: row.get(1)?,
                acquired_at_ms: row.get(2)?,
                expires_at_ms: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn delete_lease(conn: &Connection, series_id: i64, holder: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM series_lease WHERE series_id = ?1 AND holder = ?2",
        params![series_id, holder],
    )
}
