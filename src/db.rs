use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::models::{Grade, LogEntry, Student, SubjectMinutes};

pub const STUDENTS_KEY: &str = "iep_students";
pub const LOGS_KEY: &str = "iep_logs";
pub const SYNC_URL_KEY: &str = "iep_sync_url";
pub const STAFF_NAME_KEY: &str = "iep_staff_name";

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url `{database_url}`"))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open {database_url}"))
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn get_value(pool: &SqlitePool, key: &str) -> anyhow::Result<Option<String>> {
    let row = sqlx::query("SELECT value FROM app_state WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to read `{key}`"))?;

    Ok(row.map(|row| row.get("value")))
}

async fn put_value(pool: &SqlitePool, key: &str, value: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO app_state (key, value)
        VALUES (?, ?)
        ON CONFLICT (key) DO UPDATE
        SET value = excluded.value,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .with_context(|| format!("failed to write `{key}`"))?;

    Ok(())
}

async fn load_json<T: serde::de::DeserializeOwned>(
    pool: &SqlitePool,
    key: &str,
) -> anyhow::Result<Vec<T>> {
    match get_value(pool, key).await? {
        Some(raw) => serde_json::from_str(&raw).with_context(|| format!("corrupt `{key}` value")),
        None => Ok(Vec::new()),
    }
}

async fn save_json<T: serde::Serialize>(
    pool: &SqlitePool,
    key: &str,
    values: &[T],
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(values)?;
    put_value(pool, key, &raw).await
}

pub async fn load_students(pool: &SqlitePool) -> anyhow::Result<Vec<Student>> {
    load_json(pool, STUDENTS_KEY).await
}

pub async fn save_students(pool: &SqlitePool, students: &[Student]) -> anyhow::Result<()> {
    save_json(pool, STUDENTS_KEY, students).await
}

pub async fn load_logs(pool: &SqlitePool) -> anyhow::Result<Vec<LogEntry>> {
    load_json(pool, LOGS_KEY).await
}

pub async fn save_logs(pool: &SqlitePool, logs: &[LogEntry]) -> anyhow::Result<()> {
    save_json(pool, LOGS_KEY, logs).await
}

pub async fn load_sync_url(pool: &SqlitePool) -> anyhow::Result<String> {
    Ok(get_value(pool, SYNC_URL_KEY).await?.unwrap_or_default())
}

pub async fn save_sync_url(pool: &SqlitePool, url: &str) -> anyhow::Result<()> {
    put_value(pool, SYNC_URL_KEY, url).await
}

pub async fn load_staff_name(pool: &SqlitePool) -> anyhow::Result<String> {
    Ok(get_value(pool, STAFF_NAME_KEY).await?.unwrap_or_default())
}

pub async fn save_staff_name(pool: &SqlitePool, name: &str) -> anyhow::Result<()> {
    put_value(pool, STAFF_NAME_KEY, name).await
}

/// The sample caseload used by `seed`.
pub fn demo_roster() -> Vec<Student> {
    let rows = [
        ("1", "Alex Thompson", Grade::Sixth, (30, 20, 10)),
        ("2", "Maya Rodriguez", Grade::Seventh, (15, 30, 0)),
        ("3", "Jordan Lee", Grade::Eighth, (45, 45, 0)),
        ("4", "Sam Rivera", Grade::Sixth, (10, 10, 10)),
        ("5", "Casey Smith", Grade::Seventh, (40, 40, 40)),
        ("6", "Riley Vance", Grade::Eighth, (20, 20, 20)),
    ];

    rows.into_iter()
        .map(|(id, name, grade, (math, english, task_completion))| Student {
            id: id.to_string(),
            name: name.to_string(),
            grade,
            subject_goals: SubjectMinutes {
                math,
                english,
                task_completion,
            },
        })
        .collect()
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:").await.expect("open in-memory db");
    init_db(&pool).await.expect("run migrations");
    pool
}
