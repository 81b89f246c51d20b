use std::io;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use crate::models::{LogEntry, Student};
use crate::period::MonthKey;

pub const BACKUP_VERSION: &str = "1.0";

/// Team setup file passed between staff members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub students: Vec<Student>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl Backup {
    pub fn new(students: &[Student], logs: &[LogEntry], timestamp: i64) -> Self {
        Self {
            students: students.to_vec(),
            logs: logs.to_vec(),
            version: BACKUP_VERSION.to_string(),
            timestamp,
        }
    }
}

pub fn backup_file_name(today: NaiveDate) -> String {
    format!("IEP_Team_Backup_{}.json", today.format("%Y-%m-%d"))
}

pub fn csv_file_name(month: MonthKey) -> String {
    format!("IEP_Team_Logs_{}.csv", month.file_stem())
}

pub fn write_backup(path: &Path, backup: &Backup) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(backup).context("failed to serialize backup")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Only the presence of a `students` array is checked before the rest is decoded.
pub fn parse_backup(raw: &str) -> Result<Backup, ImportError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.get("students").is_some_and(|s| s.is_array()) {
        return Err(ImportError::MissingStudents);
    }
    Ok(serde_json::from_value(value)?)
}

pub fn read_backup(path: &Path) -> anyhow::Result<Backup> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_backup(&raw)?)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Staff")]
    staff: &'a str,
    #[serde(rename = "Student")]
    student: &'a str,
    #[serde(rename = "Grade")]
    grade: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "Minutes")]
    minutes: u64,
    #[serde(rename = "Notes")]
    notes: &'a str,
}

pub fn write_logs_csv<'a, W, I>(writer: W, logs: I, students: &[Student]) -> anyhow::Result<usize>
where
    W: io::Write,
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut csv = csv::Writer::from_writer(writer);
    let mut rows = 0usize;

    for log in logs {
        let student = students.iter().find(|s| s.id == log.student_id);
        let staff = log.staff_name.trim();
        csv.serialize(CsvRow {
            date: log.date,
            staff: if staff.is_empty() { "Anonymous" } else { staff },
            student: student.map_or("Unknown", |s| s.name.as_str()),
            grade: student.map_or("N/A", |s| s.grade.label()),
            subject: log.subject.label(),
            minutes: log.minutes,
            notes: log.notes.as_deref().unwrap_or(""),
        })?;
        rows += 1;
    }

    if rows == 0 {
        csv.write_record(["Date", "Staff", "Student", "Grade", "Subject", "Minutes", "Notes"])?;
    }
    csv.flush()?;
    Ok(rows)
}

pub fn export_csv<'a, I>(path: &Path, logs: I, students: &[Student]) -> anyhow::Result<usize>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_logs_csv(file, logs, students)
}
