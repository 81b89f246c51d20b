use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
pub enum Subject {
    #[serde(rename = "Math")]
    #[value(name = "math")]
    Math,
    #[serde(rename = "English")]
    #[value(name = "english")]
    English,
    #[serde(rename = "Task Completion")]
    #[value(name = "task-completion")]
    TaskCompletion,
}

impl Subject {
    pub const ALL: [Subject; 3] = [Subject::Math, Subject::English, Subject::TaskCompletion];

    pub fn label(self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::English => "English",
            Subject::TaskCompletion => "Task Completion",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
pub enum Grade {
    #[serde(rename = "6th")]
    #[value(name = "6th")]
    Sixth,
    #[serde(rename = "7th")]
    #[value(name = "7th")]
    Seventh,
    #[serde(rename = "8th")]
    #[value(name = "8th")]
    Eighth,
}

impl Grade {
    pub const ALL: [Grade; 3] = [Grade::Sixth, Grade::Seventh, Grade::Eighth];

    pub fn label(self) -> &'static str {
        match self {
            Grade::Sixth => "6th",
            Grade::Seventh => "7th",
            Grade::Eighth => "8th",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Minutes keyed by subject. Used both for weekly goals and for period totals,
/// so every subject always has a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectMinutes {
    #[serde(rename = "Math")]
    pub math: u64,
    #[serde(rename = "English")]
    pub english: u64,
    #[serde(rename = "Task Completion")]
    pub task_completion: u64,
}

impl SubjectMinutes {
    pub fn get(&self, subject: Subject) -> u64 {
        match subject {
            Subject::Math => self.math,
            Subject::English => self.english,
            Subject::TaskCompletion => self.task_completion,
        }
    }

    pub fn get_mut(&mut self, subject: Subject) -> &mut u64 {
        match subject {
            Subject::Math => &mut self.math,
            Subject::English => &mut self.english,
            Subject::TaskCompletion => &mut self.task_completion,
        }
    }

    pub fn total(&self) -> u64 {
        Subject::ALL
            .iter()
            .map(|subject| self.get(*subject))
            .fold(0, u64::saturating_add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grade: Grade,
    #[serde(default)]
    pub subject_goals: SubjectMinutes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub student_id: String,
    pub subject: Subject,
    pub minutes: u64,
    pub date: NaiveDate,
    #[serde(default)]
    pub staff_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: i64,
}

/// Everything a new student needs except the id.
#[derive(Debug, Clone)]
pub struct StudentDraft {
    pub name: String,
    pub grade: Grade,
    pub subject_goals: SubjectMinutes,
}

/// One submission of the logging flow, before ids and timestamp are assigned.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub student_ids: Vec<String>,
    pub subject: Option<Subject>,
    pub minutes: i64,
    pub date: NaiveDate,
    pub staff_name: String,
    pub notes: Option<String>,
}
