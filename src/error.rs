use thiserror::Error;

/// Reasons a submission is refused before anything is persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("select at least one student")]
    NoStudents,
    #[error("pick a subject")]
    MissingSubject,
    #[error("staff name is required")]
    MissingStaffName,
    #[error("minutes must be greater than zero (got {0})")]
    NonPositiveMinutes(i64),
    #[error("unknown student id `{0}`")]
    UnknownStudent(String),
    #[error("student name is required")]
    MissingStudentName,
}

/// Backup files that cannot be applied. Local state is left untouched.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid setup file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid setup file: missing `students` array")]
    MissingStudents,
}
