use std::collections::HashSet;

use sqlx::SqlitePool;

use crate::db;
use crate::error::ValidationError;
use crate::ids::IdGenerator;
use crate::models::{Grade, LogEntry, SessionDraft, Student, StudentDraft, Subject};
use crate::sync::SyncClient;

/// Owns the in-memory caseload and writes every mutation straight through to
/// the store. Built once per process.
pub struct Tracker<G> {
    pool: SqlitePool,
    sync: SyncClient,
    ids: G,
    students: Vec<Student>,
    logs: Vec<LogEntry>,
    sync_url: String,
    staff_name: String,
}

pub struct ValidSession {
    pub student_ids: Vec<String>,
    pub subject: Subject,
    pub minutes: u64,
}

/// Checks a logging submission against the current roster.
pub fn validate_session(
    draft: &SessionDraft,
    students: &[Student],
) -> Result<ValidSession, ValidationError> {
    let mut seen = HashSet::new();
    let student_ids: Vec<String> = draft
        .student_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();

    if student_ids.is_empty() {
        return Err(ValidationError::NoStudents);
    }
    let subject = draft.subject.ok_or(ValidationError::MissingSubject)?;
    if draft.staff_name.trim().is_empty() {
        return Err(ValidationError::MissingStaffName);
    }
    if draft.minutes <= 0 {
        return Err(ValidationError::NonPositiveMinutes(draft.minutes));
    }
    if let Some(unknown) = student_ids
        .iter()
        .find(|id| !students.iter().any(|s| &s.id == *id))
    {
        return Err(ValidationError::UnknownStudent(unknown.clone()));
    }

    Ok(ValidSession {
        student_ids,
        subject,
        minutes: draft.minutes as u64,
    })
}

/// Lenient integer parse for typed-in minutes: leading digits win, anything
/// unparseable becomes 0 (which validation then rejects).
pub fn coerce_minutes(raw: &str) -> i64 {
    let trimmed = raw.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return 0;
    }
    // overlong digit runs saturate rather than collapse to 0
    digits[..end]
        .parse::<i64>()
        .unwrap_or(i64::MAX)
        .saturating_mul(sign)
}

impl<G: IdGenerator> Tracker<G> {
    pub async fn open(pool: SqlitePool, sync: SyncClient, ids: G) -> anyhow::Result<Self> {
        let students = db::load_students(&pool).await?;
        let logs = db::load_logs(&pool).await?;
        let sync_url = db::load_sync_url(&pool).await?;
        let staff_name = db::load_staff_name(&pool).await?;

        tracing::debug!(
            students = students.len(),
            logs = logs.len(),
            "loaded local state"
        );

        Ok(Self {
            pool,
            sync,
            ids,
            students,
            logs,
            sync_url,
            staff_name,
        })
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn sync_url(&self) -> &str {
        &self.sync_url
    }

    /// Last staff name used to log a session.
    pub fn staff_name(&self) -> &str {
        &self.staff_name
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn students_in_grade(&self, grade: Grade) -> Vec<&Student> {
        let mut students: Vec<&Student> =
            self.students.iter().filter(|s| s.grade == grade).collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        students
    }

    fn fresh_id(&mut self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.ids.next_id();
            if !taken(&id) {
                return id;
            }
        }
    }

    pub async fn add_student(&mut self, draft: StudentDraft) -> anyhow::Result<Student> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingStudentName.into());
        }

        let existing: HashSet<String> = self.students.iter().map(|s| s.id.clone()).collect();
        let student = Student {
            id: self.fresh_id(|id| existing.contains(id)),
            name: name.to_string(),
            grade: draft.grade,
            subject_goals: draft.subject_goals,
        };

        let mut students = self.students.clone();
        students.push(student.clone());
        db::save_students(&self.pool, &students).await?;
        self.students = students;
        tracing::info!(id = %student.id, name = %student.name, "added student");
        Ok(student)
    }

    pub async fn update_student(
        &mut self,
        id: &str,
        draft: StudentDraft,
    ) -> anyhow::Result<Student> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingStudentName.into());
        }
        let mut students = self.students.clone();
        let student = students
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ValidationError::UnknownStudent(id.to_string()))?;

        student.name = name;
        student.grade = draft.grade;
        student.subject_goals = draft.subject_goals;
        let updated = student.clone();

        db::save_students(&self.pool, &students).await?;
        self.students = students;
        tracing::info!(id = %updated.id, "updated student");
        Ok(updated)
    }

    /// Creates one log per selected student, persists them, then pushes the
    /// new entries to the sync endpoint if one is configured.
    pub async fn record_session(
        &mut self,
        draft: SessionDraft,
        timestamp: i64,
    ) -> anyhow::Result<Vec<LogEntry>> {
        let valid = validate_session(&draft, &self.students)?;
        let staff_name = draft.staff_name.trim().to_string();
        let notes = draft
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let mut taken: HashSet<String> = self.logs.iter().map(|l| l.id.clone()).collect();
        let mut created = Vec::with_capacity(valid.student_ids.len());
        for student_id in valid.student_ids {
            let id = self.fresh_id(|id| taken.contains(id));
            taken.insert(id.clone());
            created.push(LogEntry {
                id,
                student_id,
                subject: valid.subject,
                minutes: valid.minutes,
                date: draft.date,
                staff_name: staff_name.clone(),
                notes: notes.clone(),
                timestamp,
            });
        }

        let mut logs = created.clone();
        logs.extend(self.logs.iter().cloned());
        db::save_logs(&self.pool, &logs).await?;
        self.logs = logs;

        if self.staff_name != staff_name {
            db::save_staff_name(&self.pool, &staff_name).await?;
            self.staff_name = staff_name;
        }

        tracing::info!(
            count = created.len(),
            subject = %valid.subject,
            minutes = valid.minutes,
            "recorded session"
        );

        self.sync.push_logs(&self.sync_url, &created).await;
        Ok(created)
    }

    pub async fn set_sync_url(&mut self, url: &str) -> anyhow::Result<()> {
        let url = url.trim().to_string();
        db::save_sync_url(&self.pool, &url).await?;
        self.sync_url = url;
        Ok(())
    }

    /// Replaces both collections wholesale. Duplicate ids keep their first
    /// occurrence.
    pub async fn replace_all(
        &mut self,
        students: Vec<Student>,
        logs: Vec<LogEntry>,
    ) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        let students: Vec<Student> = students
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .collect();
        let mut seen = HashSet::new();
        let logs: Vec<LogEntry> = logs
            .into_iter()
            .filter(|l| seen.insert(l.id.clone()))
            .collect();

        db::save_students(&self.pool, &students).await?;
        db::save_logs(&self.pool, &logs).await?;
        self.students = students;
        self.logs = logs;
        tracing::info!(
            students = self.students.len(),
            logs = self.logs.len(),
            "replaced local state"
        );
        Ok(())
    }

    /// Alternate sync mode: the remote collection overwrites local logs, no merge.
    /// An unreachable or malformed endpoint is logged and leaves local logs as
    /// they are (`Ok(None)`).
    pub async fn pull(&mut self) -> anyhow::Result<Option<usize>> {
        if self.sync_url.is_empty() {
            anyhow::bail!("no sync url configured (use `set-sync-url`)");
        }
        let logs = match self.sync.pull_logs(&self.sync_url).await {
            Ok(logs) => logs,
            Err(err) => {
                tracing::warn!(error = %err, url = %self.sync_url, "cloud pull failed, keeping local logs");
                return Ok(None);
            }
        };
        let students = self.students.clone();
        self.replace_all(students, logs).await?;
        Ok(Some(self.logs.len()))
    }

    /// Adds any demo students not already on the roster.
    pub async fn seed(&mut self) -> anyhow::Result<usize> {
        let mut students = self.students.clone();
        let mut added = 0;
        for student in db::demo_roster() {
            if !students.iter().any(|s| s.id == student.id) {
                students.push(student);
                added += 1;
            }
        }
        db::save_students(&self.pool, &students).await?;
        self.students = students;
        Ok(added)
    }

    pub async fn reset(&mut self) -> anyhow::Result<()> {
        self.replace_all(Vec::new(), Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::models::SubjectMinutes;
    use crate::sync::tests::one_shot_server;
    use crate::sync::Envelope;
    use chrono::NaiveDate;
    use std::time::Duration;

    async fn tracker_with(pool: SqlitePool) -> Tracker<SequentialIds> {
        let sync = SyncClient::new(Duration::from_secs(5), Envelope::Bare).unwrap();
        Tracker::open(pool, sync, SequentialIds::new("id")).await.unwrap()
    }

    async fn seeded_tracker() -> (SqlitePool, Tracker<SequentialIds>) {
        let pool = db::memory_pool().await;
        let mut tracker = tracker_with(pool.clone()).await;
        tracker.seed().await.unwrap();
        (pool, tracker)
    }

    fn draft(student_ids: &[&str], minutes: i64, staff: &str) -> SessionDraft {
        SessionDraft {
            student_ids: student_ids.iter().map(|s| s.to_string()).collect(),
            subject: Some(Subject::Math),
            minutes,
            date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            staff_name: staff.to_string(),
            notes: Some("worked on fractions".to_string()),
        }
    }

    #[test]
    fn coerce_minutes_behaves_like_lenient_parse() {
        assert_eq!(coerce_minutes("50"), 50);
        assert_eq!(coerce_minutes(" 45min"), 45);
        assert_eq!(coerce_minutes("-5"), -5);
        assert_eq!(coerce_minutes("abc"), 0);
        assert_eq!(coerce_minutes("99999999999999999999"), i64::MAX);
        assert_eq!(coerce_minutes("-99999999999999999999"), -i64::MAX);
        assert_eq!(coerce_minutes(""), 0);
    }

    #[test]
    fn validation_rejects_incomplete_submissions() {
        let roster = db::demo_roster();
        assert_eq!(
            validate_session(&draft(&[], 20, "A"), &roster).err(),
            Some(ValidationError::NoStudents)
        );
        assert_eq!(
            validate_session(&draft(&["1"], 20, "   "), &roster).err(),
            Some(ValidationError::MissingStaffName)
        );
        assert_eq!(
            validate_session(&draft(&["1"], 0, "A"), &roster).err(),
            Some(ValidationError::NonPositiveMinutes(0))
        );
        assert_eq!(
            validate_session(&draft(&["99"], 10, "A"), &roster).err(),
            Some(ValidationError::UnknownStudent("99".to_string()))
        );
        let mut no_subject = draft(&["1"], 10, "A");
        no_subject.subject = None;
        assert_eq!(
            validate_session(&no_subject, &roster).err(),
            Some(ValidationError::MissingSubject)
        );
    }

    #[tokio::test]
    async fn session_creates_one_log_per_student_newest_first() {
        let (pool, mut tracker) = seeded_tracker().await;
        tracker
            .record_session(draft(&["1"], 20, "Teacher Alpha"), 100)
            .await
            .unwrap();
        let created = tracker
            .record_session(draft(&["2", "3", "2"], 15, " Teacher Beta "), 200)
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|l| l.minutes == 15 && l.timestamp == 200));
        assert!(created.iter().all(|l| l.staff_name == "Teacher Beta"));

        let logs = tracker.logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].student_id, "2");
        assert_eq!(logs[2].staff_name, "Teacher Alpha");
        assert_eq!(tracker.staff_name(), "Teacher Beta");

        let stored = db::load_logs(&pool).await.unwrap();
        assert_eq!(stored, logs.to_vec());
        assert_eq!(db::load_staff_name(&pool).await.unwrap(), "Teacher Beta");
    }

    #[tokio::test]
    async fn rejected_session_changes_nothing() {
        let (pool, mut tracker) = seeded_tracker().await;
        let err = tracker
            .record_session(draft(&["1"], -10, "Teacher Alpha"), 1)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::NonPositiveMinutes(-10))
        );
        assert!(tracker.logs().is_empty());
        assert!(db::load_logs(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn student_edits_keep_the_id() {
        let (pool, mut tracker) = seeded_tracker().await;
        let added = tracker
            .add_student(StudentDraft {
                name: "  Pat Kim ".to_string(),
                grade: Grade::Sixth,
                subject_goals: SubjectMinutes {
                    math: 30,
                    english: 30,
                    task_completion: 0,
                },
            })
            .await
            .unwrap();
        assert_eq!(added.name, "Pat Kim");

        let updated = tracker
            .update_student(
                &added.id,
                StudentDraft {
                    name: "Pat Kimura".to_string(),
                    grade: Grade::Seventh,
                    subject_goals: SubjectMinutes::default(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, added.id);

        let reopened = tracker_with(pool).await;
        let student = reopened.student(&added.id).unwrap();
        assert_eq!(student.name, "Pat Kimura");
        assert_eq!(student.grade, Grade::Seventh);
        assert_eq!(reopened.students().len(), 7);

        let sevenths: Vec<&str> = reopened
            .students_in_grade(Grade::Seventh)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(sevenths, vec!["Casey Smith", "Maya Rodriguez", "Pat Kimura"]);
    }

    #[tokio::test]
    async fn blank_student_name_is_rejected() {
        let (_pool, mut tracker) = seeded_tracker().await;
        let err = tracker
            .add_student(StudentDraft {
                name: " ".to_string(),
                grade: Grade::Eighth,
                subject_goals: SubjectMinutes::default(),
            })
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
        assert_eq!(tracker.students().len(), 6);
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let (_pool, mut tracker) = seeded_tracker().await;
        assert_eq!(tracker.seed().await.unwrap(), 0);
        assert_eq!(tracker.students().len(), 6);
    }

    #[tokio::test]
    async fn push_failure_keeps_local_logs() {
        let (pool, mut tracker) = seeded_tracker().await;
        tracker.set_sync_url("http://127.0.0.1:9/sync").await.unwrap();
        let created = tracker
            .record_session(draft(&["1"], 20, "Teacher Alpha"), 1)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(db::load_logs(&pool).await.unwrap().len(), 1);
        assert_eq!(db::load_sync_url(&pool).await.unwrap(), "http://127.0.0.1:9/sync");
    }

    #[tokio::test]
    async fn session_pushes_only_new_entries() {
        let (_pool, mut tracker) = seeded_tracker().await;
        tracker
            .record_session(draft(&["1"], 20, "Teacher Alpha"), 1)
            .await
            .unwrap();

        let (url, server) = one_shot_server("200 OK", "{}".to_string()).await;
        tracker.set_sync_url(&url).await.unwrap();
        tracker
            .record_session(draft(&["4"], 25, "Teacher Gamma"), 2)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.contains(r#""studentId":"4""#));
        assert!(!request.contains(r#""studentId":"1""#));
    }

    #[tokio::test]
    async fn pull_replaces_local_logs() {
        let (pool, mut tracker) = seeded_tracker().await;
        tracker
            .record_session(draft(&["1"], 20, "Teacher Alpha"), 1)
            .await
            .unwrap();

        let remote = vec![LogEntry {
            id: "remote-1".to_string(),
            student_id: "gone".to_string(),
            subject: Subject::English,
            minutes: 40,
            date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            staff_name: "Teacher Delta".to_string(),
            notes: None,
            timestamp: 9,
        }];
        let (url, _server) = one_shot_server("200 OK", serde_json::to_string(&remote).unwrap()).await;
        tracker.set_sync_url(&url).await.unwrap();

        assert_eq!(tracker.pull().await.unwrap(), Some(1));
        assert_eq!(tracker.logs(), remote.as_slice());
        assert_eq!(tracker.students().len(), 6);
        assert_eq!(db::load_logs(&pool).await.unwrap(), remote);
    }

    #[tokio::test]
    async fn failed_pull_keeps_local_logs() {
        let (pool, mut tracker) = seeded_tracker().await;
        tracker
            .record_session(draft(&["1"], 20, "Teacher Alpha"), 1)
            .await
            .unwrap();
        let before = tracker.logs().to_vec();

        tracker.set_sync_url("http://127.0.0.1:9/sync").await.unwrap();
        assert_eq!(tracker.pull().await.unwrap(), None);

        let (url, _server) = one_shot_server("500 Internal Server Error", "oops".to_string()).await;
        tracker.set_sync_url(&url).await.unwrap();
        assert_eq!(tracker.pull().await.unwrap(), None);

        assert_eq!(tracker.logs(), before.as_slice());
        assert_eq!(db::load_logs(&pool).await.unwrap(), before);
    }

    #[tokio::test]
    async fn failed_save_leaves_memory_untouched() {
        let (pool, mut tracker) = seeded_tracker().await;
        tracker
            .record_session(draft(&["1"], 20, "Teacher Alpha"), 1)
            .await
            .unwrap();
        pool.close().await;

        let added = tracker
            .add_student(StudentDraft {
                name: "Pat Kim".to_string(),
                grade: Grade::Sixth,
                subject_goals: SubjectMinutes::default(),
            })
            .await;
        assert!(added.is_err());
        assert_eq!(tracker.students().len(), 6);

        let edited = tracker
            .update_student(
                "1",
                StudentDraft {
                    name: "Renamed".to_string(),
                    grade: Grade::Eighth,
                    subject_goals: SubjectMinutes::default(),
                },
            )
            .await;
        assert!(edited.is_err());
        assert_eq!(tracker.student("1").unwrap().name, "Alex Thompson");

        let logged = tracker
            .record_session(draft(&["2"], 15, "Teacher Beta"), 2)
            .await;
        assert!(logged.is_err());
        assert_eq!(tracker.logs().len(), 1);
        assert_eq!(tracker.staff_name(), "Teacher Alpha");

        assert!(tracker.reset().await.is_err());
        assert_eq!(tracker.students().len(), 6);
        assert_eq!(tracker.logs().len(), 1);
    }

    #[tokio::test]
    async fn pull_without_url_fails() {
        let (_pool, mut tracker) = seeded_tracker().await;
        assert!(tracker.pull().await.is_err());
    }

    #[tokio::test]
    async fn backup_restores_identical_state_elsewhere() {
        let (_pool, mut source) = seeded_tracker().await;
        source
            .record_session(draft(&["1", "5"], 30, "Teacher Alpha"), 10)
            .await
            .unwrap();
        let backup = crate::exchange::Backup::new(source.students(), source.logs(), 11);
        let raw = serde_json::to_string_pretty(&backup).unwrap();

        let pool = db::memory_pool().await;
        let mut target = tracker_with(pool.clone()).await;
        let parsed = crate::exchange::parse_backup(&raw).unwrap();
        target.replace_all(parsed.students, parsed.logs).await.unwrap();

        let reopened = tracker_with(pool).await;
        assert_eq!(reopened.students(), source.students());
        assert_eq!(reopened.logs(), source.logs());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (pool, mut tracker) = seeded_tracker().await;
        tracker
            .record_session(draft(&["1", "2"], 20, "Teacher Alpha"), 1)
            .await
            .unwrap();
        tracker.reset().await.unwrap();
        assert!(tracker.students().is_empty());
        assert!(tracker.logs().is_empty());
        assert!(db::load_students(&pool).await.unwrap().is_empty());
    }
}
