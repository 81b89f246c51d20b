use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{LogEntry, Student, Subject, SubjectMinutes};
use crate::period::{self, MonthKey};

pub const UNKNOWN_STAFF: &str = "Unknown";
pub const WEEKS_PER_MONTH: u64 = 4;

/// A month, optionally narrowed to one week. No week means the whole month,
/// which is also what makes a view "monthly".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodFilter {
    pub month: MonthKey,
    pub week_start: Option<NaiveDate>,
}

impl PeriodFilter {
    pub fn month(month: MonthKey) -> Self {
        Self {
            month,
            week_start: None,
        }
    }

    pub fn week(month: MonthKey, week_start: NaiveDate) -> Self {
        Self {
            month,
            week_start: Some(period::week_start(week_start)),
        }
    }

    pub fn is_monthly(&self) -> bool {
        self.week_start.is_none()
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        if !self.month.contains(date) {
            return false;
        }
        match self.week_start {
            Some(start) => period::week_start(date) == start,
            None => true,
        }
    }

    pub fn label(&self) -> String {
        match self.week_start {
            Some(start) => format!("week of {}", period::week_range(start).label),
            None => self.month.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaffSegment {
    pub staff_name: String,
    pub minutes: u64,
    /// Share of the effective goal. Exceeds 100 once the goal is passed.
    pub percentage: f64,
}

impl StaffSegment {
    pub fn display_width(&self) -> f64 {
        self.percentage.min(100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalProgress {
    pub subject: Subject,
    pub total_minutes: u64,
    pub effective_goal: u64,
    pub accomplished: bool,
    pub segments: Vec<StaffSegment>,
}

pub fn filter_logs<'a>(logs: &'a [LogEntry], filter: &PeriodFilter) -> Vec<&'a LogEntry> {
    logs.iter().filter(|log| filter.matches(log.date)).collect()
}

pub fn subject_totals<'a, I>(logs: I) -> SubjectMinutes
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut totals = SubjectMinutes::default();
    for log in logs {
        let total = totals.get_mut(log.subject);
        *total = total.saturating_add(log.minutes);
    }
    totals
}

pub fn effective_goal(weekly_goal: u64, monthly: bool) -> u64 {
    if monthly {
        weekly_goal.saturating_mul(WEEKS_PER_MONTH)
    } else {
        weekly_goal
    }
}

/// A zero goal means "no goal set", never "already met".
pub fn is_accomplished(total_minutes: u64, effective_goal: u64) -> bool {
    effective_goal > 0 && total_minutes >= effective_goal
}

pub fn staff_segments<'a, I>(logs: I, effective_goal: u64) -> Vec<StaffSegment>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut by_staff: BTreeMap<String, u64> = BTreeMap::new();

    for log in logs {
        let name = log.staff_name.trim();
        let name = if name.is_empty() { UNKNOWN_STAFF } else { name };
        let minutes = by_staff.entry(name.to_string()).or_insert(0);
        *minutes = minutes.saturating_add(log.minutes);
    }

    by_staff
        .into_iter()
        .map(|(staff_name, minutes)| StaffSegment {
            percentage: if effective_goal > 0 {
                minutes as f64 / effective_goal as f64 * 100.0
            } else {
                0.0
            },
            staff_name,
            minutes,
        })
        .collect()
}

/// Progress for one subject over the filtered period, for a single student
/// when `student_id` is given or across everyone otherwise.
pub fn aggregate(
    logs: &[LogEntry],
    student_id: Option<&str>,
    subject: Subject,
    filter: &PeriodFilter,
    weekly_goal: u64,
) -> GoalProgress {
    let scoped: Vec<&LogEntry> = logs
        .iter()
        .filter(|log| student_id.map_or(true, |id| log.student_id == id))
        .filter(|log| log.subject == subject && filter.matches(log.date))
        .collect();

    let total_minutes = scoped
        .iter()
        .map(|log| log.minutes)
        .fold(0, u64::saturating_add);
    let effective_goal = effective_goal(weekly_goal, filter.is_monthly());

    GoalProgress {
        subject,
        total_minutes,
        effective_goal,
        accomplished: is_accomplished(total_minutes, effective_goal),
        segments: staff_segments(scoped, effective_goal),
    }
}

pub fn student_progress(
    student: &Student,
    logs: &[LogEntry],
    subject: Subject,
    filter: &PeriodFilter,
) -> GoalProgress {
    aggregate(
        logs,
        Some(&student.id),
        subject,
        filter,
        student.subject_goals.get(subject),
    )
}
