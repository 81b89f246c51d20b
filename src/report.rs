use std::fmt::Write;

use crate::models::{Grade, LogEntry, Student, Subject};
use crate::period::MonthKey;
use crate::progress::{self, GoalProgress, PeriodFilter};

pub const FORMER_STUDENT: &str = "Former Student";
const BAR_WIDTH: usize = 20;

/// Text progress bar. Each staff segment gets its own fill character and is
/// clamped so the whole bar never exceeds its width.
pub fn progress_bar(progress: &GoalProgress) -> String {
    const FILLS: [char; 5] = ['#', '=', '+', '*', '%'];
    let mut bar = String::with_capacity(BAR_WIDTH + 2);
    let mut used = 0usize;

    bar.push('[');
    for (index, segment) in progress.segments.iter().enumerate() {
        let cells = (segment.display_width() / 100.0 * BAR_WIDTH as f64).round() as usize;
        let cells = cells.min(BAR_WIDTH - used);
        for _ in 0..cells {
            bar.push(FILLS[index % FILLS.len()]);
        }
        used += cells;
    }
    for _ in used..BAR_WIDTH {
        bar.push('.');
    }
    bar.push(']');
    bar
}

fn write_progress(output: &mut String, progress: &GoalProgress) {
    let status = if progress.accomplished { " goal met" } else { "" };
    if progress.effective_goal == 0 {
        let _ = writeln!(
            output,
            "- {}: {} min (no goal set)",
            progress.subject, progress.total_minutes
        );
    } else {
        let _ = writeln!(
            output,
            "- {}: {} / {} min {}{}",
            progress.subject,
            progress.total_minutes,
            progress.effective_goal,
            progress_bar(progress),
            status
        );
    }
    for segment in progress.segments.iter() {
        let _ = writeln!(
            output,
            "  - {}: {} min ({:.1}%)",
            segment.staff_name, segment.minutes, segment.percentage
        );
    }
}

/// Notes left on this student's sessions in one subject, newest first.
fn write_notes(output: &mut String, logs: &[&LogEntry], student: &Student, subject: Subject) {
    let mut noted: Vec<&LogEntry> = logs
        .iter()
        .copied()
        .filter(|l| l.student_id == student.id && l.subject == subject && l.notes.is_some())
        .collect();
    if noted.is_empty() {
        return;
    }
    noted.sort_by(|a, b| b.date.cmp(&a.date).then(b.timestamp.cmp(&a.timestamp)));

    let _ = writeln!(output, "  Session Notes:");
    for log in noted {
        let note = log.notes.as_deref().unwrap_or_default();
        let _ = writeln!(output, "  > {} {}: {}", log.date, log.staff_name, note);
    }
}

pub fn build_dashboard(
    students: &[Student],
    logs: &[LogEntry],
    filter: &PeriodFilter,
    grade: Option<Grade>,
    subject: Option<Subject>,
    notes: bool,
) -> String {
    let filtered: Vec<&LogEntry> = progress::filter_logs(logs, filter);
    let totals = progress::subject_totals(filtered.iter().copied());
    let subjects: Vec<Subject> = match subject {
        Some(subject) => vec![subject],
        None => Subject::ALL.to_vec(),
    };

    let mut output = String::new();
    let _ = writeln!(output, "# IEP Service Minutes");
    let scaling = if filter.is_monthly() {
        "monthly view, goals are 4x weekly"
    } else {
        "weekly view"
    };
    let _ = writeln!(output, "Period: {} ({})", filter.label(), scaling);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Totals");
    for subject in Subject::ALL {
        let _ = writeln!(output, "- {}: {} min", subject, totals.get(subject));
    }
    let _ = writeln!(output, "- All subjects: {} min across {} logs", totals.total(), filtered.len());

    let grades: Vec<Grade> = match grade {
        Some(grade) => vec![grade],
        None => Grade::ALL.to_vec(),
    };

    for grade in grades {
        let mut roster: Vec<&Student> = students.iter().filter(|s| s.grade == grade).collect();
        roster.sort_by(|a, b| a.name.cmp(&b.name));

        let _ = writeln!(output);
        let _ = writeln!(output, "## {} Grade", grade);
        if roster.is_empty() {
            let _ = writeln!(output, "No students in this grade.");
            continue;
        }

        for student in roster {
            let _ = writeln!(output);
            let _ = writeln!(output, "### {} ({})", student.name, student.id);
            for subject in subjects.iter() {
                let progress = progress::student_progress(student, logs, *subject, filter);
                write_progress(&mut output, &progress);
                if notes {
                    write_notes(&mut output, &filtered, student, *subject);
                }
            }
        }
    }

    output
}

pub fn format_history(logs: &[&LogEntry], students: &[Student]) -> String {
    let mut output = String::new();

    if logs.is_empty() {
        let _ = writeln!(output, "No logs recorded for this period.");
        return output;
    }

    for log in logs {
        let student = students
            .iter()
            .find(|s| s.id == log.student_id)
            .map_or(FORMER_STUDENT.to_string(), |s| format!("{} ({})", s.name, s.grade));
        let staff = if log.staff_name.trim().is_empty() {
            progress::UNKNOWN_STAFF
        } else {
            log.staff_name.as_str()
        };
        let _ = write!(
            output,
            "{}  {:<16}  {:<24}  {:<15}  {:>4} min",
            log.date, staff, student, log.subject, log.minutes
        );
        if let Some(notes) = log.notes.as_deref() {
            let _ = write!(output, "  {}", notes);
        }
        let _ = writeln!(output);
    }

    output
}

pub fn format_months(months: &[MonthKey], selected: MonthKey) -> String {
    let mut output = String::new();
    for month in months {
        let marker = if *month == selected { "*" } else { " " };
        let _ = writeln!(output, "{} {}", marker, month);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::demo_roster;
    use crate::progress::StaffSegment;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn log(student_id: &str, minutes: u64, day: NaiveDate, staff: &str) -> LogEntry {
        LogEntry {
            id: format!("{student_id}-{day}"),
            student_id: student_id.to_string(),
            subject: Subject::Math,
            minutes,
            date: day,
            staff_name: staff.to_string(),
            notes: None,
            timestamp: 0,
        }
    }

    #[test]
    fn bar_is_clamped_to_width() {
        let progress = GoalProgress {
            subject: Subject::Math,
            total_minutes: 90,
            effective_goal: 30,
            accomplished: true,
            segments: vec![
                StaffSegment {
                    staff_name: "A".to_string(),
                    minutes: 15,
                    percentage: 50.0,
                },
                StaffSegment {
                    staff_name: "B".to_string(),
                    minutes: 75,
                    percentage: 250.0,
                },
            ],
        };
        assert_eq!(progress_bar(&progress), format!("[{}{}]", "#".repeat(10), "=".repeat(10)));
    }

    #[test]
    fn empty_bar_is_all_dots() {
        let progress = GoalProgress {
            subject: Subject::English,
            total_minutes: 0,
            effective_goal: 30,
            accomplished: false,
            segments: Vec::new(),
        };
        assert_eq!(progress_bar(&progress), format!("[{}]", ".".repeat(20)));
    }

    #[test]
    fn dashboard_reports_goal_status_per_student() {
        let logs = vec![
            log("1", 20, date(2025, 1, 6), "Teacher Alpha"),
            log("1", 15, date(2025, 1, 8), "Teacher Beta"),
        ];
        let filter = PeriodFilter::week(MonthKey::new(2025, 1).unwrap(), date(2025, 1, 6));
        let report = build_dashboard(&demo_roster(), &logs, &filter, Some(Grade::Sixth), Some(Subject::Math), false);

        assert!(report.contains("Period: week of Jan 6 - Jan 12 (weekly view)"));
        assert!(report.contains("- Math: 35 min"));
        assert!(report.contains("### Alex Thompson (1)"));
        assert!(report.contains("- Math: 35 / 30 min"));
        assert!(report.contains("goal met"));
        assert!(report.contains("  - Teacher Alpha: 20 min (66.7%)"));
        assert!(report.contains("### Sam Rivera (4)"));
        assert!(!report.contains("## 7th Grade"));
    }

    #[test]
    fn dashboard_handles_empty_grade_and_zero_goal() {
        let filter = PeriodFilter::month(MonthKey::new(2025, 1).unwrap());
        let report = build_dashboard(&demo_roster()[..1], &[], &filter, None, Some(Subject::TaskCompletion), false);
        assert!(report.contains("monthly view"));
        assert!(report.contains("- Task Completion: 0 / 40 min"));
        assert!(report.contains("## 8th Grade\nNo students in this grade."));

        let report = build_dashboard(&demo_roster()[1..2], &[], &filter, None, Some(Subject::TaskCompletion), false);
        assert!(report.contains("- Task Completion: 0 min (no goal set)"));
    }

    #[test]
    fn dashboard_lists_session_notes_newest_first() {
        let mut early = log("1", 20, date(2025, 1, 6), "Teacher Alpha");
        early.notes = Some("fractions".to_string());
        let mut late = log("1", 10, date(2025, 1, 9), "Teacher Beta");
        late.notes = Some("word problems".to_string());
        let quiet = log("1", 5, date(2025, 1, 7), "Teacher Alpha");
        let mut other_month = log("1", 5, date(2025, 2, 3), "Teacher Alpha");
        other_month.notes = Some("next month".to_string());
        let logs = vec![early, quiet, late, other_month];
        let filter = PeriodFilter::month(MonthKey::new(2025, 1).unwrap());

        let report = build_dashboard(&demo_roster()[..1], &logs, &filter, Some(Grade::Sixth), None, true);
        let newest = report.find("> 2025-01-09 Teacher Beta: word problems").unwrap();
        let oldest = report.find("> 2025-01-06 Teacher Alpha: fractions").unwrap();
        assert!(newest < oldest);
        assert_eq!(report.matches("Session Notes:").count(), 1);
        assert!(!report.contains("next month"));

        let plain = build_dashboard(&demo_roster()[..1], &logs, &filter, Some(Grade::Sixth), None, false);
        assert!(!plain.contains("Session Notes:"));
    }

    #[test]
    fn history_marks_former_students() {
        let logs = vec![log("gone", 10, date(2025, 1, 6), ""), log("2", 5, date(2025, 1, 7), "Teacher Beta")];
        let refs: Vec<&LogEntry> = logs.iter().collect();
        let text = format_history(&refs, &demo_roster());
        assert!(text.contains(FORMER_STUDENT));
        assert!(text.contains("Maya Rodriguez (7th)"));
        assert!(text.contains("Unknown"));
        assert_eq!(format_history(&[], &[]), "No logs recorded for this period.\n");
    }

    #[test]
    fn month_list_marks_selection() {
        let jan = MonthKey::new(2025, 1).unwrap();
        let feb = MonthKey::new(2025, 2).unwrap();
        assert_eq!(format_months(&[jan, feb], feb), "  January 2025\n* February 2025\n");
    }
}
