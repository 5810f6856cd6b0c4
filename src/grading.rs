use chrono::NaiveDateTime;

use crate::models::{
    Assignment, GradeLine, GradeRecord, Role, StudentAnalytics, SubmissionStatus, User,
};
use crate::similarity::round2;

pub const RUBRIC_MIN: i32 = 1;
pub const RUBRIC_MAX: i32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackInput {
    pub score: f64,
    pub max_score: f64,
    pub rubric_clarity: i32,
    pub rubric_completion: i32,
    pub rubric_presentation: i32,
    pub comments: String,
}

impl FeedbackInput {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.score.is_finite() || !self.max_score.is_finite() {
            anyhow::bail!("Please enter valid numeric values for scores and rubrics.");
        }

        let rubric = [
            self.rubric_clarity,
            self.rubric_completion,
            self.rubric_presentation,
        ];
        if rubric
            .iter()
            .any(|value| !(RUBRIC_MIN..=RUBRIC_MAX).contains(value))
        {
            anyhow::bail!("Rubric values must be between {RUBRIC_MIN} and {RUBRIC_MAX}.");
        }

        Ok(())
    }
}

pub fn ensure_role(user: &User, role: Role) -> anyhow::Result<()> {
    if user.role != role {
        anyhow::bail!(
            "{} is a {}, this action requires a {}",
            user.email,
            user.role,
            role
        );
    }
    Ok(())
}

pub fn ensure_owner(teacher: &User, assignment: &Assignment) -> anyhow::Result<()> {
    if assignment.teacher_id != teacher.id {
        anyhow::bail!(
            "{} does not have permission to manage assignment '{}'",
            teacher.email,
            assignment.title
        );
    }
    Ok(())
}

/// CSV imports may create or rename students but never touch other accounts.
pub fn ensure_importable_student(email: &str, existing: Option<&User>) -> anyhow::Result<()> {
    match existing {
        Some(user) if user.role != Role::Student => {
            anyhow::bail!("{email} is registered as a {} and cannot submit work", user.role)
        }
        _ => Ok(()),
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn parse_due_date(value: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M")
        .map_err(|_| anyhow::anyhow!("Invalid due date format, expected YYYY-MM-DDTHH:MM."))
}

pub fn percent(score: f64, max_score: f64) -> f64 {
    if max_score == 0.0 {
        return 0.0;
    }
    round2(score / max_score * 100.0)
}

pub fn student_analytics(grades: &[GradeRecord]) -> StudentAnalytics {
    let mut total_score = 0.0;
    let mut total_max = 0.0;
    let mut lines = Vec::with_capacity(grades.len());

    for grade in grades {
        lines.push(GradeLine {
            assignment_title: grade.assignment_title.clone(),
            score: grade.score,
            max_score: grade.max_score,
            percent: percent(grade.score, grade.max_score),
        });
        total_score += grade.score;
        total_max += grade.max_score;
    }

    StudentAnalytics {
        lines,
        overall_percent: percent(total_score, total_max),
    }
}

/// Label shown on the student's assignment list.
pub fn assignment_state(
    status: Option<SubmissionStatus>,
    due_date: NaiveDateTime,
    now: NaiveDateTime,
) -> &'static str {
    match status {
        Some(SubmissionStatus::Graded) => "graded",
        Some(SubmissionStatus::Submitted) => "submitted",
        None if now > due_date => "overdue",
        None => "open",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn feedback(clarity: i32) -> FeedbackInput {
        FeedbackInput {
            score: 8.0,
            max_score: 10.0,
            rubric_clarity: clarity,
            rubric_completion: 3,
            rubric_presentation: 5,
            comments: String::new(),
        }
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Dana Ortiz".to_string(),
            email: "dana@example.com".to_string(),
            role,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn rubric_bounds_are_inclusive() {
        assert!(feedback(1).validate().is_ok());
        assert!(feedback(5).validate().is_ok());
        assert!(feedback(0).validate().is_err());
        assert!(feedback(6).validate().is_err());
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let mut input = feedback(3);
        input.score = f64::NAN;
        assert!(input.validate().is_err());
    }

    #[test]
    fn percent_handles_zero_max() {
        assert_eq!(percent(7.0, 0.0), 0.0);
        assert_eq!(percent(2.0, 3.0), 66.67);
    }

    #[test]
    fn percent_ties_round_to_even() {
        assert_eq!(percent(1.0, 32.0), 3.12);
        assert_eq!(percent(3.0, 32.0), 9.38);
    }

    #[test]
    fn analytics_weights_overall_by_max_score() {
        let grades = vec![
            GradeRecord {
                assignment_title: "Essay".to_string(),
                score: 9.0,
                max_score: 10.0,
            },
            GradeRecord {
                assignment_title: "Lab".to_string(),
                score: 45.0,
                max_score: 90.0,
            },
        ];
        let analytics = student_analytics(&grades);
        assert_eq!(analytics.lines[0].percent, 90.0);
        assert_eq!(analytics.lines[1].percent, 50.0);
        assert_eq!(analytics.overall_percent, 54.0);
    }

    #[test]
    fn analytics_without_grades_is_zero() {
        let analytics = student_analytics(&[]);
        assert!(analytics.lines.is_empty());
        assert_eq!(analytics.overall_percent, 0.0);
    }

    #[test]
    fn due_date_uses_minute_precision() {
        let parsed = parse_due_date("2026-03-01T09:30").unwrap();
        assert_eq!(parsed.to_string(), "2026-03-01 09:30:00");
        assert!(parse_due_date("March 1st").is_err());
    }

    #[test]
    fn role_and_owner_checks() {
        let teacher = user(Role::Teacher);
        let student = user(Role::Student);
        assert!(ensure_role(&teacher, Role::Teacher).is_ok());
        assert!(ensure_role(&student, Role::Teacher).is_err());

        let now = Utc::now().naive_utc();
        let assignment = Assignment {
            id: Uuid::new_v4(),
            title: "Essay".to_string(),
            description: "Write".to_string(),
            due_date: now,
            created_at: now,
            teacher_id: teacher.id,
        };
        assert!(ensure_owner(&teacher, &assignment).is_ok());
        assert!(ensure_owner(&user(Role::Teacher), &assignment).is_err());
    }

    #[test]
    fn imports_refuse_teacher_accounts() {
        let teacher = user(Role::Teacher);
        let student = user(Role::Student);
        assert!(ensure_importable_student(&teacher.email, Some(&teacher)).is_err());
        assert!(ensure_importable_student(&student.email, Some(&student)).is_ok());
        assert!(ensure_importable_student("new@example.com", None).is_ok());
    }

    #[test]
    fn unsubmitted_work_past_due_is_overdue() {
        let now = Utc::now().naive_utc();
        let past = now - Duration::days(1);
        let future = now + Duration::days(1);
        assert_eq!(assignment_state(None, past, now), "overdue");
        assert_eq!(assignment_state(None, future, now), "open");
        assert_eq!(
            assignment_state(Some(SubmissionStatus::Submitted), past, now),
            "submitted"
        );
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Dana@Example.COM "), "dana@example.com");
    }
}
