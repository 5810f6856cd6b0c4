use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => anyhow::bail!("unknown role '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Graded => "graded",
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "submitted" => Ok(SubmissionStatus::Submitted),
            "graded" => Ok(SubmissionStatus::Graded),
            other => anyhow::bail!("unknown submission status '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub teacher_id: Uuid,
}

/// Snapshot of a submission's text handed to the similarity scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSubmission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimilarityResult {
    /// Percentage in `[0, 100]`, rounded to two decimals.
    pub score: f64,
    /// Candidate that produced the maximum, if any contributed.
    pub closest: Option<Uuid>,
}

/// Submission row joined with its student and feedback, for reports.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub submission_id: Uuid,
    pub student_name: String,
    pub student_email: String,
    pub text_response: Option<String>,
    pub file_path: Option<String>,
    pub submitted_at: NaiveDateTime,
    pub status: SubmissionStatus,
    pub plagiarism_score: f64,
    pub feedback: Option<FeedbackSummary>,
}

#[derive(Debug, Clone)]
pub struct FeedbackSummary {
    pub score: f64,
    pub max_score: f64,
    pub rubric_clarity: i32,
    pub rubric_completion: i32,
    pub rubric_presentation: i32,
    pub comments: Option<String>,
}

/// One of a student's own submissions, newest first in listings.
#[derive(Debug, Clone)]
pub struct StudentSubmission {
    pub submission_id: Uuid,
    pub assignment_title: String,
    pub submitted_at: NaiveDateTime,
    pub status: SubmissionStatus,
    pub plagiarism_score: f64,
    pub file_path: Option<String>,
    pub feedback: Option<FeedbackSummary>,
}

/// Graded submission as seen from the student's analytics page.
#[derive(Debug, Clone)]
pub struct GradeRecord {
    pub assignment_title: String,
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeLine {
    pub assignment_title: String,
    pub score: f64,
    pub max_score: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalytics {
    pub lines: Vec<GradeLine>,
    pub overall_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardCounts {
    pub total_assignments: i64,
    pub total_submissions: i64,
    pub graded_submissions: i64,
    pub pending_submissions: i64,
}

/// Row of the student's assignment list.
#[derive(Debug, Clone)]
pub struct StudentAssignment {
    pub assignment_id: Uuid,
    pub title: String,
    pub due_date: NaiveDateTime,
    pub status: Option<SubmissionStatus>,
    pub plagiarism_score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Teacher, Role::Student] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn status_parses_stored_values() {
        assert_eq!(
            "graded".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Graded
        );
        assert!("late".parse::<SubmissionStatus>().is_err());
    }
}
