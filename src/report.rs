use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::grading;
use crate::models::{
    Assignment, FeedbackSummary, StudentAssignment, StudentSubmission, SubmissionRecord,
    SubmissionStatus,
};
use crate::similarity;

/// Number of flagged submissions and how many are still ungraded.
pub fn summarize(records: &[SubmissionRecord], threshold: f64) -> (usize, usize, usize) {
    let flagged = records
        .iter()
        .filter(|r| similarity::is_flagged(r.plagiarism_score, threshold))
        .count();
    let graded = records
        .iter()
        .filter(|r| r.status == SubmissionStatus::Graded)
        .count();
    (flagged, graded, records.len() - graded)
}

pub fn build_report(
    assignment: &Assignment,
    threshold: f64,
    records: &[SubmissionRecord],
) -> String {
    let (flagged, graded, pending) = summarize(records, threshold);

    let mut output = String::new();
    let _ = writeln!(output, "# Assignment Report: {}", assignment.title);
    let _ = writeln!(
        output,
        "Due {} ({} submissions, {} graded, {} pending)",
        assignment.due_date.format("%Y-%m-%d %H:%M"),
        records.len(),
        graded,
        pending
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", assignment.description);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Possible Plagiarism (above {threshold:.0}%)");

    let mut by_score: Vec<&SubmissionRecord> = records
        .iter()
        .filter(|r| similarity::is_flagged(r.plagiarism_score, threshold))
        .collect();
    by_score.sort_by(|a, b| {
        b.plagiarism_score
            .partial_cmp(&a.plagiarism_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if flagged == 0 {
        let _ = writeln!(output, "No submissions above the threshold.");
    } else {
        for record in by_score {
            let _ = writeln!(
                output,
                "- {} ({}) overlap {:.2}%",
                record.student_name, record.student_email, record.plagiarism_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Submissions");

    if records.is_empty() {
        let _ = writeln!(output, "No submissions yet.");
    } else {
        for record in records {
            let grade = match &record.feedback {
                Some(feedback) => format!("{:.1}/{:.1}", feedback.score, feedback.max_score),
                None => "ungraded".to_string(),
            };
            let _ = writeln!(
                output,
                "- {} ({}) submitted {}: {}, overlap {:.2}%",
                record.student_name,
                record.student_email,
                record.submitted_at.format("%Y-%m-%d %H:%M"),
                grade,
                record.plagiarism_score
            );
            if let Some(file) = &record.file_path {
                let _ = writeln!(output, "  - attachment: {file}");
            }
            if let Some(feedback) = &record.feedback {
                write_feedback(&mut output, feedback);
            }
        }
    }

    output
}

/// One row of the student's assignment list, with the stored overlap once submitted.
pub fn student_assignment_line(assignment: &StudentAssignment, now: NaiveDateTime) -> String {
    let state = grading::assignment_state(assignment.status, assignment.due_date, now);
    let mut line = format!(
        "- {} {} (due {}): {}",
        assignment.assignment_id,
        assignment.title,
        assignment.due_date.format("%Y-%m-%d %H:%M"),
        state
    );
    if let Some(score) = assignment.plagiarism_score {
        let _ = write!(line, ", overlap {score:.2}%");
    }
    line
}

/// A student's own submissions with grades, rubric scores and comments.
pub fn build_submission_history(submissions: &[StudentSubmission]) -> String {
    let mut output = String::new();

    if submissions.is_empty() {
        let _ = writeln!(output, "No submissions yet.");
        return output;
    }

    for submission in submissions {
        let grade = match &submission.feedback {
            Some(feedback) => format!(
                "{:.1}/{:.1} ({:.2}%)",
                feedback.score,
                feedback.max_score,
                grading::percent(feedback.score, feedback.max_score)
            ),
            None => submission.status.as_str().to_string(),
        };
        let _ = writeln!(
            output,
            "- {} submitted {}: {}, overlap {:.2}%",
            submission.assignment_title,
            submission.submitted_at.format("%Y-%m-%d %H:%M"),
            grade,
            submission.plagiarism_score
        );
        if let Some(file) = &submission.file_path {
            let _ = writeln!(output, "  - attachment: {file}");
        }
        if let Some(feedback) = &submission.feedback {
            write_feedback(&mut output, feedback);
        }
    }

    output
}

fn write_feedback(output: &mut String, feedback: &FeedbackSummary) {
    let _ = writeln!(
        output,
        "  - rubric: clarity {}/5, completion {}/5, presentation {}/5",
        feedback.rubric_clarity, feedback.rubric_completion, feedback.rubric_presentation
    );
    if let Some(comments) = feedback.comments.as_deref().filter(|c| !c.is_empty()) {
        let _ = writeln!(output, "  - feedback: {comments}");
    }
}
