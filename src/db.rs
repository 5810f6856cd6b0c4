use std::collections::BTreeSet;

use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::grading::{self, FeedbackInput};
use crate::models::{
    Assignment, DashboardCounts, FeedbackSummary, GradeRecord, Role, SimilarityResult,
    StudentAssignment, StudentSubmission, SubmissionRecord, SubmissionStatus, TextSubmission,
    User,
};
use crate::similarity;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("6b1f0f5e-8a0e-4d5c-9a7e-2f1c3b4d5e60")?,
            "Morgan Reyes",
            "morgan.reyes@school.example",
            Role::Teacher,
        ),
        (
            Uuid::parse_str("1c9e7a52-3f4b-4e8d-a1b2-c3d4e5f60718")?,
            "Sam Okafor",
            "sam.okafor@school.example",
            Role::Student,
        ),
        (
            Uuid::parse_str("9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d")?,
            "Priya Nair",
            "priya.nair@school.example",
            Role::Student,
        ),
    ];

    for (id, name, email, role) in &users {
        sqlx::query(
            r#"
            INSERT INTO smart_assignments.users (id, full_name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .execute(pool)
        .await?;
    }

    let assignment_id = Uuid::parse_str("4f3e2d1c-0b9a-4876-9543-210fedcba987")?;
    let due_date = grading::parse_due_date("2026-11-20T17:00")?;
    sqlx::query(
        r#"
        INSERT INTO smart_assignments.assignments (id, title, description, due_date, teacher_id)
        SELECT $1, $2, $3, $4, id FROM smart_assignments.users WHERE email = $5
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(assignment_id)
    .bind("Reflections on the water cycle")
    .bind("Describe the water cycle in your own words, in at least five sentences.")
    .bind(due_date)
    .bind(users[0].2)
    .execute(pool)
    .await?;

    let responses = [
        (
            users[1].2,
            "Water evaporates from the ocean, condenses into clouds and falls back as rain.",
        ),
        (
            users[2].2,
            "Water evaporates from lakes, condenses into clouds and returns to the ground as snow or rain.",
        ),
    ];

    for (email, text) in responses {
        let student_id: Uuid =
            sqlx::query("SELECT id FROM smart_assignments.users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?
                .get("id");

        sqlx::query(
            r#"
            INSERT INTO smart_assignments.submissions (id, assignment_id, student_id, text_response)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (assignment_id, student_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(assignment_id)
        .bind(student_id)
        .bind(text)
        .execute(pool)
        .await?;
    }

    refresh_assignment_scores(pool, assignment_id).await?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("full_name"),
        email: row.get("email"),
        role: role.parse::<Role>()?,
        created_at: row.get("created_at"),
    })
}

fn assignment_from_row(row: &PgRow) -> Assignment {
    Assignment {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        due_date: row.get("due_date"),
        created_at: row.get("created_at"),
        teacher_id: row.get("teacher_id"),
    }
}

pub async fn register_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let name = name.trim();
    let email = grading::normalize_email(email);
    if name.is_empty() || email.is_empty() {
        anyhow::bail!("All fields are required.");
    }

    if find_user(pool, &email).await?.is_some() {
        anyhow::bail!("Email already registered: {email}");
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO smart_assignments.users (id, full_name, email, role)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(&email)
    .bind(role.as_str())
    .execute(pool)
    .await?;

    info!(%email, %role, "registered user");
    Ok(id)
}

pub async fn find_user<'e, E>(executor: E, email: &str) -> anyhow::Result<Option<User>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id, full_name, email, role, created_at FROM smart_assignments.users WHERE email = $1",
    )
    .bind(grading::normalize_email(email))
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn require_user(pool: &PgPool, email: &str) -> anyhow::Result<User> {
    find_user(pool, email)
        .await?
        .with_context(|| format!("no user registered with email {email}"))
}

pub async fn create_assignment(
    pool: &PgPool,
    teacher_id: Uuid,
    title: &str,
    description: &str,
    due_date: NaiveDateTime,
) -> anyhow::Result<Uuid> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() || description.is_empty() {
        anyhow::bail!("All fields are required.");
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO smart_assignments.assignments (id, title, description, due_date, teacher_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(due_date)
    .bind(teacher_id)
    .execute(pool)
    .await?;

    info!(%id, title, "created assignment");
    Ok(id)
}

pub async fn fetch_assignment<'e, E>(executor: E, id: Uuid) -> anyhow::Result<Option<Assignment>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT id, title, description, due_date, created_at, teacher_id
        FROM smart_assignments.assignments
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.as_ref().map(assignment_from_row))
}

pub async fn require_assignment<'e, E>(executor: E, id: Uuid) -> anyhow::Result<Assignment>
where
    E: PgExecutor<'e>,
{
    fetch_assignment(executor, id)
        .await?
        .with_context(|| format!("assignment {id} not found"))
}

pub async fn list_teacher_assignments(
    pool: &PgPool,
    teacher_id: Uuid,
) -> anyhow::Result<Vec<Assignment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, description, due_date, created_at, teacher_id
        FROM smart_assignments.assignments
        WHERE teacher_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(teacher_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(assignment_from_row).collect())
}

pub async fn list_student_assignments(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<StudentAssignment>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.title, a.due_date, s.status, s.plagiarism_score
        FROM smart_assignments.assignments a
        LEFT JOIN smart_assignments.submissions s
            ON s.assignment_id = a.id AND s.student_id = $1
        ORDER BY a.due_date ASC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut assignments = Vec::with_capacity(rows.len());
    for row in rows {
        let status: Option<String> = row.get("status");
        assignments.push(StudentAssignment {
            assignment_id: row.get("id"),
            title: row.get("title"),
            due_date: row.get("due_date"),
            status: status
                .map(|value| value.parse::<SubmissionStatus>())
                .transpose()?,
            plagiarism_score: row.get("plagiarism_score"),
        });
    }

    Ok(assignments)
}

/// Create or refresh a student's submission.
///
/// A blank `text_response` keeps the previously stored text and a missing
/// `file_path` keeps the previous file. The status goes back to `submitted`.
pub async fn upsert_submission(
    conn: &mut PgConnection,
    assignment_id: Uuid,
    student_id: Uuid,
    text_response: &str,
    file_path: Option<&str>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO smart_assignments.submissions AS s
        (id, assignment_id, student_id, text_response, file_path)
        VALUES ($1, $2, $3, NULLIF($4, ''), $5)
        ON CONFLICT (assignment_id, student_id) DO UPDATE
        SET text_response = COALESCE(EXCLUDED.text_response, s.text_response),
            file_path = COALESCE(EXCLUDED.file_path, s.file_path),
            submitted_at = NOW() AT TIME ZONE 'utc',
            status = 'submitted'
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(assignment_id)
    .bind(student_id)
    .bind(text_response.trim())
    .bind(file_path)
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    debug!(%id, %assignment_id, %student_id, "saved submission");
    Ok(id)
}

/// Save a submission and its overlap score in one transaction.
pub async fn submit(
    pool: &PgPool,
    assignment_id: Uuid,
    student_id: Uuid,
    text_response: &str,
    file_path: Option<&str>,
) -> anyhow::Result<(Uuid, SimilarityResult)> {
    let mut tx = pool.begin().await?;
    let submission_id =
        upsert_submission(&mut tx, assignment_id, student_id, text_response, file_path).await?;
    let result = rescore_submission(&mut tx, assignment_id, submission_id).await?;
    tx.commit().await?;
    Ok((submission_id, result))
}

pub async fn fetch_submission_texts(
    conn: &mut PgConnection,
    assignment_id: Uuid,
) -> anyhow::Result<Vec<TextSubmission>> {
    let rows = sqlx::query(
        r#"
        SELECT id, assignment_id, text_response
        FROM smart_assignments.submissions
        WHERE assignment_id = $1
        "#,
    )
    .bind(assignment_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TextSubmission {
            id: row.get("id"),
            assignment_id: row.get("assignment_id"),
            text: row.get("text_response"),
        })
        .collect())
}

pub async fn set_plagiarism_scores(
    conn: &mut PgConnection,
    scores: &[(Uuid, f64)],
) -> anyhow::Result<()> {
    for (id, score) in scores {
        sqlx::query("UPDATE smart_assignments.submissions SET plagiarism_score = $2 WHERE id = $1")
            .bind(id)
            .bind(score)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Score one submission against the rest of its assignment and store it.
pub async fn rescore_submission(
    conn: &mut PgConnection,
    assignment_id: Uuid,
    submission_id: Uuid,
) -> anyhow::Result<SimilarityResult> {
    let pool_texts = fetch_submission_texts(conn, assignment_id).await?;
    let target = pool_texts
        .iter()
        .find(|s| s.id == submission_id)
        .with_context(|| format!("submission {submission_id} not found"))?;

    let candidates = similarity::candidates_for(target, &pool_texts);
    let result = similarity::assess(target, &candidates);
    set_plagiarism_scores(conn, &[(submission_id, result.score)]).await?;

    debug!(%submission_id, score = result.score, "rescored submission");
    Ok(result)
}

/// Score every submission of the assignment and store the results.
pub async fn rescore_assignment(
    conn: &mut PgConnection,
    assignment_id: Uuid,
) -> anyhow::Result<Vec<(Uuid, SimilarityResult)>> {
    let pool_texts = fetch_submission_texts(conn, assignment_id).await?;
    let results = similarity::score_pool(&pool_texts);

    let scores: Vec<(Uuid, f64)> = results.iter().map(|(id, r)| (*id, r.score)).collect();
    set_plagiarism_scores(conn, &scores).await?;

    info!(%assignment_id, submissions = results.len(), "rescored assignment");
    Ok(results)
}

/// [`rescore_assignment`] in its own transaction.
pub async fn refresh_assignment_scores(
    pool: &PgPool,
    assignment_id: Uuid,
) -> anyhow::Result<Vec<(Uuid, SimilarityResult)>> {
    let mut tx = pool.begin().await?;
    let results = rescore_assignment(&mut tx, assignment_id).await?;
    tx.commit().await?;
    Ok(results)
}

pub async fn fetch_submission_assignment(
    pool: &PgPool,
    submission_id: Uuid,
) -> anyhow::Result<Assignment> {
    let assignment_id: Uuid =
        sqlx::query("SELECT assignment_id FROM smart_assignments.submissions WHERE id = $1")
            .bind(submission_id)
            .fetch_optional(pool)
            .await?
            .with_context(|| format!("submission {submission_id} not found"))?
            .get("assignment_id");

    require_assignment(pool, assignment_id).await
}

/// Create or update the feedback for a submission and mark it graded.
pub async fn save_feedback(
    pool: &PgPool,
    submission_id: Uuid,
    teacher_id: Uuid,
    feedback: &FeedbackInput,
) -> anyhow::Result<()> {
    feedback.validate()?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO smart_assignments.feedback
        (id, submission_id, teacher_id, score, max_score,
         rubric_clarity, rubric_completion, rubric_presentation, comments)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (submission_id) DO UPDATE
        SET score = EXCLUDED.score,
            max_score = EXCLUDED.max_score,
            rubric_clarity = EXCLUDED.rubric_clarity,
            rubric_completion = EXCLUDED.rubric_completion,
            rubric_presentation = EXCLUDED.rubric_presentation,
            comments = EXCLUDED.comments
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(submission_id)
    .bind(teacher_id)
    .bind(feedback.score)
    .bind(feedback.max_score)
    .bind(feedback.rubric_clarity)
    .bind(feedback.rubric_completion)
    .bind(feedback.rubric_presentation)
    .bind(feedback.comments.trim())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE smart_assignments.submissions SET status = 'graded' WHERE id = $1")
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(%submission_id, score = feedback.score, "saved feedback");
    Ok(())
}

pub async fn fetch_submission_records(
    pool: &PgPool,
    assignment_id: Uuid,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, u.full_name, u.email, s.text_response, s.file_path,
               s.submitted_at, s.status, s.plagiarism_score,
               f.score, f.max_score, f.rubric_clarity, f.rubric_completion,
               f.rubric_presentation, f.comments
        FROM smart_assignments.submissions s
        JOIN smart_assignments.users u ON u.id = s.student_id
        LEFT JOIN smart_assignments.feedback f ON f.submission_id = s.id
        WHERE s.assignment_id = $1
        ORDER BY s.submitted_at ASC
        "#,
    )
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        let feedback = feedback_from_row(&row);

        records.push(SubmissionRecord {
            submission_id: row.get("id"),
            student_name: row.get("full_name"),
            student_email: row.get("email"),
            text_response: row.get("text_response"),
            file_path: row.get("file_path"),
            submitted_at: row.get("submitted_at"),
            status: status.parse::<SubmissionStatus>()?,
            plagiarism_score: row.get("plagiarism_score"),
            feedback,
        });
    }

    Ok(records)
}

fn feedback_from_row(row: &PgRow) -> Option<FeedbackSummary> {
    let score: Option<f64> = row.get("score");
    let max_score: Option<f64> = row.get("max_score");
    match (score, max_score) {
        (Some(score), Some(max_score)) => Some(FeedbackSummary {
            score,
            max_score,
            rubric_clarity: row.get("rubric_clarity"),
            rubric_completion: row.get("rubric_completion"),
            rubric_presentation: row.get("rubric_presentation"),
            comments: row.get("comments"),
        }),
        _ => None,
    }
}

pub async fn fetch_student_submissions(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<StudentSubmission>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, a.title, s.submitted_at, s.status, s.plagiarism_score, s.file_path,
               f.score, f.max_score, f.rubric_clarity, f.rubric_completion,
               f.rubric_presentation, f.comments
        FROM smart_assignments.submissions s
        JOIN smart_assignments.assignments a ON a.id = s.assignment_id
        LEFT JOIN smart_assignments.feedback f ON f.submission_id = s.id
        WHERE s.student_id = $1
        ORDER BY s.submitted_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut submissions = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        submissions.push(StudentSubmission {
            submission_id: row.get("id"),
            assignment_title: row.get("title"),
            submitted_at: row.get("submitted_at"),
            status: status.parse::<SubmissionStatus>()?,
            plagiarism_score: row.get("plagiarism_score"),
            file_path: row.get("file_path"),
            feedback: feedback_from_row(&row),
        });
    }

    Ok(submissions)
}

pub async fn fetch_student_grades(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<GradeRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT a.title, f.score, f.max_score
        FROM smart_assignments.submissions s
        JOIN smart_assignments.assignments a ON a.id = s.assignment_id
        JOIN smart_assignments.feedback f ON f.submission_id = s.id
        WHERE s.student_id = $1
        ORDER BY s.submitted_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| GradeRecord {
            assignment_title: row.get("title"),
            score: row.get("score"),
            max_score: row.get("max_score"),
        })
        .collect())
}

pub async fn dashboard_counts(pool: &PgPool, teacher_id: Uuid) -> anyhow::Result<DashboardCounts> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM smart_assignments.assignments WHERE teacher_id = $1)
                AS total_assignments,
            COUNT(s.id) AS total_submissions,
            COUNT(s.id) FILTER (WHERE s.status = 'graded') AS graded_submissions
        FROM smart_assignments.submissions s
        JOIN smart_assignments.assignments a ON a.id = s.assignment_id
        WHERE a.teacher_id = $1
        "#,
    )
    .bind(teacher_id)
    .fetch_one(pool)
    .await?;

    let total_submissions: i64 = row.get("total_submissions");
    let graded_submissions: i64 = row.get("graded_submissions");
    Ok(DashboardCounts {
        total_assignments: row.get("total_assignments"),
        total_submissions,
        graded_submissions,
        pending_submissions: total_submissions - graded_submissions,
    })
}

/// Import text submissions from CSV in a single transaction.
///
/// Every row is parsed before anything is written, and the overlap scores of
/// each touched assignment are refreshed before commit.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_name: String,
        student_email: String,
        assignment_id: Uuid,
        text_response: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows: Vec<CsvRow> = reader
        .deserialize()
        .collect::<Result<_, _>>()
        .with_context(|| format!("failed to parse {}", csv_path.display()))?;

    let mut tx = pool.begin().await?;
    let mut touched = BTreeSet::new();

    for (line, row) in rows.iter().enumerate() {
        let email = grading::normalize_email(&row.student_email);
        let name = row.student_name.trim();
        if name.is_empty() || email.is_empty() {
            anyhow::bail!("row {}: student name and email are required", line + 1);
        }
        if !touched.contains(&row.assignment_id) {
            require_assignment(&mut *tx, row.assignment_id).await?;
        }

        let existing = find_user(&mut *tx, &email).await?;
        grading::ensure_importable_student(&email, existing.as_ref())?;

        let student_id = match existing {
            Some(student) => {
                sqlx::query("UPDATE smart_assignments.users SET full_name = $2 WHERE id = $1")
                    .bind(student.id)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                student.id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO smart_assignments.users (id, full_name, email, role)
                    VALUES ($1, $2, $3, 'student')
                    "#,
                )
                .bind(id)
                .bind(name)
                .bind(&email)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        upsert_submission(&mut tx, row.assignment_id, student_id, &row.text_response, None)
            .await?;
        touched.insert(row.assignment_id);
    }

    for assignment_id in touched {
        rescore_assignment(&mut tx, assignment_id).await?;
    }
    tx.commit().await?;

    Ok(rows.len())
}
