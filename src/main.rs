use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use smart_assignments::config::{self, Config};
use smart_assignments::grading::{self, FeedbackInput};
use smart_assignments::models::{Assignment, Role};
use smart_assignments::{db, report, similarity, uploads};

#[derive(Parser)]
#[command(name = "smart-assignments")]
#[command(about = "Classroom assignments, grading and submission overlap checks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo class with one assignment
    Seed,
    /// Register a teacher or student
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_enum)]
        role: Role,
    },
    /// Create an assignment as a teacher
    CreateAssignment {
        #[arg(long)]
        teacher_email: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Due date as YYYY-MM-DDTHH:MM
        #[arg(long)]
        due: String,
    },
    /// Submit or resubmit work for an assignment
    #[command(group(
        ArgGroup::new("response")
            .args(["text", "text_file"])
            .multiple(false)
    ))]
    Submit {
        #[arg(long)]
        assignment_id: Uuid,
        #[arg(long)]
        email: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        text_file: Option<PathBuf>,
        /// Attachment (pdf, png, jpg, jpeg, gif)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Grade a submission and leave feedback
    Grade {
        #[arg(long)]
        submission_id: Uuid,
        #[arg(long)]
        teacher_email: String,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value_t = 100.0)]
        max_score: f64,
        #[arg(long, default_value_t = 3)]
        clarity: i32,
        #[arg(long, default_value_t = 3)]
        completion: i32,
        #[arg(long, default_value_t = 3)]
        presentation: i32,
        #[arg(long, default_value = "")]
        comments: String,
    },
    /// Recompute overlap scores for every submission of an assignment
    Similarity {
        #[arg(long)]
        assignment_id: Uuid,
        #[arg(long)]
        teacher_email: String,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Show a teacher's assignments and grading totals
    Dashboard {
        #[arg(long)]
        teacher_email: String,
    },
    /// List assignments with a student's submission status
    Assignments {
        #[arg(long)]
        email: String,
    },
    /// List a student's own submissions with feedback, newest first
    Submissions {
        #[arg(long)]
        email: String,
    },
    /// Show a student's grades
    Analytics {
        #[arg(long)]
        email: String,
        #[arg(long)]
        json: bool,
    },
    /// Import text submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate a markdown report for an assignment
    Report {
        #[arg(long)]
        assignment_id: Uuid,
        #[arg(long)]
        teacher_email: String,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smart_assignments=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Register { name, email, role } => {
            let id = db::register_user(&pool, &name, &email, role).await?;
            println!("Registered {role} {} ({id}).", grading::normalize_email(&email));
        }
        Commands::CreateAssignment {
            teacher_email,
            title,
            description,
            due,
        } => {
            let teacher = db::require_user(&pool, &teacher_email).await?;
            grading::ensure_role(&teacher, Role::Teacher)?;
            let due_date = grading::parse_due_date(&due)?;
            let id = db::create_assignment(&pool, teacher.id, &title, &description, due_date)
                .await?;
            println!("Assignment created: {id}");
        }
        Commands::Submit {
            assignment_id,
            email,
            text,
            text_file,
            file,
        } => {
            let student = db::require_user(&pool, &email).await?;
            grading::ensure_role(&student, Role::Student)?;
            let assignment = db::require_assignment(&pool, assignment_id).await?;

            let text = match (text, text_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => String::new(),
            };

            let stored_file = match file {
                Some(path) => Some(uploads::store_upload(
                    &config.upload_dir,
                    config.max_content_length,
                    student.id,
                    assignment.id,
                    &path,
                )?),
                None => None,
            };

            let saved = db::submit(
                &pool,
                assignment.id,
                student.id,
                &text,
                stored_file.as_deref(),
            )
            .await;
            let (submission_id, result) = match saved {
                Ok(saved) => saved,
                Err(err) => {
                    if let Some(filename) = &stored_file {
                        if let Err(cleanup) = uploads::discard_upload(&config.upload_dir, filename)
                        {
                            warn!(error = %cleanup, "failed to discard upload");
                        }
                    }
                    return Err(err);
                }
            };

            if similarity::is_flagged(result.score, config.plagiarism_threshold) {
                warn!(%submission_id, score = result.score, "submission overlaps heavily with another");
            }
            println!(
                "Submission {submission_id} saved for '{}' (overlap {:.2}%).",
                assignment.title, result.score
            );
        }
        Commands::Grade {
            submission_id,
            teacher_email,
            score,
            max_score,
            clarity,
            completion,
            presentation,
            comments,
        } => {
            let teacher = db::require_user(&pool, &teacher_email).await?;
            grading::ensure_role(&teacher, Role::Teacher)?;
            let assignment = db::fetch_submission_assignment(&pool, submission_id).await?;
            grading::ensure_owner(&teacher, &assignment)?;

            let feedback = FeedbackInput {
                score,
                max_score,
                rubric_clarity: clarity,
                rubric_completion: completion,
                rubric_presentation: presentation,
                comments,
            };
            db::save_feedback(&pool, submission_id, teacher.id, &feedback).await?;
            println!(
                "Feedback saved: {:.1}/{:.1} ({:.2}%).",
                score,
                max_score,
                grading::percent(score, max_score)
            );
        }
        Commands::Similarity {
            assignment_id,
            teacher_email,
            threshold,
            json,
        } => {
            let threshold = threshold_or_default(threshold, &config)?;
            let assignment = owned_assignment(&pool, &teacher_email, assignment_id).await?;
            let mut results = db::refresh_assignment_scores(&pool, assignment.id).await?;
            results.sort_by(|a, b| {
                b.1.score
                    .partial_cmp(&a.1.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            if json {
                let rows: Vec<serde_json::Value> = results
                    .iter()
                    .map(|(id, result)| {
                        serde_json::json!({
                            "submission_id": id,
                            "score": result.score,
                            "closest": result.closest,
                            "flagged": similarity::is_flagged(result.score, threshold),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            if results.is_empty() {
                println!("No submissions for '{}'.", assignment.title);
                return Ok(());
            }

            println!("Overlap scores for '{}':", assignment.title);
            for (id, result) in &results {
                let marker = if similarity::is_flagged(result.score, threshold) {
                    " [possible plagiarism]"
                } else {
                    ""
                };
                match result.closest {
                    Some(closest) => println!(
                        "- {id} score {:.2}% closest {closest}{marker}",
                        result.score
                    ),
                    None => println!("- {id} score {:.2}%", result.score),
                }
            }
        }
        Commands::Dashboard { teacher_email } => {
            let teacher = db::require_user(&pool, &teacher_email).await?;
            grading::ensure_role(&teacher, Role::Teacher)?;
            let counts = db::dashboard_counts(&pool, teacher.id).await?;
            let assignments = db::list_teacher_assignments(&pool, teacher.id).await?;

            println!(
                "{} assignments, {} submissions ({} graded, {} pending)",
                counts.total_assignments,
                counts.total_submissions,
                counts.graded_submissions,
                counts.pending_submissions
            );
            for assignment in assignments {
                println!(
                    "- {} {} (due {})",
                    assignment.id,
                    assignment.title,
                    assignment.due_date.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Assignments { email } => {
            let student = db::require_user(&pool, &email).await?;
            grading::ensure_role(&student, Role::Student)?;
            let assignments = db::list_student_assignments(&pool, student.id).await?;
            let now = Utc::now().naive_utc();

            if assignments.is_empty() {
                println!("No assignments yet.");
                return Ok(());
            }

            for assignment in &assignments {
                println!("{}", report::student_assignment_line(assignment, now));
            }
        }
        Commands::Submissions { email } => {
            let student = db::require_user(&pool, &email).await?;
            grading::ensure_role(&student, Role::Student)?;
            let submissions = db::fetch_student_submissions(&pool, student.id).await?;
            print!("{}", report::build_submission_history(&submissions));
        }
        Commands::Analytics { email, json } => {
            let student = db::require_user(&pool, &email).await?;
            grading::ensure_role(&student, Role::Student)?;
            let grades = db::fetch_student_grades(&pool, student.id).await?;
            let analytics = grading::student_analytics(&grades);

            if json {
                println!("{}", serde_json::to_string_pretty(&analytics)?);
                return Ok(());
            }

            if analytics.lines.is_empty() {
                println!("No graded submissions yet.");
                return Ok(());
            }

            for line in &analytics.lines {
                println!(
                    "- {}: {:.1}/{:.1} ({:.2}%)",
                    line.assignment_title, line.score, line.max_score, line.percent
                );
            }
            println!("Overall: {:.2}%", analytics.overall_percent);
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            info!(imported, path = %csv.display(), "import finished");
            println!("Imported {imported} submissions from {}.", csv.display());
        }
        Commands::Report {
            assignment_id,
            teacher_email,
            threshold,
            out,
        } => {
            let threshold = threshold_or_default(threshold, &config)?;
            let assignment = owned_assignment(&pool, &teacher_email, assignment_id).await?;
            let records = db::fetch_submission_records(&pool, assignment.id).await?;
            let report = report::build_report(&assignment, threshold, &records);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Load an assignment on behalf of the teacher who owns it.
async fn owned_assignment(
    pool: &PgPool,
    teacher_email: &str,
    assignment_id: Uuid,
) -> anyhow::Result<Assignment> {
    let teacher = db::require_user(pool, teacher_email).await?;
    grading::ensure_role(&teacher, Role::Teacher)?;
    let assignment = db::require_assignment(pool, assignment_id).await?;
    grading::ensure_owner(&teacher, &assignment)?;
    Ok(assignment)
}

fn threshold_or_default(flag: Option<f64>, config: &Config) -> anyhow::Result<f64> {
    match flag {
        Some(value) => config::validate_threshold(value),
        None => Ok(config.plagiarism_threshold),
    }
}
