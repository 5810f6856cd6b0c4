use std::env;
use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 16 * 1024 * 1024;
pub const DEFAULT_PLAGIARISM_THRESHOLD: f64 = 50.0;

/// Settings read from the environment. A `.env` file is loaded first by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub upload_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    pub max_content_length: u64,
    /// Similarity percentage above which a submission is flagged.
    pub plagiarism_threshold: f64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres instance")?;

        let upload_dir = env::var("UPLOAD_FOLDER")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let max_content_length = match env::var("MAX_CONTENT_LENGTH") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("MAX_CONTENT_LENGTH is not a byte count: {value}"))?,
            Err(_) => DEFAULT_MAX_CONTENT_LENGTH,
        };

        let plagiarism_threshold = match env::var("PLAGIARISM_THRESHOLD") {
            Ok(value) => parse_threshold(&value)?,
            Err(_) => DEFAULT_PLAGIARISM_THRESHOLD,
        };

        Ok(Self {
            database_url,
            upload_dir,
            max_content_length,
            plagiarism_threshold,
        })
    }
}

pub fn parse_threshold(value: &str) -> anyhow::Result<f64> {
    let threshold: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("PLAGIARISM_THRESHOLD is not a number: {value}"))?;
    validate_threshold(threshold)
}

pub fn validate_threshold(threshold: f64) -> anyhow::Result<f64> {
    if !(0.0..=100.0).contains(&threshold) {
        anyhow::bail!("plagiarism threshold must be between 0 and 100, got {threshold}");
    }
    Ok(threshold)
}
