use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["pdf", "png", "jpg", "jpeg", "gif"];

pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Reduce a client-supplied name to a flat ASCII filename.
///
/// Path separators become spaces, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing `.`/`_` are trimmed.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Copy `source` into `upload_dir` under a per-student name and return that name.
pub fn store_upload(
    upload_dir: &Path,
    max_bytes: u64,
    student_id: Uuid,
    assignment_id: Uuid,
    source: &Path,
) -> anyhow::Result<String> {
    let original = source
        .file_name()
        .and_then(|name| name.to_str())
        .context("upload path has no usable file name")?;

    if !allowed_file(original) {
        anyhow::bail!("File type not allowed.");
    }

    let size = std::fs::metadata(source)
        .with_context(|| format!("failed to read {}", source.display()))?
        .len();
    if size > max_bytes {
        anyhow::bail!(
            "File is too large. Maximum size is {}MB.",
            max_bytes / (1024 * 1024)
        );
    }

    let filename = secure_filename(&format!("{student_id}_{assignment_id}_{original}"));
    std::fs::create_dir_all(upload_dir)
        .with_context(|| format!("failed to create {}", upload_dir.display()))?;
    let destination: PathBuf = upload_dir.join(&filename);
    std::fs::copy(source, &destination)
        .with_context(|| format!("failed to copy upload to {}", destination.display()))?;

    info!(file = %filename, bytes = size, "stored upload");
    Ok(filename)
}

/// Remove a stored upload whose submission was never saved.
pub fn discard_upload(upload_dir: &Path, filename: &str) -> anyhow::Result<()> {
    let path = upload_dir.join(filename);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            info!(file = %filename, "discarded upload");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("smart-assignments-{label}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(allowed_file("essay.PDF"));
        assert!(allowed_file("photo.final.jpeg"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("pdf"));
    }

    #[test]
    fn filenames_lose_paths_and_odd_characters() {
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("My Essay (final).pdf"), "My_Essay_final.pdf");
        assert_eq!(secure_filename("résumé.pdf"), "rsum.pdf");
    }

    #[test]
    fn stores_allowed_file_under_prefixed_name() {
        let source_dir = scratch_dir("src");
        let upload_dir = scratch_dir("uploads");
        let source = source_dir.join("lab report.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();

        let student = Uuid::from_u128(7);
        let assignment = Uuid::from_u128(9);
        let stored = store_upload(&upload_dir, 1024, student, assignment, &source).unwrap();

        assert!(stored.ends_with("_lab_report.pdf"));
        assert!(stored.starts_with(&student.to_string()));
        assert!(upload_dir.join(&stored).exists());
    }

    #[test]
    fn discarding_removes_the_stored_copy() {
        let source_dir = scratch_dir("discard-src");
        let upload_dir = scratch_dir("discard-uploads");
        let source = source_dir.join("chart.png");
        std::fs::write(&source, b"png").unwrap();

        let stored =
            store_upload(&upload_dir, 1024, Uuid::new_v4(), Uuid::new_v4(), &source).unwrap();
        discard_upload(&upload_dir, &stored).unwrap();

        assert!(!upload_dir.join(&stored).exists());
        assert!(source.exists());
        assert!(discard_upload(&upload_dir, &stored).is_ok());
    }

    #[test]
    fn rejects_oversized_and_disallowed_files() {
        let dir = scratch_dir("reject");
        let big = dir.join("scan.png");
        std::fs::write(&big, vec![0u8; 64]).unwrap();
        let text = dir.join("notes.txt");
        std::fs::write(&text, b"hi").unwrap();

        let ids = (Uuid::new_v4(), Uuid::new_v4());
        assert!(store_upload(&dir, 32, ids.0, ids.1, &big).is_err());
        assert!(store_upload(&dir, 1024, ids.0, ids.1, &text).is_err());
    }
}
