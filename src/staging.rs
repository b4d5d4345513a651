//! Staging of received uploads on local disk.

use std::path::{Path, PathBuf};

use crate::providers::IdGenerator;

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, only ASCII
/// alphanumerics and `._-` are kept, and leading dots or underscores are
/// stripped. May return an empty string.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// The extension of a sanitized filename, lowercased, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// A file written to the upload directory.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub byte_size: u64,
}

impl StagedFile {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Best-effort removal, used when the record could not be created.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staged file"
            );
        }
    }
}

/// Write `data` under `upload_dir` as `{id}_{name}`, so two uploads of the
/// same filename never share a path.
pub async fn stage(
    upload_dir: &Path,
    ids: &dyn IdGenerator,
    name: &str,
    data: &[u8],
) -> Result<StagedFile, std::io::Error> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(format!("{}_{}", ids.next_id(), name));
    tokio::fs::write(&path, data).await?;
    Ok(StagedFile {
        path,
        byte_size: data.len() as u64,
    })
}
