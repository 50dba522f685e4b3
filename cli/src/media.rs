use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Slug plus a short digest of the exact name, so names that slug alike
/// ("Tomato Soup", "tomato-soup") never share a file.
fn media_prefix(name: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(name.trim().as_bytes()));
    format!("{}-{}", slug(name), &digest[..8])
}

/// An `--image`/`--video` argument resolved to the value the recipe will
/// store. Nothing touches the media directory until [`StagedMedia::commit`].
#[derive(Debug)]
pub struct StagedMedia {
    pub stored: String,
    copy: Option<(PathBuf, PathBuf)>,
}

impl StagedMedia {
    /// Copy a local file into place. URLs need no work.
    pub fn commit(&self) -> Result<()> {
        let Some((from, to)) = &self.copy else {
            return Ok(());
        };
        if let Some(dir) = to.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create media directory: {}", dir.display()))?;
        }
        std::fs::copy(from, to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        info!(from = %from.display(), to = %to.display(), "media stored");
        Ok(())
    }
}

/// URLs are kept as given; local files are destined for `media_dir` as
/// `<recipe-slug>-<digest>-<file name>`.
pub fn stage_media(media_dir: &Path, recipe_name: &str, source: &str) -> Result<StagedMedia> {
    let source = source.trim();
    if is_url(source) {
        return Ok(StagedMedia {
            stored: source.to_string(),
            copy: None,
        });
    }
    let path = Path::new(source);
    if !path.is_file() {
        bail!("Media file not found: {source}");
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Media path has no file name")?;

    let target = media_dir.join(format!("{}-{file_name}", media_prefix(recipe_name)));
    Ok(StagedMedia {
        stored: target.to_string_lossy().into_owned(),
        copy: Some((path.to_path_buf(), target)),
    })
}

/// Delete a stored copy. Paths outside `media_dir` and URLs are left alone.
pub fn remove_media(media_dir: &Path, stored: &str) -> Result<()> {
    if is_url(stored) {
        return Ok(());
    }
    let path = Path::new(stored);
    if !path.starts_with(media_dir) || !path.is_file() {
        debug!(path = %path.display(), "media not managed, skipping removal");
        return Ok(());
    }
    std::fs::remove_file(path)
        .with_context(|| format!("Failed to remove media file: {}", path.display()))?;
    Ok(())
}
