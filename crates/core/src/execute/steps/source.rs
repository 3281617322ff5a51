//! Source acquisition step.
//!
//! Git sources are cloned with the git CLI — it is one of the OS packages
//! the recipe provisions, so it is guaranteed present by the time this step
//! runs — and pinned with a detached checkout, which accepts a branch, tag
//! or commit hash uniformly. Tarball sources are downloaded, verified
//! against their SHA-256 pin and unpacked with the leading path component
//! stripped.
//!
//! Acquisition always starts from an empty destination: a leftover tree from
//! an interrupted run is removed first, so the post-condition is exactly the
//! pinned revision, not a merge of old and new state.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use tracing::{debug, info};

use kiln_lua::SourceDecl;

use super::super::ExecuteError;
use super::super::process::run_cmd;

/// Execute a source acquisition step.
///
/// Returns the checkout directory on success.
pub async fn acquire_source(decl: &SourceDecl, work_dir: &Path) -> Result<PathBuf, ExecuteError> {
  let dest = work_dir.join(&decl.name);

  if dest.exists() {
    debug!(path = %dest.display(), "removing existing checkout");
    fs::remove_dir_all(&dest)?;
  }

  if let Some(url) = &decl.git {
    fetch_git(decl, url, &dest, work_dir).await?;
  } else if let Some(url) = &decl.url {
    let sha256 = decl.sha256.as_deref().unwrap_or_default();
    fetch_tarball(url, sha256, &dest).await?;
  }

  Ok(dest)
}

/// Clone a repository and pin it to the declared revision.
async fn fetch_git(decl: &SourceDecl, url: &str, dest: &Path, work_dir: &Path) -> Result<(), ExecuteError> {
  info!(url = %url, rev = decl.rev.as_deref().unwrap_or("HEAD"), "cloning repository");

  let env = BTreeMap::new();

  let clone = format!("git clone {} {}", url, dest.display());
  run_cmd(&clone, &env, work_dir)
    .await
    .map_err(|e| checkout_error(url, decl.rev.as_deref(), e))?;

  if let Some(rev) = &decl.rev {
    // --detach works for branches, tags and commit hashes alike, leaving the
    // tree at exactly the pinned revision.
    let checkout = format!("git checkout --detach {}", rev);
    run_cmd(&checkout, &env, dest)
      .await
      .map_err(|e| checkout_error(url, Some(rev), e))?;
  }

  if decl.submodules {
    run_cmd("git submodule update --init --recursive", &env, dest)
      .await
      .map_err(|e| checkout_error(url, decl.rev.as_deref(), e))?;
  }

  Ok(())
}

fn checkout_error(url: &str, rev: Option<&str>, source: ExecuteError) -> ExecuteError {
  ExecuteError::CheckoutFailed {
    url: url.to_string(),
    rev: rev.unwrap_or("HEAD").to_string(),
    message: source.to_string(),
  }
}

/// Download a tarball, verify its SHA-256 pin and unpack it into `dest`.
async fn fetch_tarball(url: &str, expected_sha256: &str, dest: &Path) -> Result<(), ExecuteError> {
  info!(url = %url, "fetching tarball");

  let response = reqwest::get(url).await.map_err(|e| ExecuteError::FetchFailed {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  if !response.status().is_success() {
    return Err(ExecuteError::FetchFailed {
      url: url.to_string(),
      message: format!("HTTP {}", response.status()),
    });
  }

  let bytes = response.bytes().await.map_err(|e| ExecuteError::FetchFailed {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  let actual_hash = {
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
  };

  if actual_hash != expected_sha256 {
    return Err(ExecuteError::HashMismatch {
      url: url.to_string(),
      expected: expected_sha256.to_string(),
      actual: actual_hash,
    });
  }

  // Stage the archive next to the destination so partial unpacks never look
  // like a finished checkout.
  fs::create_dir_all(dest)?;
  let archive_path = dest.with_extension("download");
  fs::write(&archive_path, &bytes)?;

  let result = unpack_archive(&archive_path, dest, url);
  let _ = fs::remove_file(&archive_path);
  result?;

  info!(path = %dest.display(), size = bytes.len(), "tarball unpacked");
  Ok(())
}

/// Unpack a `.tar.gz`/`.tgz`/`.tar` archive to the destination directory.
///
/// The first path component is stripped (e.g. `project-1.2.3/`), matching
/// what release tarballs ship.
fn unpack_archive(archive_path: &Path, dest: &Path, url: &str) -> Result<(), ExecuteError> {
  if url.ends_with(".tar.gz") || url.ends_with(".tgz") {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    unpack_tar(Archive::new(decoder), dest)
  } else if url.ends_with(".tar") {
    let file = File::open(archive_path)?;
    unpack_tar(Archive::new(BufReader::new(file)), dest)
  } else {
    Err(ExecuteError::UnsupportedArchive(url.to_string()))
  }
}

fn unpack_tar<R: std::io::Read>(mut archive: Archive<R>, dest: &Path) -> Result<(), ExecuteError> {
  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?;

    // Strip the first component (e.g. nccl-2.17.1-1/)
    let stripped: PathBuf = path.components().skip(1).collect();

    if stripped.as_os_str().is_empty() {
      continue;
    }

    let dest_path = dest.join(&stripped);

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    entry.unpack(&dest_path)?;
  }

  Ok(())
}
