// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inspection execution and before/after directory hashing.
//!
//! For each inspection in a layout, [`run_inspection`] hashes the working
//! directory, runs the inspection's command as a subprocess, hashes the
//! directory again, and returns a synthetic [`LinkBody`] whose `materials`
//! is the before-set and `products` is the after-set. Inspections are
//! never signed — they are trusted because the verifier runs them
//! directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::Path;
use std::process::Command;

use op_model::{ArtifactSet, Byproducts, DigestSet, Inspection, LinkBody};
use sha2::{Digest, Sha256};

/// Failure to run an inspection or hash its working directory.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// `inspection.run` was empty; there is no program to execute.
    #[error("inspection {name:?} has an empty run command")]
    EmptyCommand {
        /// The inspection's name.
        name: String,
    },
    /// The subprocess could not be spawned or failed mid-execution.
    #[error("failed to run inspection {name:?}: {source}")]
    Spawn {
        /// The inspection's name.
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// The working directory could not be walked/hashed.
    #[error("failed to hash working directory {dir}: {source}")]
    Hash {
        /// Directory being hashed.
        dir: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hash every regular file under `dir`, keyed by its forward-slash
/// relative path, using SHA-256.
///
/// # Errors
///
/// Returns [`InspectError::Hash`] if the directory cannot be walked or a
/// file cannot be read.
pub fn hash_directory(dir: &Path) -> Result<ArtifactSet, InspectError> {
    let mut set = ArtifactSet::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| InspectError::Hash {
            dir: dir.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = std::fs::read(entry.path()).map_err(|source| InspectError::Hash {
            dir: dir.to_path_buf(),
            source,
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        let mut digest_set = DigestSet::new();
        digest_set.insert("sha256".to_string(), digest);
        set.insert(relative, digest_set);
    }
    Ok(set)
}

/// Run `inspection.run` in `workdir`, hashing before and after, and return
/// the resulting synthetic link.
///
/// # Errors
///
/// Returns [`InspectError::EmptyCommand`] if the run command is empty,
/// [`InspectError::Spawn`] if the subprocess cannot be started, or
/// [`InspectError::Hash`] if the working directory cannot be hashed.
pub fn run_inspection(inspection: &Inspection, workdir: &Path) -> Result<LinkBody, InspectError> {
    let Some((program, args)) = inspection.run.split_first() else {
        return Err(InspectError::EmptyCommand {
            name: inspection.name.clone(),
        });
    };

    let before = hash_directory(workdir)?;

    tracing::debug!(inspection = %inspection.name, command = ?inspection.run, "running inspection");
    let output = Command::new(program)
        .args(args)
        .current_dir(workdir)
        .output()
        .map_err(|source| InspectError::Spawn {
            name: inspection.name.clone(),
            source,
        })?;

    let after = hash_directory(workdir)?;

    let byproducts = Byproducts {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        return_value: i64::from(output.status.code().unwrap_or(-1)),
    };

    Ok(op_model::synthetic_link(
        &inspection.name,
        &inspection.run,
        before,
        after,
        byproducts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_files_with_forward_slash_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("a.txt"), b"hello").unwrap();

        let set = hash_directory(dir.path()).unwrap();
        assert!(set.contains_key("sub/a.txt"));
        assert_eq!(set["sub/a.txt"]["sha256"].len(), 64);
    }

    #[test]
    fn empty_command_is_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let inspection = Inspection::new("untar", vec![], vec![], vec![]);
        let err = run_inspection(&inspection, dir.path()).unwrap_err();
        assert!(matches!(err, InspectError::EmptyCommand { .. }));
    }

    #[test]
    fn captures_products_created_by_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let inspection = Inspection::new(
            "touch-file",
            vec!["sh".into(), "-c".into(), "echo hi > out.txt".into()],
            vec![],
            vec![],
        );
        let link = run_inspection(&inspection, dir.path()).unwrap();
        assert!(link.products.contains_key("out.txt"));
        assert!(!link.materials.contains_key("out.txt"));
        assert_eq!(link.byproducts.return_value, 0);
    }
}
