// SPDX-License-Identifier: MIT OR Apache-2.0
//! On-disk JSON format for layouts and links.
//!
//! A layout or link file is a UTF-8 JSON object `{ "signed": {...},
//! "signatures": [...] }`. Rule keyword case is normalized on the way in
//! by `op_model::Rule`'s `Deserialize` impl; this crate is responsible for
//! the file I/O, `_type`/shape validation, and link filename conventions.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use op_model::{Layout, Link};

/// Failure to read or write a layout/link file.
#[derive(Debug, thiserror::Error)]
pub enum FormatIoError {
    /// The file could not be opened/read/written.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file was not valid JSON for the expected shape.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Path being parsed.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The parsed document violated a model invariant (wrong `_type`,
    /// dangling keyid, duplicate name, ...).
    #[error(transparent)]
    Invalid(#[from] op_model::FormatError),
}

/// Read and validate a layout file.
///
/// # Errors
///
/// Returns [`FormatIoError`] if the file cannot be read, is not valid
/// JSON, or fails [`op_model::LayoutBody::validate`].
pub fn read_layout(path: &Path) -> Result<Layout, FormatIoError> {
    let bytes = std::fs::read(path).map_err(|source| FormatIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let layout: Layout = serde_json::from_slice(&bytes).map_err(|source| FormatIoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    layout.signed.validate()?;
    Ok(layout)
}

/// Serialize and write a layout file.
///
/// # Errors
///
/// Returns [`FormatIoError::Io`] if the file cannot be written.
pub fn write_layout(path: &Path, layout: &Layout) -> Result<(), FormatIoError> {
    let bytes = serde_json::to_vec_pretty(layout).expect("Layout always serializes");
    std::fs::write(path, bytes).map_err(|source| FormatIoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and validate a link file.
///
/// # Errors
///
/// Returns [`FormatIoError`] if the file cannot be read, is not valid
/// JSON, or its `_type` tag is not `"link"`.
pub fn read_link(path: &Path) -> Result<Link, FormatIoError> {
    let bytes = std::fs::read(path).map_err(|source| FormatIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let link: Link = serde_json::from_slice(&bytes).map_err(|source| FormatIoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    link.signed.validate_type_tag()?;
    Ok(link)
}

/// Serialize and write a link file.
///
/// # Errors
///
/// Returns [`FormatIoError::Io`] if the file cannot be written.
pub fn write_link(path: &Path, link: &Link) -> Result<(), FormatIoError> {
    let bytes = serde_json::to_vec_pretty(link).expect("Link always serializes");
    std::fs::write(path, bytes).map_err(|source| FormatIoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The decomposed name of a link file on disk: `<step>.link` or
/// `<step>.<keyid prefix>.link`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFileName {
    /// The step or inspection name.
    pub step_name: String,
    /// The keyid prefix, if this file was named for a specific signer.
    pub keyid_prefix: Option<String>,
}

/// Parse a link file's base name (without its directory).
///
/// # Errors
///
/// Returns `None` if `file_name` does not end in `.link` or has too many
/// `.`-separated segments to be a step name, an optional keyid prefix,
/// and the `link` extension.
#[must_use]
pub fn parse_link_filename(file_name: &str) -> Option<LinkFileName> {
    let stripped = file_name.strip_suffix(".link")?;
    if stripped.is_empty() {
        return None;
    }
    match stripped.rsplit_once('.') {
        Some((step_name, keyid_prefix)) if !step_name.is_empty() && !keyid_prefix.is_empty() => {
            Some(LinkFileName {
                step_name: step_name.to_string(),
                keyid_prefix: Some(keyid_prefix.to_string()),
            })
        }
        _ => Some(LinkFileName {
            step_name: stripped.to_string(),
            keyid_prefix: None,
        }),
    }
}

/// List every link file in `dir` whose name resolves to `step_name`,
/// accepting both the bare and keyid-qualified naming conventions.
///
/// # Errors
///
/// Returns [`FormatIoError::Io`] if `dir` cannot be read.
pub fn links_for_step(dir: &Path, step_name: &str) -> Result<Vec<PathBuf>, FormatIoError> {
    let entries = std::fs::read_dir(dir).map_err(|source| FormatIoError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FormatIoError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(parsed) = parse_link_filename(&name) {
            if parsed.step_name == step_name {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_model::{Byproducts, LinkBody};

    #[test]
    fn parses_bare_link_filename() {
        let parsed = parse_link_filename("write-code.link").unwrap();
        assert_eq!(parsed.step_name, "write-code");
        assert_eq!(parsed.keyid_prefix, None);
    }

    #[test]
    fn parses_keyid_qualified_link_filename() {
        let parsed = parse_link_filename("write-code.abcd1234.link").unwrap();
        assert_eq!(parsed.step_name, "write-code");
        assert_eq!(parsed.keyid_prefix.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn rejects_non_link_extension() {
        assert!(parse_link_filename("write-code.json").is_none());
    }

    #[test]
    fn roundtrips_link_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("write-code.link");
        let body = LinkBody::new(
            "write-code",
            vec!["vi".into()],
            op_model::ArtifactSet::new(),
            op_model::ArtifactSet::new(),
            Byproducts {
                stdout: String::new(),
                stderr: String::new(),
                return_value: 0,
            },
        );
        let link = Link::unsigned(body);
        write_link(&path, &link).unwrap();
        let read_back = read_link(&path).unwrap();
        assert_eq!(read_back.signed, link.signed);
    }

    #[test]
    fn links_for_step_finds_both_naming_conventions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.link"), "{}").unwrap();
        std::fs::write(dir.path().join("package.deadbeef.link"), "{}").unwrap();
        std::fs::write(dir.path().join("other.link"), "{}").unwrap();
        let found = links_for_step(dir.path(), "package").unwrap();
        assert_eq!(found.len(), 2);
    }
}
