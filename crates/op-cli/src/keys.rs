//! Resolving `--layout-key <keyid-or-path>` arguments into [`PublicKey`]s.

use std::path::Path;

use anyhow::{Context, Result};
use op_model::PublicKey;

/// Load a layout verification key from either a path to a JSON-encoded
/// [`PublicKey`] file, or an inline JSON-encoded `PublicKey` string.
pub fn resolve_layout_key(arg: &str) -> Result<PublicKey> {
    if Path::new(arg).is_file() {
        let text = std::fs::read_to_string(arg).with_context(|| format!("reading layout key file {arg}"))?;
        serde_json::from_str(&text).with_context(|| format!("parsing layout key file {arg}"))
    } else {
        serde_json::from_str(arg)
            .with_context(|| format!("{arg:?} is neither an existing file nor an inline key"))
    }
}
