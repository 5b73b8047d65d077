// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Schema-loading glue shared by the `dvk-detect`/`dvk-decode`/`dvk-encode`/
//! `dvk-live` binaries. This is the "external collaborator" boundary
//! (workdir layout, file I/O, JSON/YAML parsing) that `dvk-core` is kept
//! free of.

use anyhow::{Context, Result};
use dvk_core::schema::{CommandSet, ModelDescriptor, ProtocolSchema};
use std::path::Path;

pub fn load_protocol(path: &Path) -> Result<ProtocolSchema> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading protocol schema {}", path.display()))?;
    let schema: ProtocolSchema = serde_json::from_str(&text).with_context(|| format!("parsing protocol schema {}", path.display()))?;
    schema.validate().with_context(|| format!("validating protocol schema {}", path.display()))?;
    Ok(schema)
}

pub fn load_command_set(path: &Path) -> Result<CommandSet> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading command set {}", path.display()))?;
    let set: CommandSet = serde_yaml::from_str(&text).with_context(|| format!("parsing command set {}", path.display()))?;
    set.validate().with_context(|| format!("validating command set {}", path.display()))?;
    Ok(set)
}

pub fn load_model(path: &Path) -> Result<ModelDescriptor> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading model descriptor {}", path.display()))?;
    let model: ModelDescriptor = serde_yaml::from_str(&text).with_context(|| format!("parsing model descriptor {}", path.display()))?;
    Ok(model)
}

/// Exit codes per the external-interfaces contract: `0` success, `2`
/// ambiguous detection not accepted by the caller, any other non-zero on
/// error.
pub const EXIT_OK: i32 = 0;
pub const EXIT_AMBIGUOUS: i32 = 2;
pub const EXIT_ERROR: i32 = 1;

pub fn init_logging(log_level: &str) {
    let filter = log_level.parse().unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt().with_max_level(filter).with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_protocol_rejects_empty_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocol.json");
        std::fs::write(&path, r#"{"protocol_id":"p","protocol_version":"1","frames":[]}"#).unwrap();
        assert!(load_protocol(&path).is_err());
    }

    #[test]
    fn load_command_set_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.yaml");
        std::fs::write(
            &path,
            "command_set_id: cs\ncommands:\n  - name: ping\n    id: 1\n    payload: []\n",
        )
        .unwrap();
        let set = load_command_set(&path).unwrap();
        assert_eq!(set.command("ping").unwrap().id, 1);
    }
}
