use serde::{Deserialize, Serialize};

use crate::foundation::error::{ReelError, ReelResult};
use crate::scene::model::{Scene, validate_scenes};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Whole-project export: every scene plus the planning collaborator's strategy data, kept
/// opaque so it survives a round trip untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub version: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub strategy: serde_json::Value,
    pub scenes: Vec<Scene>,
}

impl ProjectSnapshot {
    pub fn new(title: impl Into<String>, strategy: serde_json::Value, scenes: Vec<Scene>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            title: title.into(),
            strategy,
            scenes,
        }
    }

    pub fn export_json(&self) -> ReelResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn import_json(s: &str) -> ReelResult<Self> {
        let snap: ProjectSnapshot = serde_json::from_str(s)?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(ReelError::validation(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snap.version
            )));
        }
        validate_scenes(&snap.scenes)?;
        Ok(snap)
    }
}
