//! The ordered record of synthesized lines handed to the renderer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::MoraTiming;
use crate::{PipelineError, PipelineErrorDescription};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub index: usize,
    /// Text as written in the script, before pronunciation rewriting.
    pub text: String,
    /// Audio file name, relative to the manifest's directory.
    pub audio_file: String,
    pub duration_sec: f64,
    pub mora_timings: Vec<MoraTiming>,
}

/// Entries in playback order. Serialized as a bare JSON array.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::new(PipelineErrorDescription::InvalidInput(e.to_string())))?;
        json.push('\n');
        Ok(json)
    }

    /// Replaces whatever is at `path`.
    pub async fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Reads a manifest and rejects entries whose timing cannot be placed on
    /// a timeline.
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let invalid = |msg: String| {
            PipelineError::new(PipelineErrorDescription::InvalidInput(format!("manifest {}: {}", path.display(), msg)))
        };
        let manifest: Self = serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;
        manifest.validate().map_err(invalid)?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), String> {
        for entry in self {
            if !entry.duration_sec.is_finite() || entry.duration_sec < 0.0 {
                return Err(format!("entry {}: durationSec {} is not a non-negative number", entry.index, entry.duration_sec));
            }
            let bad_timing = entry
                .mora_timings
                .iter()
                .any(|t| !t.start_sec.is_finite() || !t.end_sec.is_finite() || t.start_sec > t.end_sec);
            if bad_timing {
                return Err(format!("entry {}: mora timing out of order", entry.index));
            }
        }
        Ok(())
    }
}

impl From<Vec<ManifestEntry>> for Manifest {
    /// Sorts by `index` so the manifest is in playback order.
    fn from(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by_key(|entry| entry.index);
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Default)]
pub struct ManifestBuilder {
    entries: Vec<ManifestEntry>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        index: usize,
        text: impl Into<String>,
        audio_file: impl Into<String>,
        duration_sec: f64,
        mora_timings: Vec<MoraTiming>,
    ) -> &mut Self {
        self.entries.push(ManifestEntry {
            index,
            text: text.into(),
            audio_file: audio_file.into(),
            duration_sec,
            mora_timings,
        });
        self
    }

    pub fn push_entry(&mut self, entry: ManifestEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Keeps push order; callers push in playback order.
    pub fn build(self) -> Manifest {
        Manifest { entries: self.entries }
    }
}
