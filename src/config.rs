use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::pronunciation::PronunciationMap;
use crate::timeline::TimelineParams;
use crate::{PipelineError, PipelineErrorDescription};

/// Container the synthesized audio ends up in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Keep the engine's WAV output as is.
    Wav,
    /// Transcode to mono MP3 with ffmpeg.
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Sampling rate requested from the engine.
    pub sampling_rate: u32,
    pub format: AudioFormat,
    /// ffmpeg `-b:a` value, used for MP3 only.
    pub mp3_bitrate: String,
    pub ffmpeg: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 16000,
            format: AudioFormat::Mp3,
            mp3_bitrate: "32k".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Extra attempts for 5xx, 429 and transport failures. 0 disables retry.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:50021".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Presentation settings of the composition consuming the manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
    pub gap_frames: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            gap_frames: 25,
            width: 1920,
            height: 1080,
        }
    }
}

impl RenderConfig {
    pub fn timeline_params(&self) -> TimelineParams {
        TimelineParams {
            fps: self.fps,
            gap_frames: self.gap_frames,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub audio: AudioConfig,
    pub render: RenderConfig,
    /// Directory receiving `line-N.<ext>` files and the manifest.
    pub output_dir: PathBuf,
    pub manifest_name: String,
    /// Lines synthesized at the same time.
    pub concurrency: usize,
    pub pronunciation: PronunciationMap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            audio: AudioConfig::default(),
            render: RenderConfig::default(),
            output_dir: PathBuf::from("public").join("voices"),
            manifest_name: "manifest.json".to_string(),
            concurrency: 1,
            pronunciation: PronunciationMap::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing keys fall back to the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            PipelineError::new(PipelineErrorDescription::InvalidInput(format!(
                "config {}: {}",
                path.display(),
                e
            )))
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_name)
    }

    pub fn audio_file_name(&self, index: usize) -> String {
        format!("line-{}.{}", index, self.audio.format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"audio": {"format": "wav"}, "concurrency": 3, "pronunciation": {"Rust": "ラスト"}}"#,
        )
        .unwrap();
        assert_eq!(config.audio.format, AudioFormat::Wav);
        assert_eq!(config.audio.sampling_rate, 16000);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.engine.url, "http://localhost:50021");
        assert_eq!(config.pronunciation.apply("Rust"), "ラスト");
        assert_eq!(config.audio_file_name(4), "line-4.wav");
    }

    #[test]
    fn backoff_doubles() {
        let engine = EngineConfig {
            retry_backoff_ms: 100,
            ..EngineConfig::default()
        };
        assert_eq!(engine.backoff(1), Duration::from_millis(100));
        assert_eq!(engine.backoff(2), Duration::from_millis(200));
        assert_eq!(engine.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(config.manifest_path(), Path::new("public/voices/manifest.json"));
        assert_eq!(config.audio_file_name(0), "line-0.mp3");
    }
}
