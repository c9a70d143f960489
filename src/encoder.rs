//! Writes synthesized WAV data to its final file, going through ffmpeg for
//! compressed formats.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{AudioConfig, AudioFormat};
use crate::{PipelineError, PipelineErrorDescription};

const STDERR_TAIL_LEN: usize = 800;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_sec: f64,
}

/// Reads the header of an engine response, rejecting anything that is not WAV.
pub fn inspect_wav(bytes: &[u8]) -> Result<WavInfo, PipelineError> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| {
        PipelineError::new(PipelineErrorDescription::InvalidResponse(format!("synthesis: not a WAV file: {}", e)))
    })?;
    let spec = reader.spec();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_sec: reader.duration() as f64 / spec.sample_rate.max(1) as f64,
    })
}

/// `line-0.mp3` is staged as `line-0.tmp.wav` before transcoding.
pub fn intermediate_path(target: &Path) -> PathBuf {
    target.with_extension("tmp.wav")
}

#[derive(Debug, Clone)]
pub struct AudioEncoder {
    config: AudioConfig,
}

impl AudioEncoder {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.config.format
    }

    /// Stores `wav` at `target`, creating parent directories.
    ///
    /// For MP3 the staged WAV is removed only after ffmpeg succeeds, so a
    /// failed conversion leaves it behind for inspection.
    pub async fn encode(&self, wav: &[u8], target: &Path) -> Result<WavInfo, PipelineError> {
        let info = inspect_wav(wav)?;

        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        match self.config.format {
            AudioFormat::Wav => {
                tokio::fs::write(target, wav).await?;
            },
            AudioFormat::Mp3 => {
                let staged = intermediate_path(target);
                tokio::fs::write(&staged, wav).await?;
                self.transcode(&staged, target).await?;
                tokio::fs::remove_file(&staged).await?;
            },
        }

        Ok(info)
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let ffmpeg = &self.config.ffmpeg;
        log::debug!("Running {} on {}", ffmpeg.display(), input.display());

        let result = Command::new(ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-b:a", self.config.mp3_bitrate.as_str()])
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return Err(PipelineError::new(PipelineErrorDescription::Encoding {
                    status: None,
                    stderr: format!("could not run {}: {}", ffmpeg.display(), e),
                }));
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("ffmpeg kept its input at {}", input.display());
            return Err(PipelineError::new(PipelineErrorDescription::Encoding {
                status: output.status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL_LEN),
            }));
        }

        Ok(())
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_owned();
    }
    text.chars().skip(count - max_chars).collect()
}
