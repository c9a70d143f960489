//! Offline batch: script lines in, audio files and a manifest out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::client::EngineClient;
use crate::config::PipelineConfig;
use crate::encoder::AudioEncoder;
use crate::manifest::{Manifest, ManifestEntry};
use crate::timing;
use crate::types::VoiceLine;
use crate::{PipelineError, PipelineErrorDescription};

/// Reads `voices.json`: an array of `{ "text": ..., "speaker": ... }`.
pub fn read_script<P: AsRef<Path>>(path: P) -> Result<Vec<VoiceLine>, PipelineError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| {
        PipelineError::new(PipelineErrorDescription::InvalidInput(format!(
            "script {}: {}",
            path.display(),
            e
        )))
    })
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    client: EngineClient,
    encoder: AudioEncoder,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = EngineClient::new(&config.engine)?;
        let encoder = AudioEncoder::new(&config.audio);
        Ok(Self {
            client,
            encoder,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn client(&self) -> &EngineClient {
        &self.client
    }

    /// Synthesizes one line and returns its manifest entry.
    ///
    /// The engine hears the pronunciation-mapped text; the entry keeps the
    /// text as written.
    pub async fn generate_line(&self, index: usize, line: &VoiceLine) -> Result<ManifestEntry, PipelineError> {
        let tts_text = self.config.pronunciation.apply(&line.text);
        if tts_text != line.text {
            log::debug!("  reading as: {}", tts_text);
        }

        let mut query = self.client.audio_query(&tts_text, line.speaker).await?;
        query.shape_output(self.config.audio.sampling_rate);
        let wav = self.client.synthesis(&query, line.speaker).await?;

        let audio_file = self.config.audio_file_name(index);
        let target = self.config.output_dir.join(&audio_file);
        let info = self.encoder.encode(&wav, &target).await?;

        let flat = timing::flatten(&query);
        log::info!("  → {} ({:.2}s)", target.display(), flat.duration_sec);
        log::debug!("  engine audio: {:.2}s, {} Hz, {} ch", info.duration_sec, info.sample_rate, info.channels);

        Ok(ManifestEntry {
            index,
            text: line.text.clone(),
            audio_file,
            duration_sec: flat.duration_sec,
            mora_timings: flat.timings,
        })
    }

    async fn generate_logged(&self, index: usize, total: usize, line: &VoiceLine) -> Result<ManifestEntry, PipelineError> {
        log::info!("[{}/{}] Generating: {:?}", index + 1, total, line.text);
        self.generate_line(index, line)
            .await
            .map_err(|e| e.map(|desc| desc.for_line(index, &line.text)))
    }

    /// Runs every line. The first failure aborts the batch.
    pub async fn run(&self, lines: &[VoiceLine]) -> Result<Manifest, PipelineError> {
        if lines.is_empty() {
            log::warn!("Script has no lines");
        }

        if self.config.concurrency <= 1 {
            let mut entries = Vec::with_capacity(lines.len());
            for (index, line) in lines.iter().enumerate() {
                entries.push(self.generate_logged(index, lines.len(), line).await?);
            }
            return Ok(Manifest::from(entries));
        }

        self.run_concurrent(lines).await
    }

    /// Keeps at most `concurrency` lines in flight. Dropping the join set on
    /// error aborts the rest.
    async fn run_concurrent(&self, lines: &[VoiceLine]) -> Result<Manifest, PipelineError> {
        let total = lines.len();
        let mut pending = lines.iter().cloned().enumerate();
        let mut tasks = JoinSet::new();
        let mut entries = Vec::with_capacity(total);

        loop {
            while tasks.len() < self.config.concurrency {
                let Some((index, line)) = pending.next() else {
                    break;
                };
                let pipeline = self.clone();
                tasks.spawn(async move { pipeline.generate_logged(index, total, &line).await });
            }

            match tasks.join_next().await {
                Some(Ok(entry)) => entries.push(entry?),
                Some(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Some(Err(e)) => return Err(PipelineError::from(std::io::Error::other(e))),
                None => break,
            }
        }

        Ok(Manifest::from(entries))
    }

    /// Runs the batch and writes the manifest once every line succeeded.
    pub async fn run_and_write(&self, lines: &[VoiceLine]) -> Result<(Manifest, PathBuf), PipelineError> {
        let manifest = self.run(lines).await?;
        let path = self.config.manifest_path();
        manifest.write(&path).await?;
        log::info!("Manifest saved to: {}", path.display());
        Ok((manifest, path))
    }
}
