
pub(crate) mod audio_output;
mod subtitle;

use narration_voicevox::{self as narration, AudioFormat, EngineClient, Manifest, Pipeline, PipelineConfig, Timeline};
use narration_voicevox::{resolver, timing};

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

pub(crate) const PKG_DESCRIPTION: &str = "Narration voices and subtitle timing for tutorial videos, synthesized with VOICEVOX";

#[derive(Debug, Parser)]
#[command(about = PKG_DESCRIPTION, long_about = None, version)]
struct Cli {
    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// JSON config file; flags given on the command line take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine base URL
    #[arg(long)]
    engine_url: Option<String>,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                log::debug!("Loading config from {}", path.display());
                PipelineConfig::load(path)?
            },
            None => PipelineConfig::default(),
        };
        if let Some(url) = &self.engine_url {
            config.engine.url = url.clone();
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synthesizes every line of the script and writes the manifest
    Generate {
        #[command(flatten)]
        config: ConfigArgs,

        /// Script: a JSON array of { "text", "speaker" }
        #[arg(long, default_value = "voices.json")]
        script: PathBuf,

        /// Directory for the audio files and the manifest
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Audio file format
        #[arg(long, value_enum)]
        format: Option<AudioFormat>,

        /// Sampling rate requested from the engine
        #[arg(long)]
        sampling_rate: Option<u32>,

        /// MP3 bitrate passed to ffmpeg
        #[arg(long)]
        bitrate: Option<String>,

        /// Lines synthesized at the same time
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        concurrency: Option<u64>,

        /// Retries for engine errors that may be transient
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Prints where each manifest entry lands on the video timeline
    Timeline {
        #[command(flatten)]
        config: ConfigArgs,

        /// Manifest to read (defaults to the one `generate` writes)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Frames per second
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        fps: Option<u32>,

        /// Frames of silence after each line
        #[arg(long)]
        gap_frames: Option<u32>,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Lists speakers
    #[command()]
    Speakers {
        #[command(flatten)]
        config: ConfigArgs,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Speaks text from stdin and highlights each mora as it sounds
    Play {
        #[command(flatten)]
        config: ConfigArgs,

        /// Speaker ID
        #[arg(long, default_value = "1")]
        speaker: u32,

        /// Subtitle refresh rate
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        fps: u32,

        /// Follow the wall clock instead of an audio device
        #[arg(long)]
        silent: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    match args.subcommand {
        Command::Generate { config, script, output_dir, format, sampling_rate, bitrate, concurrency, max_retries } => {
            let mut config = config.load()?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(format) = format {
                config.audio.format = format;
            }
            if let Some(rate) = sampling_rate {
                config.audio.sampling_rate = rate;
            }
            if let Some(bitrate) = bitrate {
                config.audio.mp3_bitrate = bitrate;
            }
            if let Some(n) = concurrency {
                config.concurrency = n as usize;
            }
            if let Some(n) = max_retries {
                config.engine.max_retries = n;
            }

            let lines = narration::pipeline::read_script(&script)?;
            log::info!("Loaded {} lines from {}", lines.len(), script.display());

            let pipeline = Pipeline::new(config)?;

            tokio::select! {
                res = pipeline.run_and_write(&lines) => {
                    let (manifest, _) = res?;
                    log::info!("Done! {} lines", manifest.len());
                },
                _ = tokio::signal::ctrl_c() => {
                    log::warn!("Interrupted. The manifest was not written.");
                    return Err(anyhow::anyhow!("interrupted"));
                },
            }
        },

        Command::Timeline { config, manifest, fps, gap_frames, json } => {
            let config = config.load()?;
            let path = manifest.unwrap_or_else(|| config.manifest_path());
            let manifest = Manifest::read(&path).await?;

            let mut params = config.render.timeline_params();
            if let Some(fps) = fps {
                params.fps = fps;
            }
            if let Some(gap) = gap_frames {
                params.gap_frames = gap;
            }

            let timeline = Timeline::assemble(&manifest, params)?;

            if json {
                let segments = timeline.segments().iter().map(|segment| serde_json::json!({
                    "index": segment.entry.index,
                    "startFrame": segment.start_frame,
                    "durationFrames": segment.duration_frames,
                    "audioFile": segment.entry.audio_file,
                    "text": segment.entry.text,
                })).collect::<Vec<_>>();
                let report = serde_json::json!({
                    "fps": params.fps,
                    "gapFrames": params.gap_frames,
                    "totalFrames": timeline.total_frames(),
                    "durationSec": timeline.duration_sec(),
                    "segments": segments,
                });
                let mut json = serde_json::to_string_pretty(&report)?;
                json.push('\n');
                std::io::stdout().write_all(json.as_bytes())?;
            } else {
                println!("INDEX\tSTART_FRAME\tFRAMES\tAUDIO_FILE\tTEXT");
                for segment in timeline.segments() {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        segment.entry.index, segment.start_frame, segment.duration_frames, segment.entry.audio_file, segment.entry.text
                    );
                }
                println!("TOTAL_FRAMES\t{}\t({:.2}s at {} fps)", timeline.total_frames(), timeline.duration_sec(), params.fps);
            }
        },

        Command::Speakers { config, json } => {
            let config = config.load()?;
            let client = EngineClient::new(&config.engine)?;
            let speakers = client.speakers().await?;

            if json {
                let mut json = serde_json::to_string_pretty(&speakers)?;
                json.push('\n');
                std::io::stdout().write_all(json.as_bytes())?;
            } else {
                println!("SPEAKER_ID\tSPEAKER_NAME\tSTYLE_NAME");
                for speaker in speakers {
                    println!("{}\t{}\t{}", speaker.speaker_id, speaker.speaker_name, speaker.style_name);
                }
            }
        },

        Command::Play { config, speaker, fps, silent } => {
            let config = config.load()?;
            let client = EngineClient::new(&config.engine)?;

            let mut text = String::new();
            let _ = std::io::stdin().read_to_string(&mut text)?;
            let text = text.trim();
            if text.is_empty() {
                return Err(anyhow::anyhow!("No text on stdin."));
            }

            log::info!("Synthesizing: {}", text);
            let mut query = client.audio_query(&config.pronunciation.apply(text), speaker).await?;
            query.shape_output(config.audio.sampling_rate);
            let wav = client.synthesis(&query, speaker).await?;
            let flat = timing::flatten(&query);

            let player = if silent {
                None
            } else {
                let player = audio_output::AudioPlayer::new()?;
                player.play_wav(std::io::Cursor::new(wav.as_slice()))?;
                Some(player)
            };

            play_subtitles(&flat, player.as_ref(), fps).await?;
            log::info!("Playback finished ({:.2}s).", flat.duration_sec);
        },
    }

    Ok(())
}

/// Redraws the subtitle line once per frame until the clip is over.
async fn play_subtitles(
    flat: &timing::FlattenedTiming,
    player: Option<&audio_output::AudioPlayer>,
    fps: u32,
) -> anyhow::Result<()> {
    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
    let mut stdout = std::io::stdout();

    loop {
        ticker.tick().await;

        let current_sec = match player {
            Some(player) => player.position_sec(),
            None => started.elapsed().as_secs_f64(),
        };
        let states = resolver::resolve(current_sec, &flat.timings);
        write!(stdout, "{}", subtitle::render_line(&flat.timings, &states))?;
        stdout.flush()?;

        let finished = match player {
            Some(player) => player.is_finished(),
            None => current_sec >= flat.duration_sec,
        };
        if finished {
            break;
        }
    }

    writeln!(stdout)?;
    Ok(())
}
