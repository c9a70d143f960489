
use std::io::Read;
use std::sync::Arc;

use parking_lot::Mutex;

use hound::WavReader;
use rubato::{Resampler, SincFixedIn, SincInterpolationType, SincInterpolationParameters, WindowFunction};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample,
    Sample,
    StreamConfig,
};

const RESAMPLER_CHUNK: usize = 1024;

#[derive(Debug, Default)]
struct Playback {
    /// Interleaved samples at the device rate and channel count.
    buffer: Vec<i16>,
    pos: usize,
}

/// Plays one clip at a time on the default output device and reports how far
/// into the clip the device has got.
pub(crate) struct AudioPlayer {
    playback: Arc<Mutex<Playback>>,
    sample_rate: u32,
    channel_count: u16,
    _stream: cpal::Stream,
}

impl AudioPlayer {
    pub fn new() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| anyhow::anyhow!("No default output device"))?;
        let supported_config = device.default_output_config()?;
        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let playback = Arc::new(Mutex::new(Playback::default()));

        let err_fn = |err| log::error!("an error occurred on the output audio stream: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(&config, callback::<f32>(playback.clone()), err_fn, None)?,
            cpal::SampleFormat::F64 => device.build_output_stream(&config, callback::<f64>(playback.clone()), err_fn, None)?,
            cpal::SampleFormat::I16 => device.build_output_stream(&config, callback::<i16>(playback.clone()), err_fn, None)?,
            cpal::SampleFormat::U16 => device.build_output_stream(&config, callback::<u16>(playback.clone()), err_fn, None)?,
            cpal::SampleFormat::I32 => device.build_output_stream(&config, callback::<i32>(playback.clone()), err_fn, None)?,
            cpal::SampleFormat::U32 => device.build_output_stream(&config, callback::<u32>(playback.clone()), err_fn, None)?,
            other => {
                return Err(anyhow::anyhow!("Unsupported sample format: {:?}", other));
            },
        };

        stream.play()?;
        log::debug!("Audio output: {} Hz, {} ch, {:?}", config.sample_rate.0, config.channels, sample_format);

        Ok(Self {
            playback,
            sample_rate: config.sample_rate.0,
            channel_count: config.channels,
            _stream: stream,
        })
    }

    /// Replaces the current clip with `wav` and starts it from the beginning.
    pub fn play_wav<R: Read>(&self, wav: R) -> anyhow::Result<()> {
        let (samples, source_rate) = decode_mono(wav)?;
        let samples = resample(&samples, source_rate, self.sample_rate)?;

        let channels = self.channel_count as usize;
        let buffer = samples
            .iter()
            .flat_map(|sample| std::iter::repeat(<i16 as Sample>::from_sample(*sample)).take(channels))
            .collect::<Vec<_>>();

        let mut playback = self.playback.lock();
        playback.buffer = buffer;
        playback.pos = 0;
        Ok(())
    }

    /// Seconds of the current clip already handed to the device.
    pub fn position_sec(&self) -> f64 {
        let frames = self.playback.lock().pos / self.channel_count.max(1) as usize;
        frames as f64 / self.sample_rate as f64
    }

    pub fn is_finished(&self) -> bool {
        let playback = self.playback.lock();
        playback.pos >= playback.buffer.len()
    }
}

fn callback<S>(playback: Arc<Mutex<Playback>>) -> impl FnMut(&mut [S], &cpal::OutputCallbackInfo) + Send + 'static
where
    S: FromSample<i16> + Sample,
{
    move |out: &mut [S], _: &cpal::OutputCallbackInfo| {
        let mut playback = playback.lock();
        let start = playback.pos.min(playback.buffer.len());
        let available = &playback.buffer[start..];
        let n = available.len().min(out.len());

        for (dst, src) in out.iter_mut().zip(available.iter()) {
            *dst = S::from_sample(*src);
        }
        for dst in out[n..].iter_mut() {
            *dst = S::EQUILIBRIUM;
        }
        playback.pos = start + n;
    }
}

/// Decodes 16-bit PCM and averages the channels. Returns the samples and their rate.
fn decode_mono<R: Read>(wav: R) -> anyhow::Result<(Vec<f64>, u32)> {
    let mut reader = WavReader::new(wav)?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|sample| sample.map(<f64 as Sample>::from_sample))
            .collect::<Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(anyhow::anyhow!("Unsupported sample format: {:?} / {}", format, bits));
        },
    };

    let channels = spec.channels.max(1) as usize;
    let mono = samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f64>() / frame.len() as f64)
        .collect();

    Ok((mono, spec.sample_rate))
}

fn resample(mono: &[f64], from: u32, to: u32) -> anyhow::Result<Vec<f64>> {
    if from == to || mono.is_empty() {
        return Ok(mono.to_vec());
    }

    let ratio = to as f64 / from as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let chunk = mono.len().min(RESAMPLER_CHUNK);
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, chunk, 1)?;

    let expected = (mono.len() as f64 * ratio) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay);
    let mut block = vec![vec![0.0f64; resampler.output_frames_max()]];

    let mut rest = mono;
    while rest.len() >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let (_, written) = resampler.process_into_buffer(&[&rest[..n]], &mut block, None)?;
        output.extend_from_slice(&block[0][..written]);
        rest = &rest[n..];
    }

    if !rest.is_empty() {
        let (_, written) = resampler.process_partial_into_buffer(Some(&[rest][..]), &mut block, None)?;
        output.extend_from_slice(&block[0][..written]);
    }

    while output.len() < expected + delay {
        let (_, written) = resampler.process_partial_into_buffer(None::<&[&[f64]]>, &mut block, None)?;
        output.extend_from_slice(&block[0][..written]);
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}
