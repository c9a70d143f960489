//! Per-frame subtitle highlighting.
//!
//! Everything here is a pure function of the playback position and the
//! intervals, so any frame can be rendered in isolation.

use crate::types::MoraTiming;
use crate::{PipelineError, PipelineErrorDescription};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoraState {
    /// Already started and not currently sounding.
    Spoken,
    /// Sounding right now.
    Active,
    Upcoming,
}

impl MoraState {
    /// Active moras count as spoken too.
    pub fn is_spoken(&self) -> bool {
        !matches!(self, Self::Upcoming)
    }
}

pub fn frame_to_sec(frame: u32, fps: u32) -> Result<f64, PipelineError> {
    if fps == 0 {
        return Err(PipelineError::new(PipelineErrorDescription::InvalidInput(
            "fps must be positive".to_string(),
        )));
    }
    Ok(frame as f64 / fps as f64)
}

pub fn classify(current_sec: f64, timing: &MoraTiming) -> MoraState {
    if current_sec >= timing.start_sec && current_sec < timing.end_sec {
        MoraState::Active
    } else if current_sec >= timing.start_sec {
        MoraState::Spoken
    } else {
        MoraState::Upcoming
    }
}

pub fn resolve(current_sec: f64, timings: &[MoraTiming]) -> Vec<MoraState> {
    timings.iter().map(|t| classify(current_sec, t)).collect()
}

/// Frame-based variant of [`resolve`]; `local_frame` counts from the start of
/// the segment the timings belong to.
pub fn resolve_frame(local_frame: u32, fps: u32, timings: &[MoraTiming]) -> Result<Vec<MoraState>, PipelineError> {
    Ok(resolve(frame_to_sec(local_frame, fps)?, timings))
}

/// Index of the sounding mora, if any. `None` during pauses and padding.
pub fn active_index(current_sec: f64, timings: &[MoraTiming]) -> Option<usize> {
    timings
        .iter()
        .position(|t| classify(current_sec, t) == MoraState::Active)
}
