//! Placement of manifest entries on a fixed-rate frame timeline.

use crate::manifest::{Manifest, ManifestEntry};
use crate::{PipelineError, PipelineErrorDescription};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimelineParams {
    pub fps: u32,
    /// Silence between consecutive segments, and after the last one.
    pub gap_frames: u32,
}

impl Default for TimelineParams {
    fn default() -> Self {
        Self {
            fps: 30,
            gap_frames: 25,
        }
    }
}

impl TimelineParams {
    /// Frames needed to cover `duration_sec`, rounded up. `None` for negative
    /// or non-finite durations and for counts that do not fit a frame number.
    pub fn frames_for(&self, duration_sec: f64) -> Option<u32> {
        if !duration_sec.is_finite() || duration_sec < 0.0 {
            return None;
        }
        u32::try_from((duration_sec * self.fps as f64).ceil() as u64).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineSegment<'a> {
    pub start_frame: u32,
    pub duration_frames: u32,
    pub entry: &'a ManifestEntry,
}

impl TimelineSegment<'_> {
    pub fn end_frame(&self) -> Option<u32> {
        self.start_frame.checked_add(self.duration_frames)
    }

    /// Audio plus the trailing gap; the span the scene stays on screen.
    pub fn window_frames(&self, params: &TimelineParams) -> u32 {
        self.duration_frames.saturating_add(params.gap_frames)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline<'a> {
    params: TimelineParams,
    segments: Vec<TimelineSegment<'a>>,
    total_frames: u32,
}

impl<'a> Timeline<'a> {
    /// Lays the entries out back to back, `gap_frames` apart, starting at
    /// frame 0. The total includes one trailing gap.
    pub fn assemble(manifest: &'a Manifest, params: TimelineParams) -> Result<Self, PipelineError> {
        if params.fps == 0 {
            return Err(PipelineError::new(PipelineErrorDescription::InvalidInput(
                "fps must be positive".to_string(),
            )));
        }

        let mut segments = Vec::with_capacity(manifest.len());
        let mut start_frame = 0u32;
        for entry in manifest {
            let duration_frames = params.frames_for(entry.duration_sec).ok_or_else(|| {
                PipelineError::new(PipelineErrorDescription::InvalidInput(format!(
                    "entry {}: unusable duration {}s",
                    entry.index, entry.duration_sec
                )))
            })?;
            let segment = TimelineSegment {
                start_frame,
                duration_frames,
                entry,
            };
            // the next start doubles as the total after the last entry
            start_frame = segment
                .end_frame()
                .and_then(|end| end.checked_add(params.gap_frames))
                .ok_or_else(|| {
                    PipelineError::new(PipelineErrorDescription::InvalidInput(format!(
                        "entry {}: timeline is longer than {} frames",
                        entry.index,
                        u32::MAX
                    )))
                })?;
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(PipelineError::new(PipelineErrorDescription::EmptyManifest));
        }
        let total_frames = start_frame;

        Ok(Self {
            params,
            segments,
            total_frames,
        })
    }

    pub fn params(&self) -> TimelineParams {
        self.params
    }

    pub fn segments(&self) -> &[TimelineSegment<'a>] {
        &self.segments
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// `fps` is non-zero here; `assemble` rejects it otherwise.
    pub fn duration_sec(&self) -> f64 {
        self.total_frames as f64 / self.params.fps as f64
    }

    /// The segment whose window contains `frame`, with `frame` made relative to
    /// the segment start.
    pub fn segment_at(&self, frame: u32) -> Option<(&TimelineSegment<'a>, u32)> {
        let i = self.segments.partition_point(|s| s.start_frame <= frame);
        let segment = self.segments.get(i.checked_sub(1)?)?;
        let local = frame - segment.start_frame;
        (local < segment.window_frames(&self.params)).then_some((segment, local))
    }
}
