//! Flattening of an [`AudioQuery`]'s accent phrases into per-mora intervals.

use crate::types::{AudioQuery, MoraTiming};

#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedTiming {
    pub timings: Vec<MoraTiming>,
    /// Length of the synthesized audio, silence padding included.
    pub duration_sec: f64,
}

/// Walks the phrases in spoken order with a running clock.
///
/// Pause moras advance the clock but are not emitted.
pub fn flatten(query: &AudioQuery) -> FlattenedTiming {
    let init = (Vec::new(), query.pre_phoneme_length);

    let (timings, clock) = query.accent_phrases.iter().fold(init, |(mut timings, clock), phrase| {
        let clock = phrase.moras.iter().fold(clock, |start, mora| {
            let end = start + mora.duration();
            timings.push(MoraTiming {
                text: mora.text.clone(),
                start_sec: start,
                end_sec: end,
            });
            end
        });
        let clock = clock + phrase.pause_mora.as_ref().map_or(0.0, |pause| pause.duration());
        (timings, clock)
    });

    FlattenedTiming {
        timings,
        duration_sec: clock + query.post_phoneme_length,
    }
}
