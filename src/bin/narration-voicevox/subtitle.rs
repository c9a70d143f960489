
use narration_voicevox::resolver::MoraState;
use narration_voicevox::types::MoraTiming;

const ACTIVE: &str = "\x1b[1;32m";
const SPOKEN: &str = "\x1b[37m";
const UPCOMING: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// One terminal frame of the subtitle line, overwriting the previous one.
pub(crate) fn render_line(timings: &[MoraTiming], states: &[MoraState]) -> String {
    let mut line = String::from("\r\x1b[2K");
    for (timing, state) in timings.iter().zip(states) {
        let style = match state {
            MoraState::Active => ACTIVE,
            MoraState::Spoken => SPOKEN,
            MoraState::Upcoming => UPCOMING,
        };
        line.push_str(style);
        line.push_str(&timing.text);
        line.push_str(RESET);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_follow_state() {
        let timings = ["ア", "イ"]
            .iter()
            .map(|t| MoraTiming {
                text: t.to_string(),
                start_sec: 0.0,
                end_sec: 0.1,
            })
            .collect::<Vec<_>>();
        let line = render_line(&timings, &[MoraState::Active, MoraState::Upcoming]);
        assert_eq!(line, format!("\r\x1b[2K{}ア{}{}イ{}", ACTIVE, RESET, UPCOMING, RESET));
    }
}
