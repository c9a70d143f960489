use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timed representation of one line as returned by `POST /audio_query`.
///
/// Fields the engine adds that are not modelled here are kept in `extra` and
/// sent back untouched on `POST /synthesis`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioQuery {
    #[serde(rename = "accent_phrases")]
    pub accent_phrases: Vec<AccentPhrase>,
    pub speed_scale: f64,
    pub pitch_scale: f64,
    pub intonation_scale: f64,
    pub volume_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
    pub output_sampling_rate: u32,
    pub output_stereo: bool,
    #[serde(default)]
    pub kana: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: i32,
    pub pause_mora: Option<Mora>,
    #[serde(default)]
    pub is_interrogative: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mora {
    pub text: String,
    pub vowel: String,
    pub vowel_length: f64,
    pub pitch: f64,
    pub consonant: Option<String>,
    pub consonant_length: Option<f64>,
}

impl Mora {
    /// Consonant plus vowel length, in seconds.
    pub fn duration(&self) -> f64 {
        self.consonant_length.unwrap_or(0.0) + self.vowel_length
    }
}

impl AudioQuery {
    /// Overrides the output sampling rate and forces mono output before the
    /// query is posted to `/synthesis`.
    pub fn shape_output(&mut self, sampling_rate: u32) {
        self.output_sampling_rate = sampling_rate;
        self.output_stereo = false;
    }

    /// Rejects lengths that would corrupt the timing computation.
    pub fn validate(&self) -> Result<(), String> {
        let check = |what: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(format!("{} must be a non-negative number, got {}", what, value))
            }
        };

        check("prePhonemeLength", self.pre_phoneme_length)?;
        check("postPhonemeLength", self.post_phoneme_length)?;

        for (i, phrase) in self.accent_phrases.iter().enumerate() {
            for mora in phrase.moras.iter().chain(phrase.pause_mora.iter()) {
                check(&format!("accent_phrases[{}] vowel_length", i), mora.vowel_length)?;
                if let Some(len) = mora.consonant_length {
                    check(&format!("accent_phrases[{}] consonant_length", i), len)?;
                }
            }
        }

        Ok(())
    }
}

/// One entry of the input script (`voices.json`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VoiceLine {
    pub text: String,
    pub speaker: u32,
}

/// A displayed mora and the span of the line's audio it occupies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoraTiming {
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

/// One speaker style, flattened from `GET /speakers`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub speaker_id: u32,
    pub speaker_name: String,
    pub style_name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct EngineSpeaker {
    pub name: String,
    pub styles: Vec<EngineSpeakerStyle>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct EngineSpeakerStyle {
    pub name: String,
    pub id: u32,
}

impl EngineSpeaker {
    pub(crate) fn into_speakers(self) -> impl Iterator<Item = Speaker> {
        let name = self.name;
        self.styles.into_iter().map(move |style| Speaker {
            speaker_id: style.id,
            speaker_name: name.clone(),
            style_name: style.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = r#"{
        "accent_phrases": [
            {
                "moras": [
                    {"text": "コ", "consonant": "k", "consonant_length": 0.05, "vowel": "o", "vowel_length": 0.1, "pitch": 5.5},
                    {"text": "ン", "consonant": null, "consonant_length": null, "vowel": "N", "vowel_length": 0.08, "pitch": 5.6}
                ],
                "accent": 1,
                "pause_mora": {"text": "、", "consonant": null, "consonant_length": null, "vowel": "pau", "vowel_length": 0.3, "pitch": 0.0},
                "is_interrogative": false
            }
        ],
        "speedScale": 1.0,
        "pitchScale": 0.0,
        "intonationScale": 1.0,
        "volumeScale": 1.0,
        "prePhonemeLength": 0.1,
        "postPhonemeLength": 0.1,
        "pauseLengthScale": 1.0,
        "outputSamplingRate": 24000,
        "outputStereo": false,
        "kana": "コ'ン、"
    }"#;

    #[test]
    fn parses_engine_query_and_keeps_unknown_fields() {
        let query: AudioQuery = serde_json::from_str(QUERY).unwrap();
        assert_eq!(query.accent_phrases.len(), 1);
        assert_eq!(query.accent_phrases[0].moras[1].consonant_length, None);
        assert_eq!(query.extra.get("pauseLengthScale"), Some(&Value::from(1.0)));

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["pauseLengthScale"], Value::from(1.0));
        assert_eq!(json["prePhonemeLength"], Value::from(0.1));
        assert!(json.get("accent_phrases").is_some());
    }

    #[test]
    fn shape_output_forces_mono() {
        let mut query: AudioQuery = serde_json::from_str(QUERY).unwrap();
        query.output_stereo = true;
        query.shape_output(16000);
        assert_eq!(query.output_sampling_rate, 16000);
        assert!(!query.output_stereo);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let broken = QUERY.replace("\"prePhonemeLength\": 0.1,", "");
        assert!(serde_json::from_str::<AudioQuery>(&broken).is_err());
    }

    #[test]
    fn validate_rejects_negative_lengths() {
        let mut query: AudioQuery = serde_json::from_str(QUERY).unwrap();
        assert!(query.validate().is_ok());
        query.accent_phrases[0].moras[0].vowel_length = -0.1;
        assert!(query.validate().is_err());
    }

    #[test]
    fn speakers_flatten_per_style() {
        let raw = r#"[{"name": "四国めたん", "speaker_uuid": "x", "styles": [{"name": "ノーマル", "id": 2}, {"name": "あまあま", "id": 0}], "version": "0.14.0"}]"#;
        let engine: Vec<EngineSpeaker> = serde_json::from_str(raw).unwrap();
        let speakers: Vec<Speaker> = engine.into_iter().flat_map(EngineSpeaker::into_speakers).collect();
        assert_eq!(speakers.len(), 2);
        assert_eq!(speakers[1].speaker_id, 0);
        assert_eq!(speakers[1].style_name, "あまあま");
        assert_eq!(speakers[0].speaker_name, "四国めたん");
    }
}
