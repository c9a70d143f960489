use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Forced readings for terms the engine would otherwise mispronounce.
///
/// Replacements run in insertion order, so a reading may itself be matched by
/// a later key. Only the text sent to the engine is rewritten; subtitles keep
/// the original wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PronunciationMap {
    entries: Vec<(String, String)>,
}

impl Default for PronunciationMap {
    fn default() -> Self {
        Self::from_pairs([
            ("Remotion", "リモーション"),
            ("React", "リアクト"),
            ("TypeScript", "タイプスクリプト"),
            ("useCurrentFrame", "ユーズカレントフレーム"),
            ("interpolate", "インターポレート"),
            ("pnpm", "ピーエヌピーエム"),
            ("Studio", "スタジオ"),
        ])
    }
}

impl PronunciationMap {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::empty();
        for (word, reading) in pairs {
            map.insert(word, reading);
        }
        map
    }

    /// Adds a reading, or replaces the reading of an existing word in place.
    pub fn insert(&mut self, word: impl Into<String>, reading: impl Into<String>) {
        let word = word.into();
        let reading = reading.into();
        match self.entries.iter_mut().find(|(w, _)| *w == word) {
            Some(entry) => entry.1 = reading,
            None => self.entries.push((word, reading)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(w, r)| (w.as_str(), r.as_str()))
    }

    /// Returns the text to send to the engine.
    pub fn apply(&self, text: &str) -> String {
        self.entries
            .iter()
            .filter(|(word, _)| !word.is_empty())
            .fold(text.to_owned(), |acc, (word, reading)| acc.replace(word.as_str(), reading))
    }
}

impl Serialize for PronunciationMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (word, reading) in &self.entries {
            map.serialize_entry(word, reading)?;
        }
        map.end()
    }
}

struct PronunciationMapVisitor;

impl<'de> Visitor<'de> for PronunciationMapVisitor {
    type Value = PronunciationMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping words to readings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = PronunciationMap::empty();
        while let Some((word, reading)) = access.next_entry::<String, String>()? {
            map.insert(word, reading);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for PronunciationMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PronunciationMapVisitor)
    }
}
