
use std::net::IpAddr;

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::config::EngineConfig;
use crate::types::{self, AudioQuery, Speaker};
use crate::{PipelineError, PipelineErrorDescription};

const BODY_EXCERPT_LEN: usize = 200;

/// HTTP client of a VOICEVOX-compatible engine.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct EngineClient {
    http: Client,
    config: EngineConfig,
}

impl EngineClient {
    pub fn new(config: &EngineConfig) -> Result<Self, PipelineError> {
        let url = Url::parse(&config.url).map_err(|e| {
            PipelineError::new(PipelineErrorDescription::InvalidInput(format!("engine url {:?}: {}", config.url, e)))
        })?;

        let mut builder = Client::builder().timeout(config.timeout());
        // A local engine is never reached through a proxy.
        if is_loopback(&url) {
            builder = builder.no_proxy();
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// `POST /audio_query`: builds the timed query for `text`.
    pub async fn audio_query(&self, text: &str, speaker_id: u32) -> Result<AudioQuery, PipelineError> {
        let url = self.url("/audio_query");
        let speaker = speaker_id.to_string();
        let res = self.send("audio_query", || {
            self.http
                .post(&url)
                .query(&[("text", text), ("speaker", speaker.as_str())])
        }).await?;

        let query: AudioQuery = parse_json("audio_query", res).await?;
        query.validate().map_err(|msg| invalid(format!("audio_query: {}", msg)))?;

        log::debug!("audio_query returned {} accent phrases", query.accent_phrases.len());
        Ok(query)
    }

    /// `POST /synthesis`: renders `query` to WAV bytes.
    pub async fn synthesis(&self, query: &AudioQuery, speaker_id: u32) -> Result<Vec<u8>, PipelineError> {
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(json) = serde_json::to_string(query) {
                log::debug!("Synthesizing with JSON: {}", json);
            }
        }

        let url = self.url("/synthesis");
        let res = self.send("synthesis", || {
            self.http
                .post(&url)
                .query(&[("speaker", speaker_id)])
                .json(query)
        }).await?;

        let wav = res.bytes().await?;
        if wav.is_empty() {
            return Err(invalid("synthesis: empty body".to_string()));
        }
        Ok(wav.to_vec())
    }

    /// `GET /speakers`, one row per style.
    pub async fn speakers(&self) -> Result<Vec<Speaker>, PipelineError> {
        let url = self.url("/speakers");
        let res = self.send("speakers", || self.http.get(&url)).await?;
        let speakers: Vec<types::EngineSpeaker> = parse_json("speakers", res).await?;
        Ok(speakers.into_iter().flat_map(types::EngineSpeaker::into_speakers).collect())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    async fn send<F>(&self, endpoint: &'static str, build: F) -> Result<Response, PipelineError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match send_once(endpoint, build()).await {
                Ok(res) => return Ok(res),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff(attempt);
                    log::warn!(
                        "{} (retry {}/{} in {:?})",
                        e,
                        attempt,
                        self.config.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

async fn send_once(endpoint: &'static str, req: RequestBuilder) -> Result<Response, PipelineError> {
    let res = req.send().await?;
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    Err(PipelineError::new(PipelineErrorDescription::Service {
        endpoint,
        status: status.as_u16(),
        body: excerpt(&body),
    }))
}

async fn parse_json<T: DeserializeOwned>(endpoint: &str, res: Response) -> Result<T, PipelineError> {
    let body = res.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| invalid(format!("{}: {}", endpoint, e)))
}

fn is_loopback(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_matches(|c: char| c == '[' || c == ']')
            .parse::<IpAddr>()
            .map_or(false, |ip| ip.is_loopback())
}

fn invalid(msg: String) -> PipelineError {
    PipelineError::new(PipelineErrorDescription::InvalidResponse(msg))
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "あ".repeat(BODY_EXCERPT_LEN + 10);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), BODY_EXCERPT_LEN + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt("  short \n"), "short");
    }

    #[test]
    fn loopback_hosts() {
        assert!(is_loopback(&Url::parse("http://localhost:50021").unwrap()));
        assert!(is_loopback(&Url::parse("http://127.0.0.1:50021").unwrap()));
        assert!(is_loopback(&Url::parse("http://[::1]:50021").unwrap()));
        assert!(!is_loopback(&Url::parse("http://voicevox.internal:50021").unwrap()));
    }

    #[test]
    fn malformed_url_is_invalid_input() {
        let config = EngineConfig {
            url: "not a url".to_string(),
            ..EngineConfig::default()
        };
        let err = EngineClient::new(&config).unwrap_err();
        assert!(matches!(err.as_inner(), PipelineErrorDescription::InvalidInput(_)));
    }

    #[test]
    fn base_url_ignores_trailing_slash() {
        let config = EngineConfig {
            url: "http://127.0.0.1:50021/".to_string(),
            ..EngineConfig::default()
        };
        let client = EngineClient::new(&config).unwrap();
        assert_eq!(client.url("/speakers"), "http://127.0.0.1:50021/speakers");
    }
}
