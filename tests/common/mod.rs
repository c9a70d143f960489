//! A loopback stand-in for the VOICEVOX engine.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn wav(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "audio/wav",
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// Holds the response back, as a busy engine would.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

pub struct FakeEngine {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeEngine {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Responder = Arc::new(responder);

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle(stream, responder.clone(), log.clone()));
            }
        });

        Self { addr, requests }
    }

    /// Answers like a healthy engine: a fixed query and a short WAV.
    pub async fn healthy() -> Self {
        Self::start(default_reply).await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

pub fn default_reply(req: &Recorded) -> Reply {
    match req.path.as_str() {
        "/audio_query" => Reply::json(QUERY),
        "/synthesis" => Reply::wav(wav_bytes(16000, 1600)),
        "/speakers" => Reply::json(SPEAKERS),
        _ => Reply::status(404, r#"{"detail": "Not Found"}"#),
    }
}

async fn handle(mut stream: TcpStream, responder: Responder, log: Arc<Mutex<Vec<Recorded>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
    }

    let url = reqwest::Url::parse(&format!("http://engine{}", target)).unwrap();
    let recorded = Recorded {
        method,
        path: url.path().to_string(),
        query: url.query_pairs().into_owned().collect(),
        body: buf[header_end..header_end + content_length].to_vec(),
    };

    let reply = responder(&recorded);
    log.lock().unwrap().push(recorded);
    tokio::time::sleep(reply.delay).await;

    let head = format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&reply.body).await;
    let _ = stream.shutdown().await;
}

pub fn wav_bytes(sample_rate: u32, samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// "コン、ニチ": 0.1s lead-in, 0.3s pause, 0.12s tail.
/// Duration = 0.1 + (0.15 + 0.08) + 0.3 + (0.12 + 0.15) + 0.12 = 1.02s.
pub const QUERY: &str = r#"{
    "accent_phrases": [
        {
            "moras": [
                {"text": "コ", "consonant": "k", "consonant_length": 0.05, "vowel": "o", "vowel_length": 0.1, "pitch": 5.5},
                {"text": "ン", "consonant": null, "consonant_length": null, "vowel": "N", "vowel_length": 0.08, "pitch": 5.6}
            ],
            "accent": 1,
            "pause_mora": {"text": "、", "consonant": null, "consonant_length": null, "vowel": "pau", "vowel_length": 0.3, "pitch": 0.0},
            "is_interrogative": false
        },
        {
            "moras": [
                {"text": "ニ", "consonant": "n", "consonant_length": 0.04, "vowel": "i", "vowel_length": 0.08, "pitch": 5.8},
                {"text": "チ", "consonant": "ch", "consonant_length": 0.07, "vowel": "i", "vowel_length": 0.08, "pitch": 5.7}
            ],
            "accent": 2,
            "pause_mora": null,
            "is_interrogative": false
        }
    ],
    "speedScale": 1.0,
    "pitchScale": 0.0,
    "intonationScale": 1.0,
    "volumeScale": 1.0,
    "prePhonemeLength": 0.1,
    "postPhonemeLength": 0.12,
    "pauseLength": null,
    "pauseLengthScale": 1.0,
    "outputSamplingRate": 24000,
    "outputStereo": true,
    "kana": "コ'ン、ニチ'"
}"#;

pub const QUERY_DURATION_SEC: f64 = 1.02;

pub const SPEAKERS: &str = r#"[
    {"name": "四国めたん", "speaker_uuid": "7ffcb7ce", "styles": [{"name": "ノーマル", "id": 2}, {"name": "あまあま", "id": 0}], "version": "0.14.0"},
    {"name": "ずんだもん", "speaker_uuid": "388f246b", "styles": [{"name": "ノーマル", "id": 3}], "version": "0.14.0"}
]"#;
