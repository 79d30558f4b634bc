//! rollcall-oracle: HTTP client for the face-recognition oracle.
//!
//! Posts each frame as `image/jpeg` and expects
//! `{"faces": [{"candidates": [{"identity": "...", "score": 0.9}]}]}` back.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use rollcall_core::recognizer::parse_response;
use rollcall_core::{FaceCandidate, Frame, RecognitionAdapter, RecognitionError};
use std::time::{Duration, Instant};

/// Longest slice of an error body carried into a `Rejected` message.
const MAX_ERROR_BODY: usize = 200;

pub struct HttpRecognizer {
    url: Url,
    client: Client,
}

impl HttpRecognizer {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RecognitionError> {
        let url = Url::parse(url)
            .map_err(|e| RecognitionError::Unavailable(format!("invalid oracle url {url}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

fn transport_error(e: reqwest::Error) -> RecognitionError {
    if e.is_timeout() {
        RecognitionError::Timeout
    } else {
        RecognitionError::Unavailable(e.to_string())
    }
}

impl RecognitionAdapter for HttpRecognizer {
    fn recognize(&self, frame: &Frame) -> Result<Vec<FaceCandidate>, RecognitionError> {
        let started = Instant::now();
        let jpeg = frame.to_jpeg()?;

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        if !status.is_success() {
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(RecognitionError::Rejected(format!("{status}: {snippet}")));
        }

        let faces = parse_response(&body)?;
        tracing::debug!(
            faces = faces.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "oracle responded"
        );
        Ok(faces)
    }
}
