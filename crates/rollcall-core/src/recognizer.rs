//! Recognition oracle boundary.
//!
//! The oracle is opaque: it receives a frame and reports, per detected face,
//! a ranked list of candidate identities. Its output is validated here before
//! anything downstream sees it.

use crate::frame::Frame;
use crate::types::{Candidate, FaceCandidate};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("recognition oracle unreachable: {0}")]
    Unavailable(String),
    #[error("recognition oracle timed out")]
    Timeout,
    #[error("recognition oracle rejected request: {0}")]
    Rejected(String),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("frame encoding failed: {0}")]
    Frame(#[from] crate::frame::FrameError),
}

/// External face-recognition capability.
///
/// An empty result means no face was detected. A face whose candidate list is
/// empty was detected but matched nothing.
pub trait RecognitionAdapter: Send + Sync {
    fn recognize(&self, frame: &Frame) -> Result<Vec<FaceCandidate>, RecognitionError>;
}

/// Oracle response as it arrives on the wire, before validation.
///
/// Accepts `{"faces": [...]}` or a bare array of faces. `subject_key` is an
/// alias for `identity`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawResponse {
    Wrapped { faces: Vec<RawFace> },
    Bare(Vec<RawFace>),
}

#[derive(Debug, Deserialize)]
pub struct RawFace {
    #[serde(default)]
    pub candidates: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct RawCandidate {
    #[serde(alias = "subject_key", alias = "subjectKey")]
    pub identity: String,
    pub score: f32,
}

impl RawResponse {
    /// Validate into [`FaceCandidate`]s, preserving the oracle's ordering.
    pub fn validate(self) -> Result<Vec<FaceCandidate>, RecognitionError> {
        let faces = match self {
            RawResponse::Wrapped { faces } | RawResponse::Bare(faces) => faces,
        };

        faces
            .into_iter()
            .enumerate()
            .map(|(face_idx, face)| {
                let candidates = face
                    .candidates
                    .into_iter()
                    .enumerate()
                    .map(|(rank, c)| {
                        if c.identity.trim().is_empty() {
                            return Err(RecognitionError::Malformed(format!(
                                "face {face_idx} candidate {rank}: empty identity"
                            )));
                        }
                        if !c.score.is_finite() {
                            return Err(RecognitionError::Malformed(format!(
                                "face {face_idx} candidate {rank}: non-finite score"
                            )));
                        }
                        Ok(Candidate::new(c.identity, c.score))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FaceCandidate::new(candidates))
            })
            .collect()
    }
}

/// Parse and validate an oracle response body.
pub fn parse_response(body: &str) -> Result<Vec<FaceCandidate>, RecognitionError> {
    let raw: RawResponse = serde_json::from_str(body)
        .map_err(|e| RecognitionError::Malformed(e.to_string()))?;
    raw.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_response() {
        let body = r#"{"faces": [
            {"candidates": [{"identity": "images/alice.jpg", "score": 0.91},
                            {"identity": "images/bob.jpg", "score": 0.55}]},
            {"candidates": []}
        ]}"#;
        let faces = parse_response(body).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].candidates.len(), 2);
        assert_eq!(faces[0].best().unwrap().subject_key(), "alice");
        assert!(faces[1].candidates.is_empty());
    }

    #[test]
    fn test_parse_bare_array_with_alias() {
        let body = r#"[{"candidates": [{"subject_key": "carol", "score": 0.7}]}]"#;
        let faces = parse_response(body).unwrap();
        assert_eq!(faces[0].best().unwrap().identity, "carol");
    }

    #[test]
    fn test_parse_preserves_oracle_order() {
        // Lower score first: the oracle's ranking is authoritative, no re-sort.
        let body = r#"[{"candidates": [{"identity": "x", "score": 0.2}, {"identity": "y", "score": 0.9}]}]"#;
        let faces = parse_response(body).unwrap();
        assert_eq!(faces[0].best().unwrap().identity, "x");
    }

    #[test]
    fn test_parse_missing_candidates_is_empty_face() {
        let faces = parse_response(r#"{"faces": [{}]}"#).unwrap();
        assert_eq!(faces, vec![FaceCandidate::default()]);
    }

    #[test]
    fn test_parse_no_faces() {
        assert!(parse_response(r#"{"faces": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_reject_empty_identity() {
        let body = r#"[{"candidates": [{"identity": "  ", "score": 0.7}]}]"#;
        assert!(matches!(parse_response(body), Err(RecognitionError::Malformed(_))));
    }

    #[test]
    fn test_reject_wrong_shape() {
        assert!(matches!(
            parse_response(r#"{"identity": "alice"}"#),
            Err(RecognitionError::Malformed(_))
        ));
    }
}
