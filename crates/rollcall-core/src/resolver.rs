//! Best-match identity resolution.

use crate::types::{FaceCandidate, Subject};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("subject lookup failed: {0}")]
pub struct DirectoryError(pub String);

/// Lookup of registered subjects by natural key.
pub trait SubjectDirectory: Send + Sync {
    fn find_by_key(&self, key: &str) -> Result<Option<Subject>, DirectoryError>;
}

/// Decision for a single detected face.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Identified(Subject),
    /// The oracle matched a reference image with no subject row behind it.
    Unregistered(String),
    Unknown,
}

/// Maps a face's candidate list to one identity.
///
/// The oracle's first candidate is taken as-is; there is no re-ranking.
/// `min_score`, when set, demotes weak top matches to [`Resolution::Unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    pub min_score: Option<f32>,
}

impl IdentityResolver {
    pub fn new(min_score: Option<f32>) -> Self {
        Self { min_score }
    }

    pub fn resolve(
        &self,
        face: &FaceCandidate,
        directory: &dyn SubjectDirectory,
    ) -> Result<Resolution, DirectoryError> {
        let Some(best) = face.best() else {
            return Ok(Resolution::Unknown);
        };

        if let Some(floor) = self.min_score {
            if best.score < floor {
                tracing::debug!(identity = %best.identity, score = best.score, floor, "top candidate below score floor");
                return Ok(Resolution::Unknown);
            }
        }

        let key = best.subject_key();
        if key.is_empty() {
            return Ok(Resolution::Unknown);
        }

        match directory.find_by_key(&key)? {
            Some(subject) => Ok(Resolution::Identified(subject)),
            None => Ok(Resolution::Unregistered(key)),
        }
    }
}
