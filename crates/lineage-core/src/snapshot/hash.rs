//! Deterministic SHA-256 content hash of a branch snapshot.
//!
//! # Canonical form
//!
//! The snapshot is rendered as canonical JSON (keys sorted at every depth,
//! compact) before hashing:
//!
//! ```text
//! {"events":[{"kind":..,"payload":..,"tool_calls":[..]},..],
//!  "name":..,
//!  "vectors":[{"embedding":["0.5",..],"id":..,"metadata":{..},"text":..},..]}
//! ```
//!
//! Embedding components are rendered as strings so float formatting never
//! depends on a JSON encoder:
//!
//! - shortest round-trip decimal by default, or a fixed number of decimal
//!   places when [`HashConfig::float_decimals`] is set;
//! - negative zero (including values that round to it) renders as zero;
//! - `NaN`, `inf` and `-inf` render as those literals.
//!
//! # Digest format
//!
//! 64 lowercase hex characters. Verification compares case-insensitively.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::config::{HashConfig, MAX_FLOAT_DECIMALS};
use crate::error::ErrorCode;
use crate::event::PipelineEvent;
use crate::event::canonical::canonicalize_json;

use super::{BranchSnapshot, SerializableVector};

/// Length of a rendered digest.
pub const HASH_HEX_LEN: usize = 64;

/// Errors from hash verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// A required argument was empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl HashError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }
}

/// Computes snapshot digests under one float formatting policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentHasher {
    config: HashConfig,
}

impl ContentHasher {
    #[must_use]
    pub const fn new(config: HashConfig) -> Self {
        Self { config }
    }

    /// The canonical string the digest is computed over.
    #[must_use]
    pub fn canonical_form(&self, snapshot: &BranchSnapshot) -> String {
        let events: Vec<Value> = snapshot.events().iter().map(event_value).collect();
        let vectors: Vec<Value> = snapshot
            .vectors()
            .iter()
            .map(|v| self.vector_value(v))
            .collect();

        canonicalize_json(&json!({
            "name": snapshot.name(),
            "events": events,
            "vectors": vectors,
        }))
    }

    /// SHA-256 of the canonical form, as 64 lowercase hex characters.
    #[must_use]
    pub fn compute_hash(&self, snapshot: &BranchSnapshot) -> String {
        let digest = Sha256::digest(self.canonical_form(snapshot).as_bytes());
        format!("{digest:x}")
    }

    /// Recompute the digest and compare it to `expected`, ignoring case and
    /// surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidArgument`] if `expected` is blank.
    pub fn verify_hash(
        &self,
        snapshot: &BranchSnapshot,
        expected: &str,
    ) -> Result<bool, HashError> {
        let expected = expected.trim();
        if expected.is_empty() {
            return Err(HashError::InvalidArgument(
                "expected hash must not be empty".into(),
            ));
        }

        let actual = self.compute_hash(snapshot);
        let matches = actual.eq_ignore_ascii_case(expected);
        if !matches {
            tracing::warn!(
                branch = snapshot.name(),
                expected,
                actual = %actual,
                "snapshot hash mismatch"
            );
        }
        Ok(matches)
    }

    /// Pair a snapshot with its digest without modifying it.
    #[must_use]
    pub fn with_hash(&self, snapshot: BranchSnapshot) -> (BranchSnapshot, String) {
        let digest = self.compute_hash(&snapshot);
        (snapshot, digest)
    }

    fn vector_value(&self, vector: &SerializableVector) -> Value {
        let embedding: Vec<String> = vector
            .embedding
            .iter()
            .map(|&c| self.format_component(c))
            .collect();
        json!({
            "id": vector.id,
            "text": vector.text,
            "metadata": vector.metadata,
            "embedding": embedding,
        })
    }

    fn format_component(&self, value: f32) -> String {
        if value.is_nan() {
            return "NaN".to_owned();
        }
        if value.is_infinite() {
            return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
        }

        let rendered = match self.config.float_decimals {
            Some(places) => {
                let prec = places.min(MAX_FLOAT_DECIMALS) as usize;
                format!("{value:.prec$}")
            }
            None => format!("{value}"),
        };

        match rendered.strip_prefix('-') {
            Some(magnitude) if magnitude.chars().all(|c| c == '0' || c == '.') => {
                magnitude.to_owned()
            }
            _ => rendered,
        }
    }
}

fn event_value(event: &PipelineEvent) -> Value {
    json!({
        "kind": event.kind,
        "payload": event.payload,
        "tool_calls": event.tool_calls,
    })
}

/// [`ContentHasher::compute_hash`] with the default config.
#[must_use]
pub fn compute_hash(snapshot: &BranchSnapshot) -> String {
    ContentHasher::default().compute_hash(snapshot)
}

/// [`ContentHasher::verify_hash`] with the default config.
///
/// # Errors
///
/// Returns [`HashError::InvalidArgument`] if `expected` is blank.
pub fn verify_hash(snapshot: &BranchSnapshot, expected: &str) -> Result<bool, HashError> {
    ContentHasher::default().verify_hash(snapshot, expected)
}

/// [`ContentHasher::with_hash`] with the default config.
#[must_use]
pub fn with_hash(snapshot: BranchSnapshot) -> (BranchSnapshot, String) {
    ContentHasher::default().with_hash(snapshot)
}
