//! The closed set of knowledge tracks
//!
//! A track partitions both the knowledge store (one collection per track)
//! and the context used to prime generation. Names outside the set are
//! rejected when parsed, so no unknown track ever reaches the store.

use crate::errors::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topical partition of the knowledge base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Hvac,
    Nursing,
    Spiritual,
    MentalHealth,
}

impl Track {
    /// Number of known tracks
    pub const COUNT: usize = 4;

    /// Every known track, in declaration order
    pub const ALL: [Track; Track::COUNT] = [
        Track::Hvac,
        Track::Nursing,
        Track::Spiritual,
        Track::MentalHealth,
    ];

    /// Collection name / wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Hvac => "hvac",
            Track::Nursing => "nursing",
            Track::Spiritual => "spiritual",
            Track::MentalHealth => "mental_health",
        }
    }

    /// Context line used to prime track-specific generation
    pub fn context(&self) -> &'static str {
        match self {
            Track::Hvac => "HVAC (Heating, Ventilation, and Air Conditioning) - preparing for careers in residential and commercial HVAC systems",
            Track::Nursing => "Nursing - preparing for careers in patient care and clinical healthcare",
            Track::Spiritual => "Spiritual Health - developing practices for spiritual wellness and Biblical understanding",
            Track::MentalHealth => "Mental Health - building skills in mindfulness, meditation, and emotional wellness",
        }
    }

    /// Parse a track name, accepting surrounding whitespace and any casing
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().to_lowercase();
        Track::ALL
            .into_iter()
            .find(|track| track.as_str() == normalized)
            .ok_or_else(|| RagError::UnknownTrack {
                name: name.to_string(),
                valid: Track::valid_names(),
            })
    }

    /// Comma-separated list of valid track names
    pub fn valid_names() -> String {
        Track::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Position of the track in `Track::ALL`
    pub(crate) fn index(&self) -> usize {
        match self {
            Track::Hvac => 0,
            Track::Nursing => 1,
            Track::Spiritual => 2,
            Track::MentalHealth => 3,
        }
    }
}

impl FromStr for Track {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        Track::parse(s)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tracks() {
        assert_eq!(Track::parse("hvac").unwrap(), Track::Hvac);
        assert_eq!(Track::parse(" Nursing ").unwrap(), Track::Nursing);
        assert_eq!("MENTAL_HEALTH".parse::<Track>().unwrap(), Track::MentalHealth);
    }

    #[test]
    fn test_parse_unknown_track() {
        let err = Track::parse("plumbing").unwrap_err();
        assert!(matches!(err, RagError::UnknownTrack { .. }));
        assert!(err.to_string().contains("mental_health"));
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, track) in Track::ALL.iter().enumerate() {
            assert_eq!(track.index(), i);
        }
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Track::MentalHealth).unwrap();
        assert_eq!(json, "\"mental_health\"");
        let track: Track = serde_json::from_str("\"spiritual\"").unwrap();
        assert_eq!(track, Track::Spiritual);
    }
}
