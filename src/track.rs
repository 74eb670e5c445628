//! Append-only track history
//!
//! The estimator owns the `Track`; everyone else gets `&Track`. Readers that
//! draw incrementally keep a `TrackIndex` cursor and ask for `since(cursor)`
//! instead of copying the whole history every tick.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo;
use crate::types::GeoPoint;

/// Which update produced a track point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    /// Initial fix
    Gps,
    /// Measurement update blended with a fix
    Fused,
    /// Extrapolated from remembered velocity
    Memory,
    /// Extrapolated from inertial integration
    Ins,
}

impl TrackSource {
    pub const ALL: [TrackSource; 4] = [Self::Gps, Self::Fused, Self::Memory, Self::Ins];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Fused => "fused",
            Self::Memory => "memory",
            Self::Ins => "ins",
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub position: GeoPoint,
    pub source: TrackSource,
}

/// Stable handle to one entry of a `Track`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackIndex(usize);

impl TrackIndex {
    pub const START: TrackIndex = TrackIndex(0);

    pub fn get(self) -> usize {
        self.0
    }

    pub fn next(self) -> TrackIndex {
        TrackIndex(self.0 + 1)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Track {
    entries: Vec<TrackEntry>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, position: GeoPoint, source: TrackSource) -> TrackIndex {
        self.entries.push(TrackEntry { position, source });
        TrackIndex(self.entries.len() - 1)
    }

    /// Only `FusionEngine::reset` clears a track; a session never shrinks.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: TrackIndex) -> Option<&TrackEntry> {
        self.entries.get(index.0)
    }

    pub fn last(&self) -> Option<&TrackEntry> {
        self.entries.last()
    }

    /// Index the next appended entry will receive.
    pub fn end(&self) -> TrackIndex {
        TrackIndex(self.entries.len())
    }

    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries
    }

    /// Entries appended at or after `index`. Empty when the cursor is at or
    /// past the end.
    pub fn since(&self, index: TrackIndex) -> &[TrackEntry] {
        let start = index.0.min(self.entries.len());
        &self.entries[start..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackEntry> {
        self.entries.iter()
    }

    pub fn positions(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        self.entries.iter().map(|e| e.position)
    }

    pub fn count(&self, source: TrackSource) -> usize {
        self.entries.iter().filter(|e| e.source == source).count()
    }

    /// Total great-circle length of the track in meters.
    pub fn length_m(&self) -> f64 {
        geo::path_length(self.positions())
    }

    /// Thin the track to roughly `max_points` entries with a uniform stride,
    /// always keeping the final entry.
    pub fn decimate(&self, max_points: usize) -> Vec<TrackEntry> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let step = (self.entries.len() / max_points.max(1)).max(1);
        let last = self.entries.len() - 1;
        let mut out: Vec<TrackEntry> = self.entries.iter().step_by(step).copied().collect();
        if last % step != 0 {
            out.push(self.entries[last]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64) -> GeoPoint {
        GeoPoint { latitude: lat, longitude: 139.0 }
    }

    #[test]
    fn test_push_returns_stable_indices() {
        let mut track = Track::new();
        let a = track.push(p(35.0), TrackSource::Gps);
        let b = track.push(p(35.1), TrackSource::Fused);
        assert_eq!(a.get(), 0);
        assert_eq!(b, a.next());
        assert_eq!(track.get(b).unwrap().source, TrackSource::Fused);
        assert_eq!(track.end().get(), 2);
    }

    #[test]
    fn test_since_cursor() {
        let mut track = Track::new();
        track.push(p(35.0), TrackSource::Gps);
        let cursor = track.end();
        assert!(track.since(cursor).is_empty());
        track.push(p(35.1), TrackSource::Ins);
        track.push(p(35.2), TrackSource::Memory);
        let fresh = track.since(cursor);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[1].source, TrackSource::Memory);
        assert!(track.since(TrackIndex(99)).is_empty());
        assert_eq!(track.since(TrackIndex::START).len(), 3);
    }

    #[test]
    fn test_count_by_source() {
        let mut track = Track::new();
        track.push(p(35.0), TrackSource::Gps);
        for _ in 0..3 {
            track.push(p(35.0), TrackSource::Ins);
        }
        assert_eq!(track.count(TrackSource::Ins), 3);
        assert_eq!(track.count(TrackSource::Memory), 0);
    }

    #[test]
    fn test_decimate_keeps_last() {
        let mut track = Track::new();
        for i in 0..1001 {
            track.push(p(35.0 + i as f64 * 1e-5), TrackSource::Ins);
        }
        let thinned = track.decimate(500);
        // stride 2 over 1001 entries lands on the last one already
        assert_eq!(thinned.len(), 501);
        assert_eq!(thinned.last(), track.last());

        let thinned = track.decimate(300);
        // stride 3 -> 334 points + forced last
        assert_eq!(thinned.len(), 335);
        assert_eq!(thinned.last(), track.last());

        assert_eq!(track.decimate(5000).len(), 1001);
        assert!(Track::new().decimate(10).is_empty());
    }

    #[test]
    fn test_source_serializes_lowercase() {
        let json = serde_json::to_string(&TrackSource::Memory).unwrap();
        assert_eq!(json, "\"memory\"");
        assert_eq!(TrackSource::Fused.to_string(), "fused");
    }
}
