//! Shared player state of a room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Playback state as last written by a controller
///
/// `current_time` is the position (seconds) at `playback_start`. While playing,
/// the live position keeps advancing from there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub playing: bool,
    pub current_time: f64,
    pub playback_start: DateTime<Utc>,
}

impl PlayerState {
    /// Paused at the beginning
    pub fn reset(now: DateTime<Utc>) -> Self {
        Self {
            playing: false,
            current_time: 0.0,
            playback_start: now,
        }
    }

    /// The state as a late joiner should see it at `now`
    pub fn at(&self, now: DateTime<Utc>) -> Self {
        let mut state = self.clone();
        if self.playing {
            let elapsed = now.signed_duration_since(self.playback_start);
            state.current_time += elapsed.num_milliseconds().max(0) as f64 / 1000.0;
        }
        state
    }
}
