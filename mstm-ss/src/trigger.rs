//! Playback trigger
//!
//! One-shot state machine deciding when a stream session counts as a play.
//! Starts `Pending`, moves to `Fired` once, and ignores every later callback.
//!
//! Two firing rules exist, selected by [`TriggerPolicy`]:
//!
//! - **Asymmetric** (default): ranged requests fire when
//!   `(range.start + sent) / size` reaches the threshold; full-extent requests
//!   fire only after the whole body has been written.
//! - **Threshold**: both request kinds use the threshold rule on every chunk.
//!
//! Anonymous sessions still move to `Fired` but never build an event.

use crate::events::{EventDispatcher, PlaybackEvent};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Default fraction of a track that counts as a play
pub const DEFAULT_PLAY_THRESHOLD: f64 = 0.30;

/// How full-extent requests are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPolicy {
    /// Ranged requests use the threshold, full-extent requests fire on completion
    #[default]
    Asymmetric,

    /// Every request uses the threshold
    Threshold,
}

impl FromStr for TriggerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asymmetric" => Ok(TriggerPolicy::Asymmetric),
            "threshold" => Ok(TriggerPolicy::Threshold),
            other => Err(format!("unknown trigger policy: {}", other)),
        }
    }
}

/// Trigger state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Pending,
    Fired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FireRule {
    /// `(offset + sent) / size >= threshold`
    Threshold { offset: u64, size: u64, threshold: f64 },

    /// Whole body written
    OnCompletion,
}

/// Per-session playback trigger
#[derive(Debug)]
pub struct PlaybackTrigger {
    state: TriggerState,
    rule: FireRule,
    user_id: Option<u64>,
    media_id: u64,
    dispatcher: EventDispatcher,
}

impl PlaybackTrigger {
    /// Trigger for a partial (206) delivery starting at `range_start`
    pub fn for_range(
        range_start: u64,
        size: u64,
        threshold: f64,
        user_id: Option<u64>,
        media_id: u64,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            state: TriggerState::Pending,
            rule: FireRule::Threshold {
                offset: range_start,
                size,
                threshold,
            },
            user_id,
            media_id,
            dispatcher,
        }
    }

    /// Trigger for a full-extent (200) delivery
    pub fn for_full_extent(
        policy: TriggerPolicy,
        size: u64,
        threshold: f64,
        user_id: Option<u64>,
        media_id: u64,
        dispatcher: EventDispatcher,
    ) -> Self {
        let rule = match policy {
            TriggerPolicy::Asymmetric => FireRule::OnCompletion,
            TriggerPolicy::Threshold => FireRule::Threshold {
                offset: 0,
                size,
                threshold,
            },
        };

        Self {
            state: TriggerState::Pending,
            rule,
            user_id,
            media_id,
            dispatcher,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Progress callback from the delivery loop
    pub fn on_bytes_sent(&mut self, sent: u64) {
        if self.state == TriggerState::Fired {
            return;
        }

        if let FireRule::Threshold {
            offset,
            size,
            threshold,
        } = self.rule
        {
            if size > 0 && (offset + sent) as f64 / size as f64 >= threshold {
                debug!(
                    song_id = self.media_id,
                    sent, offset, size, "Play threshold reached"
                );
                self.fire();
            }
        }
    }

    /// The whole body has been written
    pub fn on_delivery_complete(&mut self) {
        if self.state == TriggerState::Pending && self.rule == FireRule::OnCompletion {
            self.fire();
        }
    }

    fn fire(&mut self) {
        self.state = TriggerState::Fired;

        match self.user_id {
            Some(user_id) => {
                self.dispatcher
                    .dispatch(PlaybackEvent::new(user_id, self.media_id));
            }
            None => {
                debug!(
                    song_id = self.media_id,
                    "No authenticated user, skipping playback event"
                );
            }
        }
    }
}
