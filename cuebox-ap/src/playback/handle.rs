//! Playback handles
//!
//! A handle is the caller's view of one playback instance: it reports state and
//! loop count and lets the caller request cancellation.
//!
//! # Threading
//!
//! The state word is written from two threads without a lock: control threads
//! request a stop, the real-time thread marks natural completion. The encoded
//! states are ordered `Playing/PlayingInLoop < StopRequested < Stopped` and
//! every write is a `fetch_max`, so state can only move toward `Stopped`
//! whichever write lands last. The sample source re-reads the state on every pull, so a stop request
//! is observed within one output buffer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// How an asset is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Play to the end, then retire
    #[default]
    Once,
    /// Restart from the beginning until stopped
    Loop,
}

/// State of one playback instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlaybackState {
    Playing = 0,
    PlayingInLoop = 1,
    StopRequested = 2,
    /// Terminal
    Stopped = 3,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackState::Playing,
            1 => PlaybackState::PlayingInLoop,
            2 => PlaybackState::StopRequested,
            _ => PlaybackState::Stopped,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::PlayingInLoop => write!(f, "playing-in-loop"),
            PlaybackState::StopRequested => write!(f, "stop-requested"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug)]
struct HandleShared {
    id: Uuid,
    state: AtomicU8,
    loop_count: AtomicU32,
}

/// Shared handle to one playback instance.
///
/// Cloning is cheap; all clones observe the same instance. The handle outlives
/// the sample source it belongs to.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    shared: Arc<HandleShared>,
}

impl PlaybackHandle {
    pub(crate) fn new(mode: PlayMode) -> Self {
        let state = match mode {
            PlayMode::Once => PlaybackState::Playing,
            PlayMode::Loop => PlaybackState::PlayingInLoop,
        };
        Self {
            shared: Arc::new(HandleShared {
                id: Uuid::new_v4(),
                state: AtomicU8::new(state as u8),
                loop_count: AtomicU32::new(1),
            }),
        }
    }

    /// Identifier used in log records
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Current pass through a looped asset, starting at 1
    pub fn loop_count(&self) -> u32 {
        self.shared.loop_count.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// Takes effect on the next pull from the output callback; has no effect on
    /// a playback that already stopped.
    pub fn stop(&self) {
        self.advance(PlaybackState::StopRequested);
    }

    /// True once the instance has stopped for good
    pub fn is_finished(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    pub(crate) fn mark_stopped(&self) {
        self.advance(PlaybackState::Stopped);
    }

    pub(crate) fn increment_loop(&self) -> u32 {
        self.shared.loop_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn advance(&self, target: PlaybackState) {
        self.shared.state.fetch_max(target as u8, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_follows_mode() {
        assert_eq!(PlaybackHandle::new(PlayMode::Once).state(), PlaybackState::Playing);
        assert_eq!(
            PlaybackHandle::new(PlayMode::Loop).state(),
            PlaybackState::PlayingInLoop
        );
        assert_eq!(PlaybackHandle::new(PlayMode::Loop).loop_count(), 1);
    }

    #[test]
    fn test_stop_after_stopped_does_not_revert() {
        let handle = PlaybackHandle::new(PlayMode::Once);
        handle.mark_stopped();
        handle.stop();
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_stop_request_then_stopped() {
        let handle = PlaybackHandle::new(PlayMode::Loop);
        let clone = handle.clone();
        clone.stop();
        assert_eq!(handle.state(), PlaybackState::StopRequested);
        handle.mark_stopped();
        assert_eq!(clone.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_loop_count_increments_across_threads() {
        let handle = PlaybackHandle::new(PlayMode::Loop);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let h = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        h.increment_loop();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(handle.loop_count(), 1001);
    }
}
