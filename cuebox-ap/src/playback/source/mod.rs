//! Pull-based sample sources
//!
//! One source exists per playback instance. The mixer pulls it from the output
//! callback; a pull that returns zero samples retires the source.
//!
//! Every pull follows the same steps:
//! 1. Snapshot the handle state once.
//! 2. On a stop request mark the handle stopped and return 0.
//! 3. Compute the gain as master volume times asset volume.
//! 4. Produce samples from the cached buffer or the decoder.
//! 5. Apply the gain (zero, passthrough or multiply fast paths).
//! 6. At end of data, a looped source rewinds and keeps filling; a one-shot
//!    source releases its decoder, marks the handle stopped and returns 0.

mod cached;
mod channel_map;
mod streaming;

pub use cached::CachedSampleSource;
pub use channel_map::ChannelMap;
pub use streaming::StreamingSampleSource;

use crate::playback::handle::{PlaybackHandle, PlaybackState};
use crate::playback::volume::MasterVolume;
use cuebox_common::WaveFormat;

/// Producer of interleaved f32 samples.
pub trait SampleSource: Send {
    /// Fill `buffer` from the front and return the number of samples written.
    ///
    /// Returning 0 signals exhaustion and the mixer drops the source. A short,
    /// non-zero count is not end of stream.
    fn read(&mut self, buffer: &mut [f32]) -> usize;

    /// Format of the produced samples
    fn format(&self) -> WaveFormat;
}

/// Result of the state check at the top of a pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Run { looping: bool },
    Retire,
}

fn gate(handle: &PlaybackHandle) -> Gate {
    match handle.state() {
        PlaybackState::Playing => Gate::Run { looping: false },
        PlaybackState::PlayingInLoop => Gate::Run { looping: true },
        PlaybackState::StopRequested => {
            handle.mark_stopped();
            Gate::Retire
        }
        PlaybackState::Stopped => Gate::Retire,
    }
}

/// Master volume times asset volume
fn effective_gain(master: &MasterVolume, asset_volume: f32) -> f32 {
    master.get() * asset_volume
}
