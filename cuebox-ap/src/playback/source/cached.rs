//! Source reading a pre-decoded asset buffer
//!
//! Never blocks and never allocates; safe to pull from the real-time callback.

use super::{effective_gain, gate, Gate, SampleSource};
use crate::audio::asset::AudioAsset;
use crate::playback::handle::PlaybackHandle;
use crate::playback::volume::{apply_gain, MasterVolume};
use cuebox_common::WaveFormat;
use std::sync::Arc;
use tracing::trace;

/// Playback instance of a cached asset.
pub struct CachedSampleSource {
    asset: Arc<AudioAsset>,
    handle: PlaybackHandle,
    master: Arc<MasterVolume>,
    parallel: bool,

    /// Next sample index into the asset buffer
    position: usize,
}

impl CachedSampleSource {
    pub fn new(
        asset: Arc<AudioAsset>,
        handle: PlaybackHandle,
        master: Arc<MasterVolume>,
        parallel: bool,
    ) -> Self {
        Self {
            asset,
            handle,
            master,
            parallel,
            position: 0,
        }
    }

    /// Copy as much as fits from the cursor, advancing it
    fn take(&mut self, samples: &[f32], out: &mut [f32]) -> usize {
        let n = out.len().min(samples.len().saturating_sub(self.position));
        out[..n].copy_from_slice(&samples[self.position..self.position + n]);
        self.position += n;
        n
    }

    fn rewind(&mut self) {
        self.position = 0;
        let pass = self.handle.increment_loop();
        trace!("Playback {} wrapped, pass {}", self.handle.id(), pass);
    }
}

impl SampleSource for CachedSampleSource {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let looping = match gate(&self.handle) {
            Gate::Retire => return 0,
            Gate::Run { looping } => looping,
        };

        let gain = effective_gain(&self.master, self.asset.volume());
        let asset = Arc::clone(&self.asset);
        let samples = asset.samples().unwrap_or(&[]);
        let count = buffer.len();

        if !looping {
            let written = self.take(samples, buffer);
            if written == 0 {
                self.handle.mark_stopped();
                trace!("Playback {} finished", self.handle.id());
                return 0;
            }
            apply_gain(&mut buffer[..written], gain, self.parallel);
            return written;
        }

        if samples.is_empty() {
            buffer.fill(0.0);
            self.rewind();
            return count;
        }

        let mut written = 0;
        while written < count {
            if self.position >= samples.len() {
                self.rewind();
            }
            written += self.take(samples, &mut buffer[written..]);
        }
        // Wrap as soon as the end is reached so the pass count is current
        if self.position >= samples.len() {
            self.rewind();
        }

        apply_gain(buffer, gain, self.parallel);
        count
    }

    fn format(&self) -> WaveFormat {
        self.asset.format()
    }
}

impl Drop for CachedSampleSource {
    fn drop(&mut self) {
        // Dropped by the mixer teardown while still playing
        self.handle.mark_stopped();
    }
}
