//! Source decoding its asset on demand
//!
//! Each instance opens its own decoder (and resampler) on the first pull and
//! decodes packets until the request is filled, so a read is only short at
//! the end of the file. A stop request is honored between pulls; a decode in
//! progress always completes first.

use super::{effective_gain, gate, Gate, SampleSource};
use crate::audio::asset::AudioAsset;
use crate::audio::decoder::AudioDecoder;
use crate::audio::resampler::StreamResampler;
use crate::error::Result;
use crate::playback::handle::PlaybackHandle;
use crate::playback::volume::{apply_gain, MasterVolume};
use cuebox_common::WaveFormat;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Decoder state owned by one streaming instance
struct DecodeStream {
    decoder: AudioDecoder,
    resampler: Option<StreamResampler>,
    /// Resampler tail already flushed
    flushed: bool,
    block: Vec<f32>,
}

impl DecodeStream {
    fn open(asset: &AudioAsset) -> Result<Self> {
        let (decoder, resampler) = asset.open_stream()?;
        Ok(Self {
            decoder,
            resampler,
            flushed: false,
            block: Vec::new(),
        })
    }

    /// Decode until `out` holds at least one sample. `Ok(false)` at end of stream.
    fn next_block(&mut self, out: &mut Vec<f32>) -> Result<bool> {
        loop {
            self.block.clear();
            match self.decoder.decode_next(&mut self.block)? {
                Some(_) => match self.resampler.as_mut() {
                    None => {
                        out.extend_from_slice(&self.block);
                        return Ok(true);
                    }
                    Some(resampler) => {
                        resampler.process(&self.block, out)?;
                        if !out.is_empty() {
                            return Ok(true);
                        }
                    }
                },
                None => {
                    if let Some(resampler) = self.resampler.as_mut() {
                        if !self.flushed {
                            self.flushed = true;
                            resampler.finish(out)?;
                            if !out.is_empty() {
                                return Ok(true);
                            }
                        }
                    }
                    return Ok(false);
                }
            }
        }
    }
}

/// Playback instance of a streaming asset.
pub struct StreamingSampleSource {
    asset: Arc<AudioAsset>,
    handle: PlaybackHandle,
    master: Arc<MasterVolume>,
    parallel: bool,

    stream: Option<DecodeStream>,

    /// Decoder resources have been given up for good
    released: bool,

    /// Decoded samples not yet handed out
    pending: Vec<f32>,
    pending_pos: usize,
}

impl StreamingSampleSource {
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
            stream: None,
            released: false,
            pending: Vec::new(),
            pending_pos: 0,
        }
    }

    fn drain_pending(&mut self, out: &mut [f32]) -> usize {
        let available = &self.pending[self.pending_pos..];
        let n = out.len().min(available.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        n
    }

    /// Decode the next block into `pending`; `Ok(false)` at end of stream
    fn refill(&mut self) -> Result<bool> {
        if self.released {
            return Ok(false);
        }
        if self.stream.is_none() {
            self.stream = Some(DecodeStream::open(&self.asset)?);
        }

        self.pending.clear();
        self.pending_pos = 0;
        match self.stream.as_mut() {
            Some(stream) => stream.next_block(&mut self.pending),
            None => Ok(false),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.stream = None;
        self.pending.clear();
        self.pending_pos = 0;
        self.stream = Some(DecodeStream::open(&self.asset)?);
        let pass = self.handle.increment_loop();
        trace!("Playback {} reopened stream, pass {}", self.handle.id(), pass);
        Ok(())
    }

    /// Decode ahead into the drained `pending`; reopen the stream if it ended
    fn peek_or_rewind(&mut self) -> Result<()> {
        if self.refill()? {
            return Ok(());
        }
        self.rewind()
    }

    /// Give up decoder resources; only the first call has an effect
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stream = None;
        self.pending = Vec::new();
        self.pending_pos = 0;
        debug!("Playback {} released decoder for {}", self.handle.id(), self.asset.path().display());
    }

    fn retire(&mut self) -> usize {
        self.release();
        self.handle.mark_stopped();
        0
    }
}

impl SampleSource for StreamingSampleSource {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let looping = match gate(&self.handle) {
            Gate::Retire => {
                self.release();
                return 0;
            }
            Gate::Run { looping } => looping,
        };

        let gain = effective_gain(&self.master, self.asset.volume());
        let count = buffer.len();
        let mut written = 0;
        // Set after a rewind, cleared once the new pass yields data
        let mut wrapped_without_data = false;

        while written < count {
            written += self.drain_pending(&mut buffer[written..]);
            if written == count {
                break;
            }

            match self.refill() {
                Ok(true) => wrapped_without_data = false,
                Ok(false) if looping => {
                    if wrapped_without_data {
                        // Nothing to loop over
                        buffer[written..].fill(0.0);
                        written = count;
                        break;
                    }
                    if let Err(e) = self.rewind() {
                        error!("Playback {} failed to reopen {}: {}", self.handle.id(), self.asset.path().display(), e);
                        return self.retire();
                    }
                    wrapped_without_data = true;
                }
                Ok(false) => break,
                Err(e) => {
                    error!("Playback {} decode fault, retiring: {}", self.handle.id(), e);
                    return self.retire();
                }
            }
        }

        if written == 0 {
            trace!("Playback {} reached end of stream", self.handle.id());
            return self.retire();
        }

        // Wrap as soon as the pass is exhausted so the pass count is current
        if looping && !wrapped_without_data && self.pending_pos >= self.pending.len() {
            if let Err(e) = self.peek_or_rewind() {
                error!("Playback {} decode fault, retiring: {}", self.handle.id(), e);
                self.release();
                self.handle.mark_stopped();
            }
        }

        apply_gain(&mut buffer[..written], gain, self.parallel);
        written
    }

    fn format(&self) -> WaveFormat {
        self.asset.format()
    }
}

impl Drop for StreamingSampleSource {
    fn drop(&mut self) {
        // Dropped by the mixer teardown while still playing
        self.release();
        self.handle.mark_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::asset::LoadOptions;
    use crate::playback::handle::{PlayMode, PlaybackState};
    use std::path::Path;

    fn write_ramp(path: &Path, frames: usize) -> Vec<f32> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let data: Vec<f32> = (0..frames).map(|i| (i as f32 + 1.0) / frames as f32).collect();
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in &data {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        data
    }

    fn drain(src: &mut StreamingSampleSource, chunk: usize, limit: usize) -> Vec<f32> {
        let mut pulled = Vec::new();
        let mut out = vec![0.0; chunk];
        while pulled.len() < limit {
            let n = src.read(&mut out);
            if n == 0 {
                break;
            }
            pulled.extend_from_slice(&out[..n]);
        }
        pulled
    }

    #[test]
    fn test_streams_whole_file_then_retires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let data = write_ramp(&path, 5000);

        let asset = AudioAsset::load(&path, &LoadOptions::default().cached(false).volume(0.5)).unwrap();
        assert!(!asset.is_cached());
        let handle = PlaybackHandle::new(PlayMode::Once);
        let mut src = StreamingSampleSource::new(asset, handle.clone(), Arc::new(MasterVolume::default()), false);

        let pulled = drain(&mut src, 700, usize::MAX);
        assert_eq!(pulled.len(), data.len());
        for (p, s) in pulled.iter().zip(data.iter()) {
            assert!((p - s * 0.5).abs() < 1e-6);
        }
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert!(src.released);
    }

    #[test]
    fn test_loop_reopens_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let data = write_ramp(&path, 1000);

        let asset = AudioAsset::load(&path, &LoadOptions::default().cached(false)).unwrap();
        let handle = PlaybackHandle::new(PlayMode::Loop);
        let mut src = StreamingSampleSource::new(asset, handle.clone(), Arc::new(MasterVolume::default()), false);

        let pulled = drain(&mut src, 512, 2500);
        assert!(pulled.len() >= 2500);
        for (i, s) in pulled.iter().enumerate() {
            assert_eq!(*s, data[i % 1000]);
        }
        assert_eq!(handle.loop_count(), 3);
        assert_eq!(handle.state(), PlaybackState::PlayingInLoop);

        handle.stop();
        let mut out = vec![0.0; 16];
        assert_eq!(src.read(&mut out), 0);
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert!(src.released);
    }

    #[test]
    fn test_file_removed_after_load_retires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.wav");
        write_ramp(&path, 100);

        let asset = AudioAsset::load(&path, &LoadOptions::default().cached(false)).unwrap();
        std::fs::remove_file(&path).unwrap();

        let handle = PlaybackHandle::new(PlayMode::Once);
        let mut src = StreamingSampleSource::new(asset, handle.clone(), Arc::new(MasterVolume::default()), false);
        let mut out = vec![0.0; 64];
        assert_eq!(src.read(&mut out), 0);
        assert_eq!(handle.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_loop_count_current_at_exact_pass_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 1000);

        let asset = AudioAsset::load(&path, &LoadOptions::default().cached(false)).unwrap();
        let handle = PlaybackHandle::new(PlayMode::Loop);
        let mut src = StreamingSampleSource::new(asset, handle.clone(), Arc::new(MasterVolume::default()), false);

        // Two whole passes in chunks of 250
        let pulled = drain(&mut src, 250, 2000);
        assert_eq!(pulled.len(), 2000);
        assert_eq!(handle.loop_count(), 3);

        let mut out = vec![0.0; 10];
        assert_eq!(src.read(&mut out), 10);
        assert_eq!(handle.loop_count(), 3);
        assert_eq!(out[0], pulled[0]);
    }

    #[test]
    fn test_drop_marks_handle_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 1000);

        let asset = AudioAsset::load(&path, &LoadOptions::default().cached(false)).unwrap();
        let handle = PlaybackHandle::new(PlayMode::Loop);
        let mut src = StreamingSampleSource::new(asset, handle.clone(), Arc::new(MasterVolume::default()), false);
        let mut out = vec![0.0; 100];
        src.read(&mut out);

        drop(src);
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert!(handle.is_finished());
    }
}
