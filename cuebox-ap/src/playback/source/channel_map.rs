//! Channel count adapter between a source and the output

use super::SampleSource;
use crate::error::{Error, Result};
use cuebox_common::WaveFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mapping {
    /// Duplicate one channel into every output channel
    Upmix(u16),
    /// Average all input channels into one
    Downmix(u16),
}

/// Wraps a source whose channel count differs from the output.
///
/// Only mono to N and N to mono are supported; other layouts have no
/// unambiguous mapping.
pub struct ChannelMap {
    inner: Box<dyn SampleSource>,
    mapping: Mapping,
    output: WaveFormat,
    scratch: Vec<f32>,
}

impl ChannelMap {
    pub fn new(inner: Box<dyn SampleSource>, output: WaveFormat) -> Result<Self> {
        let input = inner.format();
        let mapping = match (input.channels(), output.channels()) {
            (1, n) if n > 1 => Mapping::Upmix(n),
            (n, 1) if n > 1 => Mapping::Downmix(n),
            (from, to) => {
                return Err(Error::ChannelMismatch {
                    asset: from,
                    engine: to,
                })
            }
        };
        Ok(Self {
            inner,
            mapping,
            output,
            scratch: Vec::new(),
        })
    }
}

impl SampleSource for ChannelMap {
    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let (frames, wanted) = match self.mapping {
            Mapping::Upmix(n) => {
                let frames = buffer.len() / n as usize;
                (frames, frames)
            }
            Mapping::Downmix(n) => (buffer.len(), buffer.len() * n as usize),
        };
        if frames == 0 {
            // Buffer smaller than one output frame
            buffer.fill(0.0);
            return buffer.len();
        }

        if self.scratch.len() < wanted {
            self.scratch.resize(wanted, 0.0);
        }
        let got = self.inner.read(&mut self.scratch[..wanted]);
        if got == 0 {
            return 0;
        }

        match self.mapping {
            Mapping::Upmix(n) => {
                let n = n as usize;
                for (frame, &s) in buffer.chunks_exact_mut(n).zip(&self.scratch[..got]) {
                    frame.fill(s);
                }
                got * n
            }
            Mapping::Downmix(n) => {
                let n = n as usize;
                let whole = got / n;
                for (out, frame) in buffer.iter_mut().zip(self.scratch[..whole * n].chunks_exact(n)) {
                    *out = frame.iter().sum::<f32>() / n as f32;
                }
                if whole == 0 {
                    // Partial frame from the inner source; emit silence for it
                    buffer[0] = 0.0;
                    return 1;
                }
                whole
            }
        }
    }

    fn format(&self) -> WaveFormat {
        self.output
    }
}
