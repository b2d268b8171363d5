//! Summing mixer
//!
//! The mixer is split in two halves. [`MixerInputs`] lives with the engine and
//! hands new sources over a channel; [`Mixer`] is owned by whatever pulls the
//! output (the device callback or an offline renderer) and sums every active
//! source into the output buffer.
//!
//! The output thread never takes a lock while mixing: new sources arrive
//! through `try_recv`, and retired sources are dropped in place. Registration
//! holds a lock so that closing the inputs and adding a source cannot
//! interleave; dropping the mixer closes them under the same lock.

use crate::error::{Error, Result};
use crate::playback::source::SampleSource;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use cuebox_common::WaveFormat;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Sources handed to the output side but not yet pulled in
type SourceSender = Sender<Box<dyn SampleSource>>;

/// Create a connected input/mixer pair for `format`.
pub fn mixer(format: WaveFormat) -> (MixerInputs, Mixer) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let active = Arc::new(AtomicUsize::new(0));
    let sender = Arc::new(Mutex::new(Some(tx)));
    (
        MixerInputs {
            sender: Arc::clone(&sender),
            active: Arc::clone(&active),
        },
        Mixer {
            format,
            inputs: sender,
            incoming: rx,
            sources: Vec::new(),
            scratch: Vec::new(),
            active,
        },
    )
}

/// Control-side registration point for new sources.
pub struct MixerInputs {
    /// `None` once closed; shared with the mixer so its drop can close it
    sender: Arc<Mutex<Option<SourceSender>>>,

    /// Sources registered and not yet retired
    active: Arc<AtomicUsize>,
}

impl MixerInputs {
    /// Register a source; it is first pulled on the next mix.
    ///
    /// # Errors
    /// `Error::Disposed` once the inputs are closed or the mixer is gone.
    pub fn add(&self, source: Box<dyn SampleSource>) -> Result<()> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(Error::Disposed)?;

        self.active.fetch_add(1, Ordering::AcqRel);
        if sender.send(source).is_err() {
            self.active.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Refuse further registrations; sources already handed over keep playing
    /// until the mixer itself is dropped.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!("Mixer inputs closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Number of sources registered and not yet retired
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Output-side summing stage.
pub struct Mixer {
    format: WaveFormat,
    /// Registration side, only locked on drop
    inputs: Arc<Mutex<Option<SourceSender>>>,
    incoming: Receiver<Box<dyn SampleSource>>,
    sources: Vec<Box<dyn SampleSource>>,

    /// Per-source pull buffer, grown to the largest request
    scratch: Vec<f32>,

    active: Arc<AtomicUsize>,
}

impl Mixer {
    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Sources currently being pulled
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fill `out` with the sum of all active sources.
    ///
    /// Always fills the whole buffer (silence when nothing plays) and returns
    /// its length. No clipping happens here; the device conversion clamps.
    pub fn mix(&mut self, out: &mut [f32]) -> usize {
        self.accept_new();

        out.fill(0.0);
        if self.scratch.len() < out.len() {
            // Only grows; steady-state buffer sizes never reallocate
            self.scratch.resize(out.len(), 0.0);
        }

        let scratch = &mut self.scratch[..out.len()];
        let before = self.sources.len();
        self.sources.retain_mut(|source| {
            let n = source.read(scratch);
            if n == 0 {
                return false;
            }
            for (o, s) in out.iter_mut().zip(&scratch[..n]) {
                *o += s;
            }
            true
        });

        let retired = before - self.sources.len();
        if retired > 0 {
            self.active.fetch_sub(retired, Ordering::AcqRel);
            trace!("Retired {} source(s), {} active", retired, self.sources.len());
        }

        out.len()
    }

    fn accept_new(&mut self) {
        loop {
            match self.incoming.try_recv() {
                Ok(source) => self.sources.push(source),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        // Close registration first so no add lands after the queue is counted
        self.inputs.lock().take();

        // Sources still queued or playing never retire through `mix`
        let queued = self.incoming.try_iter().count();
        let dropped = self.sources.len() + queued;
        if dropped > 0 {
            self.active.fetch_sub(dropped, Ordering::AcqRel);
        }
    }
}
