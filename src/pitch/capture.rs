//! Hand-off between the microphone callback and the scoring engine.
//!
//! The producer side frames raw audio into fixed-size chunks, runs pitch
//! detection on each and pushes one [`PitchSample`] per chunk down an
//! unbounded channel. The consumer side is drained once per game tick.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::pitch::yin::PitchDetector;
use crate::scoring::types::PitchSample;

/// Pitch readings per second delivered by a microphone.
pub const UPDATES_PER_SECOND: u32 = 20;

/// Minimum detector confidence for a reading to count as singing.
pub const VOICED_CONFIDENCE: f32 = 0.5;

/// Audio-side half of a capture session. Lives wherever the audio callback
/// runs; it never blocks.
pub struct PitchProducer {
    tx: Sender<PitchSample>,
    detector: PitchDetector,
    chunk: Vec<f32>,
    chunk_len: usize,
    chunks_sent: u64,
    updates_per_second: f64,
    start_time: f64,
    closed: bool,
}

impl PitchProducer {
    /// Feeds raw mono frames. Returns how many samples were emitted.
    pub fn push_audio(&mut self, frames: &[f32]) -> usize {
        let mut emitted = 0;
        let mut rest = frames;

        while !rest.is_empty() {
            let take = (self.chunk_len - self.chunk.len()).min(rest.len());
            self.chunk.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.chunk.len() == self.chunk_len {
                self.emit_chunk();
                emitted += 1;
            }
        }

        emitted
    }

    fn emit_chunk(&mut self) {
        let result = self.detector.detect(&self.chunk);
        self.chunk.clear();
        self.chunks_sent += 1;

        let sample = PitchSample {
            time: self.start_time + self.chunks_sent as f64 / self.updates_per_second,
            pitch: result.midi_float,
            voiced: !result.is_silent() && result.confidence >= VOICED_CONFIDENCE,
        };

        if self.tx.send(sample).is_err() && !self.closed {
            log::debug!("CAPTURE: Consumer stopped, dropping pitch samples");
            self.closed = true;
        }
    }

    /// Pushes an already-detected reading, bypassing the detector.
    pub fn push_sample(&mut self, sample: PitchSample) {
        if self.tx.send(sample).is_err() && !self.closed {
            log::debug!("CAPTURE: Consumer stopped, dropping pitch samples");
            self.closed = true;
        }
    }

    /// True once the consumer side has been stopped or dropped.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Engine-side half of a capture session.
///
/// A `MicCapture` without a device is a normal, explicit state: it drains
/// nothing, so nothing is ever judged as sung.
pub struct MicCapture {
    rx: Option<Receiver<PitchSample>>,
}

impl MicCapture {
    /// Starts a capture session for a device running at `sample_rate`.
    /// Sample timestamps start counting from `start_time` seconds.
    pub fn open(
        sample_rate: f32,
        updates_per_second: u32,
        start_time: f64,
    ) -> (MicCapture, PitchProducer) {
        let updates_per_second = updates_per_second.max(1);
        let chunk_len = ((sample_rate / updates_per_second as f32).round() as usize).max(2);
        let (tx, rx) = unbounded();

        log::info!(
            "CAPTURE: Started ({} Hz, {} updates/s, {} frames per reading)",
            sample_rate,
            updates_per_second,
            chunk_len
        );

        let producer = PitchProducer {
            tx,
            detector: PitchDetector::for_voice(sample_rate, chunk_len),
            chunk: Vec::with_capacity(chunk_len),
            chunk_len,
            chunks_sent: 0,
            updates_per_second: updates_per_second as f64,
            start_time,
            closed: false,
        };

        (MicCapture { rx: Some(rx) }, producer)
    }

    /// Capture session with no microphone bound.
    pub fn disconnected() -> MicCapture {
        log::warn!("CAPTURE: No microphone bound, vocals will not register hits");
        MicCapture { rx: None }
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Everything captured since the previous drain, oldest first.
    pub fn drain(&mut self) -> Vec<PitchSample> {
        match &self.rx {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Stops the session. Safe to call repeatedly or on a session that never
    /// had a device.
    pub fn stop(&mut self) {
        if self.rx.take().is_some() {
            log::info!("CAPTURE: Stopped");
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
