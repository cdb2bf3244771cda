//! Real-time vocals scoring.
//!
//! The host pushes pitch readings with [`VocalsEngine::push_sample`] and
//! calls [`VocalsEngine::update`] once per frame. Each update drains the
//! buffered readings in arrival order, then moves the playhead to the
//! frame's song time, scoring every phrase whose end has been passed.
//! Nothing blocks and nothing is scheduled; all time comes from the caller.

use std::collections::VecDeque;

use crate::chart::{Note, NoteId, NoteTrack};
use crate::error::{Error, Result};
use crate::pitch::distance::within_window;
use crate::scoring::selector::TargetSelector;
use crate::scoring::stars;
use crate::scoring::types::*;

/// Points for a phrase sung at full points, before the multiplier.
pub const POINTS_PER_PHRASE: u64 = 2000;

/// Star power gained per star power phrase hit.
pub const STAR_POWER_PHRASE_AMOUNT: f64 = 0.25;

/// Minimum bar needed to deploy star power.
pub const STAR_POWER_ACTIVATION_THRESHOLD: f64 = 0.5;

/// Beats a full star power bar lasts once deployed.
pub const STAR_POWER_DRAIN_BEATS: f64 = 32.0;

/// Seconds around a note edge where the neighbouring note's pitch still
/// counts, so a singer sliding between notes is not punished.
pub const BOUNDARY_LEEWAY: f64 = 0.06;

/// Judging window of one phrase, restricted to the notes in the track.
#[derive(Clone, Copy, Debug)]
struct PhraseSpan {
    phrase: usize,
    tick: u32,
    tick_end: u32,
    total_ticks: u32,
    star_power: bool,
}

fn build_spans(track: &NoteTrack) -> Vec<PhraseSpan> {
    let mut spans: Vec<PhraseSpan> = Vec::new();

    for note in track.notes() {
        match spans.last_mut() {
            Some(span) if span.phrase == note.phrase => {
                span.tick_end = span.tick_end.max(note.tick_end);
                span.total_ticks += note.length();
            }
            _ => {
                let phrase = &track.phrases()[note.phrase];
                spans.push(PhraseSpan {
                    phrase: note.phrase,
                    tick: phrase.tick.min(note.tick),
                    tick_end: phrase.tick_end.max(note.tick_end),
                    total_ticks: note.length(),
                    star_power: phrase.star_power,
                });
            }
        }
    }

    spans
}

pub struct VocalsEngine {
    track: NoteTrack,
    params: EngineParameters,
    spans: Vec<PhraseSpan>,
    phrase_cursor: usize,
    selector: TargetSelector,
    state: EngineState,
    stats: EngineStats,
    pending: VecDeque<PitchSample>,
    events: Vec<EngineEvent>,
}

impl VocalsEngine {
    pub fn new(track: NoteTrack, params: EngineParameters) -> Result<Self> {
        if !(params.hit_window_width > 0.0) {
            return Err(Error::Config(format!(
                "hit window width must be positive, got {}",
                params.hit_window_width
            )));
        }
        if !(params.phrase_hit_percent > 0.0 && params.phrase_hit_percent <= 1.0) {
            return Err(Error::Config(format!(
                "phrase hit percent must be in (0, 1], got {}",
                params.phrase_hit_percent
            )));
        }
        if params.updates_per_second == 0 {
            return Err(Error::Config("updates per second must be positive".to_string()));
        }

        let spans = build_spans(&track);
        log::info!(
            "ENGINE: Created ({} notes, {} phrases, window {} st, hit {}%)",
            track.len(),
            spans.len(),
            params.hit_window_width,
            params.phrase_hit_percent * 100.0
        );

        Ok(VocalsEngine {
            track,
            params,
            spans,
            phrase_cursor: 0,
            selector: TargetSelector::new(),
            state: EngineState::new(),
            stats: EngineStats::new(),
            pending: VecDeque::new(),
            events: Vec::new(),
        })
    }

    pub fn with_difficulty(
        track: NoteTrack,
        difficulty: Difficulty,
        updates_per_second: u32,
    ) -> Result<Self> {
        Self::new(
            track,
            EngineParameters::for_difficulty(difficulty, updates_per_second),
        )
    }

    pub fn track(&self) -> &NoteTrack {
        &self.track
    }

    pub fn params(&self) -> &EngineParameters {
        &self.params
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Score of the track with every phrase hit and no multiplier.
    pub fn base_score(&self) -> u64 {
        self.spans.len() as u64 * POINTS_PER_PHRASE
    }

    pub fn star_score_thresholds(&self) -> Vec<u64> {
        stars::star_score_thresholds(&self.params.star_multiplier_thresholds, self.base_score())
    }

    pub fn stars(&self) -> usize {
        stars::stars_for_score(self.stats.score, &self.star_score_thresholds())
    }

    /// Buffers a reading. It is judged on the next `update`.
    pub fn push_sample(&mut self, sample: PitchSample) {
        self.pending.push_back(sample);
    }

    /// Judges all buffered readings in order, then advances to `time`.
    pub fn update(&mut self, time: f64) {
        while let Some(sample) = self.pending.pop_front() {
            self.process_sample(sample);
        }
        self.advance(time);
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Deploys star power. Returns false when the bar is too low or it is
    /// already running.
    pub fn activate_star_power(&mut self) -> bool {
        if self.stats.star_power_active
            || self.stats.star_power_amount < STAR_POWER_ACTIVATION_THRESHOLD
        {
            return false;
        }

        self.stats.star_power_active = true;
        self.events.push(EngineEvent::StarPowerStatus { active: true });
        self.refresh_multiplier();
        log::debug!(
            "ENGINE: Star power on ({:.2} bar)",
            self.stats.star_power_amount
        );
        true
    }

    /// Rewinds to the start of the track. A full reset also clears stats.
    pub fn reset(&mut self, full_reset: bool) {
        self.state = EngineState::new();
        self.selector.reset();
        self.phrase_cursor = 0;
        self.pending.clear();
        self.events.clear();
        if full_reset {
            self.stats = EngineStats::new();
        }
        log::debug!("ENGINE: Reset (full: {})", full_reset);
    }

    fn process_sample(&mut self, sample: PitchSample) {
        let start = sample.time - self.params.sample_duration();
        self.advance(start);

        let sync = self.track.sync();
        let from_tick = sync.time_to_tick(start).max(self.state.last_credited_tick);
        let to_tick = sync.time_to_tick(sample.time);

        let credited = if sample.voiced {
            self.state.last_sing_time = self.state.last_sing_time.max(sample.time);
            self.state.pitch_sang = sample.pitch;
            self.credit_range(sample.pitch, sample.time, from_tick, to_tick)
        } else {
            false
        };

        self.advance(sample.time);

        if sample.voiced {
            let on_target = self
                .state
                .current_target
                .and_then(|id| self.track.note(id))
                .map_or(false, |note| self.matches(note, sample.pitch, sample.time));
            if credited || on_target {
                self.state.last_hit_time = self.state.last_hit_time.max(sample.time);
            }
        }
    }

    /// Credits `[from_tick, to_tick)` phrase by phrase. A reading that runs
    /// past the end of the open phrase resolves it first, then credits the
    /// rest of its interval to the next one.
    fn credit_range(&mut self, pitch: f32, time: f64, from_tick: u32, to_tick: u32) -> bool {
        let mut credited = false;
        let mut from = from_tick;

        while let Some(span) = self.spans.get(self.phrase_cursor).copied() {
            let until = to_tick.min(span.tick_end);
            if from < until {
                credited |= self.credit(pitch, time, from, until);
                from = until;
            }
            if to_tick <= span.tick_end {
                break;
            }

            let cursor = self.phrase_cursor;
            let phrase_end = self.track.sync().tick_to_time(span.tick_end);
            self.advance(phrase_end);
            if self.phrase_cursor == cursor {
                break;
            }
            from = from.max(span.tick_end);
        }

        credited
    }

    /// Credits `[from_tick, to_tick)` to every note of the open phrase the
    /// reading matches.
    fn credit(&mut self, pitch: f32, time: f64, from_tick: u32, to_tick: u32) -> bool {
        let Some(span) = self.spans.get(self.phrase_cursor).copied() else {
            return false;
        };
        if from_tick >= to_tick {
            return false;
        }

        let notes = self.track.notes();
        let first = notes.partition_point(|n| n.tick_end <= from_tick);
        let mut credited = 0;

        for (i, note) in notes.iter().enumerate().skip(first) {
            if note.tick >= to_tick {
                break;
            }
            if note.phrase != span.phrase || !self.matches(note, pitch, time) {
                continue;
            }

            let ticks = note.overlap(from_tick, to_tick);
            credited += ticks;
            if self.state.current_target == Some(NoteId(i)) {
                self.state.note_ticks_hit += ticks;
            }
        }

        if credited == 0 {
            return false;
        }

        let total = *self.state.phrase_ticks_total.get_or_insert(span.total_ticks);
        self.state.phrase_ticks_hit = (self.state.phrase_ticks_hit + credited).min(total);
        self.state.last_credited_tick = to_tick;
        true
    }

    fn matches(&self, note: &Note, pitch: f32, time: f64) -> bool {
        if note.non_pitched {
            return true;
        }

        let width = self.params.hit_window_width as f32;
        if within_window(note.pitch, pitch, width) {
            return true;
        }

        let sync = self.track.sync();

        if time - sync.tick_to_time(note.tick) <= BOUNDARY_LEEWAY {
            let previous = note.previous.and_then(|id| self.track.note(id));
            if let Some(prev) = previous {
                if prev.tick_end == note.tick
                    && !prev.non_pitched
                    && within_window(prev.pitch, pitch, width)
                {
                    return true;
                }
            }
        }

        if sync.tick_to_time(note.tick_end) - time <= BOUNDARY_LEEWAY {
            let next = note.next.and_then(|id| self.track.note(id));
            if let Some(next) = next {
                if next.tick == note.tick_end
                    && !next.non_pitched
                    && within_window(next.pitch, pitch, width)
                {
                    return true;
                }
            }
        }

        false
    }

    fn advance(&mut self, time: f64) {
        if !(time > self.state.current_time) {
            return;
        }

        let tick = self.track.sync().time_to_tick(time);
        let prev_tick = if self.state.current_time.is_finite() {
            self.state.current_tick
        } else {
            tick
        };
        self.state.current_time = time;
        self.state.current_tick = tick;

        self.drain_star_power(prev_tick, tick);
        let resolved = self.resolve_phrases(tick);
        self.select_target(tick, resolved);
    }

    fn drain_star_power(&mut self, from_tick: u32, to_tick: u32) {
        if !self.stats.star_power_active || to_tick <= from_tick {
            return;
        }

        let beats = self.track.sync().ticks_to_beats(to_tick - from_tick);
        self.stats.star_power_amount -= beats / STAR_POWER_DRAIN_BEATS;

        if self.stats.star_power_amount <= 0.0 {
            self.stats.star_power_amount = 0.0;
            self.stats.star_power_active = false;
            self.events.push(EngineEvent::StarPowerStatus { active: false });
            self.refresh_multiplier();
            log::debug!("ENGINE: Star power ran out at tick {}", to_tick);
        }
    }

    fn resolve_phrases(&mut self, tick: u32) -> bool {
        let mut resolved = false;

        while let Some(span) = self.spans.get(self.phrase_cursor).copied() {
            if tick < span.tick_end {
                if tick >= span.tick && self.state.phrase_ticks_total.is_none() {
                    self.state.phrase_ticks_total = Some(span.total_ticks);
                }
                break;
            }

            self.score_phrase(&span, self.state.phrase_ticks_hit);
            self.phrase_cursor += 1;
            self.state.phrase_ticks_hit = 0;
            self.state.phrase_ticks_total = None;
            resolved = true;
        }

        resolved
    }

    fn score_phrase(&mut self, span: &PhraseSpan, ticks_hit: u32) {
        let percent = if span.total_ticks == 0 {
            0.0
        } else {
            (ticks_hit as f64 / span.total_ticks as f64).clamp(0.0, 1.0)
        };
        let full_points = span.total_ticks > 0 && percent >= self.params.phrase_hit_percent;

        if full_points {
            self.stats.score += POINTS_PER_PHRASE * self.stats.score_multiplier as u64;
            self.stats.combo += 1;
            self.stats.max_combo = self.stats.max_combo.max(self.stats.combo);
            self.stats.phrases_hit += 1;
        } else {
            let partial = POINTS_PER_PHRASE as f64 * percent / self.params.phrase_hit_percent;
            self.stats.score += partial.floor() as u64;
            self.stats.combo = 0;
            self.stats.phrases_missed += 1;
            self.stats.is_full_combo = false;
        }

        self.events.push(EngineEvent::PhraseHit {
            percent,
            full_points,
        });

        if full_points && span.star_power {
            self.stats.star_power_amount =
                (self.stats.star_power_amount + STAR_POWER_PHRASE_AMOUNT).min(1.0);
            self.events.push(EngineEvent::StarPowerPhraseHit);
        }

        self.refresh_multiplier();
        log::debug!(
            "ENGINE: Phrase {} scored {:.1}% (full points: {}, combo {})",
            span.phrase,
            percent * 100.0,
            full_points,
            self.stats.combo
        );
    }

    fn select_target(&mut self, tick: u32, resolved: bool) {
        let selection = self.selector.select(&self.track, tick);

        if let Some(note) = selection.active.filter(|_| selection.changed) {
            self.state.note_ticks_hit = 0;
            self.events.push(EngineEvent::TargetNoteChanged { note });
        }
        self.state.current_target = selection.active;

        self.state.phase = if selection.active.is_some() {
            JudgePhase::Tracking
        } else if resolved {
            JudgePhase::Resolved
        } else if self.state.phase == JudgePhase::Tracking {
            JudgePhase::Idle
        } else {
            self.state.phase
        };
    }

    fn refresh_multiplier(&mut self) {
        let steps = self
            .params
            .multiplier_thresholds
            .iter()
            .filter(|&&t| self.stats.combo >= t)
            .count() as u32;
        let base = 1 + steps;
        self.stats.score_multiplier = if self.stats.star_power_active {
            base * 2
        } else {
            base
        };
    }
}
