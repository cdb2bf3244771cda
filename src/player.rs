//! A vocals player session.
//!
//! Owns the chart, the scoring engine, the microphone hand-off and the
//! needle. The host calls [`VocalsPlayer::update`] once per frame with the
//! current song time.

use serde::{Deserialize, Serialize};

use crate::chart::{NoteId, NoteTrack};
use crate::error::{Error, Result};
use crate::pitch::capture::{MicCapture, UPDATES_PER_SECOND};
use crate::scoring::types::{
    Difficulty, EngineEvent, EngineParameters, EngineState, EngineStats, PitchSample,
    STAR_MULTIPLIER_THRESHOLDS,
};
use crate::scoring::VocalsEngine;
use crate::visuals::needle::{NeedleFrame, NeedleMapper};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub difficulty: Difficulty,
    pub updates_per_second: u32,
    pub star_multiplier_thresholds: Vec<f64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            difficulty: Difficulty::Expert,
            updates_per_second: UPDATES_PER_SECOND,
            star_multiplier_thresholds: STAR_MULTIPLIER_THRESHOLDS.to_vec(),
        }
    }
}

impl PlayerConfig {
    pub fn engine_parameters(&self) -> EngineParameters {
        EngineParameters {
            star_multiplier_thresholds: self.star_multiplier_thresholds.clone(),
            ..EngineParameters::for_difficulty(self.difficulty, self.updates_per_second)
        }
    }
}

pub struct VocalsPlayer {
    config: PlayerConfig,
    /// Full chart; practice sections are cut from it.
    track: NoteTrack,
    engine: VocalsEngine,
    capture: MicCapture,
    needle: NeedleMapper,
    frame: NeedleFrame,
    last_target: Option<NoteId>,
    practice: Option<(u32, u32)>,
    is_full_combo: bool,
}

impl VocalsPlayer {
    pub fn new(track: NoteTrack, config: PlayerConfig, capture: MicCapture) -> Result<Self> {
        let engine = VocalsEngine::new(track.clone(), config.engine_parameters())?;
        log::info!(
            "PLAYER: Session started ({}, mic {})",
            config.difficulty,
            if capture.is_active() { "bound" } else { "missing" }
        );

        Ok(VocalsPlayer {
            config,
            track,
            engine,
            capture,
            needle: NeedleMapper::new(),
            frame: NeedleFrame::default(),
            last_target: None,
            practice: None,
            is_full_combo: true,
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn engine(&self) -> &VocalsEngine {
        &self.engine
    }

    pub fn state(&self) -> &EngineState {
        self.engine.state()
    }

    pub fn stats(&self) -> &EngineStats {
        self.engine.stats()
    }

    pub fn needle(&self) -> NeedleFrame {
        self.frame
    }

    pub fn is_full_combo(&self) -> bool {
        self.is_full_combo
    }

    pub fn practice_section(&self) -> Option<(u32, u32)> {
        self.practice
    }

    pub fn last_target(&self) -> Option<NoteId> {
        self.last_target
    }

    /// Feeds a reading directly, bypassing the microphone (replays, hosts
    /// that run their own detector).
    pub fn push_sample(&mut self, sample: PitchSample) {
        self.engine.push_sample(sample);
    }

    /// Runs one frame: judges everything the microphone produced since the
    /// last frame, moves to `song_time` and refreshes the needle.
    pub fn update(&mut self, song_time: f64, dt: f64) -> Vec<EngineEvent> {
        for sample in self.capture.drain() {
            self.engine.push_sample(sample);
        }
        self.engine.update(song_time);

        let events = self.engine.drain_events();
        for event in &events {
            match event {
                EngineEvent::TargetNoteChanged { note } => self.last_target = Some(*note),
                EngineEvent::PhraseHit {
                    full_points: false, ..
                } => self.is_full_combo = false,
                _ => {}
            }
        }

        let target = self.last_target.and_then(|id| self.engine.track().note(id));
        self.frame = self.needle.update(
            dt,
            song_time,
            self.engine.state(),
            self.engine.params(),
            target,
        );

        events
    }

    /// Star power button. Ignored while practicing.
    pub fn star_power_input(&mut self) -> bool {
        if self.practice.is_some() {
            log::debug!("PLAYER: Star power ignored in practice");
            return false;
        }
        self.engine.activate_star_power()
    }

    /// Restricts play to notes starting in `[start, end)` and restarts.
    pub fn set_practice_section(&mut self, start: u32, end: u32) -> Result<()> {
        if start >= end {
            return Err(Error::Config(format!(
                "practice section [{}, {}) is empty",
                start, end
            )));
        }

        let section = self.track.slice(start, end);
        log::info!(
            "PLAYER: Practice section [{}, {}) with {} notes",
            start,
            end,
            section.len()
        );
        self.engine = VocalsEngine::new(section, self.config.engine_parameters())?;
        self.practice = Some((start, end));
        self.reset_practice_section();
        Ok(())
    }

    /// Restarts the current section from scratch. Star power does not
    /// survive the restart.
    pub fn reset_practice_section(&mut self) {
        self.engine.reset(true);
        self.is_full_combo = true;
        self.reset_visuals();
    }

    fn reset_visuals(&mut self) {
        self.last_target = None;
        self.needle.reset();
        self.frame = NeedleFrame::default();
    }

    /// Releases the microphone. Safe to call more than once.
    pub fn stop(&mut self) {
        self.capture.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Note, Phrase, SyncTrack};
    use crate::pitch::capture::PitchProducer;

    // 960 ticks per second.
    //
    // phrase 0: C4 [0s, 1s), D4 [1s, 2s)
    // phrase 1 (star power): E4 [2.5s, 3.5s)
    // phrase 2 (star power): G4 [4s, 5s)
    fn song() -> NoteTrack {
        let notes = vec![
            Note::new(60.0, 0, 960, 0),
            Note::new(62.0, 960, 1920, 0),
            Note::new(64.0, 2400, 3360, 1),
            Note::new(67.0, 3840, 4800, 2),
        ];
        let phrases = vec![
            Phrase { tick: 0, tick_end: 1920, star_power: false },
            Phrase { tick: 2400, tick_end: 3360, star_power: true },
            Phrase { tick: 3840, tick_end: 4800, star_power: true },
        ];
        NoteTrack::new(notes, phrases, vec![], SyncTrack::default()).unwrap()
    }

    fn session() -> (VocalsPlayer, PitchProducer) {
        let (capture, producer) = MicCapture::open(48_000.0, 20, 0.0);
        let player = VocalsPlayer::new(song(), PlayerConfig::default(), capture).unwrap();
        (player, producer)
    }

    /// Sings through the microphone over `(from, to]`, one frame per reading.
    fn sing(
        player: &mut VocalsPlayer,
        producer: &mut PitchProducer,
        from: f64,
        to: f64,
        pitch: Option<f32>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let mut step = (from * 20.0).round() as i64 + 1;
        let last = (to * 20.0).round() as i64;
        while step <= last {
            let time = step as f64 / 20.0;
            producer.push_sample(PitchSample {
                time,
                pitch: pitch.unwrap_or(0.0),
                voiced: pitch.is_some(),
            });
            events.extend(player.update(time, 0.05));
            step += 1;
        }
        events
    }

    fn sing_whole_song(player: &mut VocalsPlayer, producer: &mut PitchProducer) -> Vec<EngineEvent> {
        let mut events = sing(player, producer, 0.0, 1.0, Some(60.0));
        events.extend(sing(player, producer, 1.0, 2.0, Some(62.0)));
        events.extend(sing(player, producer, 2.0, 2.5, None));
        events.extend(sing(player, producer, 2.5, 3.5, Some(64.0)));
        events.extend(sing(player, producer, 3.5, 4.0, None));
        events.extend(sing(player, producer, 4.0, 5.0, Some(67.0)));
        events
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config: PlayerConfig = serde_json::from_str(r#"{"difficulty": "easy"}"#).unwrap();
        assert_eq!(config.difficulty, Difficulty::Easy);
        assert_eq!(config.updates_per_second, UPDATES_PER_SECOND);
        assert_eq!(config.engine_parameters().hit_window_width, 3.5);

        assert!(serde_json::from_str::<PlayerConfig>(r#"{"difficulty": "insane"}"#).is_err());
    }

    #[test]
    fn test_zero_updates_per_second_is_rejected() {
        let config: PlayerConfig = serde_json::from_str(r#"{"updates_per_second": 0}"#).unwrap();
        let result = VocalsPlayer::new(song(), config, MicCapture::disconnected());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_microphone_readings_are_scored() {
        let (mut player, mut producer) = session();
        let events = sing_whole_song(&mut player, &mut producer);

        let hits = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::PhraseHit { full_points: true, .. }))
            .count();
        assert_eq!(hits, 3);
        assert!(player.is_full_combo());
        assert_eq!(player.stats().star_power_amount, 0.5);
        assert_eq!(player.last_target(), Some(NoteId(3)));
    }

    #[test]
    fn test_missed_phrase_clears_full_combo() {
        let (mut player, mut producer) = session();
        sing(&mut player, &mut producer, 0.0, 2.0, None);
        assert!(!player.is_full_combo());
        assert_eq!(player.stats().combo, 0);
    }

    #[test]
    fn test_star_power_input() {
        let (mut player, mut producer) = session();
        assert!(!player.star_power_input());

        sing_whole_song(&mut player, &mut producer);
        assert!(player.star_power_input());
        assert!(player.stats().star_power_active);
    }

    #[test]
    fn test_practice_section_ignores_star_power() {
        let (mut player, mut producer) = session();
        player.set_practice_section(2400, 4800).unwrap();
        assert_eq!(player.engine().track().len(), 2);

        sing(&mut player, &mut producer, 0.0, 2.5, None);
        sing(&mut player, &mut producer, 2.5, 3.5, Some(64.0));
        sing(&mut player, &mut producer, 3.5, 4.0, None);
        sing(&mut player, &mut producer, 4.0, 5.0, Some(67.0));

        assert_eq!(player.stats().star_power_amount, 0.5);
        assert!(!player.star_power_input());
        assert!(!player.stats().star_power_active);
    }

    #[test]
    fn test_practice_section_only_scores_its_notes() {
        let (mut player, mut producer) = session();
        player.set_practice_section(2400, 3360).unwrap();
        assert_eq!(player.engine().base_score(), 2000);

        // Silence over the notes that were cut away costs nothing
        sing(&mut player, &mut producer, 0.0, 2.5, None);
        assert!(player.is_full_combo());

        sing(&mut player, &mut producer, 2.5, 3.5, Some(64.0));
        assert_eq!(player.stats().phrases_hit, 1);
        assert_eq!(player.stats().phrases_missed, 0);
        assert!(player.is_full_combo());

        let first = player.engine().track().notes()[0].clone();
        assert_eq!(first.previous, None);
        assert_eq!(first.next, None);
    }

    #[test]
    fn test_reset_practice_section() {
        let (mut player, mut producer) = session();
        player.set_practice_section(0, 1920).unwrap();
        sing(&mut player, &mut producer, 0.0, 2.0, Some(55.0));
        assert!(!player.is_full_combo());

        player.reset_practice_section();
        assert!(player.is_full_combo());
        assert_eq!(player.stats(), &EngineStats::new());
        assert_eq!(player.last_target(), None);
        assert!(!player.needle().visible);
    }

    #[test]
    fn test_rejects_empty_section() {
        let (mut player, _producer) = session();
        assert!(matches!(
            player.set_practice_section(960, 960),
            Err(Error::Config(_))
        ));
        assert_eq!(player.practice_section(), None);
    }

    #[test]
    fn test_needle_follows_singing() {
        let (mut player, mut producer) = session();
        sing(&mut player, &mut producer, 0.0, 0.5, Some(60.5));
        let needle = player.needle();
        assert!(needle.visible);
        assert!(needle.hitting);
        assert!(needle.meter_fill > 0.0);

        // Silence hides it again
        sing(&mut player, &mut producer, 0.5, 0.7, None);
        assert!(!player.needle().visible);
    }

    #[test]
    fn test_without_microphone_nothing_hits() {
        let mut player =
            VocalsPlayer::new(song(), PlayerConfig::default(), MicCapture::disconnected()).unwrap();
        for frame in 1..=100 {
            player.update(frame as f64 / 20.0, 0.05);
        }
        assert_eq!(player.stats().score, 0);
        assert_eq!(player.stats().phrases_missed, 3);
        assert!(!player.needle().visible);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut player, mut producer) = session();
        player.stop();
        player.stop();

        producer.push_sample(PitchSample { time: 0.05, pitch: 60.0, voiced: true });
        assert!(producer.is_closed());
        assert!(player.update(0.05, 0.05).iter().all(|e| !matches!(e, EngineEvent::PhraseHit { .. })));
        assert_eq!(player.state().last_sing_time, f64::NEG_INFINITY);
    }
}
