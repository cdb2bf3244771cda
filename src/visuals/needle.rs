//! Pitch needle and combo meter, computed from the engine's snapshot.
//!
//! The mapper only reads `EngineState`; hosts turn `NeedleFrame::pitch` into
//! a position on their own pitch axis.

use serde::Serialize;

use crate::chart::Note;
use crate::pitch::distance::pitch_distance;
use crate::scoring::types::{EngineParameters, EngineState};

pub const NEEDLE_POSITION_LERP: f32 = 30.0;
/// Position lerp speed-up on the frame the needle reappears.
pub const NEEDLE_SNAP_MULTIPLIER: f32 = 10.0;
pub const NEEDLE_ROTATION_LERP: f32 = 25.0;
/// Degrees of tilt at the edge of the hit window.
pub const NEEDLE_ROTATION_MAX: f32 = 12.0;
/// Extra time a reading keeps the needle up, so it does not flicker
/// between readings.
pub const NEEDLE_HIDE_DELAY: f64 = 0.05;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct NeedleFrame {
    pub visible: bool,
    pub hitting: bool,
    /// Needle height as a MIDI pitch.
    pub pitch: f32,
    /// Tilt in degrees; positive when sharp.
    pub rotation: f32,
    /// Combo meter, 1.0 at the phrase hit threshold.
    pub meter_fill: f64,
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t.clamp(0.0, 1.0)
}

/// Combo meter fill for the phrase in progress. Zero outside a phrase.
pub fn meter_fill(state: &EngineState, params: &EngineParameters) -> f64 {
    match state.phrase_ticks_total {
        Some(total) if total > 0 => {
            state.phrase_ticks_hit as f64 / total as f64 / params.phrase_hit_percent
        }
        _ => 0.0,
    }
}

#[derive(Clone, Debug, Default)]
pub struct NeedleMapper {
    frame: NeedleFrame,
}

impl NeedleMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> NeedleFrame {
        self.frame
    }

    pub fn reset(&mut self) {
        self.frame = NeedleFrame::default();
    }

    fn threshold(last: f64, params: &EngineParameters) -> f64 {
        last + params.sample_duration() + NEEDLE_HIDE_DELAY
    }

    pub fn update(
        &mut self,
        dt: f64,
        song_time: f64,
        state: &EngineState,
        params: &EngineParameters,
        last_target: Option<&Note>,
    ) -> NeedleFrame {
        let dt = dt.max(0.0) as f32;
        self.frame.meter_fill = meter_fill(state, params);

        if song_time >= Self::threshold(state.last_sing_time, params) {
            self.frame.visible = false;
            self.frame.hitting = false;
            return self.frame;
        }

        let mut position_rate = NEEDLE_POSITION_LERP;
        if !self.frame.visible {
            self.frame.visible = true;
            position_rate *= NEEDLE_SNAP_MULTIPLIER;
        }

        let hitting = song_time < Self::threshold(state.last_hit_time, params);
        let (pitch, rotation) = match last_target {
            Some(note) if hitting => {
                if note.non_pitched {
                    (state.pitch_sang + 12.0, 0.0)
                } else {
                    let (distance, _) = pitch_distance(note.pitch, state.pitch_sang);
                    let off = (distance / params.hit_window_width as f32).clamp(-1.0, 1.0);
                    (note.pitch, off * NEEDLE_ROTATION_MAX)
                }
            }
            Some(note) if !note.non_pitched => {
                // Sung pitch class, moved next to the target's octave
                let (_, octave_shift) = pitch_distance(note.pitch, state.pitch_sang);
                let octave = (note.pitch / 12.0).trunc() as i32;
                let pitch = state.pitch_sang % 12.0 + 12.0 * (octave + octave_shift) as f32;
                (pitch, 0.0)
            }
            _ => (state.pitch_sang + 12.0, 0.0),
        };

        self.frame.hitting = hitting && last_target.is_some();
        self.frame.pitch = lerp(self.frame.pitch, pitch, dt * position_rate);
        self.frame.rotation = lerp(self.frame.rotation, rotation, dt * NEEDLE_ROTATION_LERP);
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn singing(at: f64, pitch: f32, hit: bool) -> EngineState {
        EngineState {
            last_sing_time: at,
            last_hit_time: if hit { at } else { f64::NEG_INFINITY },
            pitch_sang: pitch,
            ..EngineState::new()
        }
    }

    #[test]
    fn test_hidden_without_singing() {
        let mut mapper = NeedleMapper::new();
        let params = EngineParameters::default();
        let frame = mapper.update(0.016, 1.0, &EngineState::new(), &params, None);
        assert!(!frame.visible);
        assert!(!frame.hitting);
    }

    #[test]
    fn test_visibility_threshold() {
        let params = EngineParameters::default();
        let state = singing(1.0, 60.0, false);
        // 1.0 + 1/20 + 0.05
        let mut mapper = NeedleMapper::new();
        assert!(mapper.update(0.016, 1.09, &state, &params, None).visible);
        assert!(!mapper.update(0.016, 1.11, &state, &params, None).visible);
    }

    #[test]
    fn test_snaps_on_show() {
        let params = EngineParameters::default();
        let note = Note::new(64.0, 0, 480, 0);
        let state = singing(1.0, 64.0, true);
        let mut mapper = NeedleMapper::new();
        // 0.01 * 30 * 10 >= 1, so the first frame lands on the note
        let frame = mapper.update(0.01, 1.0, &state, &params, Some(&note));
        assert!(frame.hitting);
        assert_eq!(frame.pitch, 64.0);
        assert_eq!(frame.rotation, 0.0);
    }

    #[test]
    fn test_hitting_tilts_with_distance() {
        let params = EngineParameters::default();
        let note = Note::new(60.0, 0, 480, 0);
        let mut mapper = NeedleMapper::new();

        // Half a semitone sharp on Expert (width 2): a quarter of the max tilt
        let frame = mapper.update(1.0, 1.0, &singing(1.0, 72.5, true), &params, Some(&note));
        assert_eq!(frame.pitch, 60.0);
        assert!((frame.rotation - 0.25 * NEEDLE_ROTATION_MAX).abs() < 1e-4);

        let frame = mapper.update(1.0, 1.0, &singing(1.0, 55.0, true), &params, Some(&note));
        assert!((frame.rotation + NEEDLE_ROTATION_MAX).abs() < 1e-4);
    }

    #[test]
    fn test_missing_moves_to_target_octave() {
        let params = EngineParameters::default();
        let note = Note::new(62.0, 0, 480, 0);
        let mut mapper = NeedleMapper::new();

        // Sung A2 against D4 shows as A3, the closest A to the target
        let frame = mapper.update(1.0, 1.0, &singing(1.0, 45.0, false), &params, Some(&note));
        assert!(!frame.hitting);
        assert_eq!(frame.pitch, 57.0);
        assert_eq!(frame.rotation, 0.0);

        // Sung B5 against C4 shows as B3, just under the target
        let c4 = Note::new(60.0, 0, 480, 0);
        let frame = mapper.update(1.0, 1.0, &singing(1.0, 83.0, false), &params, Some(&c4));
        assert_eq!(frame.pitch, 59.0);
    }

    #[test]
    fn test_non_pitched_and_no_target_sit_an_octave_up() {
        let params = EngineParameters::default();
        let talkie = Note::non_pitched(0, 480, 0);
        let mut mapper = NeedleMapper::new();

        let frame = mapper.update(1.0, 1.0, &singing(1.0, 50.0, true), &params, Some(&talkie));
        assert!(frame.hitting);
        assert_eq!(frame.pitch, 62.0);

        let frame = mapper.update(1.0, 1.0, &singing(1.0, 50.0, false), &params, None);
        assert!(!frame.hitting);
        assert_eq!(frame.pitch, 62.0);
    }

    #[test]
    fn test_lerps_between_frames() {
        let params = EngineParameters::default();
        let note = Note::new(60.0, 0, 480, 0);
        let mut mapper = NeedleMapper::new();
        mapper.update(1.0, 1.0, &singing(1.0, 60.0, true), &params, Some(&note));

        let to = Note::new(70.0, 480, 960, 0);
        // 30 * (1/60) = half way
        let frame = mapper.update(1.0 / 60.0, 1.01, &singing(1.0, 70.0, true), &params, Some(&to));
        assert!((frame.pitch - 65.0).abs() < 1e-3);
    }

    #[test]
    fn test_meter_fill() {
        let params = EngineParameters::default();
        let mut state = EngineState::new();
        assert_eq!(meter_fill(&state, &params), 0.0);

        state.phrase_ticks_total = Some(1000);
        state.phrase_ticks_hit = 575;
        assert!((meter_fill(&state, &params) - 1.0).abs() < 1e-9);

        state.phrase_ticks_total = Some(0);
        assert_eq!(meter_fill(&state, &params), 0.0);
    }

    #[test]
    fn test_does_not_touch_engine_state() {
        let params = EngineParameters::default();
        let state = singing(1.0, 61.0, true);
        let before = state.clone();
        let note = Note::new(60.0, 0, 480, 0);
        NeedleMapper::new().update(0.016, 1.0, &state, &params, Some(&note));
        assert_eq!(state, before);
    }
}
