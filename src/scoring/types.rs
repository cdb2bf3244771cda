use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chart::NoteId;
use crate::error::Error;
use crate::pitch::capture::UPDATES_PER_SECOND;

/// One reading from the pitch sampler.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PitchSample {
    /// Song time in seconds at the end of the reading.
    pub time: f64,
    /// Fractional MIDI pitch. Meaningless when `voiced` is false.
    pub pitch: f32,
    pub voiced: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Total width of the pitch hit window, in semitones.
    pub fn hit_window_width(self) -> f64 {
        match self {
            Difficulty::Easy => 3.5,
            Difficulty::Medium => 3.0,
            Difficulty::Hard => 2.5,
            Difficulty::Expert => 2.0,
        }
    }

    /// Fraction of a phrase that must be sung on pitch for full points.
    ///
    /// These look low, but mic latency and undetected plosives eat into
    /// every phrase.
    pub fn phrase_hit_percent(self) -> f64 {
        match self {
            Difficulty::Easy => 0.325,
            Difficulty::Medium => 0.400,
            Difficulty::Hard => 0.450,
            Difficulty::Expert => 0.575,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        };
        f.write_str(name)
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "expert" => Ok(Difficulty::Expert),
            _ => Err(Error::InvalidDifficulty(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Difficulty::Easy),
            1 => Ok(Difficulty::Medium),
            2 => Ok(Difficulty::Hard),
            3 => Ok(Difficulty::Expert),
            _ => Err(Error::InvalidDifficulty(value.to_string())),
        }
    }
}

/// Star rating thresholds as multiples of the base score.
pub const STAR_MULTIPLIER_THRESHOLDS: [f64; 6] = [0.21, 0.46, 0.77, 1.85, 3.08, 4.18];

/// Combo values at which the score multiplier steps up (1x → 4x).
pub const MULTIPLIER_THRESHOLDS: [u32; 3] = [1, 2, 3];

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EngineParameters {
    /// Total width in semitones; a reading hits within half of it.
    pub hit_window_width: f64,
    pub phrase_hit_percent: f64,
    pub updates_per_second: u32,
    pub star_multiplier_thresholds: Vec<f64>,
    pub multiplier_thresholds: Vec<u32>,
}

impl EngineParameters {
    pub fn for_difficulty(difficulty: Difficulty, updates_per_second: u32) -> Self {
        EngineParameters {
            hit_window_width: difficulty.hit_window_width(),
            phrase_hit_percent: difficulty.phrase_hit_percent(),
            updates_per_second,
            star_multiplier_thresholds: STAR_MULTIPLIER_THRESHOLDS.to_vec(),
            multiplier_thresholds: MULTIPLIER_THRESHOLDS.to_vec(),
        }
    }

    pub fn half_window(&self) -> f32 {
        (self.hit_window_width / 2.0) as f32
    }

    /// Seconds of song time one reading stands for.
    pub fn sample_duration(&self) -> f64 {
        1.0 / self.updates_per_second.max(1) as f64
    }
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self::for_difficulty(Difficulty::Expert, UPDATES_PER_SECOND)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JudgePhase {
    /// No note under the playhead.
    #[default]
    Idle,
    /// A note is active and accumulating hit ticks.
    Tracking,
    /// The last phrase has just been scored.
    Resolved,
}

/// Per-tick judging state. Only the engine writes to it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EngineState {
    pub phase: JudgePhase,
    pub current_time: f64,
    pub current_tick: u32,
    pub current_target: Option<NoteId>,
    /// Song time of the last voiced reading.
    pub last_sing_time: f64,
    /// Song time of the last reading that hit.
    pub last_hit_time: f64,
    /// Pitch of the last voiced reading.
    pub pitch_sang: f32,
    pub note_ticks_hit: u32,
    pub phrase_ticks_hit: u32,
    /// `None` outside of a phrase.
    pub phrase_ticks_total: Option<u32>,
    pub last_credited_tick: u32,
}

impl EngineState {
    pub fn new() -> Self {
        EngineState {
            phase: JudgePhase::Idle,
            current_time: f64::NEG_INFINITY,
            current_tick: 0,
            current_target: None,
            last_sing_time: f64::NEG_INFINITY,
            last_hit_time: f64::NEG_INFINITY,
            pitch_sang: 0.0,
            note_ticks_hit: 0,
            phrase_ticks_hit: 0,
            phrase_ticks_total: None,
            last_credited_tick: 0,
        }
    }

    /// Fraction of the current phrase sung so far, clamped to [0, 1].
    pub fn phrase_progress(&self) -> f64 {
        match self.phrase_ticks_total {
            Some(total) if total > 0 => (self.phrase_ticks_hit as f64 / total as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EngineStats {
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub phrases_hit: u32,
    pub phrases_missed: u32,
    pub score_multiplier: u32,
    /// Star power bar, 0 to 1.
    pub star_power_amount: f64,
    pub star_power_active: bool,
    pub is_full_combo: bool,
}

impl EngineStats {
    pub fn new() -> Self {
        EngineStats {
            score: 0,
            combo: 0,
            max_combo: 0,
            phrases_hit: 0,
            phrases_missed: 0,
            score_multiplier: 1,
            star_power_amount: 0.0,
            star_power_active: false,
            is_full_combo: true,
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound notifications, drained by the host after every update.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    TargetNoteChanged { note: NoteId },
    PhraseHit { percent: f64, full_points: bool },
    StarPowerPhraseHit,
    StarPowerStatus { active: bool },
}
