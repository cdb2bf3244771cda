use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_RESOLUTION: u32 = 480;
pub const DEFAULT_BPM: f64 = 120.0;

// Absorbs float error so times computed from whole ticks floor back to them.
const TICK_EPSILON: f64 = 1e-6;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TempoChange {
    pub tick: u32,
    pub bpm: f64,
}

/// Tempo map converting chart ticks to song time.
///
/// `resolution` is ticks per beat. Tempo changes are sorted by tick and the
/// first one always sits on tick 0. Deserialized maps go through
/// [`SyncTrack::new`], so the same holds for host data.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "RawSyncTrack")]
pub struct SyncTrack {
    pub resolution: u32,
    pub tempos: Vec<TempoChange>,
}

/// Tempo map exactly as a host sent it.
#[derive(Deserialize)]
struct RawSyncTrack {
    resolution: u32,
    #[serde(default)]
    tempos: Vec<TempoChange>,
}

impl TryFrom<RawSyncTrack> for SyncTrack {
    type Error = Error;

    fn try_from(raw: RawSyncTrack) -> Result<Self> {
        SyncTrack::new(raw.resolution, raw.tempos)
    }
}

impl Default for SyncTrack {
    fn default() -> Self {
        SyncTrack {
            resolution: DEFAULT_RESOLUTION,
            tempos: vec![TempoChange {
                tick: 0,
                bpm: DEFAULT_BPM,
            }],
        }
    }
}

impl SyncTrack {
    /// Validates and normalises a tempo map: tempos are sorted and a tick-0
    /// tempo is added when missing (120 BPM for an empty list).
    pub fn new(resolution: u32, mut tempos: Vec<TempoChange>) -> Result<Self> {
        if resolution == 0 {
            return Err(Error::InvalidTrack("resolution must be positive".to_string()));
        }
        if let Some(bad) = tempos.iter().find(|t| !(t.bpm > 0.0) || !t.bpm.is_finite()) {
            return Err(Error::InvalidTrack(format!(
                "tempo at tick {} has invalid bpm {}",
                bad.tick, bad.bpm
            )));
        }

        tempos.sort_by_key(|t| t.tick);
        if tempos.first().map_or(true, |t| t.tick != 0) {
            let bpm = tempos.first().map_or(DEFAULT_BPM, |t| t.bpm);
            tempos.insert(0, TempoChange { tick: 0, bpm });
        }

        Ok(SyncTrack { resolution, tempos })
    }

    /// Constant-tempo map.
    pub fn constant(resolution: u32, bpm: f64) -> Result<Self> {
        Self::new(resolution, vec![TempoChange { tick: 0, bpm }])
    }

    fn seconds_per_tick(&self, bpm: f64) -> f64 {
        60.0 / (bpm * self.resolution as f64)
    }

    pub fn tick_to_time(&self, tick: u32) -> f64 {
        let mut time = 0.0;
        for (i, tempo) in self.tempos.iter().enumerate() {
            let segment_end = self.tempos.get(i + 1).map_or(u32::MAX, |t| t.tick);
            if tick <= segment_end {
                return time + (tick - tempo.tick) as f64 * self.seconds_per_tick(tempo.bpm);
            }
            time += (segment_end - tempo.tick) as f64 * self.seconds_per_tick(tempo.bpm);
        }
        time
    }

    /// Tick at `time` seconds, floored. Times before the chart start map to 0.
    pub fn time_to_tick(&self, time: f64) -> u32 {
        if !(time > 0.0) {
            return 0;
        }

        let mut segment_start = 0.0;
        for (i, tempo) in self.tempos.iter().enumerate() {
            let spt = self.seconds_per_tick(tempo.bpm);
            match self.tempos.get(i + 1) {
                Some(next) => {
                    let segment_len = (next.tick - tempo.tick) as f64 * spt;
                    if time < segment_start + segment_len {
                        return tempo.tick + ((time - segment_start) / spt + TICK_EPSILON).floor() as u32;
                    }
                    segment_start += segment_len;
                }
                None => {
                    let ticks = ((time - segment_start) / spt + TICK_EPSILON).floor();
                    return tempo.tick.saturating_add(ticks.min(u32::MAX as f64) as u32);
                }
            }
        }
        0
    }

    pub fn ticks_to_beats(&self, ticks: u32) -> f64 {
        ticks as f64 / self.resolution as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_tempo() {
        let sync = SyncTrack::constant(480, 120.0).unwrap();
        // 120 BPM: one beat every 0.5s
        assert!((sync.tick_to_time(480) - 0.5).abs() < 1e-9);
        assert!((sync.tick_to_time(960) - 1.0).abs() < 1e-9);
        assert_eq!(sync.time_to_tick(1.0), 960);
        assert_eq!(sync.time_to_tick(-3.0), 0);
    }

    #[test]
    fn test_tempo_change() {
        let sync = SyncTrack::new(
            480,
            vec![
                TempoChange { tick: 0, bpm: 120.0 },
                TempoChange { tick: 960, bpm: 60.0 },
            ],
        )
        .unwrap();
        // Two beats at 120 = 1s, then one beat at 60 = 1s
        assert!((sync.tick_to_time(960) - 1.0).abs() < 1e-9);
        assert!((sync.tick_to_time(1440) - 2.0).abs() < 1e-9);
        assert_eq!(sync.time_to_tick(1.5), 1200);
        assert_eq!(sync.time_to_tick(2.0), 1440);
    }

    #[test]
    fn test_tick_time_roundtrip() {
        let sync = SyncTrack::new(
            192,
            vec![
                TempoChange { tick: 0, bpm: 95.0 },
                TempoChange { tick: 768, bpm: 140.0 },
            ],
        )
        .unwrap();
        for tick in (0..4000).step_by(37) {
            let back = sync.time_to_tick(sync.tick_to_time(tick) + 1e-9);
            assert_eq!(back, tick, "tick {} came back as {}", tick, back);
        }
    }

    #[test]
    fn test_missing_zero_tempo_is_filled() {
        let sync = SyncTrack::new(480, vec![TempoChange { tick: 480, bpm: 100.0 }]).unwrap();
        assert_eq!(sync.tempos[0].tick, 0);
        assert_eq!(sync.tempos[0].bpm, 100.0);
    }

    #[test]
    fn test_unsorted_and_empty_tempos_are_normalised() {
        let sync = SyncTrack::new(
            480,
            vec![
                TempoChange { tick: 960, bpm: 60.0 },
                TempoChange { tick: 0, bpm: 120.0 },
            ],
        )
        .unwrap();
        assert_eq!(sync.tempos[0].tick, 0);
        assert_eq!(sync.tempos[1].tick, 960);

        let sync = SyncTrack::new(480, vec![]).unwrap();
        assert_eq!(sync, SyncTrack::default());
    }

    #[test]
    fn test_deserialize_validates() {
        let sync: SyncTrack =
            serde_json::from_str(r#"{"resolution": 480, "tempos": [{"tick": 480, "bpm": 100.0}]}"#)
                .unwrap();
        assert_eq!(sync.tempos[0], TempoChange { tick: 0, bpm: 100.0 });
        // Ticks before the first listed tempo no longer underflow
        assert!((sync.tick_to_time(240) - 0.3).abs() < 1e-9);

        assert!(serde_json::from_str::<SyncTrack>(r#"{"resolution": 0, "tempos": []}"#).is_err());
        assert!(serde_json::from_str::<SyncTrack>(
            r#"{"resolution": 480, "tempos": [{"tick": 0, "bpm": -5.0}]}"#
        )
        .is_err());
    }

    #[test]
    fn test_rejects_bad_tempo() {
        assert!(SyncTrack::constant(480, 0.0).is_err());
        assert!(SyncTrack::constant(0, 120.0).is_err());
    }
}
