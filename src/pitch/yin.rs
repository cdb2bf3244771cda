use serde::Serialize;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PitchResult {
    pub hz: f32,
    pub confidence: f32,
    pub midi_float: f32,
}

impl PitchResult {
    pub fn silence() -> Self {
        PitchResult {
            hz: 0.0,
            confidence: 0.0,
            midi_float: 0.0,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.hz <= 0.0
    }
}

const YIN_THRESHOLD: f32 = 0.15;
const SILENCE_RMS: f32 = 0.02;

/// Singing range used when the host does not give one: roughly E2 to C6.
pub const VOICE_MIN_HZ: f32 = 80.0;
pub const VOICE_MAX_HZ: f32 = 1050.0;

pub fn hz_to_midi(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// YIN pitch detector with scratch buffers sized once for the largest lag.
pub struct PitchDetector {
    sample_rate: f32,
    min_lag: usize,
    max_lag: usize,
    diff: Vec<f32>,
    cmnd: Vec<f32>,
}

impl PitchDetector {
    pub fn new(sample_rate: f32, min_freq: f32, max_freq: f32, window: usize) -> Self {
        let min_lag = if max_freq > 0.0 {
            (sample_rate / max_freq).ceil() as usize
        } else {
            0
        };
        let max_lag = if min_freq > 0.0 {
            ((sample_rate / min_freq).floor() as usize).min(window / 2)
        } else {
            window / 2
        };

        PitchDetector {
            sample_rate,
            min_lag: min_lag.max(1),
            max_lag,
            diff: vec![0.0; max_lag + 1],
            cmnd: vec![0.0; max_lag + 1],
        }
    }

    pub fn for_voice(sample_rate: f32, window: usize) -> Self {
        Self::new(sample_rate, VOICE_MIN_HZ, VOICE_MAX_HZ, window)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn detect(&mut self, samples: &[f32]) -> PitchResult {
        if samples.len() < 2 || self.sample_rate <= 0.0 {
            return PitchResult::silence();
        }

        // RMS gate, DC removed
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let energy: f32 = samples.iter().map(|s| (s - mean) * (s - mean)).sum();
        let rms = (energy / samples.len() as f32).sqrt();
        if rms < SILENCE_RMS {
            return PitchResult::silence();
        }

        let half_len = samples.len() / 2;
        let max_lag = self.max_lag.min(half_len);
        let min_lag = self.min_lag;
        if min_lag >= max_lag || max_lag < 2 {
            return PitchResult::silence();
        }

        // Difference function
        for tau in 1..=max_lag {
            let mut sum = 0.0f32;
            for j in 0..half_len {
                let d = samples[j] - samples[j + tau];
                sum += d * d;
            }
            self.diff[tau] = sum;
        }

        // Cumulative mean normalized difference
        self.cmnd[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..=max_lag {
            running_sum += self.diff[tau];
            self.cmnd[tau] = if running_sum > 0.0 {
                self.diff[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }

        let cmnd = &self.cmnd[..=max_lag];

        // First dip under the threshold, walked down to its valley floor
        let mut best_tau = (min_lag..=max_lag)
            .find(|&tau| cmnd[tau] < YIN_THRESHOLD)
            .map(|mut t| {
                while t < max_lag && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                t
            });

        if best_tau.is_none() {
            let (tau, min_val) = (min_lag..=max_lag)
                .map(|tau| (tau, cmnd[tau]))
                .fold((0, f32::MAX), |best, cur| if cur.1 < best.1 { cur } else { best });
            if min_val > 0.5 {
                return PitchResult::silence();
            }
            best_tau = Some(tau);
        }
        let best_tau = match best_tau {
            Some(t) if t > 0 => t,
            _ => return PitchResult::silence(),
        };

        // Parabolic interpolation
        let tau_refined = if best_tau < max_lag {
            let alpha = cmnd[best_tau - 1];
            let beta = cmnd[best_tau];
            let gamma = cmnd[best_tau + 1];
            let denom = 2.0 * (2.0 * beta - alpha - gamma);
            if denom.abs() > 1e-10 {
                best_tau as f32 + (alpha - gamma) / denom
            } else {
                best_tau as f32
            }
        } else {
            best_tau as f32
        };

        if tau_refined <= 0.0 {
            return PitchResult::silence();
        }

        let hz = self.sample_rate / tau_refined;
        PitchResult {
            hz,
            confidence: 1.0 - cmnd[best_tau].min(1.0),
            midi_float: hz_to_midi(hz),
        }
    }
}
