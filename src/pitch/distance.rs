/// Distance from `target` to `sung` ignoring octaves.
///
/// Both pitches are reduced to their semitone class, then the sung pitch is
/// compared in the same octave, one octave up and one octave down. Returns
/// the closest signed distance (`sung - target`) and the octave shift that
/// produced it. Ties keep the same-octave candidate.
pub fn pitch_distance(target: f32, sung: f32) -> (f32, i32) {
    let target = target.rem_euclid(12.0);
    let sung = sung.rem_euclid(12.0);

    let mut closest = sung - target;
    let mut octave_shift = 0;

    let upper = (sung + 12.0) - target;
    if upper.abs() < closest.abs() {
        closest = upper;
        octave_shift = 1;
    }

    let lower = (sung - 12.0) - target;
    if lower.abs() < closest.abs() {
        closest = lower;
        octave_shift = -1;
    }

    (closest, octave_shift)
}

/// Whether `sung` lands inside a hit window of `window_width` semitones
/// (total width, centred on `target`).
pub fn within_window(target: f32, sung: f32, window_width: f32) -> bool {
    let (distance, _) = pitch_distance(target, sung);
    distance.abs() <= window_width / 2.0
}
