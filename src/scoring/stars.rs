/// Score needed for each star, given the multiples of the base score.
/// Rounded to the nearest point.
pub fn star_score_thresholds(multipliers: &[f64], base_score: u64) -> Vec<u64> {
    multipliers
        .iter()
        .map(|m| (m * base_score as f64).round() as u64)
        .collect()
}

/// Stars earned by `score`. A track with no base score earns none.
pub fn stars_for_score(score: u64, thresholds: &[u64]) -> usize {
    thresholds
        .iter()
        .take_while(|&&t| t > 0 && score >= t)
        .count()
}
