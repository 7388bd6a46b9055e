//! テスト用の合成分布

use std::sync::Arc;

use crate::models::{
    histogram::Histogram,
    traffic::TrafficDistributions,
};

fn histogram(observations: &[f64], bins: usize) -> Arc<Histogram> {
    Arc::new(Histogram::from_observations(observations, bins).unwrap())
}

/// 常に同じ値を返す分布の組
pub fn constant_distributions(
    altitude: f64,
    speed: f64,
    track: f64,
    vertical_rate: f64,
) -> TrafficDistributions {
    TrafficDistributions {
        altitude: histogram(&[altitude], 1),
        speed: histogram(&[speed], 1),
        track: histogram(&[track], 1),
        vertical_rate: histogram(&[vertical_rate], 1),
    }
}

/// 一般航空機を想定したそれらしい分布の組
pub fn distributions() -> TrafficDistributions {
    let altitudes: Vec<f64> = (0..200).map(|i| 150.0 + 7.5 * i as f64).collect();
    let speeds: Vec<f64> = (0..100).map(|i| 30.0 + 0.6 * i as f64).collect();
    let tracks: Vec<f64> = (0..360).map(|i| i as f64).collect();
    let vertical_rates: Vec<f64> = (0..41).map(|i| -5.0 + 0.25 * i as f64).collect();

    TrafficDistributions {
        altitude: histogram(&altitudes, 40),
        speed: histogram(&speeds, 40),
        track: histogram(&tracks, 40),
        vertical_rate: histogram(&vertical_rates, 40),
    }
}
