use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use crate::models::traits::{EmpiricalSampler, TrialRng};

/// 標本抽出に使うヒストグラムの既定ビン数
pub const DEFAULT_BINS: usize = 50;

/// ヒストグラム構築エラー
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HistogramError {
    #[error("観測データが空です")]
    Empty,
    #[error("ビン数は1以上である必要があります")]
    ZeroBins,
    #[error("観測データに有限でない値が含まれています (index {0})")]
    NonFinite(usize),
    #[error("ビン重みが不正です: {0}")]
    Weights(String),
}

/// 観測値から構築した経験分布
///
/// 度数に比例した確率でビンを選び、そのビン内で一様に値を抽出します。
/// 全観測値が同一の場合はその値を常に返します。
#[derive(Debug, Clone)]
pub struct Histogram {
    /// ビン境界（長さ bins + 1）
    edges: Vec<f64>,
    /// 各ビンの度数
    counts: Vec<u64>,
    /// 度数による重み付き選択
    index: Option<WeightedIndex<u64>>,
}

impl Histogram {
    /// 観測値と指定ビン数からヒストグラムを作成
    ///
    /// # 引数
    ///
    /// * `observations` - 生の観測値
    /// * `bins` - ビン数
    pub fn from_observations(observations: &[f64], bins: usize) -> Result<Self, HistogramError> {
        if observations.is_empty() {
            return Err(HistogramError::Empty);
        }
        if bins == 0 {
            return Err(HistogramError::ZeroBins);
        }
        if let Some(i) = observations.iter().position(|v| !v.is_finite()) {
            return Err(HistogramError::NonFinite(i));
        }

        let min = observations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = observations.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if max <= min {
            return Ok(Self {
                edges: vec![min, min],
                counts: vec![observations.len() as u64],
                index: None,
            });
        }

        let width = (max - min) / bins as f64;
        let edges: Vec<f64> = (0..=bins)
            .map(|i| if i == bins { max } else { min + width * i as f64 })
            .collect();

        let mut counts = vec![0u64; bins];
        for v in observations {
            let bin = (((v - min) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }

        let index = WeightedIndex::new(counts.iter().copied())
            .map_err(|e| HistogramError::Weights(e.to_string()))?;

        Ok(Self {
            edges,
            counts,
            index: Some(index),
        })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    #[cfg(test)]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// 値域 (min, max)
    pub fn range(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    fn sample_one(&self, rng: &mut TrialRng) -> f64 {
        match &self.index {
            Some(index) => {
                let bin = index.sample(rng);
                let lo = self.edges[bin];
                let hi = self.edges[bin + 1];
                lo + (hi - lo) * rng.random::<f64>()
            }
            None => self.edges[0],
        }
    }
}

impl EmpiricalSampler for Histogram {
    fn sample(&self, n: usize, rng: &mut TrialRng) -> Vec<f64> {
        (0..n).map(|_| self.sample_one(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(Histogram::from_observations(&[], 10).unwrap_err(), HistogramError::Empty);
        assert_eq!(Histogram::from_observations(&[1.0], 0).unwrap_err(), HistogramError::ZeroBins);
        assert_eq!(
            Histogram::from_observations(&[1.0, f64::NAN], 4).unwrap_err(),
            HistogramError::NonFinite(1)
        );
    }

    #[test]
    fn test_constant_data_collapses() {
        let hist = Histogram::from_observations(&[42.0, 42.0, 42.0], 20).unwrap();
        let mut rng = TrialRng::seed_from_u64(7);
        assert!(hist.sample(50, &mut rng).iter().all(|&v| v == 42.0));
        assert_eq!(hist.bins(), 1);
    }

    #[test]
    fn test_counts_and_range() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0];
        let hist = Histogram::from_observations(&data, 5).unwrap();
        assert_eq!(hist.range(), (0.0, 10.0));
        assert_eq!(hist.counts(), &[2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_samples_stay_in_occupied_bins() {
        // 中央のビンは空
        let data = [0.0, 1.0, 9.0, 10.0];
        let hist = Histogram::from_observations(&data, 10).unwrap();
        let mut rng = TrialRng::seed_from_u64(321);

        for v in hist.sample(2000, &mut rng) {
            assert!((0.0..=10.0).contains(&v));
            assert!(!(2.0..9.0).contains(&v), "empty bin sampled: {}", v);
        }
    }

    #[test]
    fn test_same_seed_same_samples() {
        let hist = Histogram::from_observations(&[1.0, 2.0, 3.0, 5.0, 8.0], 4).unwrap();
        let a = hist.sample(100, &mut TrialRng::seed_from_u64(11));
        let b = hist.sample(100, &mut TrialRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
