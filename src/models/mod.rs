// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 標本抽出・時間発展のインターフェース（trait）定義
pub mod traits;

// 経験分布
pub mod histogram;

// 背景交通と自機のモデル
pub mod traffic;
pub mod ownship;

#[cfg(test)]
pub mod test_support;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use histogram::{Histogram, HistogramError, DEFAULT_BINS};
pub use traffic::{TrafficDistributions, TrafficOptions, TrafficPopulation, MAX_TRAFFIC_AGENTS};
pub use ownship::PathFollower;
