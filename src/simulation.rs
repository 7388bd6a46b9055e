//! # Simulation モジュール
//!
//! 空中衝突リスク評価の1試行（トライアル）を実行するエンジンを提供します。
//!
//! 1試行は、確率的に生成される背景交通の中を自機が既定経路に沿って飛行し、
//! 経路を飛び終えるまでの間に発生したニアミス（コンフリクト）を数えるものです。
//! 固定時間刻み（Δt）で以下の順序を繰り返します。
//!
//! 1. **背景交通処理**: 全機の移動、領域外判定、再スポーン
//! 2. **自機処理**: 経路追従による移動、ウェイポイント切り替え
//! 3. **コンフリクト判定**: 水平距離・鉛直距離の閾値判定と重複排除
//!
//! 自機のウェイポイントインデックスが経路長に達した時点で試行は終了し、
//! [`TrialResult`] を1件出力します。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! let config: TrialConfig = scenario.trial_config()?;
//! config.validate()?;
//! let result = TrialRunner::new(&config, 321).run();
//! println!("conflicts: {}", result.conflict_count);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::models::*;

/// 位置チェックサムに使う位置バッファ先頭の要素数
pub const CHECKSUM_ENTRIES: usize = 600;

/// 試行開始前の入力検証エラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreconditionError {
    #[error("{axis}軸の境界が不正です (min {min} >= max {max})")]
    InvalidBounds { axis: char, min: f64, max: f64 },
    #[error("交通密度は正である必要があります: {0}")]
    NonPositiveDensity(f64),
    #[error("経路は2点以上必要です ({0}点)")]
    PathTooShort(usize),
    #[error("経路の区間{index}の長さが0です")]
    DegenerateSegment { index: usize },
    #[error("自機速度は正である必要があります: {0}")]
    NonPositiveSpeed(f64),
    #[error("時間刻みは正である必要があります: {0}")]
    NonPositiveTimestep(f64),
    #[error("{axis}方向のコンフリクト閾値は正である必要があります: {value}")]
    NonPositiveThreshold { axis: &'static str, value: f64 },
    #[error("{field}に有限でない値が含まれています")]
    NonFinite { field: &'static str },
    #[error("背景交通の機数が上限を超えます (密度 {density} で約{agents:.3e}機, 上限 {limit}機)")]
    TooManyAgents { density: f64, agents: f64, limit: usize },
}

/// コンフリクト判定閾値（メートル）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConflictThresholds {
    pub horizontal_m: f64,
    pub vertical_m: f64,
}

impl Default for ConflictThresholds {
    fn default() -> Self {
        Self {
            horizontal_m: 20.0,
            vertical_m: 15.0,
        }
    }
}

impl ConflictThresholds {
    /// 相対位置がコンフリクトに該当するか
    pub fn is_conflict(&self, ownship: &Vec3, agent: &Vec3) -> bool {
        ownship.distance_xy(agent) < self.horizontal_m && ownship.distance_z(agent) < self.vertical_m
    }
}

/// 全試行で共有される読み取り専用の入力
#[derive(Debug, Clone)]
pub struct TrialConfig {
    pub bounds: AirspaceBounds,
    /// 目標交通密度（機/m³）
    pub target_density: f64,
    pub distributions: TrafficDistributions,
    pub surface_entrance: bool,
    /// 時間刻み（秒/ティック）
    pub dt: f64,
    pub path: Arc<[Vec3]>,
    /// 自機速度（m/s）
    pub ownship_speed: f64,
    pub conflict: ConflictThresholds,
}

impl TrialConfig {
    /// 試行開始前に1度だけ実行する入力検証
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let b = &self.bounds;
        if b.to_array().iter().any(|v| !v.is_finite()) {
            return Err(PreconditionError::NonFinite { field: "bounds" });
        }
        for (axis, min, max) in [
            ('x', b.west, b.east),
            ('y', b.south, b.north),
            ('z', b.bottom, b.top),
        ] {
            if min >= max {
                return Err(PreconditionError::InvalidBounds { axis, min, max });
            }
        }

        if !self.target_density.is_finite() {
            return Err(PreconditionError::NonFinite { field: "target_density" });
        }
        if self.target_density <= 0.0 {
            return Err(PreconditionError::NonPositiveDensity(self.target_density));
        }
        let agents = (self.target_density * BoundingVolume::padded(b).volume()).ceil();
        if !(agents <= MAX_TRAFFIC_AGENTS as f64) {
            return Err(PreconditionError::TooManyAgents {
                density: self.target_density,
                agents,
                limit: MAX_TRAFFIC_AGENTS,
            });
        }

        if self.path.len() < 2 {
            return Err(PreconditionError::PathTooShort(self.path.len()));
        }
        if self.path.iter().any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite())) {
            return Err(PreconditionError::NonFinite { field: "path" });
        }
        if let Some(index) = self.path.windows(2).position(|w| w[0].distance_3d(&w[1]) <= 0.0) {
            return Err(PreconditionError::DegenerateSegment { index });
        }

        if !(self.ownship_speed > 0.0) {
            return Err(PreconditionError::NonPositiveSpeed(self.ownship_speed));
        }
        if !(self.dt > 0.0) {
            return Err(PreconditionError::NonPositiveTimestep(self.dt));
        }
        if !(self.conflict.horizontal_m > 0.0) {
            return Err(PreconditionError::NonPositiveThreshold {
                axis: "horizontal",
                value: self.conflict.horizontal_m,
            });
        }
        if !(self.conflict.vertical_m > 0.0) {
            return Err(PreconditionError::NonPositiveThreshold {
                axis: "vertical",
                value: self.conflict.vertical_m,
            });
        }

        Ok(())
    }

    pub fn traffic_options(&self) -> TrafficOptions {
        TrafficOptions {
            distributions: self.distributions.clone(),
            surface_entrance: self.surface_entrance,
            dt: self.dt,
        }
    }
}

/// 1試行の結果（生成後は不変）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub seed: u64,
    pub ticks: u64,
    /// 経過シミュレーション時間（秒）
    pub elapsed_s: f64,
    pub conflict_count: u64,
    /// 回帰確認用の指紋
    pub position_checksum: f64,
}

/// 試行内で既にコンフリクトとして計上したスロットの台帳
///
/// 識別はスロットインデックスで行うため、再スポーンで同じスロットに入った
/// 別の機体は計上済みとして扱われます。
#[derive(Debug, Clone, Default)]
pub struct ConflictLedger {
    counted: HashSet<usize>,
}

impl ConflictLedger {
    /// スロットを計上。初めての場合のみtrue
    pub fn record(&mut self, slot: usize) -> bool {
        self.counted.insert(slot)
    }

    #[cfg(test)]
    pub fn contains(&self, slot: usize) -> bool {
        self.counted.contains(&slot)
    }

    pub fn len(&self) -> usize {
        self.counted.len()
    }
}

/// 1試行の実行エンジン
///
/// 試行ごとに専用の乱数源・背景交通・自機状態を持ち、他の試行とは何も共有しません。
pub struct TrialRunner {
    seed: u64,
    dt: f64,
    conflict: ConflictThresholds,
    traffic: TrafficPopulation,
    ownship: PathFollower,
    ledger: ConflictLedger,
    ticks: u64,
}

impl TrialRunner {
    /// 試行を初期化
    ///
    /// # 引数
    ///
    /// * `config` - 検証済みの試行入力
    /// * `seed` - この試行の乱数シード
    pub fn new(config: &TrialConfig, seed: u64) -> Self {
        let rng = TrialRng::seed_from_u64(seed);
        let traffic = TrafficPopulation::setup(
            &config.bounds,
            config.target_density,
            config.traffic_options(),
            rng,
        );
        let ownship = PathFollower::setup(Arc::clone(&config.path), config.ownship_speed, config.dt);

        trace!("試行初期化: seed={} 背景交通={}機", seed, traffic.target_agents());

        Self {
            seed,
            dt: config.dt,
            conflict: config.conflict,
            traffic,
            ownship,
            ledger: ConflictLedger::default(),
            ticks: 0,
        }
    }

    /// 経路を飛び終えるまで実行し、結果を返す
    pub fn run(mut self) -> TrialResult {
        while !self.is_finished() {
            self.step();
        }

        let result = self.result();
        debug!(
            "試行完了: seed={} ティック={} コンフリクト={} 再スポーン={}",
            result.seed,
            result.ticks,
            result.conflict_count,
            self.traffic.respawned()
        );
        result
    }

    /// 1ティック進め、このティックで新たに計上したコンフリクト数を返す
    pub fn step(&mut self) -> usize {
        self.traffic.step();
        self.ownship.step();
        let credited = self.detect_conflicts();
        self.ticks += 1;
        credited
    }

    fn detect_conflicts(&mut self) -> usize {
        let ownship = self.ownship.position();
        let conflict = self.conflict;
        let mut credited = 0;

        for (slot, agent) in self.traffic.positions().iter().enumerate() {
            if conflict.is_conflict(&ownship, agent) && self.ledger.record(slot) {
                credited += 1;
            }
        }
        credited
    }

    /// 現在コンフリクト状態にあるスロット
    #[cfg(test)]
    pub fn conflicting_slots(&self) -> Vec<usize> {
        let ownship = self.ownship.position();
        self.traffic
            .positions()
            .iter()
            .enumerate()
            .filter(|(_, agent)| self.conflict.is_conflict(&ownship, agent))
            .map(|(slot, _)| slot)
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.ownship.is_finished()
    }

    pub fn conflict_count(&self) -> u64 {
        self.ledger.len() as u64
    }

    pub fn elapsed_s(&self) -> f64 {
        self.ticks as f64 * self.dt
    }

    #[cfg(test)]
    pub fn traffic(&self) -> &TrafficPopulation {
        &self.traffic
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &ConflictLedger {
        &self.ledger
    }

    /// 現時点の状態から結果を作成
    pub fn result(&self) -> TrialResult {
        TrialResult {
            seed: self.seed,
            ticks: self.ticks,
            elapsed_s: self.elapsed_s(),
            conflict_count: self.conflict_count(),
            position_checksum: self.traffic.position_checksum(CHECKSUM_ENTRIES),
        }
    }
}
