use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use crate::models::{
    common::{AirspaceBounds, BoundingVolume, Vec3, math_utils},
    traits::{EmpiricalSampler, IStep, TrialRng},
};

/// 再スポーンを一括実行する最小の領域外エージェント数
///
/// 領域外のエージェントが1機だけの場合、そのエージェントは次のティックまで
/// 領域外に留まり、2機以上揃った時点でまとめて再スポーンされます。
pub const RESPAWN_BATCH_MIN: usize = 2;

/// 1試行あたりの背景交通の上限機数
///
/// スロットごとに位置と変位を保持するため、これを超える母集団はメモリに載せません。
pub const MAX_TRAFFIC_AGENTS: usize = 5_000_000;

/// 背景交通の4つの経験周辺分布
#[derive(Debug, Clone)]
pub struct TrafficDistributions {
    pub altitude: Arc<dyn EmpiricalSampler>,
    pub speed: Arc<dyn EmpiricalSampler>,
    pub track: Arc<dyn EmpiricalSampler>,
    pub vertical_rate: Arc<dyn EmpiricalSampler>,
}

/// 背景交通の生成オプション
#[derive(Debug, Clone)]
pub struct TrafficOptions {
    pub distributions: TrafficDistributions,
    /// 境界面からの進入モード
    pub surface_entrance: bool,
    /// 時間刻み（秒）
    pub dt: f64,
}

/// 背景交通の母集団
///
/// 固定数のエージェントスロットを持つアリーナです。スロットはインデックスのみで
/// 識別され、再スポーン時には同じスロットが別の機体として再利用されます。
/// 試行中のエージェント数は常に `target_agents` のままです。
#[derive(Debug, Clone)]
pub struct TrafficPopulation {
    volume: BoundingVolume,
    target_agents: usize,
    options: TrafficOptions,
    /// スロットごとの位置（m）
    positions: Vec<Vec3>,
    /// スロットごとのティックあたり変位（m/tick）
    displacements: Vec<Vec3>,
    /// 再スポーン待ちのスロットインデックス
    pending: Vec<usize>,
    /// 累積再スポーン数（初期スポーンを除く）
    respawned: u64,
    rng: TrialRng,
}

impl TrafficPopulation {
    /// 母集団を初期化
    ///
    /// パディング済み空間を計算し、`ceil(密度 × 体積)` 個のスロットを確保して
    /// 全スロットをスポーンします。密度または体積が0の場合はエージェント0機となり、
    /// エラーにはなりません。機数は [`MAX_TRAFFIC_AGENTS`] で頭打ちになるため、
    /// 上限を超える入力は事前の入力検証で弾いてください。
    ///
    /// # 引数
    ///
    /// * `bounds` - 空域境界
    /// * `target_density` - 目標交通密度（機/m³）
    /// * `options` - 分布・進入モード・時間刻み
    /// * `rng` - この試行専用の乱数源
    pub fn setup(
        bounds: &AirspaceBounds,
        target_density: f64,
        options: TrafficOptions,
        rng: TrialRng,
    ) -> Self {
        let volume = BoundingVolume::padded(bounds);
        let target_agents = target_agent_count(target_density, volume.volume());

        let mut population = Self {
            volume,
            target_agents,
            options,
            positions: vec![Vec3::ZERO; target_agents],
            displacements: vec![Vec3::ZERO; target_agents],
            pending: (0..target_agents).collect(),
            respawned: 0,
            rng,
        };
        population.spawn();
        population.respawned = 0;
        population
    }

    /// 再スポーン待ちの全スロットに新しいエージェントを生成
    fn spawn(&mut self) {
        let n = self.pending.len();
        if n == 0 {
            return;
        }

        let distributions = &self.options.distributions;
        let speeds = distributions.speed.sample(n, &mut self.rng);
        let tracks = distributions.track.sample(n, &mut self.rng);
        let vertical_rates = distributions.vertical_rate.sample(n, &mut self.rng);
        let altitudes = distributions.altitude.sample(n, &mut self.rng);

        let pending = std::mem::take(&mut self.pending);
        for (i, &slot) in pending.iter().enumerate() {
            let (x, y) = self.spawn_xy();
            self.positions[slot] = Vec3::new(x, y, altitudes[i]);

            let (vx, vy) = math_utils::bearing_to_velocity_xy(tracks[i], speeds[i]);
            self.displacements[slot] = Vec3::new(vx, vy, vertical_rates[i]) * self.options.dt;
        }

        self.respawned += n as u64;
        self.pending = pending;
        self.pending.clear();
    }

    /// スポーン位置の水平座標を決定
    ///
    /// 既定では水平範囲内で一様。境界面進入モードでは4辺のいずれかを等確率で選び、
    /// 対応する座標をその辺に固定します。
    fn spawn_xy(&mut self) -> (f64, f64) {
        let x_range = self.volume.x;
        let y_range = self.volume.y;
        let mut x = x_range.min + (x_range.max - x_range.min) * self.rng.random::<f64>();
        let mut y = y_range.min + (y_range.max - y_range.min) * self.rng.random::<f64>();

        if self.options.surface_entrance {
            let r = self.rng.random::<f64>();
            if r < 0.25 {
                x = x_range.min;
            } else if r < 0.5 {
                x = x_range.max;
            } else if r < 0.75 {
                y = y_range.min;
            } else {
                y = y_range.max;
            }
        }

        (x, y)
    }

    pub fn target_agents(&self) -> usize {
        self.target_agents
    }

    /// 現在のスロット数（常に `target_agents` と等しい）
    #[cfg(test)]
    pub fn live_agents(&self) -> usize {
        self.positions.len()
    }

    #[cfg(test)]
    pub fn volume(&self) -> &BoundingVolume {
        &self.volume
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[cfg(test)]
    pub fn displacements(&self) -> &[Vec3] {
        &self.displacements
    }

    /// 再スポーン待ちのスロット
    #[cfg(test)]
    pub fn pending(&self) -> &[usize] {
        &self.pending
    }

    pub fn respawned(&self) -> u64 {
        self.respawned
    }

    /// 位置バッファ先頭 `max_entries` 要素（x, y, z 順に平坦化）の総和
    ///
    /// 回帰確認用の指紋であり、正しさの判定には使わない。
    pub fn position_checksum(&self, max_entries: usize) -> f64 {
        self.positions
            .iter()
            .flat_map(|p| p.to_array())
            .take(max_entries)
            .sum()
    }
}

impl IStep for TrafficPopulation {
    fn step(&mut self) {
        for (position, displacement) in self.positions.iter_mut().zip(&self.displacements) {
            *position += *displacement;
        }

        self.pending.clear();
        for (slot, position) in self.positions.iter().enumerate() {
            if self.volume.is_outside(position) {
                self.pending.push(slot);
            }
        }

        if self.pending.len() >= RESPAWN_BATCH_MIN {
            trace!("{}機を再スポーン", self.pending.len());
            self.spawn();
        }
    }
}

/// 目標エージェント数 `ceil(密度 × 体積)`（上限 [`MAX_TRAFFIC_AGENTS`]）
///
/// 密度または体積が0の場合のみ0機になります。
fn target_agent_count(density: f64, volume: f64) -> usize {
    let count = (density * volume).ceil();
    if count > 0.0 {
        count.min(MAX_TRAFFIC_AGENTS as f64) as usize
    } else {
        0
    }
}
