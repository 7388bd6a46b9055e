use std::sync::Arc;

use crate::models::{common::Vec3, traits::IStep};

/// 自機の経路追従
///
/// 折れ線経路上を一定のティックあたり移動距離で進みます。現在の目標ウェイポイント
/// までの残り距離が1ティックの移動距離未満になった時点で次のウェイポイントへ
/// 切り替えますが、そのティックの移動は切り替え前の目標方向へ行うため、
/// 各ウェイポイントで僅かに行き過ぎます。
#[derive(Debug, Clone)]
pub struct PathFollower {
    /// ウェイポイント列（2点以上）
    path: Arc<[Vec3]>,
    /// 現在位置（m）
    position: Vec3,
    /// 現在の目標ウェイポイントのインデックス
    index: usize,
    /// ティックあたり移動距離（m）
    step_distance: f64,
}

impl PathFollower {
    /// 経路追従を初期化
    ///
    /// 経路は2点以上、速度と時間刻みは正であることを呼び出し側が保証します。
    ///
    /// # 引数
    ///
    /// * `path` - ウェイポイント列
    /// * `speed` - 対地速度（m/s）
    /// * `dt` - 時間刻み（秒）
    pub fn setup(path: Arc<[Vec3]>, speed: f64, dt: f64) -> Self {
        debug_assert!(path.len() >= 2, "path needs at least two waypoints");
        let position = path[0];
        Self {
            path,
            position,
            index: 1,
            step_distance: speed * dt,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[cfg(test)]
    pub fn waypoint_index(&self) -> usize {
        self.index
    }

    #[cfg(test)]
    pub fn step_distance(&self) -> f64 {
        self.step_distance
    }
}

impl IStep for PathFollower {
    fn step(&mut self) {
        if self.is_finished() {
            return;
        }

        let to_goal = self.path[self.index] - self.position;
        let goal_distance = to_goal.magnitude();

        if goal_distance < self.step_distance {
            self.index += 1;
        }

        // 目標上にちょうど居る場合は方向が定まらないため移動しない
        if goal_distance > 0.0 {
            self.position += to_goal * (self.step_distance / goal_distance);
        }
    }

    fn is_finished(&self) -> bool {
        self.index >= self.path.len()
    }
}
