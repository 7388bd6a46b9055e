use rand::rngs::StdRng;

/// 試行ごとに専有される乱数源
///
/// 試行間で共有してはならない。各試行は自身のシードからこの乱数源を構築する。
pub type TrialRng = StdRng;

/// 経験分布からの標本抽出インターフェース
///
/// 高度・速度・方位・昇降率の各周辺分布がこのtraitを実装します。
/// 分布そのものは読み取り専用で、全ワーカー間で共有されます。
pub trait EmpiricalSampler: Send + Sync + std::fmt::Debug {
    /// 互いに独立な標本を `n` 個抽出
    fn sample(&self, n: usize, rng: &mut TrialRng) -> Vec<f64>;
}

/// 固定時間刻みで前進するシミュレーション構成要素のインターフェース
pub trait IStep {
    /// 1ティックの処理実行
    fn step(&mut self);

    /// これ以上前進しない終端状態かどうか
    fn is_finished(&self) -> bool {
        false
    }
}
