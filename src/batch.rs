//! # Batch モジュール
//!
//! 多数の独立した試行を並列に実行し、結果を収集します。
//!
//! ワーカーはハードウェア並列度ごとに1つ起動され、それぞれが割り当てられた数の
//! 試行を順番に実行します。各ワーカーは自身の乱数源をワーカー内で構築し、
//! 試行ごとに63ビットのシードを引いて試行専用の乱数源を作ります。プロセス全体で
//! 共有される乱数源は存在しません。結果は1本のチャネルに集約され、期待件数が
//! 揃うまでスケジューラがブロックします。結果の到着順は不定です。

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::simulation::{PreconditionError, TrialConfig, TrialResult, TrialRunner};

/// 試行数がワーカー数で割り切れない場合の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainderPolicy {
    /// 余りを先頭のワーカーから1件ずつ割り当て、要求数ちょうどを実行
    #[default]
    Distribute,
    /// 余りを実行しない（各ワーカー `sim_ops / workers` 件）
    Drop,
}

/// ワーカーごとの試行数の割り当て
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    batch_sizes: Vec<usize>,
}

impl BatchPlan {
    pub fn new(sim_ops: usize, workers: usize, policy: RemainderPolicy) -> Self {
        let base = sim_ops.checked_div(workers).unwrap_or(0);
        let remainder = sim_ops.checked_rem(workers).unwrap_or(0);

        let batch_sizes = (0..workers)
            .map(|worker| match policy {
                RemainderPolicy::Distribute => base + usize::from(worker < remainder),
                RemainderPolicy::Drop => base,
            })
            .collect();

        Self { batch_sizes }
    }

    pub fn workers(&self) -> usize {
        self.batch_sizes.len()
    }

    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    /// 実行される試行の総数
    pub fn total(&self) -> usize {
        self.batch_sizes.iter().sum()
    }
}

/// 利用可能なハードウェア並列度
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// バッチ実行エラー
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("入力検証エラー: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("ワーカー数は1以上である必要があります")]
    NoWorkers,
    #[error("ランタイム初期化エラー: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("結果が不足しています (期待 {expected}件, 受信 {received}件)")]
    WorkerFailed { expected: usize, received: usize },
    #[error("ワーカーが異常終了しました: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 並列バッチ実行スケジューラ
#[derive(Debug)]
pub struct BatchScheduler {
    config: Arc<TrialConfig>,
    plan: BatchPlan,
    master_seed: u64,
}

impl BatchScheduler {
    /// スケジューラを作成
    ///
    /// 試行入力の検証はここで1度だけ行い、以降の試行中には行いません。
    ///
    /// # 引数
    ///
    /// * `config` - 全試行で共有する入力
    /// * `sim_ops` - 要求試行数
    /// * `workers` - ワーカー数
    /// * `policy` - 余りの扱い
    /// * `master_seed` - ワーカーシードを引くための親シード（未指定ならOSの乱数）
    pub fn new(
        config: TrialConfig,
        sim_ops: usize,
        workers: usize,
        policy: RemainderPolicy,
        master_seed: Option<u64>,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        if workers == 0 {
            return Err(BatchError::NoWorkers);
        }

        let plan = BatchPlan::new(sim_ops, workers, policy);
        if plan.total() < sim_ops {
            warn!(
                "要求試行数{}件のうち{}件は実行されません",
                sim_ops,
                sim_ops - plan.total()
            );
        }

        Ok(Self {
            config: Arc::new(config),
            plan,
            master_seed: master_seed.unwrap_or_else(|| rand::rng().random()),
        })
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// 全試行を実行し、到着順の結果を返す
    pub fn run(&self) -> Result<Vec<TrialResult>, BatchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.plan.workers())
            .thread_name("macsim-worker")
            .build()?;

        runtime.block_on(self.run_batches())
    }

    async fn run_batches(&self) -> Result<Vec<TrialResult>, BatchError> {
        let expected = self.plan.total();
        info!(
            "{}ワーカーで計{}試行を実行します (親シード: {})",
            self.plan.workers(),
            expected,
            self.master_seed
        );

        let (tx, mut rx) = mpsc::channel::<TrialResult>(self.plan.workers() * 4);
        let mut master = StdRng::seed_from_u64(self.master_seed);
        let mut handles = Vec::with_capacity(self.plan.workers());

        for (worker, &batch_size) in self.plan.batch_sizes().iter().enumerate() {
            let worker_seed: u64 = master.random();
            let config = Arc::clone(&self.config);
            let tx = tx.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                run_worker(worker, batch_size, worker_seed, &config, &tx)
            }));
        }
        drop(tx);

        let report_every = (expected / 10).max(1);
        let mut results = Vec::with_capacity(expected);
        while results.len() < expected {
            let Some(result) = rx.recv().await else {
                break;
            };
            results.push(result);

            if results.len() % report_every == 0 {
                let progress = results.len() as f64 / expected as f64 * 100.0;
                info!("進行状況: {:.1}% ({}/{}試行)", progress, results.len(), expected);
            }
        }

        for handle in handles {
            handle.await?;
        }

        if results.len() < expected {
            return Err(BatchError::WorkerFailed {
                expected,
                received: results.len(),
            });
        }
        Ok(results)
    }
}

/// 1ワーカー分の試行を順番に実行
fn run_worker(
    worker: usize,
    batch_size: usize,
    worker_seed: u64,
    config: &TrialConfig,
    tx: &mpsc::Sender<TrialResult>,
) {
    let mut seeds = StdRng::seed_from_u64(worker_seed);
    debug!("ワーカー{}開始: {}試行", worker, batch_size);

    for _ in 0..batch_size {
        let seed = seeds.random::<u64>() >> 1;
        let result = TrialRunner::new(config, seed).run();
        if tx.blocking_send(result).is_err() {
            warn!("ワーカー{}: 結果の送信先が閉じられました", worker);
            return;
        }
    }

    debug!("ワーカー{}完了", worker);
}
