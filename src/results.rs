//! 試行結果の永続化と集計
//!
//! 結果は1行1試行のJSON Lines形式で出力ファイルに追記します。

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::simulation::TrialResult;

/// 結果書き込みエラー
#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("結果ファイル書き込みエラー {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("結果のシリアライズに失敗しました: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 結果を出力ファイルに追記し、書き込んだ件数を返す
pub fn append_results<P: AsRef<Path>>(path: P, results: &[TrialResult]) -> Result<usize, ResultsError> {
    let path = path.as_ref();
    let io_err = |source: std::io::Error| ResultsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    for result in results {
        serde_json::to_writer(&mut writer, result)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;

    info!("{}件の結果を{}に書き込みました", results.len(), path.display());
    Ok(results.len())
}

/// 結果集合の集計
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    pub trials: usize,
    pub total_conflicts: u64,
    /// コンフリクトが1件以上発生した試行数
    pub trials_with_conflict: usize,
    pub mean_conflicts: f64,
    /// 自機の総飛行時間（時間）
    pub flight_hours: f64,
    pub conflicts_per_flight_hour: f64,
}

impl ResultSummary {
    pub fn from_results(results: &[TrialResult]) -> Self {
        let trials = results.len();
        let total_conflicts: u64 = results.iter().map(|r| r.conflict_count).sum();
        let trials_with_conflict = results.iter().filter(|r| r.conflict_count > 0).count();
        let flight_hours = results.iter().map(|r| r.elapsed_s).sum::<f64>() / 3600.0;

        Self {
            trials,
            total_conflicts,
            trials_with_conflict,
            mean_conflicts: if trials > 0 {
                total_conflicts as f64 / trials as f64
            } else {
                0.0
            },
            flight_hours,
            conflicts_per_flight_hour: if flight_hours > 0.0 {
                total_conflicts as f64 / flight_hours
            } else {
                0.0
            },
        }
    }

    /// 集計結果を表示
    pub fn print_summary(&self) {
        println!("=== 集計結果 ===");
        println!("試行数: {}", self.trials);
        println!("総コンフリクト数: {}", self.total_conflicts);
        println!(
            "コンフリクト発生試行: {} ({:.2}%)",
            self.trials_with_conflict,
            if self.trials > 0 {
                self.trials_with_conflict as f64 / self.trials as f64 * 100.0
            } else {
                0.0
            }
        );
        println!("平均コンフリクト数: {:.4}", self.mean_conflicts);
        println!("総飛行時間: {:.2}時間", self.flight_hours);
        println!("飛行時間あたりコンフリクト数: {:.4}/時間", self.conflicts_per_flight_hour);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(seed: u64, conflicts: u64, elapsed_s: f64) -> TrialResult {
        TrialResult {
            seed,
            ticks: (elapsed_s * 10.0) as u64,
            elapsed_s,
            conflict_count: conflicts,
            position_checksum: 0.0,
        }
    }

    #[test]
    fn test_summary() {
        let results = [result(1, 0, 1800.0), result(2, 3, 1800.0), result(3, 1, 3600.0)];
        let summary = ResultSummary::from_results(&results);

        assert_eq!(summary.trials, 3);
        assert_eq!(summary.total_conflicts, 4);
        assert_eq!(summary.trials_with_conflict, 2);
        assert!((summary.mean_conflicts - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.flight_hours, 2.0);
        assert_eq!(summary.conflicts_per_flight_hour, 2.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ResultSummary::from_results(&[]);
        assert_eq!(summary.trials, 0);
        assert_eq!(summary.mean_conflicts, 0.0);
        assert_eq!(summary.conflicts_per_flight_hour, 0.0);
    }

    #[test]
    fn test_append_results_appends_lines() {
        let dir = std::env::temp_dir().join(format!("macsim_results_{}", std::process::id()));
        let file = dir.join("results.jsonl");
        let _ = fs::remove_dir_all(&dir);

        append_results(&file, &[result(7, 2, 10.0)]).unwrap();
        append_results(&file, &[result(8, 0, 12.0), result(9, 1, 14.0)]).unwrap();

        let contents = fs::read_to_string(&file).unwrap();
        let rows: Vec<TrialResult> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].seed, 7);
        assert_eq!(rows[2].conflict_count, 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
