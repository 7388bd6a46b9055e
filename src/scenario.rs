use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::batch::RemainderPolicy;
use crate::data::{self, DataError};
use crate::models::{AirspaceBounds, DEFAULT_BINS, Histogram, HistogramError, TrafficDistributions, Vec3};
use crate::simulation::{ConflictThresholds, TrialConfig};

fn default_dt() -> f64 {
    0.1
}

fn default_sim_ops() -> usize {
    100
}

fn default_bins() -> usize {
    DEFAULT_BINS
}

fn default_ownship_speed() -> f64 {
    70.0
}

fn default_results_path() -> PathBuf {
    PathBuf::from("results.jsonl")
}

/// シナリオメタデータ
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ScenarioMeta {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_dt")]
    pub dt_s: f64,
    /// 要求試行数
    #[serde(default = "default_sim_ops")]
    pub sim_ops: usize,
    /// ワーカー数（未指定ならハードウェア並列度）
    #[serde(default)]
    pub workers: Option<usize>,
    /// 親シード（未指定ならOSの乱数）
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub remainder: RemainderPolicy,
}

/// 空域設定
#[derive(Debug, Deserialize, Serialize)]
pub struct AirspaceConfig {
    /// W, E, S, N, B, T（メートル）
    pub bounds_m: [f64; 6],
    /// 目標交通密度（機/m³）
    pub target_density: f64,
    #[serde(default)]
    pub surface_entrance: bool,
}

/// 背景交通の観測データ
#[derive(Debug, Deserialize, Serialize)]
pub struct TrafficDataConfig {
    /// 高度（m）
    pub altitude_csv: PathBuf,
    /// 対地速度（m/s）
    pub speed_csv: PathBuf,
    /// 方位（度）
    pub track_csv: PathBuf,
    /// 昇降率（m/s）
    pub vertical_rate_csv: PathBuf,
    #[serde(default = "default_bins")]
    pub bins: usize,
}

/// 自機設定
#[derive(Debug, Deserialize, Serialize)]
pub struct OwnshipConfig {
    #[serde(default = "default_ownship_speed")]
    pub speed_mps: f64,
    /// x, y, z の3列からなる経路ファイル
    #[serde(default)]
    pub path_csv: Option<PathBuf>,
    /// シナリオ内に直接記述した経路
    #[serde(default)]
    pub waypoints: Option<Vec<[f64; 3]>>,
}

/// コンフリクト判定設定
#[derive(Debug, Deserialize, Serialize)]
pub struct ConflictConfig {
    pub horizontal_m: f64,
    pub vertical_m: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        let thresholds = ConflictThresholds::default();
        Self {
            horizontal_m: thresholds.horizontal_m,
            vertical_m: thresholds.vertical_m,
        }
    }
}

/// 出力設定
#[derive(Debug, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
        }
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub airspace: AirspaceConfig,
    pub traffic_data: TrafficDataConfig,
    pub ownship: OwnshipConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// 相対パスの基準ディレクトリ（シナリオファイルの置き場所）
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        let mut config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::Parse(path.to_path_buf(), e))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        config.validate()?;

        Ok(config)
    }

    /// 設定の基本的な検証
    ///
    /// 数値の妥当性（境界・密度・速度・閾値）は試行入力の検証で改めて確認されます。
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.sim.dt_s <= 0.0 {
            return Err(ScenarioError::Validation("dt_s must be positive".to_string()));
        }
        if self.sim.workers == Some(0) {
            return Err(ScenarioError::Validation("workers must be at least 1".to_string()));
        }

        let b = &self.airspace.bounds_m;
        if b[0] >= b[1] || b[2] >= b[3] || b[4] >= b[5] {
            return Err(ScenarioError::Validation("Invalid airspace bounds".to_string()));
        }

        if self.traffic_data.bins == 0 {
            return Err(ScenarioError::Validation("bins must be at least 1".to_string()));
        }

        match (&self.ownship.path_csv, &self.ownship.waypoints) {
            (Some(_), Some(_)) => {
                return Err(ScenarioError::Validation(
                    "Specify either ownship.path_csv or ownship.waypoints, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(ScenarioError::Validation(
                    "ownship.path_csv or ownship.waypoints is required".to_string(),
                ));
            }
            (None, Some(waypoints)) if waypoints.len() < 2 => {
                return Err(ScenarioError::Validation(format!(
                    "ownship path needs at least 2 waypoints, got {}",
                    waypoints.len()
                )));
            }
            _ => {}
        }

        Ok(())
    }

    /// シナリオファイル基準でパスを解決
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// 自機経路を読み込み
    pub fn load_path(&self) -> Result<Vec<Vec3>, ScenarioError> {
        match (&self.ownship.path_csv, &self.ownship.waypoints) {
            (Some(csv), _) => Ok(data::read_path(self.resolve(csv))?),
            (None, Some(waypoints)) => Ok(waypoints.iter().copied().map(Vec3::from_array).collect()),
            (None, None) => Err(ScenarioError::Validation("ownship path is missing".to_string())),
        }
    }

    fn load_histogram(&self, name: &'static str, csv: &Path) -> Result<Arc<Histogram>, ScenarioError> {
        let observations = data::read_column(self.resolve(csv))?;
        let histogram = Histogram::from_observations(&observations, self.traffic_data.bins)
            .map_err(|source| ScenarioError::Histogram { name, source })?;
        let (min, max) = histogram.range();
        debug!(
            "{}分布: 観測{}件, {}ビン, 範囲 {:.3} .. {:.3}",
            name,
            observations.len(),
            histogram.bins(),
            min,
            max
        );
        Ok(Arc::new(histogram))
    }

    /// 観測データを読み込み、全試行で共有する試行入力を構築
    pub fn trial_config(&self) -> Result<TrialConfig, ScenarioError> {
        let data = &self.traffic_data;
        let distributions = TrafficDistributions {
            altitude: self.load_histogram("altitude", &data.altitude_csv)?,
            speed: self.load_histogram("speed", &data.speed_csv)?,
            track: self.load_histogram("track", &data.track_csv)?,
            vertical_rate: self.load_histogram("vertical_rate", &data.vertical_rate_csv)?,
        };

        Ok(TrialConfig {
            bounds: AirspaceBounds::from_array(self.airspace.bounds_m),
            target_density: self.airspace.target_density,
            distributions,
            surface_entrance: self.airspace.surface_entrance,
            dt: self.sim.dt_s,
            path: self.load_path()?.into(),
            ownship_speed: self.ownship.speed_mps,
            conflict: ConflictThresholds {
                horizontal_m: self.conflict.horizontal_m,
                vertical_m: self.conflict.vertical_m,
            },
        })
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("試行数: {}", self.sim.sim_ops);
        match self.sim.workers {
            Some(workers) => println!("ワーカー数: {}", workers),
            None => println!("ワーカー数: 自動"),
        }
        match self.sim.seed {
            Some(seed) => println!("シード値: {}", seed),
            None => println!("シード値: ランダム"),
        }
        println!();

        let b = &self.airspace.bounds_m;
        let volume = crate::models::BoundingVolume::padded(&AirspaceBounds::from_array(*b));
        println!("=== 空域 ===");
        println!("範囲: W {:.0} / E {:.0} / S {:.0} / N {:.0} / B {:.0} / T {:.0} (m)", b[0], b[1], b[2], b[3], b[4], b[5]);
        println!("目標交通密度: {:e} 機/m³", self.airspace.target_density);
        println!("背景交通: 約{:.0}機", (self.airspace.target_density * volume.volume()).ceil());
        println!("境界面進入: {}", if self.airspace.surface_entrance { "有効" } else { "無効" });
        println!();

        println!("=== 自機 ===");
        println!("速度: {:.1} m/s", self.ownship.speed_mps);
        if let Ok(path) = self.load_path() {
            let length = data::path_length(&path);
            println!("経路: {}点, 総延長 {:.0} m (約{:.1}秒)", path.len(), length, length / self.ownship.speed_mps);
        }
        println!(
            "コンフリクト閾値: 水平 {:.1} m / 鉛直 {:.1} m",
            self.conflict.horizontal_m, self.conflict.vertical_m
        );
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    Parse(PathBuf, serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    Validation(String),
    #[error("データ読み込みエラー: {0}")]
    Data(#[from] DataError),
    #[error("{name}分布の構築エラー: {source}")]
    Histogram {
        name: &'static str,
        source: HistogramError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
meta:
  name: test
sim:
  dt_s: 0.5
  sim_ops: 8
  seed: 321
airspace:
  bounds_m: [0, 1000, 0, 1000, 0, 300]
  target_density: 1.0e-9
traffic_data:
  altitude_csv: alts.csv
  speed_csv: vels.csv
  track_csv: tracks.csv
  vertical_rate_csv: vert_rates.csv
  bins: 10
ownship:
  waypoints:
    - [0, 500, 150]
    - [700, 500, 150]
"#;

    fn parse(yaml: &str) -> ScenarioConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(SCENARIO);
        config.validate().unwrap();

        assert_eq!(config.sim.remainder, RemainderPolicy::Distribute);
        assert_eq!(config.sim.workers, None);
        assert_eq!(config.ownship.speed_mps, 70.0);
        assert_eq!(config.conflict.horizontal_m, 20.0);
        assert_eq!(config.conflict.vertical_m, 15.0);
        assert_eq!(config.output.results_path, PathBuf::from("results.jsonl"));
        assert!(!config.airspace.surface_entrance);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = parse(SCENARIO);
        config.ownship.path_csv = Some(PathBuf::from("path.csv"));
        assert!(matches!(config.validate(), Err(ScenarioError::Validation(_))));

        let mut config = parse(SCENARIO);
        config.ownship.waypoints = Some(vec![[0.0, 0.0, 0.0]]);
        assert!(matches!(config.validate(), Err(ScenarioError::Validation(_))));

        let mut config = parse(SCENARIO);
        config.airspace.bounds_m = [0.0, 1000.0, 0.0, 1000.0, 300.0, 300.0];
        assert!(matches!(config.validate(), Err(ScenarioError::Validation(_))));

        let mut config = parse(SCENARIO);
        config.sim.workers = Some(0);
        assert!(matches!(config.validate(), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = ScenarioConfig::from_file("does/not/exist.yaml").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }

    #[test]
    fn test_trial_config_from_files() {
        let dir = std::env::temp_dir().join(format!("macsim_scenario_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("alts.csv"), "100\n150\n200\n").unwrap();
        fs::write(dir.join("vels.csv"), "40\n50\n60\n").unwrap();
        fs::write(dir.join("tracks.csv"), "0\n90\n180\n270\n").unwrap();
        fs::write(dir.join("vert_rates.csv"), "-1\n0\n1\n").unwrap();
        let scenario_path = dir.join("scenario.yaml");
        fs::write(&scenario_path, SCENARIO).unwrap();

        let config = ScenarioConfig::from_file(&scenario_path).unwrap();
        assert_eq!(config.base_dir, dir);

        let trial = config.trial_config().unwrap();
        trial.validate().unwrap();
        assert_eq!(trial.dt, 0.5);
        assert_eq!(trial.path.len(), 2);
        assert_eq!(data::path_length(&trial.path), 700.0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bundled_example_scenario() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/example.yaml");
        let config = ScenarioConfig::from_file(path).unwrap();

        let trial = config.trial_config().unwrap();
        trial.validate().unwrap();
        assert_eq!(trial.path.len(), 4);
        assert_eq!(trial.conflict, ConflictThresholds::default());
    }

    #[test]
    fn test_trial_config_reports_missing_data() {
        let mut config = parse(SCENARIO);
        config.base_dir = std::env::temp_dir().join("macsim_no_such_dir");
        assert!(matches!(
            config.trial_config(),
            Err(ScenarioError::Data(DataError::NotFound(_)))
        ));
    }
}
