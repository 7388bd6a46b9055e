mod batch;
mod data;
mod logging;
mod models;
mod results;
mod scenario;
mod simulation;

use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{error, info};

use batch::{BatchScheduler, available_workers};
use logging::{LogConfig, LogOutput, init_logging, level_from_verbosity, parse_log_level};
use results::{ResultSummary, append_results};
use scenario::ScenarioConfig;

fn cli() -> Command {
    Command::new("macsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("空中衝突リスク推定シミュレーション (Mid-Air Collision Simulation)")
        .long_about(
            "観測データから作った経験分布で背景交通を生成し、経路を飛行する自機との\n\
             近接（コンフリクト）を数えるモンテカルロ・シミュレーションです。\n\
             独立した試行をワーカー数だけ並列に実行し、結果をJSON Lines形式で追記します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("シナリオファイル(.yaml)のパスを指定"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("sim-ops")
                .short('n')
                .long("sim-ops")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("試行数（シナリオの値を上書き）"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("ワーカー数（既定: ハードウェア並列度）"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("親シード（シナリオの値を上書き）"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("結果の出力先（シナリオの値を上書き）"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .value_parser(|s: &str| s.parse::<LogOutput>())
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: debug, -vv: trace)"),
        )
}

fn main() {
    let matches = cli().get_matches();

    let level = match matches.get_one::<String>("log-level") {
        Some(level) => parse_log_level(level),
        None => level_from_verbosity(matches.get_count("verbose")),
    };
    let log_config = LogConfig {
        level,
        output: matches
            .get_one::<LogOutput>("log-output")
            .copied()
            .unwrap_or(LogOutput::Console),
        ..LogConfig::default()
    };

    // ガードはプロセス終了まで保持する
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化エラー: {}", e);
            std::process::exit(1);
        }
    };

    let Some(scenario_path) = matches.get_one::<PathBuf>("scenario") else {
        show_default_help();
        return;
    };

    if let Err(e) = run_scenario(scenario_path, &matches) {
        error!("{}", e);
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &Path, matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let mut scenario = ScenarioConfig::from_file(scenario_path)?;
    info!("シナリオファイル読み込み完了: {}", scenario_path.display());

    apply_overrides(&mut scenario, matches);
    scenario.validate()?;

    if matches.get_flag("info") {
        scenario.print_summary();
        return Ok(());
    }

    scenario.print_summary();
    println!();

    let trial_config = scenario.trial_config()?;
    let workers = scenario.sim.workers.unwrap_or_else(available_workers);
    let scheduler = BatchScheduler::new(
        trial_config,
        scenario.sim.sim_ops,
        workers,
        scenario.sim.remainder,
        scenario.sim.seed,
    )?;
    let plan = scheduler.plan();
    println!(
        "実行試行数: {} (要求 {}, {}ワーカー)",
        plan.total(),
        scenario.sim.sim_ops,
        plan.workers()
    );

    let started = std::time::Instant::now();
    let results = scheduler.run()?;
    info!(
        "{}試行を{:.2}秒で完了しました",
        results.len(),
        started.elapsed().as_secs_f64()
    );

    let results_path = scenario.resolve(&scenario.output.results_path);
    append_results(&results_path, &results)?;

    println!();
    ResultSummary::from_results(&results).print_summary();
    println!("親シード: {}", scheduler.master_seed());
    println!("結果ファイル: {}", results_path.display());

    Ok(())
}

/// コマンドライン引数でシナリオの値を上書き
fn apply_overrides(scenario: &mut ScenarioConfig, matches: &ArgMatches) {
    if let Some(&sim_ops) = matches.get_one::<usize>("sim-ops") {
        scenario.sim.sim_ops = sim_ops;
    }
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        scenario.sim.workers = Some(workers);
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        scenario.sim.seed = Some(seed);
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        // コマンドラインのパスは作業ディレクトリ基準
        scenario.output.results_path = std::env::current_dir()
            .map(|cwd| cwd.join(output))
            .unwrap_or_else(|_| output.clone());
    }
}

/// デフォルトヘルプを表示
fn show_default_help() {
    println!("使用方法:");
    println!("  macsim -s <FILE> [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   シナリオファイルを指定して実行");
    println!("  -i, --info              シナリオ情報のみ表示");
    println!("  -n, --sim-ops <N>       試行数");
    println!("  -w, --workers <N>       ワーカー数");
    println!("      --seed <N>          親シード");
    println!("  -o, --output <FILE>     結果の出力先");
    println!("      --log-output <T>    ログ出力先 (console, file, both)");
    println!("      --log-level <L>     ログレベル");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("例:");
    println!("  macsim -s scenarios/example.yaml");
    println!("  macsim -s scenarios/example.yaml -i");
    println!("  macsim -s scenarios/example.yaml -n 1000 -w 8 --seed 42 -o out/results.jsonl");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_cli_parses_overrides() {
        let matches = cli()
            .try_get_matches_from([
                "macsim", "-s", "a.yaml", "-n", "12", "-w", "3", "--seed", "7", "--log-output", "both", "-vv",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<usize>("sim-ops"), Some(&12));
        assert_eq!(matches.get_one::<usize>("workers"), Some(&3));
        assert_eq!(matches.get_one::<u64>("seed"), Some(&7));
        assert_eq!(matches.get_one::<LogOutput>("log-output"), Some(&LogOutput::Both));
        assert_eq!(matches.get_count("verbose"), 2);
    }

    #[test]
    fn test_cli_rejects_bad_log_output() {
        assert!(cli().try_get_matches_from(["macsim", "--log-output", "syslog"]).is_err());
    }
}
