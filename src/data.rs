//! 観測データ・経路データのCSV読み込み
//!
//! 観測データは1列目のみを使用し、経路データは x, y, z の3列を使用します。
//! UTF-8 BOM、空行、先頭の見出し行は読み飛ばします。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::Vec3;

/// データ読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("データファイルが見つかりません: {}", .0.display())]
    NotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{source_name}:{line} 数値を解析できません: '{value}'")]
    Parse {
        source_name: String,
        line: usize,
        value: String,
    },
    #[error("{source_name}:{line} 列数が不足しています (必要: {expected}列)")]
    MissingColumn {
        source_name: String,
        line: usize,
        expected: usize,
    },
    #[error("{0} にデータがありません")]
    Empty(String),
}

/// 観測値ファイル（1列目）を読み込み
pub fn read_column<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, DataError> {
    let path = path.as_ref();
    let contents = read_file(path)?;
    let values = parse_column(&contents, &path.display().to_string())?;
    debug!("{}: {}件の観測値を読み込みました", path.display(), values.len());
    Ok(values)
}

/// 経路ファイル（x, y, z の3列）を読み込み
pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Vec<Vec3>, DataError> {
    let path = path.as_ref();
    let contents = read_file(path)?;
    let waypoints = parse_path(&contents, &path.display().to_string())?;
    debug!("{}: {}点のウェイポイントを読み込みました", path.display(), waypoints.len());
    Ok(waypoints)
}

pub fn parse_column(contents: &str, source_name: &str) -> Result<Vec<f64>, DataError> {
    Ok(parse_rows(contents, source_name, 1)?
        .into_iter()
        .map(|row| row[0])
        .collect())
}

pub fn parse_path(contents: &str, source_name: &str) -> Result<Vec<Vec3>, DataError> {
    Ok(parse_rows(contents, source_name, 3)?
        .into_iter()
        .map(|row| Vec3::new(row[0], row[1], row[2]))
        .collect())
}

/// 経路の総延長（m）
pub fn path_length(path: &[Vec3]) -> f64 {
    path.windows(2).map(|w| w[0].distance_3d(&w[1])).sum()
}

fn read_file(path: &Path) -> Result<String, DataError> {
    if !path.exists() {
        return Err(DataError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_rows(contents: &str, source_name: &str, columns: usize) -> Result<Vec<Vec<f64>>, DataError> {
    let mut rows = Vec::new();
    let mut first_content_line = true;

    for (i, line) in contents.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line
            .split(',')
            .map(|f| f.trim().trim_start_matches('\u{feff}'))
            .collect();

        let is_header = first_content_line && fields[0].parse::<f64>().is_err();
        first_content_line = false;
        if is_header {
            continue;
        }

        if fields.len() < columns {
            return Err(DataError::MissingColumn {
                source_name: source_name.to_string(),
                line: line_no,
                expected: columns,
            });
        }

        let row = fields[..columns]
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| DataError::Parse {
                    source_name: source_name.to_string(),
                    line: line_no,
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, DataError>>()?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(DataError::Empty(source_name.to_string()));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_skips_header_and_bom() {
        let values = parse_column("\u{feff}altitude_m\n100.5\n\n200,ignored\n-3\n", "alts").unwrap();
        assert_eq!(values, vec![100.5, 200.0, -3.0]);
    }

    #[test]
    fn test_parse_path() {
        let path = parse_path("\u{feff}1,1,200\n300, 600, 800\n", "path").unwrap();
        assert_eq!(path, vec![Vec3::new(1.0, 1.0, 200.0), Vec3::new(300.0, 600.0, 800.0)]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_path("1,2,3\n4,5\n", "path"),
            Err(DataError::MissingColumn { line: 2, expected: 3, .. })
        ));
        assert!(matches!(
            parse_column("1\nabc\n", "vels"),
            Err(DataError::Parse { line: 2, .. })
        ));
        assert!(matches!(parse_column("header\n\n", "vels"), Err(DataError::Empty(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let missing = std::env::temp_dir().join("macsim_missing_file_does_not_exist.csv");
        assert!(matches!(read_column(&missing), Err(DataError::NotFound(_))));
    }

    #[test]
    fn test_read_path_file() {
        let file = std::env::temp_dir().join(format!("macsim_path_{}.csv", std::process::id()));
        fs::write(&file, "x,y,z\n0,0,100\n3,4,100\n").unwrap();

        let path = read_path(&file).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path_length(&path), 5.0);

        fs::remove_file(&file).unwrap();
    }
}
