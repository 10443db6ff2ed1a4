//! Integration tests for quote loading, weighted returns and config files

use market_regimes::error::RegimeError;
use market_regimes::optimizer::SearchConfig;
use market_regimes::pipeline::{PipelineConfig, RegimePipeline};
use market_regimes::preprocessing::ReturnsTransform;
use market_regimes::utils::DataLoader;
use chrono::{Days, NaiveDate};
use std::fmt::Write as _;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

/// 80 days of 4 instruments; the market rallies for 40 days then sells off.
/// Every tenth day has no volume and must be dropped.
fn quotes_csv() -> String {
    let start = NaiveDate::from_ymd_opt(2015, 3, 2).unwrap();
    let mut csv = String::from("date,PERMNO,BIDLO,ASKHI,VOL,RETX\n");
    for d in 0..80u64 {
        let date = (start + Days::new(d)).format("%Y%m%d");
        let drift = if d < 40 { 0.02 } else { -0.03 };
        for (k, permno) in [10107i64, 14593, 84788, 93436].iter().enumerate() {
            let price = 20.0 + 10.0 * k as f64;
            let volume = if d % 10 == 9 { 0 } else { 1000 + 100 * ((d as usize + k) % 5) };
            let ret = drift + 0.002 * (((d as usize * 3 + k) % 5) as f64 - 2.0);
            writeln!(
                csv,
                "{},{},{:.2},{:.2},{},{:.4}",
                date,
                permno,
                price - 0.5,
                price + 0.5,
                volume,
                ret
            )
            .unwrap();
        }
    }
    csv
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_quotes_to_weighted_returns() {
    let file = write_temp(&quotes_csv());
    let records = DataLoader::new().load_quotes(file.path()).unwrap();
    assert_eq!(records.len(), 320);

    let returns = ReturnsTransform::default().transform(&records).unwrap();
    assert_eq!(returns.instruments, vec![10107, 14593, 84788, 93436]);
    assert_eq!(returns.n_days(), 72);
    assert!(returns.index.as_slice().windows(2).all(|w| w[0] < w[1]));

    // Weights sum to one, so each row sums to that day's weighted average return
    let day0: f64 = returns.matrix.row(0).sum();
    assert!(day0.abs() < 0.05);
}

#[test]
fn test_run_quotes_end_to_end() {
    let file = write_temp(&quotes_csv());
    let records = DataLoader::new().load_quotes(file.path()).unwrap();
    let config = PipelineConfig::default()
        .with_decompose(false)
        .with_search(SearchConfig::default().with_n_iter(5));
    let report = RegimePipeline::new(config).run_quotes(&records).unwrap();

    assert_eq!(report.rows_kept, 72);
    assert!(report.n_regimes >= 1);
    assert!(report.timeline.iter().all(|p| p.cluster < report.n_regimes));
}

#[test]
fn test_duplicate_quotes_rejected() {
    let mut csv = quotes_csv();
    csv.push_str("20150302,10107,19.5,20.5,1000,0.01\n");
    let file = write_temp(&csv);
    let records = DataLoader::new().load_quotes(file.path()).unwrap();
    assert!(matches!(
        ReturnsTransform::default().transform(&records),
        Err(RegimeError::DataError(_))
    ));
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pipeline.json");

    let config = PipelineConfig::default()
        .with_alpha(100.0)
        .with_search(SearchConfig::default().with_n_iter(25).with_n_jobs(0));
    config.save(&path).unwrap();

    let loaded = PipelineConfig::from_file(&path).unwrap();
    assert_eq!(loaded.alpha, 100.0);
    assert_eq!(loaded.search.n_iter, 25);
    assert_eq!(loaded.search.n_jobs, Some(0));
    assert_eq!(loaded.kmeans.max_iter, config.kmeans.max_iter);
}

#[test]
fn test_config_file_errors() {
    assert!(matches!(
        PipelineConfig::from_file("/nonexistent/pipeline.json"),
        Err(RegimeError::IoError(_))
    ));

    let file = write_temp(r#"{"decomposition": {"proportion": 2.0}}"#);
    assert!(matches!(
        PipelineConfig::from_file(file.path()),
        Err(RegimeError::ConfigError(_))
    ));
}
