use std::collections::BTreeMap;
use std::panic;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use quant_engine::data::synthetic::SyntheticKind;
use quant_engine::{
    AnalysisRecord, AppConfig, Cli, Command, CsvProvider, EigenportfolioResult, EngineError,
    InMemoryProvider, MarketDataProvider, QuantEngine, load_config,
};

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "As of")]
    as_of: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Strength")]
    strength: String,
    #[tabled(rename = "Hurst")]
    hurst: String,
    #[tabled(rename = "ADF p")]
    adf: String,
    #[tabled(rename = "Ann. Vol")]
    vol: String,
    #[tabled(rename = "Regime")]
    regime: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "PC")]
    rank: usize,
    #[tabled(rename = "Eigenvalue")]
    eigenvalue: String,
    #[tabled(rename = "Explained")]
    explained: String,
    #[tabled(rename = "Cumulative")]
    cumulative: String,
    #[tabled(rename = "Loadings")]
    loadings: String,
}

#[derive(Tabled)]
struct SScoreRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "S-score")]
    s_score: String,
    #[tabled(rename = "R²")]
    r_squared: String,
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", precision, v))
}

fn record_row(record: &AnalysisRecord) -> RecordRow {
    let rec = &record.recommendation;
    RecordRow {
        symbol: record.symbol.clone(),
        as_of: record.as_of_date.map_or_else(|| "-".to_string(), |d| d.to_string()),
        price: format!("{:.2}", record.current_price),
        signal: rec.recommendation.to_string(),
        confidence: format!("{:.1}", rec.confidence),
        strength: format!("{:+.2}", rec.signal_strength),
        hurst: opt(record.signal_processing.as_ref().map(|s| s.hurst_exponent), 3),
        adf: opt(record.stationarity.as_ref().map(|s| s.adf_pvalue), 3),
        vol: opt(record.volatility.as_ref().map(|v| v.annualized_volatility * 100.0), 1),
        regime: record
            .regime
            .as_ref()
            .and_then(|r| r.current_state())
            .map_or_else(|| "-".to_string(), |s| s.label.clone()),
    }
}

/// Stable per-symbol seed so synthetic runs are reproducible.
fn symbol_seed(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3))
}

fn build_provider(cli: &Cli, symbols: &[String]) -> Arc<dyn MarketDataProvider> {
    match cli.synthetic {
        Some(kind) => {
            let provider = symbols.iter().fold(InMemoryProvider::new(), |p, symbol| {
                p.with_series(symbol.clone(), generate(kind, cli.lookback, symbol))
            });
            log::info!("Serving {} synthetic '{}' series", symbols.len(), kind);
            Arc::new(provider)
        }
        None => {
            log::info!("Reading CSV data from {}", cli.data_dir.display());
            Arc::new(CsvProvider::new(&cli.data_dir))
        }
    }
}

fn generate(kind: SyntheticKind, bars: usize, symbol: &str) -> Vec<quant_engine::Candle> {
    kind.generate(bars, symbol_seed(symbol))
}

fn print_records(results: &BTreeMap<String, Result<AnalysisRecord, EngineError>>, json: bool) -> Result<()> {
    if json {
        let payload: BTreeMap<&String, serde_json::Value> = results
            .iter()
            .map(|(symbol, result)| {
                let value = match result {
                    Ok(record) => serde_json::to_value(record),
                    Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
                };
                value.map(|v| (symbol, v))
            })
            .collect::<Result<_, _>>()
            .context("serialising analysis records")?;
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let rows: Vec<RecordRow> = results.values().filter_map(|r| r.as_ref().ok()).map(record_row).collect();
    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{}", table);
    }
    for (symbol, result) in results {
        match result {
            Ok(record) => {
                println!("{}: {}", symbol, record.recommendation.reasoning);
                for d in &record.downgrades {
                    println!("    {} unavailable ({}): {}", d.analyzer, d.kind, d.message);
                }
            }
            Err(e) => println!("{}: FAILED - {}", symbol, e),
        }
    }
    Ok(())
}

fn print_eigen(result: &EigenportfolioResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    let rows: Vec<ComponentRow> = result
        .components
        .iter()
        .map(|c| ComponentRow {
            rank: c.rank,
            eigenvalue: format!("{:.4}", c.eigenvalue),
            explained: format!("{:.1}%", c.explained_variance_ratio * 100.0),
            cumulative: format!("{:.1}%", c.cumulative_variance_ratio * 100.0),
            loadings: c
                .loadings
                .iter()
                .map(|(s, l)| format!("{}={:+.3}", s, l))
                .join(" "),
        })
        .collect();
    println!(
        "{} instruments, {} aligned observations",
        result.symbols.len(),
        result.observations
    );
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);

    if !result.s_scores.is_empty() {
        let scores: Vec<SScoreRow> = result
            .s_scores
            .iter()
            .map(|(symbol, s)| SScoreRow {
                symbol: symbol.clone(),
                s_score: format!("{:+.2}", s.current),
                r_squared: format!("{:.2}", s.r_squared),
            })
            .collect();
        println!("Residual S-scores ({}-bar window)", result.s_score_window);
        let mut table = Table::new(scores);
        table.with(Style::modern());
        println!("{}", table);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    match &cli.command {
        Command::Analyze { symbols } => {
            let engine = QuantEngine::new(build_provider(&cli, symbols), config);
            let results = engine.batch_analyze(symbols, cli.lookback).await;
            print_records(&results, cli.json)?;
            if results.values().all(|r| r.is_err()) {
                anyhow::bail!("no symbol could be analyzed");
            }
        }
        Command::Eigen { symbols, top } => {
            let engine = QuantEngine::new(build_provider(&cli, symbols), config);
            let result = engine
                .eigenportfolios(symbols, cli.lookback, *top)
                .await
                .context("eigenportfolio analysis failed")?;
            print_eigen(&result, cli.json)?;
        }
    }
    Ok(())
}

/// (global, crate) log levels. `--verbose` lifts the crate to Debug in any build.
fn log_levels(verbose: bool, debug_build: bool) -> (log::LevelFilter, log::LevelFilter) {
    if verbose {
        (log::LevelFilter::Warn, log::LevelFilter::Debug)
    } else if debug_build {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Error, log::LevelFilter::Error)
    }
}

fn init_log(verbose: bool) {
    let (global_level, my_code_level) = log_levels(verbose, cfg!(debug_assertions));
    env_logger::Builder::new()
        .filter(None, global_level)
        .filter(Some("quant_engine"), my_code_level)
        .init();
}

fn main() -> Result<()> {
    panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));

    let cli = Cli::parse();
    init_log(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the async runtime")?;
    runtime.block_on(run(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn release_builds_only_log_errors_unless_verbose() {
        assert_eq!(log_levels(false, false), (LevelFilter::Error, LevelFilter::Error));
        assert_eq!(log_levels(false, true), (LevelFilter::Warn, LevelFilter::Info));
        assert_eq!(log_levels(true, false), (LevelFilter::Warn, LevelFilter::Debug));
    }

    #[test]
    fn symbol_seeds_are_stable_and_distinct() {
        assert_eq!(symbol_seed("AAPL"), symbol_seed("AAPL"));
        assert_ne!(symbol_seed("AAPL"), symbol_seed("MSFT"));
    }
}
