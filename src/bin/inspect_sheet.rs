use anyhow::{anyhow, Result};
use indexscraper::{
    family::MetricFamily,
    normalize::{DecimalMark, TableNormalizer, TracingEvents},
    pipeline::read_sheet,
};
use std::{env, path::Path, process::exit, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    // Expect: <XLSX_FILE> <icc|icf> [point|comma] [SKIP_ROWS]
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <XLSX_FILE> <icc|icf> [point|comma] [SKIP_ROWS]",
            args[0]
        );
        exit(1);
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = inspect(&args[1..]) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn inspect(args: &[String]) -> Result<()> {
    let path = Path::new(&args[0]);
    let family = MetricFamily::from_str(&args[1])
        .ok_or_else(|| anyhow!("unknown family {:?}", args[1]))?;
    let mark = match args.get(2).map(|s| s.as_str()) {
        None | Some("comma") => DecimalMark::Comma,
        Some("point") => DecimalMark::Point,
        Some(other) => return Err(anyhow!("unknown decimal mark {:?}", other)),
    };
    let skip = match args.get(3) {
        Some(s) => s.parse::<usize>()?,
        None => 0,
    };

    let sheet = read_sheet(path, skip)?;
    println!("=== Sheet: {} ===", path.display());
    println!("Raw size:    {} rows x {} cols", sheet.height(), sheet.width());
    let pruned = sheet.prune();
    println!("Pruned size: {} rows x {} cols", pruned.height(), pruned.width());
    println!();

    let normalized = TableNormalizer::new(mark, Arc::new(TracingEvents)).normalize(&sheet, family);
    println!("=== {} → {:?} ===", family, normalized.outcome);
    for r in &normalized.records {
        println!(
            "{}  {:>10.2}  month={:<8.2} year={:.2}",
            r.period, r.index_value, r.month_change, r.year_change
        );
    }
    println!("{} record(s)", normalized.records.len());
    Ok(())
}
