//! Report module: prints human-readable latency results and per-shape rankings.

use std::time::Duration;

/// Results from a benchmark run of one (driver, query shape) pair.
#[derive(Debug, Clone)]
pub struct ShapeResult {
    pub driver: String,
    pub shape: String,
    pub durations: Vec<Duration>,
    /// Rows validated across all samples (zero for the raw client).
    pub total_rows: usize,
}

impl ShapeResult {
    pub fn new(driver: &str, shape: &str) -> Self {
        Self {
            driver: driver.to_string(),
            shape: shape.to_string(),
            durations: Vec::new(),
            total_rows: 0,
        }
    }

    pub fn add_sample(&mut self, elapsed: Duration, rows: usize) {
        self.durations.push(elapsed);
        self.total_rows += rows;
    }

    pub fn sample_count(&self) -> usize {
        self.durations.len()
    }

    pub fn mean_us(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.durations.iter().map(|d| d.as_secs_f64() * 1e6).sum();
        sum / self.durations.len() as f64
    }

    pub fn percentile_us(&self, pct: f64) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self
            .durations
            .iter()
            .map(|d| d.as_secs_f64() * 1e6)
            .collect();
        sorted.sort_by(f64::total_cmp);
        let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn ops_per_sec(&self) -> f64 {
        let mean = self.mean_us();
        if mean <= 0.0 {
            return 0.0;
        }
        1_000_000.0 / mean
    }

    /// Mean rows per query, or `None` when rows were not decoded.
    pub fn rows_per_op(&self) -> Option<f64> {
        if self.total_rows == 0 || self.durations.is_empty() {
            return None;
        }
        Some(self.total_rows as f64 / self.durations.len() as f64)
    }
}

/// Results of one shape ordered fastest first, with each mean relative to the
/// fastest.
pub fn ranking<'a>(results: &'a [ShapeResult], shape: &str) -> Vec<(&'a ShapeResult, f64)> {
    let mut of_shape: Vec<&ShapeResult> = results.iter().filter(|r| r.shape == shape).collect();
    of_shape.sort_by(|a, b| a.mean_us().total_cmp(&b.mean_us()));

    let fastest = of_shape.first().map(|r| r.mean_us()).unwrap_or(0.0);
    of_shape
        .into_iter()
        .map(|r| {
            let factor = if fastest > 0.0 {
                r.mean_us() / fastest
            } else {
                1.0
            };
            (r, factor)
        })
        .collect()
}

/// Print a formatted report comparing driver results.
pub fn print_report(results: &[ShapeResult]) {
    println!("\n{}", "=".repeat(80));
    println!("  PostgreSQL Driver Latency Report");
    println!("{}", "=".repeat(80));

    for result in results {
        let mean = result.mean_us();

        println!(
            "\n  Driver: {} | Shape: {}",
            result.driver, result.shape
        );
        println!("  {}", "-".repeat(60));
        println!("  Samples:         {:>10}", result.sample_count());
        println!("  Mean:            {:>10.1}µs  ({:.3}ms)", mean, mean / 1000.0);
        println!("  p50:             {:>10.1}µs", result.percentile_us(50.0));
        println!("  p95:             {:>10.1}µs", result.percentile_us(95.0));
        println!("  p99:             {:>10.1}µs", result.percentile_us(99.0));
        println!("  Throughput:      {:>10.0} ops/s", result.ops_per_sec());
        match result.rows_per_op() {
            Some(rows) => println!("  Rows per query:  {:>10.1}", rows),
            None => println!("  Rows per query:  {:>10}", "n/a"),
        }
    }

    println!("\n{}", "=".repeat(80));

    let mut shapes: Vec<&str> = Vec::new();
    for r in results {
        if !shapes.contains(&r.shape.as_str()) {
            shapes.push(&r.shape);
        }
    }

    for shape in shapes {
        println!("\n  Comparison: {shape}");
        println!(
            "  {:16} {:>12} {:>12} {:>12} {:>8}",
            "Driver", "Mean (µs)", "p95 (µs)", "ops/s", "vs best"
        );
        println!("  {}", "-".repeat(64));
        for (r, factor) in ranking(results, shape) {
            println!(
                "  {:16} {:>12.1} {:>12.1} {:>12.0} {:>7.2}x",
                r.driver,
                r.mean_us(),
                r.percentile_us(95.0),
                r.ops_per_sec(),
                factor
            );
        }
    }

    println!();
}
