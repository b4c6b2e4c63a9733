//! Candle loading: OHLCV CSV files and seeded synthetic series.
//!
//! CSV normalization:
//! 1. Header is optional; known names and aliases map onto `t,o,h,l,c,v`
//! 2. Unknown headers fall back to the first six columns, in order
//! 3. Millisecond timestamps are converted to seconds
//! 4. Rows are sorted by `t`; duplicate timestamps keep the last row
//!
//! Synthetic data is a developer-only smoke mode and is always tagged.

use quorum_core::domain::Candle;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Timestamps above this are treated as milliseconds.
const MS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no candle data at {0}")]
    Missing(String),

    #[error("{path} has no usable rows")]
    Empty { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// A loaded series plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedCandles {
    pub candles: Vec<Candle>,
    /// BLAKE3 over the normalized candles, for fingerprinting.
    pub dataset_hash: String,
    pub is_synthetic: bool,
    pub skipped_rows: usize,
}

const COLUMNS: [&str; 6] = ["t", "o", "h", "l", "c", "v"];

fn canonical_column(name: &str) -> Option<usize> {
    let name = name.trim().to_ascii_lowercase();
    let canonical = match name.as_str() {
        "time" | "timestamp" | "open_time" => "t",
        "open" => "o",
        "high" => "h",
        "low" => "l",
        "close" => "c",
        "volume" => "v",
        other => other,
    };
    COLUMNS.iter().position(|c| *c == canonical)
}

/// Column index for each of `t,o,h,l,c,v`, from a header row.
fn header_layout(record: &csv::StringRecord) -> Option<[usize; 6]> {
    let mut layout = [usize::MAX; 6];
    for (idx, name) in record.iter().enumerate() {
        if let Some(slot) = canonical_column(name) {
            if layout[slot] == usize::MAX {
                layout[slot] = idx;
            }
        }
    }
    if layout.iter().all(|&i| i != usize::MAX) {
        Some(layout)
    } else {
        None
    }
}

fn looks_numeric(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .is_some_and(|field| field.trim().parse::<f64>().is_ok())
}

fn parse_row(record: &csv::StringRecord, layout: &[usize; 6]) -> Option<Candle> {
    let field = |slot: usize| -> Option<f64> {
        record
            .get(layout[slot])
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    };
    let mut t = field(0)? as i64;
    if t > MS_THRESHOLD {
        t /= 1000;
    }
    Some(Candle {
        t,
        o: field(1)?,
        h: field(2)?,
        l: field(3)?,
        c: field(4)?,
        v: field(5).unwrap_or(0.0),
    })
}

/// Sort by time and keep the last candle for each timestamp.
pub fn normalize(candles: Vec<Candle>) -> Vec<Candle> {
    let mut by_time: BTreeMap<i64, Candle> = BTreeMap::new();
    for candle in candles {
        by_time.insert(candle.t, candle);
    }
    by_time.into_values().collect()
}

/// Parse candle CSV text.
pub fn parse_candles_csv(text: &str, origin: &str) -> Result<LoadedCandles, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut layout = [0, 1, 2, 3, 4, 5];
    let mut raw = Vec::new();
    let mut skipped = 0usize;

    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|source| LoadError::Csv {
            path: origin.to_string(),
            source,
        })?;
        if i == 0 && !looks_numeric(&record) {
            if let Some(found) = header_layout(&record) {
                layout = found;
            }
            continue;
        }
        match parse_row(&record, &layout) {
            Some(candle) => raw.push(candle),
            None => skipped += 1,
        }
    }

    if raw.is_empty() {
        return Err(LoadError::Empty {
            path: origin.to_string(),
        });
    }
    if skipped > 0 {
        tracing::warn!(source = origin, skipped, "skipped unparsable candle rows");
    }

    let candles = normalize(raw);
    Ok(LoadedCandles {
        dataset_hash: dataset_hash(&candles),
        candles,
        is_synthetic: false,
        skipped_rows: skipped,
    })
}

/// Load a candle CSV file.
pub fn load_candles(path: &Path) -> Result<LoadedCandles, LoadError> {
    if !path.exists() {
        return Err(LoadError::Missing(path.display().to_string()));
    }
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;
    parse_candles_csv(&text, &display)
}

/// BLAKE3 over the candle bytes.
pub fn dataset_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.t.to_le_bytes());
        for v in [c.o, c.h, c.l, c.c, c.v] {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Deterministic random-walk series seeded from the pair name and `seed`.
pub fn synthetic_candles(
    pair: &str,
    seed: u64,
    n: usize,
    start_t: i64,
    interval_secs: i64,
) -> LoadedCandles {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut material = blake3::Hasher::new();
    material.update(pair.as_bytes());
    material.update(&seed.to_le_bytes());
    let mut rng = StdRng::from_seed(*material.finalize().as_bytes());

    let mut candles = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    for i in 0..n {
        let ret: f64 = rng.gen_range(-0.006..0.0065);
        let open = price;
        let close = price * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.003));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.003));
        let volume = rng.gen_range(100.0..10_000.0);
        candles.push(Candle::new(
            start_t + i as i64 * interval_secs,
            open,
            high,
            low,
            close,
            volume,
        ));
        price = close;
    }

    LoadedCandles {
        dataset_hash: dataset_hash(&candles),
        candles,
        is_synthetic: true,
        skipped_rows: 0,
    }
}
