//! Serializable run configuration.
//!
//! One TOML file covers every component. All sections are optional and fall
//! back to their defaults, so an empty file is a valid configuration.

use quorum_core::agents::TechnicalConfig;
use quorum_core::consensus::{AgentWeights, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Content-addressable identifier of a configuration.
pub type ConfigFingerprint = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `[consensus]`: decision thresholds plus `[consensus.weights]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub weights: AgentWeights,
}

/// `[orders]`: level geometry for new trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
    pub risk_pct: f64,
    pub rr: f64,
    pub sl_distance_pct: f64,
    /// Paper trade size.
    pub size: f64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            risk_pct: 0.01,
            rr: 1.5,
            sl_distance_pct: 0.004,
            size: 1.0,
        }
    }
}

/// `[risk]`: daily limits. Zero disables a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_trades_per_day: u32,
    pub max_daily_risk_r: f64,
    pub max_risk_per_trade_r: f64,
    pub assumed_r_per_trade: f64,
    pub state_file: PathBuf,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_trades_per_day: 0,
            max_daily_risk_r: 0.0,
            max_risk_per_trade_r: 0.0,
            assumed_r_per_trade: 1.0,
            state_file: PathBuf::from("data/trading_daily_state.json"),
        }
    }
}

/// `[backtest]`: simulation gate and window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub score_min: f64,
    pub window: usize,
    pub output_dir: PathBuf,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            score_min: 0.0,
            window: 300,
            output_dir: PathBuf::from("artifacts/backtest"),
        }
    }
}

/// `[live]`: decision cycle inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub pairs: Vec<String>,
    pub interval: String,
    pub data_dir: PathBuf,
    /// Directory with `news/` and `sentiment/` snapshot folders.
    pub snapshot_dir: PathBuf,
    pub max_input_age_secs: i64,
    pub snapshot_max_age_secs: i64,
    pub score_min: f64,
    pub use_news: bool,
    pub use_sentiment: bool,
    pub use_research: bool,
    pub paper_enabled: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            pairs: vec!["BTCUSDT".to_string()],
            interval: "15m".to_string(),
            data_dir: PathBuf::from("data"),
            snapshot_dir: PathBuf::from("data"),
            max_input_age_secs: 2 * 60 * 60,
            snapshot_max_age_secs: 90 * 60,
            score_min: 0.0,
            use_news: true,
            use_sentiment: true,
            use_research: false,
            paper_enabled: true,
        }
    }
}

impl LiveConfig {
    /// Candle CSV path for a pair: `{data_dir}/{PAIR}_{interval}.csv`.
    pub fn candle_path(&self, pair: &str) -> PathBuf {
        self.data_dir.join(format!("{pair}_{}.csv", self.interval))
    }
}

/// `[journal]`: location of the append-only trade and decision logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub dir: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/journal"),
        }
    }
}

/// Complete configuration for backtests and live cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    pub consensus: ConsensusConfig,
    pub technical: TechnicalConfig,
    pub orders: OrdersConfig,
    pub risk: RiskConfig,
    pub backtest: BacktestSection,
    pub live: LiveConfig,
    pub journal: JournalConfig,
}

impl QuorumConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: QuorumConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.consensus.thresholds;
        if t.driver_long <= t.driver_short {
            return Err(ConfigError::Invalid(format!(
                "driver_long ({}) must be above driver_short ({})",
                t.driver_long, t.driver_short
            )));
        }
        if t.long <= t.short {
            return Err(ConfigError::Invalid(format!(
                "long ({}) must be above short ({})",
                t.long, t.short
            )));
        }
        let o = &self.orders;
        if !(o.sl_distance_pct > 0.0 && o.sl_distance_pct < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "orders.sl_distance_pct must be in (0, 1), got {}",
                o.sl_distance_pct
            )));
        }
        if o.rr < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "orders.rr must be non-negative, got {}",
                o.rr
            )));
        }
        if o.size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "orders.size must be positive, got {}",
                o.size
            )));
        }
        let r = &self.risk;
        if r.max_daily_risk_r < 0.0 || r.max_risk_per_trade_r < 0.0 || r.assumed_r_per_trade < 0.0
        {
            return Err(ConfigError::Invalid("risk limits must be non-negative".into()));
        }
        if self.backtest.window == 0 {
            return Err(ConfigError::Invalid("backtest.window must be positive".into()));
        }
        if self.backtest.window < self.technical.min_history {
            return Err(ConfigError::Invalid(format!(
                "backtest.window ({}) is shorter than technical.min_history ({})",
                self.backtest.window, self.technical.min_history
            )));
        }
        Ok(())
    }

    /// Deterministic content hash of the full configuration.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        // Plain structs only, so serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
