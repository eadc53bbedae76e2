//! Configuration for the settlement engine.
//!
//! Loaded from TOML. Every field has a default so a partial file (or none)
//! is valid; [`EngineConfig::validate`] rejects zero or absurd windows.
//!
//! ```toml
//! [timeouts]
//! expiry_offer_default_hours = 168
//! expiry_deal_acc_minutes = 60
//!
//! [products.lend_borrow_btcusd]
//! expiry_deal_ini_minutes = 90
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{DlcError, Result, constants};

/// Longest window any timer may be configured to (ten years).
const MAX_SPAN_SECS: i64 = 10 * 365 * 86_400;

fn span_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).map_or(MAX_SPAN_SECS, |s| s.min(MAX_SPAN_SECS)))
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timeouts: TimeoutConfig,
    pub reservation: ReservationConfig,
    pub sweep: SweepConfig,
    pub confirmations: ConfirmationConfig,
    pub logging: LoggingConfig,
    /// Per-product timer overrides, keyed by product id.
    pub products: BTreeMap<String, ProductTimers>,
}

/// Global phase timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub expiry_offer_default_hours: u64,
    /// Acceptor's funding signature window, counted from acceptance.
    pub expiry_deal_acc_minutes: u64,
    /// Initiator's funding signature window, counted from acceptance.
    pub expiry_deal_ini_minutes: u64,
    pub refund_delay_days: u64,
    /// Window to broadcast a fully signed funding transaction.
    pub funding_broadcast_minutes: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            expiry_offer_default_hours: constants::DEFAULT_OFFER_EXPIRY_HOURS,
            expiry_deal_acc_minutes: constants::DEFAULT_DEAL_ACC_MINUTES,
            expiry_deal_ini_minutes: constants::DEFAULT_DEAL_INI_MINUTES,
            refund_delay_days: constants::DEFAULT_REFUND_DELAY_DAYS,
            funding_broadcast_minutes: constants::DEFAULT_FUNDING_BROADCAST_MINUTES,
        }
    }
}

/// Optional per-product overrides of [`TimeoutConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductTimers {
    pub expiry_offer_hours: Option<u64>,
    pub expiry_deal_acc_minutes: Option<u64>,
    pub expiry_deal_ini_minutes: Option<u64>,
    pub refund_delay_days: Option<u64>,
}

/// Timers in effect for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimers {
    pub offer_expiry: Duration,
    pub acc_window: Duration,
    pub ini_window: Duration,
    pub refund_delay: Duration,
    pub funding_broadcast_window: Duration,
}

impl ResolvedTimers {
    /// TTL of the funding hard reservation: the longer signing window.
    #[must_use]
    pub fn signing_window(&self) -> Duration {
        self.acc_window.max(self.ini_window)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Skip soft-earmarked outputs during coin selection.
    pub selection_skips_soft_reserved: bool,
    /// Upper bound on inputs picked by one selection.
    pub max_selected_inputs: usize,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            selection_skips_soft_reserved: true,
            max_selected_inputs: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl SweepConfig {
    #[must_use]
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Depth at which a funding, outcome, or refund transaction counts as confirmed.
    pub min_confirmations: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            min_confirmations: constants::DEFAULT_MIN_CONFIRMATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Timers for `product_id`, falling back to the global timeouts.
    #[must_use]
    pub fn timers_for(&self, product_id: &str) -> ResolvedTimers {
        let t = &self.timeouts;
        let p = self.products.get(product_id).cloned().unwrap_or_default();
        ResolvedTimers {
            offer_expiry: span_secs(
                p.expiry_offer_hours
                    .unwrap_or(t.expiry_offer_default_hours)
                    .saturating_mul(3600),
            ),
            acc_window: span_secs(
                p.expiry_deal_acc_minutes
                    .unwrap_or(t.expiry_deal_acc_minutes)
                    .saturating_mul(60),
            ),
            ini_window: span_secs(
                p.expiry_deal_ini_minutes
                    .unwrap_or(t.expiry_deal_ini_minutes)
                    .saturating_mul(60),
            ),
            refund_delay: span_secs(
                p.refund_delay_days
                    .unwrap_or(t.refund_delay_days)
                    .saturating_mul(86_400),
            ),
            funding_broadcast_window: span_secs(t.funding_broadcast_minutes.saturating_mul(60)),
        }
    }

    /// # Errors
    /// `Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let check = |name: String, secs: u64| -> Result<()> {
            if secs == 0 {
                return Err(DlcError::Configuration(format!("{name} must be positive")));
            }
            if !i64::try_from(secs).is_ok_and(|s| s <= MAX_SPAN_SECS) {
                return Err(DlcError::Configuration(format!(
                    "{name} exceeds {MAX_SPAN_SECS} seconds"
                )));
            }
            Ok(())
        };

        let t = &self.timeouts;
        check(
            "timeouts.expiry_offer_default_hours".into(),
            t.expiry_offer_default_hours.saturating_mul(3600),
        )?;
        check(
            "timeouts.expiry_deal_acc_minutes".into(),
            t.expiry_deal_acc_minutes.saturating_mul(60),
        )?;
        check(
            "timeouts.expiry_deal_ini_minutes".into(),
            t.expiry_deal_ini_minutes.saturating_mul(60),
        )?;
        check(
            "timeouts.refund_delay_days".into(),
            t.refund_delay_days.saturating_mul(86_400),
        )?;
        check(
            "timeouts.funding_broadcast_minutes".into(),
            t.funding_broadcast_minutes.saturating_mul(60),
        )?;

        for (product, p) in &self.products {
            let fields = [
                ("expiry_offer_hours", p.expiry_offer_hours, 3600),
                ("expiry_deal_acc_minutes", p.expiry_deal_acc_minutes, 60),
                ("expiry_deal_ini_minutes", p.expiry_deal_ini_minutes, 60),
                ("refund_delay_days", p.refund_delay_days, 86_400),
            ];
            for (field, value, unit) in fields {
                if let Some(v) = value {
                    check(format!("products.{product}.{field}"), v.saturating_mul(unit))?;
                }
            }
        }

        if self.sweep.interval_secs == 0 {
            return Err(DlcError::Configuration(
                "sweep.interval_secs must be positive".into(),
            ));
        }
        if self.confirmations.min_confirmations == 0 {
            return Err(DlcError::Configuration(
                "confirmations.min_confirmations must be at least 1".into(),
            ));
        }
        if self.reservation.max_selected_inputs == 0 {
            return Err(DlcError::Configuration(
                "reservation.max_selected_inputs must be positive".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(DlcError::Configuration("logging.level is empty".into()));
        }
        Ok(())
    }
}
