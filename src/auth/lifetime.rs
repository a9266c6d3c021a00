//! Token lifetimes
//!
//! Lifetimes are configured in the compact `<amount><unit>` form (`15m`,
//! `7d`) and reported to clients both symbolically and in milliseconds.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A token lifetime with its original symbolic form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifetime {
    /// Symbolic form as configured, e.g. "15m"
    pub label: String,
    /// Same value in milliseconds
    pub millis: u64,
}

impl Lifetime {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    pub fn as_secs(&self) -> u64 {
        self.millis / 1000
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for Lifetime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit = s
            .chars()
            .last()
            .ok_or_else(|| "lifetime must not be empty".to_string())?;
        let amount: u64 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| format!("invalid lifetime '{s}': expected e.g. 15m, 12h, 7d"))?;

        let unit_ms = match unit {
            's' => 1_000,
            'm' => 60 * 1_000,
            'h' => 60 * 60 * 1_000,
            'd' => 24 * 60 * 60 * 1_000,
            _ => return Err(format!("invalid lifetime unit in '{s}': use s, m, h or d")),
        };

        if amount == 0 {
            return Err(format!("lifetime '{s}' must be greater than zero"));
        }
        let millis = amount
            .checked_mul(unit_ms)
            .ok_or_else(|| format!("lifetime '{s}' is too large"))?;

        Ok(Self {
            label: s.to_string(),
            millis,
        })
    }
}

/// The three lifetimes a session deals in
#[derive(Debug, Clone)]
pub struct LifetimePolicy {
    pub access: Lifetime,
    pub refresh_short: Lifetime,
    pub refresh_long: Lifetime,
}

impl LifetimePolicy {
    /// Refresh lifetime tier for the "remember me" choice
    pub fn refresh_for(&self, remember_me: bool) -> &Lifetime {
        if remember_me {
            &self.refresh_long
        } else {
            &self.refresh_short
        }
    }
}

impl Default for LifetimePolicy {
    fn default() -> Self {
        Self {
            access: Lifetime {
                label: "15m".into(),
                millis: 15 * 60 * 1_000,
            },
            refresh_short: Lifetime {
                label: "7d".into(),
                millis: 7 * 24 * 60 * 60 * 1_000,
            },
            refresh_long: Lifetime {
                label: "30d".into(),
                millis: 30 * 24 * 60 * 60 * 1_000,
            },
        }
    }
}
