use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Website package tiers offered to a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Package {
    Starter,
    Business,
    Premium,
    Enterprise,
    Custom,
}

#[derive(Debug, Error, PartialEq)]
pub enum PackageError {
    #[error("Unknown package: {0}")]
    Unknown(String),

    #[error("Custom package requires an amount")]
    MissingAmount,

    #[error("Invalid amount {0}: must be greater than zero")]
    InvalidAmount(f64),
}

impl Package {
    pub const ALL: [Package; 5] = [
        Package::Starter,
        Package::Business,
        Package::Premium,
        Package::Enterprise,
        Package::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Business => "Business",
            Self::Premium => "Premium",
            Self::Enterprise => "Enterprise",
            Self::Custom => "Custom",
        }
    }

    /// List price in dollars. `Custom` has none.
    pub fn list_price(&self) -> Option<f64> {
        match self {
            Self::Starter => Some(150.0),
            Self::Business => Some(300.0),
            Self::Premium => Some(500.0),
            Self::Enterprise => Some(1000.0),
            Self::Custom => None,
        }
    }

    /// Amount to invoice: an explicit override wins, otherwise the list price.
    pub fn resolve_amount(&self, override_amount: Option<f64>) -> Result<f64, PackageError> {
        let amount = match (override_amount, self.list_price()) {
            (Some(amount), _) => amount,
            (None, Some(price)) => price,
            (None, None) => return Err(PackageError::MissingAmount),
        };
        if !amount.is_finite() || amount <= 0.0 {
            return Err(PackageError::InvalidAmount(amount));
        }
        Ok(amount)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Package {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Package::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PackageError::Unknown(s.to_string()))
    }
}
