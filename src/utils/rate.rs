use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;

/// Currency accrued per minute of tracked time. Always finite and at least 0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Rate(f64);

impl Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/min", self.0)
    }
}

impl Rate {
    pub fn new_opt(value: f64) -> Option<Rate> {
        if value.is_finite() && value >= 0. {
            Some(Rate(value))
        } else {
            None
        }
    }
}

impl FromStr for Rate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept "$0.02" as well, people tend to type the currency sign
        let s = s.trim().trim_start_matches('$');
        let v = s.parse::<f64>()?;
        Rate::new_opt(v).ok_or_else(|| anyhow!("Can't use {s} as a rate, it must be a non-negative number"))
    }
}

impl Deref for Rate {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
