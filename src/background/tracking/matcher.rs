use regex::Regex;
use tracing::{debug, warn};

use crate::background::storage::entities::Blackhole;

/// Checks a URL against the configured patterns. A pattern that doesn't compile is treated as
/// non-matching and the rest are still evaluated.
pub fn is_tracked(url: Option<&str>, patterns: &[Blackhole]) -> bool {
    PatternSet::compile(patterns).is_tracked(url)
}

/// Compiled form of the configured patterns, rebuilt whenever the configuration is reloaded so
/// tab changes don't recompile every expression.
#[derive(Debug, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn compile(blackholes: &[Blackhole]) -> Self {
        let patterns = blackholes
            .iter()
            .filter(|blackhole| {
                let blank = blackhole.url.trim().is_empty();
                if blank {
                    debug!("Skipping blank pattern");
                }
                !blank
            })
            .filter_map(|blackhole| {
                Regex::new(&blackhole.url)
                    .inspect_err(|e| warn!("Error in pattern {}: {e}", blackhole.url))
                    .ok()
            })
            .collect();
        Self { patterns }
    }

    pub fn is_tracked(&self, url: Option<&str>) -> bool {
        match url {
            Some(url) if !url.is_empty() => self.patterns.iter().any(|regex| regex.is_match(url)),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
