//! Newline-delimited JSON input events

use crate::feed::PriceTick;
use crate::signal::Signal;
use serde::Deserialize;
use std::path::PathBuf;

/// One line of `run` input, tagged by `type`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Price refresh for one symbol
    Price(PriceTick),
    /// Trade signal to size
    Signal(Signal),
    /// Reload risk limits, from the startup config when no path is given
    Reload {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// Parse one input line; blank lines and `#` comments yield None
pub fn parse_line(line: &str) -> anyhow::Result<Option<InputEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}
