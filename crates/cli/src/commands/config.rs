use claimflow_core::config::{AppConfig, LoadOptions, ResolvedSetting};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let resolved = match AppConfig::load_with_sources(LoadOptions::default()) {
        Ok((_, resolved)) => resolved,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        }
    };

    match serde_json::to_value(entries(resolved)) {
        Ok(data) => CommandResult::success_with_data(
            "config",
            "effective config (source precedence: override > env > file > default)",
            Some(data),
        ),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 1),
    }
}

fn entries(resolved: Vec<ResolvedSetting>) -> Vec<ConfigEntry> {
    resolved
        .into_iter()
        .map(|setting| ConfigEntry {
            key: setting.key,
            value: setting.value,
            source: setting.source.to_string(),
        })
        .collect()
}
