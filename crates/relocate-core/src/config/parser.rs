//! TOML parser with helpful error messages

use super::schema::RelocateConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse relocate.toml with detailed error messages
pub fn parse_config(path: &Path) -> Result<RelocateConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse relocate.toml content from string. Validation happens after
/// environment overrides are applied, not here.
pub fn parse_config_str(content: &str) -> Result<RelocateConfig> {
    toml::from_str(content).map_err(|e| enhance_toml_error(e, content))
}

/// Attach the offending line and its neighbours to a TOML error
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.message().to_string();

    let line_num = error.span().map(|span| {
        let end = span.start.min(content.len());
        content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
    });

    match line_num {
        Some(line_num) => {
            let context = get_line_context(content, line_num);
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                context,
                error_msg
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", error_msg),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &RelocateConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}
