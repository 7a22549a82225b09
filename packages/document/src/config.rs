//! Per-document configuration

use serde::{Deserialize, Serialize};

/// Settings fixed at document construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Element wrapping every block (`section` for slide decks)
    pub wrapping_tag: String,

    /// Deepest heading level indexed by the table of contents
    pub toc_depth: u8,

    /// Title used when an update does not carry one
    pub default_toc_title: String,

    pub scroll: ScrollConfig,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            wrapping_tag: "div".to_string(),
            toc_depth: 3,
            default_toc_title: "Contents".to_string(),
            scroll: ScrollConfig::default(),
        }
    }
}

impl DocumentConfig {
    pub fn slides() -> Self {
        Self {
            wrapping_tag: "section".to_string(),
            ..Self::default()
        }
    }
}

/// Scroll anchoring and highlight thresholds, as fractions of the viewport
/// height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub anchor_fraction: f64,
    pub highlight_down_fraction: f64,
    pub highlight_up_fraction: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            anchor_fraction: 0.2,
            highlight_down_fraction: 0.8,
            highlight_up_fraction: 0.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_from_json() {
        let config: DocumentConfig =
            serde_json::from_str(r#"{"wrapping_tag": "section", "scroll": {"anchor_fraction": 0.5}}"#)
                .unwrap();
        assert_eq!(config.wrapping_tag, "section");
        assert_eq!(config.toc_depth, 3);
        assert_eq!(config.scroll.anchor_fraction, 0.5);
        assert_eq!(config.scroll.highlight_down_fraction, 0.8);
    }
}
