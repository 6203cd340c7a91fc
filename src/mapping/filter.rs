use regex::Regex;

use crate::core::config::{compile_pattern, MappingConfig};
use crate::core::error::ConfigError;

/// Marker in a prefix that selects the HD filter.
pub const HD_MARKER: &str = "__HD";

/// Which filename filter applies to a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVariant {
    Standard,
    Hd,
}

impl FilterVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterVariant::Standard => "standard",
            FilterVariant::Hd => "hd",
        }
    }
}

/// Pick the filter for `prefix` and strip the HD marker (first occurrence).
pub fn select_filter(prefix: &str) -> (FilterVariant, String) {
    if prefix.contains(HD_MARKER) {
        (FilterVariant::Hd, prefix.replacen(HD_MARKER, "", 1))
    } else {
        (FilterVariant::Standard, prefix.to_string())
    }
}

/// Base filename of an object key: the last segment, ignoring trailing slashes.
pub fn base_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() {
        return if key.is_empty() { "." } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

// ---------------------------------------------------------------------------
// FilterSet
// ---------------------------------------------------------------------------

/// Both compiled filename filters. Built once at startup.
#[derive(Debug, Clone)]
pub struct FilterSet {
    standard: Regex,
    hd: Regex,
}

impl FilterSet {
    pub fn new(standard: &str, hd: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            standard: compile_pattern("mapping.regex_filter", standard)?,
            hd: compile_pattern("mapping.regex_hd_filter", hd)?,
        })
    }

    pub fn from_config(config: &MappingConfig) -> Result<Self, ConfigError> {
        Self::new(&config.regex_filter, &config.regex_hd_filter)
    }

    pub fn pattern(&self, variant: FilterVariant) -> &Regex {
        match variant {
            FilterVariant::Standard => &self.standard,
            FilterVariant::Hd => &self.hd,
        }
    }

    /// Whether the object's base filename matches the selected filter.
    pub fn matches(&self, variant: FilterVariant, object_name: &str) -> bool {
        self.pattern(variant).is_match(base_name(object_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD: &str = r"(240|360|424|480|720|1080)p(\.mp4|[a-z0-9_-]{37}\.(vtt|srt))$";
    const HD: &str = r"((720|1080)p\.mp4)|(\.(vtt|srt))$";

    #[test]
    fn test_select_standard() {
        let (variant, prefix) = select_filter("videos/asset");
        assert_eq!(variant, FilterVariant::Standard);
        assert_eq!(prefix, "videos/asset");
    }

    #[test]
    fn test_select_hd_strips_marker_once() {
        let (variant, prefix) = select_filter("videos/asset__HD");
        assert_eq!(variant, FilterVariant::Hd);
        assert_eq!(prefix, "videos/asset");

        let (variant, prefix) = select_filter("a__HD/b__HD");
        assert_eq!(variant, FilterVariant::Hd);
        assert_eq!(prefix, "a/b__HD");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("videos/asset/720p.mp4"), "720p.mp4");
        assert_eq!(base_name("720p.mp4"), "720p.mp4");
        assert_eq!(base_name("videos/dir/"), "dir");
        assert_eq!(base_name(""), ".");
        assert_eq!(base_name("///"), "/");
    }

    #[test]
    fn test_filter_applies_to_base_name_only() {
        let filters = FilterSet::new(r"^asset", "").unwrap();
        assert!(filters.matches(FilterVariant::Standard, "videos/asset_720p.mp4"));
        // The key matches as a whole but the filename does not.
        assert!(!filters.matches(FilterVariant::Standard, "asset/720p.mp4"));
    }

    #[test]
    fn test_filter_is_case_sensitive() {
        let filters = FilterSet::new(r"720p\.mp4$", "").unwrap();
        assert!(filters.matches(FilterVariant::Standard, "a/720p.mp4"));
        assert!(!filters.matches(FilterVariant::Standard, "a/720P.MP4"));
    }

    #[test]
    fn test_standard_and_hd_patterns() {
        let filters = FilterSet::new(STANDARD, HD).unwrap();
        assert!(filters.matches(FilterVariant::Standard, "v/asset_480p.mp4"));
        assert!(!filters.matches(FilterVariant::Hd, "v/asset_480p.mp4"));
        assert!(filters.matches(FilterVariant::Hd, "v/asset_1080p.mp4"));
        assert!(filters.matches(FilterVariant::Hd, "subtitles/asset_en.vtt"));
        assert!(!filters.matches(FilterVariant::Standard, "v/asset.jpg"));
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let filters = FilterSet::new("", "").unwrap();
        assert!(filters.matches(FilterVariant::Standard, "anything/at/all.bin"));
        assert!(filters.matches(FilterVariant::Hd, "x"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(FilterSet::new("[", "").is_err());
        assert!(FilterSet::new("", "(?P<").is_err());
    }
}
