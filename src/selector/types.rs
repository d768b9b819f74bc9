//! Selection inputs (spec.md §3 "Selection Options", §4.2 device capability
//! hints).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Mp4a,
    Ac3,
    Eac3,
}

/// One of the two independent per-track-type language policies (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguagePolicy {
    All,
    None,
    Only(Vec<String>),
}

impl LanguagePolicy {
    /// Whether a stream declaring `language` (already canonicalized) passes
    /// this policy. A stream with no declared language always passes
    /// (spec.md §4.2, §11 Open Question #2 — kept as specified).
    pub fn admits(&self, language: Option<&str>) -> bool {
        match self {
            LanguagePolicy::All => true,
            LanguagePolicy::None => language.is_none(),
            LanguagePolicy::Only(tags) => match language {
                None => true,
                Some(lang) => tags.iter().any(|t| canonicalize_language(t) == lang),
            },
        }
    }
}

/// Lowercase a BCP-47 tag for comparison. Full BCP-47 canonicalization
/// (region subtag casing, script subtag titlecasing) is unnecessary here
/// since comparison is symmetric on both sides.
pub fn canonicalize_language(tag: &str) -> String {
    tag.to_lowercase()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionOptions {
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    /// Per-codec minimum bitrate floor in bits/sec; absent codecs fall back
    /// to the defaults in spec.md §4.2 step 4.
    #[serde(default)]
    pub min_bitrate: std::collections::HashMap<VideoCodec, u64>,
    /// Ordered, most-preferred first.
    #[serde(default)]
    pub preferred_video_codecs: Vec<VideoCodec>,
    #[serde(default)]
    pub preferred_audio_codecs: Vec<AudioCodec>,
    #[serde(default)]
    pub allow_inefficient_codecs: bool,
    #[serde(default = "default_language_policy")]
    pub audio_languages: LanguagePolicy,
    #[serde(default = "default_language_policy")]
    pub text_languages: LanguagePolicy,
}

fn default_language_policy() -> LanguagePolicy {
    LanguagePolicy::All
}

/// Device capability hints the selector does not itself determine
/// (spec.md §4.2).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub hardware_hevc: bool,
    pub software_hevc_permitted: bool,
    pub ac3: bool,
    pub eac3: bool,
}

impl DeviceCapabilities {
    pub fn hevc_allowed(&self, allow_inefficient_codecs: bool) -> bool {
        self.hardware_hevc || (self.software_hevc_permitted && allow_inefficient_codecs)
    }
}

pub const DEFAULT_H264_BITRATE_FLOOR: u64 = 180_000;
pub const DEFAULT_HEVC_BITRATE_FLOOR: u64 = 120_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_policy_all_admits_everything() {
        assert!(LanguagePolicy::All.admits(Some("en")));
        assert!(LanguagePolicy::All.admits(None));
    }

    #[test]
    fn test_language_policy_only_admits_undeclared_unconditionally() {
        let policy = LanguagePolicy::Only(vec!["en".to_string()]);
        assert!(policy.admits(None));
        assert!(policy.admits(Some("en")));
        assert!(!policy.admits(Some("fr")));
    }

    #[test]
    fn test_language_policy_only_canonicalizes() {
        let policy = LanguagePolicy::Only(vec!["EN-US".to_string()]);
        assert!(policy.admits(Some("en-us")));
    }

    #[test]
    fn test_hevc_allowed() {
        let hw = DeviceCapabilities {
            hardware_hevc: true,
            ..Default::default()
        };
        assert!(hw.hevc_allowed(false));

        let sw = DeviceCapabilities {
            software_hevc_permitted: true,
            ..Default::default()
        };
        assert!(!sw.hevc_allowed(false));
        assert!(sw.hevc_allowed(true));
    }
}
