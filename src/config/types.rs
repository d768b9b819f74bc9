use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::selector::LanguagePolicy;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub downloads: DownloadsConfig,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub selection: SelectionDefaults,
}

/// Playback server bind settings (spec.md §6 "loopback HTTP file server").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// 0 lets the OS assign an ephemeral port; the process then holds it
    /// stable for its lifetime (spec.md §6 "port chosen once at startup").
    #[serde(default)]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

/// Where items and the task store live on disk (spec.md §6 filesystem
/// layout, §4.5 "survives process restart").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadsConfig {
    #[serde(default = "default_items_root")]
    pub items_root: PathBuf,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_items_root() -> PathBuf {
    PathBuf::from("~/.local/share/hls-dtg/items")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("~/.local/share/hls-dtg/state.db")
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            items_root: default_items_root(),
            db_path: default_db_path(),
        }
    }
}

/// Download worker tuning (spec.md §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    /// Bounded-concurrency fetch pool size, held within the 4-8 range
    /// spec.md §4.6 calls for.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-request timeout while loading master/media playlists
    /// (spec.md §5 "10-second per-request timeout").
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    6
}

fn default_retry_budget() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_budget: default_retry_budget(),
            request_timeout_secs: default_request_timeout_secs(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
        }
    }
}

/// Default rendition-selection policy applied to every new item, unless a
/// future caller-supplied override replaces it (spec.md §4.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionDefaults {
    #[serde(default)]
    pub allow_inefficient_codecs: bool,

    /// Used when an audio rendition declares no bandwidth of its own
    /// (spec.md §4.3).
    #[serde(default = "default_audio_bitrate_fallback")]
    pub audio_bitrate_fallback: u64,

    /// An undeclared-language rendition is always admitted regardless of
    /// this policy (spec.md §11 Open Question #2).
    #[serde(default = "default_language_policy")]
    pub audio_languages: LanguagePolicy,

    #[serde(default = "default_language_policy")]
    pub text_languages: LanguagePolicy,
}

fn default_audio_bitrate_fallback() -> u64 {
    128_000
}

fn default_language_policy() -> LanguagePolicy {
    LanguagePolicy::All
}

impl Default for SelectionDefaults {
    fn default() -> Self {
        Self {
            allow_inefficient_codecs: false,
            audio_bitrate_fallback: default_audio_bitrate_fallback(),
            audio_languages: default_language_policy(),
            text_languages: default_language_policy(),
        }
    }
}
