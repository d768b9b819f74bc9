//! Parsed HLS playlist representation (spec.md §3, §4.1).

use std::collections::BTreeMap;

/// One line-level HLS attribute list, e.g. the body of an
/// `#EXT-X-STREAM-INF:BANDWIDTH=1,CODECS="a,b"` tag. Preserves insertion
/// order loosely via `BTreeMap` keyed by attribute name (attribute names in
/// HLS tags are unique per tag, so ordering within the map doesn't matter
/// for correctness, only lookup).
pub type Attributes = BTreeMap<String, String>;

/// One media segment: a URI plus its `#EXTINF` duration in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub uri: String,
    pub duration_secs: f64,
}

/// An `#EXT-X-KEY` tag captured from a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyReference {
    /// Absolute URI, resolved against the playlist's base URL.
    pub uri: String,
    pub method: String,
    pub iv: Option<String>,
    pub key_format: Option<String>,
}

impl KeyReference {
    /// AES-128 with the default (implicit, i.e. absent or "identity") key
    /// format is the only method the planner enumerates as a fetch task;
    /// FairPlay (`com.apple.streamingkeydelivery`) keys are preserved
    /// verbatim but never fetched (spec.md §3).
    pub fn is_fetchable_aes128(&self) -> bool {
        self.method.eq_ignore_ascii_case("AES-128")
            && !matches!(
                self.key_format.as_deref(),
                Some(fmt) if fmt.eq_ignore_ascii_case("com.apple.streamingkeydelivery")
            )
    }
}

/// A verbatim `#EXT-X-SESSION-KEY` line preserved for FairPlay reinjection.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionKeyLine(pub String);

/// One `#EXT-X-STREAM-INF` variant entry in a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantStream {
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub codecs: Vec<String>,
    pub audio_group: Option<String>,
    pub subtitles_group: Option<String>,
}

/// Rendition type for an `#EXT-X-MEDIA` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRenditionType {
    Audio,
    Subtitles,
    ClosedCaptions,
    Video,
}

/// One `#EXT-X-MEDIA` entry in a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRendition {
    pub rendition_type: MediaRenditionType,
    pub group_id: String,
    pub name: String,
    pub language: Option<String>,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub bandwidth: Option<u64>,
    pub uri: Option<String>,
}

/// A parsed master playlist: the variant list and alternate-media list,
/// plus any FairPlay session-key lines preserved for reinjection
/// (spec.md §4.1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterPlaylist {
    pub variants: Vec<VariantStream>,
    pub media: Vec<MediaRendition>,
    pub session_keys: Vec<SessionKeyLine>,
}

/// A parsed media playlist: ordered segments, key tags, and an optional
/// initialization map URI (spec.md §4.1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlaylistDoc {
    pub segments: Vec<Segment>,
    pub keys: Vec<KeyReference>,
    pub map_uri: Option<String>,
    /// The original lines, preserved verbatim except where the rewriter
    /// substitutes URIs (spec.md §4.4): every non-blank line of the source
    /// text, in order.
    pub raw_lines: Vec<String>,
}
