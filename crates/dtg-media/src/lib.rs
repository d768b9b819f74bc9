//! dtg-media: HLS playlist parsing, rendition data model, and playlist
//! rewriting for the offline download manager.
//!
//! # Modules
//!
//! - `hls::parser` - parses master and media playlist text into the `model`
//!   types, including the quoted-comma-aware attribute list tokenizer.
//! - `hls::model` - parsed representation of variants, renditions, segments,
//!   key references, and preserved session-key lines.
//! - `hls::rewriter` - renders a rewritten master playlist (from a
//!   selector's choice of video/audio/text streams) and rewritten media
//!   playlists whose segment, map, and AES-128 key URIs point at the local
//!   download layout.

pub mod hls;

pub use hls::{
    parse, parse_master, parse_media, rewrite_master, rewrite_media, KeyReference,
    MasterPlaylist, MediaPlaylistDoc, MediaRendition, MediaRenditionType, Playlist,
    SelectedMaster, SelectedMedia, Segment, SessionKeyLine, VariantStream,
};
