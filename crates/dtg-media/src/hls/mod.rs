//! HLS playlist parsing and rewriting.
//!
//! `parser` turns raw master/media playlist text into the `model` types;
//! `rewriter` turns a parsed document (plus, for master playlists, a
//! selector decision) back into playlist text pointing at local files.

pub mod model;
pub mod parser;
pub mod rewriter;

pub use model::{
    KeyReference, MasterPlaylist, MediaPlaylistDoc, MediaRendition, MediaRenditionType, Segment,
    SessionKeyLine, VariantStream,
};
pub use parser::{parse, parse_master, parse_media, Playlist};
pub use rewriter::{rewrite_master, rewrite_media, SelectedMaster, SelectedMedia};
