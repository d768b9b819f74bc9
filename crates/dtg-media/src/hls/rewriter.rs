//! Playlist Rewriter (spec.md §4.4).
//!
//! Produces the on-disk master and media playlists whose URIs resolve to
//! the local filesystem layout the planner populates. Path derivation here
//! must agree byte-for-byte with the planner (`dtg_common::path_key`),
//! since both independently compute `<type>/<md5>.<ext>` from the same
//! source URL.

use std::fmt::Write as _;

use dtg_common::path_key::relative_destination;
use dtg_common::TaskType;

use super::model::{MediaPlaylistDoc, MediaRenditionType};

/// Input to the master-playlist rewrite: the chosen video stream plus the
/// selected audio/subtitle renditions, already filtered by the selector.
pub struct SelectedMaster<'a> {
    pub video_uri: &'a str,
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub codecs: &'a [String],
    pub audio_group: Option<&'a str>,
    pub subtitles_group: Option<&'a str>,
    pub audio_renditions: Vec<SelectedMedia<'a>>,
    pub text_renditions: Vec<SelectedMedia<'a>>,
    pub session_key_lines: &'a [String],
}

pub struct SelectedMedia<'a> {
    pub rendition_type: MediaRenditionType,
    pub group_id: &'a str,
    pub name: &'a str,
    pub language: Option<&'a str>,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub bandwidth: Option<u64>,
    /// Absolute source URL of this rendition's own media playlist (used to
    /// derive its on-disk destination, not the segments within it).
    pub source_url: &'a str,
}

/// Render the rewritten master playlist (spec.md §4.4).
pub fn rewrite_master(selected: &SelectedMaster<'_>) -> String {
    let mut out = String::new();
    writeln!(out, "#EXTM3U").unwrap();

    for line in selected.session_key_lines {
        writeln!(out, "{line}").unwrap();
    }

    write!(out, "#EXT-X-STREAM-INF:BANDWIDTH={}", selected.bandwidth).unwrap();
    if let Some((w, h)) = selected.resolution {
        write!(out, ",RESOLUTION={w}x{h}").unwrap();
    }
    if let Some(group) = selected.audio_group {
        write!(out, ",AUDIO=\"{group}\"").unwrap();
    }
    if let Some(group) = selected.subtitles_group {
        write!(out, ",SUBTITLES=\"{group}\"").unwrap();
    }
    if !selected.codecs.is_empty() {
        write!(out, ",CODECS=\"{}\"", selected.codecs.join(",")).unwrap();
    }
    writeln!(out).unwrap();
    writeln!(
        out,
        "{}",
        relative_destination(TaskType::Video, selected.video_uri)
    )
    .unwrap();

    for media in selected
        .audio_renditions
        .iter()
        .chain(selected.text_renditions.iter())
    {
        write_media_line(&mut out, media);
    }

    out
}

fn write_media_line(out: &mut String, media: &SelectedMedia<'_>) {
    let type_str = match media.rendition_type {
        MediaRenditionType::Audio => "AUDIO",
        MediaRenditionType::Subtitles => "SUBTITLES",
        MediaRenditionType::ClosedCaptions => "CLOSED-CAPTIONS",
        MediaRenditionType::Video => "VIDEO",
    };
    let task_type = match media.rendition_type {
        MediaRenditionType::Audio => TaskType::Audio,
        _ => TaskType::Text,
    };

    write!(
        out,
        "#EXT-X-MEDIA:TYPE={},GROUP-ID=\"{}\",NAME=\"{}\"",
        type_str, media.group_id, media.name
    )
    .unwrap();
    if let Some(lang) = media.language {
        write!(out, ",LANGUAGE=\"{lang}\"").unwrap();
    }
    write!(
        out,
        ",DEFAULT={},AUTOSELECT={}",
        if media.default { "YES" } else { "NO" },
        if media.autoselect { "YES" } else { "NO" },
    )
    .unwrap();
    if media.rendition_type == MediaRenditionType::Subtitles {
        write!(
            out,
            ",FORCED={}",
            if media.forced { "YES" } else { "NO" }
        )
        .unwrap();
    }
    if let Some(bw) = media.bandwidth {
        if bw > 0 {
            write!(out, ",BANDWIDTH={bw}").unwrap();
        }
    }
    writeln!(
        out,
        ",URI=\"{}\"",
        relative_destination(task_type, media.source_url)
    )
    .unwrap();
}

/// Render a rewritten media playlist (spec.md §4.4): a line-by-line
/// transform of the parsed document. Segment and map URIs become
/// same-directory `<md5>.<ext>` references; AES-128 key URIs are rewritten
/// to `../key/<md5>.<ext>`; everything else is preserved verbatim (the
/// parser already dropped blank lines when it built `raw_lines`).
pub fn rewrite_media(doc: &MediaPlaylistDoc) -> String {
    let mut out = String::new();
    let mut segment_idx = 0;

    for line in &doc.raw_lines {
        if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            let attrs = super::parser::parse_attribute_list(rest);
            let is_fetchable = attrs
                .get("METHOD")
                .map(|m| m.eq_ignore_ascii_case("AES-128"))
                .unwrap_or(false)
                && !matches!(
                    attrs.get("KEYFORMAT").map(String::as_str),
                    Some(fmt) if fmt.eq_ignore_ascii_case("com.apple.streamingkeydelivery")
                );
            if is_fetchable {
                if let Some(uri) = attrs.get("URI") {
                    let rel = relative_destination(TaskType::Key, &resolve_key_uri(doc, uri));
                    // Key destinations are under <root>/key/, media playlists
                    // live one directory down (e.g. <root>/audio/), so the
                    // reference climbs back up.
                    let rewritten = line.replacen(
                        &format!("URI=\"{uri}\""),
                        &format!("URI=\"../{rel}\""),
                        1,
                    );
                    writeln!(out, "{rewritten}").unwrap();
                    continue;
                }
            }
            writeln!(out, "{line}").unwrap();
        } else if line.starts_with("#EXT-X-MAP:") {
            if let Some(map_uri) = &doc.map_uri {
                let rel = relative_destination(TaskType::Video, map_uri);
                let filename = rel.rsplit('/').next().unwrap_or(&rel);
                writeln!(out, "#EXT-X-MAP:URI=\"{filename}\"").unwrap();
            } else {
                writeln!(out, "{line}").unwrap();
            }
        } else if !line.starts_with('#') {
            if let Some(segment) = doc.segments.get(segment_idx) {
                let task_type = TaskType::Video;
                let rel = relative_destination(task_type, &segment.uri);
                let filename = rel.rsplit('/').next().unwrap_or(&rel);
                writeln!(out, "{filename}").unwrap();
                segment_idx += 1;
            } else {
                writeln!(out, "{line}").unwrap();
            }
        } else {
            writeln!(out, "{line}").unwrap();
        }
    }

    out
}

/// `rewrite_media` only has the already-resolved absolute key URI on hand
/// through `doc.keys`, not the raw attribute value it's rewriting (which is
/// already absolute by construction from the parser, so this is the
/// identity in practice); kept as a seam so a future caller supplying a
/// pre-parsed doc from elsewhere still resolves correctly.
fn resolve_key_uri(doc: &MediaPlaylistDoc, raw_uri: &str) -> String {
    doc.keys
        .iter()
        .find(|k| k.uri.ends_with(raw_uri) || k.uri == raw_uri)
        .map(|k| k.uri.clone())
        .unwrap_or_else(|| raw_uri.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::parser::parse_media;

    #[test]
    fn test_rewrite_master_places_audio_and_subtitle_lines() {
        let selected = SelectedMaster {
            video_uri: "https://cdn/video/720p.m3u8",
            bandwidth: 800_000,
            resolution: Some((1280, 720)),
            codecs: &["avc1.4d401f".to_string(), "mp4a.40.2".to_string()],
            audio_group: Some("aud"),
            subtitles_group: None,
            audio_renditions: vec![SelectedMedia {
                rendition_type: MediaRenditionType::Audio,
                group_id: "aud",
                name: "English",
                language: Some("en"),
                default: true,
                autoselect: true,
                forced: false,
                bandwidth: None,
                source_url: "https://cdn/audio/en.m3u8",
            }],
            text_renditions: vec![],
            session_key_lines: &[],
        };

        let rendered = rewrite_master(&selected);
        assert!(rendered.starts_with("#EXTM3U\n"));
        assert!(rendered.contains("BANDWIDTH=800000"));
        assert!(rendered.contains("RESOLUTION=1280x720"));
        assert!(rendered.contains("AUDIO=\"aud\""));
        assert!(rendered.contains("#EXT-X-MEDIA:TYPE=AUDIO"));
        assert!(rendered.contains("video/"));
        assert!(rendered.contains("audio/"));
    }

    #[test]
    fn test_rewrite_media_rewrites_segments_map_and_keys() {
        let text = r#"#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-KEY:METHOD=AES-128,URI="https://cdn/key1"
#EXT-X-MAP:URI="https://cdn/video/init.mp4"
#EXTINF:6.0,
seg0.m4s
#EXTINF:6.0,
seg1.m4s
"#;
        let doc = parse_media(text, "https://cdn/video/720p.m3u8").unwrap();
        let rendered = rewrite_media(&doc);

        assert!(rendered.contains("../key/"));
        assert!(rendered.contains("#EXT-X-MAP:URI=\""));
        assert!(!rendered.contains("seg0.m4s"));
        assert!(!rendered.contains("https://cdn"));
    }

    #[test]
    fn test_rewrite_media_preserves_unrelated_tags_verbatim() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:6.0,\nseg0.ts\n#EXT-X-ENDLIST\n";
        let doc = parse_media(text, "https://cdn/video/x.m3u8").unwrap();
        let rendered = rewrite_media(&doc);
        assert!(rendered.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(rendered.contains("#EXT-X-ENDLIST"));
    }
}
