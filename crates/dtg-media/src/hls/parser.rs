//! Playlist Parser (spec.md §4.1).
//!
//! Tokenizes an HLS master or media playlist into the typed representation
//! in [`super::model`]. Relative URIs are resolved against the playlist's
//! own base URL (the playlist URL with its last path component removed).

use dtg_common::{Error, Result};

use super::model::{
    KeyReference, MasterPlaylist, MediaPlaylistDoc, MediaRendition, MediaRenditionType, Segment,
    SessionKeyLine, VariantStream,
};

/// The outcome of parsing a playlist whose kind wasn't known in advance.
#[derive(Debug, Clone)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylistDoc),
}

/// Resolve `uri` against `base_url` (the playlist's own URL). Absolute URIs
/// (those with a scheme) pass through unchanged.
pub fn resolve(base_url: &str, uri: &str) -> Result<String> {
    let base = url::Url::parse(base_url)
        .map_err(|e| Error::malformed_playlist(format!("invalid base url {base_url}: {e}")))?;
    let resolved = base
        .join(uri)
        .map_err(|e| Error::malformed_playlist(format!("invalid uri {uri}: {e}")))?;
    Ok(resolved.to_string())
}

/// Parse a playlist whose kind (master vs. media) is determined by which
/// tags it contains. Returns `UnknownPlaylistType` if it contains neither
/// set of tell-tale tags.
pub fn parse(text: &str, base_url: &str) -> Result<Playlist> {
    if !text.trim_start().starts_with("#EXTM3U") {
        return Err(Error::malformed_playlist("missing #EXTM3U header"));
    }

    let is_master = text.contains("#EXT-X-STREAM-INF") || text.contains("#EXT-X-MEDIA:");
    let is_media = text.contains("#EXTINF") || text.contains("#EXT-X-TARGETDURATION");

    match (is_master, is_media) {
        (true, false) => Ok(Playlist::Master(parse_master(text, base_url)?)),
        (false, true) => Ok(Playlist::Media(parse_media(text, base_url)?)),
        (false, false) => Err(Error::UnknownPlaylistType(base_url.to_string())),
        // A playlist that looks like both is parsed as master: a master
        // playlist never carries media segments of its own.
        (true, true) => Ok(Playlist::Master(parse_master(text, base_url)?)),
    }
}

pub fn parse_master(text: &str, base_url: &str) -> Result<MasterPlaylist> {
    let mut playlist = MasterPlaylist::default();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let attrs = parse_attribute_list(rest);
            let uri = lines
                .next()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| {
                    Error::malformed_playlist("#EXT-X-STREAM-INF missing following URI")
                })?;
            let resolved_uri = resolve(base_url, uri)?;

            let bandwidth = attrs
                .get("BANDWIDTH")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            let resolution = attrs.get("RESOLUTION").and_then(|v| {
                let (w, h) = v.split_once('x')?;
                Some((w.parse().ok()?, h.parse().ok()?))
            });
            let codecs = attrs
                .get("CODECS")
                .map(|v| v.split(',').map(|c| c.trim().to_string()).collect())
                .unwrap_or_default();

            playlist.variants.push(VariantStream {
                uri: resolved_uri,
                bandwidth,
                resolution,
                codecs,
                audio_group: attrs.get("AUDIO").cloned(),
                subtitles_group: attrs.get("SUBTITLES").cloned(),
            });
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA:") {
            let attrs = parse_attribute_list(rest);
            let rendition_type = match attrs.get("TYPE").map(String::as_str) {
                Some("AUDIO") => MediaRenditionType::Audio,
                Some("SUBTITLES") => MediaRenditionType::Subtitles,
                Some("CLOSED-CAPTIONS") => MediaRenditionType::ClosedCaptions,
                Some("VIDEO") => MediaRenditionType::Video,
                _ => {
                    return Err(Error::malformed_playlist("#EXT-X-MEDIA missing TYPE"));
                }
            };
            let uri = match attrs.get("URI") {
                Some(u) => Some(resolve(base_url, u)?),
                None => None,
            };

            playlist.media.push(MediaRendition {
                rendition_type,
                group_id: attrs.get("GROUP-ID").cloned().unwrap_or_default(),
                name: attrs.get("NAME").cloned().unwrap_or_default(),
                language: attrs.get("LANGUAGE").cloned(),
                default: attrs.get("DEFAULT").map(|v| v == "YES").unwrap_or(false),
                autoselect: attrs
                    .get("AUTOSELECT")
                    .map(|v| v == "YES")
                    .unwrap_or(false),
                forced: attrs.get("FORCED").map(|v| v == "YES").unwrap_or(false),
                bandwidth: attrs.get("BANDWIDTH").and_then(|v| v.parse().ok()),
                uri,
            });
        } else if line.starts_with("#EXT-X-SESSION-KEY:") {
            playlist.session_keys.push(SessionKeyLine(line.to_string()));
        }
    }

    Ok(playlist)
}

pub fn parse_media(text: &str, base_url: &str) -> Result<MediaPlaylistDoc> {
    let mut doc = MediaPlaylistDoc::default();
    let mut pending_duration: Option<f64> = None;
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        doc.raw_lines.push(line.to_string());

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let duration_str = rest.split(',').next().unwrap_or(rest);
            let duration = duration_str.trim().parse::<f64>().map_err(|_| {
                Error::malformed_playlist(format!("invalid #EXTINF duration: {rest}"))
            })?;
            pending_duration = Some(duration);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            let attrs = parse_attribute_list(rest);
            let method = attrs.get("METHOD").cloned().unwrap_or_default();
            if let Some(uri) = attrs.get("URI") {
                let resolved = resolve(base_url, uri)?;
                doc.keys.push(KeyReference {
                    uri: resolved,
                    method,
                    iv: attrs.get("IV").cloned(),
                    key_format: attrs.get("KEYFORMAT").cloned(),
                });
            }
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MAP:") {
            let attrs = parse_attribute_list(rest);
            if let Some(uri) = attrs.get("URI") {
                doc.map_uri = Some(resolve(base_url, uri)?);
            }
        } else if !line.starts_with('#') {
            let duration = pending_duration.take().unwrap_or(0.0);
            let resolved = resolve(base_url, line)?;
            doc.segments.push(Segment {
                uri: resolved,
                duration_secs: duration,
            });
        }
    }

    Ok(doc)
}

/// Split an HLS attribute list (`KEY=VALUE,KEY="quoted,value",...`) on
/// top-level commas, i.e. commas that are not inside a quoted string.
pub fn parse_attribute_list(s: &str) -> super::model::Attributes {
    let mut attrs = super::model::Attributes::new();
    for pair in split_top_level_commas(s) {
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            attrs.insert(key.to_string(), value.to_string());
        }
    }
    attrs
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cdn.example.com/content/master.m3u8";

    #[test]
    fn test_attribute_tokenizer_handles_quoted_commas() {
        let attrs = parse_attribute_list(r#"BANDWIDTH=1280000,CODECS="avc1.4d401f,mp4a.40.2""#);
        assert_eq!(attrs.get("BANDWIDTH").unwrap(), "1280000");
        assert_eq!(attrs.get("CODECS").unwrap(), "avc1.4d401f,mp4a.40.2");
    }

    #[test]
    fn test_parse_master_variants_and_media() {
        let text = r#"#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID="aud",NAME="English",LANGUAGE="en",DEFAULT=YES,AUTOSELECT=YES,URI="audio/en.m3u8"
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=1280x720,CODECS="avc1.4d401f,mp4a.40.2",AUDIO="aud"
video/720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=300000,RESOLUTION=640x360,CODECS="avc1.42001e,mp4a.40.2",AUDIO="aud"
video/360p.m3u8
"#;
        let parsed = parse_master(text, BASE).unwrap();
        assert_eq!(parsed.variants.len(), 2);
        assert_eq!(parsed.variants[0].bandwidth, 800000);
        assert_eq!(parsed.variants[0].resolution, Some((1280, 720)));
        assert_eq!(parsed.variants[0].audio_group.as_deref(), Some("aud"));
        assert!(parsed.variants[0].uri.ends_with("video/720p.m3u8"));

        assert_eq!(parsed.media.len(), 1);
        assert_eq!(parsed.media[0].rendition_type, MediaRenditionType::Audio);
        assert_eq!(parsed.media[0].language.as_deref(), Some("en"));
        assert!(parsed.media[0].default);
    }

    #[test]
    fn test_parse_media_segments_and_duration() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:5.994,\nseg0.ts\n#EXTINF:5.994,\nseg1.ts\n#EXT-X-ENDLIST\n";
        let doc = parse_media(text, "https://cdn.example.com/video/720p.m3u8").unwrap();
        assert_eq!(doc.segments.len(), 2);
        assert!((doc.segments[0].duration_secs - 5.994).abs() < 1e-6);
        assert!(doc.segments[0].uri.ends_with("seg0.ts"));
    }

    #[test]
    fn test_parse_media_with_map_and_keys() {
        let text = r#"#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-KEY:METHOD=AES-128,URI="key1",IV=0x00000000000000000000000000000001
#EXT-X-MAP:URI="init.mp4"
#EXTINF:6.0,
seg0.m4s
#EXT-X-KEY:METHOD=AES-128,URI="key2"
#EXTINF:6.0,
seg1.m4s
"#;
        let doc = parse_media(text, "https://cdn.example.com/video/720p.m3u8").unwrap();
        assert_eq!(doc.keys.len(), 2);
        assert!(doc.keys[0].is_fetchable_aes128());
        assert!(doc.map_uri.as_ref().unwrap().ends_with("init.mp4"));
        assert_eq!(doc.segments.len(), 2);
    }

    #[test]
    fn test_fairplay_key_not_fetchable() {
        let doc = parse_media(
            "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://x\",KEYFORMAT=\"com.apple.streamingkeydelivery\"\n#EXTINF:6.0,\nseg0.ts\n",
            BASE,
        )
        .unwrap();
        assert_eq!(doc.keys.len(), 1);
        assert!(!doc.keys[0].is_fetchable_aes128());
    }

    #[test]
    fn test_unknown_playlist_type_errors() {
        let err = parse("#EXTM3U\n#EXT-X-VERSION:3\n", BASE).unwrap_err();
        assert!(matches!(err, Error::UnknownPlaylistType(_)));
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let err = parse("not a playlist", BASE).unwrap_err();
        assert!(matches!(err, Error::MalformedPlaylist(_)));
    }
}
