//! Rendition Selector (spec.md §4.2).
//!
//! Chooses one video variant and the selected audio/text renditions from a
//! parsed master playlist, honoring caller selection options and device
//! capability hints. Pure function over its inputs; no I/O.

mod types;

pub use types::{
    canonicalize_language, AudioCodec, DeviceCapabilities, LanguagePolicy, SelectionOptions,
    VideoCodec, DEFAULT_HEVC_BITRATE_FLOOR, DEFAULT_H264_BITRATE_FLOOR,
};

use dtg_common::{Error, Result};
use dtg_media::hls::{MasterPlaylist, MediaRendition, MediaRenditionType, VariantStream};

/// The outcome of selection: one video variant plus the audio/text
/// renditions to download alongside it.
pub struct Selection<'a> {
    pub video: &'a VariantStream,
    pub audio: Vec<&'a MediaRendition>,
    pub text: Vec<&'a MediaRendition>,
}

/// Classify a codec string (as found in `#EXT-X-STREAM-INF:CODECS=`) as a
/// video codec, if it is one.
fn classify_video_codec(codec: &str) -> Option<VideoCodec> {
    let codec = codec.trim().to_lowercase();
    if codec.starts_with("avc1") {
        Some(VideoCodec::H264)
    } else if codec.starts_with("hvc1") || codec.starts_with("hev1") {
        Some(VideoCodec::Hevc)
    } else {
        None
    }
}

/// Classify a codec string as an audio codec, if it is one.
fn classify_audio_codec(codec: &str) -> Option<AudioCodec> {
    let codec = codec.trim().to_lowercase();
    if codec.starts_with("mp4a") {
        Some(AudioCodec::Mp4a)
    } else if codec == "ac-3" {
        Some(AudioCodec::Ac3)
    } else if codec == "ec-3" {
        Some(AudioCodec::Eac3)
    } else {
        None
    }
}

fn audio_codec_playable(codec: AudioCodec, device: &DeviceCapabilities) -> bool {
    match codec {
        AudioCodec::Mp4a => true,
        AudioCodec::Ac3 => device.ac3,
        AudioCodec::Eac3 => device.eac3,
    }
}

fn variant_height(v: &VariantStream) -> u32 {
    v.resolution.map(|(_, h)| h).unwrap_or(0)
}

fn variant_width(v: &VariantStream) -> u32 {
    v.resolution.map(|(w, _)| w).unwrap_or(0)
}

/// Stably sort ascending by `key`, keep entries with `key >= floor`; if that
/// empties the set, fall back to the single entry with the largest `key`
/// (spec.md §4.2 steps 3-4).
fn filter_or_largest<'a, K: Ord + Copy>(
    mut items: Vec<&'a VariantStream>,
    floor: Option<K>,
    key: impl Fn(&VariantStream) -> K,
) -> Vec<&'a VariantStream> {
    let Some(floor) = floor else {
        return items;
    };
    items.sort_by_key(|v| key(v));
    let kept: Vec<_> = items.iter().copied().filter(|v| key(v) >= floor).collect();
    if kept.is_empty() {
        items.into_iter().max_by_key(|v| key(v)).into_iter().collect()
    } else {
        kept
    }
}

fn bucket_codec(v: &VariantStream, target: VideoCodec) -> bool {
    match target {
        VideoCodec::H264 => v.codecs.is_empty() || v.codecs.iter().any(|c| classify_video_codec(c) == Some(VideoCodec::H264)),
        VideoCodec::Hevc => v.codecs.iter().any(|c| classify_video_codec(c) == Some(VideoCodec::Hevc)),
    }
}

fn bitrate_floor(bucket: VideoCodec, options: &SelectionOptions) -> u64 {
    options
        .min_bitrate
        .get(&bucket)
        .copied()
        .unwrap_or(match bucket {
            VideoCodec::H264 => DEFAULT_H264_BITRATE_FLOOR,
            VideoCodec::Hevc => DEFAULT_HEVC_BITRATE_FLOOR,
        })
}

fn select_bucket<'a>(
    variants: &'a [VariantStream],
    bucket: VideoCodec,
    options: &SelectionOptions,
) -> Vec<&'a VariantStream> {
    let mut members: Vec<&VariantStream> = variants.iter().filter(|v| bucket_codec(v, bucket)).collect();

    members = filter_or_largest(members, options.min_height, variant_height);
    members = filter_or_largest(members, options.min_width, variant_width);
    members = filter_or_largest(members, Some(bitrate_floor(bucket, options)), |v| v.bandwidth);

    members
}

/// Run the full selection algorithm (spec.md §4.2).
pub fn select<'a>(
    master: &'a MasterPlaylist,
    options: &SelectionOptions,
    device: &DeviceCapabilities,
) -> Result<Selection<'a>> {
    let playable: Vec<&VariantStream> = master
        .variants
        .iter()
        .filter(|v| {
            !v.codecs.iter().any(|c| {
                classify_audio_codec(c)
                    .map(|codec| !audio_codec_playable(codec, device))
                    .unwrap_or(false)
            })
        })
        .collect();

    let h264_input: Vec<VariantStream> = playable.iter().map(|v| (*v).clone()).collect();
    let h264_bucket = select_bucket(&h264_input, VideoCodec::H264, options);

    let hevc_bucket = if device.hevc_allowed(options.allow_inefficient_codecs) {
        select_bucket(&h264_input, VideoCodec::Hevc, options)
    } else {
        Vec::new()
    };

    let chosen_clone = match (h264_bucket.is_empty(), hevc_bucket.is_empty()) {
        (true, true) => {
            return Err(Error::invalid_internal_state(
                "no playable video variant remains after selection filters",
            ))
        }
        (false, true) => h264_bucket[0].clone(),
        (true, false) => hevc_bucket[0].clone(),
        (false, false) => {
            let preferred = options.preferred_video_codecs.first().copied();
            match preferred {
                Some(VideoCodec::H264) => h264_bucket[0].clone(),
                Some(VideoCodec::Hevc) => hevc_bucket[0].clone(),
                None => hevc_bucket[0].clone(),
            }
        }
    };

    // Re-resolve the owned, filtered clone back to a reference into the
    // original master playlist (same URI identifies the same variant).
    let video = master
        .variants
        .iter()
        .find(|v| v.uri == chosen_clone.uri)
        .ok_or_else(|| Error::invalid_internal_state("selected variant vanished from master"))?;

    let audio = select_media(
        &master.media,
        MediaRenditionType::Audio,
        video.audio_group.as_deref(),
        &options.audio_languages,
    );
    let text = select_media(
        &master.media,
        MediaRenditionType::Subtitles,
        video.subtitles_group.as_deref(),
        &options.text_languages,
    );

    Ok(Selection { video, audio, text })
}

fn select_media<'a>(
    media: &'a [MediaRendition],
    rendition_type: MediaRenditionType,
    group: Option<&str>,
    policy: &LanguagePolicy,
) -> Vec<&'a MediaRendition> {
    let Some(group) = group else {
        return Vec::new();
    };

    media
        .iter()
        .filter(|m| m.rendition_type == rendition_type && m.group_id == group)
        .filter(|m| {
            let lang = m
                .language
                .as_deref()
                .map(canonicalize_language);
            policy.admits(lang.as_deref())
        })
        .collect()
}
