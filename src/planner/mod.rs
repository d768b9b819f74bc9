//! Task Planner (spec.md §4.3).
//!
//! Takes the selector's chosen streams, each already fetched and parsed into
//! a [`MediaPlaylistDoc`], and emits the full ordered fetch-task set plus an
//! estimated total size. Pure function over its inputs; no I/O of its own
//! (metadata loading happens one layer up, per spec.md §5).

use std::collections::HashSet;

use chrono::Utc;
use dtg_common::{path_key, ItemId, TaskStatus, TaskType};
use dtg_db::models::Task;
use dtg_media::hls::{MediaPlaylistDoc, MediaRendition, VariantStream};

/// One selected stream paired with its already-fetched media playlist.
pub struct PlannedStream<'a> {
    pub bandwidth: Option<u64>,
    pub doc: &'a MediaPlaylistDoc,
}

pub struct PlanResult {
    pub tasks: Vec<Task>,
    pub estimated_size_bytes: u64,
}

/// Plan the full task set for an item (spec.md §4.3).
///
/// `audio_bitrate_fallback` is used for an audio stream whose own declared
/// bandwidth is absent or zero.
pub fn plan(
    item_id: &ItemId,
    video: (&VariantStream, &MediaPlaylistDoc),
    audio: &[(&MediaRendition, &MediaPlaylistDoc)],
    text: &[(&MediaRendition, &MediaPlaylistDoc)],
    audio_bitrate_fallback: u64,
) -> PlanResult {
    let mut order = 0i64;
    let mut tasks = Vec::new();
    let mut estimated_size_bytes = 0u64;

    let (video_variant, video_doc) = video;
    emit_stream_tasks(video_doc, TaskType::Video, item_id, &mut order, &mut tasks);
    estimated_size_bytes += stream_estimated_bytes(video_doc, video_variant.bandwidth);

    let mut all_docs: Vec<&MediaPlaylistDoc> = vec![video_doc];

    for (rendition, doc) in audio {
        emit_stream_tasks(doc, TaskType::Audio, item_id, &mut order, &mut tasks);
        let bandwidth = rendition.bandwidth.filter(|b| *b > 0).unwrap_or(audio_bitrate_fallback);
        estimated_size_bytes += stream_estimated_bytes(doc, bandwidth);
        all_docs.push(doc);
    }

    for (_, doc) in text {
        emit_stream_tasks(doc, TaskType::Text, item_id, &mut order, &mut tasks);
        all_docs.push(doc);
    }

    emit_key_tasks(&all_docs, item_id, &mut order, &mut tasks);

    PlanResult {
        tasks,
        estimated_size_bytes,
    }
}

fn stream_estimated_bytes(doc: &MediaPlaylistDoc, bandwidth: u64) -> u64 {
    let duration_secs: f64 = doc.segments.iter().map(|s| s.duration_secs).sum();
    ((bandwidth as f64) * duration_secs / 8.0) as u64
}

fn emit_stream_tasks(
    doc: &MediaPlaylistDoc,
    task_type: TaskType,
    item_id: &ItemId,
    order: &mut i64,
    tasks: &mut Vec<Task>,
) {
    if let Some(map_uri) = &doc.map_uri {
        tasks.push(new_task(item_id, task_type, map_uri, *order));
        *order += 1;
    }
    for segment in &doc.segments {
        tasks.push(new_task(item_id, task_type, &segment.uri, *order));
        *order += 1;
    }
}

fn emit_key_tasks(docs: &[&MediaPlaylistDoc], item_id: &ItemId, order: &mut i64, tasks: &mut Vec<Task>) {
    let mut seen = HashSet::new();
    for doc in docs {
        for key in &doc.keys {
            if !key.is_fetchable_aes128() {
                continue;
            }
            if seen.insert(key.uri.clone()) {
                tasks.push(new_task(item_id, TaskType::Key, &key.uri, *order));
                *order += 1;
            }
        }
    }
}

fn new_task(item_id: &ItemId, task_type: TaskType, source_url: &str, order_num: i64) -> Task {
    Task {
        item_id: item_id.clone(),
        source_url: source_url.to_string(),
        task_type,
        order_num,
        destination_path: path_key::relative_destination(task_type, source_url),
        status: TaskStatus::Pending,
        bytes_downloaded: 0,
        total_bytes: None,
        retry_count: 0,
        resume_token: None,
        last_error: None,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtg_media::hls::{KeyReference, Segment};

    fn variant(bandwidth: u64) -> VariantStream {
        VariantStream {
            uri: "video.m3u8".to_string(),
            bandwidth,
            resolution: Some((1920, 1080)),
            codecs: vec!["avc1.64001f".to_string()],
            audio_group: None,
            subtitles_group: None,
        }
    }

    fn doc_with_map_and_segments(map: bool, n: usize) -> MediaPlaylistDoc {
        MediaPlaylistDoc {
            segments: (0..n)
                .map(|i| Segment {
                    uri: format!("seg{i}.ts"),
                    duration_secs: 6.0,
                })
                .collect(),
            keys: vec![],
            map_uri: if map { Some("init.mp4".to_string()) } else { None },
            raw_lines: vec![],
        }
    }

    #[test]
    fn test_scenario_5_map_plus_ten_segments_is_eleven_tasks_map_first() {
        let variant = variant(1_000_000);
        let doc = doc_with_map_and_segments(true, 10);

        let result = plan(&ItemId::new("item"), (&variant, &doc), &[], &[], 128_000);

        assert_eq!(result.tasks.len(), 11);
        assert_eq!(result.tasks[0].source_url, "init.mp4");
        assert_eq!(result.tasks[0].order_num, 0);
        assert_eq!(result.tasks[1].source_url, "seg0.ts");
        assert_eq!(result.tasks[10].order_num, 10);
    }

    #[test]
    fn test_scenario_4_three_distinct_aes128_keys() {
        let variant = variant(1_000_000);
        let mut doc = doc_with_map_and_segments(false, 2);
        doc.keys = vec![
            KeyReference {
                uri: "https://cdn/key1".to_string(),
                method: "AES-128".to_string(),
                iv: None,
                key_format: None,
            },
            KeyReference {
                uri: "https://cdn/key2".to_string(),
                method: "AES-128".to_string(),
                iv: None,
                key_format: None,
            },
            KeyReference {
                uri: "https://cdn/key1".to_string(),
                method: "AES-128".to_string(),
                iv: None,
                key_format: None,
            },
        ];
        let text_doc = doc_with_map_and_segments(false, 1);
        let mut text_doc_with_key = text_doc.clone();
        text_doc_with_key.keys = vec![KeyReference {
            uri: "https://cdn/key3".to_string(),
            method: "AES-128".to_string(),
            iv: None,
            key_format: None,
        }];

        let rendition = dtg_media::hls::MediaRendition {
            rendition_type: dtg_media::hls::MediaRenditionType::Subtitles,
            group_id: "sub".to_string(),
            name: "English".to_string(),
            language: Some("en".to_string()),
            default: false,
            autoselect: false,
            forced: false,
            bandwidth: None,
            uri: Some("text.m3u8".to_string()),
        };

        let result = plan(
            &ItemId::new("item"),
            (&variant, &doc),
            &[],
            &[(&rendition, &text_doc_with_key)],
            128_000,
        );

        let key_tasks: Vec<_> = result
            .tasks
            .iter()
            .filter(|t| t.task_type == TaskType::Key)
            .collect();
        assert_eq!(key_tasks.len(), 3);
    }

    #[test]
    fn test_fairplay_keys_are_never_planned() {
        let variant = variant(1_000_000);
        let mut doc = doc_with_map_and_segments(false, 1);
        doc.keys = vec![KeyReference {
            uri: "https://cdn/fp".to_string(),
            method: "SAMPLE-AES".to_string(),
            iv: None,
            key_format: Some("com.apple.streamingkeydelivery".to_string()),
        }];

        let result = plan(&ItemId::new("item"), (&variant, &doc), &[], &[], 128_000);
        assert!(result.tasks.iter().all(|t| t.task_type != TaskType::Key));
    }

    #[test]
    fn test_destination_paths_are_deterministic_across_runs() {
        let variant = variant(1_000_000);
        let doc = doc_with_map_and_segments(true, 3);

        let a = plan(&ItemId::new("item"), (&variant, &doc), &[], &[], 128_000);
        let b = plan(&ItemId::new("item"), (&variant, &doc), &[], &[], 128_000);

        let paths_a: Vec<_> = a.tasks.iter().map(|t| t.destination_path.clone()).collect();
        let paths_b: Vec<_> = b.tasks.iter().map(|t| t.destination_path.clone()).collect();
        assert_eq!(paths_a, paths_b);
    }

    #[test]
    fn test_estimated_size_uses_audio_fallback_bitrate() {
        let variant = variant(1_000_000);
        let video_doc = doc_with_map_and_segments(false, 1);
        let audio_doc = doc_with_map_and_segments(false, 1);
        let rendition = dtg_media::hls::MediaRendition {
            rendition_type: dtg_media::hls::MediaRenditionType::Audio,
            group_id: "aud".to_string(),
            name: "English".to_string(),
            language: Some("en".to_string()),
            default: true,
            autoselect: true,
            forced: false,
            bandwidth: None,
            uri: Some("audio.m3u8".to_string()),
        };

        let result = plan(
            &ItemId::new("item"),
            (&variant, &video_doc),
            &[(&rendition, &audio_doc)],
            &[],
            128_000,
        );

        // video: 1M bps * 6s / 8 = 750_000; audio: 128_000 bps * 6s / 8 = 96_000
        assert_eq!(result.estimated_size_bytes, 750_000 + 96_000);
    }
}
