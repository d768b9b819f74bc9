//! End-to-end coverage for the add→select→plan→rewrite→write path
//! (spec.md §4.1-§4.5) against an item whose master playlist carries an
//! audio rendition and a subtitle rendition alongside its video variant.
//!
//! The property under test is spec.md §8's rewritten-URI-closure: every
//! URI a player would follow out of the rewritten `master.m3u8` must
//! resolve to a file that actually exists on disk at that exact relative
//! path, for every rendition type the master can carry, not only video.

use std::sync::Arc;
use std::time::Duration;

use hls_dtg::aggregator::Aggregator;
use hls_dtg::config::SelectionDefaults;
use hls_dtg::manager::Manager;
use hls_dtg::selector::DeviceCapabilities;
use hls_dtg::worker::{WorkerConfig, WorkerPool};

use dtg_common::ItemId;
use dtg_db::pool::init_memory_pool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MASTER_PLAYLIST: &str = concat!(
    "#EXTM3U\n",
    "#EXT-X-STREAM-INF:BANDWIDTH=1200000,CODECS=\"avc1.64001f,mp4a.40.2\",",
    "AUDIO=\"aud\",SUBTITLES=\"sub\"\n",
    "video.m3u8\n",
    "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",LANGUAGE=\"en\",",
    "DEFAULT=YES,AUTOSELECT=YES,URI=\"audio.m3u8\"\n",
    "#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"sub\",NAME=\"English\",LANGUAGE=\"en\",",
    "DEFAULT=YES,AUTOSELECT=YES,FORCED=NO,URI=\"subs.m3u8\"\n",
);

const VIDEO_MEDIA_PLAYLIST: &str = concat!(
    "#EXTM3U\n",
    "#EXT-X-TARGETDURATION:6\n",
    "#EXTINF:6.0,\n",
    "seg0.ts\n",
    "#EXT-X-ENDLIST\n",
);

const AUDIO_MEDIA_PLAYLIST: &str = concat!(
    "#EXTM3U\n",
    "#EXT-X-TARGETDURATION:6\n",
    "#EXTINF:6.0,\n",
    "aud0.ts\n",
    "#EXT-X-ENDLIST\n",
);

const SUBS_MEDIA_PLAYLIST: &str = concat!(
    "#EXTM3U\n",
    "#EXT-X-TARGETDURATION:6\n",
    "#EXTINF:6.0,\n",
    "sub0.vtt\n",
    "#EXT-X-ENDLIST\n",
);

/// Every URI `master.m3u8` references, in the order they appear: the
/// variant line itself, then each `#EXT-X-MEDIA` tag's `URI="..."`.
fn referenced_uris(master_text: &str) -> Vec<String> {
    let mut uris = Vec::new();
    for line in master_text.lines() {
        if line.starts_with("#EXT-X-MEDIA:") {
            if let Some(start) = line.find("URI=\"") {
                let rest = &line[start + "URI=\"".len()..];
                if let Some(end) = rest.find('"') {
                    uris.push(rest[..end].to_string());
                }
            }
        } else if !line.starts_with('#') && !line.is_empty() {
            uris.push(line.to_string());
        }
    }
    uris
}

#[tokio::test]
async fn test_rewritten_master_uris_resolve_to_files_on_disk() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/master.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MASTER_PLAYLIST))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/video.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VIDEO_MEDIA_PLAYLIST))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/audio.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AUDIO_MEDIA_PLAYLIST))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subs.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBS_MEDIA_PLAYLIST))
        .mount(&server)
        .await;

    let pool = init_memory_pool().unwrap();
    let aggregator = Aggregator::new(pool.clone());
    let workers = WorkerPool::new(
        pool.clone(),
        Arc::clone(&aggregator),
        WorkerConfig::default(),
    );
    let root = tempfile::tempdir().unwrap();

    let manager = Manager::new(
        pool,
        aggregator,
        workers,
        root.path().to_path_buf(),
        Duration::from_secs(10),
        SelectionDefaults::default(),
    );

    let item_id = ItemId::new("movie-with-audio-and-subs");
    let master_url = format!("{}/master.m3u8", server.uri());
    manager
        .add_item(&item_id, &master_url, &DeviceCapabilities::default())
        .await
        .unwrap();

    let item_root = manager.item_root(&item_id);
    let master_text = std::fs::read_to_string(item_root.join("master.m3u8")).unwrap();

    let uris = referenced_uris(&master_text);
    // One variant line plus one AUDIO and one SUBTITLES EXT-X-MEDIA URI.
    assert_eq!(uris.len(), 3);
    assert!(uris.iter().any(|u| u.starts_with("video/")));
    assert!(uris.iter().any(|u| u.starts_with("audio/")));
    assert!(uris.iter().any(|u| u.starts_with("text/")));

    for uri in &uris {
        let resolved = item_root.join(uri);
        assert!(
            resolved.exists(),
            "master.m3u8 references {uri} but no file exists at {}",
            resolved.display()
        );
    }
}
