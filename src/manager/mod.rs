//! Item lifecycle orchestration (spec.md §5 "metadata loading").
//!
//! The single entry point the CLI and the server both call through: wires
//! the rendition selector, task planner, playlist rewriter, worker pool,
//! and aggregator together behind `add`/`start`/`pause`/`cancel`/`remove`.
//! Metadata loading is a blocking sequence of HTTP GETs with a per-request
//! timeout, run once per item before any task is ever dispatched to a
//! worker (spec.md §5).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dtg_common::{path_key, Error, ItemId, ItemState, Result};
use dtg_db::models::Item;
use dtg_db::pool::DbPool;
use dtg_db::pool::get_conn;
use dtg_db::queries::{items, tasks};
use dtg_media::hls::{
    self, MediaPlaylistDoc, MediaRendition, Playlist, SelectedMaster, SelectedMedia,
};

use crate::aggregator::Aggregator;
use crate::config::SelectionDefaults;
use crate::planner;
use crate::selector::{self, DeviceCapabilities, SelectionOptions};
use crate::worker::WorkerPool;

pub struct Manager {
    db_pool: DbPool,
    aggregator: Arc<Aggregator>,
    workers: Arc<WorkerPool>,
    items_root: PathBuf,
    metadata_timeout: Duration,
    selection_defaults: SelectionDefaults,
    http: reqwest::Client,
}

impl Manager {
    pub fn new(
        db_pool: DbPool,
        aggregator: Arc<Aggregator>,
        workers: Arc<WorkerPool>,
        items_root: PathBuf,
        metadata_timeout: Duration,
        selection_defaults: SelectionDefaults,
    ) -> Self {
        Self {
            db_pool,
            aggregator,
            workers,
            items_root,
            metadata_timeout,
            selection_defaults,
            http: reqwest::Client::new(),
        }
    }

    pub fn item_root(&self, item_id: &ItemId) -> PathBuf {
        self.items_root.join(path_key::safe_item_id(item_id.as_str()))
    }

    /// Add an item: fetch and parse the master playlist and every selected
    /// media playlist, plan the fetch-task set, write the rewritten
    /// playlists to disk, and persist both rows (spec.md §4.1-§4.5).
    pub async fn add_item(
        &self,
        item_id: &ItemId,
        source_master_url: &str,
        device: &DeviceCapabilities,
    ) -> Result<()> {
        {
            let conn = get_conn(&self.db_pool)?;
            if items::get_item(&conn, item_id)?.is_some() {
                return Err(Error::invalid_state(format!("item {item_id} already exists")));
            }
        }

        let root = self.item_root(item_id);
        tokio::fs::create_dir_all(&root).await?;

        let now = Utc::now();
        {
            let conn = get_conn(&self.db_pool)?;
            items::upsert_item(
                &conn,
                &Item {
                    id: item_id.clone(),
                    source_master_url: source_master_url.to_string(),
                    root_path: root.to_string_lossy().to_string(),
                    state: ItemState::New,
                    error_message: None,
                    selected_variant: None,
                    estimated_size_bytes: 0,
                    created_at: now,
                    updated_at: now,
                },
            )?;
        }

        let master_text = self.fetch_text(source_master_url).await?;
        let master = match hls::parse(&master_text, source_master_url)? {
            Playlist::Master(m) => m,
            Playlist::Media(_) => {
                return Err(Error::UnknownPlaylistType(source_master_url.to_string()))
            }
        };

        let options = SelectionOptions {
            allow_inefficient_codecs: self.selection_defaults.allow_inefficient_codecs,
            audio_languages: self.selection_defaults.audio_languages.clone(),
            text_languages: self.selection_defaults.text_languages.clone(),
            ..SelectionOptions::default()
        };

        let selection = selector::select(&master, &options, device)?;

        let video_doc = {
            let text = self.fetch_text(&selection.video.uri).await?;
            hls::parse_media(&text, &selection.video.uri)?
        };

        let mut audio_docs: Vec<(&MediaRendition, MediaPlaylistDoc)> = Vec::new();
        for rendition in &selection.audio {
            let Some(uri) = rendition.uri.as_deref() else {
                continue;
            };
            let text = self.fetch_text(uri).await?;
            let doc = hls::parse_media(&text, uri)?;
            audio_docs.push((*rendition, doc));
        }

        let mut text_docs: Vec<(&MediaRendition, MediaPlaylistDoc)> = Vec::new();
        for rendition in &selection.text {
            let Some(uri) = rendition.uri.as_deref() else {
                continue;
            };
            let text = self.fetch_text(uri).await?;
            let doc = hls::parse_media(&text, uri)?;
            text_docs.push((*rendition, doc));
        }

        let audio_refs: Vec<(&MediaRendition, &MediaPlaylistDoc)> =
            audio_docs.iter().map(|(r, d)| (*r, d)).collect();
        let text_refs: Vec<(&MediaRendition, &MediaPlaylistDoc)> =
            text_docs.iter().map(|(r, d)| (*r, d)).collect();

        let plan = planner::plan(
            item_id,
            (selection.video, &video_doc),
            &audio_refs,
            &text_refs,
            self.selection_defaults.audio_bitrate_fallback,
        );

        self.write_playlists(&root, &master, &selection, &video_doc, &audio_docs, &text_docs)
            .await?;

        {
            let mut conn = get_conn(&self.db_pool)?;
            tasks::insert_tasks(&mut conn, &plan.tasks)?;
            items::upsert_item(
                &conn,
                &Item {
                    id: item_id.clone(),
                    source_master_url: source_master_url.to_string(),
                    root_path: root.to_string_lossy().to_string(),
                    state: ItemState::New,
                    error_message: None,
                    selected_variant: Some(selection.video.uri.clone()),
                    estimated_size_bytes: plan.estimated_size_bytes as i64,
                    created_at: now,
                    updated_at: Utc::now(),
                },
            )?;
        }

        self.aggregator.mark_metadata_loaded(item_id)?;
        Ok(())
    }

    /// The shared aggregator, for callers that want to subscribe to state
    /// and progress events directly (e.g. the CLI's `start` command).
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn start_item(&self, item_id: &ItemId) -> Result<()> {
        let root = self.item_root(item_id);
        self.workers.start(item_id, &root)
    }

    pub fn pause_item(&self, item_id: &ItemId) -> Result<()> {
        self.workers.pause(item_id)
    }

    pub fn cancel_item(&self, item_id: &ItemId) -> Result<()> {
        self.workers.cancel(item_id)
    }

    /// Tear the worker down first, then delete the item's store rows and
    /// on-disk directory (spec.md §5 "removeItem requires worker teardown
    /// first").
    pub async fn remove_item(&self, item_id: &ItemId) -> Result<()> {
        if self.workers.is_active(item_id) {
            self.workers.cancel(item_id)?;
        }

        self.aggregator.mark_removed(item_id)?;

        let conn = get_conn(&self.db_pool)?;
        items::delete_item(&conn, item_id)?;
        drop(conn);

        let root = self.item_root(item_id);
        if tokio::fs::try_exists(&root).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&root).await?;
        }
        Ok(())
    }

    pub fn list_items(&self) -> Result<Vec<Item>> {
        let conn = get_conn(&self.db_pool)?;
        items::list_all_items(&conn)
    }

    pub fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        let conn = get_conn(&self.db_pool)?;
        items::get_item(&conn, item_id)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).timeout(self.metadata_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpFailure {
                status: Some(status.as_u16()),
                cause: format!("fetching playlist {url}"),
            });
        }
        Ok(response.text().await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_playlists(
        &self,
        root: &std::path::Path,
        master: &dtg_media::hls::MasterPlaylist,
        selection: &selector::Selection<'_>,
        video_doc: &MediaPlaylistDoc,
        audio_docs: &[(&MediaRendition, MediaPlaylistDoc)],
        text_docs: &[(&MediaRendition, MediaPlaylistDoc)],
    ) -> Result<()> {
        let audio_renditions: Vec<SelectedMedia> = audio_docs
            .iter()
            .map(|(r, _)| selected_media(r))
            .collect();
        let text_renditions: Vec<SelectedMedia> = text_docs
            .iter()
            .map(|(r, _)| selected_media(r))
            .collect();
        let session_key_lines: Vec<String> =
            master.session_keys.iter().map(|k| k.0.clone()).collect();

        let selected_master = SelectedMaster {
            video_uri: &selection.video.uri,
            bandwidth: selection.video.bandwidth,
            resolution: selection.video.resolution,
            codecs: &selection.video.codecs,
            audio_group: selection.video.audio_group.as_deref(),
            subtitles_group: selection.video.subtitles_group.as_deref(),
            audio_renditions,
            text_renditions,
            session_key_lines: &session_key_lines,
        };

        let master_text = dtg_media::hls::rewrite_master(&selected_master);
        tokio::fs::write(root.join("master.m3u8"), master_text).await?;

        self.write_media_playlist(
            root,
            dtg_common::TaskType::Video,
            &selection.video.uri,
            video_doc,
        )
        .await?;
        for (rendition, doc) in audio_docs {
            if let Some(uri) = rendition.uri.as_deref() {
                self.write_media_playlist(root, dtg_common::TaskType::Audio, uri, doc).await?;
            }
        }
        for (rendition, doc) in text_docs {
            if let Some(uri) = rendition.uri.as_deref() {
                self.write_media_playlist(root, dtg_common::TaskType::Text, uri, doc).await?;
            }
        }

        Ok(())
    }

    async fn write_media_playlist(
        &self,
        root: &std::path::Path,
        task_type: dtg_common::TaskType,
        source_url: &str,
        doc: &MediaPlaylistDoc,
    ) -> Result<()> {
        let rel = path_key::relative_destination(task_type, source_url);
        let destination = root.join(rel);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, dtg_media::hls::rewrite_media(doc)).await?;
        Ok(())
    }
}

fn selected_media(rendition: &MediaRendition) -> SelectedMedia<'_> {
    SelectedMedia {
        rendition_type: rendition.rendition_type,
        group_id: &rendition.group_id,
        name: &rendition.name,
        language: rendition.language.as_deref(),
        default: rendition.default,
        autoselect: rendition.autoselect,
        forced: rendition.forced,
        bandwidth: rendition.bandwidth,
        source_url: rendition.uri.as_deref().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtg_db::pool::init_memory_pool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_add_item_plans_and_persists_tasks() {
        let server = MockServer::start().await;

        let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=500000,CODECS=\"avc1.64001f,mp4a.40.2\"\nvideo.m3u8\n";
        Mock::given(method("GET"))
            .and(path("/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(master))
            .mount(&server)
            .await;

        let media = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg0.ts\n#EXT-X-ENDLIST\n";
        Mock::given(method("GET"))
            .and(path("/video.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(media))
            .mount(&server)
            .await;

        let pool = init_memory_pool().unwrap();
        let aggregator = Aggregator::new(pool.clone());
        let workers = WorkerPool::new(
            pool.clone(),
            Arc::clone(&aggregator),
            crate::worker::WorkerConfig::default(),
        );
        let root = tempfile::tempdir().unwrap();

        let manager = Manager::new(
            pool.clone(),
            aggregator,
            workers,
            root.path().to_path_buf(),
            Duration::from_secs(10),
            SelectionDefaults::default(),
        );

        let item_id = ItemId::new("movie-1");
        let master_url = format!("{}/master.m3u8", server.uri());
        manager
            .add_item(&item_id, &master_url, &DeviceCapabilities::default())
            .await
            .unwrap();

        let item = manager.get_item(&item_id).unwrap().unwrap();
        assert_eq!(item.state, ItemState::MetadataLoaded);
        assert!(item.estimated_size_bytes > 0);

        let conn = get_conn(&pool).unwrap();
        assert_eq!(tasks::remaining_task_count(&conn, &item_id).unwrap(), 1);

        assert!(manager.item_root(&item_id).join("master.m3u8").exists());
    }
}
