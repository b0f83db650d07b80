//! Background rendition generation.
//!
//! A single worker thread drains the queue in small batches so suspension
//! and cancellation stay responsive. Each batch commits its catalog writes
//! in one transaction.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use catalog::{AssetMetadata, AssetRecord, CatalogStore};
use chrono::Utc;
use core_types::{AssetId, MediaKind, RenditionKind};
use render_cache::RenditionCache;
use tracing::{debug, error, warn};

use crate::cancel::CancellationFlag;
use crate::metadata::MetadataReader;
use crate::render::renderer::{Renderer, PREVIEW_MAX_DIM, THUMBNAIL_MAX_DIM};

/// Assets processed per worker batch. Suspension takes effect between
/// batches, so this bounds how long a suspend call waits.
pub const RENDER_BATCH_SIZE: usize = 10;
/// Minimum interval between externally visible progress updates.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
/// How long a finished or cancelled status lingers before clearing.
pub const STATUS_CLEAR_DELAY: Duration = Duration::from_millis(1500);

/// Point-in-time snapshot of queue activity for status displays.
#[derive(Debug, Clone, Default)]
pub struct RenderQueueStatus {
    pub is_generating: bool,
    pub progress: f32,
    pub remaining: usize,
    pub failed: usize,
    pub message: Option<String>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<AssetId>,
    total_enqueued: usize,
    completed: usize,
    failed: usize,
    generating: bool,
    suspended: bool,
    cancelled: bool,
    progress: f32,
    message: Option<String>,
    last_progress_emit: Option<Instant>,
    // Bumped when a fresh run resets the accounting and on cancel, so
    // delayed status clears and in-flight batches can tell their run is
    // stale. Enqueueing into a live run keeps the epoch: that batch's
    // counts still belong to the run.
    epoch: u64,
}

impl QueueState {
    fn update_progress(&mut self) {
        let due = self
            .last_progress_emit
            .map(|at| at.elapsed() >= PROGRESS_UPDATE_INTERVAL)
            .unwrap_or(true);
        if !due {
            return;
        }
        let done = self.completed + self.failed;
        self.progress = if self.total_enqueued == 0 {
            1.0
        } else {
            done as f32 / self.total_enqueued as f32
        };
        self.message = Some(format!(
            "Rendering {done} of {} assets",
            self.total_enqueued
        ));
        self.last_progress_emit = Some(Instant::now());
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    cancel: CancellationFlag,
    store: CatalogStore,
    cache: Arc<RenditionCache>,
    renderer: Arc<dyn Renderer>,
    metadata: Arc<dyn MetadataReader>,
}

/// Handle to the rendition queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct RenderQueue {
    inner: Arc<QueueInner>,
}

impl RenderQueue {
    pub fn new(
        store: CatalogStore,
        cache: Arc<RenditionCache>,
        renderer: Arc<dyn Renderer>,
        metadata: Arc<dyn MetadataReader>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                cancel: CancellationFlag::default(),
                store,
                cache,
                renderer,
                metadata,
            }),
        }
    }

    /// Appends assets to the queue and starts the worker if one is not
    /// already running. A fresh run after the queue drained resets the
    /// progress accounting; enqueueing into a live or suspended run
    /// accumulates totals instead.
    pub fn enqueue(&self, ids: impl IntoIterator<Item = AssetId>) {
        let mut state = self.inner.state.lock().expect("render queue poisoned");
        // A cancelled run also starts fresh even while its worker is still
        // draining out; clearing the flag lets that worker pick the new
        // ids up instead of exiting with them stranded.
        if state.pending.is_empty() && (!state.generating || state.cancelled) {
            state.total_enqueued = 0;
            state.completed = 0;
            state.failed = 0;
            state.progress = 0.0;
            state.message = None;
            state.last_progress_emit = None;
            state.cancelled = false;
            self.inner.cancel.reset();
            state.epoch += 1;
        }

        let mut added = 0;
        for id in ids {
            state.pending.push_back(id);
            added += 1;
        }
        state.total_enqueued += added;
        if added == 0 {
            return;
        }
        debug!(added, remaining = state.pending.len(), "enqueued renditions");

        if !state.generating && !state.suspended {
            state.generating = true;
            let inner = Arc::clone(&self.inner);
            thread::spawn(move || worker_loop(inner));
        }
    }

    /// Pauses draining. The in-flight batch finishes; everything else
    /// stays queued until [`RenderQueue::resume`].
    pub fn suspend(&self) {
        let mut state = self.inner.state.lock().expect("render queue poisoned");
        state.suspended = true;
    }

    pub fn resume(&self) {
        let mut state = self.inner.state.lock().expect("render queue poisoned");
        if !state.suspended {
            return;
        }
        state.suspended = false;
        if !state.generating && !state.pending.is_empty() {
            state.generating = true;
            let inner = Arc::clone(&self.inner);
            thread::spawn(move || worker_loop(inner));
        }
    }

    /// Hard reset: drops all queued work, interrupts the worker between
    /// items, and leaves a cancellation notice that clears itself after
    /// [`STATUS_CLEAR_DELAY`].
    pub fn cancel_all(&self) {
        self.inner.cancel.cancel();
        let epoch = {
            let mut state = self.inner.state.lock().expect("render queue poisoned");
            state.pending.clear();
            state.total_enqueued = 0;
            state.completed = 0;
            state.failed = 0;
            state.cancelled = true;
            state.progress = 0.0;
            state.message = Some("Rendering cancelled".to_string());
            state.epoch += 1;
            state.epoch
        };
        schedule_status_clear(Arc::clone(&self.inner), epoch);
    }

    pub fn status(&self) -> RenderQueueStatus {
        let state = self.inner.state.lock().expect("render queue poisoned");
        RenderQueueStatus {
            is_generating: state.generating,
            progress: state.progress,
            remaining: state.pending.len(),
            failed: state.failed,
            message: state.message.clone(),
        }
    }

    /// Blocks until the worker has drained the queue, polling status. A
    /// suspended queue with pending work never becomes idle; the timeout
    /// covers that case. Returns whether idle was reached.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.inner.state.lock().expect("render queue poisoned");
                if !state.generating && state.pending.is_empty() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

}

fn schedule_status_clear(inner: Arc<QueueInner>, epoch: u64) {
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let mut state = inner.state.lock().expect("render queue poisoned");
        // A newer enqueue or cancel owns the status now.
        if state.epoch != epoch || state.generating {
            return;
        }
        state.message = None;
        state.progress = 0.0;
        state.total_enqueued = 0;
        state.completed = 0;
        state.failed = 0;
    });
}

fn worker_loop(inner: Arc<QueueInner>) {
    loop {
        let (batch, epoch) = {
            let mut state = inner.state.lock().expect("render queue poisoned");
            if inner.cancel.is_cancelled() || state.cancelled {
                // Anything appended while the cancel was being processed
                // goes too.
                state.pending.clear();
                state.generating = false;
                return;
            }
            if state.suspended {
                state.generating = false;
                return;
            }
            if state.pending.is_empty() {
                state.generating = false;
                let done = state.completed + state.failed;
                state.progress = 1.0;
                state.message = Some(if state.failed > 0 {
                    format!(
                        "Rendered {} of {} assets ({} failed)",
                        state.completed, state.total_enqueued, state.failed
                    )
                } else {
                    format!("Rendered {done} assets")
                });
                state.last_progress_emit = Some(Instant::now());
                let epoch = state.epoch;
                drop(state);
                schedule_status_clear(Arc::clone(&inner), epoch);
                return;
            }

            let take = state.pending.len().min(RENDER_BATCH_SIZE);
            let batch: Vec<AssetId> = state.pending.drain(..take).collect();
            (batch, state.epoch)
        };

        let outcome = process_batch(&inner, &batch);

        {
            let mut state = inner.state.lock().expect("render queue poisoned");
            // Discard accounting from a run that was cancelled mid-batch.
            if state.epoch == epoch && !state.cancelled {
                state.completed += outcome.completed;
                state.failed += outcome.failed;
                state.update_progress();
            }
        }

        thread::yield_now();
    }
}

#[derive(Default)]
struct BatchOutcome {
    completed: usize,
    failed: usize,
}

fn process_batch(inner: &Arc<QueueInner>, batch: &[AssetId]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let session = match inner.store.session() {
        Ok(session) => session,
        Err(err) => {
            error!(%err, "failed to open catalog session for render batch");
            outcome.failed = batch.len();
            return outcome;
        }
    };

    for &id in batch {
        if inner.cancel.is_cancelled() {
            break;
        }

        let record = match AssetRecord::load(session.db(), id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                // Deleted between enqueue and processing; nothing to do.
                debug!(asset = %id, "skipping rendition for deleted asset");
                outcome.completed += 1;
                continue;
            }
            Err(err) => {
                warn!(asset = %id, %err, "failed to load asset for rendering");
                outcome.failed += 1;
                continue;
            }
        };

        match render_asset(inner, session.db(), &record) {
            Ok(()) => outcome.completed += 1,
            Err(err) => {
                warn!(asset = %id, path = %record.original_path, %err, "rendition failed");
                outcome.failed += 1;
            }
        }
    }

    if let Err(err) = session.commit() {
        error!(%err, "failed to commit render batch");
        outcome.failed += outcome.completed;
        outcome.completed = 0;
    }
    outcome
}

fn render_asset(
    inner: &Arc<QueueInner>,
    db: &catalog::CatalogDb,
    record: &AssetRecord,
) -> anyhow::Result<()> {
    let path = Path::new(&record.original_path);
    let thumbnail = inner.renderer.render(path, THUMBNAIL_MAX_DIM)?;
    inner
        .cache
        .put(record.id, RenditionKind::Thumbnail, &thumbnail.image)?;

    // A failed preview still leaves a usable thumbnail behind.
    match inner.renderer.render(path, PREVIEW_MAX_DIM) {
        Ok(preview) => {
            inner
                .cache
                .put(record.id, RenditionKind::Preview, &preview.image)?;
        }
        Err(err) => {
            warn!(asset = %record.id, %err, "preview rendition failed, keeping thumbnail");
        }
    }

    let parsed = if record.media_kind == MediaKind::Image {
        inner.metadata.read(path)
    } else {
        None
    };

    AssetRecord::apply_render_info(
        db,
        record.id,
        thumbnail.source_width as i64,
        thumbnail.source_height as i64,
        parsed.as_ref().and_then(|m| m.orientation),
        parsed.as_ref().and_then(|m| m.captured_at),
    )?;
    if let Some(meta) = parsed {
        AssetMetadata {
            asset_id: record.id,
            camera_make: meta.camera_make,
            camera_model: meta.camera_model,
            lens_model: meta.lens_model,
            focal_length: meta.focal_length,
            aperture: meta.aperture,
            shutter_speed: meta.shutter_speed,
            iso: meta.iso,
            gps_latitude: meta.gps_latitude,
            gps_longitude: meta.gps_longitude,
            gps_altitude: meta.gps_altitude,
            title: meta.title,
            caption: meta.caption,
            raw_properties: meta.raw_properties,
            updated_at: Utc::now(),
        }
        .upsert(db)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ParsedMetadata;
    use core_types::{AssetFlags, CatalogId};
    use image::DynamicImage;
    use render_cache::CacheLimits;
    use tempfile::{tempdir, TempDir};

    struct TestRenderer {
        delay: Duration,
    }

    impl Renderer for TestRenderer {
        fn render(&self, path: &Path, max_dim: u32) -> anyhow::Result<crate::render::Rendered> {
            if self.delay > Duration::ZERO {
                thread::sleep(self.delay);
            }
            if path.to_string_lossy().contains("bad") {
                anyhow::bail!("synthetic decode failure");
            }
            let side = max_dim.min(64);
            Ok(crate::render::Rendered {
                image: DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                    side,
                    side,
                    image::Rgba([200, 100, 50, 255]),
                )),
                source_width: 4000,
                source_height: 3000,
            })
        }
    }

    struct TestMetadataReader;

    impl MetadataReader for TestMetadataReader {
        fn read(&self, _path: &Path) -> Option<ParsedMetadata> {
            Some(ParsedMetadata {
                orientation: Some(1),
                camera_make: Some("TestCam".into()),
                ..Default::default()
            })
        }
    }

    struct Fixture {
        store: CatalogStore,
        cache: Arc<RenditionCache>,
        queue: RenderQueue,
        catalog: CatalogId,
        _dir: TempDir,
    }

    fn fixture(delay: Duration) -> Fixture {
        let dir = tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.db")).unwrap();
        let catalog = store.create_catalog("renders").unwrap().id;
        let cache = Arc::new(RenditionCache::new(
            dir.path().join("renditions"),
            CacheLimits::default(),
        ));
        let queue = RenderQueue::new(
            store.clone(),
            Arc::clone(&cache),
            Arc::new(TestRenderer { delay }),
            Arc::new(TestMetadataReader),
        );
        Fixture {
            store,
            cache,
            queue,
            catalog,
            _dir: dir,
        }
    }

    fn insert_assets(fx: &Fixture, count: usize, prefix: &str) -> Vec<AssetId> {
        let now = Utc::now();
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let record = AssetRecord {
                id: AssetId::new(),
                catalog_id: fx.catalog,
                original_path: format!("/shoot/{prefix}{i}.jpg"),
                filename: format!("{prefix}{i}.jpg"),
                filesize: 1000,
                media_kind: MediaKind::Image,
                width: None,
                height: None,
                orientation: None,
                captured_at: None,
                imported_at: now,
                modified_at: None,
                rating: None,
                flags: AssetFlags::empty(),
                color_label: None,
                available: true,
                created_at: now,
                updated_at: now,
            };
            fx.store.with_db(|db| record.insert(db)).unwrap();
            ids.push(record.id);
        }
        ids
    }

    #[test]
    fn drains_queue_and_stores_both_rendition_kinds() {
        let fx = fixture(Duration::ZERO);
        let ids = insert_assets(&fx, 25, "a");

        fx.queue.enqueue(ids.clone());
        assert!(fx.queue.wait_until_idle(Duration::from_secs(10)));

        for id in &ids {
            assert!(fx.cache.contains(*id, RenditionKind::Thumbnail));
            assert!(fx.cache.contains(*id, RenditionKind::Preview));
        }

        // Render info was written back through the catalog.
        let record = fx
            .store
            .with_db(|db| AssetRecord::load(db, ids[0]))
            .unwrap()
            .unwrap();
        assert_eq!(record.width, Some(4000));
        assert_eq!(record.height, Some(3000));
        let meta = fx
            .store
            .with_db(|db| AssetMetadata::load(db, ids[0]))
            .unwrap()
            .unwrap();
        assert_eq!(meta.camera_make.as_deref(), Some("TestCam"));
    }

    #[test]
    fn suspend_finishes_the_in_flight_batch_only() {
        let fx = fixture(Duration::from_millis(15));
        let ids = insert_assets(&fx, 12, "b");

        fx.queue.enqueue(ids);
        // Let the worker claim its first batch before suspending.
        thread::sleep(Duration::from_millis(20));
        fx.queue.suspend();

        // Worker drains the claimed batch of ten and then parks.
        let deadline = Instant::now() + Duration::from_secs(5);
        while fx.queue.status().is_generating && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let status = fx.queue.status();
        assert!(!status.is_generating);
        assert_eq!(status.remaining, 2);
    }

    #[test]
    fn enqueue_while_suspended_accumulates_totals() {
        let fx = fixture(Duration::ZERO);
        let first = insert_assets(&fx, 25, "c");
        let second = insert_assets(&fx, 5, "d");

        fx.queue.suspend();
        fx.queue.enqueue(first.clone());
        fx.queue.enqueue(second.clone());
        assert_eq!(fx.queue.status().remaining, 30);

        fx.queue.resume();
        assert!(fx.queue.wait_until_idle(Duration::from_secs(10)));

        let status = fx.queue.status();
        assert!(status
            .message
            .as_deref()
            .map(|m| m.contains("30"))
            .unwrap_or(false));
        for id in first.iter().chain(second.iter()) {
            assert!(fx.cache.contains(*id, RenditionKind::Thumbnail));
        }
    }

    #[test]
    fn enqueue_mid_drain_counts_toward_the_same_run() {
        let fx = fixture(Duration::from_millis(15));
        let first = insert_assets(&fx, 25, "f");
        let second = insert_assets(&fx, 5, "g");

        fx.queue.enqueue(first.clone());
        // Land the second enqueue while the first batch is in flight.
        thread::sleep(Duration::from_millis(20));
        fx.queue.enqueue(second.clone());

        assert!(fx.queue.wait_until_idle(Duration::from_secs(20)));

        let status = fx.queue.status();
        assert!(status
            .message
            .as_deref()
            .map(|m| m.contains("30"))
            .unwrap_or(false));
        for id in first.iter().chain(second.iter()) {
            assert!(fx.cache.contains(*id, RenditionKind::Thumbnail));
        }
    }

    #[test]
    fn enqueue_after_cancel_starts_a_fresh_run() {
        let fx = fixture(Duration::from_millis(15));
        let first = insert_assets(&fx, 10, "h");
        let second = insert_assets(&fx, 5, "i");

        fx.queue.enqueue(first);
        // Cancel while the worker is inside its first batch, then hand it
        // new work before it has parked.
        thread::sleep(Duration::from_millis(30));
        fx.queue.cancel_all();
        fx.queue.enqueue(second.clone());

        assert!(fx.queue.wait_until_idle(Duration::from_secs(10)));

        let status = fx.queue.status();
        assert_eq!(status.remaining, 0);
        assert!(status
            .message
            .as_deref()
            .map(|m| m.contains('5'))
            .unwrap_or(false));
        for id in &second {
            assert!(fx.cache.contains(*id, RenditionKind::Thumbnail));
        }
    }

    #[test]
    fn cancel_all_resets_and_clears_after_the_delay() {
        let fx = fixture(Duration::from_millis(15));
        let ids = insert_assets(&fx, 30, "e");

        fx.queue.enqueue(ids);
        thread::sleep(Duration::from_millis(30));
        fx.queue.cancel_all();

        let status = fx.queue.status();
        assert_eq!(status.remaining, 0);
        assert!(status
            .message
            .as_deref()
            .map(|m| m.to_ascii_lowercase().contains("cancel"))
            .unwrap_or(false));

        assert!(fx.queue.wait_until_idle(Duration::from_secs(5)));
        thread::sleep(STATUS_CLEAR_DELAY + Duration::from_millis(500));
        assert!(fx.queue.status().message.is_none());
    }

    #[test]
    fn failed_renditions_are_counted_but_do_not_stall_the_queue() {
        let fx = fixture(Duration::ZERO);
        let good = insert_assets(&fx, 2, "good");
        let now = Utc::now();
        let bad = AssetRecord {
            id: AssetId::new(),
            catalog_id: fx.catalog,
            original_path: "/shoot/bad.jpg".into(),
            filename: "bad.jpg".into(),
            filesize: 1000,
            media_kind: MediaKind::Image,
            width: None,
            height: None,
            orientation: None,
            captured_at: None,
            imported_at: now,
            modified_at: None,
            rating: None,
            flags: AssetFlags::empty(),
            color_label: None,
            available: true,
            created_at: now,
            updated_at: now,
        };
        fx.store.with_db(|db| bad.insert(db)).unwrap();

        fx.queue
            .enqueue(good.iter().copied().chain([bad.id]));
        assert!(fx.queue.wait_until_idle(Duration::from_secs(10)));

        let status = fx.queue.status();
        assert_eq!(status.failed, 1);
        assert!(!fx.cache.contains(bad.id, RenditionKind::Thumbnail));
        for id in &good {
            assert!(fx.cache.contains(*id, RenditionKind::Thumbnail));
        }
    }

    #[test]
    fn unknown_asset_ids_are_skipped_silently() {
        let fx = fixture(Duration::ZERO);
        fx.queue.enqueue([AssetId::new(), AssetId::new()]);
        assert!(fx.queue.wait_until_idle(Duration::from_secs(5)));

        let status = fx.queue.status();
        assert_eq!(status.failed, 0);
        assert_eq!(status.remaining, 0);
    }
}
