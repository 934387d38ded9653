//! Narration audio lookup.
//!
//! A lesson's pre-recorded narration is described by an [`AudioManifest`]
//! mapping lookup keys to clip URLs. The manifest is fetched at most once per
//! lesson through a [`ManifestSource`] and kept in a [`ManifestCache`] owned by
//! the lesson session. A missing manifest or key is not an error: the caller
//! simply narrates silently.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Defines the contract for anything that can supply a lesson's audio manifest.
///
/// Implementations live with the host (file system, HTTP, bundled assets);
/// the engine only consumes the resulting map.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Returns the `key -> clip URL` mapping for `lesson_id`.
    async fn fetch_manifest(&self, lesson_id: u32) -> Result<HashMap<String, String>>;
}

/// Immutable mapping from narration key to clip URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioManifest {
    clips: HashMap<String, String>,
}

impl AudioManifest {
    pub fn new(clips: HashMap<String, String>) -> Self {
        Self { clips }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.clips.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl FromIterator<(String, String)> for AudioManifest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Load-once cache of one lesson's manifest.
///
/// The cell is written exactly once, by the first [`ManifestCache::load`] call;
/// afterwards it is read-only and can be shared freely behind an `Arc`.
/// A failed fetch is cached as "no manifest" for the rest of the session.
#[derive(Debug)]
pub struct ManifestCache {
    lesson_id: u32,
    cell: OnceCell<Option<Arc<AudioManifest>>>,
}

impl ManifestCache {
    pub fn new(lesson_id: u32) -> Self {
        Self {
            lesson_id,
            cell: OnceCell::new(),
        }
    }

    /// A cache that is already loaded, for hosts that bundle the manifest.
    pub fn with_manifest(lesson_id: u32, manifest: AudioManifest) -> Self {
        Self {
            lesson_id,
            cell: OnceCell::new_with(Some(Some(Arc::new(manifest)))),
        }
    }

    /// A cache already settled on "no manifest".
    pub fn without_manifest(lesson_id: u32) -> Self {
        Self {
            lesson_id,
            cell: OnceCell::new_with(Some(None)),
        }
    }

    pub fn lesson_id(&self) -> u32 {
        self.lesson_id
    }

    /// Fetches the manifest on first use and returns the cached value after that.
    pub async fn load(&self, source: &dyn ManifestSource) -> Option<Arc<AudioManifest>> {
        self.cell
            .get_or_init(|| async {
                match source.fetch_manifest(self.lesson_id).await {
                    Ok(clips) => {
                        debug!(lesson = self.lesson_id, clips = clips.len(), "Audio manifest loaded");
                        Some(Arc::new(AudioManifest::new(clips)))
                    }
                    Err(e) => {
                        warn!(lesson = self.lesson_id, error = ?e, "Audio manifest unavailable; narration will be silent");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub fn manifest(&self) -> Option<&AudioManifest> {
        self.cell.get().and_then(|m| m.as_deref())
    }
}

/// Identifies which narration a clip belongs to.
///
/// The key format is shared with the content pipeline that records the clips,
/// so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationCue {
    Lecture { segment: usize, step: usize },
    Question { segment: usize, ordinal: usize },
    Feedback {
        segment: usize,
        ordinal: usize,
        correct: bool,
    },
}

impl fmt::Display for NarrationCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NarrationCue::Lecture { segment, step } => write!(f, "s{segment}_l{step}"),
            NarrationCue::Question { segment, ordinal } => write!(f, "s{segment}_q{ordinal}"),
            NarrationCue::Feedback {
                segment,
                ordinal,
                correct,
            } => {
                let outcome = if *correct { "correct" } else { "wrong" };
                write!(f, "s{segment}_q{ordinal}_{outcome}")
            }
        }
    }
}

/// Resolves narration cues to clip URLs against a lesson's manifest cache.
#[derive(Debug, Clone)]
pub struct AudioCueResolver {
    cache: Arc<ManifestCache>,
}

impl AudioCueResolver {
    pub fn new(cache: Arc<ManifestCache>) -> Self {
        Self { cache }
    }

    /// A resolver with no manifest at all; every lookup misses.
    pub fn silent(lesson_id: u32) -> Self {
        Self::new(Arc::new(ManifestCache::without_manifest(lesson_id)))
    }

    pub fn resolve(&self, key: &str) -> Option<String> {
        let url = self.cache.manifest()?.get(key)?;
        Some(url.to_string())
    }

    pub fn cache(&self) -> &Arc<ManifestCache> {
        &self.cache
    }
}

/// Handle for one playback request. Events carrying an old id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipId(u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

/// Reports from the host's audio player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    /// Metadata arrived; the clip's duration is now known.
    Loaded { clip: ClipId, duration: Duration },
    /// Playback reached the end.
    Ended { clip: ClipId },
    /// The clip could not be fetched or decoded.
    Failed { clip: ClipId },
}

impl AudioEvent {
    pub fn clip(&self) -> ClipId {
        match self {
            AudioEvent::Loaded { clip, .. }
            | AudioEvent::Ended { clip }
            | AudioEvent::Failed { clip } => *clip,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveClip {
    id: ClipId,
    duration: Option<Duration>,
}

/// Tracks the single clip that may be active at a time.
#[derive(Debug, Default)]
pub struct ClipSlot {
    next_id: u64,
    active: Option<ActiveClip>,
}

impl ClipSlot {
    /// Discards any active clip and allocates an id for the next one.
    pub fn start(&mut self) -> ClipId {
        self.next_id += 1;
        let id = ClipId(self.next_id);
        self.active = Some(ActiveClip { id, duration: None });
        id
    }

    /// Discards the active clip. Returns whether one was active.
    pub fn stop(&mut self) -> bool {
        self.active.take().is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.active.and_then(|c| c.duration)
    }

    /// Applies a player event. Returns `false` for events about a discarded clip.
    pub fn apply(&mut self, event: AudioEvent) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.id != event.clip() {
            return false;
        }
        match event {
            AudioEvent::Loaded { duration, .. } => active.duration = Some(duration),
            AudioEvent::Ended { .. } | AudioEvent::Failed { .. } => self.active = None,
        }
        true
    }
}
