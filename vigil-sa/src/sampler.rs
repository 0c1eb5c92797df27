//! Frame sampling collaborator
//!
//! Zones are monitored through pre-extracted still frames on disk, one
//! subdirectory per zone. The sampler yields a bounded, ordered sequence
//! of frames per zone, skipping near-duplicate consecutive frames with a
//! cheap byte-difference heuristic. An unreadable source yields zero
//! frames rather than an error; the vision analyzer turns that into an
//! explicit low-confidence sentinel assessment.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One sampled frame ready for the vision model
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Capture timestamp (file modification time; falls back to now)
    pub timestamp: DateTime<Utc>,
    /// Base64-encoded image payload
    pub jpeg_base64: String,
}

/// A zone's video-derived frame source
#[derive(Debug, Clone)]
pub struct ZoneSource {
    /// Zone identifier (e.g., "Zone A")
    pub zone_id: String,
    /// Directory holding this zone's extracted frames
    pub frames_dir: PathBuf,
}

/// Frame source collaborator
///
/// Restartable per source: every call re-reads the source from the
/// beginning.
pub trait FrameSource: Send + Sync {
    /// Sample a bounded ordered sequence of frames for a zone
    fn sample(&self, source: &ZoneSource) -> Vec<SampledFrame>;
}

/// Still-frame sampler with duplicate skipping
pub struct StillFrameSampler {
    /// Maximum frames returned per zone
    max_frames: usize,
    /// Minimum changed-byte fraction to treat a frame as new (0.0-1.0)
    change_threshold: f64,
}

impl StillFrameSampler {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            change_threshold: 0.05,
        }
    }

    /// List frame files in a directory, sorted by filename
    fn list_frame_files(dir: &Path) -> Vec<PathBuf> {
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();

        files.sort();
        files
    }

    /// Fraction of differing bytes between two frames, sampled at a stride
    fn difference_score(a: &[u8], b: &[u8]) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 1.0;
        }
        if a.len() != b.len() {
            return 1.0;
        }

        // Sampling every 64th byte keeps this cheap for large images
        let stride = 64;
        let mut sampled = 0usize;
        let mut differing = 0usize;
        let mut i = 0;
        while i < a.len() {
            sampled += 1;
            if a[i] != b[i] {
                differing += 1;
            }
            i += stride;
        }

        differing as f64 / sampled as f64
    }
}

impl FrameSource for StillFrameSampler {
    fn sample(&self, source: &ZoneSource) -> Vec<SampledFrame> {
        let files = Self::list_frame_files(&source.frames_dir);

        if files.is_empty() {
            tracing::warn!(
                zone_id = %source.zone_id,
                frames_dir = %source.frames_dir.display(),
                "No frames found for zone"
            );
            return Vec::new();
        }

        let mut frames = Vec::new();
        let mut prev_bytes: Option<Vec<u8>> = None;

        for path in files {
            if frames.len() >= self.max_frames {
                break;
            }

            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(
                        zone_id = %source.zone_id,
                        file = %path.display(),
                        error = %e,
                        "Failed to read frame, skipping"
                    );
                    continue;
                }
            };

            // Keep the first frame unconditionally; after that only
            // frames that changed enough from the previous kept frame.
            let keep = match &prev_bytes {
                None => true,
                Some(prev) => Self::difference_score(prev, &bytes) >= self.change_threshold,
            };
            if !keep {
                tracing::debug!(
                    zone_id = %source.zone_id,
                    file = %path.display(),
                    "Skipping near-duplicate frame"
                );
                continue;
            }

            let timestamp = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            frames.push(SampledFrame {
                timestamp,
                jpeg_base64: BASE64.encode(&bytes),
            });
            prev_bytes = Some(bytes);
        }

        tracing::info!(
            zone_id = %source.zone_id,
            frames_sampled = frames.len(),
            "Frame sampling completed"
        );

        frames
    }
}

/// Filesystem directory name for a zone (e.g., "Zone A" -> "zone_a")
pub fn zone_dir_name(zone_id: &str) -> String {
    zone_id.to_ascii_lowercase().replace(' ', "_")
}

/// Discover zone sources under the configured frames directory
///
/// Each configured zone maps to `<frames_dir>/<zone_dir_name>`. Zones
/// whose directory is missing are still returned: the sampler yields
/// zero frames for them and the vision analyzer records a sentinel
/// assessment instead of dropping the zone silently.
pub fn discover_zone_sources(frames_dir: &Path, zones: &[String]) -> Vec<ZoneSource> {
    zones
        .iter()
        .map(|zone| ZoneSource {
            zone_id: zone.clone(),
            frames_dir: frames_dir.join(zone_dir_name(zone)),
        })
        .collect()
}
