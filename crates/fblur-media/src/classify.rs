//! Per-frame owner/other classification with hysteresis.
//!
//! Per-frame face matching is noisy: a single frame can miss the owner
//! or match a stranger. The classifier damps that flicker with a small
//! state machine carried across frames: consecutive hits promote a
//! candidate to "owner", consecutive misses demote it, and a running
//! embedding tracks how the owner actually looks in this video as
//! lighting and pose drift away from the registered references.

use tracing::debug;

use fblur_models::{BlurMode, BoundingBox, Embedding, FrameDecision};

/// Tunable constants for one processing mode.
///
/// Fast mode samples fewer frames and cannot lean on hysteresis across
/// as many observations, so it trades recall for precision: a stricter
/// match threshold, a wider required confidence gap, and a mandatory
/// reference match (the running embedding alone is never enough).
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Run detection on every Nth frame; held decisions fill the gaps
    pub detection_stride: u32,
    /// Reference distance below which a box is a candidate owner match
    pub match_threshold: f32,
    /// Required distance gap between the best and second-best candidate
    pub min_confidence_gap: f32,
    /// Consecutive hits before a candidate is confirmed as the owner
    pub promote_hits: u32,
    /// Consecutive misses a confirmed owner survives before being dropped
    pub demote_misses: u32,
    /// Frames a confirmed owner's region may be carried forward unmatched
    pub track_ttl: u32,
    /// IoU above which a detection is associated with the tracked region
    pub track_match_threshold: f64,
    /// Weight of history when blending the running embedding
    pub embedding_smooth_alpha: f32,
    /// Slack added to the match threshold for the running-embedding path
    pub demotion_margin: f32,
    /// Base expansion ratio of the blurred region around a face box
    pub blur_expand: f64,
    /// Whether a frame must match a registered reference (fast mode)
    pub require_reference_match: bool,
}

impl ClassifierConfig {
    /// Default constants for a processing mode.
    pub fn for_mode(mode: BlurMode) -> Self {
        match mode {
            BlurMode::Detailed => Self {
                detection_stride: 1,
                match_threshold: 0.48,
                min_confidence_gap: 0.15,
                promote_hits: 2,
                demote_misses: 2,
                track_ttl: 22,
                track_match_threshold: 0.30,
                embedding_smooth_alpha: 0.60,
                demotion_margin: 0.08,
                blur_expand: 0.16,
                require_reference_match: false,
            },
            BlurMode::Fast => Self {
                detection_stride: 2,
                match_threshold: 0.40,
                min_confidence_gap: 0.30,
                promote_hits: 3,
                demote_misses: 2,
                track_ttl: 14,
                track_match_threshold: 0.22,
                embedding_smooth_alpha: 0.45,
                demotion_margin: 0.06,
                blur_expand: 0.16,
                require_reference_match: true,
            },
        }
    }
}

/// One detected face with its embedding, if the encoder produced one.
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub embedding: Option<Embedding>,
}

impl FaceObservation {
    pub fn new(bbox: BoundingBox, embedding: Option<Embedding>) -> Self {
        Self { bbox, embedding }
    }
}

/// Hysteresis state for the single owner tracked through one job.
///
/// Private to one worker; created at job start and discarded when the
/// job ends.
#[derive(Debug, Clone, Default)]
pub struct TrackState {
    hits: u32,
    misses: u32,
    confirmed: bool,
    running: Option<Embedding>,
    last_bbox: Option<BoundingBox>,
    ttl: u32,
    smoothed_distance: f32,
}

impl TrackState {
    pub fn new() -> Self {
        Self {
            smoothed_distance: f32::INFINITY,
            ..Self::default()
        }
    }

    /// Consecutive confirming observations.
    pub fn hits(&self) -> u32 {
        self.hits
    }

    /// Consecutive disconfirming observations.
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Whether the owner is currently confirmed.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Smoothed embedding of the owner as tracked in this video.
    pub fn running(&self) -> Option<&Embedding> {
        self.running.as_ref()
    }

    /// Smoothed reference distance, for status diagnostics.
    pub fn last_distance(&self) -> f32 {
        self.smoothed_distance
    }
}

/// Classifies the detections of one frame as owner vs. other.
pub struct FrameClassifier {
    config: ClassifierConfig,
    references: Vec<Embedding>,
}

impl FrameClassifier {
    /// Create a classifier over the job's reference embeddings.
    pub fn new(config: ClassifierConfig, references: Vec<Embedding>) -> Self {
        Self { config, references }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one frame's observations, advancing the track state.
    ///
    /// Only the single minimum-distance candidate can ever be the owner;
    /// until confirmation every box is classified "other" so uncertainty
    /// errs toward blurring.
    pub fn classify(&self, state: &mut TrackState, observations: &[FaceObservation]) -> FrameDecision {
        if observations.is_empty() {
            if state.confirmed {
                return self.miss(state, observations);
            }
            // Nothing seen, nothing confirmed: counters unchanged
            return FrameDecision::empty();
        }

        // Reference distance per observation (min over references)
        let distances: Vec<f32> = observations
            .iter()
            .map(|obs| match &obs.embedding {
                Some(emb) => self
                    .references
                    .iter()
                    .map(|r| emb.distance(r))
                    .fold(f32::INFINITY, f32::min),
                None => f32::INFINITY,
            })
            .collect();

        // Gap between the two closest boxes in this frame; a crowded
        // frame with two near-identical distances is ambiguous
        let gap = confidence_gap(&distances);

        let candidate = self.pick_candidate(state, observations, &distances, gap);

        match candidate {
            Some((idx, distance)) => self.hit(state, observations, idx, distance),
            None => {
                if state.confirmed {
                    self.miss(state, observations)
                } else {
                    // Streak broken before confirmation
                    state.hits = 0;
                    FrameDecision {
                        owner: Vec::new(),
                        other: observations.iter().map(|o| o.bbox).collect(),
                    }
                }
            }
        }
    }

    /// Select the single best owner candidate, or none.
    fn pick_candidate(
        &self,
        state: &TrackState,
        observations: &[FaceObservation],
        distances: &[f32],
        gap: f32,
    ) -> Option<(usize, f32)> {
        let cfg = &self.config;

        let mut best: Option<(usize, f32)> = None;
        for (idx, obs) in observations.iter().enumerate() {
            let distance = distances[idx];
            if !distance.is_finite() {
                continue;
            }

            let reference_ok = distance <= cfg.match_threshold;
            let accepted = if cfg.require_reference_match {
                // Fast mode: a registered reference must match, and the
                // frame must be unambiguous
                reference_ok && gap >= cfg.min_confidence_gap
            } else if reference_ok {
                true
            } else {
                // Detailed mode may lean on the running embedding when
                // the reference distance is only just over the line
                let window_ok = distance <= cfg.match_threshold + cfg.demotion_margin * 0.25;
                let running_ok = match (&state.running, &obs.embedding) {
                    (Some(running), Some(emb)) => {
                        emb.distance(running) <= cfg.match_threshold * 0.9
                    }
                    _ => false,
                };
                window_ok && running_ok && gap >= cfg.min_confidence_gap
            };

            if accepted && best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
        best
    }

    /// A candidate matched this frame.
    fn hit(
        &self,
        state: &mut TrackState,
        observations: &[FaceObservation],
        idx: usize,
        distance: f32,
    ) -> FrameDecision {
        let cfg = &self.config;
        let obs = &observations[idx];

        state.hits = (state.hits + 1).min(cfg.promote_hits);
        state.misses = 0;
        state.ttl = cfg.track_ttl;
        state.smoothed_distance = blend_distance(state.smoothed_distance, distance);

        if let Some(emb) = &obs.embedding {
            state.running = Some(match &state.running {
                Some(running) => running.blend(cfg.embedding_smooth_alpha, emb),
                None => emb.clone(),
            });
        }

        // Smooth the tracked region when it overlaps the previous one
        let bbox = match state.last_bbox {
            Some(prev) if prev.iou(&obs.bbox) >= cfg.track_match_threshold => {
                prev.blend(&obs.bbox)
            }
            _ => obs.bbox,
        };
        state.last_bbox = Some(bbox);

        if state.hits >= cfg.promote_hits {
            state.confirmed = true;
        }

        debug!(
            distance,
            hits = state.hits,
            misses = state.misses,
            confirmed = state.confirmed,
            "owner candidate matched"
        );

        let mut decision = FrameDecision::empty();
        for (i, o) in observations.iter().enumerate() {
            if i == idx && state.confirmed {
                decision.owner.push(bbox);
            } else {
                decision.other.push(o.bbox);
            }
        }
        decision
    }

    /// No candidate matched this frame while the owner was confirmed.
    fn miss(&self, state: &mut TrackState, observations: &[FaceObservation]) -> FrameDecision {
        let cfg = &self.config;

        state.misses += 1;

        if state.misses > cfg.demote_misses || state.ttl == 0 || state.last_bbox.is_none() {
            // Owner lost for this stretch; full re-confirmation required
            state.confirmed = false;
            state.hits = 0;
            debug!(misses = state.misses, "owner track dropped");
            return FrameDecision {
                owner: Vec::new(),
                other: observations.iter().map(|o| o.bbox).collect(),
            };
        }

        state.ttl -= 1;

        // Carry the last known owner region forward. A detection that
        // overlaps it is treated as the owner re-observed without an
        // embedding match and keeps the region tracking motion.
        let Some(mut owner_bbox) = state.last_bbox else {
            // Unreachable while confirmed, checked above
            return FrameDecision {
                owner: Vec::new(),
                other: observations.iter().map(|o| o.bbox).collect(),
            };
        };
        let mut decision = FrameDecision::empty();
        for obs in observations {
            if owner_bbox.iou(&obs.bbox) >= cfg.track_match_threshold {
                owner_bbox = owner_bbox.blend(&obs.bbox);
            } else {
                decision.other.push(obs.bbox);
            }
        }
        state.last_bbox = Some(owner_bbox);
        decision.owner.push(owner_bbox);

        debug!(
            misses = state.misses,
            ttl = state.ttl,
            "owner carried forward without a match"
        );
        decision
    }
}

/// Gap between the smallest and second-smallest distances.
///
/// A frame with fewer than two measurable boxes is trivially unambiguous.
fn confidence_gap(distances: &[f32]) -> f32 {
    let mut best = f32::INFINITY;
    let mut second = f32::INFINITY;
    for &d in distances {
        if !d.is_finite() {
            continue;
        }
        if d < best {
            second = best;
            best = d;
        } else if d < second {
            second = d;
        }
    }
    if second.is_finite() {
        (second - best).max(0.0)
    } else {
        f32::INFINITY
    }
}

/// Smooth the diagnostic distance so status messages do not flicker.
fn blend_distance(current: f32, new: f32) -> f32 {
    if !new.is_finite() {
        return current;
    }
    if !current.is_finite() {
        return new;
    }
    current * 0.6 + new * 0.4
}
