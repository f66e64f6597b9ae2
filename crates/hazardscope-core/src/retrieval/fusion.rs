//! Score fusion for dual-path retrieval
//!
//! Each path's distances are normalized to [0,1] relevance scores
//! independently (min-max within the path), then merged with configurable
//! path weights. Candidates retrieved by both paths keep the candidate from
//! the path with the better normalized score; provenance of both paths is
//! recorded. Ordering is fully deterministic.

use crate::index::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One fused candidate with combined score and per-path provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub candidate: Candidate,
    /// Path-weighted combined score
    pub score: f64,
    /// Normalized text-path score, when the text path retrieved this id
    pub text_score: Option<f64>,
    /// Normalized image-path score, when the image path retrieved this id
    pub image_score: Option<f64>,
}

impl FusedCandidate {
    /// Smallest path-local distance among the paths that retrieved this id
    pub fn best_distance(&self) -> f32 {
        self.candidate.distance
    }
}

/// Ordered, deduplicated fusion output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusedResult {
    pub candidates: Vec<FusedCandidate>,
}

impl FusedResult {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Normalize a path's distances to [0,1] relevance scores via min-max.
/// Smaller distance maps to higher score; a degenerate path where all
/// distances are equal scores 1.0 throughout.
fn normalize_path(hits: &[Candidate]) -> Vec<f64> {
    let Some(first) = hits.first() else {
        return Vec::new();
    };

    let mut min = first.distance;
    let mut max = first.distance;
    for hit in hits {
        min = min.min(hit.distance);
        max = max.max(hit.distance);
    }

    let range = (max - min) as f64;
    hits.iter()
        .map(|hit| {
            if range > 0.0 {
                ((max - hit.distance) as f64 / range).clamp(0.0, 1.0)
            } else {
                1.0
            }
        })
        .collect()
}

struct FusionSlot {
    candidate: Candidate,
    text_score: Option<f64>,
    image_score: Option<f64>,
    /// Position of first retrieval across both input lists; final tie-break
    arrival: usize,
}

/// Merge the two paths' hits into one ranked list of at most `top_k`
/// candidates, deduplicated by id.
pub fn fuse(
    text_hits: Vec<Candidate>,
    image_hits: Vec<Candidate>,
    text_weight: f64,
    image_weight: f64,
    top_k: usize,
) -> FusedResult {
    let text_scores = normalize_path(&text_hits);
    let image_scores = normalize_path(&image_hits);

    let mut slots: Vec<FusionSlot> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut arrival = 0usize;

    for (hit, score) in text_hits.into_iter().zip(text_scores) {
        match by_id.get(&hit.id) {
            Some(&slot_idx) => {
                // Same id retrieved twice by one path: keep the better score
                let slot = &mut slots[slot_idx];
                if slot.text_score.unwrap_or(f64::MIN) < score {
                    slot.text_score = Some(score);
                }
            }
            None => {
                by_id.insert(hit.id.clone(), slots.len());
                slots.push(FusionSlot {
                    candidate: hit,
                    text_score: Some(score),
                    image_score: None,
                    arrival,
                });
            }
        }
        arrival += 1;
    }

    for (hit, score) in image_hits.into_iter().zip(image_scores) {
        match by_id.get(&hit.id) {
            Some(&slot_idx) => {
                let slot = &mut slots[slot_idx];
                if slot.image_score.unwrap_or(f64::MIN) < score {
                    slot.image_score = Some(score);
                }
                // Keep the candidate from the path with the better
                // normalized score; retain the smaller distance for
                // tie-breaking either way.
                let better_image = score > slot.text_score.unwrap_or(f64::MIN);
                let smaller_distance = hit.distance < slot.candidate.distance;
                if better_image {
                    let kept_distance = slot.candidate.distance.min(hit.distance);
                    slot.candidate = hit;
                    slot.candidate.distance = kept_distance;
                } else if smaller_distance {
                    slot.candidate.distance = hit.distance;
                }
            }
            None => {
                by_id.insert(hit.id.clone(), slots.len());
                slots.push(FusionSlot {
                    candidate: hit,
                    text_score: None,
                    image_score: Some(score),
                    arrival,
                });
            }
        }
        arrival += 1;
    }

    let mut fused: Vec<(FusedCandidate, usize)> = slots
        .into_iter()
        .map(|slot| {
            let score = slot.text_score.map(|s| s * text_weight).unwrap_or(0.0)
                + slot.image_score.map(|s| s * image_weight).unwrap_or(0.0);
            (
                FusedCandidate {
                    candidate: slot.candidate,
                    score,
                    text_score: slot.text_score,
                    image_score: slot.image_score,
                },
                slot.arrival,
            )
        })
        .collect();

    // Combined score descending, then smaller path-local distance, then
    // stable input order. No randomness anywhere.
    fused.sort_by(|(a, a_arrival), (b, b_arrival)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.candidate
                    .distance
                    .partial_cmp(&b.candidate.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a_arrival.cmp(b_arrival))
    });
    fused.truncate(top_k);

    FusedResult {
        candidates: fused.into_iter().map(|(c, _)| c).collect(),
    }
}
