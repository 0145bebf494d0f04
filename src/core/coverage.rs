//! Greedy, cloud-ascending scene selection over an AOI.
//!
//! Candidates whose AOI overlap falls below the minimum coverage fraction
//! are dropped up front. The rest are visited from least to most cloudy and
//! kept when their grid cell is new and keeping them does not push the
//! acquisition-date spread past the window.
use std::collections::HashSet;

use chrono::NaiveDate;
use geo::{Area, BooleanOps, Intersects};
use tracing::{debug, info, warn};

use crate::core::model::{AreaOfInterest, SceneFeature};
use crate::core::params::PipelineParams;
use crate::types::WindowPolicy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageOptions {
    /// Fraction of the AOI area, 0..=1
    pub min_coverage: f64,
    pub window_days: i64,
    pub policy: WindowPolicy,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            min_coverage: 0.0,
            window_days: 120,
            policy: WindowPolicy::Stop,
        }
    }
}

impl From<&PipelineParams> for CoverageOptions {
    fn from(p: &PipelineParams) -> Self {
        Self {
            min_coverage: p.min_coverage,
            window_days: p.window_days,
            policy: p.window_policy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedScene {
    pub scene: SceneFeature,
    /// Area of footprint ∩ AOI, in AOI units
    pub intersection_area: f64,
    pub coverage_fraction: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CoverageSelection {
    pub scenes: Vec<SelectedScene>,
    /// Sum of individual fractions; overlaps between scenes are counted twice
    pub total_fraction: f64,
}

impl CoverageSelection {
    pub fn features(&self) -> Vec<SceneFeature> {
        self.scenes.iter().map(|s| s.scene.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

pub struct CoverageSelector {
    options: CoverageOptions,
}

impl CoverageSelector {
    pub fn new(options: CoverageOptions) -> Self {
        Self { options }
    }

    /// Selects scenes for `aoi`; footprints and AOI must share a CRS.
    pub fn select(&self, aoi: &AreaOfInterest, candidates: &[SceneFeature]) -> CoverageSelection {
        let aoi_area = aoi.geometry.unsigned_area();
        if aoi_area <= 0.0 {
            warn!("AOI has zero area; no scene can be selected");
            return CoverageSelection::default();
        }

        // Area threshold first: only survivors take part in the cloud-ordered walk
        let mut ordered: Vec<(&SceneFeature, f64)> = candidates
            .iter()
            .filter(|scene| scene.footprint.intersects(&aoi.geometry))
            .map(|scene| (scene, scene.footprint.intersection(&aoi.geometry).unsigned_area()))
            .filter(|(scene, area)| {
                let keep = area / aoi_area >= self.options.min_coverage;
                if !keep {
                    debug!("{} covers {:.2}% of the AOI; below threshold", scene.id, area / aoi_area * 100.0);
                }
                keep
            })
            .collect();
        ordered.sort_by(|a, b| a.0.cloud_cover.total_cmp(&b.0.cloud_cover));

        let mut seen_cells: HashSet<(u32, u32)> = HashSet::new();
        let mut window: Option<(NaiveDate, NaiveDate)> = None;
        let mut selection = CoverageSelection::default();

        for (scene, intersection_area) in ordered {
            if seen_cells.contains(&scene.grid_cell()) {
                continue;
            }

            let (lo, hi) = match window {
                Some((lo, hi)) => (lo.min(scene.date), hi.max(scene.date)),
                None => (scene.date, scene.date),
            };
            if (hi - lo).num_days() > self.options.window_days {
                match self.options.policy {
                    WindowPolicy::Stop => {
                        debug!("{} falls outside the acquisition window; stopping", scene.id);
                        break;
                    }
                    WindowPolicy::Skip => {
                        debug!("{} falls outside the acquisition window; skipped", scene.id);
                        continue;
                    }
                }
            }

            let coverage_fraction = intersection_area / aoi_area;
            window = Some((lo, hi));
            seen_cells.insert(scene.grid_cell());
            selection.total_fraction += coverage_fraction;
            selection.scenes.push(SelectedScene {
                scene: scene.clone(),
                intersection_area,
                coverage_fraction,
            });
        }

        info!(
            "Selected {} of {} scenes, AOI coverage sum {:.1}%",
            selection.scenes.len(),
            candidates.len(),
            selection.total_fraction * 100.0
        );
        selection
    }
}
