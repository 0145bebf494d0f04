//! Band locator resolution.
//!
//! Provider catalogs name band assets inconsistently, so a locator is found
//! through an ordered cascade of strategies. The first two only look at the
//! asset table; the last two build candidate URLs and confirm them with a
//! lightweight existence probe.
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::model::SceneFeature;
use crate::io::http::AssetProbe;
use crate::types::{Band, Collection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    /// Asset key matches a known naming variant
    Variant,
    /// Asset key contains the band token
    Substring,
    /// Band token substituted into a sibling asset URL
    SiblingPattern,
    /// URL built from the provider's directory convention
    UrlSynthesis,
}

impl Strategy {
    pub const CASCADE: [Strategy; 4] = [
        Strategy::Variant,
        Strategy::Substring,
        Strategy::SiblingPattern,
        Strategy::UrlSynthesis,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsset {
    pub url: String,
    pub asset_key: Option<String>,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("no locator for {band} ({collection}) on {scene_id} after {attempted:?}")]
pub struct ResolveFailure {
    pub scene_id: String,
    pub band: Band,
    pub collection: Collection,
    pub attempted: Vec<Strategy>,
}

static SIBLING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<prefix>.+?)_(?:(?P<coll>SR|ST)_)?B\d{1,2}\.(?P<ext>tiff?)$")
        .expect("sibling pattern is valid")
});

static PRODUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^L(?P<sensor>[COTE])\d{2}_L2S[PR]_\d{6}_\d{8}_\d{8}_\d{2}_(?:T1|T2|RT)$")
        .expect("product pattern is valid")
});

pub struct BandResolver {
    data_host: String,
    strategies: Vec<Strategy>,
}

impl BandResolver {
    pub fn new(data_host: &str) -> Self {
        Self {
            data_host: data_host.trim_end_matches('/').to_string(),
            strategies: Strategy::CASCADE.to_vec(),
        }
    }

    /// Restricts or reorders the cascade
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Finds a locator for `band` of `collection` on `scene`.
    ///
    /// `collection` may differ from the scene's own collection when a group
    /// borrows from a cross-collection sibling.
    pub fn resolve(
        &self,
        scene: &SceneFeature,
        band: Band,
        collection: Collection,
        probe: &dyn AssetProbe,
    ) -> Result<ResolvedAsset, ResolveFailure> {
        let mut attempted = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            attempted.push(*strategy);
            let found = match strategy {
                Strategy::Variant => match_variant(scene, band, collection),
                Strategy::Substring => match_substring(scene, band, collection),
                Strategy::SiblingPattern => {
                    first_existing(sibling_candidates(scene, band, collection), probe)
                }
                Strategy::UrlSynthesis => first_existing(
                    synthesize_url(&self.data_host, scene, band, collection)
                        .into_iter()
                        .collect(),
                    probe,
                ),
            };
            if let Some((url, asset_key)) = found {
                debug!("{} {} resolved via {:?}: {}", scene.id, band, strategy, url);
                return Ok(ResolvedAsset {
                    url,
                    asset_key,
                    strategy: *strategy,
                });
            }
        }
        Err(ResolveFailure {
            scene_id: scene.id.clone(),
            band,
            collection,
            attempted,
        })
    }
}

/// Asset-key spellings seen across providers, most specific first
pub fn key_variants(band: Band, collection: Collection) -> Vec<String> {
    let n = band.number();
    let coll = collection.token();
    let mut keys = vec![
        format!("{}_B{}", coll, n),
        format!("{}_b{}", coll.to_ascii_lowercase(), n),
        format!("B{}", n),
        format!("b{}", n),
        format!("B{:02}", n),
        format!("band{}", n),
        format!("band_{}", n),
        format!("BAND{}", n),
        format!("BAND_{}", n),
    ];
    if let Some(common) = band.common_name() {
        keys.push(common.to_string());
    }
    keys
}

type Found = Option<(String, Option<String>)>;

fn match_variant(scene: &SceneFeature, band: Band, collection: Collection) -> Found {
    key_variants(band, collection).into_iter().find_map(|key| {
        scene
            .assets
            .get(&key)
            .map(|href| (href.clone(), Some(key.clone())))
    })
}

fn contains_band_token(haystack: &str, token: &str) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(token) {
        let end = from + pos + token.len();
        let next_is_digit = haystack[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit());
        if !next_is_digit {
            return true;
        }
        from = from + pos + 1;
    }
    false
}

fn match_substring(scene: &SceneFeature, band: Band, collection: Collection) -> Found {
    let token = format!("b{}", band.number());
    let coll = collection.token().to_ascii_lowercase();
    let mut matches = scene
        .assets
        .iter()
        .filter(|(key, _)| contains_band_token(key, &token));
    let first = matches.next()?;
    let preferred = std::iter::once(first)
        .chain(matches)
        .find(|(key, _)| key.to_ascii_lowercase().contains(&coll))
        .unwrap_or(first);
    Some((preferred.1.clone(), Some(preferred.0.clone())))
}

/// Candidate URLs derived from sibling band assets, deduplicated
pub fn sibling_candidates(scene: &SceneFeature, band: Band, collection: Collection) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for href in scene.assets.values() {
        let (base, file) = match href.rsplit_once('/') {
            Some((base, file)) => (format!("{}/", base), file),
            None => (String::new(), href.as_str()),
        };
        let Some(caps) = SIBLING_RE.captures(file) else {
            continue;
        };
        let prefix = &caps["prefix"];
        let ext = &caps["ext"];
        let mut candidates = vec![format!(
            "{}{}_{}_B{}.{}",
            base,
            prefix,
            collection.token(),
            band.number(),
            ext
        )];
        if caps.name("coll").is_none() {
            candidates.push(format!("{}{}_B{}.{}", base, prefix, band.number(), ext));
        }
        for c in candidates {
            if !out.contains(&c) {
                out.push(c);
            }
        }
    }
    out
}

/// URL following the provider's Collection 2 Level-2 layout:
/// `{host}/collection02/level-2/standard/{sensor}/{year}/{path}/{row}/{product}/{product}_{COLL}_B{n}.TIF`
pub fn synthesize_url(
    data_host: &str,
    scene: &SceneFeature,
    band: Band,
    collection: Collection,
) -> Option<String> {
    let product = scene.product_id();
    let caps = PRODUCT_RE.captures(product)?;
    let sensor = match &caps["sensor"] {
        "C" | "O" => "oli-tirs",
        "E" => "etm",
        _ => "tm",
    };
    Some(format!(
        "{}/collection02/level-2/standard/{}/{}/{:03}/{:03}/{}/{}_{}_B{}.TIF",
        data_host.trim_end_matches('/'),
        sensor,
        scene.date.format("%Y"),
        scene.path,
        scene.row,
        product,
        product,
        collection.token(),
        band.number()
    ))
}

fn first_existing(candidates: Vec<String>, probe: &dyn AssetProbe) -> Found {
    candidates.into_iter().find_map(|url| match probe.exists(&url) {
        Ok(true) => Some((url, None)),
        Ok(false) => None,
        Err(e) => {
            debug!("probe of {} failed: {}", url, e);
            None
        }
    })
}
