//! Mapping from requested indices to the bands, and the collection each
//! band is published in.
use std::collections::BTreeMap;

use crate::types::{Band, Collection, SpectralIndex};

/// Collection a band is distributed in. Thermal bands come from ST.
pub fn collection_for_band(band: Band) -> Collection {
    match band {
        Band::B10 | Band::B11 => Collection::ST,
        _ => Collection::SR,
    }
}

/// Bands a run must fetch, each tagged with its collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandRequirement {
    bands: BTreeMap<Band, Collection>,
}

impl BandRequirement {
    pub fn from_indices(indices: &[SpectralIndex]) -> Self {
        let bands = indices
            .iter()
            .flat_map(|i| i.required_bands().iter().copied())
            .map(|b| (b, collection_for_band(b)))
            .collect();
        Self { bands }
    }

    pub fn from_bands<I: IntoIterator<Item = Band>>(bands: I) -> Self {
        Self {
            bands: bands
                .into_iter()
                .map(|b| (b, collection_for_band(b)))
                .collect(),
        }
    }

    pub fn collection_for(&self, band: Band) -> Option<Collection> {
        self.bands.get(&band).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, Collection)> + '_ {
        self.bands.iter().map(|(b, c)| (*b, *c))
    }

    pub fn bands(&self) -> Vec<Band> {
        self.bands.keys().copied().collect()
    }

    pub fn bands_in(&self, collection: Collection) -> Vec<Band> {
        self.iter()
            .filter(|(_, c)| *c == collection)
            .map(|(b, _)| b)
            .collect()
    }

    pub fn needs(&self, collection: Collection) -> bool {
        self.bands.values().any(|c| *c == collection)
    }

    /// True when bands come from more than one collection
    pub fn is_mixed(&self) -> bool {
        self.needs(Collection::SR) && self.needs(Collection::ST)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_of_index_bands() {
        let req = BandRequirement::from_indices(&[SpectralIndex::Ndvi, SpectralIndex::Bsi]);
        assert_eq!(req.bands(), vec![Band::B2, Band::B4, Band::B5, Band::B6]);
        assert!(!req.is_mixed());
        assert!(!req.needs(Collection::ST));
    }

    #[test]
    fn thermal_band_comes_from_st() {
        let req = BandRequirement::from_indices(&[SpectralIndex::Ndvi, SpectralIndex::Lst]);
        assert_eq!(req.collection_for(Band::B10), Some(Collection::ST));
        assert_eq!(req.collection_for(Band::B4), Some(Collection::SR));
        assert!(req.is_mixed());
        assert_eq!(req.bands_in(Collection::ST), vec![Band::B10]);
        assert_eq!(req.len(), 3);
    }
}
