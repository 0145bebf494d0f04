//! Shared types and enums used across landsatpro.
//! Includes `Band`, `Collection`, `SpectralIndex`, `Platform` and the
//! `WindowPolicy` applied by coverage selection.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Landsat Collection 2 Level-2 product family.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
pub enum Collection {
    /// Surface reflectance
    SR,
    /// Surface temperature
    ST,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::SR, Collection::ST];

    /// Token used inside provider file names, e.g. `_SR_B4.TIF`
    pub fn token(&self) -> &'static str {
        match self {
            Collection::SR => "SR",
            Collection::ST => "ST",
        }
    }

    /// STAC collection identifier on the catalog service
    pub fn stac_id(&self) -> &'static str {
        match self {
            Collection::SR => "landsat-c2l2-sr",
            Collection::ST => "landsat-c2l2-st",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "SR" => Some(Collection::SR),
            "ST" => Some(Collection::ST),
            _ => None,
        }
    }

    /// Accepts `landsat-c2l2-sr` style identifiers as well as a bare token.
    pub fn from_stac_id(id: &str) -> Option<Self> {
        let lower = id.to_ascii_lowercase();
        if lower.ends_with("-sr") || lower.ends_with("_sr") {
            Some(Collection::SR)
        } else if lower.ends_with("-st") || lower.ends_with("_st") {
            Some(Collection::ST)
        } else {
            Self::from_token(id)
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Landsat 8/9 OLI-TIRS band codes.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Band {
    B1,
    B2,
    B3,
    B4,
    B5,
    B6,
    B7,
    B8,
    B9,
    B10,
    B11,
}

impl Band {
    pub const ALL: [Band; 11] = [
        Band::B1,
        Band::B2,
        Band::B3,
        Band::B4,
        Band::B5,
        Band::B6,
        Band::B7,
        Band::B8,
        Band::B9,
        Band::B10,
        Band::B11,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Band::B1 => 1,
            Band::B2 => 2,
            Band::B3 => 3,
            Band::B4 => 4,
            Band::B5 => 5,
            Band::B6 => 6,
            Band::B7 => 7,
            Band::B8 => 8,
            Band::B9 => 9,
            Band::B10 => 10,
            Band::B11 => 11,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Band::ALL.iter().copied().find(|b| b.number() == n)
    }

    /// Logical code, e.g. `B4`
    pub fn code(&self) -> String {
        format!("B{}", self.number())
    }

    /// Common asset name used by the Landsat STAC catalog, when one exists
    pub fn common_name(&self) -> Option<&'static str> {
        match self {
            Band::B1 => Some("coastal"),
            Band::B2 => Some("blue"),
            Band::B3 => Some("green"),
            Band::B4 => Some("red"),
            Band::B5 => Some("nir08"),
            Band::B6 => Some("swir16"),
            Band::B7 => Some("swir22"),
            Band::B10 => Some("lwir11"),
            Band::B8 | Band::B9 | Band::B11 => None,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.number())
    }
}

impl std::str::FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('B')
            .or_else(|| trimmed.strip_prefix('b'))
            .ok_or_else(|| format!("invalid band code: {}", s))?;
        digits
            .parse::<u8>()
            .ok()
            .and_then(Band::from_number)
            .ok_or_else(|| format!("invalid band code: {}", s))
    }
}

/// Spectral indices derived from clipped bands.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
pub enum SpectralIndex {
    Ndvi,
    Ndwi,
    Ndsi,
    Bsi,
    Lst,
}

impl SpectralIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Ndsi => "NDSI",
            SpectralIndex::Bsi => "BSI",
            SpectralIndex::Lst => "LST",
        }
    }

    pub fn required_bands(&self) -> &'static [Band] {
        match self {
            SpectralIndex::Ndvi => &[Band::B4, Band::B5],
            SpectralIndex::Ndwi => &[Band::B3, Band::B5],
            SpectralIndex::Ndsi => &[Band::B3, Band::B6],
            SpectralIndex::Bsi => &[Band::B2, Band::B4, Band::B5, Band::B6],
            SpectralIndex::Lst => &[Band::B10],
        }
    }

    /// Value range used when rendering previews (LST in degrees Celsius)
    pub fn display_range(&self) -> (f64, f64) {
        match self {
            SpectralIndex::Lst => (0.0, 50.0),
            _ => (-1.0, 1.0),
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
pub enum Platform {
    Landsat5,
    Landsat7,
    Landsat8,
    Landsat9,
}

impl Platform {
    /// Value of the `platform` property on catalog items
    pub fn stac_name(&self) -> &'static str {
        match self {
            Platform::Landsat5 => "LANDSAT_5",
            Platform::Landsat7 => "LANDSAT_7",
            Platform::Landsat8 => "LANDSAT_8",
            Platform::Landsat9 => "LANDSAT_9",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stac_name())
    }
}

/// What coverage selection does with a candidate that would stretch the
/// acquisition window past the configured spread.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default, Serialize, Deserialize,
)]
pub enum WindowPolicy {
    /// End selection at the first out-of-window candidate
    #[default]
    Stop,
    /// Drop the out-of-window candidate and keep scanning
    Skip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_codes_parse_both_cases() {
        assert_eq!("B4".parse::<Band>(), Ok(Band::B4));
        assert_eq!("b10".parse::<Band>(), Ok(Band::B10));
        assert!("B12".parse::<Band>().is_err());
        assert!("red".parse::<Band>().is_err());
        assert_eq!(Band::B11.code(), "B11");
    }

    #[test]
    fn collection_from_stac_id() {
        assert_eq!(Collection::from_stac_id("landsat-c2l2-sr"), Some(Collection::SR));
        assert_eq!(Collection::from_stac_id("landsat-c2l2-st"), Some(Collection::ST));
        assert_eq!(Collection::from_stac_id("st"), Some(Collection::ST));
        assert_eq!(Collection::from_stac_id("landsat-c2l1"), None);
    }

    #[test]
    fn index_band_table() {
        assert_eq!(SpectralIndex::Ndvi.required_bands(), &[Band::B4, Band::B5]);
        assert_eq!(SpectralIndex::Lst.required_bands(), &[Band::B10]);
        assert_eq!(SpectralIndex::Bsi.required_bands().len(), 4);
    }
}
