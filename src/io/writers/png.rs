//! Colour-mapped PNG previews of index rasters.
use std::path::Path;

use image::{Rgba, RgbaImage};
use ndarray::Array2;

use crate::types::SpectralIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    RdYlGn,
    Blues,
    BluesReversed,
    YlOrBr,
    Jet,
}

const RD_YL_GN: &[[u8; 3]] = &[
    [165, 0, 38],
    [215, 48, 39],
    [244, 109, 67],
    [253, 174, 97],
    [254, 224, 139],
    [255, 255, 191],
    [217, 239, 139],
    [166, 217, 106],
    [102, 189, 99],
    [26, 152, 80],
    [0, 104, 55],
];

const BLUES: &[[u8; 3]] = &[
    [247, 251, 255],
    [222, 235, 247],
    [198, 219, 239],
    [158, 202, 225],
    [107, 174, 214],
    [66, 146, 198],
    [33, 113, 181],
    [8, 81, 156],
    [8, 48, 107],
];

const YL_OR_BR: &[[u8; 3]] = &[
    [255, 255, 229],
    [255, 247, 188],
    [254, 227, 145],
    [254, 196, 79],
    [254, 153, 41],
    [236, 112, 20],
    [204, 76, 2],
    [153, 52, 4],
    [102, 37, 6],
];

const JET: &[[u8; 3]] = &[
    [0, 0, 127],
    [0, 0, 255],
    [0, 127, 255],
    [0, 255, 255],
    [127, 255, 127],
    [255, 255, 0],
    [255, 127, 0],
    [255, 0, 0],
    [127, 0, 0],
];

impl Palette {
    pub fn for_index(index: SpectralIndex) -> Self {
        match index {
            SpectralIndex::Ndvi => Palette::RdYlGn,
            SpectralIndex::Ndwi => Palette::Blues,
            SpectralIndex::Ndsi => Palette::BluesReversed,
            SpectralIndex::Bsi => Palette::YlOrBr,
            SpectralIndex::Lst => Palette::Jet,
        }
    }

    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            Palette::RdYlGn => RD_YL_GN,
            Palette::Blues | Palette::BluesReversed => BLUES,
            Palette::YlOrBr => YL_OR_BR,
            Palette::Jet => JET,
        }
    }

    /// Colour for `t` in 0..=1, linearly interpolated between stops
    pub fn color_at(&self, t: f64) -> [u8; 3] {
        let mut t = t.clamp(0.0, 1.0);
        if *self == Palette::BluesReversed {
            t = 1.0 - t;
        }
        let stops = self.stops();
        let scaled = t * (stops.len() - 1) as f64;
        let lo = scaled.floor() as usize;
        let hi = (lo + 1).min(stops.len() - 1);
        let frac = scaled - lo as f64;
        let mut out = [0u8; 3];
        for (i, channel) in out.iter_mut().enumerate() {
            let a = stops[lo][i] as f64;
            let b = stops[hi][i] as f64;
            *channel = (a + (b - a) * frac).round() as u8;
        }
        out
    }
}

/// Render `data` with `palette` over `range`; NaN cells become transparent.
pub fn render_preview(data: &Array2<f64>, palette: Palette, range: (f64, f64)) -> RgbaImage {
    let (rows, cols) = data.dim();
    let span = (range.1 - range.0).max(f64::EPSILON);
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = data[[y as usize, x as usize]];
        if v.is_nan() {
            Rgba([0, 0, 0, 0])
        } else {
            let [r, g, b] = palette.color_at((v - range.0) / span);
            Rgba([r, g, b, 255])
        }
    })
}

pub fn write_preview_png(
    output: &Path,
    data: &Array2<f64>,
    palette: Palette,
    range: (f64, f64),
) -> Result<(), image::ImageError> {
    render_preview(data, palette, range).save(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn palette_endpoints() {
        assert_eq!(Palette::RdYlGn.color_at(0.0), [165, 0, 38]);
        assert_eq!(Palette::RdYlGn.color_at(1.0), [0, 104, 55]);
        assert_eq!(Palette::BluesReversed.color_at(0.0), Palette::Blues.color_at(1.0));
        assert_eq!(Palette::Jet.color_at(5.0), [127, 0, 0]);
    }

    #[test]
    fn nan_cells_are_transparent() {
        let img = render_preview(&array![[f64::NAN, 1.0]], Palette::RdYlGn, (-1.0, 1.0));
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(1, 0).0, [0, 104, 55, 255]);
    }

    #[test]
    fn preview_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lst.png");
        write_preview_png(&path, &array![[10.0, 20.0], [30.0, 40.0]], Palette::Jet, (0.0, 50.0)).unwrap();
        assert!(path.exists());
    }
}
