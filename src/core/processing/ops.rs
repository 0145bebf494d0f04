use ndarray::{Array2, Zip};

use crate::core::model::IndexStats;
use crate::core::params::LstConstants;

pub const EPSILON: f64 = 1e-10;

/// Normalized difference: (a - b) / (a + b + eps); NaN propagates
pub fn normalized_diff(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let mut result = Array2::zeros(a.dim());
    Zip::from(a).and(b).and(&mut result).par_for_each(|a_val, b_val, res| {
        *res = (a_val - b_val) / (a_val + b_val + EPSILON);
    });
    result
}

/// Bare soil index: ((swir + red) - (nir + blue)) / ((swir + red) + (nir + blue) + eps)
pub fn bare_soil(
    blue: &Array2<f64>,
    red: &Array2<f64>,
    nir: &Array2<f64>,
    swir: &Array2<f64>,
) -> Array2<f64> {
    let mut result = Array2::zeros(blue.dim());
    Zip::from(&mut result)
        .and(blue)
        .and(red)
        .and(nir)
        .and(swir)
        .par_for_each(|res, b, r, n, s| {
            let soil = s + r;
            let veg = n + b;
            *res = (soil - veg) / (soil + veg + EPSILON);
        });
    result
}

/// Brightness temperature in degrees Celsius from thermal DN
pub fn land_surface_temperature(thermal: &Array2<f64>, constants: &LstConstants) -> Array2<f64> {
    thermal.mapv(|dn| {
        let radiance = dn * constants.dn_scale;
        constants.k2 / (constants.k1 / (radiance + EPSILON) + 1.0).ln() - 273.15
    })
}

/// Replace the nodata sentinel with NaN
pub fn mask_nodata(data: &Array2<f64>, nodata: f64) -> Array2<f64> {
    data.mapv(|v| if v == nodata { f64::NAN } else { v })
}

/// min/max/mean/population std over finite values; `None` when there are none
pub fn finite_stats(data: &Array2<f64>) -> Option<IndexStats> {
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in data.iter().filter(|v| v.is_finite()) {
        count += 1;
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    let var = data
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    Some(IndexStats {
        min,
        max,
        mean,
        std: var.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn normalized_diff_is_bounded_and_zero_safe() {
        let nir = array![[0.5, 0.0, 10.0]];
        let red = array![[0.1, 0.0, 0.0]];
        let out = normalized_diff(&nir, &red);
        assert!((out[[0, 0]] - 0.4 / 0.6).abs() < 1e-9);
        assert_eq!(out[[0, 1]], 0.0);
        assert!((out[[0, 2]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn nan_propagates_through_kernels() {
        let a = array![[f64::NAN, 2.0]];
        let b = array![[1.0, 1.0]];
        let out = normalized_diff(&a, &b);
        assert!(out[[0, 0]].is_nan());
        assert!(out[[0, 1]].is_finite());
    }

    #[test]
    fn bare_soil_matches_formula() {
        let one = array![[1.0]];
        let out = bare_soil(&one, &array![[3.0]], &array![[2.0]], &array![[4.0]]);
        // ((4 + 3) - (2 + 1)) / ((4 + 3) + (2 + 1))
        assert!((out[[0, 0]] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn lst_is_plausible_for_typical_dn() {
        let dn = array![[100.0]];
        let out = land_surface_temperature(&dn, &LstConstants::default());
        let expected = 1321.0789 / (774.8853 / 10.0 + 1.0_f64).ln() - 273.15;
        assert!((out[[0, 0]] - expected).abs() < 1e-9);
        assert!(out[[0, 0]] > -50.0 && out[[0, 0]] < 60.0);
    }

    #[test]
    fn stats_skip_nan() {
        let data = array![[1.0, f64::NAN], [3.0, 2.0]];
        let s = finite_stats(&mask_nodata(&data, 2.0)).unwrap();
        assert_eq!((s.min, s.max, s.mean), (1.0, 3.0, 2.0));
        assert!((s.std - 1.0).abs() < 1e-12);
        assert!(finite_stats(&array![[f64::NAN]]).is_none());
    }
}
