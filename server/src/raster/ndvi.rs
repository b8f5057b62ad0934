//! Normalized difference vegetation index

/// Guard added to the denominator when indexing per pixel
pub const NDVI_EPSILON: f32 = 1e-6;

/// `(nir - red) / (nir + red + eps)`
pub fn ndvi(red: f32, nir: f32) -> f32 {
    (nir - red) / (nir + red + NDVI_EPSILON)
}

/// Exact NDVI clamped to `[-1, 1]`; NaN where `nir + red == 0` or an input
/// is not finite.
pub fn ndvi_clamped(red: f32, nir: f32) -> f32 {
    let sum = nir + red;
    if !sum.is_finite() || sum == 0.0 {
        return f32::NAN;
    }
    ((nir - red) / sum).clamp(-1.0, 1.0)
}

/// Per-pixel clamped NDVI over two equally sized bands
pub fn ndvi_raster(red: &[f32], nir: &[f32]) -> Vec<f32> {
    red.iter()
        .zip(nir)
        .map(|(&r, &n)| ndvi_clamped(r, n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndvi_values() {
        assert!((ndvi(0.1, 0.5) - 0.4 / 0.6).abs() < 1e-5);
        assert!(ndvi(0.5, 0.1) < 0.0);
        assert_eq!(ndvi(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_ndvi_clamped() {
        assert!(ndvi_clamped(0.0, 0.0).is_nan());
        assert!(ndvi_clamped(f32::NAN, 1.0).is_nan());
        assert_eq!(ndvi_clamped(0.0, 5.0), 1.0);
        // negative reflectance can push the ratio outside [-1, 1]
        assert_eq!(ndvi_clamped(-3.0, 1.0), -1.0);
    }

    #[test]
    fn test_ndvi_raster() {
        let out = ndvi_raster(&[1.0, 0.0, 2.0], &[3.0, 0.0, 2.0]);
        assert_eq!(out[0], 0.5);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 0.0);
    }
}
