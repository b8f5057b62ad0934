//! Coordinate reference systems understood by the GeoTIFF reader
//!
//! Geographic WGS84 (EPSG:4326) and the WGS84 UTM zones (EPSG:326xx north,
//! EPSG:327xx south). UTM uses the Krüger series to third order in `n`,
//! which is accurate to well under a millimetre inside a zone.

use std::fmt;

use super::types::RasterError;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Coordinate reference system of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, x = longitude, y = latitude
    Geographic,
    /// WGS84 / UTM zone
    Utm { zone: u8, north: bool },
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self, RasterError> {
        match code {
            4326 => Ok(Crs::Geographic),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(RasterError::UnsupportedCrs(format!("EPSG:{}", other))),
        }
    }

    pub fn epsg(&self) -> u32 {
        match *self {
            Crs::Geographic => 4326,
            Crs::Utm { zone, north: true } => 32600 + u32::from(zone),
            Crs::Utm { zone, north: false } => 32700 + u32::from(zone),
        }
    }

    /// Project `(x, y)` in this CRS to `(lng, lat)` degrees
    pub fn to_lnglat(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Crs::Geographic => (x, y),
            Crs::Utm { zone, north } => utm_inverse(zone, north, x, y),
        }
    }

    /// Project `(lng, lat)` degrees into this CRS
    pub fn from_lnglat(&self, lng: f64, lat: f64) -> (f64, f64) {
        match *self {
            Crs::Geographic => (lng, lat),
            Crs::Utm { zone, north } => utm_forward(zone, north, lng, lat),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Krüger series coefficients
struct Series {
    a_rect: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

fn series() -> Series {
    let n = WGS84_F / (2.0 - WGS84_F);
    let (n2, n3) = (n * n, n * n * n);
    Series {
        a_rect: WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
    }
}

fn central_meridian(zone: u8) -> f64 {
    (f64::from(zone) * 6.0 - 183.0).to_radians()
}

/// UTM zone number containing a longitude
pub fn utm_zone_for(lng: f64) -> u8 {
    (((lng + 180.0) / 6.0).floor() as i64).clamp(0, 59) as u8 + 1
}

fn utm_forward(zone: u8, north: bool, lng: f64, lat: f64) -> (f64, f64) {
    let s = series();
    let n = WGS84_F / (2.0 - WGS84_F);
    let phi = lat.to_radians();
    let dlam = lng.to_radians() - central_meridian(zone);

    let c = 2.0 * n.sqrt() / (1.0 + n);
    let t = (phi.sin().atanh() - c * (c * phi.sin()).atanh()).sinh();
    let xi_p = t.atan2(dlam.cos());
    let eta_p = (dlam.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_p;
    let mut eta = eta_p;
    for (j, alpha) in s.alpha.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
        eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
    }

    let easting = UTM_FALSE_EASTING + UTM_K0 * s.a_rect * eta;
    let northing = UTM_K0 * s.a_rect * xi
        + if north {
            0.0
        } else {
            UTM_FALSE_NORTHING_SOUTH
        };
    (easting, northing)
}

fn utm_inverse(zone: u8, north: bool, easting: f64, northing: f64) -> (f64, f64) {
    let s = series();
    let n0 = if north {
        0.0
    } else {
        UTM_FALSE_NORTHING_SOUTH
    };
    let xi = (northing - n0) / (UTM_K0 * s.a_rect);
    let eta = (easting - UTM_FALSE_EASTING) / (UTM_K0 * s.a_rect);

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, beta) in s.beta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
        eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut phi = chi;
    for (j, delta) in s.delta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        phi += delta * (k * chi).sin();
    }
    let lam = central_meridian(zone) + eta_p.sinh().atan2(xi_p.cos());

    (lam.to_degrees(), phi.to_degrees())
}
