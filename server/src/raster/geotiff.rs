//! GeoTIFF reading and writing
//!
//! Georeferencing is taken from the ModelPixelScale + ModelTiepoint pair or
//! from a non-rotated ModelTransformation matrix; the CRS comes from the
//! GeoKey directory. Pixels are decoded to `f32` whatever the sample type.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{debug, warn};

use super::projection::Crs;
use super::types::{GeoRaster, GeoTransform, RasterError};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Parsed GeoKey directory as `(key, value)` pairs for short-valued keys
fn parse_geo_keys(directory: &[u16]) -> Vec<(u16, u16)> {
    let count = directory.get(3).copied().unwrap_or(0) as usize;
    directory
        .get(4..)
        .unwrap_or(&[])
        .chunks_exact(4)
        .take(count)
        // location 0 means the value is stored inline
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn geo_key(keys: &[(u16, u16)], key: u16) -> Option<u16> {
    keys.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn crs_from_keys(keys: &[(u16, u16)]) -> Result<Crs, RasterError> {
    if let Some(code) = geo_key(keys, KEY_PROJECTED_CS_TYPE) {
        return Crs::from_epsg(u32::from(code));
    }
    if let Some(code) = geo_key(keys, KEY_GEOGRAPHIC_TYPE) {
        return Crs::from_epsg(u32::from(code));
    }
    match geo_key(keys, KEY_MODEL_TYPE) {
        Some(MODEL_TYPE_PROJECTED) => Err(RasterError::UnsupportedCrs(
            "projected CRS without an EPSG code".to_string(),
        )),
        Some(MODEL_TYPE_GEOGRAPHIC) => Ok(Crs::Geographic),
        _ => {
            warn!("GeoTIFF has no CRS keys, assuming EPSG:4326");
            Ok(Crs::Geographic)
        }
    }
}

fn decoded_to_f32(result: DecodingResult) -> Result<Vec<f32>, RasterError> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RasterError::UnsupportedLayout(
                "unsupported sample format".to_string(),
            ));
        }
    })
}

fn samples_per_pixel(colortype: ColorType) -> Result<usize, RasterError> {
    match colortype {
        ColorType::Gray(_) => Ok(1),
        ColorType::GrayA(_) => Ok(2),
        ColorType::RGB(_) => Ok(3),
        ColorType::RGBA(_) | ColorType::CMYK(_) => Ok(4),
        ColorType::Multiband { num_samples, .. } => Ok(usize::from(num_samples)),
        other => Err(RasterError::UnsupportedLayout(format!(
            "color type {:?}",
            other
        ))),
    }
}

/// Read a (multi-band, chunky) GeoTIFF into memory
pub fn read_geotiff(path: &Path) -> Result<GeoRaster, RasterError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    let samples = samples_per_pixel(decoder.colortype()?)?;

    let planar = decoder
        .find_tag(Tag::PlanarConfiguration)?
        .map(|v| v.into_u16())
        .transpose()?;
    if samples > 1 && planar == Some(2) {
        return Err(RasterError::UnsupportedLayout(
            "planar (band-separate) sample layout".to_string(),
        ));
    }

    let keys = decoder
        .find_tag(tag(TAG_GEO_KEY_DIRECTORY))?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .map(|dir| parse_geo_keys(&dir))
        .unwrap_or_default();
    let crs = crs_from_keys(&keys)?;

    let mut transform = read_transform(&mut decoder)?;
    if geo_key(&keys, KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        // tiepoints address pixel centers
        transform.origin_x -= transform.pixel_width / 2.0;
        transform.origin_y += transform.pixel_height / 2.0;
    }

    let nodata = decoder
        .find_tag(tag(TAG_GDAL_NODATA))?
        .map(|v| v.into_string())
        .transpose()?
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f32>().ok());

    let data = decoded_to_f32(decoder.read_image()?)?;
    if data.len() != width * height * samples {
        return Err(RasterError::ShapeMismatch(format!(
            "expected {} samples, decoded {}",
            width * height * samples,
            data.len()
        )));
    }

    let bands = (0..samples)
        .map(|b| data.iter().skip(b).step_by(samples).copied().collect())
        .collect();

    debug!(
        "Read {:?}: {}x{} px, {} band(s), {}",
        path, width, height, samples, crs
    );

    Ok(GeoRaster {
        width,
        height,
        bands,
        transform,
        crs,
        nodata,
    })
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform, RasterError> {
    let scale = decoder
        .find_tag(tag(TAG_MODEL_PIXEL_SCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(tag(TAG_MODEL_TIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    if let (Some(scale), Some(tie)) = (scale, tiepoint)
        && scale.len() >= 2
        && tie.len() >= 6
    {
        let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
        return Ok(GeoTransform {
            origin_x: x - i * scale[0],
            origin_y: y + j * scale[1],
            pixel_width: scale[0],
            pixel_height: scale[1],
        });
    }

    let matrix = decoder
        .find_tag(tag(TAG_MODEL_TRANSFORMATION))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    match matrix {
        Some(m) if m.len() >= 8 => {
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(RasterError::UnsupportedLayout(
                    "rotated model transformation".to_string(),
                ));
            }
            Ok(GeoTransform {
                origin_x: m[3],
                origin_y: m[7],
                pixel_width: m[0],
                pixel_height: -m[5],
            })
        }
        _ => Err(RasterError::MissingGeoreference(
            "no ModelPixelScale/ModelTiepoint or ModelTransformation tags".to_string(),
        )),
    }
}

/// GeoKey directory for a CRS, pixel-is-area
fn geo_key_directory(crs: Crs) -> Vec<u16> {
    let epsg = crs.epsg() as u16;
    match crs {
        Crs::Geographic => vec![
            1, 1, 0, 3,
            KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC,
            KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            KEY_GEOGRAPHIC_TYPE, 0, 1, epsg,
        ],
        Crs::Utm { .. } => vec![
            1, 1, 0, 3,
            KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
            KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            KEY_PROJECTED_CS_TYPE, 0, 1, epsg,
        ],
    }
}

/// Write a single-band `f32` GeoTIFF; NaN marks nodata.
pub fn write_geotiff_f32(
    path: &Path,
    width: usize,
    height: usize,
    data: &[f32],
    transform: &GeoTransform,
    crs: Crs,
) -> Result<(), RasterError> {
    if data.len() != width * height {
        return Err(RasterError::ShapeMismatch(format!(
            "{}x{} raster with {} values",
            width,
            height,
            data.len()
        )));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;

    let scale = [transform.pixel_width, transform.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    let keys = geo_key_directory(crs);
    image
        .encoder()
        .write_tag(tag(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
    image
        .encoder()
        .write_tag(tag(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
    image
        .encoder()
        .write_tag(tag(TAG_GEO_KEY_DIRECTORY), &keys[..])?;
    image.encoder().write_tag(tag(TAG_GDAL_NODATA), "nan")?;
    image.write_data(data)?;

    debug!("Wrote {:?}: {}x{} px, {}", path, width, height, crs);
    Ok(())
}
