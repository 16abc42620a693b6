//! `GeoTIFF` reading and writing.
//!
//! Only the subset of `GeoTIFF` needed for flood rasters is handled:
//!
//! * bands stored either as interleaved samples of one image or as
//!   successive single-sample pages
//! * georeferencing from `ModelTransformationTag`, or from
//!   `ModelTiepointTag` + `ModelPixelScaleTag`
//! * the CRS from the `GeoKeyDirectoryTag` (`ProjectedCSTypeGeoKey`, then
//!   `GeographicTypeGeoKey`)
//! * the nodata value from GDAL's `GDAL_NODATA` ASCII tag

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;

use flood_impact_geography::crs::is_geographic;
use flood_impact_geography_models::Crs;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::{AffineTransform, Grid, Raster, RasterError};

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Reads a `GeoTIFF` into a [`Raster`].
///
/// # Errors
///
/// * [`RasterError::Io`] / [`RasterError::Tiff`] if the file cannot be
///   opened or decoded
/// * [`RasterError::MissingGeoreference`] if the transform or CRS tags are
///   absent
/// * [`RasterError::Unsupported`] for color layouts that cannot be split
///   into bands
pub fn read_geotiff(path: &Path) -> Result<Raster, RasterError> {
    let file = File::open(path)?;
    let raster = decode(BufReader::new(file))?;

    log::info!(
        "Read {} ({}x{}, {} bands, {})",
        path.display(),
        raster.width(),
        raster.height(),
        raster.band_count(),
        raster.crs()
    );

    Ok(raster)
}

fn decode<R: Read + Seek>(reader: R) -> Result<Raster, RasterError> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let transform = read_transform(&mut decoder)?;
    let crs = read_crs(&mut decoder)?;
    let nodata = read_nodata(&mut decoder)?;

    let (width, height) = dimensions(&mut decoder)?;
    let samples = samples_per_pixel(decoder.colortype()?)?;
    let data = to_f32(decoder.read_image()?);

    let mut bands = deinterleave(&data, width, height, samples)?;

    if samples == 1 {
        while decoder.more_images() {
            decoder.next_image()?;

            let page_shape = dimensions(&mut decoder)?;
            if page_shape != (width, height) {
                log::warn!(
                    "Ignoring trailing TIFF page with shape {page_shape:?} (expected {:?})",
                    (width, height)
                );
                break;
            }
            if samples_per_pixel(decoder.colortype()?)? != 1 {
                log::warn!("Ignoring trailing multi-sample TIFF page");
                break;
            }

            let data = to_f32(decoder.read_image()?);
            bands.push(Grid::from_vec(width, height, data)?);
        }
    }

    Raster::new(bands, transform, crs, nodata)
}

fn dimensions<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(usize, usize), RasterError> {
    let (width, height) = decoder.dimensions()?;
    Ok((width as usize, height as usize))
}

fn samples_per_pixel(color: ColorType) -> Result<usize, RasterError> {
    Ok(match color {
        ColorType::Gray(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) => 4,
        ColorType::Multiband { num_samples, .. } => usize::from(num_samples),
        other => {
            return Err(RasterError::Unsupported {
                message: format!("color type {other:?}"),
            });
        }
    })
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    unreachable_patterns
)]
fn to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => Vec::new(),
    }
}

fn deinterleave(
    data: &[f32],
    width: usize,
    height: usize,
    samples: usize,
) -> Result<Vec<Grid<f32>>, RasterError> {
    let pixels = width * height;
    if data.len() != pixels * samples {
        return Err(RasterError::Unsupported {
            message: format!(
                "decoded {} samples for a {width}x{height} image with {samples} samples per pixel",
                data.len()
            ),
        });
    }

    if samples == 1 {
        return Ok(vec![Grid::from_vec(width, height, data.to_vec())?]);
    }

    (0..samples)
        .map(|band| {
            let cells = data.iter().skip(band).step_by(samples).copied().collect();
            Grid::from_vec(width, height, cells)
        })
        .collect()
}

fn optional_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<f64>>, RasterError> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Result<AffineTransform, RasterError> {
    if let Some(m) = optional_f64s(decoder, Tag::ModelTransformationTag)? {
        if m.len() < 8 {
            return Err(RasterError::MissingGeoreference {
                message: format!("ModelTransformationTag has {} values", m.len()),
            });
        }
        return Ok(AffineTransform::new(m[0], m[1], m[3], m[4], m[5], m[7]));
    }

    let tiepoint = optional_f64s(decoder, Tag::ModelTiepointTag)?;
    let scale = optional_f64s(decoder, Tag::ModelPixelScaleTag)?;

    match (tiepoint, scale) {
        (Some(tp), Some(scale)) if tp.len() >= 6 && scale.len() >= 2 => {
            let (i, j, x, y) = (tp[0], tp[1], tp[3], tp[4]);
            let (sx, sy) = (scale[0], scale[1]);
            Ok(AffineTransform::new(
                sx,
                0.0,
                i.mul_add(-sx, x),
                0.0,
                -sy,
                j.mul_add(sy, y),
            ))
        }
        _ => Err(RasterError::MissingGeoreference {
            message: "no ModelTransformationTag or ModelTiepointTag/ModelPixelScaleTag".to_string(),
        }),
    }
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Crs, RasterError> {
    let Some(keys) = decoder.find_tag(Tag::GeoKeyDirectoryTag)? else {
        return Err(RasterError::MissingGeoreference {
            message: "no GeoKeyDirectoryTag".to_string(),
        });
    };

    epsg_from_geokeys(&keys.into_u16_vec()?)
        .map(Crs::from_epsg)
        .ok_or_else(|| RasterError::MissingGeoreference {
            message: "GeoKeyDirectory has no EPSG-coded CRS".to_string(),
        })
}

/// Finds the EPSG code in a `GeoKeyDirectoryTag` value, preferring the
/// projected CRS over the geographic one.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let count = usize::from(*keys.get(3)?);
    let mut geographic = None;

    for entry in keys.get(4..)?.chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        // Values stored in other tags (double/ascii params) never carry a code.
        if location != 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE => return Some(value),
            GEOGRAPHIC_TYPE => geographic = Some(value),
            _ => {}
        }
    }

    geographic
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f32>, RasterError> {
    let Some(value) = decoder.find_tag(Tag::GdalNodata)? else {
        return Ok(None);
    };

    let text = value.into_string()?;
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match text.parse::<f32>() {
        Ok(nodata) => Ok(Some(nodata)),
        Err(_) => {
            log::warn!("Ignoring unparseable GDAL_NODATA value {text:?}");
            Ok(None)
        }
    }
}

/// Writes a raster as a float32 `GeoTIFF`, one page per band.
///
/// # Errors
///
/// Returns [`RasterError::Io`] / [`RasterError::Tiff`] on write failures,
/// or [`RasterError::Unsupported`] if the raster is too large for TIFF.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<(), RasterError> {
    let too_large = |_| RasterError::Unsupported {
        message: format!("{}x{} exceeds TIFF limits", raster.width(), raster.height()),
    };
    let width = u32::try_from(raster.width()).map_err(too_large)?;
    let height = u32::try_from(raster.height()).map_err(too_large)?;

    let geokeys = geokey_directory(raster.crs());
    let t = raster.transform();
    let nodata = raster.nodata().map(|v| v.to_string());

    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;

    for band in raster.bands() {
        let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;

        if t.is_rectilinear() {
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, &[t.a, -t.e, 0.0][..])?;
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, t.c, t.f, 0.0][..])?;
        } else {
            let matrix = [
                t.a, t.b, 0.0, t.c, //
                t.d, t.e, 0.0, t.f, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ];
            image
                .encoder()
                .write_tag(Tag::ModelTransformationTag, &matrix[..])?;
        }

        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;

        if let Some(nodata) = &nodata {
            image.encoder().write_tag(Tag::GdalNodata, nodata.as_str())?;
        }

        image.write_data(band.cells())?;
    }

    log::info!(
        "Wrote {} ({}x{}, {} bands)",
        path.display(),
        width,
        height,
        raster.band_count()
    );

    Ok(())
}

fn geokey_directory(crs: Crs) -> Vec<u16> {
    let geographic = is_geographic(crs).unwrap_or_else(|e| {
        log::warn!("Cannot classify {crs} ({e}), tagging it as projected");
        false
    });

    let (model_type, crs_key) = if geographic {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };

    vec![
        1, 1, 0, 3, //
        GT_MODEL_TYPE, 0, 1, model_type, //
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA, //
        crs_key, 0, 1, crs.epsg(),
    ]
}
