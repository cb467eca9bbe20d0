//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for TIFF I/O and reads the handful of GeoTIFF and
//! GDAL tags a DEM tile needs: pixel scale, tiepoint, the EPSG code from the
//! GeoKeyDirectory, and the GDAL no-data string.

use crate::crs::{CrsKind, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Skip the GDAL_NODATA tag even when the raster has a no-data value
    pub omit_nodata: bool,
    /// Tag the file PixelIsPoint and tie the first cell centre instead of its corner
    pub pixel_is_point: bool,
}

/// Read one band of a GeoTIFF file into a Raster
///
/// `band` is 1-indexed and defaults to the first band.
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file), band)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band)
}

macro_rules! cast_samples {
    ($buf:expr) => {
        $buf.iter()
            .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
            .collect()
    };
}

fn decode_geotiff<T, R>(reader: R, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::NoElevationBand(format!("cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions { width: cols, height: rows });
    }

    let result = decoder
        .read_image()
        .map_err(|e| Error::NoElevationBand(format!("cannot read image data: {}", e)))?;

    #[allow(unreachable_patterns)]
    let samples: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_samples!(buf),
        DecodingResult::F64(buf) => cast_samples!(buf),
        DecodingResult::U8(buf) => cast_samples!(buf),
        DecodingResult::U16(buf) => cast_samples!(buf),
        DecodingResult::U32(buf) => cast_samples!(buf),
        DecodingResult::U64(buf) => cast_samples!(buf),
        DecodingResult::I8(buf) => cast_samples!(buf),
        DecodingResult::I16(buf) => cast_samples!(buf),
        DecodingResult::I32(buf) => cast_samples!(buf),
        DecodingResult::I64(buf) => cast_samples!(buf),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF sample format".to_string())),
    };

    let cells = rows * cols;
    if samples.is_empty() || samples.len() % cells != 0 {
        return Err(Error::NoElevationBand(format!(
            "{} samples do not tile a {}x{} grid",
            samples.len(),
            cols,
            rows
        )));
    }

    let bands = samples.len() / cells;
    let band = band.unwrap_or(1);
    if band == 0 || band > bands {
        return Err(Error::NoElevationBand(format!(
            "band {} requested, file has {}",
            band, bands
        )));
    }

    let data = if bands == 1 {
        samples
    } else {
        samples.into_iter().skip(band - 1).step_by(bands).collect()
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    let geokeys = read_geokeys(&mut decoder);
    if let Some(mut transform) = read_geotransform(&mut decoder) {
        // Point rasters tie the cell centre; the grid origin is its corner
        if geokeys.raster_type == Some(RASTER_PIXEL_IS_POINT) {
            transform.origin_x -= transform.pixel_width / 2.0;
            transform.origin_y -= transform.pixel_height / 2.0;
        }
        raster.set_transform(transform);
    }
    raster.set_crs(geokeys.crs);
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

/// GeoTransform from ModelPixelScaleTag + ModelTiepointTag
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];

    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// The GeoKeyDirectory entries a DEM tile needs
#[derive(Debug, Default)]
struct GeoKeys {
    crs: Option<CRS>,
    raster_type: Option<u16>,
}

/// EPSG code and raster type from the GeoKeyDirectory, when stored inline
fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> GeoKeys {
    let keys = match decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) {
        Ok(keys) if keys.len() >= 4 => keys,
        _ => return GeoKeys::default(),
    };
    let count = keys[3] as usize;

    let mut geographic = None;
    let mut projected = None;
    let mut raster_type = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match id {
            GT_RASTER_TYPE_KEY => raster_type = Some(value),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value as u32),
            PROJECTED_CS_TYPE_KEY => projected = Some(value as u32),
            _ => {}
        }
    }

    // User-defined (32767) codes carry no usable EPSG identity
    let crs = match (projected, geographic) {
        (Some(code), _) if code != 32767 => Some(CRS::projected(code)),
        (_, Some(code)) if code != 32767 => Some(CRS::geographic(code)),
        _ => None,
    };
    GeoKeys { crs, raster_type }
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: Read + Seek,
{
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    let value: f64 = text.trim().trim_end_matches('\0').parse().ok()?;
    T::from_f64(value)
}

/// Write a Raster to a GeoTIFF file as 32-bit float samples
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer, &options.unwrap_or_default())?;
    writer.flush()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn geokey_directory(crs: Option<&CRS>, raster_type: u16) -> Vec<u16> {
    let mut entries: Vec<[u16; 4]> = Vec::new();
    let epsg = crs.and_then(|c| c.epsg()).and_then(|code| u16::try_from(code).ok());

    match (crs.map(CRS::kind), epsg) {
        (Some(CrsKind::Geographic), Some(code)) => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, 2]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, raster_type]);
            entries.push([GEOGRAPHIC_TYPE_KEY, 0, 1, code]);
        }
        (Some(CrsKind::Projected), Some(code)) => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, 1]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, raster_type]);
            entries.push([PROJECTED_CS_TYPE_KEY, 0, 1, code]);
        }
        _ => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, 1]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, raster_type]);
        }
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let tiff_err = |what: &str, e: tiff::TiffError| Error::Other(format!("{}: {}", what, e));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("Cannot create TIFF image", e))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| tiff_err("Cannot write scale tag", e))?;

    let (tie_x, tie_y, raster_type) = if options.pixel_is_point {
        let (x, y) = gt.pixel_to_geo(0, 0);
        (x, y, RASTER_PIXEL_IS_POINT)
    } else {
        (gt.origin_x, gt.origin_y, RASTER_PIXEL_IS_AREA)
    };
    let tiepoint = [0.0, 0.0, 0.0, tie_x, tie_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| tiff_err("Cannot write tiepoint tag", e))?;

    let geokeys = geokey_directory(raster.crs(), raster_type);
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| tiff_err("Cannot write geokey tag", e))?;

    if !options.omit_nodata {
        if let Some(nd) = raster.nodata().and_then(|nd| nd.to_f64()) {
            let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
            image
                .encoder()
                .write_tag(Tag::GdalNodata, text.as_str())
                .map_err(|e| tiff_err("Cannot write nodata tag", e))?;
        }
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_err("Cannot write image data", e))?;

    Ok(())
}
