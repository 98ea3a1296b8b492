/* Native GeoTIFF reading and writing without GDAL.

Every band is stored as its own 64-bit float image file directory, georeferenced with
the ModelPixelScale/ModelTiepoint pair and a minimal GeoKey directory. The GDAL nodata
tag is written so GDAL-based tools pick up the fill value.
*/

use crate::{
    encoding::arrays::GeoRaster,
    error::{Result, UrbanError},
    geo::raster::RasterInfo,
};
use ndarray::{Array2, Array3, Axis};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};
use tiff::{
    decoder::{Decoder, DecodingResult},
    encoder::{colortype::Gray64Float, TiffEncoder},
    tags::Tag,
};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

#[inline]
fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn geo_keys(epsg: Option<u32>) -> Vec<u16> {
    let code = epsg.and_then(|e| u16::try_from(e).ok());
    let mut keys: Vec<[u16; 4]> = Vec::with_capacity(3);
    match code {
        Some(4326) => {
            keys.push([GT_MODEL_TYPE, 0, 1, 2]);
            keys.push([GT_RASTER_TYPE, 0, 1, 1]);
            keys.push([GEOGRAPHIC_TYPE, 0, 1, 4326]);
        }
        Some(code) => {
            keys.push([GT_MODEL_TYPE, 0, 1, 1]);
            keys.push([GT_RASTER_TYPE, 0, 1, 1]);
            keys.push([PROJECTED_CS_TYPE, 0, 1, code]);
        }
        None => keys.push([GT_RASTER_TYPE, 0, 1, 1]),
    }

    // header: version 1.1.0 and number of keys
    let mut directory = vec![1, 1, 0, keys.len() as u16];
    directory.extend(keys.into_iter().flatten());
    directory
}

fn epsg_from_keys(directory: &[u16]) -> Option<u32> {
    directory
        .get(4..)?
        .chunks_exact(4)
        .find(|key| (key[0] == GEOGRAPHIC_TYPE || key[0] == PROJECTED_CS_TYPE) && key[1] == 0)
        .map(|key| u32::from(key[3]))
}

fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        String::from("nan")
    } else {
        format!("{nodata}")
    }
}

pub fn write_geotiff(path: &Path, raster: &GeoRaster) -> Result<()> {
    let file = File::create(path).map_err(|e| UrbanError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(&mut writer, raster).map_err(|e| UrbanError::raster(path, e))?;
    writer.flush().map_err(|e| UrbanError::io(path, e))
}

fn encode_geotiff<W: Write + Seek>(writer: W, raster: &GeoRaster) -> std::result::Result<(), tiff::TiffError> {
    let mut encoder = TiffEncoder::new(writer)?;
    let info = &raster.info;

    let scale = [info.xres, info.yres, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, info.xmin, info.ymax, 0.0];
    let keys = geo_keys(info.epsg);
    let nodata = raster.nodata.map(format_nodata);

    for band in raster.data.axis_iter(Axis(0)) {
        let data: Vec<f64> = band.iter().copied().collect();
        let mut image = encoder.new_image::<Gray64Float>(info.ncols as u32, info.nrows as u32)?;

        image.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
        image.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
        image.encoder().write_tag(tag(GEO_KEY_DIRECTORY), keys.as_slice())?;
        if let Some(nodata) = &nodata {
            image.encoder().write_tag(tag(GDAL_NODATA), nodata.as_str())?;
        }

        image.write_data(&data)?;
    }
    Ok(())
}

pub fn read_geotiff(path: &Path) -> Result<GeoRaster> {
    let file = File::open(path).map_err(|e| UrbanError::io(path, e))?;
    decode_geotiff(BufReader::new(file)).map_err(|e| match e {
        DecodeError::Tiff(err) => UrbanError::raster(path, err),
        DecodeError::Layout(msg) => UrbanError::raster(path, msg),
    })
}

enum DecodeError {
    Tiff(tiff::TiffError),
    Layout(String),
}

impl From<tiff::TiffError> for DecodeError {
    fn from(e: tiff::TiffError) -> Self {
        DecodeError::Tiff(e)
    }
}

fn decoding_to_f64(result: DecodingResult) -> std::result::Result<Vec<f64>, DecodeError> {
    let data = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => return Err(DecodeError::Layout(String::from("unsupported sample format"))),
    };
    Ok(data)
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> std::result::Result<GeoRaster, DecodeError> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (cols, rows) = (width as usize, height as usize);

    // georeferencing lives on the first directory
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();
    let epsg = decoder
        .get_tag_u16_vec(tag(GEO_KEY_DIRECTORY))
        .ok()
        .and_then(|keys| epsg_from_keys(&keys));
    let nodata = decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    let (scale, tiepoint) = match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => (s, t),
        _ => return Err(DecodeError::Layout(String::from("missing ModelPixelScale/ModelTiepoint tags"))),
    };
    let xmin = tiepoint[3] - tiepoint[0] * scale[0];
    let ymax = tiepoint[4] + tiepoint[1] * scale[1];
    let gt = [xmin, scale[0], 0.0, ymax, 0.0, -scale[1]];
    let info = RasterInfo::from_geo_transform(&gt, cols, rows, epsg);

    let mut bands: Vec<Array2<f64>> = Vec::new();
    loop {
        let (w, h) = decoder.dimensions()?;
        if (w as usize, h as usize) != (cols, rows) {
            return Err(DecodeError::Layout(format!(
                "band {} is {w}x{h}, expected {cols}x{rows}",
                bands.len() + 1
            )));
        }
        let data = decoding_to_f64(decoder.read_image()?)?;
        let band = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| DecodeError::Layout(format!("cannot shape band: {e}")))?;
        bands.push(band);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let views: Vec<_> = bands.iter().map(|b| b.view()).collect();
    let data: Array3<f64> = ndarray::stack(Axis(0), &views)
        .map_err(|e| DecodeError::Layout(format!("cannot stack bands: {e}")))?;

    Ok(GeoRaster::new(data, info, nodata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn write_read_keeps_georeferencing_and_bands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.tif");

        let info = RasterInfo::from_extent(113.0, 21.0, 113.5, 22.0, 0.25, 0.25, Some(4326));
        let data = Array3::from_shape_fn((3, 4, 2), |(b, r, c)| (b * 100 + r * 10 + c) as f64);
        let mut raster = GeoRaster::new(data, info.clone(), Some(f64::NAN));
        raster.data[[1, 2, 1]] = f64::NAN;

        write_geotiff(&path, &raster).unwrap();
        let back = read_geotiff(&path).unwrap();

        assert_eq!(back.data.shape(), &[3, 4, 2]);
        assert_eq!(back.info.epsg, Some(4326));
        assert_relative_eq!(back.info.xmin, 113.0);
        assert_relative_eq!(back.info.ymax, 22.0);
        assert_relative_eq!(back.info.yres, 0.25);
        assert!(back.nodata.unwrap().is_nan());
        assert!(back.data[[1, 2, 1]].is_nan());
        assert_eq!(back.data[[2, 3, 1]], 231.0);
    }

    #[test]
    fn projected_epsg_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utm.tif");
        let info = RasterInfo::from_extent(0.0, 0.0, 30.0, 30.0, 30.0, 30.0, Some(32650));
        let raster = GeoRaster::from_band(array![[1.0]], info, Some(-9999.0));

        write_geotiff(&path, &raster).unwrap();
        let back = read_geotiff(&path).unwrap();
        assert_eq!(back.info.epsg, Some(32650));
        assert_eq!(back.nodata, Some(-9999.0));
    }

    #[test]
    fn key_directory_round_trip() {
        assert_eq!(epsg_from_keys(&geo_keys(Some(4326))), Some(4326));
        assert_eq!(epsg_from_keys(&geo_keys(Some(32750))), Some(32750));
        assert_eq!(epsg_from_keys(&geo_keys(None)), None);
    }
}
