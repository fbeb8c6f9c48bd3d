use crate::types::{EspaError, EspaResult, RasterData};
use gdal::raster::{GdalDataType, GdalType, RasterBand};
use gdal::Dataset;
use ndarray::Array2;
use std::path::Path;

/// Read the first raster band of an image file into a 2D array.
///
/// The array element type follows the band's pixel type in the file.
pub fn read_image<P: AsRef<Path>>(path: P) -> EspaResult<RasterData> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EspaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Image file not found: {}", path.display()),
        )));
    }

    log::debug!("Reading image: {}", path.display());
    let dataset = Dataset::open(path)?;

    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count();
    log::debug!("Image dimensions: {} x {}, bands: {}", width, height, band_count);

    if band_count < 1 {
        return Err(EspaError::InvalidFormat(format!(
            "No raster bands in {}",
            path.display()
        )));
    }

    let band = dataset.rasterband(1)?;
    let data = match band.band_type() {
        GdalDataType::UInt8 => RasterData::U8(read_band(&band, width, height)?),
        GdalDataType::UInt16 => RasterData::U16(read_band(&band, width, height)?),
        GdalDataType::Int16 => RasterData::I16(read_band(&band, width, height)?),
        GdalDataType::UInt32 => RasterData::U32(read_band(&band, width, height)?),
        GdalDataType::Int32 => RasterData::I32(read_band(&band, width, height)?),
        GdalDataType::Float32 => RasterData::F32(read_band(&band, width, height)?),
        GdalDataType::Float64 => RasterData::F64(read_band(&band, width, height)?),
        other => {
            return Err(EspaError::InvalidFormat(format!(
                "Unsupported pixel type {:?} in {}",
                other,
                path.display()
            )))
        }
    };

    Ok(data)
}

fn read_band<T: GdalType + Copy>(
    band: &RasterBand,
    width: usize,
    height: usize,
) -> EspaResult<Array2<T>> {
    let window = (0, 0);
    let window_size = (width, height);
    let buffer = band.read_as::<T>(window, window_size, window_size, None)?;

    Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| EspaError::InvalidFormat(format!("Failed to reshape band data: {}", e)))
}
