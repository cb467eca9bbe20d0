//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Elevation grids use `f64`, direction grids `u8`, masks `u8`.
/// Integer types exist mainly so GeoTIFF samples (SRTM tiles are `i16`)
/// can be decoded without a detour.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert from f64, `None` if the value does not fit
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.map_or(false, |nd| *self == nd)
            }

            fn is_float() -> bool {
                false
            }
        }
    )*};
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if !nd.is_nan() => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    _ => false,
                }
            }

            fn is_float() -> bool {
                true
            }
        }
    )*};
}

impl_raster_element_int!(i8, i16, i32, i64, u8, u16, u32, u64);
impl_raster_element_float!(f32, f64);
