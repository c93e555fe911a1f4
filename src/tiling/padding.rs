use ndarray::{s, Array, Array3, ArrayView3, Axis, Dimension, Slice};
use num_traits::Zero;

use crate::errors::{Result, SegError};

/// Rows and columns of zero fill appended at the bottom/right of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingSpec {
    pub pad_height: usize,
    pub pad_width: usize,
}

impl PaddingSpec {
    /// Padding needed to bring `height × width` up to multiples of `tile_size`.
    ///
    /// A dimension that is already aligned gets zero padding, never a whole tile.
    pub fn for_dimensions(height: usize, width: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(SegError::validation("tile_size", "must be greater than zero"));
        }

        Ok(Self {
            pad_height: (tile_size - height % tile_size) % tile_size,
            pad_width: (tile_size - width % tile_size) % tile_size,
        })
    }

    pub const fn is_zero(&self) -> bool {
        self.pad_height == 0 && self.pad_width == 0
    }
}

/// Pads an `(H, W, C)` image with zeros on the bottom and right edges so both
/// spatial dimensions become multiples of `tile_size`.
pub fn pad_image<T>(image: ArrayView3<T>, tile_size: usize) -> Result<(Array3<T>, PaddingSpec)>
where
    T: Clone + Zero,
{
    let (height, width, channels) = image.dim();
    let spec = PaddingSpec::for_dimensions(height, width, tile_size)?;

    let mut padded = Array3::<T>::zeros((
        height + spec.pad_height,
        width + spec.pad_width,
        channels,
    ));
    padded.slice_mut(s![..height, ..width, ..]).assign(&image);

    Ok((padded, spec))
}

/// Crops the last `pad_height` rows and `pad_width` columns off an array whose
/// first two axes are (height, width). Works for masks and images alike.
pub fn remove_padding<T, D>(mut array: Array<T, D>, spec: PaddingSpec) -> Result<Array<T, D>>
where
    D: Dimension,
{
    if array.ndim() < 2 {
        return Err(SegError::validation(
            "array",
            format!("needs height and width axes, got {} dimension(s)", array.ndim()),
        ));
    }

    let height = array.len_of(Axis(0));
    let width = array.len_of(Axis(1));
    if spec.pad_height > height || spec.pad_width > width {
        return Err(SegError::validation(
            "padding",
            format!(
                "{}x{} exceeds array size {}x{}",
                spec.pad_height, spec.pad_width, height, width
            ),
        ));
    }

    array.slice_axis_inplace(Axis(0), Slice::from(..height - spec.pad_height));
    array.slice_axis_inplace(Axis(1), Slice::from(..width - spec.pad_width));
    Ok(array)
}
