use ndarray::{concatenate, Array, ArrayView, Axis, Dimension, RemoveAxis, Slice};
use rayon::prelude::*;

use crate::errors::{Result, SegError};

/// Square tiles cut from an array whose first two axes are (height, width),
/// stored row-major: tile `(row, col)` lives at index `row * cols + col`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid<T, D: Dimension> {
    rows: usize,
    cols: usize,
    tiles: Vec<Array<T, D>>,
}

impl<T, D: Dimension> TileGrid<T, D> {
    /// Splits `array` into non-overlapping `tile_size × tile_size` tiles.
    ///
    /// Both spatial dimensions must already be multiples of `tile_size`;
    /// trailing axes (channels) are carried into every tile untouched.
    pub fn split(array: ArrayView<T, D>, tile_size: usize) -> Result<Self>
    where
        T: Clone,
    {
        if tile_size == 0 {
            return Err(SegError::validation("tile_size", "must be greater than zero"));
        }
        if array.ndim() < 2 {
            return Err(SegError::validation(
                "array",
                format!("needs height and width axes, got {} dimension(s)", array.ndim()),
            ));
        }

        let height = array.len_of(Axis(0));
        let width = array.len_of(Axis(1));
        if height % tile_size != 0 || width % tile_size != 0 {
            return Err(SegError::validation(
                "array",
                format!("{height}x{width} is not a multiple of tile size {tile_size}"),
            ));
        }

        let rows = height / tile_size;
        let cols = width / tile_size;
        let mut tiles = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let band = array.slice_axis(
                Axis(0),
                Slice::from(row * tile_size..(row + 1) * tile_size),
            );
            for col in 0..cols {
                let tile = band.slice_axis(
                    Axis(1),
                    Slice::from(col * tile_size..(col + 1) * tile_size),
                );
                tiles.push(tile.to_owned());
            }
        }

        Ok(Self { rows, cols, tiles })
    }

    /// Rebuilds a grid from tiles already in row-major order.
    pub fn from_tiles(rows: usize, cols: usize, tiles: Vec<Array<T, D>>) -> Result<Self> {
        if tiles.len() != rows * cols {
            return Err(SegError::validation(
                "tiles",
                format!(
                    "expected {} tiles for a {rows}x{cols} grid, got {}",
                    rows * cols,
                    tiles.len()
                ),
            ));
        }
        Ok(Self { rows, cols, tiles })
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    pub const fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Array<T, D>] {
        &self.tiles
    }

    pub fn tile(&self, row: usize, col: usize) -> Option<&Array<T, D>> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.tiles.get(row * self.cols + col)
    }

    /// Applies `f` to every tile in row-major order, keeping the grid layout.
    pub fn try_map<U, E, F>(&self, f: F) -> Result<TileGrid<U, E>>
    where
        E: Dimension,
        F: FnMut(&Array<T, D>) -> Result<Array<U, E>>,
    {
        let tiles = self.tiles.iter().map(f).collect::<Result<Vec<_>>>()?;
        TileGrid::from_tiles(self.rows, self.cols, tiles)
    }

    /// Same as [`TileGrid::try_map`] but runs tiles on the rayon pool.
    /// Results are collected back in row-major order.
    pub fn par_try_map<U, E, F>(&self, f: F) -> Result<TileGrid<U, E>>
    where
        T: Sync,
        D: Sync,
        U: Send,
        E: Dimension + Send,
        F: Fn(&Array<T, D>) -> Result<Array<U, E>> + Sync + Send,
    {
        let tiles = self.tiles.par_iter().map(f).collect::<Result<Vec<_>>>()?;
        TileGrid::from_tiles(self.rows, self.cols, tiles)
    }
}

impl<T: Clone, D: RemoveAxis> TileGrid<T, D> {
    /// Stitches the tiles back into one array: tiles of a grid row are joined
    /// along the width axis, then the rows along the height axis.
    pub fn stitch(&self) -> Result<Array<T, D>> {
        if self.tiles.is_empty() {
            return Err(SegError::validation("tiles", "cannot stitch an empty grid"));
        }

        let bands = self
            .tiles
            .chunks(self.cols)
            .map(|row| {
                let views: Vec<_> = row.iter().map(|tile| tile.view()).collect();
                concatenate(Axis(1), &views)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let views: Vec<_> = bands.iter().map(|band| band.view()).collect();
        Ok(concatenate(Axis(0), &views)?)
    }
}
