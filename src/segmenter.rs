use ndarray::prelude::*;
use tracing::{debug, instrument};

use crate::errors::{Result, SegError};
use crate::preprocess::{argmax_classes, Normalization};
use crate::tiling::{pad_image, remove_padding, TileGrid};
use crate::traits::TilePredictor;

/// Tile edge the bundled segmentation model was trained on.
pub const DEFAULT_TILE_SIZE: usize = 512;

/// Runs a [`TilePredictor`] over an image of any size.
///
/// The image is zero-padded at the bottom/right up to a multiple of the tile
/// size, cut into tiles, predicted tile by tile, stitched and cropped back, so
/// the returned class mask always matches the input's height and width.
pub struct TiledSegmenter<P: TilePredictor> {
    predictor: P,
    tile_size: usize,
    normalization: Normalization,
    parallel: bool,
}

impl<P: TilePredictor> TiledSegmenter<P> {
    pub fn new(predictor: P, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(SegError::validation("tile_size", "must be greater than zero"));
        }
        Ok(Self {
            predictor,
            tile_size,
            normalization: Normalization::imagenet(),
            parallel: false,
        })
    }

    pub const fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Predicts tiles on the rayon pool instead of one after another.
    pub const fn with_parallel_tiles(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub const fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn num_classes(&self) -> usize {
        self.predictor.num_classes()
    }

    pub const fn predictor(&self) -> &P {
        &self.predictor
    }

    /// Segments an `(H, W, 3)` image into an `(H, W)` class mask.
    #[instrument(
        level = "debug",
        skip_all,
        fields(height = image.len_of(Axis(0)), width = image.len_of(Axis(1)))
    )]
    pub fn segment(&self, image: ArrayView3<u8>) -> Result<Array2<u8>> {
        let (height, width, channels) = image.dim();
        if channels != 3 {
            return Err(SegError::validation(
                "image",
                format!("expected 3 channels, got {channels}"),
            ));
        }
        if height == 0 || width == 0 {
            return Err(SegError::validation("image", "has no pixels"));
        }

        let (padded, padding) = pad_image(image, self.tile_size)?;
        let tiles = TileGrid::split(padded.view(), self.tile_size)?;
        debug!(
            pad_height = padding.pad_height,
            pad_width = padding.pad_width,
            rows = tiles.rows(),
            cols = tiles.cols(),
            "split image into tiles"
        );

        let masks = if self.parallel {
            tiles.par_try_map(|tile| self.predict_tile(tile.view()))?
        } else {
            tiles.try_map(|tile| self.predict_tile(tile.view()))?
        };

        let stitched = masks.stitch()?;
        let mask = remove_padding(stitched, padding)?;
        debug_assert_eq!(mask.dim(), (height, width));
        Ok(mask)
    }

    /// Normalizes one tile, runs the predictor on it and reduces the scores
    /// to class indices.
    pub fn predict_tile(&self, tile: ArrayView3<u8>) -> Result<Array2<u8>> {
        let tensor = self.normalization.to_tensor(tile)?;
        let scores = self.predictor.predict(tensor.view())?;

        let (height, width, _) = tile.dim();
        let expected = [1, height, width, self.predictor.num_classes()];
        if scores.shape() != expected {
            return Err(SegError::processing(
                "tile inference",
                format!(
                    "predictor returned shape {:?}, expected {:?}",
                    scores.shape(),
                    expected
                ),
            ));
        }

        argmax_classes(scores.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{
        create_mock_predictor, CheckerboardPredictor, CountingPredictor, FailingPredictor,
        MockTilePredictor,
    };

    #[test]
    fn test_mask_matches_input_dimensions() -> Result<()> {
        let segmenter = TiledSegmenter::new(create_mock_predictor(), 16)?;
        for (h, w) in [(1, 1), (15, 16), (16, 16), (17, 40), (48, 5)] {
            let image = Array3::<u8>::zeros((h, w, 3));
            let mask = segmenter.segment(image.view())?;
            assert_eq!(mask.dim(), (h, w), "input {h}x{w}");
        }
        Ok(())
    }

    #[test]
    fn test_predictor_called_once_per_tile() -> Result<()> {
        let segmenter = TiledSegmenter::new(CountingPredictor::new(create_mock_predictor()), 16)?;
        let image = Array3::<u8>::zeros((40, 20, 3));
        segmenter.segment(image.view())?;
        // padded to 48x32 -> 3x2 grid
        assert_eq!(segmenter.predictor().calls(), 6);
        Ok(())
    }

    #[test]
    fn test_checkerboard_restarts_per_tile() -> Result<()> {
        let segmenter = TiledSegmenter::new(CheckerboardPredictor::new(3, 4), 8)?;
        let image = Array3::<u8>::zeros((16, 16, 3));
        let mask = segmenter.segment(image.view())?;

        assert_eq!(mask[[0, 0]], 0);
        assert_eq!(mask[[0, 4]], 1);
        // column 8 is the first column of the second tile
        assert_eq!(mask[[0, 8]], 0);
        assert_eq!(mask[[8, 8]], 0);
        assert_eq!(mask[[12, 12]], 2);
        Ok(())
    }

    #[test]
    fn test_parallel_matches_sequential() -> Result<()> {
        let image = Array3::from_shape_fn((50, 70, 3), |(y, x, c)| ((y * x + c) % 256) as u8);
        let sequential = TiledSegmenter::new(CheckerboardPredictor::new(3, 3), 16)?;
        let parallel =
            TiledSegmenter::new(CheckerboardPredictor::new(3, 3), 16)?.with_parallel_tiles(true);
        assert_eq!(
            sequential.segment(image.view())?,
            parallel.segment(image.view())?
        );
        Ok(())
    }

    #[test]
    fn test_predictor_failure_propagates() -> Result<()> {
        let segmenter = TiledSegmenter::new(FailingPredictor::new("out of memory"), 16)?;
        let image = Array3::<u8>::zeros((20, 20, 3));
        let err = segmenter.segment(image.view()).unwrap_err();
        assert!(matches!(err, SegError::Model { .. }));
        Ok(())
    }

    #[test]
    fn test_class_count_mismatch_is_processing_error() -> Result<()> {
        struct Liar;
        impl TilePredictor for Liar {
            fn num_classes(&self) -> usize {
                4
            }
            fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
                MockTilePredictor::new(3, 1).predict(batch)
            }
        }

        let segmenter = TiledSegmenter::new(Liar, 8)?;
        let image = Array3::<u8>::zeros((8, 8, 3));
        let err = segmenter.segment(image.view()).unwrap_err();
        assert!(matches!(err, SegError::Processing { .. }));
        Ok(())
    }

    #[test]
    fn test_rejects_empty_and_non_rgb_images() -> Result<()> {
        let segmenter = TiledSegmenter::new(create_mock_predictor(), 8)?;
        assert!(segmenter.segment(Array3::<u8>::zeros((0, 8, 3)).view()).is_err());
        assert!(segmenter.segment(Array3::<u8>::zeros((8, 8, 1)).view()).is_err());
        Ok(())
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        assert!(TiledSegmenter::new(create_mock_predictor(), 0).is_err());
    }
}
