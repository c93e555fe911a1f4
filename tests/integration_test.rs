use ndarray::{s, Array3, Array4, ArrayView4};

use tiled_seg_rs::mocks::{
    create_mock_predictor, CheckerboardPredictor, CountingPredictor, ThresholdPredictor,
};
use tiled_seg_rs::tiling::{pad_image, remove_padding};
use tiled_seg_rs::{PaddingSpec, TileGrid, TilePredictor, TiledSegmenter};

const TILE: usize = 512;

// Mock defined inside the integration test: echoes a per-tile constant taken
// from the tile's top-left pixel so every tile can be told apart.
#[derive(Debug, Clone)]
struct TopLeftPredictor;

impl TilePredictor for TopLeftPredictor {
    fn num_classes(&self) -> usize {
        3
    }

    fn predict(
        &self,
        batch: ArrayView4<f32>,
    ) -> tiled_seg_rs::Result<Array4<f32>> {
        let (n, h, w, _) = batch.dim();
        let class = if batch[[0, 0, 0, 0]] > 0.0 { 2 } else { 1 };
        let mut scores = Array4::<f32>::zeros((n, h, w, 3));
        scores.slice_mut(s![.., .., .., class]).fill(1.0);
        Ok(scores)
    }
}

fn gradient(height: usize, width: usize) -> Array3<u8> {
    Array3::from_shape_fn((height, width, 3), |(y, x, c)| ((y + 2 * x + c) % 256) as u8)
}

#[test]
fn test_600x400_scenario() -> tiled_seg_rs::Result<()> {
    let image = gradient(600, 400);

    let (padded, padding) = pad_image(image.view(), TILE)?;
    assert_eq!(padded.dim(), (1024, 512, 3));
    assert_eq!(
        padding,
        PaddingSpec {
            pad_height: 424,
            pad_width: 112
        }
    );

    let grid = TileGrid::split(padded.view(), TILE)?;
    assert_eq!((grid.rows(), grid.cols()), (2, 1));

    let predictor = CountingPredictor::new(create_mock_predictor());
    let segmenter = TiledSegmenter::new(predictor, TILE)?;
    let mask = segmenter.segment(image.view())?;
    assert_eq!(mask.dim(), (600, 400));
    assert_eq!(segmenter.predictor().calls(), 2);
    Ok(())
}

#[test]
fn test_aligned_512_scenario() -> tiled_seg_rs::Result<()> {
    let image = gradient(512, 512);

    let (padded, padding) = pad_image(image.view(), TILE)?;
    assert!(padding.is_zero());
    assert_eq!(padded, image);

    let segmenter = TiledSegmenter::new(CountingPredictor::new(create_mock_predictor()), TILE)?;
    let mask = segmenter.segment(image.view())?;
    assert_eq!(mask.dim(), (512, 512));
    assert_eq!(segmenter.predictor().calls(), 1);
    Ok(())
}

#[test]
fn test_output_shape_for_small_equal_and_unaligned_sizes() -> tiled_seg_rs::Result<()> {
    let segmenter = TiledSegmenter::new(CheckerboardPredictor::new(3, 37), TILE)?;
    for (h, w) in [(1, 1), (100, 511), (512, 512), (513, 512), (700, 1100)] {
        let mask = segmenter.segment(gradient(h, w).view())?;
        assert_eq!(mask.dim(), (h, w), "input {h}x{w}");
        assert!(mask.iter().all(|&class| usize::from(class) < 3));
    }
    Ok(())
}

#[test]
fn test_tiles_and_reassembly_are_lossless() -> tiled_seg_rs::Result<()> {
    for (h, w) in [(600, 400), (512, 1024), (1, 1300)] {
        let image = gradient(h, w);
        let (padded, padding) = pad_image(image.view(), TILE)?;
        let grid = TileGrid::split(padded.view(), TILE)?;

        assert_eq!(grid.len(), (padded.dim().0 / TILE) * (padded.dim().1 / TILE));
        assert!(grid.tiles().iter().all(|tile| tile.dim() == (TILE, TILE, 3)));

        let stitched = grid.stitch()?;
        assert_eq!(stitched, padded);
        assert_eq!(remove_padding(stitched, padding)?, image);
    }
    Ok(())
}

#[test]
fn test_mask_follows_image_content_across_tiles() -> tiled_seg_rs::Result<()> {
    // bright band in rows 500..700 crosses the first tile boundary
    let mut image = Array3::<u8>::zeros((900, 300, 3));
    image.slice_mut(s![500..700, .., ..]).fill(255);

    let segmenter = TiledSegmenter::new(ThresholdPredictor::new(3, 0.0), TILE)?;
    let mask = segmenter.segment(image.view())?;

    assert_eq!(mask.dim(), (900, 300));
    assert!(mask.slice(s![..500, ..]).iter().all(|&c| c == 0));
    assert!(mask.slice(s![500..700, ..]).iter().all(|&c| c == 1));
    assert!(mask.slice(s![700.., ..]).iter().all(|&c| c == 0));
    Ok(())
}

#[test]
fn test_tiles_are_predicted_in_row_major_order() -> tiled_seg_rs::Result<()> {
    // only the bottom-left tile of a 2x2 grid is bright
    let mut image = Array3::<u8>::zeros((1024, 1024, 3));
    image.slice_mut(s![512.., ..512, ..]).fill(255);

    for parallel in [false, true] {
        let segmenter =
            TiledSegmenter::new(TopLeftPredictor, TILE)?.with_parallel_tiles(parallel);
        let mask = segmenter.segment(image.view())?;

        assert_eq!(mask[[0, 0]], 1);
        assert_eq!(mask[[0, 1023]], 1);
        assert_eq!(mask[[1023, 0]], 2);
        assert_eq!(mask[[1023, 1023]], 1);
    }
    Ok(())
}
