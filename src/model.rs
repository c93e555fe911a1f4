use std::path::Path;

use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::{Result, SegError};
use crate::traits::TilePredictor;

/// モデル入出力テンソルのメモリレイアウト
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `(N, H, W, C)`（Kerasからのエクスポート）
    Nhwc,
    /// `(N, C, H, W)`（PyTorchからのエクスポート）
    Nchw,
}

impl TensorLayout {
    /// 宣言された入力形状からレイアウトを推定
    ///
    /// 動的な軸は ONNX Runtime では負の値になる
    pub fn detect(dims: &[i64]) -> Result<Self> {
        match dims {
            [_, _, _, 3] => Ok(Self::Nhwc),
            [_, 3, _, _] => Ok(Self::Nchw),
            _ => Err(SegError::configuration(format!(
                "model input {dims:?} is not a 3-channel image batch"
            ))),
        }
    }

    /// 静的に宣言された空間サイズ `(H, W)` を取得
    pub fn spatial_size(self, dims: &[i64]) -> Option<(i64, i64)> {
        let (h, w) = match self {
            Self::Nhwc => (dims.get(1)?, dims.get(2)?),
            Self::Nchw => (dims.get(2)?, dims.get(3)?),
        };
        (*h > 0 && *w > 0).then_some((*h, *w))
    }
}

/// ONNX Runtime で動作するセグメンテーションモデル
///
/// セッションは同時実行できないため、推論はMutexで直列化する
pub struct OrtPredictor {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    layout: TensorLayout,
    output_layout: TensorLayout,
    num_classes: usize,
}

impl OrtPredictor {
    pub fn new(
        model_path: &Path,
        tile_size: usize,
        num_classes: usize,
        num_threads: usize,
        device_id: i32,
    ) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| SegError::model("session builder initialization", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| SegError::model("execution provider registration", e))?
            .with_memory_pattern(true)
            .map_err(|e| SegError::model("memory pattern configuration", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| SegError::model("thread configuration", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                SegError::model(format!("loading model {}", model_path.display()), e)
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| SegError::configuration("model declares no inputs"))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| SegError::configuration("model declares no outputs"))?;

        let dims: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.iter().copied().collect())
            .ok_or_else(|| SegError::configuration("model input is not a tensor"))?;
        let layout = TensorLayout::detect(&dims)?;

        if let Some((h, w)) = layout.spatial_size(&dims) {
            if h != tile_size as i64 || w != tile_size as i64 {
                return Err(SegError::configuration(format!(
                    "model expects {h}x{w} tiles but tile size is {tile_size}"
                )));
            }
        }

        let input_name = input.name.clone();
        let output_name = output.name.clone();
        let mut predictor = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            layout,
            output_layout: TensorLayout::Nhwc,
            num_classes,
        };

        // initialize model
        // ウォームアップの出力から出力レイアウトとクラス数を確定する
        let warmup = Array4::<f32>::zeros((1, tile_size, tile_size, 3));
        let scores = predictor.run_batch(warmup.view())?;
        predictor.output_layout = score_layout(scores.shape(), tile_size, num_classes)?;
        debug!("warm-up inference finished");

        info!(
            model = %model_path.display(),
            input = %predictor.input_name,
            output = %predictor.output_name,
            input_layout = ?predictor.layout,
            output_layout = ?predictor.output_layout,
            num_classes,
            "loaded segmentation model"
        );

        Ok(predictor)
    }

    pub const fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub const fn output_layout(&self) -> TensorLayout {
        self.output_layout
    }

    /// NHWCバッチをモデルの入力レイアウトに合わせて推論し、生のスコアを返す
    fn run_batch(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        match self.layout {
            TensorLayout::Nhwc => self.run(batch),
            TensorLayout::Nchw => self.run(batch.permuted_axes([0, 3, 1, 2])),
        }
    }

    fn run(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let scores = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        Ok(scores)
    }
}

/// 1タイル分のスコアテンソルのレイアウトを判定
///
/// `(1, S, S, C)` または `(1, C, S, S)` のみ受け付ける。それ以外はクラス数かタイルサイズが
/// モデルと一致していない
pub fn score_layout(
    shape: &[usize],
    tile_size: usize,
    num_classes: usize,
) -> Result<TensorLayout> {
    if shape == [1, tile_size, tile_size, num_classes] {
        Ok(TensorLayout::Nhwc)
    } else if shape == [1, num_classes, tile_size, tile_size] {
        Ok(TensorLayout::Nchw)
    } else {
        Err(SegError::configuration(format!(
            "model output {shape:?} does not match {num_classes} classes on \
             {tile_size}x{tile_size} tiles"
        )))
    }
}

impl TilePredictor for OrtPredictor {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        let scores = self.run_batch(batch)?;
        match self.output_layout {
            TensorLayout::Nhwc => Ok(scores),
            TensorLayout::Nchw => Ok(scores.permuted_axes([0, 2, 3, 1])),
        }
    }
}
