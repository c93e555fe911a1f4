use std::sync::Arc;

use ndarray::prelude::*;

use crate::errors::Result;

/// タイル単位のセグメンテーションモデルの抽象化
///
/// パイプラインはこのトレイトにのみ依存するため、実モデルの代わりにモックで検証できる
pub trait TilePredictor: Send + Sync {
    /// 出力スコアのクラス数を取得
    fn num_classes(&self) -> usize;

    /// 正規化済みタイルのバッチを推論
    ///
    /// 入力は `(N, S, S, 3)`（NHWC）、出力は画素ごとのスコア `(N, S, S, num_classes)`
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>>;
}

impl<P: TilePredictor + ?Sized> TilePredictor for Arc<P> {
    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(batch)
    }
}

impl<P: TilePredictor + ?Sized> TilePredictor for Box<P> {
    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(batch)
    }
}

/// HTTPハンドラ間で共有する予測器
pub type SharedPredictor = Arc<dyn TilePredictor>;
