use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::prelude::*;

use crate::errors::{Result, SegError};
use crate::traits::TilePredictor;

fn check_batch(batch: &ArrayView4<f32>) -> Result<()> {
    if batch.len_of(Axis(3)) != 3 {
        return Err(SegError::validation(
            "batch",
            format!("expected NHWC input with 3 channels, got shape {:?}", batch.shape()),
        ));
    }
    Ok(())
}

/// `pick(y, x, pixel)` で選んだクラスのワンホットスコアを生成
fn one_hot<F>(batch: ArrayView4<f32>, num_classes: usize, pick: F) -> Array4<f32>
where
    F: Fn(usize, usize, ArrayView1<f32>) -> usize,
{
    let (n, height, width, _) = batch.dim();
    let mut scores = Array4::<f32>::zeros((n, height, width, num_classes));
    for b in 0..n {
        for y in 0..height {
            for x in 0..width {
                let class = pick(y, x, batch.slice(s![b, y, x, ..])) % num_classes;
                scores[[b, y, x, class]] = 1.0;
            }
        }
    }
    scores
}

/// 全画素で同じクラスを返すモック
#[derive(Debug, Clone)]
pub struct MockTilePredictor {
    pub num_classes: usize,
    pub class: usize,
}

impl MockTilePredictor {
    pub const fn new(num_classes: usize, class: usize) -> Self {
        Self { num_classes, class }
    }
}

impl TilePredictor for MockTilePredictor {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_batch(&batch)?;
        Ok(one_hot(batch, self.num_classes, |_, _, _| self.class))
    }
}

/// `cell × cell` の市松模様でクラスを巡回するモック
///
/// 模様は各タイルの左上から始まる
#[derive(Debug, Clone)]
pub struct CheckerboardPredictor {
    pub num_classes: usize,
    pub cell: usize,
}

impl CheckerboardPredictor {
    pub const fn new(num_classes: usize, cell: usize) -> Self {
        Self { num_classes, cell }
    }
}

impl TilePredictor for CheckerboardPredictor {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_batch(&batch)?;
        let cell = self.cell.max(1);
        Ok(one_hot(batch, self.num_classes, |y, x, _| y / cell + x / cell))
    }
}

/// 先頭チャンネルが `threshold`（正規化後の値）を超える画素をクラス1、それ以外をクラス0とするモック
///
/// 出力が画像内容に追従するので、タイル配置の誤りが結合後のマスクに現れる
#[derive(Debug, Clone)]
pub struct ThresholdPredictor {
    pub num_classes: usize,
    pub threshold: f32,
}

impl ThresholdPredictor {
    pub const fn new(num_classes: usize, threshold: f32) -> Self {
        Self {
            num_classes,
            threshold,
        }
    }
}

impl TilePredictor for ThresholdPredictor {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_batch(&batch)?;
        Ok(one_hot(batch, self.num_classes, |_, _, pixel| {
            usize::from(pixel[0] > self.threshold)
        }))
    }
}

/// 常に失敗するモック
#[derive(Debug, Clone)]
pub struct FailingPredictor {
    pub message: String,
}

impl FailingPredictor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TilePredictor for FailingPredictor {
    fn num_classes(&self) -> usize {
        3
    }

    fn predict(&self, _batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        Err(SegError::model("tile inference", &self.message))
    }
}

/// 予測器をラップし、呼び出し回数を数える
#[derive(Debug)]
pub struct CountingPredictor<P> {
    inner: P,
    calls: AtomicUsize,
}

impl<P> CountingPredictor<P> {
    pub const fn new(inner: P) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<P: TilePredictor> TilePredictor for CountingPredictor<P> {
    fn num_classes(&self) -> usize {
        self.inner.num_classes()
    }

    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(batch)
    }
}

/// テスト用のデフォルトモック（3クラス、全画素クラス0）
pub const fn create_mock_predictor() -> MockTilePredictor {
    MockTilePredictor::new(3, 0)
}
