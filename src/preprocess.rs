use clap::ValueEnum;
use ndarray::prelude::*;
use ndarray::Zip;

use crate::errors::{Result, SegError};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Order in which the decoded RGB channels are fed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    /// Reversed channels, for models trained on OpenCV-decoded images.
    Bgr,
}

impl ChannelOrder {
    const fn source_channel(self, channel: usize) -> usize {
        match self {
            Self::Rgb => channel,
            Self::Bgr => 2 - channel,
        }
    }
}

/// Per-channel standardization applied to every tile before inference.
///
/// Statistics are indexed by model input channel, i.e. after `channel_order`
/// has been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub channel_order: ChannelOrder,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl Normalization {
    pub const fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            channel_order: ChannelOrder::Rgb,
        }
    }

    pub const fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
        self.channel_order = channel_order;
        self
    }

    /// Converts an `(S, S, 3)` byte tile into a `(1, S, S, 3)` batch of
    /// standardized floats.
    pub fn to_tensor(&self, tile: ArrayView3<u8>) -> Result<Array4<f32>> {
        let (height, width, channels) = tile.dim();
        if channels != 3 {
            return Err(SegError::validation(
                "tile",
                format!("expected 3 channels, got {channels}"),
            ));
        }

        let mut tensor = Array4::<f32>::zeros((1, height, width, 3));
        Zip::from(tensor.index_axis_mut(Axis(0), 0).lanes_mut(Axis(2)))
            .and(tile.lanes(Axis(2)))
            .for_each(|mut out, pixel| {
                for channel in 0..3 {
                    let raw = f32::from(pixel[self.channel_order.source_channel(channel)]);
                    out[channel] = (raw / 255.0 - self.mean[channel]) / self.std[channel];
                }
            });

        Ok(tensor)
    }
}

/// Reduces `(1, S, S, C)` class scores to an `(S, S)` map of class indices.
///
/// Ties go to the lowest class index.
pub fn argmax_classes(scores: ArrayView4<f32>) -> Result<Array2<u8>> {
    let (batch, height, width, classes) = scores.dim();
    if batch != 1 {
        return Err(SegError::validation(
            "scores",
            format!("expected a batch of 1, got {batch}"),
        ));
    }
    if classes == 0 || classes > usize::from(u8::MAX) + 1 {
        return Err(SegError::validation(
            "scores",
            format!("class axis of length {classes} cannot be mapped to u8 indices"),
        ));
    }

    let scores = scores.index_axis_move(Axis(0), 0);
    let mut mask = Array2::<u8>::zeros((height, width));
    Zip::from(&mut mask)
        .and(scores.lanes(Axis(2)))
        .for_each(|class, pixel| {
            let mut best = 0;
            for (index, &score) in pixel.iter().enumerate().skip(1) {
                if score > pixel[best] {
                    best = index;
                }
            }
            *class = best as u8;
        });

    Ok(mask)
}
