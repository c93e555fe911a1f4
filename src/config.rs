use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::codec::default_mask_scale;
use crate::errors::{Result, SegError};
use crate::preprocess::{ChannelOrder, Normalization};
use crate::segmenter::DEFAULT_TILE_SIZE;

fn default_num_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(short, long)]
    pub model_path: PathBuf,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, default_value_t = 8001)]
    pub port: u16,

    #[arg(short, long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: usize,

    #[arg(short = 'c', long, default_value_t = 3)]
    pub num_classes: usize,

    /// Gray level step between classes in the returned PNG [default: 255 / num_classes]
    #[arg(long)]
    pub mask_scale: Option<u8>,

    #[arg(long, value_enum, default_value_t = ChannelOrder::Rgb)]
    pub channel_order: ChannelOrder,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(short, long, default_value_t = default_num_threads())]
    pub num_threads: usize,

    #[arg(long)]
    pub parallel_tiles: bool,

    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,

    #[arg(long, default_value_t = 32)]
    pub max_upload_mb: usize,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    /// 起動前に設定値を検証
    pub fn validate(&self) -> Result<()> {
        if !self.model_path.exists() {
            return Err(SegError::configuration(format!(
                "model path does not exist: {}",
                self.model_path.display()
            )));
        }
        if self.tile_size == 0 {
            return Err(SegError::validation("tile_size", "must be greater than zero"));
        }
        if !(2..=256).contains(&self.num_classes) {
            return Err(SegError::validation(
                "num_classes",
                format!("must be between 2 and 256, got {}", self.num_classes),
            ));
        }
        let highest = (self.num_classes - 1) * usize::from(self.mask_scale());
        if self.mask_scale() == 0 || highest > usize::from(u8::MAX) {
            return Err(SegError::validation(
                "mask_scale",
                format!(
                    "{} does not map {} classes onto distinct 8-bit gray levels",
                    self.mask_scale(),
                    self.num_classes
                ),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(SegError::validation(
                "request_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.max_upload_mb == 0 {
            return Err(SegError::validation("max_upload_mb", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn mask_scale(&self) -> u8 {
        self.mask_scale
            .unwrap_or_else(|| default_mask_scale(self.num_classes))
    }

    pub fn normalization(&self) -> Normalization {
        Normalization::imagenet().with_channel_order(self.channel_order)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// アップロード上限をバイト単位で取得（オーバーフロー時は usize::MAX）
    pub const fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| SegError::configuration(format!("invalid bind address: {e}")))
    }
}
