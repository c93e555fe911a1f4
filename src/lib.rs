pub mod codec;
pub mod config;
pub mod errors;
pub mod logging;
pub mod model;
pub mod preprocess;
pub mod segmenter;
pub mod server;
pub mod tiling;
pub mod traits;

pub mod mocks;

pub use config::Config;
pub use errors::{Result, SegError};
pub use model::OrtPredictor;
pub use preprocess::{ChannelOrder, Normalization};
pub use segmenter::TiledSegmenter;
pub use server::{router, AppState};
pub use tiling::{PaddingSpec, TileGrid};
pub use traits::*;
