pub mod debug_log;
pub mod error;
pub mod exiftool;
pub mod image_buffer;
pub mod nodes;
pub mod settings;

pub use error::{ErrorKind, NodeError, NodeFailure, NodeResult};
pub use image_buffer::ImageBuffer;
pub use settings::{ExifToolSettings, Settings};
