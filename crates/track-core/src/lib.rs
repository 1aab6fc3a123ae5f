#![forbid(unsafe_code)]

pub mod axis;
pub mod buffer;
pub mod dtype;
pub mod error;
pub mod selection;
pub mod timesteps;

pub use axis::{Axis, AxisData};
pub use buffer::BufferPool;
pub use dtype::{DType, Element};
pub use error::{TrackError, TrackResult};
pub use selection::{union_sorted, Selection};
pub use timesteps::TimestepFilter;
