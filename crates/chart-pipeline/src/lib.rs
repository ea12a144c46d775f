pub mod error;
pub mod indicator;
pub mod pipeline;
pub mod renderer;
pub mod store;

pub use error::ChartError;
pub use pipeline::{ChartPipeline, ChartResult};
pub use renderer::{ChartRenderer, HttpChartRenderer};
pub use store::{HttpObjectStore, LocalFileStore, ObjectStore};
