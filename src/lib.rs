//! xyzmaps library - client for a geospatial data hub: spaces, feature tagging
//! and resilient uploads

pub mod compression;
pub mod config;
pub mod error;
pub mod executor;
pub mod http_logger;
pub mod payload;
pub mod space;
pub mod tags;

// Re-export commonly used types
pub use config::{Config, ConfigOptions, Settings};
pub use error::{ApiError, ApiMessage, ExecuteError};
pub use executor::{ApiRequest, ApiResponse, ResponseBody, UploadExecutor, UploadOutcome};
pub use payload::Payload;
pub use space::{SpaceClient, SpaceInfo, UploadOptions, UploadSummary};
