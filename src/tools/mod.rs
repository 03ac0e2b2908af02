//! Chat tools and the REST client they share.

pub mod api;
pub mod directions;
pub mod format;
pub mod orchestration;
pub mod search;
pub mod traits;

pub use api::{ApiError, OpsApiClient, ServiceAction};
pub use directions::{DirectionsCommand, DirectionsTool};
pub use orchestration::{OrchestrationTool, ServiceCommand};
pub use search::SearchTool;
pub use traits::{SharedLocation, Tool, ToolRequest};
