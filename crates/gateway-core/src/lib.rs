pub mod config;
pub mod error;
pub mod types;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use types::{
    CallerContext, ConfirmationEnvelope, ToolMetadata, ToolResponse, ToolResult, ToolServer,
    ToolStatus,
};
