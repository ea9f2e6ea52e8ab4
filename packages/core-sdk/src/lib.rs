pub mod config;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod gate;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod telemetry;

/**
 * \brief Common re-exports for the binaries.
 */
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::dispatch::{self, BatchRequest, BatchSummary, DispatchEvent};
    pub use crate::error::{BatchError, DispatchError, ExportError, GateError};
    pub use crate::export;
    pub use crate::gate;
    pub use crate::llm::{CompletionApi, OpenAiClient};
    pub use crate::models::{Model, ResultRecord};
    pub use crate::server;
    pub use crate::session::Session;
    pub use crate::telemetry;
}
