pub mod error;
pub mod retry;
pub mod scheduled_executor;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use retry::{RetryPolicy, with_retry};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask, ShutdownHandle};
