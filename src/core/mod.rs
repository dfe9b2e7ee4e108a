//! 核心层：错误分类、时钟、重试策略、取消监管

pub mod clock;
pub mod error;
pub mod retry;
pub mod supervisor;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, LinkError};
pub use retry::{RetryPolicy, RetryPredicate};
pub use supervisor::LinkSupervisor;
