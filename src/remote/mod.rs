//! 远端后端：权威数据源抽象与内存实现

pub mod memory;
pub mod traits;

pub use memory::InMemoryLinkBackend;
pub use traits::LinkBackend;
