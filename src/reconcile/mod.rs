//! 对账层：纯合并函数与串行化的对账 actor

pub mod actor;
pub mod merge;

pub use actor::LinkStateReconciliation;
pub use merge::{is_link_confirmed, merge_friend_lists, sort_friends};
