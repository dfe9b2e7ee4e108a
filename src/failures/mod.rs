//! 失败追踪：远端已成功、本地确认失败的链接，留待后台重试

pub mod tracker;

pub use tracker::LinkFailureTracker;
