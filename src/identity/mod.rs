//! 身份层：规范身份 / 别名图
//!
//! 余额、去重、「是不是我」等判断一律用 `are_equivalent`，不要直接比较原始 ID。

pub mod graph;

pub use graph::{AliasEntry, CanonicalMerge, IdentityGraph, SharedIdentityGraph};
