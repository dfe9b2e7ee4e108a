//! 规范身份图：alias → canonical 多对一映射（类并查集，合并时展平）
//!
//! 不变量：
//! - `resolve(resolve(x)) == resolve(x)`，任何别名最多一跳就到达规范 ID
//! - 合并前做祖先回溯检查，会形成环的合并被拒绝且图不变

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::LinkError;
use crate::model::MemberId;

/// 一条别名映射（导出给持久化协作方）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: MemberId,
    pub canonical: MemberId,
}

/// merge_canonical 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalMerge {
    pub canonical: MemberId,
    /// false 表示两边早已等价，图未改动
    pub merged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityGraph {
    /// alias -> canonical
    parent: HashMap<MemberId, MemberId>,
    /// canonical -> 直接指向它的别名集合
    aliases: HashMap<MemberId, BTreeSet<MemberId>>,
}

impl IdentityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 没有别名记录的 ID 解析为自身
    pub fn resolve(&self, id: MemberId) -> MemberId {
        let mut current = id;
        // 展平后最多一跳；上限只防御被外部导入的脏数据
        for _ in 0..=self.parent.len() {
            match self.parent.get(&current) {
                Some(&next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }

    pub fn are_equivalent(&self, a: MemberId, b: MemberId) -> bool {
        self.resolve(a) == self.resolve(b)
    }

    /// target 的祖先链上是否出现 source
    pub fn would_cycle(&self, source: MemberId, target: MemberId) -> bool {
        let mut current = target;
        if current == source {
            return true;
        }
        for _ in 0..=self.parent.len() {
            match self.parent.get(&current) {
                Some(&next) if next != current => {
                    if next == source {
                        return true;
                    }
                    current = next;
                }
                _ => break,
            }
        }
        false
    }

    /// 将 source 以及所有直接指向 source 的别名改指向 target 的规范 ID。
    /// 返回合并后的规范 ID；形成环时返回 CycleRejected 且不做任何修改。
    pub fn merge(&mut self, source: MemberId, target: MemberId) -> Result<MemberId, LinkError> {
        if self.would_cycle(source, target) {
            return Err(LinkError::CycleRejected);
        }
        let canonical = self.resolve(target);

        if let Some(previous) = self.parent.insert(source, canonical) {
            if let Some(set) = self.aliases.get_mut(&previous) {
                set.remove(&source);
                if set.is_empty() {
                    self.aliases.remove(&previous);
                }
            }
        }

        let moved = self.aliases.remove(&source).unwrap_or_default();
        for alias in &moved {
            self.parent.insert(*alias, canonical);
        }

        let entry = self.aliases.entry(canonical).or_default();
        entry.insert(source);
        entry.extend(moved);

        Ok(canonical)
    }

    /// 直接指向 canonical 的所有别名（有序）
    pub fn aliases_of(&self, canonical: MemberId) -> Vec<MemberId> {
        self.aliases
            .get(&canonical)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn entries(&self) -> Vec<AliasEntry> {
        let mut entries: Vec<AliasEntry> = self
            .parent
            .iter()
            .map(|(&alias, &canonical)| AliasEntry { alias, canonical })
            .collect();
        entries.sort_by_key(|e| e.alias);
        entries
    }

    /// 从导出的映射重建；逐条走 merge，因此环会被拒绝
    pub fn from_entries(entries: &[AliasEntry]) -> Result<Self, LinkError> {
        let mut graph = Self::new();
        for entry in entries {
            graph.merge(entry.alias, entry.canonical)?;
        }
        Ok(graph)
    }
}

/// 多个并发流程共享的身份图：读走读锁，合并在写锁内完成整个「检查 + 修改」
#[derive(Debug, Clone, Default)]
pub struct SharedIdentityGraph {
    inner: Arc<RwLock<IdentityGraph>>,
}

impl SharedIdentityGraph {
    pub fn new(graph: IdentityGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    pub async fn resolve(&self, id: MemberId) -> MemberId {
        self.inner.read().await.resolve(id)
    }

    pub async fn are_equivalent(&self, a: MemberId, b: MemberId) -> bool {
        self.inner.read().await.are_equivalent(a, b)
    }

    pub async fn would_cycle(&self, source: MemberId, target: MemberId) -> bool {
        self.inner.read().await.would_cycle(source, target)
    }

    pub async fn merge(&self, source: MemberId, target: MemberId) -> Result<MemberId, LinkError> {
        self.inner.write().await.merge(source, target)
    }

    /// 链接完成时的合并：在同一把写锁内先解析 target 的规范 ID，再解析 source 的规范 ID，
    /// 二者已等价时不做修改（重放幂等）
    pub async fn merge_canonical(&self, source: MemberId, target: MemberId) -> Result<CanonicalMerge, LinkError> {
        let mut graph = self.inner.write().await;
        let target_canonical = graph.resolve(target);
        let source_canonical = graph.resolve(source);
        if source_canonical == target_canonical {
            return Ok(CanonicalMerge {
                canonical: target_canonical,
                merged: false,
            });
        }
        let canonical = graph.merge(source_canonical, target_canonical)?;
        Ok(CanonicalMerge {
            canonical,
            merged: true,
        })
    }

    pub async fn snapshot(&self) -> IdentityGraph {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<MemberId> {
        (0..n).map(|_| MemberId::new()).collect()
    }

    #[test]
    fn test_unknown_id_resolves_to_itself() {
        let graph = IdentityGraph::new();
        let id = MemberId::new();
        assert_eq!(graph.resolve(id), id);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_merge_then_reverse_is_rejected() {
        let v = ids(2);
        let (a, b) = (v[0], v[1]);
        let mut graph = IdentityGraph::new();
        assert_eq!(graph.merge(a, b), Ok(b));

        let before = graph.entries();
        assert_eq!(graph.merge(b, a), Err(LinkError::CycleRejected));
        assert_eq!(graph.entries(), before);
        assert_eq!(graph.resolve(a), b);
        assert_eq!(graph.resolve(b), b);
    }

    #[test]
    fn test_self_merge_is_rejected() {
        let a = MemberId::new();
        let mut graph = IdentityGraph::new();
        assert_eq!(graph.merge(a, a), Err(LinkError::CycleRejected));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_merge_flattens_existing_aliases() {
        let v = ids(4);
        let (a, b, c, d) = (v[0], v[1], v[2], v[3]);
        let mut graph = IdentityGraph::new();
        graph.merge(a, b).unwrap();
        graph.merge(d, b).unwrap();
        graph.merge(b, c).unwrap();

        for id in [a, b, c, d] {
            let r = graph.resolve(id);
            assert_eq!(r, c);
            assert_eq!(graph.resolve(r), r);
        }
        // 每条别名都直接指向规范 ID
        for entry in graph.entries() {
            assert_eq!(entry.canonical, c);
        }
        assert_eq!(graph.aliases_of(c), {
            let mut expected = vec![a, b, d];
            expected.sort();
            expected
        });
        assert!(graph.aliases_of(b).is_empty());
    }

    #[test]
    fn test_merge_onto_alias_uses_its_canonical() {
        let v = ids(3);
        let (a, b, c) = (v[0], v[1], v[2]);
        let mut graph = IdentityGraph::new();
        graph.merge(a, b).unwrap();
        assert_eq!(graph.merge(c, a), Ok(b));
        assert_eq!(graph.resolve(c), b);
        // c 的祖先链上有 b，反向合并被拒绝
        assert_eq!(graph.merge(b, c), Err(LinkError::CycleRejected));
    }

    #[test]
    fn test_resolve_is_idempotent_over_many_merges() {
        let v = ids(12);
        let mut graph = IdentityGraph::new();
        for pair in v.windows(2) {
            let _ = graph.merge(pair[0], pair[1]);
        }
        for (i, pair) in v.chunks(3).enumerate() {
            if pair.len() == 3 && i % 2 == 0 {
                let _ = graph.merge(pair[2], pair[0]);
            }
        }
        for id in &v {
            let r = graph.resolve(*id);
            assert_eq!(graph.resolve(r), r);
        }
    }

    #[test]
    fn test_from_entries_rejects_cycles() {
        let v = ids(2);
        let entries = [
            AliasEntry { alias: v[0], canonical: v[1] },
            AliasEntry { alias: v[1], canonical: v[0] },
        ];
        assert_eq!(
            IdentityGraph::from_entries(&entries).err(),
            Some(LinkError::CycleRejected)
        );

        let graph = IdentityGraph::from_entries(&entries[..1]).unwrap();
        assert!(graph.are_equivalent(v[0], v[1]));
    }

    #[tokio::test]
    async fn test_shared_graph_concurrent_merges() {
        let shared = SharedIdentityGraph::default();
        let target = MemberId::new();
        let sources = ids(32);

        let handles: Vec<_> = sources
            .iter()
            .map(|&source| {
                let g = shared.clone();
                tokio::spawn(async move { g.merge(source, target).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(target));
        }

        let snapshot = shared.snapshot().await;
        assert_eq!(snapshot.len(), 32);
        for source in sources {
            assert!(shared.are_equivalent(source, target).await);
        }
    }

    #[tokio::test]
    async fn test_merge_canonical_is_replay_safe() {
        let shared = SharedIdentityGraph::default();
        let v = ids(3);
        let (account, placeholder, old_alias) = (v[0], v[1], v[2]);
        shared.merge(old_alias, account).await.unwrap();

        let first = shared.merge_canonical(account, placeholder).await.unwrap();
        assert_eq!(first, CanonicalMerge { canonical: placeholder, merged: true });
        let before = shared.snapshot().await.entries();

        let replay = shared.merge_canonical(account, placeholder).await.unwrap();
        assert!(!replay.merged);
        assert_eq!(shared.snapshot().await.entries(), before);
        // 账户的旧别名跟着展平到占位身份上
        assert_eq!(shared.resolve(old_alias).await, placeholder);
    }
}
