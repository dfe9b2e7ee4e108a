//! 本地 / 远端好友列表的纯合并（远端优先）

use std::collections::HashMap;

use crate::model::{AccountId, FriendRecord, MemberId};

/// 合并两份快照：
/// - 两边都有的 member_id：原样取远端记录
/// - 只在本地：保留本地
/// - 只在远端：加入
///
/// 输出按名字（忽略大小写）稳定排序，同名按 member_id。
pub fn merge_friend_lists(local: &[FriendRecord], remote: &[FriendRecord]) -> Vec<FriendRecord> {
    let mut merged: HashMap<MemberId, FriendRecord> =
        HashMap::with_capacity(local.len() + remote.len());

    for friend in local {
        merged.insert(friend.member_id, friend.clone());
    }
    // 远端后写，覆盖同 ID 的本地记录；同一快照内重复的 ID 取最后一条
    for friend in remote {
        merged.insert(friend.member_id, friend.clone());
    }

    let mut out: Vec<FriendRecord> = merged.into_values().collect();
    sort_friends(&mut out);
    out
}

pub fn sort_friends(friends: &mut [FriendRecord]) {
    friends.sort_by_cached_key(|f| (f.display_name.to_lowercase(), f.member_id));
}

/// 对账后的列表中该成员是否已链接到预期账户
pub fn is_link_confirmed(friends: &[FriendRecord], member_id: MemberId, account_id: &AccountId) -> bool {
    friends
        .iter()
        .any(|f| f.member_id == member_id && f.is_linked_to(account_id))
}
