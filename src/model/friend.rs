//! 好友记录（本地缓存行，对应一条远端记录）

use serde::{Deserialize, Serialize};

use super::{AccountId, MemberId};

/// 链接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Unlinked,
    Pending,
    Linked,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::Unlinked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRecord {
    pub member_id: MemberId,
    pub display_name: String,
    pub nickname: Option<String>,
    pub link_status: LinkStatus,
    pub linked_account_id: Option<AccountId>,
    pub linked_account_email: Option<String>,
}

impl FriendRecord {
    /// 记账时临时创建的占位好友：新 UUID，未链接
    pub fn placeholder(display_name: impl Into<String>) -> Self {
        Self::unlinked(MemberId::new(), display_name)
    }

    pub fn unlinked(member_id: MemberId, display_name: impl Into<String>) -> Self {
        Self {
            member_id,
            display_name: display_name.into(),
            nickname: None,
            link_status: LinkStatus::Unlinked,
            linked_account_id: None,
            linked_account_email: None,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn linked_to(mut self, account_id: AccountId, email: impl Into<String>) -> Self {
        self.link_status = LinkStatus::Linked;
        self.linked_account_id = Some(account_id);
        self.linked_account_email = Some(email.into());
        self
    }

    pub fn is_linked(&self) -> bool {
        self.link_status == LinkStatus::Linked
    }

    pub fn is_linked_to(&self, account_id: &AccountId) -> bool {
        self.is_linked() && self.linked_account_id.as_ref() == Some(account_id)
    }

    /// 已链接到「另一个」账户
    pub fn is_linked_elsewhere(&self, account_id: &AccountId) -> bool {
        self.is_linked()
            && self
                .linked_account_id
                .as_ref()
                .is_some_and(|linked| linked != account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_unlinked() {
        let friend = FriendRecord::placeholder("Sam");
        assert_eq!(friend.link_status, LinkStatus::Unlinked);
        assert!(friend.linked_account_id.is_none());
    }

    #[test]
    fn test_linked_elsewhere() {
        let friend = FriendRecord::placeholder("Sam").linked_to(AccountId::new("a"), "sam@x.com");
        assert!(friend.is_linked_to(&AccountId::new("a")));
        assert!(friend.is_linked_elsewhere(&AccountId::new("b")));
        assert!(!friend.is_linked_elsewhere(&AccountId::new("a")));
    }

    #[test]
    fn test_link_status_wire_names() {
        let json = serde_json::to_string(&LinkStatus::Linked).unwrap();
        assert_eq!(json, "\"linked\"");
    }
}
