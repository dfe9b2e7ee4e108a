//! 链接失败记录：远端看似成功、本地确认失败时创建

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, MemberId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFailureRecord {
    pub member_id: MemberId,
    pub account_id: AccountId,
    pub account_email: String,
    pub reason: String,
    pub retry_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}
