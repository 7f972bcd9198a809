use serde::{Deserialize, Serialize};

/// 标签页的 leader 声明
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderClaim {
    pub tab_id: String,
    /// 标签页创建时间 (Unix 毫秒，客户端上报)
    pub tab_created_at: i64,
}

/// Leader 选举策略
///
/// 网关不主动选 leader，只对客户端转发的声明做确定性裁决，
/// 并保证同一设备的所有标签页最终收到相同的当选者。
/// 策略可替换，默认 EarliestTabWins。
pub trait LeaderElectionPolicy: Send + Sync {
    /// 裁决：incoming 是否取代 current 成为 leader
    fn challenge(&self, current: Option<&LeaderClaim>, incoming: &LeaderClaim) -> bool;

    fn name(&self) -> &'static str;
}

/// 最早创建的标签页当选
///
/// tab_created_at 最小者赢；时间戳相同时 tab_id 字典序小者赢，
/// 保证任何声明顺序都收敛到同一个结果。
pub struct EarliestTabWins;

impl LeaderElectionPolicy for EarliestTabWins {
    fn challenge(&self, current: Option<&LeaderClaim>, incoming: &LeaderClaim) -> bool {
        match current {
            None => true,
            Some(current) => {
                (incoming.tab_created_at, incoming.tab_id.as_str())
                    < (current.tab_created_at, current.tab_id.as_str())
            }
        }
    }

    fn name(&self) -> &'static str {
        "earliest_tab_wins"
    }
}

/// 最后声明者当选（客户端自行用心跳比较得出的声明直接生效）
pub struct LastClaimWins;

impl LeaderElectionPolicy for LastClaimWins {
    fn challenge(&self, _current: Option<&LeaderClaim>, _incoming: &LeaderClaim) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "last_claim_wins"
    }
}
