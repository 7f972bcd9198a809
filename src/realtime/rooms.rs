use crate::realtime::events::EventEnvelope;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// 连接句柄
struct ConnectionHandle {
    sender: UnboundedSender<EventEnvelope>,
    rooms: HashSet<String>,
}

/// 房间注册表
///
/// 实时传输层的抽象：连接注册后获得一个事件接收端，
/// 之后可被加入任意多个命名房间。房间成员关系是派生的、
/// 可丢弃的 —— 每次重连都从 token 重新建立，这里不持久化任何东西。
///
/// emit 是同步的 channel send：调用返回时事件已进入每个成员的
/// 接收队列，触发方的"完成"响应不会早于房间内其他连接看到事件。
pub struct RoomRegistry {
    /// 连接映射：connection_id -> ConnectionHandle
    connections: DashMap<String, ConnectionHandle>,

    /// 房间映射：room -> 成员连接ID集合
    rooms: DashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    /// 创建新的房间注册表
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// 注册连接，返回该连接的事件接收端
    ///
    /// 重复注册同一个连接ID会替换旧通道（旧接收端随即关闭）。
    pub fn register(&self, connection_id: &str) -> UnboundedReceiver<EventEnvelope> {
        let (sender, receiver) = mpsc::unbounded_channel();

        self.connections.insert(
            connection_id.to_string(),
            ConnectionHandle {
                sender,
                rooms: HashSet::new(),
            },
        );

        debug!("📝 连接注册: conn={}", connection_id);
        receiver
    }

    /// 将连接加入房间
    pub fn join(&self, connection_id: &str, room: &str) -> bool {
        let Some(mut handle) = self.connections.get_mut(connection_id) else {
            return false;
        };
        handle.rooms.insert(room.to_string());
        drop(handle);

        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());

        debug!("📝 加入房间: conn={}, room={}", connection_id, room);
        true
    }

    /// 向房间内所有连接投递事件，返回送达数量
    pub fn emit_to_room(&self, room: &str, envelope: EventEnvelope) -> usize {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(members) => members.iter().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for connection_id in members {
            if self.send_to(&connection_id, envelope.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// 向单个连接投递事件
    pub fn emit_to_connection(&self, connection_id: &str, envelope: EventEnvelope) -> bool {
        self.send_to(connection_id, envelope)
    }

    /// 断开连接：移除所有房间成员关系并关闭事件通道
    pub fn disconnect(&self, connection_id: &str) {
        let Some((_, handle)) = self.connections.remove(connection_id) else {
            return;
        };

        for room in &handle.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(connection_id);
                if members.is_empty() {
                    drop(members);
                    self.rooms.remove_if(room, |_, m| m.is_empty());
                }
            }
        }

        // handle 被丢弃，sender 关闭，接收端看到通道结束
        debug!("🔌 连接断开: conn={}", connection_id);
    }

    /// 断开房间内的所有连接，返回断开数量
    pub fn disconnect_room(&self, room: &str) -> usize {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(members) => members.iter().cloned().collect(),
            None => return 0,
        };

        let count = members.len();
        for connection_id in &members {
            self.disconnect(connection_id);
        }

        if count > 0 {
            info!("🔌 房间已清空: room={}, count={}", room, count);
        }
        count
    }

    /// 获取房间成员
    pub fn members(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 获取连接已加入的房间
    pub fn connection_rooms(&self, connection_id: &str) -> Vec<String> {
        self.connections
            .get(connection_id)
            .map(|handle| handle.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 活跃连接数
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn send_to(&self, connection_id: &str, envelope: EventEnvelope) -> bool {
        match self.connections.get(connection_id) {
            Some(handle) => handle.sender.send(envelope).is_ok(),
            None => false,
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 带截止时间地等待某个事件
///
/// 订阅方要么在截止前收到目标事件，要么得到 None（超时或通道关闭），
/// 两种情况都正常返回，不遗留挂起的监听。
pub async fn await_event(
    receiver: &mut UnboundedReceiver<EventEnvelope>,
    event_name: &str,
    deadline: Duration,
) -> Option<EventEnvelope> {
    let result = tokio::time::timeout(deadline, async {
        while let Some(envelope) = receiver.recv().await {
            if envelope.event == event_name {
                return Some(envelope);
            }
        }
        None
    })
    .await;

    result.unwrap_or(None)
}
