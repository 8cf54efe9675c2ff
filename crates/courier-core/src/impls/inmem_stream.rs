//! InMemoryStreamStore - 開発・テスト用のストリームストア
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による blocking read
//! - `Notified::enable()` で「状態確認 → 待機」の間の通知取りこぼしを防ぐ
//! - ロックは await の前に必ず手放す（待機中に他のワーカーを止めない）
//!
//! 時刻は 2 種類使います。
//! - エントリ id の ms 部分: [`Clock`]（壁時計）
//! - pending の idle 計算: `tokio::time::Instant`（テストで時間を止められる）

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{ConsumerId, Entry, EntryId, PendingEntry, StoreError};
use crate::ports::{Clock, StreamStore, SystemClock};

/// pending set の 1 件
#[derive(Debug, Clone)]
struct PendingInfo {
    consumer: ConsumerId,
    delivered_at: Instant,
    delivery_count: u64,
}

/// consumer group の状態（cursor + pending set）
#[derive(Debug, Default)]
struct GroupState {
    /// 最後に配送したエントリの id
    cursor: EntryId,
    pending: BTreeMap<EntryId, PendingInfo>,
}

#[derive(Debug, Default)]
struct StreamState {
    /// id 昇順（append のみで伸びる）
    entries: Vec<Entry>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    streams: HashMap<String, StreamState>,
}

impl InMemoryState {
    /// stream と group を引く（どちらかが無ければ GroupMissing）
    fn group_mut(
        &mut self,
        stream: &str,
        group: &str,
    ) -> Result<(&[Entry], &mut GroupState), StoreError> {
        let missing = || StoreError::GroupMissing {
            stream: stream.to_string(),
            group: group.to_string(),
        };
        let StreamState { entries, groups, .. } =
            self.streams.get_mut(stream).ok_or_else(missing)?;
        let group_state = groups.get_mut(group).ok_or_else(missing)?;
        Ok((entries.as_slice(), group_state))
    }

    /// cursor より後ろのエントリを `consumer` に配送する
    fn deliver(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        max_count: usize,
    ) -> Result<Vec<Entry>, StoreError> {
        let (entries, group) = self.group_mut(stream, group)?;

        let start = entries.partition_point(|e| e.id() <= group.cursor);
        let batch: Vec<Entry> = entries[start..].iter().take(max_count).cloned().collect();

        let now = Instant::now();
        for entry in &batch {
            group.pending.insert(
                entry.id(),
                PendingInfo {
                    consumer: consumer.clone(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
        }
        if let Some(last) = batch.last() {
            group.cursor = last.id();
        }
        Ok(batch)
    }
}

/// InMemoryStreamStore はプロセス内のストリームストア
///
/// # 使用例
/// ```ignore
/// let store = InMemoryStreamStore::new();
/// store.ensure_group("orders", "sms").await?;
/// let id = store.append("orders", b"{...}").await?;
/// let batch = store.read_group("orders", "sms", &consumer, 10, Duration::from_secs(5)).await?;
/// ```
pub struct InMemoryStreamStore {
    state: Mutex<InMemoryState>,
    /// append 時の通知用
    notify: Notify,
    clock: Arc<dyn Clock>,
}

impl InMemoryStreamStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            notify: Notify::new(),
            clock,
        }
    }

    /// ストリームに含まれるエントリ数（テスト・デモ用）
    pub async fn len(&self, stream: &str) -> usize {
        let state = self.state.lock().await;
        state.streams.get(stream).map_or(0, |s| s.entries.len())
    }

    pub async fn is_empty(&self, stream: &str) -> bool {
        self.len(stream).await == 0
    }

    /// ストリームの全エントリ（dead-letter の確認用）
    pub async fn entries(&self, stream: &str) -> Vec<Entry> {
        let state = self.state.lock().await;
        state
            .streams
            .get(stream)
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stream_state = state.streams.entry(stream.to_string()).or_default();
        let last_id = stream_state.last_id;
        stream_state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                cursor: last_id,
                pending: BTreeMap::new(),
            });
        Ok(())
    }

    async fn append(&self, stream: &str, payload: &[u8]) -> Result<EntryId, StoreError> {
        let now_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let id = {
            let mut state = self.state.lock().await;
            let stream_state = state.streams.entry(stream.to_string()).or_default();
            let id = EntryId::next_after(stream_state.last_id, now_ms);
            stream_state.entries.push(Entry::new(id, payload));
            stream_state.last_id = id;
            id
        };

        // ロックを手放してから待機中の reader を起こす
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>, StoreError> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                let batch = state.deliver(stream, group, consumer, max_count.max(1))?;
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }

            if block.is_zero() {
                return Ok(Vec::new());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: EntryId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let removed = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .is_some_and(|g| g.pending.remove(&id).is_some());
        Ok(removed)
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, StoreError> {
        let mut state = self.state.lock().await;
        let (_, group) = state.group_mut(stream, group)?;
        let now = Instant::now();
        let pending = group
            .pending
            .iter()
            .map(|(id, info)| PendingEntry {
                id: *id,
                consumer: info.consumer.clone(),
                idle: now.saturating_duration_since(info.delivered_at),
                delivery_count: info.delivery_count,
            })
            .collect();
        Ok(pending)
    }

    async fn pending_owner(
        &self,
        stream: &str,
        group: &str,
        id: EntryId,
    ) -> Result<Option<ConsumerId>, StoreError> {
        let mut state = self.state.lock().await;
        let (_, group) = state.group_mut(stream, group)?;
        Ok(group.pending.get(&id).map(|info| info.consumer.clone()))
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        min_idle: Duration,
        max_count: usize,
    ) -> Result<Vec<Entry>, StoreError> {
        let mut state = self.state.lock().await;
        let (entries, group) = state.group_mut(stream, group)?;

        let now = Instant::now();
        let mut claimed = Vec::new();
        for (id, info) in group.pending.iter_mut() {
            if claimed.len() >= max_count.max(1) {
                break;
            }
            if now.saturating_duration_since(info.delivered_at) < min_idle {
                continue;
            }
            let Ok(idx) = entries.binary_search_by_key(id, |e| e.id()) else {
                continue;
            };
            info.consumer = consumer.clone();
            info.delivered_at = now;
            info.delivery_count += 1;
            claimed.push(entries[idx].clone());
        }
        Ok(claimed)
    }
}
