//! RedisStreamStore - 本番用のストリームストア（Redis Streams）
//!
//! | 操作          | コマンド                                  |
//! |---------------|-------------------------------------------|
//! | ensure_group  | `XGROUP CREATE <stream> <group> $ MKSTREAM` |
//! | append        | `XADD <stream> * data <payload>`          |
//! | read_group    | `XREADGROUP GROUP <group> <consumer> ... >` |
//! | ack           | `XACK`                                    |
//! | pending       | `XPENDING <stream> <group> - + <count>`   |
//! | pending_owner | `XPENDING <stream> <group> <id> <id> 1`   |
//! | claim_stale   | `XAUTOCLAIM`                              |
//!
//! エントリは `data` フィールド 1 つだけを持ちます。`data` が無いエントリは空 payload として返し、
//! decode 失敗（poison）として処理されます。
//!
//! blocking read は接続を占有するので、プールから呼び出しごとに接続を借ります。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::streams::{StreamId, StreamPendingCountReply, StreamReadOptions};
use deadpool_redis::redis::{AsyncCommands, RedisError, Value as RedisValue, cmd};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tracing::{debug, warn};

use crate::domain::{ConsumerId, Entry, EntryId, PendingEntry, StoreError};
use crate::ports::StreamStore;

/// エントリの payload を入れるフィールド名
pub const DATA_FIELD: &str = "data";

/// `pending()` で一度に取得する上限
const PENDING_SCAN_LIMIT: usize = 10_000;

#[derive(Clone)]
pub struct RedisStreamStore {
    pool: Pool,
}

impl RedisStreamStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// `redis://host:port/db` からプールを作る（接続はまだ張らない）
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(format!("failed to create redis pool: {e}")))?;
        Ok(Self::new(pool))
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to get redis connection: {e}")))
    }
}

fn map_redis_error(stream: &str, group: &str, err: RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() || err.is_connection_refusal() {
        return StoreError::Unavailable(err.to_string());
    }
    if err.code() == Some("NOGROUP") {
        return StoreError::GroupMissing {
            stream: stream.to_string(),
            group: group.to_string(),
        };
    }
    StoreError::Command(err.to_string())
}

fn parse_id(raw: &str) -> Result<EntryId, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Command(format!("unexpected stream id from redis: {e}")))
}

/// XREADGROUP / XAUTOCLAIM の 1 件を Entry に変換
fn entry_from_stream_id(stream_id: &StreamId) -> Result<Entry, StoreError> {
    let id = parse_id(&stream_id.id)?;
    let payload = payload_from_fields(&stream_id.map);
    if payload.is_none() {
        warn!(entry_id = %id, "Stream entry has no data field");
    }
    Ok(Entry::new(id, payload.unwrap_or_default()))
}

/// XREADGROUP の返り値。タイムアウト時は Nil、RESP3 では stream 名をキーにした Map
fn entries_from_read_reply(reply: &RedisValue) -> Result<Vec<Entry>, StoreError> {
    match reply {
        RedisValue::Nil => Ok(Vec::new()),
        RedisValue::Array(streams) => {
            let mut entries = Vec::new();
            for stream in streams {
                let RedisValue::Array(parts) = stream else {
                    return Err(malformed("XREADGROUP stream", stream));
                };
                let [_name, ids] = parts.as_slice() else {
                    return Err(malformed("XREADGROUP stream", stream));
                };
                entries.extend(entries_from_id_list(ids)?);
            }
            Ok(entries)
        }
        RedisValue::Map(streams) => {
            let mut entries = Vec::new();
            for (_name, ids) in streams {
                entries.extend(entries_from_id_list(ids)?);
            }
            Ok(entries)
        }
        other => Err(malformed("XREADGROUP reply", other)),
    }
}

/// XAUTOCLAIM の返り値。6.2 は `[next, claimed]`、7.0 以降は `[next, claimed, deleted]`
fn entries_from_autoclaim_reply(reply: &RedisValue) -> Result<Vec<Entry>, StoreError> {
    match reply {
        RedisValue::Array(items) if matches!(items.len(), 2 | 3) => {
            entries_from_id_list(&items[1])
        }
        other => Err(malformed("XAUTOCLAIM reply", other)),
    }
}

fn entries_from_id_list(list: &RedisValue) -> Result<Vec<Entry>, StoreError> {
    match list {
        RedisValue::Nil => Ok(Vec::new()),
        RedisValue::Array(items) => items.iter().map(entry_from_value).collect(),
        other => Err(malformed("stream entry list", other)),
    }
}

/// `[id, [field, value, ...]]` の 1 件
///
/// 6.2 の XAUTOCLAIM は削除済みエントリの fields を Nil で返す。
fn entry_from_value(value: &RedisValue) -> Result<Entry, StoreError> {
    let RedisValue::Array(parts) = value else {
        return Err(malformed("stream entry", value));
    };
    let [id, fields] = parts.as_slice() else {
        return Err(malformed("stream entry", value));
    };
    let id = string_from_value(id).ok_or_else(|| malformed("stream entry id", id))?;
    let map = match fields {
        RedisValue::Nil => HashMap::new(),
        RedisValue::Array(flat) => flat
            .chunks_exact(2)
            .filter_map(|kv| Some((string_from_value(&kv[0])?, kv[1].clone())))
            .collect(),
        RedisValue::Map(pairs) => pairs
            .iter()
            .filter_map(|(k, v)| Some((string_from_value(k)?, v.clone())))
            .collect(),
        other => return Err(malformed("stream entry fields", other)),
    };
    entry_from_stream_id(&StreamId { id, map })
}

fn string_from_value(value: &RedisValue) -> Option<String> {
    match value {
        RedisValue::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        RedisValue::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn malformed(what: &str, value: &RedisValue) -> StoreError {
    StoreError::Command(format!("malformed {what}: {value:?}"))
}

fn payload_from_fields(map: &HashMap<String, RedisValue>) -> Option<Vec<u8>> {
    match map.get(DATA_FIELD)? {
        RedisValue::BulkString(bytes) => Some(bytes.clone()),
        RedisValue::SimpleString(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let result: Result<(), RedisError> = cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!(stream, group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(map_redis_error(stream, group, e)),
        }
    }

    async fn append(&self, stream: &str, payload: &[u8]) -> Result<EntryId, StoreError> {
        let mut conn = self.conn().await?;
        let id: String = conn
            .xadd(stream, "*", &[(DATA_FIELD, payload)])
            .await
            .map_err(|e| map_redis_error(stream, "", e))?;
        parse_id(&id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>, StoreError> {
        let mut conn = self.conn().await?;
        let mut opts = StreamReadOptions::default()
            .group(group, consumer.as_str())
            .count(max_count.max(1));
        // BLOCK 0 は「無期限」なので、待たない場合はオプション自体を付けない
        if !block.is_zero() {
            opts = opts.block(block.as_millis().max(1) as usize);
        }

        let reply: RedisValue = conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(|e| map_redis_error(stream, group, e))?;
        entries_from_read_reply(&reply)
    }

    async fn ack(&self, stream: &str, group: &str, id: EntryId) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .xack(stream, group, &[id.to_string()])
            .await
            .map_err(|e| map_redis_error(stream, group, e))?;
        Ok(removed > 0)
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let reply: StreamPendingCountReply = conn
            .xpending_count(stream, group, "-", "+", PENDING_SCAN_LIMIT)
            .await
            .map_err(|e| map_redis_error(stream, group, e))?;

        reply
            .ids
            .iter()
            .map(|p| {
                Ok(PendingEntry {
                    id: parse_id(&p.id)?,
                    consumer: ConsumerId::new(p.consumer.clone()),
                    idle: Duration::from_millis(p.last_delivered_ms as u64),
                    delivery_count: p.times_delivered as u64,
                })
            })
            .collect()
    }

    async fn pending_owner(
        &self,
        stream: &str,
        group: &str,
        id: EntryId,
    ) -> Result<Option<ConsumerId>, StoreError> {
        let mut conn = self.conn().await?;
        let id = id.to_string();
        let reply: StreamPendingCountReply = conn
            .xpending_count(stream, group, &id, &id, 1)
            .await
            .map_err(|e| map_redis_error(stream, group, e))?;
        Ok(reply.ids.into_iter().next().map(|p| ConsumerId::new(p.consumer)))
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &ConsumerId,
        min_idle: Duration,
        max_count: usize,
    ) -> Result<Vec<Entry>, StoreError> {
        let mut conn = self.conn().await?;
        let reply: RedisValue = cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer.as_str())
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(max_count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(stream, group, e))?;
        entries_from_autoclaim_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_redis::redis::ErrorKind as RedisErrorKind;

    fn stream_id(id: &str, fields: &[(&str, RedisValue)]) -> StreamId {
        StreamId {
            id: id.to_string(),
            map: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn data_field_becomes_the_payload() {
        let raw = stream_id(
            "1700000000000-3",
            &[(DATA_FIELD, RedisValue::BulkString(b"{\"a\":1}".to_vec()))],
        );
        let entry = entry_from_stream_id(&raw).unwrap();
        assert_eq!(entry.id(), EntryId::new(1_700_000_000_000, 3));
        assert_eq!(entry.payload(), b"{\"a\":1}");
    }

    #[test]
    fn missing_data_field_yields_empty_payload() {
        let raw = stream_id(
            "5-0",
            &[("other", RedisValue::BulkString(b"x".to_vec()))],
        );
        let entry = entry_from_stream_id(&raw).unwrap();
        assert!(entry.payload().is_empty());
    }

    #[test]
    fn malformed_stream_ids_are_command_errors() {
        let raw = stream_id("not-an-id", &[]);
        assert!(matches!(
            entry_from_stream_id(&raw),
            Err(StoreError::Command(_))
        ));
    }

    fn bulk(s: &str) -> RedisValue {
        RedisValue::BulkString(s.as_bytes().to_vec())
    }

    fn wire_entry(id: &str, payload: &str) -> RedisValue {
        RedisValue::Array(vec![
            bulk(id),
            RedisValue::Array(vec![bulk(DATA_FIELD), bulk(payload)]),
        ])
    }

    fn ids(entries: &[Entry]) -> Vec<EntryId> {
        entries.iter().map(Entry::id).collect()
    }

    #[test]
    fn read_timeout_reply_is_an_empty_batch() {
        assert!(entries_from_read_reply(&RedisValue::Nil).unwrap().is_empty());
    }

    #[test]
    fn read_reply_flattens_stream_entries() {
        let reply = RedisValue::Array(vec![RedisValue::Array(vec![
            bulk("order_events"),
            RedisValue::Array(vec![wire_entry("10-0", "a"), wire_entry("10-1", "b")]),
        ])]);
        let entries = entries_from_read_reply(&reply).unwrap();
        assert_eq!(ids(&entries), vec![EntryId::new(10, 0), EntryId::new(10, 1)]);
        assert_eq!(entries[1].payload(), b"b");
    }

    #[test]
    fn resp3_read_reply_is_a_map_keyed_by_stream() {
        let reply = RedisValue::Map(vec![(
            bulk("order_events"),
            RedisValue::Array(vec![wire_entry("7-0", "x")]),
        )]);
        let entries = entries_from_read_reply(&reply).unwrap();
        assert_eq!(ids(&entries), vec![EntryId::new(7, 0)]);
    }

    #[test]
    fn autoclaim_reply_from_redis_6_2() {
        // [next, claimed]。削除済みエントリは fields が Nil
        let reply = RedisValue::Array(vec![
            bulk("0-0"),
            RedisValue::Array(vec![
                wire_entry("3-0", "{}"),
                RedisValue::Array(vec![bulk("4-0"), RedisValue::Nil]),
            ]),
        ]);
        let entries = entries_from_autoclaim_reply(&reply).unwrap();
        assert_eq!(ids(&entries), vec![EntryId::new(3, 0), EntryId::new(4, 0)]);
        assert_eq!(entries[0].payload(), b"{}");
        assert!(entries[1].payload().is_empty());
    }

    #[test]
    fn autoclaim_reply_from_redis_7() {
        // [next, claimed, deleted]
        let reply = RedisValue::Array(vec![
            bulk("9-0"),
            RedisValue::Array(vec![wire_entry("5-2", "p")]),
            RedisValue::Array(vec![bulk("6-0")]),
        ]);
        let entries = entries_from_autoclaim_reply(&reply).unwrap();
        assert_eq!(ids(&entries), vec![EntryId::new(5, 2)]);
        assert_eq!(entries[0].payload(), b"p");
    }

    #[test]
    fn autoclaim_with_nothing_to_claim() {
        let reply = RedisValue::Array(vec![
            bulk("0-0"),
            RedisValue::Array(vec![]),
            RedisValue::Array(vec![]),
        ]);
        assert!(entries_from_autoclaim_reply(&reply).unwrap().is_empty());
    }

    #[rstest::rstest]
    #[case::not_an_array(RedisValue::Int(1))]
    #[case::too_short(RedisValue::Array(vec![bulk("0-0")]))]
    #[case::entry_without_fields(RedisValue::Array(vec![
        bulk("0-0"),
        RedisValue::Array(vec![RedisValue::Array(vec![bulk("1-0")])]),
    ]))]
    fn malformed_autoclaim_replies_are_command_errors(#[case] reply: RedisValue) {
        assert!(matches!(
            entries_from_autoclaim_reply(&reply),
            Err(StoreError::Command(_))
        ));
    }

    #[test]
    fn io_errors_map_to_unavailable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(
            map_redis_error("s", "g", err),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn other_server_errors_map_to_command() {
        let err = RedisError::from((RedisErrorKind::ResponseError, "WRONGTYPE", "bad".to_string()));
        assert!(matches!(
            map_redis_error("s", "g", err),
            StoreError::Command(_)
        ));
    }
}
