//! Redis-backed record store
//!
//! Each record is a hash. Conditional writes run as Lua scripts so the
//! guard check and the write happen in one server-side step.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::{CasOutcome, Fields, RecordStore, StoreError, StoreResult};

/// KEYS[1] = record key; ARGV[1] = ttl seconds; ARGV[2..] = field/value pairs
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 1
"#;

/// KEYS[1] = record key; ARGV[1] = ttl seconds; ARGV[2] = guard field;
/// ARGV[3] = number of expected values; then the expected values; then
/// field/value pairs to write.
const CAS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {'missing'}
end
local current = redis.call('HGET', KEYS[1], ARGV[2])
local n = tonumber(ARGV[3])
local matched = false
for i = 1, n do
    if current == ARGV[3 + i] then
        matched = true
    end
end
if not matched then
    if current then
        return {'mismatch', current}
    end
    return {'mismatch'}
end
redis.call('HSET', KEYS[1], unpack(ARGV, 4 + n))
redis.call('EXPIRE', KEYS[1], ARGV[1])
local reply = redis.call('HGETALL', KEYS[1])
table.insert(reply, 1, 'applied')
return reply
"#;

const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    create: Script,
    cas: Script,
}

impl RedisStore {
    /// Connect to Redis (e.g. "redis://localhost:6379")
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!("Redis connection manager ready");

        Ok(Self {
            conn,
            create: Script::new(CREATE_SCRIPT),
            cas: Script::new(CAS_SCRIPT),
        })
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    StoreError::Command(e.to_string())
}

/// Redis rejects EXPIRE 0, so sub-second TTLs round up
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn pairs_to_fields(flat: Vec<String>) -> StoreResult<Fields> {
    if flat.len() % 2 != 0 {
        return Err(StoreError::Reply(format!(
            "odd number of hash elements: {}",
            flat.len()
        )));
    }
    let mut fields = Fields::new();
    let mut iter = flat.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        fields.insert(k, v);
    }
    Ok(fields)
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn create_if_absent(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut invocation = self.create.key(key);
        invocation.arg(ttl_seconds(ttl));
        for (field, value) in fields {
            invocation.arg(field).arg(value);
        }

        let created: i64 = invocation
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(command_error)?;
        Ok(created == 1)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &[&str],
        updates: &Fields,
        ttl: Duration,
    ) -> StoreResult<CasOutcome> {
        let mut invocation = self.cas.key(key);
        invocation
            .arg(ttl_seconds(ttl))
            .arg(field)
            .arg(expected.len());
        for value in expected {
            invocation.arg(*value);
        }
        for (name, value) in updates {
            invocation.arg(name).arg(value);
        }

        let reply: Vec<String> = invocation
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(command_error)?;

        let mut reply = reply.into_iter();
        match reply.next().as_deref() {
            Some("applied") => Ok(CasOutcome::Applied(pairs_to_fields(reply.collect())?)),
            Some("mismatch") => Ok(CasOutcome::Mismatch(reply.next())),
            Some("missing") => Ok(CasOutcome::Missing),
            other => Err(StoreError::Reply(format!(
                "unknown compare-and-set reply: {:?}",
                other
            ))),
        }
    }

    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>> {
        let flat: Vec<String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(command_error)?;

        // HGETALL answers an empty list for a missing key
        if flat.is_empty() {
            return Ok(None);
        }
        pairs_to_fields(flat).map(Some)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(command_error)?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(command_error)?;
        Ok(applied == 1)
    }

    async fn scan(&self, prefix: &str, limit: usize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;

            keys.extend(batch);
            if next == 0 || keys.len() >= limit {
                break;
            }
            cursor = next;
        }

        keys.truncate(limit);
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        let reply: String = redis::cmd("PING")
            .query_async(&mut self.conn.clone())
            .await
            .map_err(command_error)?;
        if reply != "PONG" {
            return Err(StoreError::Reply(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_to_fields() {
        let fields = pairs_to_fields(vec![
            "status".to_string(),
            "PENDING".to_string(),
            "job_id".to_string(),
            "1".to_string(),
        ])
        .unwrap();
        assert_eq!(fields.get("status").map(String::as_str), Some("PENDING"));
        assert!(pairs_to_fields(vec!["dangling".to_string()]).is_err());
    }

    #[test]
    fn test_ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(86_400)), 86_400);
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_redis_compare_and_set() {
        let store = RedisStore::connect(&redis_url()).await.unwrap();
        let key = format!("framewise-test:{}", std::process::id());
        let _ = store.delete(&key).await;

        let mut fields = Fields::new();
        fields.insert("status".to_string(), "PENDING".to_string());
        let ttl = Duration::from_secs(30);

        assert!(store.create_if_absent(&key, &fields, ttl).await.unwrap());
        assert!(!store.create_if_absent(&key, &fields, ttl).await.unwrap());

        let mut updates = Fields::new();
        updates.insert("status".to_string(), "PROCESSING".to_string());
        let applied = store
            .compare_and_set(&key, "status", &["PENDING"], &updates, ttl)
            .await
            .unwrap();
        assert!(matches!(applied, CasOutcome::Applied(f) if f["status"] == "PROCESSING"));

        let rejected = store
            .compare_and_set(&key, "status", &["PENDING"], &updates, ttl)
            .await
            .unwrap();
        assert_eq!(rejected, CasOutcome::Mismatch(Some("PROCESSING".to_string())));

        assert!(store.delete(&key).await.unwrap());
        assert_eq!(store.get_all(&key).await.unwrap(), None);
        store.ping().await.unwrap();
    }
}
