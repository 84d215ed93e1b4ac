//! Redis shared cache
//!
//! Every call clones the `ConnectionManager`, which multiplexes over one
//! connection and reconnects on its own after a drop.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;

use super::SharedCache;
use crate::error::CacheResult;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Opens a managed connection to `url`.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self::new(conn))
    }
}

/// Redis TTLs are whole seconds; anything shorter rounds up to one.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (member, score) in members {
            cmd.arg(*score).arg(member);
        }
        let mut conn = self.conn.clone();
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn zrevrange(&self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let members = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<_, Vec<String>>(&mut conn)
            .await?;
        Ok(members)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
