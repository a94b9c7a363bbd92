/*
 * pool.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spoletta, a low-allocation socket toolkit.
 *
 * Spoletta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Spoletta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Spoletta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Per-host cache of live clients: at most one client per key.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

use crate::error::{Error, Result};

/// Identifies one pooled connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl PoolKey {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }
}

/// Map-like storage behind a [`ConnectionPool`].
pub trait KeyedCache<K, V> {
    fn get(&self, key: &K) -> Option<&V>;
    fn get_mut(&mut self, key: &K) -> Option<&mut V>;
    fn insert(&mut self, key: K, value: V);
    fn remove(&mut self, key: &K) -> Option<V>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V> KeyedCache<K, V> for HashMap<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        HashMap::get(self, key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        HashMap::get_mut(self, key)
    }

    fn insert(&mut self, key: K, value: V) {
        HashMap::insert(self, key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        HashMap::remove(self, key)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// A pooled value that can report whether it is still usable.
pub trait Pooled {
    fn is_available(&self) -> bool;
}

/// Clients keyed by target; dead entries are evicted and recreated once.
pub struct ConnectionPool<V, C = HashMap<PoolKey, V>> {
    cache: C,
    _value: std::marker::PhantomData<V>,
}

impl<V> Default for ConnectionPool<V> {
    fn default() -> Self {
        Self::with_cache(HashMap::new())
    }
}

impl<V> ConnectionPool<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V, C> ConnectionPool<V, C> {
    pub fn with_cache(cache: C) -> Self {
        Self {
            cache,
            _value: std::marker::PhantomData,
        }
    }
}

impl<V: Pooled, C: KeyedCache<PoolKey, V>> ConnectionPool<V, C> {
    /// Return the live client for `key`, creating it with `create` when
    /// absent. A client that is no longer available is evicted and created
    /// again at most once.
    pub fn get_or_connect<F>(&mut self, key: &PoolKey, mut create: F) -> Result<&mut V>
    where
        F: FnMut(&PoolKey) -> Result<V>,
    {
        let mut recreated = false;
        loop {
            if self.cache.get(key).is_none() {
                let value = create(key)?;
                self.cache.insert(key.clone(), value);
            }
            if self.cache.get(key).is_some_and(Pooled::is_available) {
                break;
            }
            self.cache.remove(key);
            if recreated {
                debug!(host = %key.host, port = key.port, "recreated client is not available");
                return Err(Error::ConnectionClosed);
            }
            debug!(host = %key.host, port = key.port, "evicting dead client");
            recreated = true;
        }
        self.cache.get_mut(key).ok_or(Error::ConnectionClosed)
    }

    pub fn get_mut(&mut self, key: &PoolKey) -> Option<&mut V> {
        self.cache.get_mut(key)
    }

    pub fn remove(&mut self, key: &PoolKey) -> Option<V> {
        self.cache.remove(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Conn {
        id: u32,
        alive: bool,
    }

    impl Pooled for Conn {
        fn is_available(&self) -> bool {
            self.alive
        }
    }

    fn key() -> PoolKey {
        PoolKey::new("api.example.com", 443, true)
    }

    #[test]
    fn creates_once_and_reuses() {
        let mut pool = ConnectionPool::new();
        let created = Cell::new(0);
        let mut create = |_: &PoolKey| {
            created.set(created.get() + 1);
            Ok(Conn {
                id: created.get(),
                alive: true,
            })
        };
        assert_eq!(pool.get_or_connect(&key(), &mut create).unwrap().id, 1);
        assert_eq!(pool.get_or_connect(&key(), &mut create).unwrap().id, 1);
        assert_eq!(created.get(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn dead_client_is_replaced() {
        let mut pool = ConnectionPool::new();
        pool.get_or_connect(&key(), |_| Ok(Conn { id: 1, alive: true }))
            .unwrap()
            .alive = false;
        let conn = pool
            .get_or_connect(&key(), |_| Ok(Conn { id: 2, alive: true }))
            .unwrap();
        assert_eq!(conn.id, 2);
    }

    #[test]
    fn recreation_is_bounded() {
        let mut pool = ConnectionPool::new();
        let attempts = Cell::new(0);
        let result = pool.get_or_connect(&key(), |_| {
            attempts.set(attempts.get() + 1);
            Ok(Conn { id: 0, alive: false })
        });
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(attempts.get(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn create_error_propagates() {
        let mut pool: ConnectionPool<Conn> = ConnectionPool::new();
        let result = pool.get_or_connect(&key(), |_| Err(Error::Config("no route".into())));
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(pool.is_empty());
    }

    #[test]
    fn keys_are_distinct() {
        let mut pool = ConnectionPool::new();
        pool.get_or_connect(&key(), |_| Ok(Conn { id: 1, alive: true }))
            .unwrap();
        let plain = PoolKey::new("api.example.com", 80, false);
        pool.get_or_connect(&plain, |_| Ok(Conn { id: 2, alive: true }))
            .unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.remove(&plain).map(|c| c.id), Some(2));
    }
}
