//! Read-through / write-through cache over the metadata store.
//!
//! The cache is advisory. Nothing here ever fabricates a value: a miss is
//! reported to the caller, which resolves it against the store and writes
//! the result back.
//!
//! Two kinds of entries live in the backend:
//! - objects under `"{prefix}:{scope}:{id}"`, each remembering which lists
//!   reference it (its parents)
//! - lists under `"{prefix}:{scope}:{sub..}:list"`, holding member keys. An
//!   empty member list is the "known empty" marker; an absent key means the
//!   list was never cached.

pub mod backend;
pub mod pattern;

pub use backend::{CacheBackend, LruCacheBackend};

use crate::config::MetaConfig;
use crate::core::Result;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Cache namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Model,
    ModelAlias,
    Column,
    ColRollup,
    ColLookup,
    ColRelation,
    ColSelectOption,
    ColFormula,
    View,
    GridViewColumn,
}

impl CacheScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheScope::Model => "model",
            CacheScope::ModelAlias => "model_alias",
            CacheScope::Column => "column",
            CacheScope::ColRollup => "col_rollup",
            CacheScope::ColLookup => "col_lookup",
            CacheScope::ColRelation => "col_relation",
            CacheScope::ColSelectOption => "col_select_option",
            CacheScope::ColFormula => "col_formula",
            CacheScope::View => "view",
            CacheScope::GridViewColumn => "grid_view_column",
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way [`Cache::deep_del`] walks the parent/child relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDelDirection {
    /// Drop the object from every list that references it, then the object
    ChildToParent,
    /// Drop every member of a list, then the list
    ParentToChild,
}

/// Anything that can be a list member: it knows its own id
pub trait CacheItem {
    fn cache_id(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum CacheEntry {
    Object { value: Value, parents: Vec<String> },
    List { members: Vec<String> },
}

/// Result of [`Cache::get_list`]
#[derive(Debug, Clone, PartialEq)]
pub struct CachedList<T> {
    pub items: Vec<T>,
    /// The list is cached and confirmed to have no members
    pub is_known_empty: bool,
}

impl<T> CachedList<T> {
    fn not_cached() -> Self {
        Self {
            items: Vec::new(),
            is_known_empty: false,
        }
    }

    /// False means the caller has to query the store
    pub fn is_cached(&self) -> bool {
        self.is_known_empty || !self.items.is_empty()
    }
}

#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    prefix: Arc<str>,
    enabled: bool,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &MetaConfig) -> Self {
        Self {
            backend,
            prefix: Arc::from(config.cache_prefix.as_str()),
            enabled: config.cache_enabled,
        }
    }

    /// Cache backed by an in-process LRU sized from `config`
    pub fn from_config(config: &MetaConfig) -> Self {
        Self::new(
            Arc::new(LruCacheBackend::new(config.cache_capacity)),
            config,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Object key: `"{prefix}:{scope}:{id}"`
    pub fn key(&self, scope: CacheScope, id: &str) -> String {
        format!("{}:{}:{}", self.prefix, scope, id)
    }

    /// List key: `"{prefix}:{scope}:{sub1}:...:list"`
    pub fn list_key(&self, scope: CacheScope, sub_keys: &[&str]) -> String {
        let mut key = format!("{}:{}", self.prefix, scope);
        for sub in sub_keys {
            key.push(':');
            key.push_str(sub);
        }
        key.push_str(":list");
        key
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(entry)?;
        self.backend.set(key, bytes).await
    }

    async fn parents_of(&self, key: &str) -> Result<Vec<String>> {
        Ok(match self.read_entry(key).await? {
            Some(CacheEntry::Object { parents, .. }) => parents,
            _ => Vec::new(),
        })
    }

    /// Cached object under `key`, decoded as `T`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if !self.enabled {
            return Ok(None);
        }

        match self.read_entry(key).await? {
            Some(CacheEntry::Object { value, .. }) => Ok(Some(serde_json::from_value(value)?)),
            Some(CacheEntry::List { .. }) => {
                debug!("cache key '{}' holds a list, expected an object", key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Store an object, keeping the list memberships it already had
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let parents = self.parents_of(key).await?;
        let entry = CacheEntry::Object {
            value: serde_json::to_value(value)?,
            parents,
        };
        self.write_entry(key, &entry).await
    }

    /// Members of a cached list.
    ///
    /// A list with a member that is no longer cached is dropped and reported
    /// as not cached, so callers never see a partial list.
    pub async fn get_list<T: DeserializeOwned>(
        &self,
        scope: CacheScope,
        sub_keys: &[&str],
    ) -> Result<CachedList<T>> {
        if !self.enabled {
            return Ok(CachedList::not_cached());
        }

        let list_key = self.list_key(scope, sub_keys);
        let members = match self.read_entry(&list_key).await? {
            Some(CacheEntry::List { members }) => members,
            _ => return Ok(CachedList::not_cached()),
        };

        if members.is_empty() {
            return Ok(CachedList {
                items: Vec::new(),
                is_known_empty: true,
            });
        }

        let mut items = Vec::with_capacity(members.len());
        for member in &members {
            match self.read_entry(member).await? {
                Some(CacheEntry::Object { value, .. }) => items.push(serde_json::from_value(value)?),
                _ => {
                    debug!(
                        "cache list '{}' lost member '{}', invalidating list",
                        list_key, member
                    );
                    self.backend.del(&[list_key]).await?;
                    return Ok(CachedList::not_cached());
                }
            }
        }

        Ok(CachedList {
            items,
            is_known_empty: false,
        })
    }

    /// Cache a complete list (possibly empty) and each of its items
    pub async fn set_list<T: Serialize + CacheItem>(
        &self,
        scope: CacheScope,
        sub_keys: &[&str],
        items: &[T],
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let list_key = self.list_key(scope, sub_keys);
        let mut members = Vec::with_capacity(items.len());

        for item in items {
            let key = self.key(scope, item.cache_id());
            let mut parents = self.parents_of(&key).await?;
            if !parents.contains(&list_key) {
                parents.push(list_key.clone());
            }
            let entry = CacheEntry::Object {
                value: serde_json::to_value(item)?,
                parents,
            };
            self.write_entry(&key, &entry).await?;
            members.push(key);
        }

        self.write_entry(&list_key, &CacheEntry::List { members })
            .await
    }

    /// Add `key` to an already cached list.
    ///
    /// Returns false (and does nothing) when the list is not cached: a
    /// list holding only the appended key would look complete when it isn't.
    pub async fn append_to_list(
        &self,
        scope: CacheScope,
        sub_keys: &[&str],
        key: &str,
    ) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }

        let list_key = self.list_key(scope, sub_keys);
        let mut members = match self.read_entry(&list_key).await? {
            Some(CacheEntry::List { members }) => members,
            _ => return Ok(false),
        };

        if !members.iter().any(|m| m == key) {
            members.push(key.to_string());
        }
        self.write_entry(&list_key, &CacheEntry::List { members })
            .await?;

        if let Some(CacheEntry::Object { value, mut parents }) = self.read_entry(key).await? {
            if !parents.contains(&list_key) {
                parents.push(list_key);
                self.write_entry(key, &CacheEntry::Object { value, parents })
                    .await?;
            }
        }

        Ok(true)
    }

    pub async fn del(&self, keys: &[String]) -> Result<()> {
        if !self.enabled || keys.is_empty() {
            return Ok(());
        }
        self.backend.del(keys).await
    }

    /// Delete every key in `scope` matching the glob `pattern`
    pub async fn del_all(&self, scope: CacheScope, pattern: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let keys = self
            .backend
            .keys(&format!("{}:{}:{}", self.prefix, scope, pattern))
            .await?;
        self.del(&keys).await
    }

    /// Cascading eviction along the list membership relation
    pub async fn deep_del(&self, key: &str, direction: CacheDelDirection) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match (direction, self.read_entry(key).await?) {
            (CacheDelDirection::ChildToParent, Some(CacheEntry::Object { parents, .. })) => {
                for list_key in parents {
                    if let Some(CacheEntry::List { mut members }) =
                        self.read_entry(&list_key).await?
                    {
                        members.retain(|m| m != key);
                        self.write_entry(&list_key, &CacheEntry::List { members })
                            .await?;
                    }
                }
                self.backend.del(&[key.to_string()]).await
            }
            (CacheDelDirection::ParentToChild, Some(CacheEntry::List { mut members })) => {
                members.push(key.to_string());
                self.backend.del(&members).await
            }
            (_, Some(_)) => self.backend.del(&[key.to_string()]).await,
            (_, None) => Ok(()),
        }
    }
}
