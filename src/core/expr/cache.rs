//! LRU cache of parsed expressions
//!
//! Repeated queries skip the parser. Trees are shared behind `Arc` so a hit
//! is a pointer copy.

use super::Expr;
use crate::error::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// LRU cache keyed by the expression string
pub struct ExprCache {
    /// `None` when caching is disabled
    cache: Option<LruCache<String, Arc<Expr>>>,
}

impl ExprCache {
    /// Create a cache holding up to `capacity` trees; 0 disables it
    pub fn new(capacity: usize) -> Self {
        ExprCache {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    pub fn get(&mut self, input: &str) -> Option<Arc<Expr>> {
        self.cache.as_mut()?.get(input).cloned()
    }

    pub fn put(&mut self, input: &str, expr: Arc<Expr>) {
        if let Some(cache) = self.cache.as_mut() {
            cache.put(input.to_string(), expr);
        }
    }

    /// Cached tree for `input`, parsing and caching it on a miss
    ///
    /// Parse failures are not cached.
    pub fn get_or_parse(&mut self, input: &str) -> Result<Arc<Expr>> {
        if let Some(expr) = self.get(input) {
            return Ok(expr);
        }
        let expr = Arc::new(Expr::parse(input)?);
        self.put(input, Arc::clone(&expr));
        Ok(expr)
    }

    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
