//! Kernel column cache
//!
//! The solver pulls whole columns of the l*l kernel matrix, so the cache
//! stores columns rather than individual entries. Columns are materialized
//! lazily, evicted least-recently-requested first, and kept index-consistent
//! when the shrinking heuristic swaps vector positions.
//!
//! The budget is expressed in cache units (cached similarity values, f32
//! like the classic implementations), not bytes. At least two columns are
//! always allowed since one alpha-pair update touches two columns.

use lru::LruCache;
use std::num::NonZeroUsize;

/// Bounded cache of kernel matrix columns keyed by logical column index
pub struct ColumnCache {
    columns: LruCache<usize, Vec<f32>>,
    hits: u64,
    misses: u64,
}

impl ColumnCache {
    /// Create a cache for an `l`-vector problem with the given unit budget
    ///
    /// The column capacity is `budget_units / l`, floored at two columns.
    pub fn new(l: usize, budget_units: usize) -> Self {
        let capacity = (budget_units / l.max(1)).max(2);
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(2).unwrap());
        Self {
            columns: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Get column `i` with at least `len` slots, materializing it if absent
    ///
    /// Returns the column buffer and the number of leading entries that
    /// already hold valid data; the caller fills `[filled, len)`. Requesting
    /// a new column may evict the least-recently-requested one.
    pub fn column(&mut self, i: usize, len: usize) -> (&mut Vec<f32>, usize) {
        let existed = self.columns.contains(&i);
        if !existed {
            self.columns.put(i, Vec::new());
        }
        let column = self
            .columns
            .get_mut(&i)
            .expect("column present after insertion");
        let filled = column.len().min(len);
        if existed && filled == len {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        if column.len() < len {
            column.resize(len, 0.0);
        }
        (column, filled)
    }

    /// Keep cached data consistent when vector positions `i` and `j` swap
    ///
    /// The two columns exchange keys, and every cached column long enough to
    /// cover both positions swaps its entries. A column covering only one of
    /// the two positions can no longer be trusted and is dropped.
    pub fn swap_index(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };

        let col_i = self.columns.pop(&i);
        let col_j = self.columns.pop(&j);
        if let Some(col) = col_i {
            self.columns.put(j, col);
        }
        if let Some(col) = col_j {
            self.columns.put(i, col);
        }

        let mut stale = Vec::new();
        for (&key, column) in self.columns.iter_mut() {
            if column.len() > j {
                column.swap(i, j);
            } else if column.len() > i {
                stale.push(key);
            }
        }
        for key in stale {
            self.columns.pop(&key);
        }
    }

    /// Drop all cached columns, e.g. between independent runs
    pub fn clear(&mut self) {
        self.columns.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity_columns: self.columns.cap().get(),
            cached_columns: self.columns.len(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity_columns: usize,
    pub cached_columns: usize,
}
