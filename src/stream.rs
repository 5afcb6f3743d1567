//! Lazy, pull-based paged read streams.
//!
//! Reads are exposed as iterators: no storage fetch happens until a result
//! is pulled, each independent consumption owns its own pagination cursor,
//! and dropping the iterator stops further fetches. [`EdgeStream`] merges
//! rows across every shard of the resolved groups in descending version
//! order, deduplicates to the newest version per logical edge, and filters
//! edge- and node-level tombstones. Both streams enforce the configured
//! read SLA: a poll past the deadline yields a single
//! [`GraphError::ReadTimeout`] and the stream fuses.

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::graph::meta::DirectedEdgeMeta;
use crate::graph::types::{escape_key_part, now_millis, ApplicationScope, Edge, Id, MarkedEdge};
use crate::maintenance::Task;
use crate::serialization::{
    decode_marked_edge, edge_shard_prefix, edge_version_start, version_row_prefix,
    EdgeSerialization,
};
use crate::shard::NodeShardCache;
use crate::storage::{key_after, prefix_end, KeyValue, StorageBackend};
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

/// Merge order across shard scans: descending version, then ascending
/// logical key; at an exact tie the tombstone row wins so deduplication
/// hides every older live row under it.
fn sorts_before(a: &(MarkedEdge, String), b: &(MarkedEdge, String)) -> bool {
    let ((a_edge, a_key), (b_edge, b_key)) = (a, b);
    a_edge.edge.version > b_edge.edge.version
        || (a_edge.edge.version == b_edge.edge.version
            && (a_key < b_key || (a_key == b_key && a_edge.deleted && !b_edge.deleted)))
}

/// Buffered forward scan over one key range, fetched page by page.
struct RowIter {
    storage: Arc<dyn StorageBackend>,
    next_start: Vec<u8>,
    end: Vec<u8>,
    page_size: usize,
    buf: VecDeque<KeyValue>,
    exhausted: bool,
}

impl RowIter {
    fn new(storage: Arc<dyn StorageBackend>, start: Vec<u8>, end: Vec<u8>, page_size: usize) -> Self {
        Self {
            storage,
            next_start: start,
            end,
            page_size: page_size.max(1),
            buf: VecDeque::new(),
            exhausted: false,
        }
    }

    fn next_row(&mut self) -> Result<Option<KeyValue>> {
        if self.buf.is_empty() && !self.exhausted {
            let rows = self
                .storage
                .scan_range(&self.next_start, &self.end, self.page_size)?;
            if rows.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some((last_key, _)) = rows.last() {
                self.next_start = key_after(last_key);
            }
            self.buf.extend(rows);
        }
        Ok(self.buf.pop_front())
    }
}

/// What an [`EdgeStream`] scans once it is first polled.
enum EdgeSource {
    /// One meta's adjacency rows across all of its shards.
    Adjacency {
        cache: Arc<NodeShardCache>,
        meta: DirectedEdgeMeta,
        audit: Option<Sender<Task>>,
    },
    /// The version index of one logical edge.
    Versions {
        source: Id,
        edge_type: String,
        target: Id,
    },
}

/// A lazy, paged, cursor-resumable stream of edges in descending version order.
///
/// Returned by the `load_*` operations on [`GraphManager`](crate::GraphManager).
pub struct EdgeStream {
    storage: Arc<dyn StorageBackend>,
    serialization: EdgeSerialization,
    config: Arc<GraphConfig>,
    scope: ApplicationScope,
    max_version: u64,
    /// Exclusive resume point: (version, logical key)
    after: Option<(u64, String)>,
    dedup: bool,
    filter_tombstones: bool,
    source: Option<EdgeSource>,
    iters: Vec<RowIter>,
    heads: Vec<Option<(MarkedEdge, String)>>,
    seen: HashSet<String>,
    node_marks: HashMap<String, Option<u64>>,
    deadline: Option<Instant>,
    fused: bool,
}

impl EdgeStream {
    /// Stream one meta's adjacency list. Shards are resolved on first poll.
    pub(crate) fn adjacency(
        storage: Arc<dyn StorageBackend>,
        cache: Arc<NodeShardCache>,
        config: Arc<GraphConfig>,
        scope: ApplicationScope,
        meta: DirectedEdgeMeta,
        max_version: u64,
        last: Option<&Edge>,
        audit: Option<Sender<Task>>,
    ) -> Self {
        Self {
            serialization: EdgeSerialization::new(storage.clone()),
            storage,
            config,
            scope,
            max_version,
            after: last.map(|e| (e.version, e.logical_key())),
            dedup: true,
            filter_tombstones: true,
            source: Some(EdgeSource::Adjacency { cache, meta, audit }),
            iters: Vec::new(),
            heads: Vec::new(),
            seen: HashSet::new(),
            node_marks: HashMap::new(),
            deadline: None,
            fused: false,
        }
    }

    /// Stream every stored version of one logical edge, tombstones included.
    pub(crate) fn versions(
        storage: Arc<dyn StorageBackend>,
        config: Arc<GraphConfig>,
        scope: ApplicationScope,
        source: Id,
        edge_type: String,
        target: Id,
        max_version: u64,
        last: Option<&Edge>,
    ) -> Self {
        Self {
            serialization: EdgeSerialization::new(storage.clone()),
            storage,
            config,
            scope,
            max_version,
            after: last.map(|e| (e.version, e.logical_key())),
            dedup: false,
            filter_tombstones: false,
            source: Some(EdgeSource::Versions {
                source,
                edge_type,
                target,
            }),
            iters: Vec::new(),
            heads: Vec::new(),
            seen: HashSet::new(),
            node_marks: HashMap::new(),
            deadline: None,
            fused: false,
        }
    }

    /// Resolve shards and open row iterators; runs on first poll only.
    fn init(&mut self) -> Result<()> {
        let source = match self.source.take() {
            Some(source) => source,
            None => return Ok(()),
        };
        let scope_key = self.scope.key_part();
        // A resumed stream still scans from max_version: rows newer than the
        // cursor must pass through deduplication so a superseded older
        // version cannot resurface on a later page. The `after` filter keeps
        // them out of the output.
        let start_version = self.max_version;

        match source {
            EdgeSource::Adjacency { cache, meta, audit } => {
                let groups = cache.get_read_shard_groups(&self.scope, self.max_version, &meta)?;
                let now = now_millis();
                for group in &groups {
                    if group.should_compact(now, &self.config) {
                        if let Some(audit) = &audit {
                            // Worker gone means shutdown; reads proceed regardless
                            let _ = audit.send(Task::Audit {
                                scope: self.scope.clone(),
                                meta: meta.clone(),
                            });
                        }
                    }
                }

                let meta_key = meta.storage_key();
                for group in &groups {
                    for shard in group.read_shards() {
                        let prefix = edge_shard_prefix(&scope_key, &meta_key, shard.index);
                        let end = match prefix_end(prefix.as_bytes()) {
                            Some(end) => end,
                            None => continue,
                        };
                        let start =
                            edge_version_start(&scope_key, &meta_key, shard.index, start_version);
                        self.iters.push(RowIter::new(
                            self.storage.clone(),
                            start.into_bytes(),
                            end,
                            self.config.page_size,
                        ));
                    }
                }
                debug!("Opened edge stream over {} shard scan(s) for {meta}", self.iters.len());
            }
            EdgeSource::Versions {
                source,
                edge_type,
                target,
            } => {
                let prefix = version_row_prefix(&scope_key, &source, &edge_type, &target);
                let end = match prefix_end(prefix.as_bytes()) {
                    Some(end) => end,
                    None => return Ok(()),
                };
                let start = format!("{}{:016x}", prefix, crate::serialization::rev(start_version));
                self.iters.push(RowIter::new(
                    self.storage.clone(),
                    start.into_bytes(),
                    end,
                    self.config.page_size,
                ));
            }
        }

        self.heads = (0..self.iters.len()).map(|_| None).collect();
        Ok(())
    }

    /// Pop the globally next row across all shard iterators: descending
    /// version, then ascending logical key; a tombstone row sorts before a
    /// live row of the same version and key so the mark wins deduplication.
    fn pop_merged(&mut self) -> Result<Option<MarkedEdge>> {
        for i in 0..self.iters.len() {
            if self.heads[i].is_none() {
                if let Some((_, value)) = self.iters[i].next_row()? {
                    let edge = decode_marked_edge(&value)?;
                    let key = edge.edge.logical_key();
                    self.heads[i] = Some((edge, key));
                }
            }
        }

        let mut best: Option<(usize, &(MarkedEdge, String))> = None;
        for (i, head) in self.heads.iter().enumerate() {
            if let Some(pair) = head {
                let replace = match best {
                    None => true,
                    Some((_, current)) => sorts_before(pair, current),
                };
                if replace {
                    best = Some((i, pair));
                }
            }
        }

        let index = best.map(|(i, _)| i);
        Ok(index
            .and_then(|i| self.heads[i].take())
            .map(|(edge, _)| edge))
    }

    /// True if a node-level tombstone hides the given edge version.
    fn node_marked(&mut self, node: &Id, version: u64) -> Result<bool> {
        let key = node.key_part();
        let mark = match self.node_marks.get(&key) {
            Some(mark) => *mark,
            None => {
                let mark = self
                    .serialization
                    .read_node_mark(&self.scope.key_part(), node)?;
                self.node_marks.insert(key, mark);
                mark
            }
        };
        Ok(mark.map(|t| version <= t).unwrap_or(false))
    }

    fn next_inner(&mut self) -> Result<Option<MarkedEdge>> {
        if self.iters.is_empty() {
            self.init()?;
        }

        loop {
            let Some(marked) = self.pop_merged()? else {
                return Ok(None);
            };
            let edge = &marked.edge;

            if edge.version > self.max_version {
                continue;
            }
            if let Some((after_version, after_key)) = &self.after {
                let behind_cursor = edge.version > *after_version
                    || (edge.version == *after_version && edge.logical_key() <= *after_key);
                if behind_cursor {
                    // Delivered on an earlier page; still claims its logical
                    // key so older versions stay hidden after a resume
                    if self.dedup {
                        self.seen.insert(edge.logical_key());
                    }
                    continue;
                }
            }
            if self.dedup && !self.seen.insert(edge.logical_key()) {
                continue;
            }
            if self.filter_tombstones {
                if marked.deleted {
                    // The logical key is already in `seen`: older versions
                    // shadowed by this tombstone are skipped too
                    continue;
                }
                let source = marked.edge.source.clone();
                let target = marked.edge.target.clone();
                if self.node_marked(&source, marked.edge.version)?
                    || self.node_marked(&target, marked.edge.version)?
                {
                    continue;
                }
            }

            trace!("Stream yields {}", marked.edge);
            return Ok(Some(marked));
        }
    }
}

impl Iterator for EdgeStream {
    type Item = Result<MarkedEdge>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + self.config.read_timeout());
        if Instant::now() >= deadline {
            self.fused = true;
            let elapsed = self.config.read_timeout_ms
                + Instant::now().duration_since(deadline).as_millis() as u64;
            return Some(Err(GraphError::ReadTimeout {
                elapsed_ms: elapsed,
                timeout_ms: self.config.read_timeout_ms,
            }));
        }

        match self.next_inner() {
            Ok(Some(edge)) => Some(Ok(edge)),
            Ok(None) => {
                self.fused = true;
                None
            }
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }
}

/// A lazy, paged, cursor-resumable stream of distinct names in ascending
/// lexicographic order.
///
/// Returned by the edge-type and id-type enumerations on
/// [`GraphManager`](crate::GraphManager).
pub struct NameStream {
    iter: RowIter,
    read_timeout_ms: u64,
    deadline: Option<Instant>,
    fused: bool,
}

impl NameStream {
    /// Scan names under `base_prefix`, optionally narrowed to those starting
    /// with `filter_prefix`, resuming strictly after `last`.
    ///
    /// Registry keys hold the escaped name; escaping is prefix-preserving so
    /// the filter and cursor are escaped the same way. The raw name comes
    /// from the row value.
    pub(crate) fn new(
        storage: Arc<dyn StorageBackend>,
        config: &GraphConfig,
        base_prefix: String,
        filter_prefix: Option<&str>,
        last: Option<&str>,
    ) -> Self {
        let narrowed = match filter_prefix {
            Some(p) => format!("{base_prefix}{}", escape_key_part(p)),
            None => base_prefix.clone(),
        };
        let end = prefix_end(narrowed.as_bytes()).unwrap_or_default();
        let mut start = narrowed.into_bytes();
        if let Some(last) = last {
            let resume = key_after(format!("{base_prefix}{}", escape_key_part(last)).as_bytes());
            if resume > start {
                start = resume;
            }
        }

        Self {
            iter: RowIter::new(storage, start, end, config.page_size),
            read_timeout_ms: config.read_timeout_ms,
            deadline: None,
            fused: false,
        }
    }
}

impl Iterator for NameStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + std::time::Duration::from_millis(self.read_timeout_ms));
        if Instant::now() >= deadline {
            self.fused = true;
            let elapsed = self.read_timeout_ms
                + Instant::now().duration_since(deadline).as_millis() as u64;
            return Some(Err(GraphError::ReadTimeout {
                elapsed_ms: elapsed,
                timeout_ms: self.read_timeout_ms,
            }));
        }

        match self.iter.next_row() {
            Ok(Some((_, value))) => Some(Ok(String::from_utf8_lossy(&value).into_owned())),
            Ok(None) => {
                self.fused = true;
                None
            }
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }
}
