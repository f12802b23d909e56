//! The checkout/diff engine: a three-way merge of the previously committed
//! tree, the live (partially loaded, possibly edited) inode tree, and the
//! target tree.
//!
//! Per directory, the base and target entry lists are merged with a single
//! linear pass over their shared sort order. Each differing name is
//! classified against the live slot state to decide the concrete action:
//! apply, skip, conflict, or recurse. Sibling subtree merges run
//! concurrently; within one directory, conflicts are reported in merge
//! order.
//!
//! Loading is minimal: an unloaded slot whose hash matches the base is
//! rewritten (or removed) in place without constructing the child, and a
//! subtree whose base hash equals its target hash is skipped entirely
//! unless the live directory carries local divergence. The observable end
//! state is independent of what callers pre-loaded.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use tracing::trace;

use grove_store::{FileType, Tree, TreeEntry};
use grove_types::Hash;

use crate::conflict::{CheckoutConflict, ConflictType};
use crate::error::{VfsError, VfsResult};
use crate::inode::{InodeHandle, VfsContext};
use crate::tree::{DirEntry, EntrySlot, TreeInode, TreeState};

/// One name produced by the linear merge of two sorted entry lists.
struct MergeEntry<'a> {
    name: &'a str,
    from: Option<&'a TreeEntry>,
    to: Option<&'a TreeEntry>,
}

/// Merge two sorted entry lists by name in a single linear pass.
///
/// Both inputs are sorted (a tree invariant), so the merge runs in time
/// proportional to the union of entries.
fn merge_trees<'a>(from: &'a [TreeEntry], to: &'a [TreeEntry]) -> Vec<MergeEntry<'a>> {
    let mut out = Vec::with_capacity(from.len().max(to.len()));
    let (mut i, mut j) = (0, 0);
    while i < from.len() && j < to.len() {
        match from[i].name.cmp(&to[j].name) {
            std::cmp::Ordering::Less => {
                out.push(MergeEntry {
                    name: &from[i].name,
                    from: Some(&from[i]),
                    to: None,
                });
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(MergeEntry {
                    name: &to[j].name,
                    from: None,
                    to: Some(&to[j]),
                });
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(MergeEntry {
                    name: &from[i].name,
                    from: Some(&from[i]),
                    to: Some(&to[j]),
                });
                i += 1;
                j += 1;
            }
        }
    }
    for e in &from[i..] {
        out.push(MergeEntry {
            name: &e.name,
            from: Some(e),
            to: None,
        });
    }
    for e in &to[j..] {
        out.push(MergeEntry {
            name: &e.name,
            from: None,
            to: Some(e),
        });
    }
    out
}

fn entries_equal(a: &TreeEntry, b: &TreeEntry) -> bool {
    a.hash == b.hash && a.ftype == b.ftype && a.perms == b.perms
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// A fresh, unloaded slot carrying the target entry's content.
fn target_slot(to: &TreeEntry) -> DirEntry {
    DirEntry {
        ftype: to.ftype,
        perms: to.perms,
        hash: Some(to.hash),
        slot: EntrySlot::Unloaded,
    }
}

/// Point an existing entry at the target's content.
///
/// Unloaded and number-assigned slots are rewritten in place (the assigned
/// number stays stable). A loaded inode is replaced: the path resolves to a
/// fresh object afterwards, while holders of the old one keep reading the
/// data it had.
fn apply_file_target(entry: &mut DirEntry, to: &TreeEntry) {
    entry.ftype = to.ftype;
    entry.perms = to.perms;
    entry.hash = Some(to.hash);
    if entry.slot.is_loaded() {
        entry.slot = EntrySlot::Unloaded;
    }
}

/// Work that cannot be done synchronously under the directory lock.
enum Deferred {
    /// Visit a directory pair: load the live child and merge its subtree.
    Recurse {
        from_hash: Option<Hash>,
        to_entry: TreeEntry,
    },
    /// Check a directory subtree out of existence.
    RemoveDir { from_hash: Hash },
    /// The slot had a load in flight; settle it, then reclassify.
    AwaitLoad {
        from: Option<TreeEntry>,
        to: Option<TreeEntry>,
    },
}

#[derive(Default)]
struct EntryOutcome {
    conflicts: Vec<CheckoutConflict>,
    /// Whether this entry still diverges from the target after the action,
    /// keeping the directory dirty.
    divergent: bool,
    deferred: Option<Deferred>,
}

impl EntryOutcome {
    fn conflict(&mut self, kind: ConflictType, path: &str) {
        self.conflicts.push(CheckoutConflict::new(kind, path));
    }
}

/// Decide the action for one merged name against the live slot state.
///
/// Runs under the directory lock; everything it does synchronously
/// (slot rewrites, insertions, removals) is atomic with the
/// classification. Anything requiring a fetch or recursion is returned as
/// deferred work.
fn classify_entry(
    state: &mut TreeState,
    dir_path: &str,
    name: &str,
    from: Option<&TreeEntry>,
    to: Option<&TreeEntry>,
    force: bool,
) -> EntryOutcome {
    let path = join_path(dir_path, name);
    let mut out = EntryOutcome::default();

    if !state.entries.contains_key(name) {
        match (from, to) {
            (None, Some(t)) => {
                // ADD with no live entry: create it unloaded.
                state.entries.insert(name.to_string(), target_slot(t));
            }
            (Some(_), None) => {
                // Scheduled for removal but already missing locally.
                out.conflict(ConflictType::MissingRemoved, &path);
            }
            (Some(f), Some(t)) if entries_equal(f, t) => {
                // Locally deleted, unchanged remotely: the deletion is a
                // preserved local edit. Force restores the entry.
                if force {
                    state.entries.insert(name.to_string(), target_slot(t));
                } else {
                    out.divergent = true;
                }
            }
            (Some(_), Some(t)) => {
                out.conflict(ConflictType::MissingRemoved, &path);
                if force {
                    state.entries.insert(name.to_string(), target_slot(t));
                } else {
                    out.divergent = true;
                }
            }
            (None, None) => {}
        }
        return out;
    }

    let mut remove_after = false;
    {
        let Some(entry) = state.entries.get_mut(name) else {
            return out;
        };

        if matches!(entry.slot, EntrySlot::Loading { .. }) {
            out.deferred = Some(Deferred::AwaitLoad {
                from: from.cloned(),
                to: to.cloned(),
            });
            return out;
        }

        match (from, to) {
            (_, Some(t)) => {
                let materialized = entry.is_materialized_file();
                let child_dirty = matches!(
                    &entry.slot,
                    EntrySlot::Loaded(InodeHandle::Tree(d)) if d.is_dirty()
                );
                let matches_target = entry.hash == Some(t.hash)
                    && entry.ftype == t.ftype
                    && entry.perms == t.perms
                    && !materialized
                    && !child_dirty;
                if matches_target {
                    return out;
                }

                if entry.ftype != t.ftype {
                    // Type transitions are detected but never applied; the
                    // merge policy for them is unresolved.
                    out.conflicts.push(CheckoutConflict::with_message(
                        ConflictType::TypeChanged,
                        &path,
                        format!("{} would become {}", entry.ftype, t.ftype),
                    ));
                    out.divergent = true;
                } else if t.ftype == FileType::Directory {
                    let remote_unchanged = from.map_or(false, |f| entries_equal(f, t));
                    if remote_unchanged && !force {
                        // The target did not change this subtree; whatever
                        // diverged locally is preserved as-is.
                        out.divergent = true;
                        return out;
                    }
                    match entry.hash {
                        Some(live_hash) => {
                            let clean_by_hash = from
                                .map_or(false, |f| f.ftype == FileType::Directory && live_hash == f.hash);
                            match &entry.slot {
                                EntrySlot::Unloaded | EntrySlot::Assigned(_)
                                    if clean_by_hash || live_hash == t.hash =>
                                {
                                    // Nothing loaded beneath, so nothing
                                    // local can hide there: re-point the
                                    // whole subtree without visiting it.
                                    entry.hash = Some(t.hash);
                                    entry.perms = t.perms;
                                }
                                _ => {
                                    out.deferred = Some(Deferred::Recurse {
                                        from_hash: from.map(|f| f.hash),
                                        to_entry: t.clone(),
                                    });
                                }
                            }
                        }
                        None => {
                            if from.is_none() {
                                // Untracked local directory blocks the ADD.
                                out.conflict(ConflictType::UntrackedAdded, &path);
                                if force {
                                    *entry = target_slot(t);
                                } else {
                                    out.divergent = true;
                                }
                            } else {
                                // Locally recreated directory; merge
                                // through it to surface per-entry
                                // conflicts.
                                out.deferred = Some(Deferred::Recurse {
                                    from_hash: from.map(|f| f.hash),
                                    to_entry: t.clone(),
                                });
                            }
                        }
                    }
                } else if from.map_or(false, |f| entries_equal(f, t)) {
                    // The target did not change this file; the local edit
                    // stands alone. Only a forced checkout reverts it.
                    if force {
                        out.conflict(ConflictType::Modified, &path);
                        apply_file_target(entry, t);
                    } else {
                        out.divergent = true;
                    }
                } else {
                    // File or symlink target.
                    let clean = from.map_or(false, |f| {
                        entry.hash == Some(f.hash)
                            && entry.ftype == f.ftype
                            && entry.perms == f.perms
                            && !materialized
                    });
                    if clean {
                        apply_file_target(entry, t);
                    } else if entry.hash.is_none() && from.is_none() {
                        // Untracked addition colliding with an ADD; adopt
                        // it silently when the content already matches.
                        let already_target = match &entry.slot {
                            EntrySlot::Loaded(InodeHandle::File(file)) => {
                                file.local_content_hash() == t.hash
                                    && entry.ftype == t.ftype
                                    && entry.perms == t.perms
                            }
                            _ => false,
                        };
                        if already_target {
                            entry.hash = Some(t.hash);
                        } else {
                            out.conflict(ConflictType::UntrackedAdded, &path);
                            if force {
                                apply_file_target(entry, t);
                            } else {
                                out.divergent = true;
                            }
                        }
                    } else {
                        out.conflict(ConflictType::Modified, &path);
                        if force {
                            apply_file_target(entry, t);
                        } else {
                            out.divergent = true;
                        }
                    }
                }
            }
            (Some(f), None) => {
                // REMOVE.
                if entry.ftype != f.ftype {
                    out.conflicts.push(CheckoutConflict::with_message(
                        ConflictType::TypeChanged,
                        &path,
                        format!("{} was {} in the previous tree", entry.ftype, f.ftype),
                    ));
                    out.divergent = true;
                } else if entry.ftype == FileType::Directory {
                    if !entry.slot.is_loaded() && entry.hash == Some(f.hash) {
                        // Unloaded and unchanged from base: nothing
                        // materialized can hide beneath an unloaded slot.
                        remove_after = true;
                    } else {
                        out.deferred = Some(Deferred::RemoveDir { from_hash: f.hash });
                    }
                } else {
                    let clean = entry.hash == Some(f.hash)
                        && entry.perms == f.perms
                        && !entry.is_materialized_file();
                    if clean {
                        remove_after = true;
                    } else {
                        out.conflict(ConflictType::Modified, &path);
                        if force {
                            remove_after = true;
                        } else {
                            // The kept file no longer corresponds to any
                            // source entry; a loaded inode carries its own
                            // data, so drop the stale hash.
                            if entry.slot.is_loaded() {
                                entry.hash = None;
                            }
                            out.divergent = true;
                        }
                    }
                }
            }
            (None, None) => {}
        }
    }
    if remove_after {
        state.entries.remove(name);
    }
    out
}

/// Merge one directory: classify every name from the base/target merge
/// against the live state, apply what can be applied, recurse where
/// needed, and record the target hash as the directory's new base.
///
/// Returns the conflicts for this subtree in deterministic (merge) order.
pub(crate) fn checkout_tree(
    ctx: Arc<VfsContext>,
    dir: Arc<TreeInode>,
    dir_path: String,
    from: Option<Tree>,
    to: Option<(Tree, Hash)>,
    force: bool,
) -> BoxFuture<'static, VfsResult<Vec<CheckoutConflict>>> {
    async move {
        let (to_tree, to_hash) = match to {
            Some((tree, hash)) => (Some(tree), Some(hash)),
            None => (None, None),
        };
        let from_entries = from.map(|t| t.entries).unwrap_or_default();
        let to_entries = to_tree.map(|t| t.entries).unwrap_or_default();

        trace!(path = %dir_path, "merging directory");

        let merged = merge_trees(&from_entries, &to_entries);
        let mut results: Vec<Vec<CheckoutConflict>> = Vec::with_capacity(merged.len());
        let mut deferred: Vec<(usize, String, Deferred)> = Vec::new();
        let mut divergent_any = false;
        {
            let mut state = dir.lock_state();
            for (idx, m) in merged.iter().enumerate() {
                let out = classify_entry(&mut state, &dir_path, m.name, m.from, m.to, force);
                divergent_any |= out.divergent;
                if let Some(d) = out.deferred {
                    deferred.push((idx, m.name.to_string(), d));
                }
                results.push(out.conflicts);
            }
        }

        if !deferred.is_empty() {
            // Independent subtrees merge concurrently; results are slotted
            // back by merge position to keep conflict order deterministic.
            let tasks: Vec<_> = deferred
                .into_iter()
                .map(|(idx, name, d)| {
                    let ctx = Arc::clone(&ctx);
                    let dir = Arc::clone(&dir);
                    let dir_path = dir_path.clone();
                    async move { (idx, resolve_deferred(ctx, dir, dir_path, name, d, force).await) }
                })
                .collect();
            for (idx, res) in join_all(tasks).await {
                let (conflicts, divergent) = res?;
                results[idx].extend(conflicts);
                divergent_any |= divergent;
            }
        }

        {
            let mut state = dir.lock_state();
            state.source_hash = to_hash;
            // Untracked entries that survived the merge keep the directory
            // divergent even when every processed name converged.
            let untracked_left = state.entries.values().any(|e| e.hash.is_none());
            state.dirty = divergent_any || untracked_left;
        }

        Ok(results.into_iter().flatten().collect())
    }
    .boxed()
}

fn resolve_deferred(
    ctx: Arc<VfsContext>,
    dir: Arc<TreeInode>,
    dir_path: String,
    name: String,
    deferred: Deferred,
    force: bool,
) -> BoxFuture<'static, VfsResult<(Vec<CheckoutConflict>, bool)>> {
    async move {
        match deferred {
            Deferred::Recurse { from_hash, to_entry } => {
                let child = match dir.load_child(&name).await? {
                    InodeHandle::Tree(t) => t,
                    InodeHandle::File(_) => {
                        // The slot changed shape under a concurrent
                        // mutation; leave it for the caller to resolve.
                        return Ok((Vec::new(), true));
                    }
                };
                let from_tree = match from_hash {
                    Some(h) => Some(ctx.store.get_tree(&h).await?),
                    None => None,
                };
                let to_tree = ctx.store.get_tree(&to_entry.hash).await?;
                let child_path = join_path(&dir_path, &name);
                let conflicts = checkout_tree(
                    Arc::clone(&ctx),
                    Arc::clone(&child),
                    child_path,
                    from_tree,
                    Some((to_tree, to_entry.hash)),
                    force,
                )
                .await?;
                let divergent = child.is_dirty();
                {
                    let mut state = dir.lock_state();
                    if let Some(entry) = state.entries.get_mut(&name) {
                        entry.hash = Some(to_entry.hash);
                        entry.perms = to_entry.perms;
                    }
                }
                Ok((conflicts, divergent))
            }
            Deferred::RemoveDir { from_hash } => {
                let child = match dir.load_child(&name).await? {
                    InodeHandle::Tree(t) => t,
                    InodeHandle::File(_) => return Ok((Vec::new(), true)),
                };
                let from_tree = ctx.store.get_tree(&from_hash).await?;
                let child_path = join_path(&dir_path, &name);
                let mut conflicts = checkout_tree(
                    Arc::clone(&ctx),
                    Arc::clone(&child),
                    child_path.clone(),
                    Some(from_tree),
                    None,
                    force,
                )
                .await?;
                let mut divergent = false;
                {
                    let mut state = dir.lock_state();
                    if state.entries.contains_key(&name) {
                        let leftovers = !child.is_empty();
                        if leftovers && !force {
                            // The target removes this directory but local
                            // content survives in it; keep it, untracked.
                            conflicts.push(CheckoutConflict::with_message(
                                ConflictType::DirectoryNotEmpty,
                                &child_path,
                                "directory still contains local content",
                            ));
                            divergent = true;
                            if let Some(entry) = state.entries.get_mut(&name) {
                                entry.hash = None;
                            }
                        } else {
                            if leftovers {
                                child.clear_entries();
                            }
                            state.entries.remove(&name);
                        }
                    }
                }
                Ok((conflicts, divergent))
            }
            Deferred::AwaitLoad { from, to } => {
                // Settle the in-flight load; NotFound means the entry was
                // unlinked meanwhile, and reclassification handles whatever
                // state remains.
                match dir.load_child(&name).await {
                    Ok(_) | Err(VfsError::NotFound(_)) => {}
                    Err(other) => return Err(other),
                }
                let out = {
                    let mut state = dir.lock_state();
                    classify_entry(&mut state, &dir_path, &name, from.as_ref(), to.as_ref(), force)
                };
                let mut conflicts = out.conflicts;
                let mut divergent = out.divergent;
                if let Some(next) = out.deferred {
                    let (more, more_divergent) =
                        resolve_deferred(ctx, dir, dir_path, name, next, force).await?;
                    conflicts.extend(more);
                    divergent |= more_divergent;
                }
                Ok((conflicts, divergent))
            }
        }
    }
    .boxed()
}
