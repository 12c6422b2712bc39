//! Reactivity graph state.
//!
//! One context owns the whole graph: the two-way dependency index between
//! cells `(target, key)` and effects, the effect registry, the activation
//! stack, and the tracking/readonly gates. A thread-local default context
//! backs the free functions; tests can build independent contexts.
//!
//! Invariants:
//! - Coherence: an effect id appears in a cell's dep list exactly when that
//!   `(target, key)` pair appears in the effect's `deps` list.
//! - Dep lists preserve insertion order; `trigger` runs computed effects
//!   before plain effects, each bucket in insertion order.
//! - An effect currently on the activation stack is never re-entered.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::effect::{Effect, EffectRecord};

pub(crate) type TargetId = u64;
pub(crate) type EffectId = u64;

/// Cell address within a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// Hash of a keyed-container key (maps, sets).
    Hashed(u64),
    /// List index.
    Index(usize),
    /// List length cell.
    Length,
    /// Iteration shape of the whole container.
    Iterate,
    /// The single cell of a `Ref`.
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Get,
    Has,
    Iterate,
    Set,
    Add,
    Delete,
    Clear,
}

impl OpKind {
    /// Tracking-only ops never trigger; the rest never track.
    pub fn is_tracking(self) -> bool {
        matches!(self, OpKind::Get | OpKind::Has | OpKind::Iterate)
    }
}

/// Event handed to `on_track` / `on_trigger` debugger hooks.
#[derive(Clone, Copy, Debug)]
pub struct TrackEvent {
    pub target: u64,
    pub op: OpKind,
    pub key: Option<Key>,
}

pub(crate) struct ContextInner {
    pub(crate) target_map: RefCell<FxHashMap<TargetId, FxHashMap<Key, Vec<EffectId>>>>,
    pub(crate) effects: RefCell<FxHashMap<EffectId, Rc<EffectRecord>>>,
    pub(crate) stack: RefCell<Vec<EffectId>>,
    should_track: Cell<bool>,
    locked: Cell<bool>,
    next_target: Cell<u64>,
    next_effect: Cell<u64>,
}

/// Cheap handle over one reactivity graph.
#[derive(Clone)]
pub struct ReactivityContext {
    pub(crate) inner: Rc<ContextInner>,
}

impl ReactivityContext {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ContextInner {
                target_map: RefCell::new(FxHashMap::default()),
                effects: RefCell::new(FxHashMap::default()),
                stack: RefCell::new(Vec::new()),
                should_track: Cell::new(true),
                locked: Cell::new(false),
                next_target: Cell::new(1),
                next_effect: Cell::new(1),
            }),
        }
    }

    pub(crate) fn next_target_id(&self) -> TargetId {
        let id = self.inner.next_target.get();
        self.inner.next_target.set(id + 1);
        id
    }

    pub(crate) fn next_effect_id(&self) -> EffectId {
        let id = self.inner.next_effect.get();
        self.inner.next_effect.set(id + 1);
        id
    }

    pub(crate) fn register_effect(&self, record: &Rc<EffectRecord>) {
        self.inner
            .effects
            .borrow_mut()
            .insert(record.id, Rc::clone(record));
    }

    pub(crate) fn unregister_effect(&self, id: EffectId) {
        self.inner.effects.borrow_mut().remove(&id);
    }

    /// Non-counting gate read by `track`.
    pub fn pause_tracking(&self) {
        self.inner.should_track.set(false);
    }

    pub fn resume_tracking(&self) {
        self.inner.should_track.set(true);
    }

    pub fn is_tracking_paused(&self) -> bool {
        !self.inner.should_track.get()
    }

    /// Gate for mutation through readonly views.
    pub fn lock(&self) {
        self.inner.locked.set(true);
    }

    pub fn unlock(&self) {
        self.inner.locked.set(false);
    }

    pub fn is_locked(&self) -> bool {
        self.inner.locked.get()
    }

    /// Record that the active effect read `(target, key)`.
    pub(crate) fn track(&self, target: TargetId, op: OpKind, key: Key) {
        debug_assert!(op.is_tracking(), "track called with a mutation op");
        if !self.inner.should_track.get() {
            return;
        }
        let Some(effect_id) = self.inner.stack.borrow().last().copied() else {
            return;
        };
        let record = self.inner.effects.borrow().get(&effect_id).cloned();
        let Some(record) = record else {
            return;
        };
        let inserted = {
            let mut map = self.inner.target_map.borrow_mut();
            let dep = map.entry(target).or_default().entry(key).or_default();
            if dep.contains(&effect_id) {
                false
            } else {
                dep.push(effect_id);
                true
            }
        };
        if !inserted {
            return;
        }
        record.deps.borrow_mut().push((target, key));
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "reactive.track",
            "effect {} tracked target {} key {:?}",
            effect_id,
            target,
            key
        );
        if let Some(hook) = &record.on_track {
            hook(TrackEvent {
                target,
                op,
                key: Some(key),
            });
        }
    }

    /// Re-run everything depending on the written cell.
    ///
    /// `shape_key` is the extra cell invalidated by additions and removals:
    /// `Length` for list-likes, `Iterate` for keyed containers.
    pub(crate) fn trigger(
        &self,
        target: TargetId,
        op: OpKind,
        key: Option<Key>,
        shape_key: Key,
    ) {
        debug_assert!(!op.is_tracking(), "trigger called with a tracking op");
        let mut computed_runners: Vec<EffectId> = Vec::new();
        let mut plain: Vec<EffectId> = Vec::new();
        {
            let map = self.inner.target_map.borrow();
            let Some(deps) = map.get(&target) else {
                return;
            };
            let registry = self.inner.effects.borrow();
            let mut seen: FxHashSet<EffectId> = FxHashSet::default();
            let mut collect = |dep: &[EffectId]| {
                for &id in dep {
                    if !seen.insert(id) {
                        continue;
                    }
                    match registry.get(&id) {
                        Some(record) if record.is_computed => computed_runners.push(id),
                        Some(_) => plain.push(id),
                        None => {}
                    }
                }
            };
            if op == OpKind::Clear {
                for dep in deps.values() {
                    collect(dep);
                }
            } else {
                if let Some(key) = key
                    && let Some(dep) = deps.get(&key)
                {
                    collect(dep);
                }
                if matches!(op, OpKind::Add | OpKind::Delete)
                    && let Some(dep) = deps.get(&shape_key)
                {
                    collect(dep);
                }
            }
        }
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "reactive.trigger",
            "target {} op {:?} -> {} computed, {} plain",
            target,
            op,
            computed_runners.len(),
            plain.len()
        );
        for id in computed_runners.into_iter().chain(plain) {
            self.schedule_run(id, target, op, key);
        }
    }

    fn schedule_run(&self, id: EffectId, target: TargetId, op: OpKind, key: Option<Key>) {
        let record = self.inner.effects.borrow().get(&id).cloned();
        let Some(record) = record else {
            // Stopped while this trigger was in flight.
            return;
        };
        if let Some(hook) = &record.on_trigger {
            hook(TrackEvent { target, op, key });
        }
        let effect = Effect::from_record(self.clone(), Rc::clone(&record));
        match &record.scheduler {
            Some(scheduler) => scheduler(&effect),
            None => effect.run(),
        }
    }

    /// Remove the effect from every dep it belongs to.
    pub(crate) fn cleanup(&self, record: &EffectRecord) {
        let deps = std::mem::take(&mut *record.deps.borrow_mut());
        if deps.is_empty() {
            return;
        }
        let mut map = self.inner.target_map.borrow_mut();
        for (target, key) in deps {
            if let Some(keys) = map.get_mut(&target)
                && let Some(dep) = keys.get_mut(&key)
            {
                dep.retain(|&id| id != record.id);
            }
        }
    }

    /// Subscribe the active parent effect to every dep of `child`.
    ///
    /// This is what propagates invalidation through computed chains: a
    /// parent that reads a computed depends on the computed's own cells.
    pub(crate) fn track_child_run(&self, child: &EffectRecord) {
        let Some(parent_id) = self.inner.stack.borrow().last().copied() else {
            return;
        };
        if parent_id == child.id {
            return;
        }
        let parent = self.inner.effects.borrow().get(&parent_id).cloned();
        let Some(parent) = parent else {
            return;
        };
        let child_deps: Vec<(TargetId, Key)> = child.deps.borrow().clone();
        let mut map = self.inner.target_map.borrow_mut();
        for (target, key) in child_deps {
            let dep = map.entry(target).or_default().entry(key).or_default();
            if !dep.contains(&parent_id) {
                dep.push(parent_id);
                parent.deps.borrow_mut().push((target, key));
            }
        }
    }

    /// Total (cell, effect) subscription edges in the graph.
    ///
    /// Coherence makes this equal the sum of `Effect::dep_count` over all
    /// live effects; instrumentation and tests lean on that equality.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .target_map
            .borrow()
            .values()
            .flat_map(|deps| deps.values())
            .map(Vec::len)
            .sum()
    }
}

impl Default for ReactivityContext {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static DEFAULT_CONTEXT: ReactivityContext = ReactivityContext::new();
}

/// The process-wide (per thread) default context used by the free functions.
pub fn default_context() -> ReactivityContext {
    DEFAULT_CONTEXT.with(Clone::clone)
}

/// Pause dependency tracking on the default context.
pub fn pause_tracking() {
    default_context().pause_tracking();
}

/// Resume dependency tracking on the default context.
pub fn resume_tracking() {
    default_context().resume_tracking();
}

/// Forbid mutation through readonly views on the default context.
pub fn lock() {
    default_context().lock();
}

/// Allow mutation through readonly views on the default context.
pub fn unlock() {
    default_context().unlock();
}
