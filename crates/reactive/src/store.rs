//! Observed container views.
//!
//! Each supported container kind ships an instrumented wrapper pair: a
//! mutable `Reactive*` view and a `Readonly*` view sharing one target
//! store. Reads route through `track`, writes through `trigger`; the
//! instrumentation per kind is the fixed-dispatch rendition of proxy traps.
//!
//! Readonly gate: while the owning context is locked, mutating ops on a
//! `Readonly*` view warn and no-op; when unlocked they mutate and trigger
//! like the mutable view.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash, Hasher};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};

use crate::context::{Key, OpKind, ReactivityContext, TargetId, default_context};

fn hashed_key<K: Hash + ?Sized>(key: &K) -> Key {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    Key::Hashed(hasher.finish())
}

// ---------------------------------------------------------------------------
// Keyed map
// ---------------------------------------------------------------------------

struct MapStore<K, V> {
    ctx: ReactivityContext,
    target: TargetId,
    data: RefCell<FxHashMap<K, V>>,
}

impl<K, V> MapStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    fn get(&self, key: &K) -> Option<V> {
        self.ctx.track(self.target, OpKind::Get, hashed_key(key));
        self.data.borrow().get(key).cloned()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.ctx.track(self.target, OpKind::Has, hashed_key(key));
        self.data.borrow().contains_key(key)
    }

    fn len(&self) -> usize {
        self.ctx.track(self.target, OpKind::Iterate, Key::Iterate);
        self.data.borrow().len()
    }

    fn keys(&self) -> Vec<K> {
        self.ctx.track(self.target, OpKind::Iterate, Key::Iterate);
        self.data.borrow().keys().cloned().collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.ctx.track(self.target, OpKind::Iterate, Key::Iterate);
        self.data
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn insert(&self, key: K, value: V) -> Option<V> {
        let cell = hashed_key(&key);
        let prev = self.data.borrow_mut().insert(key, value.clone());
        match &prev {
            None => self
                .ctx
                .trigger(self.target, OpKind::Add, Some(cell), Key::Iterate),
            Some(old) if *old != value => self
                .ctx
                .trigger(self.target, OpKind::Set, Some(cell), Key::Iterate),
            Some(_) => {}
        }
        prev
    }

    fn remove(&self, key: &K) -> Option<V> {
        let cell = hashed_key(key);
        let removed = self.data.borrow_mut().remove(key);
        if removed.is_some() {
            self.ctx
                .trigger(self.target, OpKind::Delete, Some(cell), Key::Iterate);
        }
        removed
    }

    fn clear(&self) {
        let had_items = !self.data.borrow().is_empty();
        self.data.borrow_mut().clear();
        if had_items {
            self.ctx.trigger(self.target, OpKind::Clear, None, Key::Iterate);
        }
    }
}

/// Mutable observed view of a keyed map.
pub struct ReactiveMap<K, V> {
    store: Rc<MapStore<K, V>>,
}

/// Readonly observed view of the same map target.
pub struct ReadonlyMap<K, V> {
    store: Rc<MapStore<K, V>>,
}

impl<K, V> Clone for ReactiveMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<K, V> Clone for ReadonlyMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<K, V> std::fmt::Debug for ReactiveMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveMap").finish_non_exhaustive()
    }
}

impl<K, V> std::fmt::Debug for ReadonlyMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadonlyMap").finish_non_exhaustive()
    }
}

impl<K, V> PartialEq for ReactiveMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

impl<K, V> PartialEq for ReadonlyMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

impl<K, V> ReactiveMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::new_in(&default_context())
    }

    pub fn new_in(ctx: &ReactivityContext) -> Self {
        Self::from_data_in(ctx, FxHashMap::default())
    }

    fn from_data_in(ctx: &ReactivityContext, data: FxHashMap<K, V>) -> Self {
        Self {
            store: Rc::new(MapStore {
                ctx: ctx.clone(),
                target: ctx.next_target_id(),
                data: RefCell::new(data),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.store.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.store.entries()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.store.insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.store.remove(key)
    }

    pub fn clear(&self) {
        self.store.clear()
    }

    /// Snapshot of the underlying data, bypassing tracking.
    pub fn to_raw(&self) -> FxHashMap<K, V> {
        self.store.data.borrow().clone()
    }

    pub fn is_readonly(&self) -> bool {
        false
    }

    /// The readonly view over the same target.
    pub fn readonly_view(&self) -> ReadonlyMap<K, V> {
        ReadonlyMap {
            store: Rc::clone(&self.store),
        }
    }

    /// Ref-like handle bound to one key of this map.
    pub fn field_ref(&self, key: K) -> MapRef<K, V> {
        MapRef {
            map: self.clone(),
            key,
        }
    }
}

impl<K, V> Default for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadonlyMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub fn get(&self, key: &K) -> Option<V> {
        self.store.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.store.entries()
    }

    pub fn to_raw(&self) -> FxHashMap<K, V> {
        self.store.data.borrow().clone()
    }

    pub fn is_readonly(&self) -> bool {
        true
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "insert on a locked readonly map is ignored");
            return None;
        }
        self.store.insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "remove on a locked readonly map is ignored");
            return None;
        }
        self.store.remove(key)
    }

    pub fn clear(&self) {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "clear on a locked readonly map is ignored");
            return;
        }
        self.store.clear()
    }
}

/// Ref-like handle delegating to one key of a reactive map.
pub struct MapRef<K, V> {
    map: ReactiveMap<K, V>,
    key: K,
}

impl<K, V> MapRef<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub fn get(&self) -> Option<V> {
        self.map.get(&self.key)
    }

    pub fn set(&self, value: V) {
        self.map.insert(self.key.clone(), value);
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

/// Ref-like handles for every current key of the map.
pub fn to_refs<K, V>(map: &ReactiveMap<K, V>) -> Vec<(K, MapRef<K, V>)>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    map.keys()
        .into_iter()
        .map(|key| (key.clone(), map.field_ref(key)))
        .collect()
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

struct ListStore<T> {
    ctx: ReactivityContext,
    target: TargetId,
    data: RefCell<Vec<T>>,
}

impl<T> ListStore<T>
where
    T: Clone + PartialEq,
{
    fn get(&self, index: usize) -> Option<T> {
        self.ctx.track(self.target, OpKind::Get, Key::Index(index));
        self.data.borrow().get(index).cloned()
    }

    fn len(&self) -> usize {
        self.ctx.track(self.target, OpKind::Get, Key::Length);
        self.data.borrow().len()
    }

    fn to_vec(&self) -> Vec<T> {
        let snapshot = self.data.borrow().clone();
        self.ctx.track(self.target, OpKind::Get, Key::Length);
        for index in 0..snapshot.len() {
            self.ctx.track(self.target, OpKind::Get, Key::Index(index));
        }
        snapshot
    }

    fn set(&self, index: usize, value: T) {
        let len = self.data.borrow().len();
        if index < len {
            let changed = self.data.borrow()[index] != value;
            if changed {
                self.data.borrow_mut()[index] = value;
                self.ctx
                    .trigger(self.target, OpKind::Set, Some(Key::Index(index)), Key::Length);
            }
        } else if index == len {
            self.push(value);
        } else {
            log::warn!(
                target: "reactive.list",
                "set past the end of a reactive list is ignored (index {index}, len {len})"
            );
        }
    }

    fn push(&self, value: T) {
        let index = self.data.borrow().len();
        self.data.borrow_mut().push(value);
        self.ctx
            .trigger(self.target, OpKind::Add, Some(Key::Index(index)), Key::Length);
    }

    fn pop(&self) -> Option<T> {
        let popped = self.data.borrow_mut().pop();
        if popped.is_some() {
            let index = self.data.borrow().len();
            self.ctx
                .trigger(self.target, OpKind::Delete, Some(Key::Index(index)), Key::Length);
        }
        popped
    }
}

/// Mutable observed view of a growable list.
pub struct ReactiveList<T> {
    store: Rc<ListStore<T>>,
}

/// Readonly observed view of the same list target.
pub struct ReadonlyList<T> {
    store: Rc<ListStore<T>>,
}

impl<T> Clone for ReactiveList<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> Clone for ReadonlyList<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> PartialEq for ReactiveList<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

impl<T> ReactiveList<T>
where
    T: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::new_in(&default_context())
    }

    pub fn new_in(ctx: &ReactivityContext) -> Self {
        Self::from_data_in(ctx, Vec::new())
    }

    fn from_data_in(ctx: &ReactivityContext, data: Vec<T>) -> Self {
        Self {
            store: Rc::new(ListStore {
                ctx: ctx.clone(),
                target: ctx.next_target_id(),
                data: RefCell::new(data),
            }),
        }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.store.get(index)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.store.to_vec()
    }

    pub fn set(&self, index: usize, value: T) {
        self.store.set(index, value)
    }

    pub fn push(&self, value: T) {
        self.store.push(value)
    }

    pub fn pop(&self) -> Option<T> {
        self.store.pop()
    }

    pub fn to_raw(&self) -> Vec<T> {
        self.store.data.borrow().clone()
    }

    pub fn is_readonly(&self) -> bool {
        false
    }

    pub fn readonly_view(&self) -> ReadonlyList<T> {
        ReadonlyList {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> Default for ReactiveList<T>
where
    T: Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadonlyList<T>
where
    T: Clone + PartialEq,
{
    pub fn get(&self, index: usize) -> Option<T> {
        self.store.get(index)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.store.to_vec()
    }

    pub fn to_raw(&self) -> Vec<T> {
        self.store.data.borrow().clone()
    }

    pub fn is_readonly(&self) -> bool {
        true
    }

    pub fn set(&self, index: usize, value: T) {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "set on a locked readonly list is ignored");
            return;
        }
        self.store.set(index, value)
    }

    pub fn push(&self, value: T) {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "push on a locked readonly list is ignored");
            return;
        }
        self.store.push(value)
    }

    pub fn pop(&self) -> Option<T> {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "pop on a locked readonly list is ignored");
            return None;
        }
        self.store.pop()
    }
}

// ---------------------------------------------------------------------------
// Set
// ---------------------------------------------------------------------------

struct SetStore<T> {
    ctx: ReactivityContext,
    target: TargetId,
    data: RefCell<FxHashSet<T>>,
}

impl<T> SetStore<T>
where
    T: Eq + Hash + Clone,
{
    fn contains(&self, value: &T) -> bool {
        self.ctx.track(self.target, OpKind::Has, hashed_key(value));
        self.data.borrow().contains(value)
    }

    fn len(&self) -> usize {
        self.ctx.track(self.target, OpKind::Iterate, Key::Iterate);
        self.data.borrow().len()
    }

    fn values(&self) -> Vec<T> {
        self.ctx.track(self.target, OpKind::Iterate, Key::Iterate);
        self.data.borrow().iter().cloned().collect()
    }

    fn insert(&self, value: T) -> bool {
        let cell = hashed_key(&value);
        let inserted = self.data.borrow_mut().insert(value);
        if inserted {
            self.ctx
                .trigger(self.target, OpKind::Add, Some(cell), Key::Iterate);
        }
        inserted
    }

    fn remove(&self, value: &T) -> bool {
        let cell = hashed_key(value);
        let removed = self.data.borrow_mut().remove(value);
        if removed {
            self.ctx
                .trigger(self.target, OpKind::Delete, Some(cell), Key::Iterate);
        }
        removed
    }

    fn clear(&self) {
        let had_items = !self.data.borrow().is_empty();
        self.data.borrow_mut().clear();
        if had_items {
            self.ctx.trigger(self.target, OpKind::Clear, None, Key::Iterate);
        }
    }
}

/// Mutable observed view of a hash set.
pub struct ReactiveSet<T> {
    store: Rc<SetStore<T>>,
}

/// Readonly observed view of the same set target.
pub struct ReadonlySet<T> {
    store: Rc<SetStore<T>>,
}

impl<T> Clone for ReactiveSet<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> Clone for ReadonlySet<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> PartialEq for ReactiveSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

impl<T> ReactiveSet<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::new_in(&default_context())
    }

    pub fn new_in(ctx: &ReactivityContext) -> Self {
        Self::from_data_in(ctx, FxHashSet::default())
    }

    fn from_data_in(ctx: &ReactivityContext, data: FxHashSet<T>) -> Self {
        Self {
            store: Rc::new(SetStore {
                ctx: ctx.clone(),
                target: ctx.next_target_id(),
                data: RefCell::new(data),
            }),
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.store.contains(value)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<T> {
        self.store.values()
    }

    pub fn insert(&self, value: T) -> bool {
        self.store.insert(value)
    }

    pub fn remove(&self, value: &T) -> bool {
        self.store.remove(value)
    }

    pub fn clear(&self) {
        self.store.clear()
    }

    pub fn to_raw(&self) -> FxHashSet<T> {
        self.store.data.borrow().clone()
    }

    pub fn is_readonly(&self) -> bool {
        false
    }

    pub fn readonly_view(&self) -> ReadonlySet<T> {
        ReadonlySet {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> Default for ReactiveSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadonlySet<T>
where
    T: Eq + Hash + Clone,
{
    pub fn contains(&self, value: &T) -> bool {
        self.store.contains(value)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<T> {
        self.store.values()
    }

    pub fn to_raw(&self) -> FxHashSet<T> {
        self.store.data.borrow().clone()
    }

    pub fn is_readonly(&self) -> bool {
        true
    }

    pub fn insert(&self, value: T) -> bool {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "insert on a locked readonly set is ignored");
            return false;
        }
        self.store.insert(value)
    }

    pub fn remove(&self, value: &T) -> bool {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "remove on a locked readonly set is ignored");
            return false;
        }
        self.store.remove(value)
    }

    pub fn clear(&self) {
        if self.store.ctx.is_locked() {
            log::warn!(target: "reactive.readonly", "clear on a locked readonly set is ignored");
            return;
        }
        self.store.clear()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Containers convertible into a mutable observed view.
///
/// Observed inputs convert to themselves, so `make_reactive` is idempotent;
/// the raw-to-observed mapping is bijective per mode because all views of a
/// target share its store. Types without an impl are simply not observable,
/// which is the fixed-dispatch stand-in for "returned as-is".
pub trait IntoReactive {
    type Observed;
    fn into_reactive_in(self, ctx: &ReactivityContext) -> Self::Observed;
}

/// Containers convertible into a readonly observed view.
pub trait IntoReadonly {
    type Observed;
    fn into_readonly_in(self, ctx: &ReactivityContext) -> Self::Observed;
}

/// Wrap a container in a mutable observed view on the default context.
pub fn make_reactive<T: IntoReactive>(raw: T) -> T::Observed {
    raw.into_reactive_in(&default_context())
}

pub fn make_reactive_in<T: IntoReactive>(ctx: &ReactivityContext, raw: T) -> T::Observed {
    raw.into_reactive_in(ctx)
}

/// Wrap a container in a readonly observed view on the default context.
pub fn make_readonly<T: IntoReadonly>(raw: T) -> T::Observed {
    raw.into_readonly_in(&default_context())
}

pub fn make_readonly_in<T: IntoReadonly>(ctx: &ReactivityContext, raw: T) -> T::Observed {
    raw.into_readonly_in(ctx)
}

impl<K, V, S> IntoReactive for HashMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
    S: BuildHasher,
{
    type Observed = ReactiveMap<K, V>;

    fn into_reactive_in(self, ctx: &ReactivityContext) -> Self::Observed {
        ReactiveMap::from_data_in(ctx, self.into_iter().collect())
    }
}

impl<T> IntoReactive for Vec<T>
where
    T: Clone + PartialEq,
{
    type Observed = ReactiveList<T>;

    fn into_reactive_in(self, ctx: &ReactivityContext) -> Self::Observed {
        ReactiveList::from_data_in(ctx, self)
    }
}

impl<T, S> IntoReactive for HashSet<T, S>
where
    T: Eq + Hash + Clone,
    S: BuildHasher,
{
    type Observed = ReactiveSet<T>;

    fn into_reactive_in(self, ctx: &ReactivityContext) -> Self::Observed {
        ReactiveSet::from_data_in(ctx, self.into_iter().collect())
    }
}

impl<K, V> IntoReactive for ReactiveMap<K, V> {
    type Observed = ReactiveMap<K, V>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<T> IntoReactive for ReactiveList<T> {
    type Observed = ReactiveList<T>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<T> IntoReactive for ReactiveSet<T> {
    type Observed = ReactiveSet<T>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

// A readonly view stays readonly even through `make_reactive`.
impl<K, V> IntoReactive for ReadonlyMap<K, V> {
    type Observed = ReadonlyMap<K, V>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<T> IntoReactive for ReadonlyList<T> {
    type Observed = ReadonlyList<T>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<T> IntoReactive for ReadonlySet<T> {
    type Observed = ReadonlySet<T>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<K, V, S> IntoReadonly for HashMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
    S: BuildHasher,
{
    type Observed = ReadonlyMap<K, V>;

    fn into_readonly_in(self, ctx: &ReactivityContext) -> Self::Observed {
        self.into_reactive_in(ctx).readonly_view()
    }
}

impl<T> IntoReadonly for Vec<T>
where
    T: Clone + PartialEq,
{
    type Observed = ReadonlyList<T>;

    fn into_readonly_in(self, ctx: &ReactivityContext) -> Self::Observed {
        self.into_reactive_in(ctx).readonly_view()
    }
}

impl<T, S> IntoReadonly for HashSet<T, S>
where
    T: Eq + Hash + Clone,
    S: BuildHasher,
{
    type Observed = ReadonlySet<T>;

    fn into_readonly_in(self, ctx: &ReactivityContext) -> Self::Observed {
        self.into_reactive_in(ctx).readonly_view()
    }
}

impl<K, V> IntoReadonly for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    type Observed = ReadonlyMap<K, V>;

    fn into_readonly_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self.readonly_view()
    }
}

impl<T> IntoReadonly for ReactiveList<T>
where
    T: Clone + PartialEq,
{
    type Observed = ReadonlyList<T>;

    fn into_readonly_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self.readonly_view()
    }
}

impl<T> IntoReadonly for ReactiveSet<T>
where
    T: Eq + Hash + Clone,
{
    type Observed = ReadonlySet<T>;

    fn into_readonly_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self.readonly_view()
    }
}

impl<K, V> IntoReadonly for ReadonlyMap<K, V> {
    type Observed = ReadonlyMap<K, V>;

    fn into_readonly_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<T> IntoReadonly for ReadonlyList<T> {
    type Observed = ReadonlyList<T>;

    fn into_readonly_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

impl<T> IntoReadonly for ReadonlySet<T> {
    type Observed = ReadonlySet<T>;

    fn into_readonly_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

/// Opt a value out of observation; `make_reactive` passes it through.
pub struct NonReactive<T>(pub T);

pub fn mark_non_reactive<T>(value: T) -> NonReactive<T> {
    NonReactive(value)
}

impl<T> IntoReactive for NonReactive<T> {
    type Observed = NonReactive<T>;

    fn into_reactive_in(self, _ctx: &ReactivityContext) -> Self::Observed {
        self
    }
}

/// Mark a value so `make_reactive` yields the readonly view.
pub struct MarkReadonly<T>(pub T);

pub fn mark_readonly<T>(value: T) -> MarkReadonly<T> {
    MarkReadonly(value)
}

impl<T: IntoReadonly> IntoReactive for MarkReadonly<T> {
    type Observed = T::Observed;

    fn into_reactive_in(self, ctx: &ReactivityContext) -> Self::Observed {
        self.0.into_readonly_in(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReactivityContext;
    use crate::effect::{EffectOptions, effect_in};
    use std::cell::Cell;

    fn counted_effect(
        ctx: &ReactivityContext,
        f: impl FnMut() + 'static,
    ) -> (crate::effect::Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let mut f = f;
        let effect = effect_in(
            ctx,
            move || {
                counter.set(counter.get() + 1);
                f();
            },
            EffectOptions::default(),
        );
        (effect, runs)
    }

    #[test]
    fn map_get_tracks_and_insert_triggers() {
        let ctx = ReactivityContext::new();
        let map = ReactiveMap::new_in(&ctx);
        map.insert("n", 0);
        let reader = map.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.get(&"n");
        });
        assert_eq!(runs.get(), 1);
        map.insert("n", 1);
        assert_eq!(runs.get(), 2);
        // Unchanged value writes do not trigger.
        map.insert("n", 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn iteration_tracks_shape_not_values() {
        let ctx = ReactivityContext::new();
        let map = ReactiveMap::new_in(&ctx);
        map.insert("a", 1);
        let reader = map.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.len();
        });
        assert_eq!(runs.get(), 1);
        // Value-only change: no ADD, shape unchanged.
        map.insert("a", 2);
        assert_eq!(runs.get(), 1);
        // Addition hits the iteration cell.
        map.insert("b", 1);
        assert_eq!(runs.get(), 2);
        map.remove(&"a");
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn clear_reruns_every_dependent() {
        let ctx = ReactivityContext::new();
        let map = ReactiveMap::new_in(&ctx);
        map.insert("a", 1);
        map.insert("b", 2);
        let reader_a = map.clone();
        let (_ea, runs_a) = counted_effect(&ctx, move || {
            let _ = reader_a.get(&"a");
        });
        let reader_b = map.clone();
        let (_eb, runs_b) = counted_effect(&ctx, move || {
            let _ = reader_b.get(&"b");
        });
        map.clear();
        assert_eq!(runs_a.get(), 2);
        assert_eq!(runs_b.get(), 2);
    }

    #[test]
    fn list_length_reacts_to_push_and_pop() {
        let ctx = ReactivityContext::new();
        let list = ReactiveList::new_in(&ctx);
        list.push(1);
        let reader = list.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.len();
        });
        assert_eq!(runs.get(), 1);
        list.push(2);
        assert_eq!(runs.get(), 2);
        list.pop();
        assert_eq!(runs.get(), 3);
        // In-place overwrite leaves the length cell alone.
        list.set(0, 9);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn list_index_reader_sees_only_its_cell() {
        let ctx = ReactivityContext::new();
        let list = ReactiveList::new_in(&ctx);
        list.push(1);
        list.push(2);
        let reader = list.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.get(0);
        });
        assert_eq!(runs.get(), 1);
        list.set(1, 9);
        assert_eq!(runs.get(), 1);
        list.set(0, 9);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn set_membership_tracks_per_value() {
        let ctx = ReactivityContext::new();
        let set = ReactiveSet::new_in(&ctx);
        let reader = set.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.contains(&"x");
        });
        assert_eq!(runs.get(), 1);
        set.insert("x");
        assert_eq!(runs.get(), 2);
        // Re-inserting an existing member is a no-op.
        set.insert("x");
        assert_eq!(runs.get(), 2);
        set.remove(&"x");
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn make_reactive_is_idempotent() {
        let ctx = ReactivityContext::new();
        let map: ReactiveMap<&str, i32> =
            make_reactive_in(&ctx, HashMap::from([("a", 1)]));
        let again = make_reactive_in(&ctx, map.clone());
        assert_eq!(map, again, "re-wrapping must return the same observed view");
    }

    #[test]
    fn readonly_view_is_shared_per_target() {
        let ctx = ReactivityContext::new();
        let map: ReactiveMap<&str, i32> = make_reactive_in(&ctx, HashMap::from([("a", 1)]));
        let ro1 = make_readonly_in(&ctx, map.clone());
        let ro2 = make_readonly_in(&ctx, map.clone());
        assert_eq!(ro1, ro2);
        assert!(ro1.is_readonly());
        assert!(!map.is_readonly());
        // Both modes read the same storage.
        map.insert("a", 5);
        assert_eq!(ro1.get(&"a"), Some(5));
    }

    #[test]
    fn locked_readonly_mutations_are_ignored() {
        let ctx = ReactivityContext::new();
        let map: ReactiveMap<&str, i32> = make_reactive_in(&ctx, HashMap::from([("a", 1)]));
        let ro = map.readonly_view();
        ctx.lock();
        assert_eq!(ro.insert("b", 2), None);
        assert_eq!(ro.remove(&"a"), None);
        ro.clear();
        assert_eq!(map.to_raw().len(), 1, "locked readonly writes must not land");
        ctx.unlock();
        assert_eq!(ro.insert("b", 2), None);
        assert_eq!(map.get(&"b"), Some(2), "unlocked readonly writes proceed");
    }

    #[test]
    fn unlocked_readonly_writes_trigger_effects() {
        let ctx = ReactivityContext::new();
        let map: ReactiveMap<&str, i32> = make_reactive_in(&ctx, HashMap::from([("a", 1)]));
        let ro = map.readonly_view();
        let reader = map.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.get(&"a");
        });
        ctx.lock();
        ro.insert("a", 7);
        assert_eq!(runs.get(), 1);
        ctx.unlock();
        ro.insert("a", 7);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn mark_readonly_routes_make_reactive_to_the_readonly_view() {
        let ctx = ReactivityContext::new();
        let ro = make_reactive_in(&ctx, mark_readonly(HashMap::from([("a", 1)])));
        assert!(ro.is_readonly());
    }

    #[test]
    fn mark_non_reactive_passes_through() {
        let ctx = ReactivityContext::new();
        let raw = make_reactive_in(&ctx, mark_non_reactive(vec![1, 2, 3]));
        assert_eq!(raw.0, vec![1, 2, 3]);
    }

    #[test]
    fn map_refs_delegate_to_the_map_cells() {
        let ctx = ReactivityContext::new();
        let map: ReactiveMap<&str, i32> =
            make_reactive_in(&ctx, HashMap::from([("a", 1), ("b", 2)]));
        let refs = to_refs(&map);
        assert_eq!(refs.len(), 2);
        let (_, a_ref) = refs
            .iter()
            .find(|(k, _)| *k == "a")
            .expect("ref for key a");

        let reader = map.clone();
        let (_effect, runs) = counted_effect(&ctx, move || {
            let _ = reader.get(&"a");
        });
        a_ref.set(10);
        assert_eq!(runs.get(), 2, "writing through the ref must trigger map readers");
        assert_eq!(a_ref.get(), Some(10));
    }
}
