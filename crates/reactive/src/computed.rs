//! Lazy memoized derivations.
//!
//! A computed is an effect whose scheduler only flips a dirty bit; the
//! getter re-runs on the next read, never eagerly. Because computed records
//! carry `is_computed`, `trigger` invalidates them before plain effects
//! run, so a plain effect reading a computed in the same turn always sees
//! the fresh value.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::{ReactivityContext, default_context};
use crate::effect::{Effect, EffectOptions, effect_in};

struct ComputedStore<T> {
    runner: Effect,
    value: Rc<RefCell<Option<T>>>,
    dirty: Rc<Cell<bool>>,
    setter: Option<Box<dyn Fn(T)>>,
}

/// Memoized derivation read through `get`. Cloning shares the derivation.
pub struct Computed<T> {
    store: Rc<ComputedStore<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

/// Build a computed on the default context.
pub fn computed<T: Clone + 'static>(getter: impl FnMut() -> T + 'static) -> Computed<T> {
    computed_in(&default_context(), getter)
}

/// Writable computed: `set` routes through the provided setter.
pub fn computed_with<T: Clone + 'static>(
    getter: impl FnMut() -> T + 'static,
    setter: impl Fn(T) + 'static,
) -> Computed<T> {
    computed_with_in(&default_context(), getter, setter)
}

pub fn computed_in<T: Clone + 'static>(
    ctx: &ReactivityContext,
    getter: impl FnMut() -> T + 'static,
) -> Computed<T> {
    build(ctx, getter, None)
}

pub fn computed_with_in<T: Clone + 'static>(
    ctx: &ReactivityContext,
    getter: impl FnMut() -> T + 'static,
    setter: impl Fn(T) + 'static,
) -> Computed<T> {
    build(ctx, getter, Some(Box::new(setter)))
}

fn build<T: Clone + 'static>(
    ctx: &ReactivityContext,
    mut getter: impl FnMut() -> T + 'static,
    setter: Option<Box<dyn Fn(T)>>,
) -> Computed<T> {
    let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let dirty = Rc::new(Cell::new(true));
    let slot = Rc::clone(&value);
    let invalidate = Rc::clone(&dirty);
    let runner = effect_in(
        ctx,
        move || {
            *slot.borrow_mut() = Some(getter());
        },
        EffectOptions {
            lazy: true,
            computed: true,
            scheduler: Some(Box::new(move |_effect| invalidate.set(true))),
            ..Default::default()
        },
    );
    Computed {
        store: Rc::new(ComputedStore {
            runner,
            value,
            dirty,
            setter,
        }),
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Current value, recomputing when a dependency changed since the last
    /// read.
    ///
    /// Reading inside another effect also subscribes that effect to every
    /// cell this computed depends on, which is what carries invalidation
    /// through computed chains.
    pub fn get(&self) -> T {
        if self.store.dirty.get() {
            self.store.runner.run();
            self.store.dirty.set(false);
        }
        self.store
            .runner
            .context()
            .track_child_run(self.store.runner.record());
        self.store
            .value
            .borrow()
            .clone()
            .expect("computed getter populated the slot")
    }

    /// Write through the setter; warns when the computed is read-only.
    pub fn set(&self, value: T) {
        match &self.store.setter {
            Some(setter) => setter(value),
            None => log::warn!(
                target: "reactive.computed",
                "write to a computed without setter is ignored"
            ),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.store.dirty.get()
    }

    /// The underlying effect (for `stop`).
    pub fn effect(&self) -> &Effect {
        &self.store.runner
    }
}
