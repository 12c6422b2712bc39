//! Single-cell reactive boxes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::{Key, OpKind, ReactivityContext, TargetId, default_context};

struct RefStore<T> {
    ctx: ReactivityContext,
    target: TargetId,
    value: RefCell<T>,
}

/// Reactive box around one value.
///
/// Reads track the box's single cell; writes trigger it. Containers are not
/// auto-wrapped: compose with `make_reactive` explicitly before boxing.
pub struct Ref<T> {
    store: Rc<RefStore<T>>,
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
        }
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

/// Box a value on the default context.
pub fn make_ref<T: Clone>(value: T) -> Ref<T> {
    Ref::new_in(&default_context(), value)
}

impl<T: Clone> Ref<T> {
    pub fn new(value: T) -> Self {
        Self::new_in(&default_context(), value)
    }

    pub fn new_in(ctx: &ReactivityContext, value: T) -> Self {
        Self {
            store: Rc::new(RefStore {
                ctx: ctx.clone(),
                target: ctx.next_target_id(),
                value: RefCell::new(value),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.store
            .ctx
            .track(self.store.target, OpKind::Get, Key::Value);
        self.store.value.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.store.value.borrow_mut() = value;
        self.store
            .ctx
            .trigger(self.store.target, OpKind::Set, Some(Key::Value), Key::Value);
    }

    /// Read without tracking.
    pub fn get_untracked(&self) -> T {
        self.store.value.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReactivityContext;
    use crate::effect::{EffectOptions, effect_in, stop};
    use std::cell::Cell;

    #[test]
    fn ref_reads_track_and_writes_trigger() {
        let ctx = ReactivityContext::new();
        let cell = Ref::new_in(&ctx, 1);
        let runs = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let sink = Rc::clone(&seen);
        let reader = cell.clone();
        let effect = effect_in(
            &ctx,
            move || {
                counter.set(counter.get() + 1);
                sink.set(reader.get());
            },
            EffectOptions::default(),
        );
        assert_eq!((runs.get(), seen.get()), (1, 1));
        cell.set(5);
        assert_eq!((runs.get(), seen.get()), (2, 5));
        stop(&effect);
        cell.set(9);
        assert_eq!((runs.get(), seen.get()), (2, 5));
    }

    #[test]
    fn untracked_reads_subscribe_nothing() {
        let ctx = ReactivityContext::new();
        let cell = Ref::new_in(&ctx, 1);
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let reader = cell.clone();
        let _effect = effect_in(
            &ctx,
            move || {
                counter.set(counter.get() + 1);
                let _ = reader.get_untracked();
            },
            EffectOptions::default(),
        );
        cell.set(2);
        assert_eq!(runs.get(), 1);
    }
}
