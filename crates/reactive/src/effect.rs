//! Effect runtime.
//!
//! An effect wraps a user closure so the cells it reads are recorded and
//! the closure re-runs when any of them change. Before each run the effect
//! is removed from every dep it belonged to; the run re-tracks from
//! scratch, so stale subscriptions cannot survive a branch change.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::{EffectId, Key, ReactivityContext, TargetId, TrackEvent, default_context};

pub(crate) struct EffectRecord {
    pub(crate) id: EffectId,
    pub(crate) run_fn: RefCell<Box<dyn FnMut()>>,
    pub(crate) active: Cell<bool>,
    pub(crate) is_computed: bool,
    pub(crate) scheduler: Option<Box<dyn Fn(&Effect)>>,
    pub(crate) deps: RefCell<Vec<(TargetId, Key)>>,
    pub(crate) on_track: Option<Box<dyn Fn(TrackEvent)>>,
    pub(crate) on_trigger: Option<Box<dyn Fn(TrackEvent)>>,
    pub(crate) on_stop: Option<Box<dyn Fn()>>,
}

/// Construction knobs for `effect_with`.
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    /// Sort ahead of plain effects during `trigger`.
    pub computed: bool,
    /// Invoked instead of the effect on trigger; may defer the re-run.
    pub scheduler: Option<Box<dyn Fn(&Effect)>>,
    pub on_track: Option<Box<dyn Fn(TrackEvent)>>,
    pub on_trigger: Option<Box<dyn Fn(TrackEvent)>>,
    pub on_stop: Option<Box<dyn Fn()>>,
}

/// Handle to a registered effect.
#[derive(Clone)]
pub struct Effect {
    ctx: ReactivityContext,
    record: Rc<EffectRecord>,
}

/// Register and immediately run an effect on the default context.
pub fn effect(f: impl FnMut() + 'static) -> Effect {
    effect_with(f, EffectOptions::default())
}

pub fn effect_with(f: impl FnMut() + 'static, options: EffectOptions) -> Effect {
    effect_in(&default_context(), f, options)
}

pub fn effect_in(
    ctx: &ReactivityContext,
    f: impl FnMut() + 'static,
    options: EffectOptions,
) -> Effect {
    let record = Rc::new(EffectRecord {
        id: ctx.next_effect_id(),
        run_fn: RefCell::new(Box::new(f)),
        active: Cell::new(true),
        is_computed: options.computed,
        scheduler: options.scheduler,
        deps: RefCell::new(Vec::new()),
        on_track: options.on_track,
        on_trigger: options.on_trigger,
        on_stop: options.on_stop,
    });
    ctx.register_effect(&record);
    let effect = Effect {
        ctx: ctx.clone(),
        record,
    };
    if !options.lazy {
        effect.run();
    }
    effect
}

impl Effect {
    pub(crate) fn from_record(ctx: ReactivityContext, record: Rc<EffectRecord>) -> Self {
        Self { ctx, record }
    }

    pub(crate) fn record(&self) -> &Rc<EffectRecord> {
        &self.record
    }

    pub(crate) fn context(&self) -> &ReactivityContext {
        &self.ctx
    }

    /// Invoke the effect.
    ///
    /// A stopped effect degrades to the plain closure. An effect already on
    /// the activation stack is skipped, which is what keeps a self-writing
    /// effect from recursing.
    pub fn run(&self) {
        if !self.record.active.get() {
            (self.record.run_fn.borrow_mut())();
            return;
        }
        if self.ctx.inner.stack.borrow().contains(&self.record.id) {
            return;
        }
        self.ctx.cleanup(&self.record);
        self.ctx.inner.stack.borrow_mut().push(self.record.id);
        // Pop on every exit path, unwinding included.
        let _guard = StackGuard { ctx: &self.ctx };
        (self.record.run_fn.borrow_mut())();
    }

    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn is_active(&self) -> bool {
        self.record.active.get()
    }

    pub fn is_computed(&self) -> bool {
        self.record.is_computed
    }

    /// Number of cells this effect is currently subscribed to
    /// (instrumentation; pairs with `ReactivityContext::subscription_count`).
    pub fn dep_count(&self) -> usize {
        self.record.deps.borrow().len()
    }
}

struct StackGuard<'a> {
    ctx: &'a ReactivityContext,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let popped = self.ctx.inner.stack.borrow_mut().pop();
        debug_assert!(popped.is_some(), "activation stack underflow");
    }
}

/// Detach the effect from the graph. Idempotent.
///
/// Unregistering also drops the registry's strong reference, which is what
/// releases the closure (and anything it captured).
pub fn stop(effect: &Effect) {
    if !effect.record.active.get() {
        return;
    }
    effect.ctx.cleanup(&effect.record);
    if let Some(hook) = &effect.record.on_stop {
        hook();
    }
    effect.record.active.set(false);
    effect.ctx.unregister_effect(effect.record.id);
}
