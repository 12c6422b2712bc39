//! Dependency-tracking reactivity graph.
//!
//! Wrapped containers record which effect read which cell `(target, key)`;
//! writes re-run every effect that transitively read the written cell.
//! Computed derivations are lazy effects invalidated by a dirty bit and
//! always re-run ahead of plain effects within one trigger.
//!
//! Single-threaded cooperative: all state is `Rc`/`RefCell`-based and lives
//! in a `ReactivityContext`. The free functions use a thread-local default
//! context; tests can build isolated contexts and use the `*_in`
//! constructors.

mod computed;
mod context;
mod effect;
mod reference;
mod store;

pub use crate::computed::{Computed, computed, computed_in, computed_with, computed_with_in};
pub use crate::context::{
    Key, OpKind, ReactivityContext, TrackEvent, default_context, lock, pause_tracking,
    resume_tracking, unlock,
};
pub use crate::effect::{Effect, EffectOptions, effect, effect_in, effect_with, stop};
pub use crate::reference::{Ref, make_ref};
pub use crate::store::{
    IntoReactive, IntoReadonly, MapRef, MarkReadonly, NonReactive, ReactiveList, ReactiveMap,
    ReactiveSet, ReadonlyList, ReadonlyMap, ReadonlySet, make_reactive, make_reactive_in,
    make_readonly, make_readonly_in, mark_non_reactive, mark_readonly, to_refs,
};
