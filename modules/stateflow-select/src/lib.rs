//! Memoized derived-state selectors.
//!
//! Independent of the store engine: selectors compute over any JSON state
//! value. Two caching strategies compose into a releasable selector object —
//! keyed memoization (unbounded, joined-argument keys, pending timeout) for
//! input selectors and single-slot memoization for the projector.

pub mod config;
pub mod error;
pub mod memo;
pub mod select;

pub use config::SelectConfig;
pub use error::{SelectError, SelectResult};
pub use memo::{memo_key, ArgsFn, KeyedMemo, Memoized, PassthroughMemo, SingleSlotMemo};
pub use select::{
    async_selector_fn, create_selector, projector_fn, selector_fn, MemoStrategy,
    MemoizedSelector, ProjectorFn, SelectorFn, SelectorOptions,
};
