//! The stateflow store engine.
//!
//! Actions flow dispatch → transformer chain → processor chain → reduction →
//! state subject, strictly one item at a time; the single drain task is the
//! only writer. Feature modules contribute slice reducers and effects at
//! runtime, and every registry change is itself an action, so it can never
//! interleave with a reduction.

pub mod combine;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod types;

pub use combine::{combine_reducers, setup_reducer, validate_module, ReducerEntry, RootReducer};
pub use pipeline::{compose_stages, once, stage, ActionStream, Next, Stage, StageContext, Thunk};
pub use registry::{load_module, register_effects, unload_module, unregister_effects, StoreState};
pub use store::{
    Enhancer, Store, StoreBuilder, ENABLE_TRANSFORMERS, LOAD_MODULE, REGISTER_EFFECTS,
    SETUP_PROCESSORS, UNLOAD_MODULE, UNREGISTER_EFFECTS,
};
pub use types::{reducer_fn, FeatureModule, MainModule, Reducer};
