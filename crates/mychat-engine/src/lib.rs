//! Message assembly and read-state updates on top of a [`ChatStore`](mychat_core::ChatStore).

pub mod assembler;
pub mod bounded;
pub mod engine;
pub mod locks;
pub mod read_state;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::MessageAssembler;
pub use engine::{ChatEngine, EngineConfig};
pub use read_state::{ReadOutcome, ReadStateUpdater};
