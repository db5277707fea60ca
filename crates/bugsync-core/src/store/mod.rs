// ── In-memory store ──
//
// The ordered collection, the mutation reducer that owns it, and the
// immutable state published to subscribers.

mod collection;
mod reducer;
mod state;

pub(crate) use reducer::{Core, Mutation};
pub use state::EngineState;
