//! Output graph model and storage
//!
//! Nodes and edges accumulate in a disk-backed, deduplicating
//! [`GraphStore`] and are exported as one streamed JSON document
//! (optionally zip-compressed). A [`GraphContext`] builds the slice of
//! the graph belonging to one (host, share) pair with lazy, once-only
//! emission.

pub mod context;
pub mod edge;
pub mod kinds;
pub mod node;
pub mod store;

pub use context::{GraphContext, RightsSet};
pub use edge::{Edge, Endpoint};
pub use node::Node;
pub use store::{GraphStore, ProgressFn};
