//! Convenience re-exports of the types most call sites need.

pub use crate::codec::{CodecError, NeighborEntry, Packet};
pub use crate::engine::{CdsEngine, EngineConfig};
pub use crate::error::CdsError;
pub use crate::mac::Mac;
pub use crate::neighbor::{NeighborRecord, NeighborTable};
pub use crate::radio::{Radio, RssiDbm};
pub use crate::sink::StatusSink;
pub use crate::timer::{Timer, TimerHandle};
