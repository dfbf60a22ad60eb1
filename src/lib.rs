//! Connected Dominating Set control plane for a LoRa mesh node.
//!
//! A node participates in a distributed election of *dominators*: a
//! connected subset of the mesh such that every non-dominator is adjacent
//! to at least one dominator. Only dominators forward broadcast traffic,
//! which keeps flooding overhead bounded on a single-radio, broadcast-only,
//! lossy link.
//!
//! [`engine::CdsEngine`] is the entry point: it owns the neighbor table,
//! drives the discovery/beacon/leaver timers, and runs the dominance
//! decision ([`engine::dominance`]) whenever enough two-hop information has
//! arrived. [`codec`] carries the three control packets over whatever
//! [`radio::Radio`] the node is built with; [`timer::Timer`] abstracts the
//! clock and timer primitives the engine schedules against.

pub mod codec;
pub mod engine;
pub mod error;
pub mod mac;
pub mod neighbor;
pub mod prelude;
pub mod radio;
pub mod sink;
pub mod timer;
