//! Replication weaving engine
//!
//! Takes a compiled module image and retrofits state replication onto
//! attributed fields:
//!
//! - **Classification**: decide which fields replicate and how
//! - **Synthesis**: handler wiring, accessor pairs, startup-routine blocks
//! - **Rewriting**: redirect direct field access through the accessors
//! - **Dispatch**: per-type inbound update routine, chained up the hierarchy
//! - **Interpretation**: a reference interpreter for woven images
//!
//! The entry point is [`pass::weave_module`]; everything else is exposed for
//! tooling and tests.

pub mod accessors;
pub mod attrs;
pub mod classify;
pub mod codec;
pub mod context;
pub mod diag;
pub mod dispatch;
pub mod handlers;
pub mod model;
pub mod pass;
pub mod rewrite;
pub mod vm;

pub use attrs::{AttributeOracle, DefaultAttributeOracle};
pub use codec::{CodecProvider, DefaultCodecProvider};
pub use context::WeaveContext;
pub use diag::{CollectingSink, DiagnosticSink, TracingSink};
pub use model::{
    AccessorPair, Channel, ReadVisibility, ReplicatedFieldDescriptor, SyncKind, WireConfig,
    WriteAuthority,
};
pub use pass::{weave_module, weave_type, SkippedField, TypeWeaveReport, WeaveReport, WovenField};
