//! syncweave
//!
//! Post-compilation weaving of state replication into module images:
//!
//! - **Object model**: load, edit, and validate compiled module images
//! - **Weave pass**: classify attributed fields, synthesize handler wiring
//!   and accessors, rewrite call sites, build inbound dispatch
//! - **Reference interpreter**: execute woven images for inspection
//!
//! See [`syncweave_core::pass`] for the pass itself; this crate adds the
//! on-disk image format and the CLI.

pub mod imagefile;

pub use syncweave_core::{
    weave_module, CollectingSink, DefaultAttributeOracle, DefaultCodecProvider, DiagnosticSink,
    TracingSink, WeaveReport,
};
pub use syncweave_ir::{validate_module, ModuleImage};
