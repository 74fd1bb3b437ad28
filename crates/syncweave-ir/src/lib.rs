//! Compiled-module object model for the syncweave workspace.
//!
//! This crate provides the in-memory image of a compilation unit that the
//! weaving pass edits: types, fields, methods, properties, attributes, and
//! instruction streams. Branch targets are indices into the owning
//! instruction sequence, never byte offsets, so structural edits go through
//! an index-aware [`CodeUnit::splice`] that retargets branches automatically.
//!
//! The whole image is `serde`-serializable, so module images round-trip as
//! JSON for CLI input/output and test fixtures.

pub mod code;
pub mod module;
pub mod sig;
pub mod validate;

pub use code::{CodeUnit, Op};
pub use module::{
    AttrValue, Attribute, FieldDef, FieldRef, MethodDef, MethodKind, MethodRef, ModuleImage,
    NativeKind, PropertyDef, TypeDef, TypeId,
};
pub use sig::TypeSig;
pub use validate::{validate_method, validate_module};
