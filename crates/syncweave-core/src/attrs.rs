//! Attribute/metadata collaborator: resolves which declared annotations mark
//! a field as replicated, and reads named annotation arguments.

use syncweave_ir::{AttrValue, Attribute};

/// Names recognized by the [`DefaultAttributeOracle`].
pub const VARIABLE_ATTR: &str = "Replicated";
pub const OBJECT_ATTR: &str = "ReplicatedObject";

/// Attribute on a container-shaped replicated type (`shape = "list" | "map"`).
pub const CONTAINER_SHAPE_ATTR: &str = "ContainerShape";

/// Attribute marking a named type as having a registered codec.
pub const CODEC_ATTR: &str = "Codec";

/// Classifies annotation names for the weaving pass.
pub trait AttributeOracle {
    fn is_variable_annotation(&self, attr_name: &str) -> bool;
    fn is_object_annotation(&self, attr_name: &str) -> bool;
}

/// Oracle for the stock annotation vocabulary.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAttributeOracle;

impl AttributeOracle for DefaultAttributeOracle {
    fn is_variable_annotation(&self, attr_name: &str) -> bool {
        attr_name == VARIABLE_ATTR
    }

    fn is_object_annotation(&self, attr_name: &str) -> bool {
        attr_name == OBJECT_ATTR
    }
}

/// Read a named string argument off an attribute.
pub fn named_str<'a>(attr: &'a Attribute, key: &str) -> Option<&'a str> {
    match attr.args.get(key) {
        Some(AttrValue::Str(s)) => Some(s.as_str()),
        _ => None,
    }
}

/// Read a named integer argument off an attribute, with a default.
pub fn named_int(attr: &Attribute, key: &str, default: i64) -> i64 {
    match attr.args.get(key) {
        Some(AttrValue::Int(v)) => *v,
        _ => default,
    }
}

/// Read a named bool argument off an attribute, with a default.
pub fn named_bool(attr: &Attribute, key: &str, default: bool) -> bool {
    match attr.args.get(key) {
        Some(AttrValue::Bool(v)) => *v,
        _ => default,
    }
}
