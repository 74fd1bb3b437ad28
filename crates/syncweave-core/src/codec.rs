//! Serialization collaborator boundary.
//!
//! The weaver never encodes anything itself; it only asks whether a data type
//! has a known encode/decode pair, and asks the codec to emit the instruction
//! sequence that decodes one value from a reader handle.

use anyhow::Result;
use syncweave_ir::{ModuleImage, Op, TypeSig};

use crate::attrs::{named_bool, named_str, CODEC_ATTR};

/// Capability-query and instruction-emission interface of the codec.
pub trait CodecProvider {
    /// Does `sig` have a registered codec? `both_directions` requires the
    /// encode half as well as the decode half.
    fn has_codec(&self, image: &ModuleImage, sig: &TypeSig, both_directions: bool) -> bool;

    /// Emit the sequence that pops a reader handle and pushes one decoded
    /// value of `sig`.
    fn emit_read(&self, sig: &TypeSig) -> Vec<Op>;
}

/// Stock codec: scalars and strings are always covered, containers are
/// covered when their element shapes are, and a named type is covered when
/// its definition carries the `Codec` attribute.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodecProvider;

impl CodecProvider for DefaultCodecProvider {
    fn has_codec(&self, image: &ModuleImage, sig: &TypeSig, both_directions: bool) -> bool {
        match sig {
            s if s.is_primitive() => true,
            TypeSig::List(inner) => self.has_codec(image, inner, both_directions),
            TypeSig::Map(k, v) => {
                self.has_codec(image, k, both_directions) && self.has_codec(image, v, both_directions)
            }
            TypeSig::Named(tid, _) => image
                .get_type(*tid)
                .map(|t| t.attrs.iter().any(|a| a.name == CODEC_ATTR))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn emit_read(&self, sig: &TypeSig) -> Vec<Op> {
        vec![Op::CodecRead(sig.clone())]
    }
}

/// Resolve the serialized-representation type a custom replicated object
/// declares on its own definition.
///
/// Returns `Ok(None)` when the type declares that no representation is
/// needed (`repr_none = true`), `Ok(Some(sig))` with the declared
/// representation or, absent any declaration, the type's own signature.
pub fn serialized_repr(image: &ModuleImage, sig: &TypeSig) -> Result<Option<TypeSig>> {
    let tid = match sig {
        TypeSig::Named(tid, _) => *tid,
        _ => return Ok(Some(sig.clone())),
    };
    let ty = image.type_at(tid)?;
    for attr in &ty.attrs {
        if attr.name != "Serialization" {
            continue;
        }
        if named_bool(attr, "repr_none", false) {
            return Ok(None);
        }
        if let Some(name) = named_str(attr, "repr") {
            return Ok(image
                .find_type(name)
                .map(|rid| TypeSig::Named(rid, Vec::new()))
                // unknown representation name: surface it to the checker,
                // which will reject it with a diagnostic
                .or(Some(TypeSig::Object)));
        }
    }
    Ok(Some(sig.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncweave_ir::{AttrValue, Attribute, TypeDef};

    #[test]
    fn primitives_and_containers_have_codecs() {
        let image = ModuleImage::default();
        let codec = DefaultCodecProvider;
        assert!(codec.has_codec(&image, &TypeSig::U64, true));
        assert!(codec.has_codec(&image, &TypeSig::List(Box::new(TypeSig::Str)), true));
        assert!(!codec.has_codec(&image, &TypeSig::Object, true));
    }

    #[test]
    fn named_types_need_the_codec_attribute() {
        let mut image = ModuleImage::default();
        let plain = image.add_type(TypeDef::new("Plain"));
        let mut marked = TypeDef::new("Marked");
        marked.attrs.push(Attribute::new(CODEC_ATTR));
        let marked = image.add_type(marked);
        let codec = DefaultCodecProvider;
        assert!(!codec.has_codec(&image, &TypeSig::Named(plain, vec![]), true));
        assert!(codec.has_codec(&image, &TypeSig::Named(marked, vec![]), true));
    }

    #[test]
    fn repr_resolution() {
        let mut image = ModuleImage::default();
        let mut snapshot = TypeDef::new("ClockSnapshot");
        snapshot.attrs.push(Attribute::new(CODEC_ATTR));
        let snapshot = image.add_type(snapshot);

        let mut clock = TypeDef::new("SyncClock");
        clock.attrs.push(
            Attribute::new("Serialization").with_arg("repr", AttrValue::Str("ClockSnapshot".into())),
        );
        let clock = image.add_type(clock);

        let mut opaque = TypeDef::new("Opaque");
        opaque
            .attrs
            .push(Attribute::new("Serialization").with_arg("repr_none", AttrValue::Bool(true)));
        let opaque = image.add_type(opaque);

        let repr = serialized_repr(&image, &TypeSig::Named(clock, vec![])).unwrap();
        assert_eq!(repr, Some(TypeSig::Named(snapshot, vec![])));
        let none = serialized_repr(&image, &TypeSig::Named(opaque, vec![])).unwrap();
        assert_eq!(none, None);
    }
}
