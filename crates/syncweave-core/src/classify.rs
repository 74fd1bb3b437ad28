//! Field classification: decides how a declared field participates in
//! replication, or rejects it with a diagnostic and moves on.

use anyhow::Result;
use tracing::debug;
use syncweave_ir::{ModuleImage, TypeId, TypeSig};

use crate::attrs::{named_str, AttributeOracle, CONTAINER_SHAPE_ATTR};
use crate::diag::DiagnosticSink;
use crate::model::{
    ReplicatedFieldDescriptor, SyncKind, WireConfig, OBJECT_INITIALIZE, OBJECT_SET_INDEX,
};

/// Result of classifying one field.
#[derive(Debug)]
pub enum ClassifyOutcome {
    /// Field carries no replication annotation; leave it untouched.
    NotReplicated,
    Replicated(ReplicatedFieldDescriptor),
    /// Field was annotated but invalid; diagnostic already emitted.
    Skipped(String),
}

/// Does `tid` (or an ancestor) expose the object-replication capability:
/// the `initialize` / `set_index` operations synthesis will call?
pub fn has_object_capability(image: &ModuleImage, tid: TypeId) -> Result<bool> {
    Ok(image.find_method_in_chain(tid, OBJECT_INITIALIZE)?.is_some()
        && image.find_method_in_chain(tid, OBJECT_SET_INDEX)?.is_some())
}

/// Container shape declared on `tid` or an ancestor, if any.
fn container_shape(image: &ModuleImage, tid: TypeId) -> Result<Option<SyncKind>> {
    for cur in image.base_chain(tid)? {
        for attr in &image.type_at(cur)?.attrs {
            if attr.name == CONTAINER_SHAPE_ATTR {
                return Ok(match named_str(attr, "shape") {
                    Some("list") => Some(SyncKind::List),
                    Some("map") => Some(SyncKind::Mapping),
                    _ => None,
                });
            }
        }
    }
    Ok(None)
}

/// Classify one field of `tid`. All rejections are fatal to this field only:
/// one diagnostic, then the caller continues with the siblings.
pub fn classify_field(
    image: &ModuleImage,
    tid: TypeId,
    field_index: usize,
    oracle: &dyn AttributeOracle,
    sink: &mut dyn DiagnosticSink,
) -> Result<ClassifyOutcome> {
    let ty = image.type_at(tid)?;
    let field = &ty.fields[field_index];
    let label = format!("{}::{}", ty.name, field.name);

    let variable_attrs: Vec<_> = field
        .attrs
        .iter()
        .filter(|a| oracle.is_variable_annotation(&a.name))
        .collect();
    let object_attrs: Vec<_> = field
        .attrs
        .iter()
        .filter(|a| oracle.is_object_annotation(&a.name))
        .collect();

    if variable_attrs.is_empty() && object_attrs.is_empty() {
        return Ok(ClassifyOutcome::NotReplicated);
    }

    let reject = |sink: &mut dyn DiagnosticSink, reason: String| {
        sink.error(format!("field `{label}`: {reason}"));
        Ok(ClassifyOutcome::Skipped(reason))
    };

    if variable_attrs.len() + object_attrs.len() > 1 {
        return reject(sink, "conflicting replication annotations".to_string());
    }
    if field.is_static {
        return reject(sink, "replication annotation on a static field".to_string());
    }
    if matches!(field.sig, TypeSig::GenericParam(_)) {
        return reject(
            sink,
            "replication annotation on a generic-parameter-typed field".to_string(),
        );
    }

    if let Some(attr) = variable_attrs.first() {
        let descriptor = ReplicatedFieldDescriptor {
            owner: tid,
            field_index,
            field_name: field.name.clone(),
            data_sig: field.sig.clone(),
            kind: SyncKind::Variable,
            wire: WireConfig::from_attribute(attr),
            ordinal: None,
            hook: named_str(attr, "hook").map(str::to_string),
        };
        debug!(target: "syncweave", "classified `{label}` as variable");
        return Ok(ClassifyOutcome::Replicated(descriptor));
    }

    // Object kind: the declared type itself supplies the handler role.
    let attr = object_attrs[0];
    let field_tid = match &field.sig {
        TypeSig::Named(field_tid, _) => *field_tid,
        _ => {
            return reject(
                sink,
                format!(
                    "object replication requires a replication-capable class type, found `{}`",
                    field.sig.describe(image)
                ),
            );
        }
    };
    if !has_object_capability(image, field_tid)? {
        return reject(
            sink,
            format!(
                "type `{}` does not expose the object-replication capability \
                 (`{OBJECT_INITIALIZE}`/`{OBJECT_SET_INDEX}`)",
                image.type_name(field_tid)
            ),
        );
    }
    if !field.is_final {
        return reject(
            sink,
            "object-kind replicated field must be non-reassignable".to_string(),
        );
    }

    let kind = container_shape(image, field_tid)?.unwrap_or(SyncKind::CustomObject);
    let descriptor = ReplicatedFieldDescriptor {
        owner: tid,
        field_index,
        field_name: field.name.clone(),
        data_sig: field.sig.clone(),
        kind,
        wire: WireConfig::from_attribute(attr),
        ordinal: None,
        hook: None,
    };
    debug!(target: "syncweave", "classified `{label}` as {kind:?}");
    Ok(ClassifyOutcome::Replicated(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{DefaultAttributeOracle, OBJECT_ATTR, VARIABLE_ATTR};
    use crate::diag::CollectingSink;
    use syncweave_ir::{Attribute, FieldDef, MethodDef, MethodKind, NativeKind, TypeDef};

    fn capability_base(image: &mut ModuleImage) -> TypeId {
        let mut base = TypeDef::new("SyncObject");
        let mut init = MethodDef::new(OBJECT_INITIALIZE, MethodKind::Plain);
        init.params = vec![TypeSig::U64, TypeSig::U64, TypeSig::U64, TypeSig::U64, TypeSig::Bool];
        init.is_virtual = true;
        init.native = Some(NativeKind::ObjectInitialize);
        init.body = None;
        base.add_method(init).unwrap();
        let mut set_index = MethodDef::new(OBJECT_SET_INDEX, MethodKind::Plain);
        set_index.params = vec![TypeSig::Object, TypeSig::U64];
        set_index.is_virtual = true;
        set_index.native = Some(NativeKind::ObjectSetIndex);
        set_index.body = None;
        base.add_method(set_index).unwrap();
        image.add_type(base)
    }

    fn classify(
        image: &ModuleImage,
        tid: TypeId,
        idx: usize,
        sink: &mut CollectingSink,
    ) -> ClassifyOutcome {
        classify_field(image, tid, idx, &DefaultAttributeOracle, sink).unwrap()
    }

    #[test]
    fn plain_field_is_not_replicated() {
        let mut image = ModuleImage::default();
        let mut ty = TypeDef::new("Actor");
        ty.add_field(FieldDef::new("hp", TypeSig::U64)).unwrap();
        let tid = image.add_type(ty);
        let mut sink = CollectingSink::new();
        assert!(matches!(
            classify(&image, tid, 0, &mut sink),
            ClassifyOutcome::NotReplicated
        ));
        assert!(sink.is_clean());
    }

    #[test]
    fn annotated_value_field_is_variable_kind() {
        let mut image = ModuleImage::default();
        let mut ty = TypeDef::new("Actor");
        let mut hp = FieldDef::new("hp", TypeSig::U64);
        hp.attrs.push(Attribute::new(VARIABLE_ATTR));
        ty.add_field(hp).unwrap();
        let tid = image.add_type(ty);
        let mut sink = CollectingSink::new();
        match classify(&image, tid, 0, &mut sink) {
            ClassifyOutcome::Replicated(d) => {
                assert_eq!(d.kind, SyncKind::Variable);
                assert!(d.hook.is_none());
            }
            other => panic!("expected variable classification, got {other:?}"),
        }
    }

    #[test]
    fn conflicting_annotations_rejected() {
        let mut image = ModuleImage::default();
        let mut ty = TypeDef::new("Actor");
        let mut hp = FieldDef::new("hp", TypeSig::U64);
        hp.attrs.push(Attribute::new(VARIABLE_ATTR));
        hp.attrs.push(Attribute::new(OBJECT_ATTR));
        ty.add_field(hp).unwrap();
        let tid = image.add_type(ty);
        let mut sink = CollectingSink::new();
        assert!(matches!(
            classify(&image, tid, 0, &mut sink),
            ClassifyOutcome::Skipped(_)
        ));
        assert_eq!(sink.errors.len(), 1);
    }

    #[test]
    fn static_and_generic_fields_rejected() {
        let mut image = ModuleImage::default();
        let mut ty = TypeDef::new("Actor");
        ty.type_params = 1;
        let mut counter = FieldDef::new("counter", TypeSig::U64);
        counter.is_static = true;
        counter.attrs.push(Attribute::new(VARIABLE_ATTR));
        ty.add_field(counter).unwrap();
        let mut slot = FieldDef::new("slot", TypeSig::GenericParam(0));
        slot.attrs.push(Attribute::new(VARIABLE_ATTR));
        ty.add_field(slot).unwrap();
        let tid = image.add_type(ty);
        let mut sink = CollectingSink::new();
        assert!(matches!(classify(&image, tid, 0, &mut sink), ClassifyOutcome::Skipped(_)));
        assert!(matches!(classify(&image, tid, 1, &mut sink), ClassifyOutcome::Skipped(_)));
        assert_eq!(sink.errors.len(), 2);
    }

    #[test]
    fn container_shape_resolves_through_base_chain() {
        let mut image = ModuleImage::default();
        let base = capability_base(&mut image);
        let mut list_ty = TypeDef::new("SyncList");
        list_ty.base = Some(base);
        list_ty.type_params = 1;
        list_ty.attrs.push(
            Attribute::new(CONTAINER_SHAPE_ATTR)
                .with_arg("shape", syncweave_ir::AttrValue::Str("list".into())),
        );
        let list_tid = image.add_type(list_ty);

        let mut owner = TypeDef::new("Actor");
        let mut items = FieldDef::new("items", TypeSig::Named(list_tid, vec![TypeSig::U64]));
        items.is_final = true;
        items.attrs.push(Attribute::new(OBJECT_ATTR));
        owner.add_field(items).unwrap();
        let tid = image.add_type(owner);

        let mut sink = CollectingSink::new();
        match classify(&image, tid, 0, &mut sink) {
            ClassifyOutcome::Replicated(d) => assert_eq!(d.kind, SyncKind::List),
            other => panic!("expected list classification, got {other:?}"),
        }
    }

    #[test]
    fn reassignable_object_field_rejected() {
        let mut image = ModuleImage::default();
        let base = capability_base(&mut image);
        let mut custom = TypeDef::new("SyncClock");
        custom.base = Some(base);
        let custom_tid = image.add_type(custom);

        let mut owner = TypeDef::new("Actor");
        let mut clock = FieldDef::new("clock", TypeSig::Named(custom_tid, vec![]));
        clock.attrs.push(Attribute::new(OBJECT_ATTR));
        // not marked final
        owner.add_field(clock).unwrap();
        let tid = image.add_type(owner);

        let mut sink = CollectingSink::new();
        assert!(matches!(classify(&image, tid, 0, &mut sink), ClassifyOutcome::Skipped(_)));
        assert!(sink.errors[0].contains("non-reassignable"));
    }

    #[test]
    fn object_annotation_without_capability_rejected() {
        let mut image = ModuleImage::default();
        let bare = image.add_type(TypeDef::new("Bare"));
        let mut owner = TypeDef::new("Actor");
        let mut f = FieldDef::new("bare", TypeSig::Named(bare, vec![]));
        f.is_final = true;
        f.attrs.push(Attribute::new(OBJECT_ATTR));
        owner.add_field(f).unwrap();
        let tid = image.add_type(owner);
        let mut sink = CollectingSink::new();
        assert!(matches!(classify(&image, tid, 0, &mut sink), ClassifyOutcome::Skipped(_)));
        assert!(sink.errors[0].contains("object-replication capability"));
    }
}
