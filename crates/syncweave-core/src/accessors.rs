//! Accessor synthesis: the get/set proxy pair standing in for a replicated
//! Variable field.

use anyhow::Result;
use tracing::debug;
use syncweave_ir::{
    CodeUnit, FieldRef, MethodDef, MethodKind, MethodRef, ModuleImage, Op, TypeId, TypeSig,
};

use crate::diag::DiagnosticSink;
use crate::model::{
    getter_name, setter_name, AccessorPair, ReplicatedFieldDescriptor, HANDLER_LOCAL_AUTHORITY,
    HANDLER_REMOTE_VALUE, HANDLER_TRY_APPLY,
};

/// Validate a declared change-hook: exactly three parameters matching
/// `(fieldType, fieldType, bool)` on the owning type. On mismatch, emits one
/// diagnostic and the field proceeds without a hook.
fn resolve_hook(
    image: &ModuleImage,
    desc: &ReplicatedFieldDescriptor,
    sink: &mut dyn DiagnosticSink,
) -> Option<String> {
    let hook_name = desc.hook.as_deref()?;
    let owner = image.get_type(desc.owner)?;
    let label = format!("{}::{}", owner.name, desc.field_name);
    let expected = [desc.data_sig.clone(), desc.data_sig.clone(), TypeSig::Bool];
    match owner.find_method(hook_name) {
        Some(idx) if owner.methods[idx].params == expected => Some(hook_name.to_string()),
        Some(_) => {
            sink.error(format!(
                "field `{label}`: change-hook `{hook_name}` must take \
                 (previous: {0}, new: {0}, authoritative: bool)",
                desc.data_sig.describe(image)
            ));
            None
        }
        None => {
            sink.error(format!(
                "field `{label}`: change-hook `{hook_name}` not found on `{}`",
                owner.name
            ));
            None
        }
    }
}

/// Synthesize the getter/setter pair for a Variable-kind field.
///
/// The getter reads the backing field directly. The setter captures the
/// previous value (when a hook is declared), asks the handler to accept the
/// write, and only then mutates the backing field and fires the hook.
pub fn synthesize_accessors(
    image: &mut ModuleImage,
    desc: &ReplicatedFieldDescriptor,
    handler_tid: TypeId,
    handler_field: &str,
    sink: &mut dyn DiagnosticSink,
) -> Result<AccessorPair> {
    let hook = resolve_hook(image, desc, sink);
    let field_ref = FieldRef::new(desc.owner, desc.field_name.clone());
    let handler_ref = FieldRef::new(desc.owner, handler_field.to_string());

    let mut getter = MethodDef::new(getter_name(&desc.field_name), MethodKind::Synthesized);
    getter.ret = Some(desc.data_sig.clone());
    getter.body = Some(CodeUnit::new(vec![
        Op::LdSelf,
        Op::LdField(field_ref.clone()),
        Op::Ret,
    ]));

    let mut setter = MethodDef::new(setter_name(&desc.field_name), MethodKind::Synthesized);
    setter.params = vec![desc.data_sig.clone(), TypeSig::Bool];
    setter.body = Some(match &hook {
        Some(hook_name) => setter_body_with_hook(desc, &field_ref, &handler_ref, handler_tid, hook_name),
        None => setter_body_plain(&field_ref, &handler_ref, handler_tid),
    });

    let pair = AccessorPair {
        getter: getter.name.clone(),
        setter: setter.name.clone(),
    };
    let owner = image.type_at_mut(desc.owner)?;
    owner.add_method(getter)?;
    owner.add_method(setter)?;
    debug!(
        target: "syncweave",
        "synthesized accessors for `{}::{}` (hook: {})",
        image.type_name(desc.owner),
        desc.field_name,
        hook.as_deref().unwrap_or("none")
    );
    Ok(pair)
}

/// Setter without a hook: gate on `try_apply`, then store.
fn setter_body_plain(field_ref: &FieldRef, handler_ref: &FieldRef, handler_tid: TypeId) -> CodeUnit {
    CodeUnit::new(vec![
        /* 0 */ Op::LdSelf,
        /* 1 */ Op::LdField(handler_ref.clone()),
        /* 2 */ Op::LdArg(0),
        /* 3 */ Op::LdArg(1),
        /* 4 */ Op::Call(MethodRef::new(handler_tid, HANDLER_TRY_APPLY)),
        /* 5 */ Op::BrIf(7),
        /* 6 */ Op::Ret, // rejected by permission policy: no mutation
        /* 7 */ Op::LdSelf,
        /* 8 */ Op::LdArg(0),
        /* 9 */ Op::StField(field_ref.clone()),
        /* 10 */ Op::Ret,
    ])
}

/// Setter with a hook. Previous-value capture follows the three-way rule:
/// authoritative call, or a non-authoritative instance, reads the current
/// backing value; a locally-authoritative instance receiving a
/// non-authoritative write reads the handler's last-known-remote value.
fn setter_body_with_hook(
    desc: &ReplicatedFieldDescriptor,
    field_ref: &FieldRef,
    handler_ref: &FieldRef,
    handler_tid: TypeId,
    hook_name: &str,
) -> CodeUnit {
    let mut body = CodeUnit::new(vec![
        /* 0 */ Op::LdArg(1),
        /* 1 */ Op::BrIf(11), // authoritative: previous = current backing value
        /* 2 */ Op::LdSelf,
        /* 3 */ Op::LdField(handler_ref.clone()),
        /* 4 */ Op::Call(MethodRef::new(handler_tid, HANDLER_LOCAL_AUTHORITY)),
        /* 5 */ Op::BrIfNot(11), // not locally authoritative: same
        /* 6 */ Op::LdSelf,
        /* 7 */ Op::LdField(handler_ref.clone()),
        /* 8 */ Op::Call(MethodRef::new(handler_tid, HANDLER_REMOTE_VALUE)),
        /* 9 */ Op::StLoc(0),
        /* 10 */ Op::Br(14),
        /* 11 */ Op::LdSelf,
        /* 12 */ Op::LdField(field_ref.clone()),
        /* 13 */ Op::StLoc(0),
        /* 14 */ Op::LdSelf,
        /* 15 */ Op::LdField(handler_ref.clone()),
        /* 16 */ Op::LdArg(0),
        /* 17 */ Op::LdArg(1),
        /* 18 */ Op::Call(MethodRef::new(handler_tid, HANDLER_TRY_APPLY)),
        /* 19 */ Op::BrIf(21),
        /* 20 */ Op::Ret, // rejected: no mutation, no hook
        /* 21 */ Op::LdSelf,
        /* 22 */ Op::LdArg(0),
        /* 23 */ Op::StField(field_ref.clone()),
        /* 24 */ Op::LdSelf,
        /* 25 */ Op::LdLoc(0),
        /* 26 */ Op::LdArg(0),
        /* 27 */ Op::LdArg(1),
        /* 28 */ Op::CallVirt(MethodRef::new(desc.owner, hook_name)),
        /* 29 */ Op::Ret,
    ]);
    body.locals.push(desc.data_sig.clone()); // previous value
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WeaveContext;
    use crate::diag::CollectingSink;
    use crate::handlers::synthesize_variable_handler;
    use crate::model::{SyncKind, WireConfig};
    use syncweave_ir::{validate_method, FieldDef, TypeDef};

    fn woven_actor(hook: Option<&str>) -> (ModuleImage, TypeId, AccessorPair, CollectingSink) {
        let mut image = ModuleImage::default();
        let mut ty = TypeDef::new("Actor");
        ty.add_field(FieldDef::new("hp", TypeSig::U64)).unwrap();
        let mut on_hp = MethodDef::new("on_hp", MethodKind::Plain);
        on_hp.params = vec![TypeSig::U64, TypeSig::U64, TypeSig::Bool];
        ty.add_method(on_hp).unwrap();
        let mut bad_hook = MethodDef::new("bad_hook", MethodKind::Plain);
        bad_hook.params = vec![TypeSig::U64];
        ty.add_method(bad_hook).unwrap();
        let tid = image.add_type(ty);

        let desc = ReplicatedFieldDescriptor {
            owner: tid,
            field_index: 0,
            field_name: "hp".to_string(),
            data_sig: TypeSig::U64,
            kind: SyncKind::Variable,
            wire: WireConfig::default(),
            ordinal: Some(0),
            hook: hook.map(str::to_string),
        };
        let mut ctx = WeaveContext::new();
        let mut sink = CollectingSink::new();
        let (handler_tid, backing) =
            synthesize_variable_handler(&mut image, &mut ctx, &desc, &mut sink).unwrap();
        let pair =
            synthesize_accessors(&mut image, &desc, handler_tid, &backing, &mut sink).unwrap();
        (image, tid, pair, sink)
    }

    #[test]
    fn accessors_validate_structurally() {
        for hook in [None, Some("on_hp")] {
            let (image, tid, pair, sink) = woven_actor(hook);
            assert!(sink.is_clean());
            let actor = image.get_type(tid).unwrap();
            for name in [&pair.getter, &pair.setter] {
                let m = &actor.methods[actor.find_method(name).unwrap()];
                assert_eq!(m.kind, MethodKind::Synthesized);
                validate_method(&image, tid, m).unwrap();
            }
        }
    }

    #[test]
    fn malformed_hook_drops_to_no_hook_with_diagnostic() {
        let (image, tid, pair, sink) = woven_actor(Some("bad_hook"));
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].contains("bad_hook"));
        // setter still synthesized, and without any hook invocation
        let actor = image.get_type(tid).unwrap();
        let setter = &actor.methods[actor.find_method(&pair.setter).unwrap()];
        let body = setter.body.as_ref().unwrap();
        assert!(!body
            .code
            .iter()
            .any(|op| matches!(op, Op::CallVirt(m) if m.name == "bad_hook")));
        validate_method(&image, tid, setter).unwrap();
    }

    #[test]
    fn missing_hook_method_reported() {
        let (_image, _tid, _pair, sink) = woven_actor(Some("nonexistent"));
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].contains("not found"));
    }
}
