//! Handler synthesis: per-field companion constructs and the initialization
//! call sequences that wire them into the owning type's startup routines.

use anyhow::{anyhow, bail, Result};
use tracing::debug;
use syncweave_ir::{
    CodeUnit, FieldDef, FieldRef, MethodDef, MethodKind, MethodRef, ModuleImage, NativeKind, Op,
    TypeDef, TypeId, TypeSig,
};

use crate::context::WeaveContext;
use crate::diag::DiagnosticSink;
use crate::model::{
    handler_field_name, ReplicatedFieldDescriptor, HANDLER_INIT, HANDLER_LOCAL_AUTHORITY,
    HANDLER_REGISTER, HANDLER_REMOTE_VALUE, HANDLER_TRY_APPLY, OBJECT_INITIALIZE, OBJECT_SET_INDEX,
};

/// Obtain the handler-construct template for `data_sig`, creating and
/// memoizing it on first use. One template serves every field of that data
/// type across all processed types in the build.
pub fn ensure_handler_template(
    image: &mut ModuleImage,
    ctx: &mut WeaveContext,
    data_sig: &TypeSig,
) -> TypeId {
    if let Some(&tid) = ctx.handler_templates.get(data_sig) {
        return tid;
    }

    let mut ty = TypeDef::new(format!("ReplicatedVar_{}", data_sig.mangle(image)));
    ty.fields = vec![
        FieldDef::new("index", TypeSig::U64),
        FieldDef::new("write_authority", TypeSig::U64),
        FieldDef::new("read_visibility", TypeSig::U64),
        FieldDef::new("send_interval_ms", TypeSig::U64),
        FieldDef::new("channel", TypeSig::U64),
        FieldDef::new("remote", data_sig.clone()),
        FieldDef::new("local_authority", TypeSig::Bool),
    ];

    let native = |name: &str, params: Vec<TypeSig>, ret: Option<TypeSig>, kind: NativeKind| {
        let mut m = MethodDef::new(name, MethodKind::Plain);
        m.params = params;
        m.ret = ret;
        m.native = Some(kind);
        m.body = None;
        m
    };
    ty.methods = vec![
        native(
            HANDLER_INIT,
            vec![TypeSig::U64, TypeSig::U64, TypeSig::U64, TypeSig::U64, data_sig.clone()],
            None,
            NativeKind::HandlerInit,
        ),
        native(
            HANDLER_REGISTER,
            vec![TypeSig::Object, TypeSig::U64],
            None,
            NativeKind::HandlerRegister,
        ),
        native(
            HANDLER_TRY_APPLY,
            vec![data_sig.clone(), TypeSig::Bool],
            Some(TypeSig::Bool),
            NativeKind::HandlerTryApply,
        ),
        native(
            HANDLER_REMOTE_VALUE,
            vec![],
            Some(data_sig.clone()),
            NativeKind::HandlerRemoteValue,
        ),
        native(
            HANDLER_LOCAL_AUTHORITY,
            vec![],
            Some(TypeSig::Bool),
            NativeKind::HandlerLocalAuthority,
        ),
    ];

    let tid = image.add_type(ty);
    ctx.handler_templates.insert(data_sig.clone(), tid);
    debug!(target: "syncweave", "created handler template `{}`", image.type_name(tid));
    tid
}

/// Find the owning type's startup routine of the given kind, creating an
/// empty one when the compiler emitted none.
fn init_routine(image: &mut ModuleImage, tid: TypeId, kind: MethodKind, name: &str) -> Result<usize> {
    let ty = image.type_at_mut(tid)?;
    if let Some(idx) = ty.find_method_of_kind(kind) {
        return Ok(idx);
    }
    let mut m = MethodDef::new(name, kind);
    m.body = Some(CodeUnit::new(vec![Op::Ret]));
    ty.add_method(m)
}

fn append_to_routine(
    image: &mut ModuleImage,
    tid: TypeId,
    method_idx: usize,
    block: Vec<Op>,
) -> Result<()> {
    let method = &mut image.type_at_mut(tid)?.methods[method_idx];
    let body = method
        .body
        .as_mut()
        .ok_or_else(|| anyhow!("startup routine `{}` has no body", method.name))?;
    body.insert_before_tail(block);
    Ok(())
}

/// Setup blocks land ahead of the routine's final instruction, so a routine
/// with extra return paths would skip them on those paths. Surface that
/// instead of wiring silently.
fn warn_on_early_return(
    image: &ModuleImage,
    tid: TypeId,
    method_idx: usize,
    sink: &mut dyn DiagnosticSink,
) -> Result<()> {
    let method = &image.type_at(tid)?.methods[method_idx];
    let Some(body) = &method.body else {
        return Ok(());
    };
    let returns = body.code.iter().filter(|op| matches!(op, Op::Ret)).count();
    if returns > 1 {
        sink.warning(format!(
            "startup routine `{}::{}` has multiple return paths; replication \
             setup runs only on the final one",
            image.type_name(tid),
            method.name
        ));
    }
    Ok(())
}

/// Synthesize the handler for a Variable-kind field: a new backing field
/// holding the handler instance, a construction call in the early init
/// routine, and an index registration call in the late init routine.
///
/// Returns the handler type and the backing field name.
pub fn synthesize_variable_handler(
    image: &mut ModuleImage,
    ctx: &mut WeaveContext,
    desc: &ReplicatedFieldDescriptor,
    sink: &mut dyn DiagnosticSink,
) -> Result<(TypeId, String)> {
    let ordinal = desc
        .ordinal
        .ok_or_else(|| anyhow!("ordinal not assigned for `{}`", desc.field_name))?;
    let handler_tid = ensure_handler_template(image, ctx, &desc.data_sig);
    let backing = handler_field_name(&desc.field_name);
    image
        .type_at_mut(desc.owner)?
        .add_field(FieldDef::new(backing.clone(), TypeSig::Named(handler_tid, vec![])))?;

    let early = init_routine(image, desc.owner, MethodKind::EarlyInit, "pre_replication_init")?;
    let late = init_routine(image, desc.owner, MethodKind::LateInit, "post_replication_init")?;
    warn_on_early_return(image, desc.owner, early, sink)?;
    warn_on_early_return(image, desc.owner, late, sink)?;

    let handler_ref = FieldRef::new(desc.owner, backing.clone());
    let construct = vec![
        Op::LdSelf,
        Op::NewObj(handler_tid),
        Op::StField(handler_ref.clone()),
        Op::LdSelf,
        Op::LdField(handler_ref.clone()),
        Op::LdcU64(desc.wire.write_authority.wire_value()),
        Op::LdcU64(desc.wire.read_visibility.wire_value()),
        Op::LdcU64(desc.wire.send_interval_ms),
        Op::LdcU64(desc.wire.channel.wire_value()),
        Op::LdSelf,
        Op::LdField(FieldRef::new(desc.owner, desc.field_name.clone())),
        Op::Call(MethodRef::new(handler_tid, HANDLER_INIT)),
    ];
    append_to_routine(image, desc.owner, early, construct)?;

    let register = vec![
        Op::LdSelf,
        Op::LdField(handler_ref),
        Op::LdSelf,
        Op::LdcU64(u64::from(ordinal)),
        Op::Call(MethodRef::new(handler_tid, HANDLER_REGISTER)),
    ];
    append_to_routine(image, desc.owner, late, register)?;

    debug!(
        target: "syncweave",
        "wired variable handler for `{}::{}` (ordinal {ordinal})",
        image.type_name(desc.owner),
        desc.field_name
    );
    Ok((handler_tid, backing))
}

/// Wire an object-kind field: no new members, just the policy initialization
/// and index registration calls against the field's own existing instance.
pub fn synthesize_object_init(
    image: &mut ModuleImage,
    desc: &ReplicatedFieldDescriptor,
    sink: &mut dyn DiagnosticSink,
) -> Result<()> {
    let ordinal = desc
        .ordinal
        .ok_or_else(|| anyhow!("ordinal not assigned for `{}`", desc.field_name))?;
    let field_tid = match &desc.data_sig {
        TypeSig::Named(tid, _) => *tid,
        other => bail!(
            "object-kind field `{}` has non-class type `{}`",
            desc.field_name,
            other.describe(image)
        ),
    };
    let (init_owner, _) = image
        .find_method_in_chain(field_tid, OBJECT_INITIALIZE)?
        .ok_or_else(|| {
            anyhow!(
                "no reachable base of `{}` offers `{OBJECT_INITIALIZE}`",
                image.type_name(field_tid)
            )
        })?;
    let (index_owner, _) = image
        .find_method_in_chain(field_tid, OBJECT_SET_INDEX)?
        .ok_or_else(|| {
            anyhow!(
                "no reachable base of `{}` offers `{OBJECT_SET_INDEX}`",
                image.type_name(field_tid)
            )
        })?;

    let early = init_routine(image, desc.owner, MethodKind::EarlyInit, "pre_replication_init")?;
    let late = init_routine(image, desc.owner, MethodKind::LateInit, "post_replication_init")?;
    warn_on_early_return(image, desc.owner, early, sink)?;
    warn_on_early_return(image, desc.owner, late, sink)?;
    let field_ref = FieldRef::new(desc.owner, desc.field_name.clone());

    let initialize = vec![
        Op::LdSelf,
        Op::LdField(field_ref.clone()),
        Op::LdcU64(desc.wire.write_authority.wire_value()),
        Op::LdcU64(desc.wire.read_visibility.wire_value()),
        Op::LdcU64(desc.wire.send_interval_ms),
        Op::LdcU64(desc.wire.channel.wire_value()),
        Op::LdcBool(true),
        Op::CallVirt(MethodRef::new(init_owner, OBJECT_INITIALIZE)),
    ];
    append_to_routine(image, desc.owner, early, initialize)?;

    let set_index = vec![
        Op::LdSelf,
        Op::LdField(field_ref),
        Op::LdSelf,
        Op::LdcU64(u64::from(ordinal)),
        Op::CallVirt(MethodRef::new(index_owner, OBJECT_SET_INDEX)),
    ];
    append_to_routine(image, desc.owner, late, set_index)?;
    Ok(())
}
