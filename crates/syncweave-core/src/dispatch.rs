//! Inbound dispatch: the per-type routine that decodes an incoming update by
//! field index and applies it through the setter, chaining to the base type's
//! routine exactly once per hierarchy edge.

use anyhow::{anyhow, Result};
use tracing::debug;
use syncweave_ir::{CodeUnit, MethodDef, MethodKind, MethodRef, ModuleImage, Op, TypeId, TypeSig};

use crate::codec::CodecProvider;
use crate::context::WeaveContext;
use crate::model::{setter_name, ReplicatedFieldDescriptor, SyncKind, DISPATCH_METHOD};

/// Find `tid`'s own dispatch routine, creating the default
/// `return false` body when none exists yet.
fn own_dispatch(image: &mut ModuleImage, tid: TypeId) -> Result<usize> {
    let ty = image.type_at_mut(tid)?;
    if let Some(idx) = ty.find_method(DISPATCH_METHOD) {
        return Ok(idx);
    }
    let mut m = MethodDef::new(DISPATCH_METHOD, MethodKind::Synthesized);
    m.params = vec![TypeSig::Reader, TypeSig::U64];
    m.ret = Some(TypeSig::Bool);
    m.is_virtual = true;
    m.body = Some(CodeUnit::new(vec![Op::LdcBool(false), Op::Ret]));
    ty.add_method(m)
}

/// Nearest ancestor of `tid` (excluding `tid`) that declares a dispatch
/// routine of its own.
fn base_dispatch_owner(image: &ModuleImage, tid: TypeId) -> Result<Option<TypeId>> {
    for ancestor in image.base_chain(tid)?.into_iter().skip(1) {
        if image.type_at(ancestor)?.find_method(DISPATCH_METHOD).is_some() {
            return Ok(Some(ancestor));
        }
    }
    Ok(None)
}

/// Build or extend the dispatch routine of `tid` for its Variable-kind
/// fields. Each field's guarded decode block is prepended (most recently
/// added first, so earlier checks remain reachable); the base-chain call is
/// prepended last, landing ahead of all of this type's own checks, and is
/// inserted at most once per type within a build.
pub fn build_dispatch(
    image: &mut ModuleImage,
    ctx: &mut WeaveContext,
    tid: TypeId,
    descriptors: &[ReplicatedFieldDescriptor],
    codec: &dyn CodecProvider,
) -> Result<()> {
    let variables: Vec<&ReplicatedFieldDescriptor> = descriptors
        .iter()
        .filter(|d| d.kind == SyncKind::Variable)
        .collect();
    if variables.is_empty() {
        return Ok(());
    }

    let method_idx = own_dispatch(image, tid)?;
    for desc in &variables {
        let ordinal = desc
            .ordinal
            .ok_or_else(|| anyhow!("ordinal not assigned for `{}`", desc.field_name))?;
        let mut block = vec![Op::LdArg(1), Op::LdcU64(u64::from(ordinal))];
        // placeholder target fixed up once the block length is known
        let guard_at = block.len();
        block.push(Op::BrIfNe(0));
        block.push(Op::LdSelf);
        block.push(Op::LdArg(0));
        block.extend(codec.emit_read(&desc.data_sig));
        block.push(Op::LdcBool(false));
        block.push(Op::Call(MethodRef::new(tid, setter_name(&desc.field_name))));
        block.push(Op::LdcBool(true));
        block.push(Op::Ret);
        let block_len = block.len();
        block[guard_at] = Op::BrIfNe(block_len); // old body head after prepend

        let body = dispatch_body(image, tid, method_idx)?;
        body.splice(0, 0, block);
        debug!(
            target: "syncweave",
            "dispatch block for `{}::{}` (ordinal {ordinal})",
            image.type_name(tid),
            desc.field_name
        );
    }

    // Chain to the immediate base's routine, once per (type, base) edge.
    if !ctx.base_chained.contains(&tid) {
        if let Some(base) = base_dispatch_owner(image, tid)? {
            let chain = vec![
                /* 0 */ Op::LdSelf,
                /* 1 */ Op::LdArg(0),
                /* 2 */ Op::LdArg(1),
                /* 3 */ Op::Call(MethodRef::new(base, DISPATCH_METHOD)),
                /* 4 */ Op::BrIfNot(7),
                /* 5 */ Op::LdcBool(true),
                /* 6 */ Op::Ret,
            ];
            let body = dispatch_body(image, tid, method_idx)?;
            body.splice(0, 0, chain);
            ctx.base_chained.insert(tid);
            debug!(
                target: "syncweave",
                "chained `{}` dispatch to base `{}`",
                image.type_name(tid),
                image.type_name(base)
            );
        }
    }
    Ok(())
}

fn dispatch_body<'a>(
    image: &'a mut ModuleImage,
    tid: TypeId,
    method_idx: usize,
) -> Result<&'a mut CodeUnit> {
    image.type_at_mut(tid)?.methods[method_idx]
        .body
        .as_mut()
        .ok_or_else(|| anyhow!("dispatch routine of `{tid}` has no body"))
}
