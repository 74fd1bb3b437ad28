//! Call-site rewriting: direct reads/writes of replicated fields in every
//! other method body are redirected through the synthesized accessors,
//! preserving branch-target correctness via the splice primitive.

use std::collections::HashMap;

use anyhow::Result;
use tracing::trace;
use syncweave_ir::{FieldRef, MethodKind, MethodRef, ModuleImage, Op, TypeId, TypeSig};

use crate::context::WeaveContext;
use crate::diag::DiagnosticSink;

#[derive(Debug, Clone)]
struct RewritePlan {
    getter: String,
    setter: String,
    /// Declaring type is generic: dispatch through the generic binding.
    generic: bool,
    data_sig: TypeSig,
}

fn accessor_call(plan: &RewritePlan, name: &str, fref: &FieldRef) -> Op {
    let mut mref = MethodRef::new(fref.owner, name);
    if plan.generic {
        mref.type_inst = fref.type_inst.clone();
        Op::CallVirt(mref)
    } else {
        Op::Call(mref)
    }
}

/// Rewrite every eligible method body of `tid`.
///
/// Excluded: constructors, static initializers, the early-initialization
/// routine (it reads the original field for the handler's initial value), and
/// synthesized members. Property accessor bodies are included. Rewriting only
/// targets fields present in the successfully processed set.
pub fn rewrite_call_sites(
    image: &mut ModuleImage,
    tid: TypeId,
    ctx: &WeaveContext,
    sink: &mut dyn DiagnosticSink,
) -> Result<()> {
    // Resolve plans up front so the body loop holds the only image borrow.
    let mut plans: HashMap<(TypeId, String), RewritePlan> = HashMap::new();
    for ((owner, name), pair) in &ctx.processed_fields {
        if let Some(pair) = pair {
            let owner_ty = image.type_at(*owner)?;
            let sig = owner_ty
                .find_field(name)
                .map(|idx| owner_ty.fields[idx].sig.clone());
            if let Some(data_sig) = sig {
                plans.insert(
                    (*owner, name.clone()),
                    RewritePlan {
                        getter: pair.getter.clone(),
                        setter: pair.setter.clone(),
                        generic: owner_ty.type_params > 0,
                        data_sig,
                    },
                );
            }
        }
    }
    if plans.is_empty() {
        return Ok(());
    }

    let type_name = image.type_name(tid);
    let method_count = image.type_at(tid)?.methods.len();
    for m_idx in 0..method_count {
        let method = &image.type_at(tid)?.methods[m_idx];
        if matches!(
            method.kind,
            MethodKind::Ctor | MethodKind::StaticInit | MethodKind::EarlyInit | MethodKind::Synthesized
        ) || method.body.is_none()
        {
            continue;
        }
        let method_name = method.name.clone();
        let Some(body) = image.type_at_mut(tid)?.methods[m_idx].body.as_mut() else {
            continue;
        };

        let mut i = 0;
        while i < body.code.len() {
            let op = body.code[i].clone();
            match op {
                Op::LdField(fref) => {
                    let Some(plan) = plans.get(&(fref.owner, fref.name.clone())) else {
                        i += 1;
                        continue;
                    };
                    body.splice(i, 1, vec![accessor_call(plan, &plan.getter, &fref)]);
                    trace!(
                        target: "syncweave",
                        "rewrote read of `{}` in `{type_name}::{method_name}`",
                        fref.name
                    );
                    i += 1;
                }
                Op::StField(fref) => {
                    let Some(plan) = plans.get(&(fref.owner, fref.name.clone())) else {
                        i += 1;
                        continue;
                    };
                    // The literal lands at the write's old index, so branches
                    // that targeted the write now target the literal.
                    body.splice(
                        i,
                        1,
                        vec![Op::LdcBool(true), accessor_call(plan, &plan.setter, &fref)],
                    );
                    trace!(
                        target: "syncweave",
                        "rewrote write of `{}` in `{type_name}::{method_name}`",
                        fref.name
                    );
                    i += 2;
                }
                Op::LdFieldAddr(fref) => {
                    let Some(plan) = plans.get(&(fref.owner, fref.name.clone())) else {
                        i += 1;
                        continue;
                    };
                    let followed_by_init =
                        matches!(body.code.get(i + 1), Some(Op::InitAddr(_)));
                    if !followed_by_init {
                        // Ref/out use of a replicated field bypasses the
                        // accessor path entirely; refuse loudly rather than
                        // silently leaving it unsynchronized.
                        sink.warning(format!(
                            "`{type_name}::{method_name}`: address of replicated field \
                             `{}` escapes; by-reference use is not supported and the \
                             instruction was left unrewritten",
                            fref.name
                        ));
                        i += 1;
                        continue;
                    }
                    // assign-default idiom: route the zero value through the
                    // setter via a temporary local.
                    let tmp = body.add_local(plan.data_sig.clone());
                    body.splice(
                        i,
                        2,
                        vec![
                            Op::InitLoc(tmp),
                            Op::LdLoc(tmp),
                            Op::LdcBool(true),
                            accessor_call(plan, &plan.setter, &fref),
                        ],
                    );
                    i += 4;
                }
                _ => i += 1,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectingSink;
    use crate::model::AccessorPair;
    use syncweave_ir::{CodeUnit, FieldDef, MethodDef, TypeDef};

    /// Owner with replicated `hp`, its accessor pair pre-registered, plus a
    /// caller method with the given body.
    fn fixture(body_code: Vec<Op>) -> (ModuleImage, TypeId, WeaveContext) {
        let mut image = ModuleImage::default();
        let mut ty = TypeDef::new("Actor");
        ty.add_field(FieldDef::new("hp", TypeSig::U64)).unwrap();
        let mut getter = MethodDef::new("get_hp", MethodKind::Synthesized);
        getter.ret = Some(TypeSig::U64);
        getter.body = Some(CodeUnit::new(vec![Op::LdSelf, Op::LdcU64(0), Op::Pop, Op::Ret]));
        ty.add_method(getter).unwrap();
        let mut setter = MethodDef::new("set_hp", MethodKind::Synthesized);
        setter.params = vec![TypeSig::U64, TypeSig::Bool];
        setter.body = Some(CodeUnit::new(vec![Op::Ret]));
        ty.add_method(setter).unwrap();
        let mut caller = MethodDef::new("tick", MethodKind::Plain);
        caller.body = Some(CodeUnit::new(body_code));
        ty.add_method(caller).unwrap();
        let tid = image.add_type(ty);

        let mut ctx = WeaveContext::new();
        ctx.processed_fields.insert(
            (tid, "hp".to_string()),
            Some(AccessorPair {
                getter: "get_hp".to_string(),
                setter: "set_hp".to_string(),
            }),
        );
        (image, tid, ctx)
    }

    fn caller_body(image: &ModuleImage, tid: TypeId) -> &CodeUnit {
        let ty = image.get_type(tid).unwrap();
        ty.methods[ty.find_method("tick").unwrap()].body.as_ref().unwrap()
    }

    #[test]
    fn field_read_becomes_getter_call() {
        let (mut image, tid, ctx) = fixture(vec![
            Op::LdSelf,
            Op::LdField(FieldRef::new(0, "hp")),
            Op::Pop,
            Op::Ret,
        ]);
        let mut sink = CollectingSink::new();
        rewrite_call_sites(&mut image, tid, &ctx, &mut sink).unwrap();
        let body = caller_body(&image, tid);
        assert!(matches!(&body.code[1], Op::Call(m) if m.name == "get_hp"));
    }

    #[test]
    fn field_write_gains_authoritative_literal() {
        let (mut image, tid, ctx) = fixture(vec![
            Op::LdSelf,
            Op::LdcU64(5),
            Op::StField(FieldRef::new(0, "hp")),
            Op::Ret,
        ]);
        let mut sink = CollectingSink::new();
        rewrite_call_sites(&mut image, tid, &ctx, &mut sink).unwrap();
        let body = caller_body(&image, tid);
        assert_eq!(body.code[2], Op::LdcBool(true));
        assert!(matches!(&body.code[3], Op::Call(m) if m.name == "set_hp"));
        assert_eq!(body.code[4], Op::Ret);
    }

    #[test]
    fn branch_to_write_lands_on_literal() {
        // 0: ldc true / 1: brif 4 / 2: ldself / 3: pop... build:
        // a conditional jump straight to the store instruction.
        let (mut image, tid, ctx) = fixture(vec![
            /* 0 */ Op::LdSelf,
            /* 1 */ Op::LdcU64(1),
            /* 2 */ Op::LdcBool(true),
            /* 3 */ Op::BrIf(4),
            /* 4 */ Op::StField(FieldRef::new(0, "hp")),
            /* 5 */ Op::Ret,
        ]);
        let mut sink = CollectingSink::new();
        rewrite_call_sites(&mut image, tid, &ctx, &mut sink).unwrap();
        let body = caller_body(&image, tid);
        // branch now targets the inserted literal, not the call
        assert_eq!(body.code[3], Op::BrIf(4));
        assert_eq!(body.code[4], Op::LdcBool(true));
        assert!(matches!(&body.code[5], Op::Call(m) if m.name == "set_hp"));
    }

    #[test]
    fn assign_default_idiom_routed_through_setter() {
        let (mut image, tid, ctx) = fixture(vec![
            Op::LdSelf,
            Op::LdFieldAddr(FieldRef::new(0, "hp")),
            Op::InitAddr(TypeSig::U64),
            Op::Ret,
        ]);
        let mut sink = CollectingSink::new();
        rewrite_call_sites(&mut image, tid, &ctx, &mut sink).unwrap();
        let body = caller_body(&image, tid);
        assert_eq!(
            body.code[1..5],
            [
                Op::InitLoc(0),
                Op::LdLoc(0),
                Op::LdcBool(true),
                Op::Call(MethodRef::new(0, "set_hp")),
            ]
        );
        assert_eq!(body.locals, vec![TypeSig::U64]);
        assert!(sink.warnings.is_empty());
    }

    #[test]
    fn escaping_field_address_warns_and_stays() {
        let (mut image, tid, ctx) = fixture(vec![
            Op::LdSelf,
            Op::LdFieldAddr(FieldRef::new(0, "hp")),
            Op::Pop,
            Op::Ret,
        ]);
        let mut sink = CollectingSink::new();
        rewrite_call_sites(&mut image, tid, &ctx, &mut sink).unwrap();
        let body = caller_body(&image, tid);
        assert!(matches!(body.code[1], Op::LdFieldAddr(_)));
        assert_eq!(sink.warnings.len(), 1);
    }

    #[test]
    fn constructors_and_synthesized_members_untouched() {
        let (mut image, tid, ctx) = fixture(vec![Op::Ret]);
        let mut ctor = MethodDef::new("ctor", MethodKind::Ctor);
        ctor.body = Some(CodeUnit::new(vec![
            Op::LdSelf,
            Op::LdcU64(9),
            Op::StField(FieldRef::new(0, "hp")),
            Op::Ret,
        ]));
        image.type_at_mut(tid).unwrap().add_method(ctor).unwrap();
        let mut sink = CollectingSink::new();
        rewrite_call_sites(&mut image, tid, &ctx, &mut sink).unwrap();
        let ty = image.get_type(tid).unwrap();
        let ctor = &ty.methods[ty.find_method("ctor").unwrap()];
        assert!(matches!(ctor.body.as_ref().unwrap().code[2], Op::StField(_)));
    }
}
