//! Structural validation of method bodies: stack balance at every reachable
//! instruction, live branch targets, and resolvable member references.
//!
//! This is the output contract of the weaving pass made checkable: a woven
//! image must validate cleanly, and tests hold the weaver to that.

use anyhow::{bail, Context, Result};

use crate::code::Op;
use crate::module::{MethodDef, ModuleImage, TypeId};

/// Validate every non-native method body in the image.
pub fn validate_module(image: &ModuleImage) -> Result<()> {
    for (tid, ty) in image.types.iter().enumerate() {
        for method in &ty.methods {
            if method.body.is_some() {
                validate_method(image, tid, method).with_context(|| {
                    format!("method `{}::{}` failed validation", ty.name, method.name)
                })?;
            }
        }
    }
    Ok(())
}

/// Validate one method body via depth-first traversal from the entry point.
///
/// Every reachable instruction must observe a single, consistent stack depth;
/// branches must stay in range; member references must resolve through the
/// declaring type's base chain.
pub fn validate_method(image: &ModuleImage, tid: TypeId, method: &MethodDef) -> Result<()> {
    let body = match &method.body {
        Some(body) => body,
        None => return Ok(()),
    };
    if body.code.is_empty() {
        bail!("empty body");
    }

    let code = &body.code;
    let mut depth_at: Vec<Option<usize>> = vec![None; code.len()];
    let mut work: Vec<(usize, usize)> = vec![(0, 0)];

    while let Some((idx, depth)) = work.pop() {
        if idx >= code.len() {
            bail!("control falls off the end of the body (at index {idx})");
        }
        if let Some(seen) = depth_at[idx] {
            if seen != depth {
                bail!(
                    "inconsistent stack depth at instruction {idx}: {seen} vs {depth}"
                );
            }
            continue;
        }
        depth_at[idx] = Some(depth);

        let op = &code[idx];
        let (pops, pushes) = stack_effect(image, method, op)
            .with_context(|| format!("at instruction {idx} ({op:?})"))?;
        if depth < pops {
            bail!(
                "stack underflow at instruction {idx} ({op:?}): depth {depth}, pops {pops}"
            );
        }
        let next_depth = depth - pops + pushes;

        check_operands(image, tid, method, op)
            .with_context(|| format!("at instruction {idx} ({op:?})"))?;

        if let Some(target) = op.branch_target() {
            if target >= code.len() {
                bail!("branch at {idx} targets dead index {target}");
            }
            work.push((target, next_depth));
        }
        match op {
            Op::Ret => {
                let expected = usize::from(method.ret.is_some());
                if depth != expected {
                    bail!(
                        "return at {idx} with stack depth {depth}, expected {expected}"
                    );
                }
            }
            Op::Br(_) => {}
            _ => work.push((idx + 1, next_depth)),
        }
    }
    Ok(())
}

fn stack_effect(image: &ModuleImage, method: &MethodDef, op: &Op) -> Result<(usize, usize)> {
    Ok(match op {
        Op::Nop | Op::InitLoc(_) | Op::Br(_) => (0, 0),
        Op::LdSelf
        | Op::LdArg(_)
        | Op::LdLoc(_)
        | Op::LdcBool(_)
        | Op::LdcU64(_)
        | Op::LdcI64(_)
        | Op::LdcF64(_)
        | Op::LdcStr(_) => (0, 1),
        Op::StLoc(_) | Op::Pop | Op::BrIf(_) | Op::BrIfNot(_) | Op::InitAddr(_) => (1, 0),
        Op::BrIfNe(_) => (2, 0),
        Op::LdField(_) | Op::LdFieldAddr(_) | Op::CodecRead(_) => (1, 1),
        Op::NewObj(_) => (0, 1),
        Op::StField(_) => (2, 0),
        Op::Ret => (usize::from(method.ret.is_some()), 0),
        Op::Call(mref) | Op::CallVirt(mref) => {
            let (owner, midx) = image
                .find_method_in_chain(mref.owner, &mref.name)?
                .with_context(|| {
                    format!(
                        "call target `{}::{}` does not resolve",
                        image.type_name(mref.owner),
                        mref.name
                    )
                })?;
            let callee = &image.type_at(owner)?.methods[midx];
            let pops = callee.params.len() + usize::from(!callee.is_static);
            (pops, usize::from(callee.ret.is_some()))
        }
    })
}

fn check_operands(image: &ModuleImage, tid: TypeId, method: &MethodDef, op: &Op) -> Result<()> {
    let body = method.body.as_ref().expect("checked by caller");
    match op {
        Op::LdSelf if method.is_static => bail!("LdSelf in static method"),
        Op::LdArg(n) => {
            if usize::from(*n) >= method.params.len() {
                bail!(
                    "argument index {n} out of range ({} declared)",
                    method.params.len()
                );
            }
        }
        Op::LdLoc(n) | Op::StLoc(n) | Op::InitLoc(n) => {
            if usize::from(*n) >= body.locals.len() {
                bail!("local index {n} out of range ({} declared)", body.locals.len());
            }
        }
        Op::NewObj(target) => {
            image.type_at(*target)?;
        }
        Op::LdField(fref) | Op::StField(fref) | Op::LdFieldAddr(fref) => {
            if image.find_field_in_chain(fref.owner, &fref.name)?.is_none() {
                bail!(
                    "field `{}::{}` does not resolve from `{}`",
                    image.type_name(fref.owner),
                    fref.name,
                    image.type_name(tid)
                );
            }
        }
        _ => {}
    }
    Ok(())
}
