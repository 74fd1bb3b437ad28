//! Instruction streams and the splice primitive that keeps branch targets
//! valid across structural edits.

use serde::{Deserialize, Serialize};

use crate::module::{FieldRef, MethodRef, TypeId};
use crate::sig::TypeSig;

/// One instruction of the stack machine.
///
/// Branch operands are indices into the owning [`CodeUnit::code`] vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Nop,
    /// Push the receiver of the current instance method.
    LdSelf,
    /// Push parameter `n` (zero-based, receiver excluded).
    LdArg(u16),
    LdLoc(u16),
    StLoc(u16),
    /// Zero-initialize local `n` in place. No stack effect.
    InitLoc(u16),
    LdcBool(bool),
    LdcU64(u64),
    LdcI64(i64),
    LdcF64(f64),
    LdcStr(String),
    /// Pop an instance reference, push the field value.
    LdField(FieldRef),
    /// Pop a value and an instance reference, store the value.
    StField(FieldRef),
    /// Pop an instance reference, push the field address.
    LdFieldAddr(FieldRef),
    /// Pop an address, zero-write the value behind it.
    InitAddr(TypeSig),
    /// Push a fresh, zero-initialized instance of the given type.
    NewObj(TypeId),
    Call(MethodRef),
    CallVirt(MethodRef),
    Br(usize),
    /// Pop a bool, branch when true.
    BrIf(usize),
    /// Pop a bool, branch when false.
    BrIfNot(usize),
    /// Pop two values, branch when they differ.
    BrIfNe(usize),
    /// Pop a reader handle, push a value of the given type decoded from it.
    /// The serialization collaborator owns what this means on the wire.
    CodecRead(TypeSig),
    Pop,
    Ret,
}

impl Op {
    pub fn branch_target(&self) -> Option<usize> {
        match self {
            Op::Br(t) | Op::BrIf(t) | Op::BrIfNot(t) | Op::BrIfNe(t) => Some(*t),
            _ => None,
        }
    }

    pub fn branch_target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Op::Br(t) | Op::BrIf(t) | Op::BrIfNot(t) | Op::BrIfNe(t) => Some(t),
            _ => None,
        }
    }

    /// True when control never falls through to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Op::Br(_) | Op::Ret)
    }
}

/// A method body: declared locals plus the instruction sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    #[serde(default)]
    pub locals: Vec<TypeSig>,
    #[serde(default)]
    pub code: Vec<Op>,
}

impl CodeUnit {
    pub fn new(code: Vec<Op>) -> Self {
        CodeUnit {
            locals: Vec::new(),
            code,
        }
    }

    /// Add a local slot, returning its index.
    pub fn add_local(&mut self, sig: TypeSig) -> u16 {
        self.locals.push(sig);
        (self.locals.len() - 1) as u16
    }

    /// Remove `remove` instructions at `at` and insert `replacement` there,
    /// retargeting every surviving branch:
    ///
    /// - pure insertion (`remove == 0`): targets at or beyond `at` shift by
    ///   the inserted length;
    /// - replacement (`remove > 0`): targets into the removed region land on
    ///   the first replacement instruction; targets beyond it shift by the
    ///   length delta.
    ///
    /// Branch operands inside `replacement` are absolute indices into the
    /// stream as it will be after the splice; the caller computes them.
    pub fn splice(&mut self, at: usize, remove: usize, replacement: Vec<Op>) {
        debug_assert!(at + remove <= self.code.len());
        let insert_len = replacement.len();
        let removed_end = at + remove;
        let delta = insert_len as isize - remove as isize;

        for (idx, op) in self.code.iter_mut().enumerate() {
            if idx >= at && idx < removed_end {
                continue; // about to be removed
            }
            if let Some(target) = op.branch_target_mut() {
                if remove == 0 {
                    if *target >= at {
                        *target = (*target as isize + delta) as usize;
                    }
                } else if *target >= at && *target < removed_end {
                    *target = at;
                } else if *target >= removed_end {
                    *target = (*target as isize + delta) as usize;
                }
            }
        }
        self.code.splice(at..removed_end, replacement);
    }

    /// Insert `block` just before the final instruction (the closing `Ret`).
    /// Used to append initialization calls to startup routines.
    pub fn insert_before_tail(&mut self, block: Vec<Op>) {
        let at = self.code.len().saturating_sub(1);
        self.splice(at, 0, block);
    }
}
