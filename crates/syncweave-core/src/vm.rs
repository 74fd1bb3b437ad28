//! Reference interpreter for woven module images.
//!
//! Executes method bodies over in-memory instances, supplying the native
//! behavior of handler constructs and object-kind capability methods, and a
//! scripted reader standing in for the wire (actual wire encoding is the
//! transport's business, not ours). Tests use this to check the runtime
//! semantics of synthesized accessors and dispatch routines; the CLI exposes
//! it for debugging woven images.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use syncweave_ir::{MethodDef, ModuleImage, NativeKind, Op, TypeId, TypeSig};

/// Runaway-execution guard for interpreted bodies.
const STEP_LIMIT: usize = 1_000_000;

pub type InstanceRef = Rc<RefCell<Instance>>;
pub type ReaderRef = Rc<RefCell<VecDeque<Value>>>;

/// One heap instance: dynamic type plus a field map. Hidden bookkeeping
/// written by natives uses `__`-prefixed keys that no TypeDef declares.
#[derive(Debug)]
pub struct Instance {
    pub type_id: TypeId,
    pub fields: HashMap<String, Value>,
}

/// Runtime value model.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    Str(String),
    List(Vec<Value>),
    Obj(InstanceRef),
    Reader(ReaderRef),
    /// Field address, produced by `LdFieldAddr` on unrewritten code.
    Addr(InstanceRef, String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => Rc::ptr_eq(a, b),
            (Value::Reader(a), Value::Reader(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    fn truthy(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => bail!("expected bool, found {other:?}"),
        }
    }
}

/// Build a scripted reader from a value sequence.
pub fn make_reader(values: Vec<Value>) -> Value {
    Value::Reader(Rc::new(RefCell::new(values.into())))
}

pub fn get_field(inst: &InstanceRef, name: &str) -> Value {
    inst.borrow().fields.get(name).cloned().unwrap_or(Value::Null)
}

pub fn set_field(inst: &InstanceRef, name: &str, value: Value) {
    inst.borrow_mut().fields.insert(name.to_string(), value);
}

/// The interpreter. Stateless besides the image reference; instances own all
/// runtime state.
pub struct Vm<'a> {
    image: &'a ModuleImage,
}

impl<'a> Vm<'a> {
    pub fn new(image: &'a ModuleImage) -> Self {
        Vm { image }
    }

    fn default_value(&self, sig: &TypeSig) -> Value {
        match sig {
            TypeSig::Bool => Value::Bool(false),
            TypeSig::U8 | TypeSig::U16 | TypeSig::U32 | TypeSig::U64 => Value::U64(0),
            TypeSig::I64 => Value::I64(0),
            TypeSig::F32 | TypeSig::F64 => Value::F64(0.0),
            TypeSig::Str => Value::Str(String::new()),
            TypeSig::List(_) => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Allocate an instance with every declared field (own and inherited)
    /// zero-initialized.
    pub fn new_instance(&self, tid: TypeId) -> Result<InstanceRef> {
        let mut fields = HashMap::new();
        for ancestor in self.image.base_chain(tid)? {
            for f in &self.image.type_at(ancestor)?.fields {
                fields
                    .entry(f.name.clone())
                    .or_insert_with(|| self.default_value(&f.sig));
            }
        }
        Ok(Rc::new(RefCell::new(Instance { type_id: tid, fields })))
    }

    /// Allocate and run the startup routines the weaver wires into: every
    /// early-initialization routine base-most first, then the late ones.
    pub fn construct(&self, tid: TypeId) -> Result<InstanceRef> {
        let inst = self.new_instance(tid)?;
        let mut chain = self.image.base_chain(tid)?;
        chain.reverse();
        for kind in [syncweave_ir::MethodKind::EarlyInit, syncweave_ir::MethodKind::LateInit] {
            for &ancestor in &chain {
                if let Some(idx) = self.image.type_at(ancestor)?.find_method_of_kind(kind) {
                    self.invoke(ancestor, idx, Some(Value::Obj(inst.clone())), vec![])?;
                }
            }
        }
        Ok(inst)
    }

    /// Call `name` on `inst` with virtual resolution from its dynamic type.
    pub fn call(&self, inst: &InstanceRef, name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let tid = inst.borrow().type_id;
        let (owner, idx) = self
            .image
            .find_method_in_chain(tid, name)?
            .ok_or_else(|| anyhow!("no method `{name}` on `{}`", self.image.type_name(tid)))?;
        self.invoke(owner, idx, Some(Value::Obj(inst.clone())), args)
    }

    fn invoke(
        &self,
        owner: TypeId,
        method_idx: usize,
        recv: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let method = &self.image.type_at(owner)?.methods[method_idx];
        if let Some(kind) = method.native {
            let recv = recv.ok_or_else(|| anyhow!("native `{}` needs a receiver", method.name))?;
            return self.native(kind, recv, args);
        }
        self.exec_body(owner, method, recv, args)
    }

    fn exec_body(
        &self,
        owner: TypeId,
        method: &MethodDef,
        recv: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let body = method
            .body
            .as_ref()
            .ok_or_else(|| anyhow!("method `{}` has no body and no native", method.name))?;
        let mut locals: Vec<Value> = body.locals.iter().map(|s| self.default_value(s)).collect();
        let mut stack: Vec<Value> = Vec::new();
        let mut ip = 0usize;
        let mut steps = 0usize;

        macro_rules! pop {
            () => {
                stack
                    .pop()
                    .ok_or_else(|| anyhow!("stack underflow in `{}` at {ip}", method.name))?
            };
        }

        loop {
            steps += 1;
            if steps > STEP_LIMIT {
                bail!("step limit exceeded in `{}::{}`", self.image.type_name(owner), method.name);
            }
            let op = body
                .code
                .get(ip)
                .ok_or_else(|| anyhow!("control fell off `{}` at {ip}", method.name))?;
            match op {
                Op::Nop => {}
                Op::LdSelf => {
                    let v = recv.clone().ok_or_else(|| anyhow!("LdSelf without receiver"))?;
                    stack.push(v);
                }
                Op::LdArg(n) => stack.push(
                    args.get(usize::from(*n))
                        .cloned()
                        .ok_or_else(|| anyhow!("missing argument {n}"))?,
                ),
                Op::LdLoc(n) => stack.push(locals[usize::from(*n)].clone()),
                Op::StLoc(n) => locals[usize::from(*n)] = pop!(),
                Op::InitLoc(n) => {
                    locals[usize::from(*n)] = self.default_value(&body.locals[usize::from(*n)]);
                }
                Op::LdcBool(b) => stack.push(Value::Bool(*b)),
                Op::LdcU64(v) => stack.push(Value::U64(*v)),
                Op::LdcI64(v) => stack.push(Value::I64(*v)),
                Op::LdcF64(v) => stack.push(Value::F64(*v)),
                Op::LdcStr(s) => stack.push(Value::Str(s.clone())),
                Op::LdField(fref) => {
                    let obj = pop!();
                    let Value::Obj(inst) = obj else {
                        bail!("LdField on non-object in `{}`", method.name)
                    };
                    stack.push(get_field(&inst, &fref.name));
                }
                Op::StField(fref) => {
                    let value = pop!();
                    let obj = pop!();
                    let Value::Obj(inst) = obj else {
                        bail!("StField on non-object in `{}`", method.name)
                    };
                    set_field(&inst, &fref.name, value);
                }
                Op::LdFieldAddr(fref) => {
                    let obj = pop!();
                    let Value::Obj(inst) = obj else {
                        bail!("LdFieldAddr on non-object in `{}`", method.name)
                    };
                    stack.push(Value::Addr(inst, fref.name.clone()));
                }
                Op::InitAddr(sig) => {
                    let addr = pop!();
                    let Value::Addr(inst, name) = addr else {
                        bail!("InitAddr on non-address in `{}`", method.name)
                    };
                    set_field(&inst, &name, self.default_value(sig));
                }
                Op::NewObj(tid) => stack.push(Value::Obj(self.new_instance(*tid)?)),
                Op::Call(mref) | Op::CallVirt(mref) => {
                    let static_target = self
                        .image
                        .find_method_in_chain(mref.owner, &mref.name)?
                        .ok_or_else(|| {
                            anyhow!(
                                "call target `{}::{}` does not resolve",
                                self.image.type_name(mref.owner),
                                mref.name
                            )
                        })?;
                    let callee = &self.image.type_at(static_target.0)?.methods[static_target.1];
                    let mut call_args = Vec::with_capacity(callee.params.len());
                    for _ in 0..callee.params.len() {
                        call_args.push(pop!());
                    }
                    call_args.reverse();
                    let call_recv = if callee.is_static { None } else { Some(pop!()) };

                    // virtual dispatch re-resolves from the dynamic type
                    let target = match (op, &call_recv) {
                        (Op::CallVirt(_), Some(Value::Obj(inst))) => {
                            let dynamic = inst.borrow().type_id;
                            self.image
                                .find_method_in_chain(dynamic, &mref.name)?
                                .unwrap_or(static_target)
                        }
                        _ => static_target,
                    };
                    let result = self.invoke(target.0, target.1, call_recv, call_args)?;
                    if let Some(v) = result {
                        stack.push(v);
                    }
                }
                Op::Br(t) => {
                    ip = *t;
                    continue;
                }
                Op::BrIf(t) => {
                    if pop!().truthy()? {
                        ip = *t;
                        continue;
                    }
                }
                Op::BrIfNot(t) => {
                    if !pop!().truthy()? {
                        ip = *t;
                        continue;
                    }
                }
                Op::BrIfNe(t) => {
                    let b = pop!();
                    let a = pop!();
                    if a != b {
                        ip = *t;
                        continue;
                    }
                }
                Op::CodecRead(_) => {
                    let reader = pop!();
                    let Value::Reader(queue) = reader else {
                        bail!("CodecRead on non-reader in `{}`", method.name)
                    };
                    let value = queue
                        .borrow_mut()
                        .pop_front()
                        .ok_or_else(|| anyhow!("reader exhausted in `{}`", method.name))?;
                    stack.push(value);
                }
                Op::Pop => {
                    pop!();
                }
                Op::Ret => {
                    return Ok(if method.ret.is_some() { Some(pop!()) } else { None });
                }
            }
            ip += 1;
        }
    }

    /// Native behavior of handler constructs and object-kind capabilities.
    fn native(&self, kind: NativeKind, recv: Value, args: Vec<Value>) -> Result<Option<Value>> {
        let Value::Obj(inst) = recv else {
            bail!("native receiver must be an object")
        };
        match kind {
            NativeKind::HandlerInit => {
                let [w, r, i, c, initial] = take_args::<5>(args)?;
                set_field(&inst, "write_authority", w);
                set_field(&inst, "read_visibility", r);
                set_field(&inst, "send_interval_ms", i);
                set_field(&inst, "channel", c);
                set_field(&inst, "remote", initial);
                // a locally constructed instance holds authority until the
                // runtime demotes it
                set_field(&inst, "local_authority", Value::Bool(true));
                Ok(None)
            }
            NativeKind::HandlerRegister => {
                let [owner, index] = take_args::<2>(args)?;
                set_field(&inst, "index", index.clone());
                record_registration(&owner, index)?;
                Ok(None)
            }
            NativeKind::HandlerTryApply => {
                let [value, authoritative] = take_args::<2>(args)?;
                if authoritative.truthy()? {
                    let allowed = get_field(&inst, "local_authority").truthy().unwrap_or(false);
                    Ok(Some(Value::Bool(allowed)))
                } else {
                    set_field(&inst, "remote", value);
                    Ok(Some(Value::Bool(true)))
                }
            }
            NativeKind::HandlerRemoteValue => Ok(Some(get_field(&inst, "remote"))),
            NativeKind::HandlerLocalAuthority => Ok(Some(get_field(&inst, "local_authority"))),
            NativeKind::ObjectInitialize => {
                let [w, r, i, c, is_object] = take_args::<5>(args)?;
                set_field(&inst, "__write_authority", w);
                set_field(&inst, "__read_visibility", r);
                set_field(&inst, "__send_interval_ms", i);
                set_field(&inst, "__channel", c);
                set_field(&inst, "__object_kind", is_object);
                Ok(None)
            }
            NativeKind::ObjectSetIndex => {
                let [owner, index] = take_args::<2>(args)?;
                set_field(&inst, "__index", index.clone());
                record_registration(&owner, index)?;
                Ok(None)
            }
        }
    }
}

/// Append a registered ordinal to the owning instance's bookkeeping list.
fn record_registration(owner: &Value, index: Value) -> Result<()> {
    let Value::Obj(owner) = owner else {
        bail!("registration owner must be an object")
    };
    let mut borrow = owner.borrow_mut();
    let entry = borrow
        .fields
        .entry("__registered".to_string())
        .or_insert_with(|| Value::List(Vec::new()));
    match entry {
        Value::List(list) => list.push(index),
        _ => bail!("`__registered` bookkeeping field clobbered"),
    }
    Ok(())
}

fn take_args<const N: usize>(args: Vec<Value>) -> Result<[Value; N]> {
    args.try_into()
        .map_err(|v: Vec<Value>| anyhow!("expected {N} arguments, got {}", v.len()))
}
