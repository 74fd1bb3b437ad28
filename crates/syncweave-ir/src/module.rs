//! The module image: types, members, attributes, and the structural-editing
//! interface the weaving pass drives.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::code::CodeUnit;
use crate::sig::TypeSig;

/// Index of a type within its [`ModuleImage`].
pub type TypeId = usize;

// =============================================================================
// Attributes
// =============================================================================

/// Value of a named attribute argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// A declared annotation on a type or field, with named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, AttrValue>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Attribute {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

// =============================================================================
// Member definitions
// =============================================================================

/// A declared field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub sig: TypeSig,
    #[serde(default)]
    pub is_static: bool,
    /// Non-reassignable: the field reference itself cannot be overwritten.
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub attrs: Vec<Attribute>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, sig: TypeSig) -> Self {
        FieldDef {
            name: name.into(),
            sig,
            is_static: false,
            is_final: false,
            attrs: Vec::new(),
        }
    }
}

/// Role of a method within its declaring type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Ctor,
    StaticInit,
    /// Runs at instance construction, before any replication traffic.
    EarlyInit,
    /// Runs after the instance is registered with the runtime.
    LateInit,
    PropertyGet,
    PropertySet,
    Plain,
    /// Emitted by the weaver; never rewritten again.
    Synthesized,
}

/// Runtime-provided behavior for a native (bodyless) method.
///
/// The weaver only declares these and emits calls against them; the runtime
/// (or the reference interpreter in `syncweave-core`) supplies the behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeKind {
    HandlerInit,
    HandlerRegister,
    HandlerTryApply,
    HandlerRemoteValue,
    HandlerLocalAuthority,
    ObjectInitialize,
    ObjectSetIndex,
}

/// A declared or synthesized method. `body == None` means native.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub kind: MethodKind,
    pub params: Vec<TypeSig>,
    pub ret: Option<TypeSig>,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub native: Option<NativeKind>,
    pub body: Option<CodeUnit>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, kind: MethodKind) -> Self {
        MethodDef {
            name: name.into(),
            kind,
            params: Vec::new(),
            ret: None,
            is_virtual: false,
            is_static: false,
            native: None,
            body: Some(CodeUnit::default()),
        }
    }

    pub fn is_native(&self) -> bool {
        self.body.is_none()
    }
}

/// A declared property: metadata tying accessor methods to a logical member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub sig: TypeSig,
    /// Index into the declaring type's method list.
    pub getter: Option<usize>,
    pub setter: Option<usize>,
}

// =============================================================================
// References
// =============================================================================

/// Reference to a field, as embedded in an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: TypeId,
    pub name: String,
    /// Type arguments when the declaring type is generic.
    #[serde(default)]
    pub type_inst: Vec<TypeSig>,
}

impl FieldRef {
    pub fn new(owner: TypeId, name: impl Into<String>) -> Self {
        FieldRef {
            owner,
            name: name.into(),
            type_inst: Vec::new(),
        }
    }
}

/// Reference to a method, as embedded in an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: TypeId,
    pub name: String,
    #[serde(default)]
    pub type_inst: Vec<TypeSig>,
}

impl MethodRef {
    pub fn new(owner: TypeId, name: impl Into<String>) -> Self {
        MethodRef {
            owner,
            name: name.into(),
            type_inst: Vec::new(),
        }
    }
}

// =============================================================================
// Type and module definitions
// =============================================================================

/// A compiled type: single-inheritance, with fields, methods, and properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub base: Option<TypeId>,
    /// Number of generic parameters on the type itself.
    #[serde(default)]
    pub type_params: u16,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub attrs: Vec<Attribute>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        TypeDef {
            name: name.into(),
            base: None,
            type_params: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            attrs: Vec::new(),
        }
    }

    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn find_method(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn find_method_of_kind(&self, kind: MethodKind) -> Option<usize> {
        self.methods.iter().position(|m| m.kind == kind)
    }

    /// Append a field, rejecting duplicate names.
    pub fn add_field(&mut self, field: FieldDef) -> Result<usize> {
        if self.find_field(&field.name).is_some() {
            bail!("type `{}` already declares field `{}`", self.name, field.name);
        }
        self.fields.push(field);
        Ok(self.fields.len() - 1)
    }

    /// Append a method, rejecting duplicate names.
    pub fn add_method(&mut self, method: MethodDef) -> Result<usize> {
        if self.find_method(&method.name).is_some() {
            bail!(
                "type `{}` already declares method `{}`",
                self.name,
                method.name
            );
        }
        self.methods.push(method);
        Ok(self.methods.len() - 1)
    }

    pub fn add_property(&mut self, property: PropertyDef) -> usize {
        self.properties.push(property);
        self.properties.len() - 1
    }
}

/// One compilation unit: an ordered collection of types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleImage {
    pub types: Vec<TypeDef>,
}

impl ModuleImage {
    pub fn add_type(&mut self, ty: TypeDef) -> TypeId {
        self.types.push(ty);
        self.types.len() - 1
    }

    pub fn get_type(&self, tid: TypeId) -> Option<&TypeDef> {
        self.types.get(tid)
    }

    pub fn type_at(&self, tid: TypeId) -> Result<&TypeDef> {
        self.types
            .get(tid)
            .ok_or_else(|| anyhow!("dangling type id {tid}"))
    }

    pub fn type_at_mut(&mut self, tid: TypeId) -> Result<&mut TypeDef> {
        self.types
            .get_mut(tid)
            .ok_or_else(|| anyhow!("dangling type id {tid}"))
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types.iter().position(|t| t.name == name)
    }

    pub fn type_name(&self, tid: TypeId) -> String {
        self.get_type(tid)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("<type#{tid}>"))
    }

    /// Walk the parent-pointer chain starting at `tid` (inclusive), rejecting
    /// cycles and dangling base references.
    pub fn base_chain(&self, tid: TypeId) -> Result<Vec<TypeId>> {
        let mut chain = Vec::new();
        let mut cursor = Some(tid);
        while let Some(cur) = cursor {
            if chain.contains(&cur) {
                bail!(
                    "inheritance cycle detected at type `{}`",
                    self.type_name(cur)
                );
            }
            chain.push(cur);
            cursor = self.type_at(cur)?.base;
        }
        Ok(chain)
    }

    /// Find `name` on `tid` or the nearest ancestor declaring it.
    pub fn find_method_in_chain(&self, tid: TypeId, name: &str) -> Result<Option<(TypeId, usize)>> {
        for cur in self.base_chain(tid)? {
            if let Some(idx) = self.type_at(cur)?.find_method(name) {
                return Ok(Some((cur, idx)));
            }
        }
        Ok(None)
    }

    /// Find `name` among the fields of `tid` or an ancestor.
    pub fn find_field_in_chain(&self, tid: TypeId, name: &str) -> Result<Option<(TypeId, usize)>> {
        for cur in self.base_chain(tid)? {
            if let Some(idx) = self.type_at(cur)?.find_field(name) {
                return Ok(Some((cur, idx)));
            }
        }
        Ok(None)
    }

    /// Deterministic base-before-derived ordering over all types.
    ///
    /// Ties (siblings, unrelated hierarchies) resolve to declaration order so
    /// repeated builds of the same image always process types identically.
    pub fn topo_order(&self) -> Result<Vec<TypeId>> {
        let mut depth: Vec<usize> = Vec::with_capacity(self.types.len());
        for tid in 0..self.types.len() {
            depth.push(self.base_chain(tid)?.len());
        }
        let mut order: Vec<TypeId> = (0..self.types.len()).collect();
        order.sort_by_key(|&tid| (depth[tid], tid));
        Ok(order)
    }
}
