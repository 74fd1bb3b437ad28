//! Type signatures for fields, locals, and method parameters.

use serde::{Deserialize, Serialize};

use crate::module::{ModuleImage, TypeId};

/// Shape of a value as the compiler declared it.
///
/// `Object` is the untyped instance reference (any heap object); `Reader` is
/// the wire-reader handle threaded through dispatch routines. Neither carries
/// structure the weaver needs to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I64,
    F32,
    F64,
    Str,
    Object,
    Reader,
    List(Box<TypeSig>),
    Map(Box<TypeSig>, Box<TypeSig>),
    /// A declared type, possibly instantiated with type arguments.
    Named(TypeId, Vec<TypeSig>),
    /// Reference to a generic parameter of the declaring type.
    GenericParam(u16),
}

impl TypeSig {
    /// True for the scalar/string shapes every codec is expected to cover.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeSig::Bool
                | TypeSig::U8
                | TypeSig::U16
                | TypeSig::U32
                | TypeSig::U64
                | TypeSig::I64
                | TypeSig::F32
                | TypeSig::F64
                | TypeSig::Str
        )
    }

    /// Human-readable rendering, resolving named types against `image`.
    pub fn describe(&self, image: &ModuleImage) -> String {
        match self {
            TypeSig::Bool => "bool".to_string(),
            TypeSig::U8 => "u8".to_string(),
            TypeSig::U16 => "u16".to_string(),
            TypeSig::U32 => "u32".to_string(),
            TypeSig::U64 => "u64".to_string(),
            TypeSig::I64 => "i64".to_string(),
            TypeSig::F32 => "f32".to_string(),
            TypeSig::F64 => "f64".to_string(),
            TypeSig::Str => "str".to_string(),
            TypeSig::Object => "object".to_string(),
            TypeSig::Reader => "reader".to_string(),
            TypeSig::List(inner) => format!("list<{}>", inner.describe(image)),
            TypeSig::Map(k, v) => {
                format!("map<{}, {}>", k.describe(image), v.describe(image))
            }
            TypeSig::Named(tid, args) => {
                let name = image
                    .get_type(*tid)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| format!("<type#{tid}>"));
                if args.is_empty() {
                    name
                } else {
                    let rendered: Vec<String> = args.iter().map(|a| a.describe(image)).collect();
                    format!("{}<{}>", name, rendered.join(", "))
                }
            }
            TypeSig::GenericParam(i) => format!("T{i}"),
        }
    }

    /// Identifier-safe rendering, used when a synthesized member name must
    /// embed the data type (e.g. one handler type per data type).
    pub fn mangle(&self, image: &ModuleImage) -> String {
        match self {
            TypeSig::List(inner) => format!("list_{}", inner.mangle(image)),
            TypeSig::Map(k, v) => format!("map_{}_{}", k.mangle(image), v.mangle(image)),
            TypeSig::Named(tid, args) => {
                let base = image
                    .get_type(*tid)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| format!("type{tid}"));
                let mut out = base;
                for a in args {
                    out.push('_');
                    out.push_str(&a.mangle(image));
                }
                out
            }
            TypeSig::GenericParam(i) => format!("tp{i}"),
            other => other.describe(image),
        }
    }
}
