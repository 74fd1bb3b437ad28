//! Replication model: field classification kinds, wire configuration, and the
//! per-field descriptor the pass threads through its stages.

use serde::{Deserialize, Serialize};
use syncweave_ir::{Attribute, TypeId, TypeSig};

use crate::attrs::{named_int, named_str};

/// How a replicated field is kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncKind {
    /// Plain value field: synthesized handler + accessor pair.
    Variable,
    /// Container type tracking its own element deltas.
    List,
    Mapping,
    /// User type implementing the custom-replication capability.
    CustomObject,
}

impl SyncKind {
    pub fn is_object_kind(&self) -> bool {
        !matches!(self, SyncKind::Variable)
    }
}

/// Which side may originate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAuthority {
    Authority,
    Owner,
}

impl WriteAuthority {
    /// Discriminant as emitted into initialization call sequences.
    pub fn wire_value(self) -> u64 {
        match self {
            WriteAuthority::Authority => 0,
            WriteAuthority::Owner => 1,
        }
    }
}

/// Which peers receive the field at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadVisibility {
    Everyone,
    OwnerOnly,
}

impl ReadVisibility {
    pub fn wire_value(self) -> u64 {
        match self {
            ReadVisibility::Everyone => 0,
            ReadVisibility::OwnerOnly => 1,
        }
    }
}

/// Delivery channel for outbound updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Reliable,
    Unreliable,
}

impl Channel {
    pub fn wire_value(self) -> u64 {
        match self {
            Channel::Reliable => 0,
            Channel::Unreliable => 1,
        }
    }
}

/// Wire-format configuration for one replicated field, defaulted and
/// overridable through annotation arguments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireConfig {
    pub send_interval_ms: u64,
    pub write_authority: WriteAuthority,
    pub read_visibility: ReadVisibility,
    pub channel: Channel,
}

impl Default for WireConfig {
    fn default() -> Self {
        WireConfig {
            send_interval_ms: 100,
            write_authority: WriteAuthority::Authority,
            read_visibility: ReadVisibility::Everyone,
            channel: Channel::Reliable,
        }
    }
}

impl WireConfig {
    /// Build a config from annotation arguments, falling back to defaults for
    /// anything absent or unrecognized. Unrecognized values are reported by
    /// the caller, not here.
    pub fn from_attribute(attr: &Attribute) -> WireConfig {
        let mut cfg = WireConfig::default();
        cfg.send_interval_ms = named_int(attr, "interval_ms", cfg.send_interval_ms as i64).max(0) as u64;
        if let Some(v) = named_str(attr, "authority") {
            if v.eq_ignore_ascii_case("owner") {
                cfg.write_authority = WriteAuthority::Owner;
            }
        }
        if let Some(v) = named_str(attr, "visibility") {
            if v.eq_ignore_ascii_case("owner") {
                cfg.read_visibility = ReadVisibility::OwnerOnly;
            }
        }
        if let Some(v) = named_str(attr, "channel") {
            if v.eq_ignore_ascii_case("unreliable") {
                cfg.channel = Channel::Unreliable;
            }
        }
        cfg
    }
}

/// Identity and configuration of one replicated field.
///
/// Created by classification; immutable afterwards except for `ordinal`,
/// which the index allocator finalizes before synthesis runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatedFieldDescriptor {
    pub owner: TypeId,
    pub field_index: usize,
    pub field_name: String,
    pub data_sig: TypeSig,
    pub kind: SyncKind,
    pub wire: WireConfig,
    /// Hierarchy-global ordinal; `None` until the allocator assigns it.
    pub ordinal: Option<u32>,
    /// Declared change-hook method name, not yet signature-checked.
    pub hook: Option<String>,
}

/// Accessor pair registered for a Variable-kind field; object kinds register
/// `None` since all mutation already goes through the object's own methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorPair {
    pub getter: String,
    pub setter: String,
}

// Names of synthesized members and runtime capability methods. These are the
// contract between the weaver, the woven image, and the runtime.

/// Per-type inbound dispatch routine: `(reader, field_index) -> bool`.
pub const DISPATCH_METHOD: &str = "apply_replicated_update";

/// Handler construct method names (native, runtime-provided).
pub const HANDLER_INIT: &str = "init";
pub const HANDLER_REGISTER: &str = "register";
pub const HANDLER_TRY_APPLY: &str = "try_apply";
pub const HANDLER_REMOTE_VALUE: &str = "remote_value";
pub const HANDLER_LOCAL_AUTHORITY: &str = "local_authority";

/// Capability methods an object-kind field's type must inherit.
pub const OBJECT_INITIALIZE: &str = "initialize";
pub const OBJECT_SET_INDEX: &str = "set_index";

pub fn getter_name(field: &str) -> String {
    format!("get_{field}")
}

pub fn setter_name(field: &str) -> String {
    format!("set_{field}")
}

pub fn handler_field_name(field: &str) -> String {
    format!("{field}_repl")
}
