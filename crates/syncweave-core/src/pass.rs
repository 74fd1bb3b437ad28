//! The weave pass: drives classification, serializability checking,
//! synthesis, index allocation, call-site rewriting, and dispatch building
//! over every type of a module image, base classes before derived ones.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use syncweave_ir::{ModuleImage, TypeId};

use crate::accessors::synthesize_accessors;
use crate::attrs::AttributeOracle;
use crate::classify::{classify_field, ClassifyOutcome};
use crate::codec::{serialized_repr, CodecProvider};
use crate::context::WeaveContext;
use crate::diag::DiagnosticSink;
use crate::dispatch::build_dispatch;
use crate::handlers::{synthesize_object_init, synthesize_variable_handler};
use crate::model::{ReplicatedFieldDescriptor, SyncKind};
use crate::rewrite::rewrite_call_sites;

/// Summary of one weave pass, serializable for CLI reports.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WeaveReport {
    pub types: Vec<TypeWeaveReport>,
    pub total_woven: usize,
    pub total_skipped: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TypeWeaveReport {
    pub type_name: String,
    pub woven: Vec<WovenField>,
    pub skipped: Vec<SkippedField>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WovenField {
    pub field: String,
    pub kind: SyncKind,
    pub ordinal: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkippedField {
    pub field: String,
    pub reason: String,
}

/// Run the full pass over `image`: every type once, in deterministic
/// base-to-derived order, with the running ordinal carried forward.
pub fn weave_module(
    image: &mut ModuleImage,
    codec: &dyn CodecProvider,
    attrs: &dyn AttributeOracle,
    sink: &mut dyn DiagnosticSink,
) -> Result<WeaveReport> {
    let mut ctx = WeaveContext::new();
    let mut report = WeaveReport::default();
    let order = image.topo_order().context("module image has a malformed hierarchy")?;
    for tid in order {
        weave_type(image, tid, &mut ctx, codec, attrs, sink, &mut report)?;
    }
    Ok(report)
}

/// Process one type. Idempotent within a build: a type already woven this
/// build is skipped outright, so reprocessing can never double-insert
/// members or base-chain calls.
pub fn weave_type(
    image: &mut ModuleImage,
    tid: TypeId,
    ctx: &mut WeaveContext,
    codec: &dyn CodecProvider,
    attrs: &dyn AttributeOracle,
    sink: &mut dyn DiagnosticSink,
    report: &mut WeaveReport,
) -> Result<()> {
    if !ctx.processed_types.insert(tid) {
        debug!(target: "syncweave", "`{}` already processed this build", image.type_name(tid));
        return Ok(());
    }

    let type_name = image.type_name(tid);
    let mut entry = TypeWeaveReport {
        type_name: type_name.clone(),
        woven: Vec::new(),
        skipped: Vec::new(),
    };

    // Classify every field first; ordinals are only assigned to fields that
    // survive classification and the serializability check, keeping the
    // hierarchy-global sequence dense.
    let mut descriptors: Vec<ReplicatedFieldDescriptor> = Vec::new();
    let field_count = image.type_at(tid)?.fields.len();
    for field_index in 0..field_count {
        match classify_field(image, tid, field_index, attrs, sink)? {
            ClassifyOutcome::NotReplicated => {}
            ClassifyOutcome::Skipped(reason) => {
                entry.skipped.push(SkippedField {
                    field: image.type_at(tid)?.fields[field_index].name.clone(),
                    reason,
                });
            }
            ClassifyOutcome::Replicated(desc) => match check_serializable(image, codec, &desc) {
                Ok(()) => descriptors.push(desc),
                Err(reason) => {
                    sink.error(format!("field `{type_name}::{}`: {reason}", desc.field_name));
                    entry.skipped.push(SkippedField {
                        field: desc.field_name,
                        reason,
                    });
                }
            },
        }
    }

    // Index allocation: dense, declaration-ordered, continuing the count
    // accumulated over the base chain.
    let start = ctx.start_ordinal(image, tid)?;
    for (offset, desc) in descriptors.iter_mut().enumerate() {
        desc.ordinal = Some(start + offset as u32);
    }
    ctx.record_count(tid, descriptors.len() as u32);

    // Synthesis. A failure here is fatal to the field, not to the pass.
    let mut synthesized: Vec<ReplicatedFieldDescriptor> = Vec::new();
    for desc in descriptors {
        let outcome = match desc.kind {
            SyncKind::Variable => synthesize_variable_handler(image, ctx, &desc, sink)
                .and_then(|(handler_tid, backing)| {
                    synthesize_accessors(image, &desc, handler_tid, &backing, sink)
                })
                .map(Some),
            _ => synthesize_object_init(image, &desc, sink).map(|()| None),
        };
        match outcome {
            Ok(pair) => {
                ctx.processed_fields
                    .insert((tid, desc.field_name.clone()), pair);
                entry.woven.push(WovenField {
                    field: desc.field_name.clone(),
                    kind: desc.kind,
                    ordinal: desc.ordinal.context("ordinal assigned before synthesis")?,
                });
                synthesized.push(desc);
            }
            Err(err) => {
                let reason = format!("{err:#}");
                sink.error(format!("field `{type_name}::{}`: {reason}", desc.field_name));
                warn!(target: "syncweave", "synthesis failed for `{}::{}`", type_name, desc.field_name);
                entry.skipped.push(SkippedField {
                    field: desc.field_name.clone(),
                    reason,
                });
            }
        }
    }

    rewrite_call_sites(image, tid, ctx, sink)?;
    build_dispatch(image, ctx, tid, &synthesized, codec)?;

    report.total_woven += entry.woven.len();
    report.total_skipped += entry.skipped.len();
    if !entry.woven.is_empty() || !entry.skipped.is_empty() {
        report.types.push(entry);
    }
    Ok(())
}

/// Serializability boundary: classification fails closed when the codec does
/// not know the field's data type. Custom objects are checked against their
/// declared serialized representation, which may be "none needed".
fn check_serializable(
    image: &ModuleImage,
    codec: &dyn CodecProvider,
    desc: &ReplicatedFieldDescriptor,
) -> std::result::Result<(), String> {
    let check = |sig: &syncweave_ir::TypeSig| {
        if codec.has_codec(image, sig, true) {
            Ok(())
        } else {
            Err(format!(
                "no codec registered for type `{}`",
                sig.describe(image)
            ))
        }
    };
    match desc.kind {
        SyncKind::Variable => check(&desc.data_sig),
        SyncKind::List | SyncKind::Mapping => match &desc.data_sig {
            syncweave_ir::TypeSig::Named(_, args) => {
                for arg in args {
                    check(arg)?;
                }
                Ok(())
            }
            other => check(other),
        },
        SyncKind::CustomObject => {
            match serialized_repr(image, &desc.data_sig).map_err(|e| format!("{e:#}"))? {
                Some(repr) => check(&repr),
                None => Ok(()), // declares "no representation needed"
            }
        }
    }
}
