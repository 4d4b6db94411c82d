//! Runtime not-null contract weaver for JVM method bytecode.
//!
//! Rewrites method instruction streams so that a null passed to a
//! non-null-annotated parameter, or returned from a non-null-annotated
//! method, fails at the call boundary instead of surfacing later as an
//! opaque `NullPointerException`. Classfile container reading/writing and
//! annotation discovery are owned by the surrounding build-plugin driver;
//! this crate consumes already-extracted signatures, not-null sets, and
//! instruction streams.

pub mod batch;
pub mod descriptor;
pub mod instrument;
pub mod ir;
pub mod opcodes;
pub mod rewrite;

pub use batch::{Batch, WeaveOptions, WeaveSummary, apply_batch};
pub use instrument::{
    AnnotationCause, CauseProvider, CheckMode, ClassContext, FnCause, MethodContext,
    NotNullTransformer, NullPolicy, TransformerBuilder,
};
pub use ir::{Insn, Label, LabelAlloc, MethodBody};
pub use rewrite::{RewriteOutcome, rewrite_method};
