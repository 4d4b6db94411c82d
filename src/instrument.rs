use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use log::debug;

use crate::descriptor::{JavaType, MethodType};
use crate::ir::{Insn, Label, LabelAlloc};
use crate::opcodes;

const CONSTRUCTOR_NAME: &str = "<init>";
const OBJECT_CLASS: &str = "java/lang/Object";
const VOID_WRAPPER_CLASS: &str = "java/lang/Void";
const IAE_CLASS: &str = "java/lang/IllegalArgumentException";
const ISE_CLASS: &str = "java/lang/IllegalStateException";
const OBJECTS_CLASS: &str = "java/util/Objects";
const REQUIRE_NON_NULL: &str = "requireNonNull";
const REQUIRE_NON_NULL_DESC: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";
const LOGGER_FACTORY_CLASS: &str = "org/slf4j/LoggerFactory";
const LOGGER_CLASS: &str = "org/slf4j/Logger";
const GET_LOGGER_DESC: &str = "(Ljava/lang/String;)Lorg/slf4j/Logger;";
const LOG_ERROR_DESC: &str = "(Ljava/lang/String;)V";
const THROW_CTOR_DESC: &str = "(Ljava/lang/String;)V";

/// Metadata of the class enclosing the method under instrumentation.
///
/// `is_anonymous` is tri-state: absence of evidence is treated as "not
/// anonymous" for eligibility, but stays distinguishable from a known
/// negative.
#[derive(Clone, Debug)]
pub struct ClassContext {
    pub name: String,
    pub is_enum: bool,
    pub is_anonymous: Option<bool>,
}

/// Static signature of the method under instrumentation.
#[derive(Clone, Debug)]
pub struct MethodContext {
    pub name: String,
    pub access: u16,
    pub signature: MethodType,
}

impl MethodContext {
    pub fn new(name: &str, access: u16, descriptor: &str) -> Result<MethodContext> {
        let signature = MethodType::parse(descriptor)
            .with_context(|| format!("bad descriptor for method {name}"))?;
        Ok(MethodContext {
            name: name.to_string(),
            access,
            signature,
        })
    }

    fn is_static(&self) -> bool {
        self.access & opcodes::ACC_STATIC != 0
    }

    fn is_synthetic(&self) -> bool {
        self.access & opcodes::ACC_SYNTHETIC != 0
    }

    fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }
}

/// Code-generation strategy for a check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckMode {
    /// Delegate to `java.util.Objects.requireNonNull`.
    Delegate,
    /// Hand-emit a conditional branch plus throw-or-log sequence.
    Inline,
}

/// What the generated code does when it observes a null value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NullPolicy {
    Throw,
    /// Log through slf4j under the given logger name and continue.
    Log { logger: String },
}

/// Supplies the human-readable cause woven into generated messages.
pub trait CauseProvider {
    fn reason(&self) -> String;
}

/// Cause naming the annotation that marked the value non-null.
pub struct AnnotationCause(pub String);

impl CauseProvider for AnnotationCause {
    fn reason(&self) -> String {
        self.0.clone()
    }
}

/// Closure-backed cause.
pub struct FnCause<F>(pub F);

impl<F> CauseProvider for FnCause<F>
where
    F: Fn() -> String,
{
    fn reason(&self) -> String {
        (self.0)()
    }
}

/// Configuration phase of the engine.
///
/// All offset bookkeeping (required parameters, synthetic leading slots)
/// must settle here; [`TransformerBuilder::build`] validates the result and
/// freezes it into a [`NotNullTransformer`], which no longer allows offset
/// mutation once emission begins.
pub struct TransformerBuilder {
    class: ClassContext,
    method: MethodContext,
    mode: CheckMode,
    policy: NullPolicy,
    cause: Box<dyn CauseProvider>,
    required_params: Vec<usize>,
    check_return: bool,
    synthetic_count: usize,
}

impl TransformerBuilder {
    pub fn new(
        class: ClassContext,
        method: MethodContext,
        mode: CheckMode,
        policy: NullPolicy,
        cause: Box<dyn CauseProvider>,
    ) -> TransformerBuilder {
        let mut synthetic_count = 0;
        if method.is_constructor() {
            if class.is_anonymous == Some(true) {
                synthetic_count += 1;
            }
            if class.is_enum {
                synthetic_count += 2;
            }
        }
        TransformerBuilder {
            class,
            method,
            mode,
            policy,
            cause,
            required_params: Vec::new(),
            check_return: false,
            synthetic_count,
        }
    }

    /// Record a declared (synthetic-offset-excluded) parameter index that
    /// must be checked. Insertion order is free; checks are emitted in
    /// ascending order.
    pub fn require_param(&mut self, declared_index: usize) -> &mut TransformerBuilder {
        self.required_params.push(declared_index);
        self
    }

    pub fn require_return(&mut self) -> &mut TransformerBuilder {
        self.check_return = true;
        self
    }

    /// Account for an implicit leading parameter discovered outside the
    /// constructor rules, e.g. an inner-class outer-instance capture.
    pub fn increase_synthetic_count(&mut self) -> &mut TransformerBuilder {
        self.synthetic_count += 1;
        self
    }

    pub fn build(self, labels: LabelAlloc) -> Result<NotNullTransformer> {
        if self.mode == CheckMode::Delegate && matches!(self.policy, NullPolicy::Log { .. }) {
            bail!(
                "delegate mode cannot log instead of throwing for method {}.{}",
                self.class.name,
                self.method.name
            );
        }

        let args = &self.method.signature.args;
        let mut required = Vec::new();
        for declared in self.required_params {
            let raw = declared + self.synthetic_count;
            let Some(arg) = args.get(raw) else {
                bail!(
                    "not-null parameter index {declared} is out of range for {}.{} ({} argument slots)",
                    self.class.name,
                    self.method.name,
                    args.len()
                );
            };
            if !arg.is_reference() {
                debug!(
                    "ignoring not-null parameter {declared} of {}.{}: not a reference type",
                    self.class.name, self.method.name
                );
                continue;
            }
            required.push(declared);
        }
        required.sort_unstable();
        required.dedup();

        Ok(NotNullTransformer {
            class: self.class,
            method: self.method,
            mode: self.mode,
            policy: self.policy,
            cause: self.cause,
            required_params: required,
            check_return: self.check_return,
            synthetic_count: self.synthetic_count,
            parameter_names: None,
            instrumented: false,
            checks_emitted: 0,
            labels,
            out: Vec::new(),
        })
    }
}

/// Per-method instrumentation engine.
///
/// One instance per method traversal; the driver feeds the hook points in
/// stream order and harvests the rewritten instruction stream afterwards.
pub struct NotNullTransformer {
    class: ClassContext,
    method: MethodContext,
    mode: CheckMode,
    policy: NullPolicy,
    cause: Box<dyn CauseProvider>,
    required_params: Vec<usize>,
    check_return: bool,
    synthetic_count: usize,
    parameter_names: Option<Vec<String>>,
    instrumented: bool,
    checks_emitted: u32,
    labels: LabelAlloc,
    out: Vec<Insn>,
}

impl NotNullTransformer {
    /// One declared-parameter name, in raw index order. Only ever invoked
    /// for classes compiled with name-retention metadata, and only during
    /// traversal.
    pub fn on_parameter_name(&mut self, name: &str) {
        self.parameter_names
            .get_or_insert_with(Vec::new)
            .push(name.to_string());
    }

    /// Body start: emit one check per required parameter, ascending, before
    /// any original instruction.
    pub fn on_body_start(&mut self) -> Result<()> {
        if !self.eligible() {
            return Ok(());
        }
        let required = self.required_params.clone();
        for declared in required {
            self.emit_param_check(declared)?;
        }
        Ok(())
    }

    /// Zero-operand instruction. Emits a return check ahead of every
    /// qualifying `areturn`, then forwards the original instruction.
    pub fn on_zero_op(&mut self, opcode: u8) -> Result<()> {
        if opcode == opcodes::ARETURN && self.eligible() && self.should_check_return() {
            self.emit_return_check();
        }
        self.out.push(Insn::ZeroOp { opcode });
        Ok(())
    }

    /// Any instruction of the stream; dispatches zero-operand instructions
    /// to [`Self::on_zero_op`] and forwards everything else untouched.
    pub fn on_insn(&mut self, insn: &Insn) -> Result<()> {
        match insn {
            Insn::ZeroOp { opcode } => self.on_zero_op(*opcode),
            other => {
                self.out.push(other.clone());
                Ok(())
            }
        }
    }

    /// Final consistency pass over the rewritten stream. A validation
    /// failure is re-thrown enriched with the method name, preserving the
    /// underlying detail.
    pub fn on_finalize(&self) -> Result<()> {
        self.validate_stream().with_context(|| {
            format!("finalize processing failed for method {}", self.method.name)
        })
    }

    pub fn has_instrumented(&self) -> bool {
        self.instrumented
    }

    pub fn checks_emitted(&self) -> u32 {
        self.checks_emitted
    }

    pub fn into_insns(self) -> Vec<Insn> {
        self.out
    }

    fn eligible(&self) -> bool {
        if self.method.is_synthetic() {
            return false;
        }
        if self.is_anonymous_class_constructor() {
            return false;
        }
        if self.is_equals_method() {
            return false;
        }
        true
    }

    fn is_anonymous_class_constructor(&self) -> bool {
        self.class.is_anonymous == Some(true) && self.method.is_constructor()
    }

    fn is_equals_method(&self) -> bool {
        self.method.name == "equals"
            && self.method.signature.ret == Some(JavaType::Boolean)
            && matches!(self.method.signature.args.as_slice(), [JavaType::Object(_)])
    }

    fn should_check_return(&self) -> bool {
        if !self.check_return {
            return false;
        }
        match &self.method.signature.ret {
            Some(ret) => ret.is_reference() && ret.internal_name() != VOID_WRAPPER_CLASS,
            None => false,
        }
    }

    fn emit_param_check(&mut self, declared_index: usize) -> Result<()> {
        let raw = declared_index + self.synthetic_count;
        let args = &self.method.signature.args;
        if raw >= args.len() {
            bail!(
                "not-null parameter index {declared_index} is out of range for {}.{}",
                self.class.name,
                self.method.name
            );
        }

        let mut slot: u16 = if self.method.is_static() { 0 } else { 1 };
        for arg in &args[..raw] {
            slot += arg.width();
        }
        self.out.push(Insn::Var {
            opcode: opcodes::ALOAD,
            var: slot,
        });

        match self.mode {
            CheckMode::Delegate => self.emit_require_non_null(),
            CheckMode::Inline => {
                let message = self.null_argument_message(declared_index);
                self.emit_inline_check(IAE_CLASS, message);
            }
        }
        self.mark_instrumented();
        Ok(())
    }

    fn emit_return_check(&mut self) {
        match self.mode {
            CheckMode::Delegate => {
                self.emit_require_non_null();
                if let Some(ret) = &self.method.signature.ret {
                    let internal = ret.internal_name();
                    if internal != OBJECT_CLASS {
                        self.out.push(Insn::TypeOp {
                            opcode: opcodes::CHECKCAST,
                            ty: internal,
                        });
                    }
                }
            }
            CheckMode::Inline => {
                self.out.push(Insn::ZeroOp {
                    opcode: opcodes::DUP,
                });
                let message = self.null_return_message();
                self.emit_inline_check(ISE_CLASS, message);
            }
        }
        self.mark_instrumented();
    }

    fn emit_require_non_null(&mut self) {
        self.out.push(Insn::Invoke {
            opcode: opcodes::INVOKESTATIC,
            owner: OBJECTS_CLASS.to_string(),
            name: REQUIRE_NON_NULL.to_string(),
            descriptor: REQUIRE_NON_NULL_DESC.to_string(),
            interface: false,
        });
    }

    fn emit_inline_check(&mut self, exception_class: &str, message: String) {
        let skip = self.labels.fresh();
        self.out.push(Insn::Jump {
            opcode: opcodes::IFNONNULL,
            target: skip,
        });
        match self.policy.clone() {
            NullPolicy::Throw => self.emit_throw(exception_class, message),
            NullPolicy::Log { logger } => self.emit_logging(&logger, message),
        }
        self.out.push(Insn::Mark { label: skip });
    }

    fn emit_throw(&mut self, exception_class: &str, message: String) {
        self.out.push(Insn::TypeOp {
            opcode: opcodes::NEW,
            ty: exception_class.to_string(),
        });
        self.out.push(Insn::ZeroOp {
            opcode: opcodes::DUP,
        });
        self.out.push(Insn::LdcString { value: message });
        self.out.push(Insn::Invoke {
            opcode: opcodes::INVOKESPECIAL,
            owner: exception_class.to_string(),
            name: CONSTRUCTOR_NAME.to_string(),
            descriptor: THROW_CTOR_DESC.to_string(),
            interface: false,
        });
        self.out.push(Insn::ZeroOp {
            opcode: opcodes::ATHROW,
        });
    }

    fn emit_logging(&mut self, logger: &str, message: String) {
        self.out.push(Insn::LdcString {
            value: logger.to_string(),
        });
        self.out.push(Insn::Invoke {
            opcode: opcodes::INVOKESTATIC,
            owner: LOGGER_FACTORY_CLASS.to_string(),
            name: "getLogger".to_string(),
            descriptor: GET_LOGGER_DESC.to_string(),
            interface: false,
        });
        self.out.push(Insn::LdcString { value: message });
        self.out.push(Insn::Invoke {
            opcode: opcodes::INVOKEINTERFACE,
            owner: LOGGER_CLASS.to_string(),
            name: "error".to_string(),
            descriptor: LOG_ERROR_DESC.to_string(),
            interface: true,
        });
    }

    fn null_argument_message(&self, declared_index: usize) -> String {
        let raw = declared_index + self.synthetic_count;
        let pname = self
            .parameter_names
            .as_ref()
            .and_then(|names| names.get(raw))
            .map(|name| format!(" (parameter '{name}')"))
            .unwrap_or_default();
        format!(
            "{} argument {}{} of {}.{} must not be null",
            self.cause.reason(),
            declared_index,
            pname,
            self.class.name,
            self.method.name
        )
    }

    fn null_return_message(&self) -> String {
        format!(
            "{} method {}.{} must not return null",
            self.cause.reason(),
            self.class.name,
            self.method.name
        )
    }

    fn mark_instrumented(&mut self) {
        self.instrumented = true;
        self.checks_emitted += 1;
    }

    fn validate_stream(&self) -> Result<()> {
        let defined: HashSet<Label> = self
            .out
            .iter()
            .filter_map(|insn| match insn {
                Insn::Mark { label } => Some(*label),
                _ => None,
            })
            .collect();
        for insn in &self.out {
            if let Insn::Jump { target, .. } = insn {
                if !defined.contains(target) {
                    bail!("branch target {target} is not defined");
                }
            }
        }

        // The frame covers the argument slots plus whatever the body itself
        // allocates through stores; loads outside it are malformed.
        let mut frame: u16 = if self.method.is_static() { 0 } else { 1 };
        for arg in &self.method.signature.args {
            frame += arg.width();
        }
        for insn in &self.out {
            if let Insn::Var { opcode, var } = insn {
                if opcodes::is_local_store(*opcode) {
                    frame = frame.max(*var + opcodes::local_width(*opcode));
                }
            }
        }
        for insn in &self.out {
            if let Insn::Var { opcode, var } = insn {
                if opcodes::is_local_load(*opcode) && *var + opcodes::local_width(*opcode) > frame
                {
                    bail!("local variable {var} is out of range for the computed frame ({frame} slots)");
                }
            }
        }
        Ok(())
    }
}
