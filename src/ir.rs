use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque branch target inside a method body.
///
/// Labels are plain identifiers; the allocator hands out fresh ones seeded
/// past the highest identifier already present in a body, so inserted labels
/// never collide with existing ones.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Generator for fresh labels.
#[derive(Clone, Debug)]
pub struct LabelAlloc(u32);

impl LabelAlloc {
    /// Allocator whose first label comes after `highest`, or `l0` when the
    /// body carries no labels at all.
    pub fn starting_after(highest: Option<Label>) -> LabelAlloc {
        LabelAlloc(highest.map_or(0, |label| label.0 + 1))
    }

    pub fn fresh(&mut self) -> Label {
        let label = Label(self.0);
        self.0 += 1;
        label
    }
}

/// One instruction of the abstract method-body stream.
///
/// Only the shapes the weaving engine reasons about are modeled; everything
/// else travels through as [`Insn::Other`] and is preserved untouched.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "insn", rename_all = "snake_case")]
pub enum Insn {
    /// Zero-operand instruction (returns, `dup`, `athrow`, ...).
    ZeroOp { opcode: u8 },
    /// Local-variable load or store.
    Var { opcode: u8, var: u16 },
    /// Method invocation.
    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        #[serde(default)]
        interface: bool,
    },
    /// Instruction with a type operand (`new`, `checkcast`, ...).
    TypeOp { opcode: u8, ty: String },
    /// String constant load.
    LdcString { value: String },
    /// Conditional or unconditional branch.
    Jump { opcode: u8, target: Label },
    /// Label definition marking the next instruction.
    Mark { label: Label },
    /// Opaque passthrough for instructions the engine does not model.
    Other { opcode: u8 },
}

/// Instruction stream of a single method body.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MethodBody {
    pub insns: Vec<Insn>,
}

impl MethodBody {
    pub fn new(insns: Vec<Insn>) -> MethodBody {
        MethodBody { insns }
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Highest label mentioned anywhere in the body, whether defined or
    /// only targeted.
    pub fn max_label(&self) -> Option<Label> {
        self.insns
            .iter()
            .filter_map(|insn| match insn {
                Insn::Jump { target, .. } => Some(*target),
                Insn::Mark { label } => Some(*label),
                _ => None,
            })
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes;

    #[test]
    fn label_alloc_starts_past_existing_labels() {
        let body = MethodBody::new(vec![
            Insn::Jump {
                opcode: opcodes::GOTO,
                target: Label(4),
            },
            Insn::Mark { label: Label(2) },
            Insn::Mark { label: Label(4) },
            Insn::ZeroOp {
                opcode: opcodes::RETURN,
            },
        ]);

        let mut alloc = LabelAlloc::starting_after(body.max_label());

        assert_eq!(alloc.fresh(), Label(5));
        assert_eq!(alloc.fresh(), Label(6));
    }

    #[test]
    fn label_alloc_starts_at_zero_for_unlabeled_body() {
        let body = MethodBody::new(vec![Insn::ZeroOp {
            opcode: opcodes::RETURN,
        }]);

        let mut alloc = LabelAlloc::starting_after(body.max_label());

        assert_eq!(alloc.fresh(), Label(0));
    }

    #[test]
    fn insn_serde_shape_is_tagged() {
        let insn = Insn::Invoke {
            opcode: opcodes::INVOKESTATIC,
            owner: "java/util/Objects".to_string(),
            name: "requireNonNull".to_string(),
            descriptor: "(Ljava/lang/Object;)Ljava/lang/Object;".to_string(),
            interface: false,
        };

        let value = serde_json::to_value(&insn).expect("serialize insn");

        assert_eq!(value["insn"], "invoke");
        assert_eq!(value["owner"], "java/util/Objects");

        let back: Insn = serde_json::from_value(value).expect("deserialize insn");
        assert_eq!(back, insn);
    }

    #[test]
    fn interface_flag_defaults_to_false() {
        let parsed: Insn = serde_json::from_str(
            r#"{"insn":"invoke","opcode":184,"owner":"o","name":"n","descriptor":"()V"}"#,
        )
        .expect("deserialize invoke");

        match parsed {
            Insn::Invoke { interface, .. } => assert!(!interface),
            other => panic!("unexpected insn {other:?}"),
        }
    }
}
