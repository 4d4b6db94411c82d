use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::instrument::{
    AnnotationCause, CheckMode, ClassContext, MethodContext, NullPolicy, TransformerBuilder,
};
use crate::ir::MethodBody;
use crate::rewrite::rewrite_method;

/// One batch of extracted method streams, as produced by the surrounding
/// build-plugin driver. The same shape is used for input and output; the
/// output additionally carries the per-method `instrumented` flag.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Batch {
    pub classes: Vec<ClassRecord>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClassRecord {
    pub name: String,
    #[serde(default)]
    pub is_enum: bool,
    #[serde(default)]
    pub is_anonymous: Option<bool>,
    pub methods: Vec<MethodRecord>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MethodRecord {
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub access: u16,
    /// Declared parameter indices requiring a not-null check.
    #[serde(default)]
    pub not_null_params: Vec<usize>,
    #[serde(default)]
    pub not_null_return: bool,
    /// Declared names at raw indices, present only for classes compiled
    /// with name-retention metadata.
    #[serde(default)]
    pub parameter_names: Vec<String>,
    /// Implicit leading parameters beyond the constructor rules, e.g. an
    /// inner-class outer-instance capture.
    #[serde(default)]
    pub extra_synthetic_params: u32,
    #[serde(default)]
    pub body: MethodBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumented: Option<bool>,
}

/// Weaving configuration shared by every method of a batch.
#[derive(Clone, Debug)]
pub struct WeaveOptions {
    pub mode: CheckMode,
    pub policy: NullPolicy,
    pub cause: String,
}

/// Totals reported after a batch run.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeaveSummary {
    pub methods_seen: usize,
    pub methods_instrumented: usize,
    pub checks_emitted: u64,
}

/// Apply the engine to every method of the batch. Each method gets a fresh
/// transformer; nothing is shared across traversals.
pub fn apply_batch(mut batch: Batch, options: &WeaveOptions) -> Result<(Batch, WeaveSummary)> {
    let mut summary = WeaveSummary::default();

    for class in &mut batch.classes {
        let class_context = ClassContext {
            name: class.name.clone(),
            is_enum: class.is_enum,
            is_anonymous: class.is_anonymous,
        };
        for method in &mut class.methods {
            let (instrumented, checks) = weave_one(&class_context, method, options)
                .with_context(|| format!("failed to weave {}.{}", class.name, method.name))?;
            summary.methods_seen += 1;
            summary.checks_emitted += u64::from(checks);
            if instrumented {
                summary.methods_instrumented += 1;
            }
        }
    }

    Ok((batch, summary))
}

fn weave_one(
    class: &ClassContext,
    method: &mut MethodRecord,
    options: &WeaveOptions,
) -> Result<(bool, u32)> {
    let context = MethodContext::new(&method.name, method.access, &method.descriptor)?;
    let mut builder = TransformerBuilder::new(
        class.clone(),
        context,
        options.mode,
        options.policy.clone(),
        Box::new(AnnotationCause(options.cause.clone())),
    );
    for _ in 0..method.extra_synthetic_params {
        builder.increase_synthetic_count();
    }
    for declared in &method.not_null_params {
        builder.require_param(*declared);
    }
    if method.not_null_return {
        builder.require_return();
    }

    let outcome = rewrite_method(builder, &method.parameter_names, &method.body)?;
    method.body = outcome.body;
    method.instrumented = Some(outcome.instrumented);
    Ok((outcome.instrumented, outcome.checks_emitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Insn;
    use crate::opcodes;

    fn sample_batch() -> Batch {
        serde_json::from_str(
            r#"{
              "classes": [
                {
                  "name": "com/acme/Owner",
                  "methods": [
                    {
                      "name": "foo",
                      "descriptor": "(Ljava/lang/String;)V",
                      "access": 8,
                      "not_null_params": [0],
                      "parameter_names": ["input"],
                      "body": [
                        {"insn": "zero_op", "opcode": 177}
                      ]
                    },
                    {
                      "name": "untouched",
                      "descriptor": "()V",
                      "access": 8,
                      "body": [
                        {"insn": "zero_op", "opcode": 177}
                      ]
                    }
                  ]
                }
              ]
            }"#,
        )
        .expect("parse sample batch")
    }

    fn throwing_options() -> WeaveOptions {
        WeaveOptions {
            mode: CheckMode::Inline,
            policy: NullPolicy::Throw,
            cause: "NotNull".to_string(),
        }
    }

    #[test]
    fn batch_application_marks_methods_and_counts() {
        let (woven, summary) =
            apply_batch(sample_batch(), &throwing_options()).expect("apply batch");

        assert_eq!(summary.methods_seen, 2);
        assert_eq!(summary.methods_instrumented, 1);
        assert_eq!(summary.checks_emitted, 1);

        let foo = &woven.classes[0].methods[0];
        assert_eq!(foo.instrumented, Some(true));
        assert!(foo.body.insns.contains(&Insn::LdcString {
            value:
                "NotNull argument 0 (parameter 'input') of com/acme/Owner.foo must not be null"
                    .to_string(),
        }));

        let untouched = &woven.classes[0].methods[1];
        assert_eq!(untouched.instrumented, Some(false));
        assert_eq!(
            untouched.body.insns,
            vec![Insn::ZeroOp {
                opcode: opcodes::RETURN
            }]
        );
    }

    #[test]
    fn weave_failure_names_class_and_method() {
        let mut batch = sample_batch();
        batch.classes[0].methods[0].not_null_params = vec![9];

        let err = apply_batch(batch, &throwing_options()).expect_err("apply must fail");
        assert!(format!("{err:#}").contains("failed to weave com/acme/Owner.foo"));
    }

    #[test]
    fn output_round_trips_through_json() {
        let (woven, _) = apply_batch(sample_batch(), &throwing_options()).expect("apply batch");

        let text = serde_json::to_string(&woven).expect("serialize batch");
        let back: Batch = serde_json::from_str(&text).expect("reparse batch");

        assert_eq!(
            back.classes[0].methods[0].body,
            woven.classes[0].methods[0].body
        );
        assert_eq!(back.classes[0].methods[0].instrumented, Some(true));
    }
}
