use anyhow::Result;
use log::debug;

use crate::instrument::{NotNullTransformer, TransformerBuilder};
use crate::ir::{LabelAlloc, MethodBody};

/// Result of one method traversal.
#[derive(Clone, Debug)]
pub struct RewriteOutcome {
    pub body: MethodBody,
    pub instrumented: bool,
    pub checks_emitted: u32,
}

/// Drive one linear pass of the engine over a method body.
///
/// Parameter names, when present, are declared through the dedicated hook
/// during traversal; they are never available up front. Methods without a
/// body (abstract, native) pass through untouched.
pub fn rewrite_method(
    builder: TransformerBuilder,
    parameter_names: &[String],
    body: &MethodBody,
) -> Result<RewriteOutcome> {
    if body.is_empty() {
        return Ok(RewriteOutcome {
            body: body.clone(),
            instrumented: false,
            checks_emitted: 0,
        });
    }

    let labels = LabelAlloc::starting_after(body.max_label());
    let mut transformer: NotNullTransformer = builder.build(labels)?;

    for name in parameter_names {
        transformer.on_parameter_name(name);
    }
    transformer.on_body_start()?;
    for insn in &body.insns {
        transformer.on_insn(insn)?;
    }
    transformer.on_finalize()?;

    let instrumented = transformer.has_instrumented();
    let checks_emitted = transformer.checks_emitted();
    if instrumented {
        debug!("emitted {checks_emitted} not-null check(s)");
    }
    Ok(RewriteOutcome {
        body: MethodBody::new(transformer.into_insns()),
        instrumented,
        checks_emitted,
    })
}
