//! Running compiled expressions next to a live invocation.
//!
//! The compiled module extends the stage module, so every global id of the
//! stage is valid in it. Evaluation copies the stage's globals and the
//! captured locals into a private VM; the invocation being debugged is only
//! read.

use std::sync::Arc;

use refract_expr::CompiledExpression;
use refract_vm::{Program, StepEvent, TextureSampler, Value, VmSession};

use crate::error::{DebugError, Result};
use crate::printer::format_value;

/// Result of an immediate or watch evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedValue {
    pub value: Value,
    /// Type id in the compiled expression module.
    pub type_id: u32,
    /// Pretty-printed `value`.
    pub text: String,
}

/// A compiled expression with its decoded program, ready to run many times.
#[derive(Debug)]
pub(crate) struct PreparedExpression {
    compiled: CompiledExpression,
    program: Arc<Program>,
}

impl PreparedExpression {
    pub(crate) fn new(compiled: CompiledExpression) -> Result<Self> {
        let program = Arc::new(Program::new(&compiled.words)?);
        Ok(Self { compiled, program })
    }

    /// Evaluate against the current state of `source`.
    pub(crate) fn evaluate(
        &self,
        source: &VmSession,
        sampler: Option<Arc<dyn TextureSampler>>,
        limit: u64,
    ) -> Result<EvaluatedValue> {
        let mut vm = VmSession::new(Arc::clone(&self.program));
        vm.set_instruction_limit(limit);
        if let Some(sampler) = sampler {
            vm.set_sampler(sampler);
        }
        for global in source.program().globals() {
            if let Some(value) = source.global(global.id) {
                vm.set_global(global.id, value.clone());
            }
        }
        for capture in &self.compiled.captures {
            let (_, value) = source
                .variable(&capture.name)
                .ok_or_else(|| DebugError::Unavailable(capture.name.clone()))?;
            vm.set_global(capture.global, value);
        }

        vm.start(self.compiled.function, Vec::new())?;
        let event = vm.run()?;
        if event != StepEvent::Finished {
            return Err(DebugError::Unfinished(event));
        }
        let value = vm
            .global(self.compiled.result)
            .cloned()
            .unwrap_or_default();
        Ok(EvaluatedValue {
            text: format_value(&self.program, self.compiled.result_type, &value),
            type_id: self.compiled.result_type,
            value,
        })
    }
}
