//! Source breakpoints and their lazily compiled conditions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use refract_expr::ExpressionCompiler;
use refract_introspect::IntrospectionResult;
use refract_vm::{TextureSampler, VmSession};
use tracing::{debug, warn};

use crate::eval::PreparedExpression;

/// Registry key: absolute file path and 1-based line.
pub type BreakpointKey = (PathBuf, u32);

/// Absolute form of `path`, without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Debug, Default)]
enum ConditionState {
    /// Not compiled yet, or invalidated by an edit.
    #[default]
    Pending,
    Ready(Arc<PreparedExpression>),
    /// The condition does not compile; the breakpoint never triggers.
    Failed,
}

/// A line breakpoint, optionally guarded by a condition expression.
#[derive(Debug)]
pub struct Breakpoint {
    pub file: PathBuf,
    pub line: u32,
    pub enabled: bool,
    condition: Option<String>,
    state: ConditionState,
    diagnostic: Option<String>,
}

impl Breakpoint {
    pub(crate) fn new(file: PathBuf, line: u32, condition: Option<String>) -> Self {
        Self {
            file,
            line,
            enabled: true,
            condition: condition.filter(|c| !c.trim().is_empty()),
            state: ConditionState::Pending,
            diagnostic: None,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Why the condition last failed to compile or evaluate.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Whether the condition has been compiled since it was last edited.
    pub fn is_compiled(&self) -> bool {
        matches!(self.state, ConditionState::Ready(_))
    }

    pub(crate) fn set_condition(&mut self, condition: Option<String>) {
        self.condition = condition.filter(|c| !c.trim().is_empty());
        self.invalidate();
    }

    pub(crate) fn invalidate(&mut self) {
        self.state = ConditionState::Pending;
        self.diagnostic = None;
    }

    /// Whether execution should stop here given the state of `vm`.
    ///
    /// A condition that fails to compile or evaluate counts as false and
    /// leaves a diagnostic on the breakpoint.
    pub(crate) fn should_stop(&mut self, ctx: &mut ConditionContext<'_>) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(condition) = self.condition.clone() else {
            return true;
        };
        if matches!(self.state, ConditionState::Pending) {
            self.compile(&condition, ctx);
        }
        let ConditionState::Ready(prepared) = &self.state else {
            return false;
        };
        match prepared.evaluate(ctx.vm, ctx.sampler.clone(), ctx.limit) {
            Ok(result) => {
                self.diagnostic = None;
                result.value.truthy()
            }
            Err(err) => {
                warn!(line = self.line, %condition, %err, "breakpoint condition failed");
                self.diagnostic = Some(err.to_string());
                false
            }
        }
    }

    fn compile(&mut self, condition: &str, ctx: &mut ConditionContext<'_>) {
        let info = ctx.info;
        let function = info.function_at_line(self.line).map(|f| f.name.as_str());
        let prepared = ctx
            .compiler
            .compile(condition, function)
            .map_err(|e| e.to_string())
            .and_then(|_| {
                ctx.compiler
                    .compiled()
                    .cloned()
                    .ok_or_else(|| "no compiled expression".to_string())
            })
            .and_then(|c| PreparedExpression::new(c).map_err(|e| e.to_string()));
        match prepared {
            Ok(prepared) => {
                debug!(line = self.line, condition, "breakpoint condition compiled");
                self.state = ConditionState::Ready(Arc::new(prepared));
                self.diagnostic = None;
            }
            Err(message) => {
                warn!(line = self.line, condition, %message, "breakpoint condition does not compile");
                self.state = ConditionState::Failed;
                self.diagnostic = Some(message);
            }
        }
    }
}

/// What condition evaluation borrows from the session.
pub(crate) struct ConditionContext<'a> {
    pub(crate) compiler: &'a mut ExpressionCompiler,
    pub(crate) info: &'a IntrospectionResult,
    pub(crate) vm: &'a VmSession,
    pub(crate) sampler: Option<Arc<dyn TextureSampler>>,
    pub(crate) limit: u64,
}

/// Breakpoints in insertion order.
#[derive(Debug, Default)]
pub struct Breakpoints {
    entries: IndexMap<BreakpointKey, Breakpoint>,
}

impl Breakpoints {
    /// Insert a breakpoint. Returns `false` if one already exists there.
    pub(crate) fn add(&mut self, file: &Path, line: u32, condition: Option<String>) -> bool {
        let file = normalize_path(file);
        let key = (file.clone(), line);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Breakpoint::new(file, line, condition));
        true
    }

    pub(crate) fn remove(&mut self, file: &Path, line: u32) -> bool {
        self.entries
            .shift_remove(&(normalize_path(file), line))
            .is_some()
    }

    /// Re-key a breakpoint. Its condition is kept but recompiled on next use.
    pub(crate) fn relocate(&mut self, file: &Path, line: u32, new_file: &Path, new_line: u32) -> bool {
        let new_key = (normalize_path(new_file), new_line);
        if self.entries.contains_key(&new_key) {
            return false;
        }
        let Some(mut bp) = self.entries.shift_remove(&(normalize_path(file), line)) else {
            return false;
        };
        bp.file = new_key.0.clone();
        bp.line = new_line;
        bp.invalidate();
        self.entries.insert(new_key, bp);
        true
    }

    pub(crate) fn get_mut(&mut self, file: &Path, line: u32) -> Option<&mut Breakpoint> {
        self.entries.get_mut(&(normalize_path(file), line))
    }

    pub fn get(&self, file: &Path, line: u32) -> Option<&Breakpoint> {
        self.entries.get(&(normalize_path(file), line))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop compiled conditions, e.g. after the module changed.
    pub(crate) fn invalidate_all(&mut self) {
        for bp in self.entries.values_mut() {
            bp.invalidate();
        }
    }

    /// Breakpoints at `line`: the one in `file`, or every file's when the
    /// module carries no file name.
    pub(crate) fn at_line_mut<'a>(
        &'a mut self,
        file: Option<&Path>,
        line: u32,
    ) -> Box<dyn Iterator<Item = &'a mut Breakpoint> + 'a> {
        match file {
            Some(file) => Box::new(self.entries.get_mut(&(normalize_path(file), line)).into_iter()),
            None => Box::new(self.entries.values_mut().filter(move |bp| bp.line == line)),
        }
    }

    pub(crate) fn has_line(&self, line: u32) -> bool {
        self.entries.values().any(|bp| bp.line == line)
    }
}
