//! The stage-aware debug session.
//!
//! A session binds one stage module at a time. [`prepare_stage`] decodes the
//! module into a template VM with uniforms already copied in; every
//! invocation, interactive or not, starts from a clone of that template.
//!
//! Two ways to run:
//!
//! - `execute_*` runs one invocation to completion and returns its outputs.
//! - `step*`, [`continue_execution`] and [`jump`] drive a single interactive
//!   invocation that can be paused, inspected and resumed.
//!
//! [`prepare_stage`]: DebugSession::prepare_stage
//! [`continue_execution`]: DebugSession::continue_execution
//! [`jump`]: DebugSession::jump

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use refract_expr::{CompileError, ExpressionCompiler};
use refract_introspect::{BytecodeIntrospector, IntrospectionResult};
use refract_spirv::{BuiltIn, ExecutionMode, StorageClass, TypeDesc};
use refract_vm::{
    CallFrame, Program, StepEvent, Status, TextureSampler, UbEvent, UndefinedBehavior, Value,
    VmSession,
};
use tracing::{debug, info, trace, warn};

use crate::breakpoint::{Breakpoints, ConditionContext};
use crate::config::{ClipDepth, SessionConfig};
use crate::error::{DebugError, Result};
use crate::eval::{EvaluatedValue, PreparedExpression};
use crate::inputs::{
    read_builtin, read_frag_depth, read_patch_outputs, read_pixel_color, read_vertex_output,
    write_builtin, write_compute_ids, write_pixel_input, write_vertex_array, write_vertex_input,
    ComputeIds, PixelInput, VertexInput, VertexOutput,
};
use crate::printer::{color_preview, format_value};
use crate::provider::{BindingProvider, ProviderSampler};
use crate::sample::PixelSample;
use crate::stage::{SessionState, ShaderStage};
use crate::watch::WatchExpression;
use crate::workgroup::{run_workgroup, ComputeResult};

/// Outcome of one pixel invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelResult {
    /// Output location 0 as RGBA.
    pub color: [f32; 4],
    /// `gl_FragDepth` when written, otherwise the interpolated window depth.
    pub depth: f32,
    /// Killed, demoted, out of instructions or faulted.
    pub discarded: bool,
    /// Instructions executed by the invocation.
    pub instruction_count: u64,
    /// Last undefined behavior of this invocation.
    pub ub: Option<UbEvent>,
    /// Undefined behavior events of this invocation, `ub` included.
    pub ub_count: u32,
    /// Set by breakpoint-aware runs when a breakpoint triggered.
    pub breakpoint_hit: bool,
}

/// Primitives emitted by a geometry invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryOutput {
    /// Vertices of each primitive closed by `EndPrimitive` or by returning.
    pub primitives: Vec<Vec<VertexOutput>>,
}

/// Output patch of a tessellation control stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TessellationOutput {
    /// One entry per output vertex; arrayed outputs are split per vertex.
    pub vertices: Vec<VertexOutput>,
    /// `gl_TessLevelOuter`.
    pub outer: Vec<f32>,
    /// `gl_TessLevelInner`.
    pub inner: Vec<f32>,
}

/// A named variable with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub name: String,
    /// Declared type in the prepared module.
    pub type_id: u32,
    pub value: Value,
    /// `value` pretty-printed for display.
    pub text: String,
}

/// Undefined behavior recorded since the last read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UbSummary {
    /// Events seen, including repeats.
    pub count: u32,
    /// Most recent event.
    pub last: Option<UbEvent>,
}

/// The prepared stage.
struct Bound {
    stage: ShaderStage,
    program: Arc<Program>,
    entry: u32,
    template: VmSession,
    sampler: Arc<dyn TextureSampler>,
}

/// Debugger state for one shader stage at a time.
pub struct DebugSession {
    config: SessionConfig,
    state: SessionState,
    introspector: BytecodeIntrospector,
    compiler: ExpressionCompiler,
    bound: Option<Bound>,
    /// Invocation with inputs applied, not started yet.
    pending: Option<VmSession>,
    pending_depth: f32,
    /// The interactive invocation, or the last one executed.
    active: Option<VmSession>,
    /// `active` as it was when it started; backward jumps restart from here.
    entry_snapshot: Option<VmSession>,
    /// Invocation state at the first breakpoint of a breakpoint-aware run.
    breakpoint_snapshot: Option<VmSession>,
    compute: ComputeIds,
    breakpoints: Breakpoints,
    watches: Vec<WatchExpression>,
    ub: UbSummary,
    last_instruction_count: u64,
    diagnostic: Option<String>,
}

impl fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSession")
            .field("state", &self.state)
            .field("stage", &self.stage())
            .field("breakpoints", &self.breakpoints.len())
            .field("watches", &self.watches.len())
            .finish_non_exhaustive()
    }
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl DebugSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            introspector: BytecodeIntrospector::new(),
            compiler: ExpressionCompiler::new(),
            bound: None,
            pending: None,
            pending_depth: 0.0,
            active: None,
            entry_snapshot: None,
            breakpoint_snapshot: None,
            compute: ComputeIds {
                local: [0; 3],
                workgroup: [0; 3],
                num_workgroups: [1; 3],
                size: [1; 3],
            },
            breakpoints: Breakpoints::default(),
            watches: Vec::new(),
            ub: UbSummary::default(),
            last_instruction_count: 0,
            diagnostic: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stage(&self) -> Option<ShaderStage> {
        self.bound.as_ref().map(|b| b.stage)
    }

    pub fn program(&self) -> Option<&Arc<Program>> {
        self.bound.as_ref().map(|b| &b.program)
    }

    /// Metadata of the prepared module. Empty before the first prepare.
    pub fn introspection(&self) -> &IntrospectionResult {
        self.introspector.result()
    }

    /// Why the last immediate evaluation failed.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    fn is_interactive(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Suspended)
    }

    // ========================================================================
    // Preparation
    // ========================================================================

    /// Bind `module` for `stage`.
    ///
    /// Builds the template VM, copies uniforms and storage buffers from
    /// `bindings`, and for pixel stages applies `pixel_sample`'s inputs so the
    /// sample can be re-run or stepped. Fails while an interactive invocation
    /// is live; on any failure the session is left `Idle`.
    pub fn prepare_stage(
        &mut self,
        stage: ShaderStage,
        module: &[u32],
        bindings: Arc<dyn BindingProvider>,
        pixel_sample: Option<&PixelSample>,
    ) -> Result<()> {
        if self.is_interactive() {
            return Err(DebugError::Busy(self.state));
        }
        self.reset();

        self.introspector.parse(module, self.config.trim_function_names)?;
        let program = Arc::new(Program::new(module)?);
        let entry = program
            .entry_point(Some(stage.execution_model()))
            .ok_or(DebugError::MissingEntryPoint(stage))?;
        self.compiler.set_module(module)?;
        self.breakpoints.invalidate_all();

        let sampler: Arc<dyn TextureSampler> = Arc::new(ProviderSampler(Arc::clone(&bindings)));
        let mut template = VmSession::new(Arc::clone(&program));
        template.set_instruction_limit(self.config.max_instructions);
        template.set_sampler(Arc::clone(&sampler));
        let copied = copy_bindings(&mut template, bindings.as_ref());

        self.compute = ComputeIds {
            local: [0; 3],
            workgroup: [0; 3],
            num_workgroups: [1; 3],
            size: program.local_size(entry),
        };
        self.bound = Some(Bound {
            stage,
            program,
            entry,
            template,
            sampler,
        });
        self.state = SessionState::Prepared;
        info!(%stage, entry, copied, "stage prepared");

        if stage == ShaderStage::Pixel {
            if let Some(input) = pixel_sample.and_then(PixelSample::pixel_input) {
                self.set_pixel_shader_input(&input);
            }
        }
        Ok(())
    }

    /// Unbind the stage and drop every invocation. Breakpoints and watches
    /// are kept.
    pub fn reset(&mut self) {
        self.bound = None;
        self.pending = None;
        self.active = None;
        self.entry_snapshot = None;
        self.breakpoint_snapshot = None;
        self.ub = UbSummary::default();
        self.last_instruction_count = 0;
        self.state = SessionState::Idle;
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Fresh invocation for `stage`, replacing any pending one.
    fn fresh_invocation(&mut self, stage: ShaderStage) -> Option<&mut VmSession> {
        if self.is_interactive() {
            warn!(%stage, "inputs ignored while an invocation is live");
            return None;
        }
        let bound = self.bound.as_ref().filter(|b| b.stage == stage)?;
        self.pending = Some(bound.template.clone());
        self.state = SessionState::Prepared;
        self.pending.as_mut()
    }

    pub fn set_vertex_shader_input(&mut self, input: &VertexInput) -> bool {
        let Some(vm) = self.fresh_invocation(ShaderStage::Vertex) else {
            return false;
        };
        write_vertex_input(vm, input);
        true
    }

    /// Interpolate the triangle's varyings at `input` and bind them.
    /// Returns the pixel depth, or zero when no pixel stage is prepared.
    pub fn set_pixel_shader_input(&mut self, input: &PixelInput) -> f32 {
        let clip = self.config.clip_depth;
        let Some(vm) = self.fresh_invocation(ShaderStage::Pixel) else {
            return 0.0;
        };
        let depth = write_pixel_input(vm, input, clip);
        self.pending_depth = depth;
        depth
    }

    pub fn set_geometry_shader_input(&mut self, vertices: &[VertexOutput], primitive_id: u32) -> bool {
        let Some(vm) = self.fresh_invocation(ShaderStage::Geometry) else {
            return false;
        };
        write_vertex_array(vm, vertices);
        write_builtin(vm, StorageClass::Input, BuiltIn::PrimitiveId, &[primitive_id]);
        write_builtin(vm, StorageClass::Input, BuiltIn::InvocationId, &[0.0]);
        true
    }

    /// Bind the input patch. `invocation_id` selects the invocation that
    /// interactive stepping follows; execution runs all of them.
    pub fn set_tessellation_control_shader_input(&mut self, patch: &[VertexOutput], invocation_id: u32) -> bool {
        let Some(vm) = self.fresh_invocation(ShaderStage::TessellationControl) else {
            return false;
        };
        write_vertex_array(vm, patch);
        write_builtin(vm, StorageClass::Input, BuiltIn::InvocationId, &[invocation_id]);
        true
    }

    /// Select the workgroup to execute and the local invocation to step.
    pub fn set_compute_shader_input(
        &mut self,
        workgroup_id: [u32; 3],
        num_workgroups: [u32; 3],
        local_id: [u32; 3],
    ) -> bool {
        let size = self.compute.size;
        if (0..3).any(|i| local_id[i] >= size[i]) {
            warn!(?local_id, ?size, "local invocation outside the workgroup");
            return false;
        }
        let ids = ComputeIds {
            local: local_id,
            workgroup: workgroup_id,
            num_workgroups,
            size,
        };
        let Some(vm) = self.fresh_invocation(ShaderStage::Compute) else {
            return false;
        };
        write_compute_ids(vm, &ids);
        self.compute = ids;
        true
    }

    // ========================================================================
    // Run to completion
    // ========================================================================

    /// Started invocation for `stage`: the pending one, or a clean template.
    fn take_for_execute(&mut self, stage: ShaderStage) -> Option<VmSession> {
        if self.is_interactive() {
            warn!(%stage, "cannot execute while an invocation is live");
            return None;
        }
        let bound = self.bound.as_ref().filter(|b| b.stage == stage)?;
        let mut vm = self.pending.take().unwrap_or_else(|| bound.template.clone());
        if let Err(err) = vm.start(bound.entry, Vec::new()) {
            warn!(%stage, %err, "invocation failed to start");
            return None;
        }
        Some(vm)
    }

    /// Run `vm` until it ends, reporting every yielding event to `on_event`.
    ///
    /// With `watch_breakpoints`, the first triggered breakpoint snapshots the
    /// invocation and execution carries on. Returns whether one triggered.
    fn drive(
        &mut self,
        vm: &mut VmSession,
        watch_breakpoints: bool,
        mut on_event: impl FnMut(&VmSession, StepEvent),
    ) -> bool {
        let mut hit = false;
        let mut last_line = None;
        while vm.is_running() {
            let event = if watch_breakpoints && !hit {
                let line = vm.current_line();
                if line != last_line {
                    last_line = line;
                    if let Some(line) = line {
                        if self.breakpoint_triggers(vm, line) {
                            hit = true;
                            self.breakpoint_snapshot = Some(vm.clone());
                        }
                    }
                }
                vm.step()
            } else {
                vm.run()
            };
            match event {
                Ok(event) => on_event(vm, event),
                Err(err) => {
                    warn!(%err, line = vm.current_line(), "invocation faulted");
                    break;
                }
            }
        }
        for event in vm.drain_undefined_behavior() {
            self.on_undefined_behavior(event.kind, event.line);
        }
        self.last_instruction_count = vm.executed();
        hit
    }

    /// Keep `vm` for inspection and carry its storage writes forward.
    fn finish_execute(&mut self, vm: VmSession) {
        if self.config.write_back_storage {
            if let Some(bound) = self.bound.as_mut() {
                for (id, value) in vm.globals_in(StorageClass::StorageBuffer) {
                    bound.template.set_global(id, value);
                }
            }
        }
        self.active = Some(vm);
    }

    pub fn execute_vertex_shader(&mut self) -> Option<VertexOutput> {
        let mut vm = self.take_for_execute(ShaderStage::Vertex)?;
        self.drive(&mut vm, false, |_, _| {});
        let output = (vm.status() == Status::Finished).then(|| read_vertex_output(&vm));
        self.finish_execute(vm);
        output
    }

    /// Run the pixel bound by the last input setter.
    ///
    /// Undefined behavior is reset per pixel and reported in the result.
    pub fn execute_pixel_shader(&mut self) -> Option<PixelResult> {
        self.execute_pixel(false)
    }

    /// Like [`execute_pixel_shader`](Self::execute_pixel_shader), but checks
    /// breakpoints on every line. A hit snapshots the invocation (see
    /// [`take_breakpoint_snapshot`](Self::take_breakpoint_snapshot)) without
    /// pausing it.
    pub fn execute_pixel_shader_with_breakpoints(&mut self) -> Option<PixelResult> {
        self.execute_pixel(true)
    }

    fn execute_pixel(&mut self, watch_breakpoints: bool) -> Option<PixelResult> {
        let depth = self.pending_depth;
        let mut vm = self.take_for_execute(ShaderStage::Pixel)?;
        self.ub = UbSummary::default();
        let breakpoint_hit = self.drive(&mut vm, watch_breakpoints, |_, _| {});
        let discarded = vm.status() != Status::Finished || vm.demoted();
        let result = PixelResult {
            color: read_pixel_color(&vm),
            depth: read_frag_depth(&vm).unwrap_or(depth),
            discarded,
            instruction_count: vm.executed(),
            ub: self.ub.last,
            ub_count: self.ub.count,
            breakpoint_hit,
        };
        trace!(
            discarded,
            instructions = result.instruction_count,
            ub = result.ub_count,
            "pixel executed"
        );
        self.finish_execute(vm);
        Some(result)
    }

    /// Run the geometry stage, collecting a primitive per `EndPrimitive`.
    pub fn execute_geometry_shader(&mut self) -> Option<GeometryOutput> {
        let mut vm = self.take_for_execute(ShaderStage::Geometry)?;
        let mut primitives = Vec::new();
        let mut current = Vec::new();
        self.drive(&mut vm, false, |vm, event| match event {
            StepEvent::EmitVertex => current.push(read_vertex_output(vm)),
            StepEvent::EndPrimitive if !current.is_empty() => {
                primitives.push(std::mem::take(&mut current));
            }
            _ => {}
        });
        if !current.is_empty() {
            primitives.push(current);
        }
        debug!(primitives = primitives.len(), "geometry executed");
        self.finish_execute(vm);
        Some(GeometryOutput { primitives })
    }

    /// Run every output-vertex invocation of the patch in order. Outputs
    /// written by one invocation are visible to the next.
    pub fn execute_tessellation_control_shader(&mut self) -> Option<TessellationOutput> {
        if self.is_interactive() {
            return None;
        }
        let bound = self
            .bound
            .as_ref()
            .filter(|b| b.stage == ShaderStage::TessellationControl)?;
        let program = Arc::clone(&bound.program);
        let entry = bound.entry;
        let base = self.pending.take().unwrap_or_else(|| bound.template.clone());
        let count = program
            .execution_mode(entry, ExecutionMode::OutputVertices)
            .and_then(|literals| literals.first().copied())
            .unwrap_or(1)
            .max(1);

        let mut outputs: HashMap<u32, Value> = base.globals_in(StorageClass::Output).into_iter().collect();
        let mut last = None;
        for invocation in 0..count {
            let mut vm = base.clone();
            for (id, value) in &outputs {
                vm.set_global(*id, value.clone());
            }
            write_builtin(&mut vm, StorageClass::Input, BuiltIn::InvocationId, &[invocation]);
            if let Err(err) = vm.start(entry, Vec::new()) {
                warn!(invocation, %err, "tessellation invocation failed to start");
                continue;
            }
            self.drive(&mut vm, false, |_, _| {});
            outputs.extend(vm.globals_in(StorageClass::Output));
            last = Some(vm);
        }
        let mut vm = last?;
        for (id, value) in outputs {
            vm.set_global(id, value);
        }
        let levels = |builtin| {
            read_builtin(&vm, StorageClass::Output, builtin)
                .map(|v| v.to_f32s())
                .unwrap_or_default()
        };
        let output = TessellationOutput {
            vertices: read_patch_outputs(&vm, count),
            outer: levels(BuiltIn::TessLevelOuter),
            inner: levels(BuiltIn::TessLevelInner),
        };
        self.finish_execute(vm);
        Some(output)
    }

    /// Run the whole workgroup selected by
    /// [`set_compute_shader_input`](Self::set_compute_shader_input).
    ///
    /// Afterwards the selected local invocation is available for inspection.
    /// `None` when the workgroup has more than
    /// [`MAX_WORKGROUP_INVOCATIONS`](crate::MAX_WORKGROUP_INVOCATIONS).
    pub fn execute_compute_shader(&mut self) -> Option<ComputeResult> {
        if self.is_interactive() {
            return None;
        }
        let bound = self
            .bound
            .as_ref()
            .filter(|b| b.stage == ShaderStage::Compute)?;
        let ids = self.compute;
        let run = run_workgroup(&bound.template, bound.entry, ids, self.config.max_barrier_rounds)?;
        let program = Arc::clone(&bound.program);

        for event in &run.ub {
            self.on_undefined_behavior(event.kind, event.line);
        }
        if self.config.write_back_storage {
            if let Some(bound) = self.bound.as_mut() {
                for (id, value) in &run.memory {
                    if program.global(*id).map(|g| g.storage) == Some(StorageClass::StorageBuffer) {
                        bound.template.set_global(*id, value.clone());
                    }
                }
            }
        }
        let [x, y, z] = ids.local;
        let [sx, sy, _] = ids.size.map(u64::from);
        let index = (u64::from(z) * sy + u64::from(y)) * sx + u64::from(x);
        let mut selected = run.invocations.into_iter().nth(index as usize);
        if let Some(vm) = selected.as_mut() {
            for (id, value) in &run.memory {
                vm.set_global(*id, value.clone());
            }
        }
        self.active = selected;
        self.pending = None;
        self.last_instruction_count = run.result.instruction_count;
        Some(run.result)
    }

    /// Detached runner for re-executing pixels of the prepared pixel stage,
    /// one VM clone per call.
    pub fn pixel_runner(&self) -> Option<PixelRunner> {
        let bound = self
            .bound
            .as_ref()
            .filter(|b| b.stage == ShaderStage::Pixel)?;
        Some(PixelRunner {
            template: bound.template.clone(),
            entry: bound.entry,
            clip: self.config.clip_depth,
        })
    }

    /// Instructions executed by the last invocation or workgroup.
    pub fn last_instruction_count(&self) -> u64 {
        self.last_instruction_count
    }

    // ========================================================================
    // Interactive execution
    // ========================================================================

    /// Start the interactive invocation, paused before its first instruction.
    fn begin(&mut self) -> bool {
        if self.state != SessionState::Prepared {
            return self.is_interactive();
        }
        let Some(bound) = self.bound.as_ref() else {
            return false;
        };
        let mut vm = self.pending.take().unwrap_or_else(|| bound.template.clone());
        if let Err(err) = vm.start(bound.entry, Vec::new()) {
            warn!(%err, "invocation failed to start");
            return false;
        }
        info!(stage = %bound.stage, line = vm.current_line(), "invocation started");
        self.entry_snapshot = Some(vm.clone());
        self.active = Some(vm);
        self.ub = UbSummary::default();
        self.state = SessionState::Suspended;
        true
    }

    /// Run `f` on the interactive invocation and settle the state afterwards.
    fn with_active<R>(&mut self, f: impl FnOnce(&mut Self, &mut VmSession) -> R) -> Option<R> {
        if !self.is_interactive() {
            return None;
        }
        let mut vm = self.active.take()?;
        self.state = SessionState::Running;
        let result = f(self, &mut vm);
        self.state = if vm.is_running() {
            SessionState::Suspended
        } else {
            info!(status = ?vm.status(), "invocation stopped");
            SessionState::Stopped
        };
        self.active = Some(vm);
        Some(result)
    }

    /// Execute one instruction of `vm`, recording undefined behavior.
    fn advance(&mut self, vm: &mut VmSession) -> Option<StepEvent> {
        let result = vm.step();
        for event in vm.drain_undefined_behavior() {
            self.on_undefined_behavior(event.kind, event.line);
        }
        self.last_instruction_count = vm.executed();
        match result {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(%err, line = vm.current_line(), "invocation faulted");
                None
            }
        }
    }

    /// Run to the next source line at the same or a shallower call depth.
    ///
    /// On a prepared session this starts the invocation instead. Returns
    /// whether the invocation is still live.
    pub fn step(&mut self) -> bool {
        if self.state == SessionState::Prepared {
            return self.begin();
        }
        self.with_active(|s, vm| {
            let depth = vm.depth();
            let line = vm.current_line();
            while s.advance(vm).is_some() && vm.is_running() {
                if vm.depth() < depth || (vm.depth() == depth && vm.current_line() != line) {
                    break;
                }
            }
            vm.is_running()
        })
        .unwrap_or(false)
    }

    /// Execute a single VM instruction, entering calls.
    pub fn step_into(&mut self) -> bool {
        if self.state == SessionState::Prepared {
            return self.begin();
        }
        self.with_active(|s, vm| {
            s.advance(vm);
            vm.is_running()
        })
        .unwrap_or(false)
    }

    /// Run until the current function returns to its caller.
    pub fn step_out(&mut self) -> bool {
        if self.state == SessionState::Prepared {
            return self.begin();
        }
        self.with_active(|s, vm| {
            let depth = vm.depth();
            while vm.depth() >= depth && s.advance(vm).is_some() && vm.is_running() {}
            vm.is_running()
        })
        .unwrap_or(false)
    }

    /// Run until a breakpoint triggers or the invocation ends.
    ///
    /// Breakpoints are checked whenever execution enters a new line; the line
    /// the invocation is paused on does not trigger again. Returns whether a
    /// breakpoint was hit.
    pub fn continue_execution(&mut self) -> bool {
        let fresh = self.state == SessionState::Prepared;
        if fresh && !self.begin() {
            return false;
        }
        self.with_active(|s, vm| {
            let mut last_line = if fresh { None } else { vm.current_line() };
            while vm.is_running() {
                let line = vm.current_line();
                if line != last_line {
                    last_line = line;
                    if let Some(line) = line {
                        if s.breakpoint_triggers(vm, line) {
                            info!(line, "breakpoint hit");
                            return true;
                        }
                    }
                }
                if s.advance(vm).is_none() {
                    break;
                }
            }
            false
        })
        .unwrap_or(false)
    }

    /// Move execution to the start of `line`.
    ///
    /// Forward targets are reached by running. Earlier targets restore the
    /// entry snapshot and replay up to `line`, so memory written after that
    /// point is rolled back instead of written twice. Returns whether the
    /// invocation is paused on `line`.
    pub fn jump(&mut self, line: u32) -> bool {
        if self.state == SessionState::Prepared && !self.begin() {
            return false;
        }
        let current = self.current_line();
        if current == Some(line) {
            return true;
        }
        let rewind = current.is_some_and(|c| line < c);
        if rewind {
            let Some(snapshot) = self.entry_snapshot.clone() else {
                return false;
            };
            debug!(from = ?current, to = line, "rewinding to invocation entry");
            self.active = Some(snapshot);
            self.state = SessionState::Suspended;
        }
        self.with_active(|s, vm| {
            while vm.is_running() {
                if vm.current_line() == Some(line) {
                    return true;
                }
                if rewind {
                    // Replayed undefined behavior was already reported.
                    let replayed = vm.step();
                    vm.drain_undefined_behavior();
                    if replayed.is_err() {
                        break;
                    }
                } else if s.advance(vm).is_none() {
                    break;
                }
            }
            false
        })
        .unwrap_or(false)
    }

    /// End the interactive invocation. It stays available for inspection.
    pub fn stop(&mut self) {
        if self.is_interactive() {
            info!(line = self.current_line(), "invocation stopped by user");
            self.state = SessionState::Stopped;
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Run `f` on the invocation a user would inspect: the interactive or
    /// last executed one, else the pending one, else a clean template.
    fn with_inspected<R>(&mut self, f: impl FnOnce(&mut Self, &VmSession) -> R) -> Option<R> {
        if let Some(vm) = self.active.take() {
            let result = f(self, &vm);
            self.active = Some(vm);
            return Some(result);
        }
        if let Some(vm) = self.pending.take() {
            let result = f(self, &vm);
            self.pending = Some(vm);
            return Some(result);
        }
        let vm = self.bound.as_ref()?.template.clone();
        Some(f(self, &vm))
    }

    fn inspected(&self) -> Option<&VmSession> {
        self.active.as_ref().or(self.pending.as_ref())
    }

    pub fn current_line(&self) -> Option<u32> {
        self.active.as_ref()?.current_line()
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        self.active.as_ref()?.current_file().map(PathBuf::from)
    }

    /// Call frames of the interactive invocation, outermost first.
    pub fn call_stack(&self) -> Vec<CallFrame> {
        let Some(vm) = self.active.as_ref() else {
            return Vec::new();
        };
        let trim = self.config.trim_function_names;
        vm.call_stack()
            .into_iter()
            .map(|mut frame| {
                if trim {
                    frame.name = frame
                        .name
                        .map(|n| n.split('(').next().unwrap_or(&n).to_string());
                }
                frame
            })
            .collect()
    }

    /// Arguments and locals of the innermost frame.
    pub fn local_variables(&self) -> Vec<VariableValue> {
        let Some(vm) = self.inspected() else {
            return Vec::new();
        };
        listing(vm, vm.locals())
    }

    /// Named globals: interface variables, uniforms, buffers and privates.
    pub fn global_variables(&self) -> Vec<VariableValue> {
        let Some(vm) = self.inspected() else {
            return Vec::new();
        };
        listing(vm, vm.named_globals())
    }

    /// Current value of the variable `name` as seen from the innermost frame.
    pub fn variable(&self, name: &str) -> Option<VariableValue> {
        let vm = self.inspected()?;
        let (type_id, value) = vm.variable(name)?;
        Some(VariableValue {
            name: name.to_string(),
            text: format_value(vm.program(), type_id, &value),
            type_id,
            value,
        })
    }

    /// Evaluate `expression` in the scope of the inspected invocation.
    ///
    /// Runs on a separate VM: the inspected invocation's position, stack and
    /// memory are left untouched. On failure the reason is kept in
    /// [`diagnostic`](Self::diagnostic).
    pub fn immediate(&mut self, expression: &str) -> Option<EvaluatedValue> {
        let limit = self.config.max_instructions;
        let sampler = self.bound.as_ref().map(|b| Arc::clone(&b.sampler));
        let outcome = self.with_inspected(|s, vm| -> Result<EvaluatedValue> {
            let function = vm
                .current_function()
                .and_then(|id| vm.program().name(id))
                .map(str::to_string);
            s.compiler.compile(expression, function.as_deref())?;
            let compiled = s
                .compiler
                .compiled()
                .cloned()
                .ok_or_else(|| CompileError::no_module("no compiled expression"))?;
            PreparedExpression::new(compiled)?.evaluate(vm, sampler, limit)
        });
        match outcome {
            Some(Ok(value)) => {
                self.diagnostic = None;
                Some(value)
            }
            Some(Err(err)) => {
                debug!(expression, %err, "immediate evaluation failed");
                self.diagnostic = Some(err.to_string());
                None
            }
            None => {
                self.diagnostic = Some("no stage is prepared".to_string());
                None
            }
        }
    }

    // ========================================================================
    // Watches
    // ========================================================================

    /// Add a watch. Returns its index.
    pub fn add_watch(&mut self, expression: impl Into<String>) -> usize {
        self.watches.push(WatchExpression::new(expression));
        self.watches.len() - 1
    }

    pub fn remove_watch(&mut self, index: usize) -> bool {
        if index >= self.watches.len() {
            return false;
        }
        self.watches.remove(index);
        true
    }

    pub fn watches(&self) -> &[WatchExpression] {
        &self.watches
    }

    /// Re-evaluate every watch against the inspected invocation.
    pub fn update_watches(&mut self) {
        for index in 0..self.watches.len() {
            let expression = self.watches[index].expression.clone();
            let (value, color) = match self.immediate(&expression) {
                Some(result) => (result.text, color_preview(&result.value)),
                None => (
                    self.diagnostic
                        .clone()
                        .unwrap_or_else(|| "<unavailable>".to_string()),
                    None,
                ),
            };
            let watch = &mut self.watches[index];
            watch.value = value;
            watch.color = color;
        }
    }

    // ========================================================================
    // Breakpoints
    // ========================================================================

    pub fn add_breakpoint(&mut self, file: impl AsRef<Path>, line: u32) -> bool {
        let file = file.as_ref();
        info!(file = %file.display(), line, "breakpoint added");
        self.breakpoints.add(file, line, None)
    }

    /// Add a breakpoint that only triggers while `condition` is true.
    pub fn add_conditional_breakpoint(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        condition: impl Into<String>,
    ) -> bool {
        let file = file.as_ref();
        let condition = condition.into();
        info!(file = %file.display(), line, %condition, "breakpoint added");
        self.breakpoints.add(file, line, Some(condition))
    }

    pub fn remove_breakpoint(&mut self, file: impl AsRef<Path>, line: u32) -> bool {
        let file = file.as_ref();
        info!(file = %file.display(), line, "breakpoint removed");
        self.breakpoints.remove(file, line)
    }

    /// Enable or disable a breakpoint. Its condition is kept either way.
    pub fn set_breakpoint_enabled(&mut self, file: impl AsRef<Path>, line: u32, enabled: bool) -> bool {
        match self.breakpoints.get_mut(file.as_ref(), line) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Replace a breakpoint's condition; `None` makes it unconditional.
    pub fn set_breakpoint_condition(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        condition: Option<String>,
    ) -> bool {
        match self.breakpoints.get_mut(file.as_ref(), line) {
            Some(bp) => {
                bp.set_condition(condition);
                true
            }
            None => false,
        }
    }

    /// Move a breakpoint, keeping its condition.
    pub fn move_breakpoint(
        &mut self,
        file: impl AsRef<Path>,
        line: u32,
        new_file: impl AsRef<Path>,
        new_line: u32,
    ) -> bool {
        self.breakpoints
            .relocate(file.as_ref(), line, new_file.as_ref(), new_line)
    }

    pub fn clear_breakpoints(&mut self) {
        info!("all breakpoints cleared");
        self.breakpoints.clear();
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    /// Whether a breakpoint at `line` of the inspected invocation's file
    /// would stop execution in its current state.
    pub fn check_breakpoint(&mut self, line: u32) -> bool {
        self.with_inspected(|s, vm| s.breakpoint_triggers(vm, line))
            .unwrap_or(false)
    }

    fn breakpoint_triggers(&mut self, vm: &VmSession, line: u32) -> bool {
        if !self.breakpoints.has_line(line) {
            return false;
        }
        let Some(bound) = self.bound.as_ref() else {
            return false;
        };
        let file = vm.current_file().map(PathBuf::from);
        let mut ctx = ConditionContext {
            compiler: &mut self.compiler,
            info: self.introspector.result(),
            vm,
            sampler: Some(Arc::clone(&bound.sampler)),
            limit: self.config.max_instructions,
        };
        let mut matches = self.breakpoints.at_line_mut(file.as_deref(), line);
        matches.any(|bp| bp.should_stop(&mut ctx))
    }

    /// Invocation state captured by the last breakpoint-aware pixel run.
    pub fn take_breakpoint_snapshot(&mut self) -> Option<VmSession> {
        self.breakpoint_snapshot.take()
    }

    // ========================================================================
    // Undefined behavior
    // ========================================================================

    /// Record one undefined-behavior event.
    pub fn on_undefined_behavior(&mut self, kind: UndefinedBehavior, line: Option<u32>) {
        trace!(?kind, line, "undefined behavior recorded");
        self.ub.count += 1;
        self.ub.last = Some(UbEvent { kind, line });
    }

    /// Events recorded since the last call, resetting the record.
    pub fn take_undefined_behavior(&mut self) -> UbSummary {
        std::mem::take(&mut self.ub)
    }
}

/// Copy every uniform, push constant and storage buffer the provider knows.
///
/// Whole variables are looked up by name; struct members of anonymous blocks
/// by member name, and of named blocks as `block.member`.
fn copy_bindings(vm: &mut VmSession, provider: &dyn BindingProvider) -> usize {
    let program = Arc::clone(vm.program());
    let mut copied = 0;
    for global in program.globals() {
        if !matches!(
            global.storage,
            StorageClass::Uniform
                | StorageClass::UniformConstant
                | StorageClass::PushConstant
                | StorageClass::StorageBuffer
        ) {
            continue;
        }
        let desc = program.types().get(global.ty);
        if matches!(
            desc,
            Some(TypeDesc::Image { .. } | TypeDesc::Sampler | TypeDesc::SampledImage { .. })
        ) {
            continue;
        }
        let name = program.name(global.id).unwrap_or_default();
        if !name.is_empty() {
            if let Some(value) = provider.copy(name) {
                vm.set_global(global.id, value);
                copied += 1;
                continue;
            }
        }
        let Some(TypeDesc::Struct { members }) = desc else {
            continue;
        };
        for member in 0..members.len() as u32 {
            let Some(member_name) = program.member_name(global.ty, member) else {
                continue;
            };
            let key = if name.is_empty() {
                member_name.to_string()
            } else {
                format!("{name}.{member_name}")
            };
            if let Some(value) = provider.copy(&key) {
                if vm.set_global_at(global.id, &[member], value) {
                    copied += 1;
                }
            }
        }
    }
    copied
}

fn listing(vm: &VmSession, variables: Vec<(String, u32, Value)>) -> Vec<VariableValue> {
    variables
        .into_iter()
        .map(|(name, type_id, value)| VariableValue {
            text: format_value(vm.program(), type_id, &value),
            name,
            type_id,
            value,
        })
        .collect()
}

/// Pixel executor detached from a [`DebugSession`], for re-running many
/// pixels in parallel. Each call works on its own VM clone.
#[derive(Debug, Clone)]
pub struct PixelRunner {
    template: VmSession,
    entry: u32,
    clip: ClipDepth,
}

impl PixelRunner {
    /// Run `input` up to the first instruction of `line` and read `variable`.
    ///
    /// Pixels that never reach `line` report the value they end with.
    pub fn variable_at(&self, input: &PixelInput, variable: &str, line: u32) -> Option<Value> {
        let mut vm = self.template.clone();
        write_pixel_input(&mut vm, input, self.clip);
        vm.start(self.entry, Vec::new()).ok()?;
        while vm.is_running() && vm.current_line() != Some(line) {
            if vm.step().is_err() {
                break;
            }
        }
        vm.variable(variable).map(|(_, value)| value)
    }
}
