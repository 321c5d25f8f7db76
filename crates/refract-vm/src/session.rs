//! Execution context for one invocation.
//!
//! A [`VmSession`] owns its memory and call stack; the decoded [`Program`] is
//! shared. Cloning a prepared session is how every pixel, vertex or compute
//! invocation gets an isolated context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use refract_spirv::{Op, StorageClass, TypeDesc};
use tracing::trace;

use crate::error::{ExecutionError, Result, UbEvent, UndefinedBehavior};
use crate::program::Program;
use crate::value::{Pointer, PointerRoot, Value};

/// Default per-invocation instruction ceiling.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 1_000_000;

/// Call depth at which [`ExecutionError::StackOverflow`] is raised.
const MAX_CALL_DEPTH: usize = 256;

/// Texture access for image instructions.
pub trait TextureSampler: Send + Sync {
    /// Sample the texture bound at `binding` at normalized `coord`.
    fn sample(&self, binding: u32, coord: &[f32], lod: f32) -> [f32; 4];

    /// Texel dimensions of the texture bound at `binding`.
    fn size(&self, _binding: u32) -> [u32; 2] {
        [1, 1]
    }
}

/// Lifecycle of the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No invocation started.
    Idle,
    Running,
    /// The entry function returned.
    Finished,
    /// The invocation was discarded.
    Killed,
    /// The instruction ceiling was hit.
    Exhausted,
    /// An [`ExecutionError`] ended the invocation.
    Faulted,
}

/// What a single [`VmSession::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Executed,
    /// Entered a function.
    Called,
    /// Returned to a caller.
    Returned,
    /// The entry function returned.
    Finished,
    Killed,
    /// A control or memory barrier was executed.
    Barrier,
    EmitVertex,
    EndPrimitive,
    LimitReached,
}

impl StepEvent {
    /// Whether the invocation can no longer continue.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepEvent::Finished | StepEvent::Killed | StepEvent::LimitReached)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) function: u32,
    pub(crate) values: HashMap<u32, Value>,
    pub(crate) memory: HashMap<u32, Value>,
    pub(crate) return_ip: usize,
    pub(crate) result: Option<u32>,
    pub(crate) block: u32,
    pub(crate) previous_block: u32,
    pub(crate) call_line: Option<u32>,
}

/// One entry of [`VmSession::call_stack`], innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub function: u32,
    pub name: Option<String>,
    /// Current line for the innermost frame, call-site line for the others.
    pub line: Option<u32>,
}

/// A live execution context bound to a program.
#[derive(Clone)]
pub struct VmSession {
    pub(crate) program: Arc<Program>,
    pub(crate) globals: HashMap<u32, Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) ip: usize,
    pub(crate) status: Status,
    pub(crate) executed: u64,
    pub(crate) limit: u64,
    pub(crate) return_value: Option<Value>,
    pub(crate) ub: Vec<UbEvent>,
    pub(crate) demoted: bool,
    pub(crate) line: Option<u32>,
    pub(crate) sampler: Option<Arc<dyn TextureSampler>>,
}

impl fmt::Debug for VmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmSession")
            .field("ip", &self.ip)
            .field("status", &self.status)
            .field("depth", &self.frames.len())
            .field("executed", &self.executed)
            .finish_non_exhaustive()
    }
}

impl VmSession {
    /// Fresh session with every global zero- or constant-initialized.
    ///
    /// Image and sampler globals hold a handle carrying their binding.
    pub fn new(program: Arc<Program>) -> Self {
        let mut globals = HashMap::new();
        for global in program.globals() {
            let value = match global.initializer.and_then(|id| program.constant(id)) {
                Some(value) => value.clone(),
                None => match program.types().get(global.ty) {
                    Some(TypeDesc::Image { .. } | TypeDesc::SampledImage { .. } | TypeDesc::Sampler) => {
                        Value::Handle(program.binding(global.id).unwrap_or(0))
                    }
                    _ => Value::zero(program.types(), global.ty),
                },
            };
            globals.insert(global.id, value);
        }
        Self {
            program,
            globals,
            frames: Vec::new(),
            ip: 0,
            status: Status::Idle,
            executed: 0,
            limit: DEFAULT_INSTRUCTION_LIMIT,
            return_value: None,
            ub: Vec::new(),
            demoted: false,
            line: None,
            sampler: None,
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn set_sampler(&mut self, sampler: Arc<dyn TextureSampler>) {
        self.sampler = Some(sampler);
    }

    /// Set the instruction ceiling for the next invocations.
    pub fn set_instruction_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Begin executing `function` with `args` bound to its parameters.
    pub fn start(&mut self, function: u32, args: Vec<Value>) -> Result<()> {
        self.frames.clear();
        self.line = None;
        self.push_frame(function, args, None)?;
        self.status = Status::Running;
        self.executed = 0;
        self.return_value = None;
        self.demoted = false;
        trace!(function, "invocation started");
        Ok(())
    }

    /// Begin executing the first entry point of the module.
    pub fn start_entry(&mut self) -> Result<()> {
        let entry = self
            .program
            .entry_point(None)
            .ok_or(ExecutionError::UnknownFunction { id: 0 })?;
        self.start(entry, Vec::new())
    }

    /// Execute one instruction. Block labels and merge hints are folded into
    /// the instruction that follows them.
    pub fn step(&mut self) -> Result<StepEvent> {
        if self.status != Status::Running {
            return Err(ExecutionError::NotRunning);
        }
        if self.executed >= self.limit {
            self.status = Status::Exhausted;
            return Ok(StepEvent::LimitReached);
        }
        let program = Arc::clone(&self.program);
        loop {
            let instr = program
                .instr(self.ip)
                .ok_or(ExecutionError::InvalidTarget { id: self.ip as u32 })?;
            self.ip += 1;
            if instr.line.is_some() {
                self.line = instr.line.map(|l| l.line);
            }
            let event = match self.execute(&program, instr) {
                Ok(event) => event,
                Err(err) => {
                    self.status = Status::Faulted;
                    return Err(err);
                }
            };
            if is_structural(instr.op) && event == StepEvent::Executed {
                continue;
            }
            self.executed += 1;
            return Ok(event);
        }
    }

    /// Step until the invocation ends or yields at a barrier or emitted vertex.
    pub fn run(&mut self) -> Result<StepEvent> {
        loop {
            let event = self.step()?;
            match event {
                StepEvent::Executed | StepEvent::Called | StepEvent::Returned => {}
                _ => return Ok(event),
            }
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    /// Instructions executed by the current invocation.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Value returned by the entry function.
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// `OpDemoteToHelperInvocation` was executed.
    pub fn demoted(&self) -> bool {
        self.demoted
    }

    /// Undefined-behavior events since the last drain.
    pub fn drain_undefined_behavior(&mut self) -> Vec<UbEvent> {
        std::mem::take(&mut self.ub)
    }

    /// Line of the next annotated instruction in the current function.
    pub fn next_line(&self) -> Option<u32> {
        let end = self
            .frames
            .last()
            .and_then(|f| self.program.function(f.function))
            .map_or(self.ip, |def| def.end);
        self.program
            .code()
            .get(self.ip..end)?
            .iter()
            .find_map(|i| i.line)
            .map(|l| l.line)
    }

    /// Line the invocation is paused at: the next instruction's line, or the
    /// last line executed when the next instruction carries none.
    pub fn current_line(&self) -> Option<u32> {
        if !self.is_running() {
            return self.line;
        }
        self.next_line().or(self.line)
    }

    /// File of the next instruction to run.
    pub fn current_file(&self) -> Option<&str> {
        self.program
            .code()
            .get(self.ip..)?
            .iter()
            .find_map(|i| i.line)
            .and_then(|l| self.program.file(l.file))
    }

    /// Function of the innermost frame.
    pub fn current_function(&self) -> Option<u32> {
        self.frames.last().map(|f| f.function)
    }

    /// Stack depth; equals the number of recorded call frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Call frames, outermost first.
    pub fn call_stack(&self) -> Vec<CallFrame> {
        let count = self.frames.len();
        self.frames
            .iter()
            .enumerate()
            .map(|(depth, frame)| CallFrame {
                function: frame.function,
                name: self.program.name(frame.function).map(str::to_string),
                line: if depth + 1 == count {
                    self.current_line()
                } else {
                    self.frames.get(depth + 1).and_then(|f| f.call_line)
                },
            })
            .collect()
    }

    pub fn global(&self, id: u32) -> Option<&Value> {
        self.globals.get(&id)
    }

    pub fn set_global(&mut self, id: u32, value: Value) {
        self.globals.insert(id, value);
    }

    /// Overwrite the element at `path` inside global `id`.
    pub fn set_global_at(&mut self, id: u32, path: &[u32], value: Value) -> bool {
        match self.globals.get_mut(&id).and_then(|g| g.at_mut(path)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Ids and values of globals in `storage`.
    pub fn globals_in(&self, storage: StorageClass) -> Vec<(u32, Value)> {
        self.program
            .globals()
            .iter()
            .filter(|g| g.storage == storage)
            .filter_map(|g| Some((g.id, self.globals.get(&g.id)?.clone())))
            .collect()
    }

    /// Read through a pointer. Invalid pointers read as zero.
    pub fn read(&self, ptr: &Pointer) -> Value {
        self.root(&ptr.root)
            .and_then(|v| v.at(&ptr.path))
            .cloned()
            .unwrap_or_else(|| Value::zero(self.program.types(), ptr.ty))
    }

    /// Write through a pointer. Writes through invalid pointers are dropped.
    pub fn write(&mut self, ptr: &Pointer, value: Value) {
        if let Some(slot) = self.root_mut(&ptr.root).and_then(|v| v.at_mut(&ptr.path)) {
            *slot = value;
        }
    }

    pub(crate) fn root(&self, root: &PointerRoot) -> Option<&Value> {
        match root {
            PointerRoot::Global(id) => self.globals.get(id),
            PointerRoot::Local { frame, var } => self.frames.get(*frame)?.memory.get(var),
            PointerRoot::Null => None,
        }
    }

    fn root_mut(&mut self, root: &PointerRoot) -> Option<&mut Value> {
        match root {
            PointerRoot::Global(id) => self.globals.get_mut(id),
            PointerRoot::Local { frame, var } => self.frames.get_mut(*frame)?.memory.get_mut(var),
            PointerRoot::Null => None,
        }
    }

    /// Current value of a named variable: locals of the innermost frame, its
    /// parameters, then globals and anonymous-block members.
    ///
    /// Returns the type id alongside the value.
    pub fn variable(&self, name: &str) -> Option<(u32, Value)> {
        let program = &self.program;
        if let Some(frame) = self.frames.last() {
            for (id, local) in program.locals_of(frame.function) {
                if program.name(id) == Some(name) {
                    if let Some(value) = frame.memory.get(&id) {
                        return Some((local.ty, value.clone()));
                    }
                }
            }
            if let Some(def) = program.function(frame.function) {
                for (id, ty) in &def.params {
                    if program.name(*id) == Some(name) {
                        let value = frame.values.get(id)?;
                        return Some(match value {
                            Value::Pointer(p) => (p.ty, self.read(p)),
                            other => (*ty, other.clone()),
                        });
                    }
                }
            }
        }
        if let Some(global) = program.global_by_name(name) {
            return Some((global.ty, self.globals.get(&global.id)?.clone()));
        }
        self.block_member(name)
    }

    fn block_member(&self, name: &str) -> Option<(u32, Value)> {
        let program = &self.program;
        program
            .globals()
            .iter()
            .filter(|g| program.name(g.id).map_or(true, str::is_empty))
            .find_map(|g| {
                let Some(TypeDesc::Struct { members }) = program.types().get(g.ty) else {
                    return None;
                };
                let index = (0..members.len() as u32)
                    .find(|m| program.member_name(g.ty, *m) == Some(name))?;
                let value = self.globals.get(&g.id)?.at(&[index])?.clone();
                Some((members[index as usize], value))
            })
    }

    /// Locals of the innermost frame that have been declared so far.
    pub fn locals(&self) -> Vec<(String, u32, Value)> {
        let Some(frame) = self.frames.last() else {
            return Vec::new();
        };
        let program = &self.program;
        let mut out: Vec<(String, u32, Value)> = Vec::new();
        if let Some(def) = program.function(frame.function) {
            for (id, ty) in &def.params {
                if let (Some(name), Some(value)) = (program.name(*id), frame.values.get(id)) {
                    let (ty, value) = match value {
                        Value::Pointer(p) => (p.ty, self.read(p)),
                        other => (*ty, other.clone()),
                    };
                    out.push((name.to_string(), ty, value));
                }
            }
        }
        for (id, local) in program.locals_of(frame.function) {
            if let (Some(name), Some(value)) = (program.name(id), frame.memory.get(&id)) {
                out.push((name.to_string(), local.ty, value.clone()));
            }
        }
        out
    }

    /// Named globals with their types and values.
    pub fn named_globals(&self) -> Vec<(String, u32, Value)> {
        self.program
            .globals()
            .iter()
            .filter_map(|g| {
                let name = self.program.name(g.id).filter(|n| !n.is_empty())?;
                Some((name.to_string(), g.ty, self.globals.get(&g.id)?.clone()))
            })
            .collect()
    }

    pub(crate) fn flag(&mut self, kind: UndefinedBehavior) {
        trace!(?kind, line = self.line, "undefined behavior");
        self.ub.push(UbEvent {
            kind,
            line: self.line,
        });
    }

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or(ExecutionError::NotRunning)
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or(ExecutionError::NotRunning)
    }

    pub(crate) fn push_frame(&mut self, function: u32, args: Vec<Value>, result: Option<u32>) -> Result<()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ExecutionError::StackOverflow {
                limit: MAX_CALL_DEPTH,
            });
        }
        let def = self
            .program
            .function(function)
            .ok_or(ExecutionError::UnknownFunction { id: function })?;
        let values = def.params.iter().map(|(id, _)| *id).zip(args).collect();
        let entry = def.entry;
        self.frames.push(Frame {
            function,
            values,
            memory: HashMap::new(),
            return_ip: self.ip,
            result,
            block: 0,
            previous_block: 0,
            call_line: self.line,
        });
        self.ip = entry;
        Ok(())
    }

    /// Pop the innermost frame, delivering `value` to the caller.
    ///
    /// The entry frame is kept after it returns so its locals stay inspectable.
    pub(crate) fn pop_frame(&mut self, value: Option<Value>) -> StepEvent {
        if self.frames.len() <= 1 {
            self.return_value = value;
            self.status = Status::Finished;
            return StepEvent::Finished;
        }
        let Some(frame) = self.frames.pop() else {
            return StepEvent::Finished;
        };
        if let Some(caller) = self.frames.last_mut() {
            if let (Some(id), Some(value)) = (frame.result, value) {
                caller.values.insert(id, value);
            }
        }
        self.ip = frame.return_ip;
        StepEvent::Returned
    }
}

/// Instructions that only delimit control flow and are not counted or stopped at.
pub(crate) fn is_structural(op: Op) -> bool {
    matches!(op, Op::Label | Op::LoopMerge | Op::SelectionMerge | Op::Nop)
}
