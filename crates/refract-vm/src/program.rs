//! Decoded, immutable form of a module ready for execution.
//!
//! Function bodies are flattened into one instruction list; labels and
//! functions index into it. Line markers are folded into the instructions they
//! annotate instead of being executed.

use std::collections::HashMap;

use refract_spirv::{
    BuiltIn, Decoration, ExecutionMode, ExecutionModel, Instruction, Module, Op, StorageClass,
    TypeDesc, TypeTable,
};
use tracing::trace;

use crate::error::Result;
use crate::value::{ScalarKind, Value};

/// Source position attached to an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine {
    /// `OpString` id of the file.
    pub file: u32,
    pub line: u32,
}

/// One executable instruction.
#[derive(Debug, Clone)]
pub struct Instr {
    pub op: Op,
    pub operands: Vec<u32>,
    pub line: Option<SourceLine>,
}

/// A function body inside [`Program::code`].
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub id: u32,
    pub result_type: u32,
    /// `(id, type)` of each parameter.
    pub params: Vec<(u32, u32)>,
    /// Index of the entry block label.
    pub entry: usize,
    /// One past the last instruction.
    pub end: usize,
}

/// A module-scope variable.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub id: u32,
    /// Pointee type id.
    pub ty: u32,
    pub storage: StorageClass,
    pub initializer: Option<u32>,
}

/// A function-scope variable declaration.
#[derive(Debug, Clone, Copy)]
pub struct LocalVar {
    pub function: u32,
    pub ty: u32,
}

/// An `OpEntryPoint`.
#[derive(Debug, Clone)]
pub struct EntryPointDef {
    pub model: ExecutionModel,
    pub function: u32,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct Program {
    types: TypeTable,
    code: Vec<Instr>,
    functions: HashMap<u32, FunctionDef>,
    labels: HashMap<u32, usize>,
    constants: HashMap<u32, Value>,
    globals: Vec<GlobalVar>,
    global_index: HashMap<u32, usize>,
    locals: HashMap<u32, LocalVar>,
    names: HashMap<u32, String>,
    member_names: HashMap<(u32, u32), String>,
    locations: HashMap<u32, u32>,
    builtins: HashMap<u32, BuiltIn>,
    member_builtins: HashMap<(u32, u32), BuiltIn>,
    bindings: HashMap<u32, u32>,
    files: HashMap<u32, String>,
    entry_points: Vec<EntryPointDef>,
    execution_modes: HashMap<u32, Vec<(ExecutionMode, Vec<u32>)>>,
    ext_sets: HashMap<u32, String>,
}

impl Program {
    /// Decode `words` into an executable program.
    pub fn new(words: &[u32]) -> Result<Self> {
        let module = Module::parse(words)?;
        let mut program = Program::default();
        let mut function: Option<FunctionDef> = None;
        let mut line: Option<SourceLine> = None;

        for inst in module.instructions() {
            let inst = inst?;
            let Some(op) = inst.op() else {
                trace!(opcode = inst.opcode, "ignoring unknown opcode");
                continue;
            };
            match op {
                Op::Function => {
                    function = Some(FunctionDef {
                        id: inst.word(1)?,
                        result_type: inst.word(0)?,
                        params: Vec::new(),
                        entry: program.code.len(),
                        end: program.code.len(),
                    });
                    line = None;
                }
                Op::FunctionParameter => {
                    if let Some(f) = function.as_mut() {
                        f.params.push((inst.word(1)?, inst.word(0)?));
                    }
                }
                Op::FunctionEnd => {
                    if let Some(mut f) = function.take() {
                        f.end = program.code.len();
                        program.functions.insert(f.id, f);
                    }
                    line = None;
                }
                Op::Line => line = Some(SourceLine { file: inst.word(0)?, line: inst.word(1)? }),
                Op::NoLine => line = None,
                _ if function.is_some() => {
                    if op == Op::Label {
                        program.labels.insert(inst.word(0)?, program.code.len());
                        line = None;
                    }
                    if op == Op::Variable {
                        if let Some(f) = function.as_ref() {
                            let ty = program.types.resolve_id(inst.word(0)?);
                            program
                                .locals
                                .insert(inst.word(1)?, LocalVar { function: f.id, ty });
                        }
                    }
                    program.code.push(Instr {
                        op,
                        operands: inst.operands.to_vec(),
                        line,
                    });
                }
                _ => program.module_scope(op, &inst)?,
            }
        }
        Ok(program)
    }

    fn module_scope(&mut self, op: Op, inst: &Instruction<'_>) -> Result<()> {
        match op {
            Op::Name => {
                self.names.insert(inst.word(0)?, inst.string(1)?.0);
            }
            Op::MemberName => {
                self.member_names
                    .insert((inst.word(0)?, inst.word(1)?), inst.string(2)?.0);
            }
            Op::String => {
                self.files.insert(inst.word(0)?, inst.string(1)?.0);
            }
            Op::ExtInstImport => {
                self.ext_sets.insert(inst.word(0)?, inst.string(1)?.0);
            }
            Op::EntryPoint => {
                if let Some(model) = ExecutionModel::from_word(inst.word(0)?) {
                    self.entry_points.push(EntryPointDef {
                        model,
                        function: inst.word(1)?,
                        name: inst.string(2)?.0,
                    });
                }
            }
            Op::ExecutionMode => {
                if let Some(mode) = ExecutionMode::from_word(inst.word(1)?) {
                    self.execution_modes
                        .entry(inst.word(0)?)
                        .or_default()
                        .push((mode, inst.rest(2).to_vec()));
                }
            }
            Op::Decorate => {
                let target = inst.word(0)?;
                match Decoration::from_word(inst.word(1)?) {
                    Some(Decoration::Location) => {
                        self.locations.insert(target, inst.word(2)?);
                    }
                    Some(Decoration::Binding) => {
                        self.bindings.insert(target, inst.word(2)?);
                    }
                    Some(Decoration::BuiltIn) => {
                        if let Some(builtin) = BuiltIn::from_word(inst.word(2)?) {
                            self.builtins.insert(target, builtin);
                        }
                    }
                    _ => {}
                }
            }
            Op::MemberDecorate => {
                if Decoration::from_word(inst.word(2)?) == Some(Decoration::BuiltIn) {
                    if let Some(builtin) = BuiltIn::from_word(inst.word(3)?) {
                        self.member_builtins
                            .insert((inst.word(0)?, inst.word(1)?), builtin);
                    }
                }
            }
            Op::Constant => {
                let (ty, id) = (inst.word(0)?, inst.word(1)?);
                self.types.record(inst)?;
                let kind = self.types.get(ty).and_then(ScalarKind::of);
                if let Some(kind) = kind {
                    self.constants.insert(id, Value::from_bits(kind, inst.word(2)?));
                }
            }
            Op::ConstantTrue | Op::ConstantFalse => {
                self.constants
                    .insert(inst.word(1)?, Value::Bool(op == Op::ConstantTrue));
            }
            Op::ConstantComposite => {
                let parts = inst
                    .rest(2)
                    .iter()
                    .map(|id| self.constants.get(id).cloned().unwrap_or_default())
                    .collect();
                self.constants.insert(inst.word(1)?, Value::Composite(parts));
            }
            Op::ConstantNull | Op::Undef => {
                let zero = Value::zero(&self.types, inst.word(0)?);
                self.constants.insert(inst.word(1)?, zero);
            }
            Op::Variable => {
                let pointer = inst.word(0)?;
                let storage = StorageClass::from_word(inst.word(2)?).unwrap_or(StorageClass::Private);
                self.global_index.insert(inst.word(1)?, self.globals.len());
                self.globals.push(GlobalVar {
                    id: inst.word(1)?,
                    ty: self.types.resolve_id(pointer),
                    storage,
                    initializer: inst.word(3).ok(),
                });
            }
            _ => {
                self.types.record(inst)?;
            }
        }
        Ok(())
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    pub fn instr(&self, index: usize) -> Option<&Instr> {
        self.code.get(index)
    }

    pub fn function(&self, id: u32) -> Option<&FunctionDef> {
        self.functions.get(&id)
    }

    /// Function whose body contains instruction `index`.
    pub fn function_at(&self, index: usize) -> Option<&FunctionDef> {
        self.functions
            .values()
            .find(|f| f.entry <= index && index < f.end)
    }

    /// Function by debug name, with or without its mangled suffix.
    pub fn function_by_name(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.values().find(|f| {
            self.names
                .get(&f.id)
                .is_some_and(|n| n == name || n.split('(').next() == Some(name))
        })
    }

    pub fn label(&self, id: u32) -> Option<usize> {
        self.labels.get(&id).copied()
    }

    pub fn constant(&self, id: u32) -> Option<&Value> {
        self.constants.get(&id)
    }

    pub fn globals(&self) -> &[GlobalVar] {
        &self.globals
    }

    pub fn global(&self, id: u32) -> Option<&GlobalVar> {
        self.global_index.get(&id).and_then(|i| self.globals.get(*i))
    }

    /// Global variable by debug name.
    pub fn global_by_name(&self, name: &str) -> Option<&GlobalVar> {
        self.globals
            .iter()
            .find(|g| self.names.get(&g.id).is_some_and(|n| n == name))
    }

    pub fn local(&self, id: u32) -> Option<LocalVar> {
        self.locals.get(&id).copied()
    }

    /// Function-scope variables declared in `function`, in declaration order.
    pub fn locals_of(&self, function: u32) -> Vec<(u32, LocalVar)> {
        let Some(def) = self.functions.get(&function) else {
            return Vec::new();
        };
        self.code[def.entry..def.end]
            .iter()
            .filter(|i| i.op == Op::Variable)
            .filter_map(|i| {
                let id = *i.operands.get(1)?;
                Some((id, self.locals.get(&id).copied()?))
            })
            .collect()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn member_name(&self, struct_id: u32, member: u32) -> Option<&str> {
        self.member_names
            .get(&(struct_id, member))
            .map(String::as_str)
    }

    pub fn location(&self, id: u32) -> Option<u32> {
        self.locations.get(&id).copied()
    }

    pub fn binding(&self, id: u32) -> Option<u32> {
        self.bindings.get(&id).copied()
    }

    pub fn builtin(&self, id: u32) -> Option<BuiltIn> {
        self.builtins.get(&id).copied()
    }

    /// Variable (and struct member, for interface blocks) carrying `builtin` in `storage`.
    pub fn builtin_slot(&self, storage: StorageClass, builtin: BuiltIn) -> Option<(u32, Option<u32>)> {
        self.globals
            .iter()
            .filter(|g| g.storage == storage)
            .find_map(|g| {
                if self.builtins.get(&g.id) == Some(&builtin) {
                    return Some((g.id, None));
                }
                let Some(TypeDesc::Struct { members }) = self.types.get(g.ty) else {
                    return None;
                };
                (0..members.len() as u32)
                    .find(|m| self.member_builtins.get(&(g.ty, *m)) == Some(&builtin))
                    .map(|m| (g.id, Some(m)))
            })
    }

    /// Interface variable at `location` in `storage`.
    pub fn location_slot(&self, storage: StorageClass, location: u32) -> Option<&GlobalVar> {
        self.globals
            .iter()
            .find(|g| g.storage == storage && self.locations.get(&g.id) == Some(&location))
    }

    pub fn file(&self, id: u32) -> Option<&str> {
        self.files.get(&id).map(String::as_str)
    }

    /// Id of the `OpString` naming `path`.
    pub fn file_id(&self, path: &str) -> Option<u32> {
        self.files
            .iter()
            .find(|(_, name)| name.as_str() == path)
            .map(|(id, _)| *id)
    }

    pub fn entry_points(&self) -> &[EntryPointDef] {
        &self.entry_points
    }

    /// Entry function for `model`, or the first entry point when `None`.
    pub fn entry_point(&self, model: Option<ExecutionModel>) -> Option<u32> {
        self.entry_points
            .iter()
            .find(|e| model.map_or(true, |m| m == e.model))
            .map(|e| e.function)
    }

    /// Literals of `mode` on `function`.
    pub fn execution_mode(&self, function: u32, mode: ExecutionMode) -> Option<&[u32]> {
        self.execution_modes
            .get(&function)?
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, literals)| literals.as_slice())
    }

    /// Declared compute workgroup size.
    pub fn local_size(&self, function: u32) -> [u32; 3] {
        match self.execution_mode(function, ExecutionMode::LocalSize) {
            Some([x, y, z, ..]) => [*x, *y, *z],
            _ => [1, 1, 1],
        }
    }

    pub fn ext_set(&self, id: u32) -> Option<&str> {
        self.ext_sets.get(&id).map(String::as_str)
    }

    /// Every line number attached to code, sorted and de-duplicated.
    pub fn lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = self.code.iter().filter_map(|i| i.line.map(|l| l.line)).collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }
}
