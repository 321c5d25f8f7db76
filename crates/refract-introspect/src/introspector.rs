//! Module walk.
//!
//! A single pass over the instruction records collects raw facts (names,
//! decorations, types, variable declarations, function bounds); a second step
//! turns them into [`Variable`] descriptors. Splitting the two lets names and
//! member names that appear after the declarations they refer to still land
//! in the result.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use refract_spirv::{
    Decoration, ExecutionMode, ExecutionModel, Instruction, Module, Op, Result, StorageClass,
    TypeDesc, TypeTable,
};
use tracing::{debug, trace};

use crate::profile::InstructionProfile;
use crate::variable::Variable;

/// A function recovered from the module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionInfo {
    /// Result id of `OpFunction`.
    pub id: u32,
    /// Debug name, with the mangled parameter suffix trimmed when requested.
    pub name: String,
    /// Source file of the first line marker inside the function.
    pub file: Option<String>,
    /// First source line attributed to the function.
    pub line_start: u32,
    /// Set once the end of the function has been seen.
    pub line_end: Option<u32>,
    /// Unnamed variable describing the return type.
    pub return_type: Variable,
    /// Parameters in declaration order.
    pub arguments: Vec<Variable>,
    /// Function-scope `OpVariable`s in declaration order.
    pub locals: Vec<Variable>,
}

impl FunctionInfo {
    /// Whether `line` lies inside the function's line bounds.
    pub fn contains_line(&self, line: u32) -> bool {
        match self.line_end {
            Some(end) => self.line_start <= line && line <= end,
            None => false,
        }
    }
}

/// An `OpEntryPoint` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// `None` for execution models this crate does not know.
    pub model: Option<ExecutionModel>,
    /// Id of the entry function.
    pub function: u32,
    /// Name given by `OpEntryPoint`.
    pub name: String,
}

/// Everything recovered by one parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntrospectionResult {
    /// Functions keyed by name, in declaration order.
    pub functions: IndexMap<String, FunctionInfo>,
    /// Struct name to ordered members.
    pub user_types: IndexMap<String, Vec<Variable>>,
    /// Uniform-like globals; anonymous blocks are flattened member by member.
    pub uniforms: Vec<Variable>,
    /// Other module-scope variables (inputs, outputs, private, workgroup).
    pub globals: Vec<Variable>,
    /// Instruction counts per category.
    pub profile: InstructionProfile,
    /// `OpEntryPoint` declarations in module order.
    pub entry_points: Vec<EntryPoint>,
    /// `OpString` file names in declaration order.
    pub files: Vec<String>,
}

impl IntrospectionResult {
    /// Function whose line range contains `line`, innermost first on overlap.
    pub fn function_at_line(&self, line: u32) -> Option<&FunctionInfo> {
        self.functions
            .values()
            .filter(|f| f.contains_line(line))
            .min_by_key(|f| f.line_end.unwrap_or(u32::MAX) - f.line_start)
    }

    /// Function by result id.
    pub fn function_by_id(&self, id: u32) -> Option<&FunctionInfo> {
        self.functions.values().find(|f| f.id == id)
    }

    /// Variable visible from `function`: its locals and arguments, then globals and uniforms.
    pub fn lookup(&self, function: Option<&str>, name: &str) -> Option<&Variable> {
        function
            .and_then(|f| self.functions.get(f))
            .and_then(|f| {
                f.locals
                    .iter()
                    .chain(f.arguments.iter())
                    .find(|v| v.name == name)
            })
            .or_else(|| self.globals.iter().find(|v| v.name == name))
            .or_else(|| self.uniforms.iter().find(|v| v.name == name))
    }
}

/// Stateful introspector. Each [`parse`](Self::parse) replaces the previous result.
#[derive(Debug, Default)]
pub struct BytecodeIntrospector {
    result: IntrospectionResult,
}

impl BytecodeIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `words`, discarding anything recovered before.
    ///
    /// On error the previous result is cleared as well.
    pub fn parse(&mut self, words: &[u32], trim_function_names: bool) -> Result<&IntrospectionResult> {
        self.result = IntrospectionResult::default();
        self.result = introspect(words, trim_function_names)?;
        Ok(&self.result)
    }

    pub fn result(&self) -> &IntrospectionResult {
        &self.result
    }
}

#[derive(Debug, Default)]
struct RawFunction {
    id: u32,
    result_type: u32,
    params: Vec<(u32, u32)>,
    locals: Vec<(u32, u32)>,
    file: Option<u32>,
    line_start: Option<u32>,
    line_max: Option<u32>,
    ended: bool,
}

#[derive(Debug, Default)]
struct Walk {
    names: HashMap<u32, String>,
    member_names: HashMap<(u32, u32), String>,
    blocks: HashSet<u32>,
    types: TypeTable,
    structs: Vec<u32>,
    files: IndexMap<u32, String>,
    globals: Vec<(u32, u32, StorageClass)>,
    functions: Vec<RawFunction>,
    entry_points: Vec<EntryPoint>,
    profile: InstructionProfile,
}

/// Parse a module into a fresh [`IntrospectionResult`].
pub fn introspect(words: &[u32], trim_function_names: bool) -> Result<IntrospectionResult> {
    let module = Module::parse(words)?;
    let mut walk = Walk::default();
    for inst in module.instructions() {
        walk.visit(&inst?)?;
    }
    let result = walk.finish(trim_function_names);
    debug!(
        functions = result.functions.len(),
        user_types = result.user_types.len(),
        uniforms = result.uniforms.len(),
        instructions = result.profile.total(),
        "introspected module"
    );
    Ok(result)
}

/// Strip a mangled parameter suffix: `main(vf4;` becomes `main`.
fn trim_name(name: &str) -> &str {
    name.split('(').next().unwrap_or(name)
}

impl Walk {
    fn visit(&mut self, inst: &Instruction<'_>) -> Result<()> {
        let Some(op) = inst.op() else {
            trace!(opcode = inst.opcode, "skipping unknown opcode");
            return Ok(());
        };
        self.profile.count(op);
        match op {
            Op::Name => {
                let (name, _) = inst.string(1)?;
                self.names.insert(inst.word(0)?, name);
            }
            Op::MemberName => {
                let (name, _) = inst.string(2)?;
                self.member_names.insert((inst.word(0)?, inst.word(1)?), name);
            }
            Op::String => {
                let (name, _) = inst.string(1)?;
                self.files.insert(inst.word(0)?, name);
            }
            Op::Decorate => {
                let decoration = Decoration::from_word(inst.word(1)?);
                if matches!(decoration, Some(Decoration::Block | Decoration::BufferBlock)) {
                    self.blocks.insert(inst.word(0)?);
                }
            }
            Op::EntryPoint => {
                let (name, _) = inst.string(2)?;
                self.entry_points.push(EntryPoint {
                    model: ExecutionModel::from_word(inst.word(0)?),
                    function: inst.word(1)?,
                    name,
                });
            }
            Op::ExecutionMode => {
                if ExecutionMode::from_word(inst.word(1)?) == Some(ExecutionMode::LocalSize) {
                    self.profile.local_size = [inst.word(2)?, inst.word(3)?, inst.word(4)?];
                }
            }
            Op::Function => self.functions.push(RawFunction {
                id: inst.word(1)?,
                result_type: inst.word(0)?,
                ..Default::default()
            }),
            Op::FunctionParameter => {
                let param = (inst.word(1)?, inst.word(0)?);
                if let Some(f) = self.open_function() {
                    f.params.push(param);
                }
            }
            Op::FunctionEnd => {
                if let Some(f) = self.open_function() {
                    f.ended = true;
                }
            }
            Op::Line => {
                let (file, line) = (inst.word(0)?, inst.word(1)?);
                if let Some(f) = self.open_function() {
                    f.file.get_or_insert(file);
                    f.line_start = Some(f.line_start.map_or(line, |s| s.min(line)));
                    f.line_max = Some(f.line_max.map_or(line, |m| m.max(line)));
                }
            }
            Op::Variable => {
                let (ty, id) = (inst.word(0)?, inst.word(1)?);
                let storage = StorageClass::from_word(inst.word(2)?).unwrap_or(StorageClass::Generic);
                if storage == StorageClass::Function {
                    if let Some(f) = self.open_function() {
                        f.locals.push((id, ty));
                    }
                } else {
                    self.globals.push((id, ty, storage));
                }
            }
            Op::TypeStruct => {
                self.types.record(inst)?;
                self.structs.push(inst.word(0)?);
            }
            _ => {
                self.types.record(inst)?;
            }
        }
        Ok(())
    }

    fn open_function(&mut self) -> Option<&mut RawFunction> {
        self.functions.last_mut().filter(|f| !f.ended)
    }

    fn struct_name(&self, id: u32) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("struct{id}"))
    }

    fn describe(&self, id: u32, ty: u32) -> Variable {
        let name = self.names.get(&id).cloned().unwrap_or_default();
        let mut var = Variable::describe(&self.types, ty, name, &|t| Some(self.struct_name(t)));
        var.id = id;
        var
    }

    fn members(&self, struct_id: u32) -> Vec<Variable> {
        let Some(TypeDesc::Struct { members }) = self.types.get(struct_id) else {
            return Vec::new();
        };
        members
            .iter()
            .enumerate()
            .map(|(index, ty)| {
                let name = self
                    .member_names
                    .get(&(struct_id, index as u32))
                    .cloned()
                    .unwrap_or_else(|| format!("member{index}"));
                Variable::describe(&self.types, *ty, name, &|t| Some(self.struct_name(t)))
            })
            .collect()
    }

    fn finish(self, trim_function_names: bool) -> IntrospectionResult {
        let mut result = IntrospectionResult {
            profile: self.profile,
            entry_points: self.entry_points.clone(),
            files: self.files.values().cloned().collect(),
            ..Default::default()
        };

        for id in &self.structs {
            result.user_types.insert(self.struct_name(*id), self.members(*id));
        }

        for (id, ty, storage) in &self.globals {
            let var = self.describe(*id, *ty);
            let uniform = matches!(
                storage,
                StorageClass::Uniform
                    | StorageClass::UniformConstant
                    | StorageClass::PushConstant
                    | StorageClass::StorageBuffer
            );
            if !uniform {
                result.globals.push(var);
                continue;
            }
            let block = self.types.resolve_id(*ty);
            if var.name.is_empty() && self.blocks.contains(&block) {
                for (index, mut member) in self.members(block).into_iter().enumerate() {
                    member.id = *id;
                    member.storage = Some(*storage);
                    member.block_member = Some(index as u32);
                    result.uniforms.push(member);
                }
            } else {
                result.uniforms.push(var);
            }
        }

        for raw in &self.functions {
            let full = self
                .names
                .get(&raw.id)
                .cloned()
                .unwrap_or_else(|| format!("%{}", raw.id));
            let mut name = if trim_function_names {
                trim_name(&full).to_string()
            } else {
                full.clone()
            };
            if result.functions.contains_key(&name) {
                name = full;
            }
            let line_start = raw.line_start.unwrap_or(0);
            let info = FunctionInfo {
                id: raw.id,
                name: name.clone(),
                file: raw.file.and_then(|f| self.files.get(&f).cloned()),
                line_start,
                line_end: raw.ended.then(|| raw.line_max.unwrap_or(line_start)),
                return_type: self.describe(0, raw.result_type),
                arguments: raw.params.iter().map(|(id, ty)| self.describe(*id, *ty)).collect(),
                locals: raw.locals.iter().map(|(id, ty)| self.describe(*id, *ty)).collect(),
            };
            result.functions.insert(name, info);
        }
        result
    }
}
