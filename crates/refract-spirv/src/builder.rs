//! Module assembler.
//!
//! Keeps the logical-layout sections of a module apart so declarations can be
//! added to an existing module (before its first function) while new functions
//! are appended at the end. The id bound in the header is patched on build.

use std::collections::HashMap;

use crate::error::Result;
use crate::op::{Decoration, ExecutionMode, ExecutionModel, Op, StorageClass, GLSL_STD_450};
use crate::reader::{encode_string, Module, MAGIC};
use crate::types::{TypeDesc, TypeTable};

/// SPIR-V 1.0.
const VERSION: u32 = 0x0001_0000;

/// Encode a single instruction record.
pub fn encode(op: Op, operands: &[u32]) -> Vec<u32> {
    let mut words = Vec::with_capacity(operands.len() + 1);
    words.push(((operands.len() as u32 + 1) << 16) | op.word() as u32);
    words.extend_from_slice(operands);
    words
}

/// Incremental module assembler.
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    version: u32,
    generator: u32,
    next_id: u32,
    capabilities: Vec<u32>,
    imports: Vec<u32>,
    preamble: Vec<u32>,
    debug: Vec<u32>,
    annotations: Vec<u32>,
    globals: Vec<u32>,
    functions: Vec<u32>,
    types: TypeTable,
    scalar_constants: HashMap<(u32, u32), u32>,
    glsl: Option<u32>,
    strings: HashMap<String, u32>,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBuilder {
    /// Empty shader module with the `Shader` capability and a logical GLSL memory model.
    pub fn new() -> Self {
        let mut builder = Self::empty();
        builder.capabilities.extend(encode(Op::Capability, &[1]));
        builder.preamble.extend(encode(Op::MemoryModel, &[0, 1]));
        builder
    }

    fn empty() -> Self {
        Self {
            version: VERSION,
            generator: 0,
            next_id: 1,
            capabilities: Vec::new(),
            imports: Vec::new(),
            preamble: Vec::new(),
            debug: Vec::new(),
            annotations: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            types: TypeTable::new(),
            scalar_constants: HashMap::new(),
            glsl: None,
            strings: HashMap::new(),
        }
    }

    /// Split an existing module into sections so it can be extended.
    pub fn from_words(words: &[u32]) -> Result<Self> {
        let module = Module::parse(words)?;
        let header = module.header();
        let mut builder = Self::empty();
        builder.version = header.version;
        builder.generator = header.generator;
        builder.next_id = header.bound.max(1);

        let mut in_functions = false;
        for inst in module.instructions() {
            let inst = inst?;
            let record = &words[inst.offset..inst.offset + inst.operands.len() + 1];
            let op = inst.op();
            if op == Some(Op::Function) {
                in_functions = true;
            }
            if in_functions {
                builder.functions.extend_from_slice(record);
                continue;
            }
            match op {
                Some(Op::Capability | Op::Extension) => {
                    builder.capabilities.extend_from_slice(record)
                }
                Some(Op::ExtInstImport) => {
                    if inst.string(1)?.0 == GLSL_STD_450 {
                        builder.glsl = Some(inst.word(0)?);
                    }
                    builder.imports.extend_from_slice(record);
                }
                Some(op) if op.is_preamble() => builder.preamble.extend_from_slice(record),
                Some(op) if op.is_debug() => {
                    if op == Op::String {
                        let (text, _) = inst.string(1)?;
                        builder.strings.insert(text, inst.word(0)?);
                    }
                    builder.debug.extend_from_slice(record);
                }
                Some(op) if op.is_annotation() => builder.annotations.extend_from_slice(record),
                _ => {
                    if builder.types.record(&inst)? && op == Some(Op::Constant) {
                        builder
                            .scalar_constants
                            .insert((inst.word(0)?, inst.word(2)?), inst.word(1)?);
                    }
                    builder.globals.extend_from_slice(record);
                }
            }
        }
        Ok(builder)
    }

    /// Allocate a fresh result id.
    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Current id bound.
    pub fn bound(&self) -> u32 {
        self.next_id
    }

    /// Types declared so far.
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Id of the `GLSL.std.450` import, adding it if missing.
    pub fn glsl_import(&mut self) -> u32 {
        if let Some(id) = self.glsl {
            return id;
        }
        let id = self.id();
        let mut operands = vec![id];
        operands.extend(encode_string(GLSL_STD_450));
        self.imports.extend(encode(Op::ExtInstImport, &operands));
        self.glsl = Some(id);
        id
    }

    /// Declare (or reuse) a type. Structs are never merged.
    pub fn declare_type(&mut self, desc: TypeDesc) -> u32 {
        if !matches!(desc, TypeDesc::Struct { .. }) {
            if let Some(id) = self.types.find(&desc) {
                return id;
            }
        }
        let id = self.id();
        let record = match &desc {
            TypeDesc::Void => encode(Op::TypeVoid, &[id]),
            TypeDesc::Bool => encode(Op::TypeBool, &[id]),
            TypeDesc::Int { width, signed } => encode(Op::TypeInt, &[id, *width, *signed as u32]),
            TypeDesc::Float { width } => encode(Op::TypeFloat, &[id, *width]),
            TypeDesc::Vector { component, count } => {
                encode(Op::TypeVector, &[id, *component, *count])
            }
            TypeDesc::Matrix { column, columns } => {
                encode(Op::TypeMatrix, &[id, *column, *columns])
            }
            TypeDesc::Array { element, length } => {
                let length_id = self.constant_u32(*length);
                encode(Op::TypeArray, &[id, *element, length_id])
            }
            TypeDesc::RuntimeArray { element } => encode(Op::TypeRuntimeArray, &[id, *element]),
            TypeDesc::Struct { members } => {
                let mut operands = vec![id];
                operands.extend_from_slice(members);
                encode(Op::TypeStruct, &operands)
            }
            TypeDesc::Image { sampled, dim } => {
                encode(Op::TypeImage, &[id, *sampled, *dim, 0, 0, 0, 1, 0])
            }
            TypeDesc::Sampler => encode(Op::TypeSampler, &[id]),
            TypeDesc::SampledImage { image } => encode(Op::TypeSampledImage, &[id, *image]),
            TypeDesc::Pointer { storage, pointee } => {
                encode(Op::TypePointer, &[id, storage.word(), *pointee])
            }
            TypeDesc::Function { result, params } => {
                let mut operands = vec![id, *result];
                operands.extend_from_slice(params);
                encode(Op::TypeFunction, &operands)
            }
        };
        self.globals.extend(record);
        self.types.insert(id, desc);
        id
    }

    pub fn type_void(&mut self) -> u32 {
        self.declare_type(TypeDesc::Void)
    }

    pub fn type_bool(&mut self) -> u32 {
        self.declare_type(TypeDesc::Bool)
    }

    pub fn type_int(&mut self) -> u32 {
        self.declare_type(TypeDesc::Int { width: 32, signed: true })
    }

    pub fn type_uint(&mut self) -> u32 {
        self.declare_type(TypeDesc::Int { width: 32, signed: false })
    }

    pub fn type_float(&mut self) -> u32 {
        self.declare_type(TypeDesc::Float { width: 32 })
    }

    pub fn type_vector(&mut self, component: u32, count: u32) -> u32 {
        self.declare_type(TypeDesc::Vector { component, count })
    }

    pub fn type_matrix(&mut self, column: u32, columns: u32) -> u32 {
        self.declare_type(TypeDesc::Matrix { column, columns })
    }

    pub fn type_array(&mut self, element: u32, length: u32) -> u32 {
        self.declare_type(TypeDesc::Array { element, length })
    }

    pub fn type_struct(&mut self, members: &[u32]) -> u32 {
        self.declare_type(TypeDesc::Struct {
            members: members.to_vec(),
        })
    }

    pub fn type_pointer(&mut self, storage: StorageClass, pointee: u32) -> u32 {
        self.declare_type(TypeDesc::Pointer { storage, pointee })
    }

    pub fn type_function(&mut self, result: u32, params: &[u32]) -> u32 {
        self.declare_type(TypeDesc::Function {
            result,
            params: params.to_vec(),
        })
    }

    fn scalar_constant(&mut self, ty: u32, bits: u32) -> u32 {
        if let Some(id) = self.scalar_constants.get(&(ty, bits)) {
            return *id;
        }
        let id = self.id();
        self.globals.extend(encode(Op::Constant, &[ty, id, bits]));
        self.types.record_constant(ty, id, bits);
        self.scalar_constants.insert((ty, bits), id);
        id
    }

    pub fn constant_f32(&mut self, value: f32) -> u32 {
        let ty = self.type_float();
        self.scalar_constant(ty, value.to_bits())
    }

    pub fn constant_i32(&mut self, value: i32) -> u32 {
        let ty = self.type_int();
        self.scalar_constant(ty, value as u32)
    }

    pub fn constant_u32(&mut self, value: u32) -> u32 {
        let ty = self.type_uint();
        self.scalar_constant(ty, value)
    }

    pub fn constant_bool(&mut self, value: bool) -> u32 {
        let ty = self.type_bool();
        let id = self.id();
        let op = if value { Op::ConstantTrue } else { Op::ConstantFalse };
        self.globals.extend(encode(op, &[ty, id]));
        id
    }

    pub fn constant_composite(&mut self, ty: u32, parts: &[u32]) -> u32 {
        let id = self.id();
        let mut operands = vec![ty, id];
        operands.extend_from_slice(parts);
        self.globals.extend(encode(Op::ConstantComposite, &operands));
        id
    }

    /// Declare a module-scope variable of pointer type `pointer`.
    pub fn global_variable(&mut self, pointer: u32, storage: StorageClass) -> u32 {
        let id = self.id();
        self.globals
            .extend(encode(Op::Variable, &[pointer, id, storage.word()]));
        id
    }

    /// Declare a module-scope variable, creating its pointer type.
    pub fn variable(&mut self, pointee: u32, storage: StorageClass) -> u32 {
        let pointer = self.type_pointer(storage, pointee);
        self.global_variable(pointer, storage)
    }

    pub fn name(&mut self, id: u32, name: &str) {
        let mut operands = vec![id];
        operands.extend(encode_string(name));
        self.debug.extend(encode(Op::Name, &operands));
    }

    pub fn member_name(&mut self, ty: u32, member: u32, name: &str) {
        let mut operands = vec![ty, member];
        operands.extend(encode_string(name));
        self.debug.extend(encode(Op::MemberName, &operands));
    }

    /// Id of an `OpString`, reusing an existing one with the same text.
    pub fn string(&mut self, text: &str) -> u32 {
        if let Some(id) = self.strings.get(text) {
            return *id;
        }
        let id = self.id();
        let mut operands = vec![id];
        operands.extend(encode_string(text));
        self.debug.extend(encode(Op::String, &operands));
        self.strings.insert(text.to_string(), id);
        id
    }

    pub fn decorate(&mut self, id: u32, decoration: Decoration, literals: &[u32]) {
        let mut operands = vec![id, decoration.word()];
        operands.extend_from_slice(literals);
        self.annotations.extend(encode(Op::Decorate, &operands));
    }

    pub fn member_decorate(&mut self, ty: u32, member: u32, decoration: Decoration, literals: &[u32]) {
        let mut operands = vec![ty, member, decoration.word()];
        operands.extend_from_slice(literals);
        self.annotations.extend(encode(Op::MemberDecorate, &operands));
    }

    pub fn entry_point(&mut self, model: ExecutionModel, function: u32, name: &str, interface: &[u32]) {
        let mut operands = vec![model.word(), function];
        operands.extend(encode_string(name));
        operands.extend_from_slice(interface);
        self.preamble.extend(encode(Op::EntryPoint, &operands));
    }

    pub fn execution_mode(&mut self, function: u32, mode: ExecutionMode, literals: &[u32]) {
        let mut operands = vec![function, mode.word()];
        operands.extend_from_slice(literals);
        self.preamble.extend(encode(Op::ExecutionMode, &operands));
    }

    /// Open a function. The caller emits parameters, labels and the body.
    pub fn begin_function(&mut self, result: u32, function_type: u32) -> u32 {
        let id = self.id();
        self.functions
            .extend(encode(Op::Function, &[result, id, 0, function_type]));
        id
    }

    pub fn function_parameter(&mut self, ty: u32) -> u32 {
        let id = self.id();
        self.functions.extend(encode(Op::FunctionParameter, &[ty, id]));
        id
    }

    /// Emit a block label.
    pub fn label(&mut self) -> u32 {
        let id = self.id();
        self.label_with(id);
        id
    }

    /// Emit a label for a previously allocated id (forward branch targets).
    pub fn label_with(&mut self, id: u32) {
        self.functions.extend(encode(Op::Label, &[id]));
    }

    /// Emit a function-body instruction with no result.
    pub fn emit(&mut self, op: Op, operands: &[u32]) {
        self.functions.extend(encode(op, operands));
    }

    /// Emit a function-body instruction producing a value of type `ty`.
    pub fn emit_result(&mut self, op: Op, ty: u32, operands: &[u32]) -> u32 {
        let id = self.id();
        let mut words = vec![ty, id];
        words.extend_from_slice(operands);
        self.functions.extend(encode(op, &words));
        id
    }

    /// Emit a `GLSL.std.450` extended instruction.
    pub fn ext_inst(&mut self, ty: u32, instruction: u32, operands: &[u32]) -> u32 {
        let set = self.glsl_import();
        let mut words = vec![set, instruction];
        words.extend_from_slice(operands);
        self.emit_result(Op::ExtInst, ty, &words)
    }

    /// Attach a source position to the following instructions.
    pub fn line(&mut self, file: u32, line: u32, column: u32) {
        self.functions.extend(encode(Op::Line, &[file, line, column]));
    }

    pub fn end_function(&mut self) {
        self.functions.extend(encode(Op::FunctionEnd, &[]));
    }

    /// Assemble the module with the id bound patched.
    pub fn build(&self) -> Vec<u32> {
        let mut words = vec![MAGIC, self.version, self.generator, self.next_id, 0];
        words.extend_from_slice(&self.capabilities);
        words.extend_from_slice(&self.imports);
        words.extend_from_slice(&self.preamble);
        words.extend_from_slice(&self.debug);
        words.extend_from_slice(&self.annotations);
        words.extend_from_slice(&self.globals);
        words.extend_from_slice(&self.functions);
        words
    }
}
