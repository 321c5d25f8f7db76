//! Expression compiler facade.

use std::collections::HashMap;

use refract_introspect::{introspect, IntrospectionResult};
use refract_spirv::{Module, ModuleBuilder, Op, StorageClass};
use tracing::debug;

use crate::codegen::{Binding, Capture, Emitter, Scope};
use crate::error::{CompileError, Result};
use crate::parser::parse;

/// Debug name of the generated evaluation function.
pub const EVAL_FUNCTION: &str = "refract.eval";
/// Debug name of the private global that receives the result.
pub const RESULT_GLOBAL: &str = "refract.result";

/// Output of a successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledExpression {
    /// Input module extended with the evaluation function.
    pub words: Vec<u32>,
    /// Id of the `void()` function that evaluates the expression.
    pub function: u32,
    /// Private global the function stores its result into.
    pub result: u32,
    pub result_type: u32,
    /// Locals and arguments to copy in before running `function`.
    pub captures: Vec<Capture>,
    /// Every variable name the expression referenced.
    pub referenced: Vec<String>,
}

#[derive(Debug)]
struct Source {
    words: Vec<u32>,
    info: IntrospectionResult,
    member_names: HashMap<(u32, u32), String>,
}

impl Source {
    fn load(words: &[u32]) -> refract_spirv::Result<Self> {
        let info = introspect(words, true)?;
        let mut member_names = HashMap::new();
        for inst in Module::parse(words)?.instructions() {
            let inst = inst?;
            if inst.op() == Some(Op::MemberName) {
                let (name, _) = inst.string(2)?;
                member_names.insert((inst.word(0)?, inst.word(1)?), name);
            }
        }
        Ok(Self {
            words: words.to_vec(),
            info,
            member_names,
        })
    }

    /// Names visible from `function`. Locals shadow globals.
    fn scope(&self, function: Option<&str>) -> Scope {
        let mut bindings = HashMap::new();
        for u in &self.info.uniforms {
            let storage = u.storage.unwrap_or(StorageClass::Uniform);
            let binding = match u.block_member {
                Some(member) => Binding::BlockMember {
                    block: u.id,
                    member,
                    ty: u.type_id,
                    storage,
                },
                None => Binding::Global {
                    id: u.id,
                    ty: u.type_id,
                    storage,
                },
            };
            bindings.insert(u.name.clone(), binding);
        }
        for g in self.info.globals.iter().filter(|g| !g.name.is_empty()) {
            bindings.insert(
                g.name.clone(),
                Binding::Global {
                    id: g.id,
                    ty: g.type_id,
                    storage: g.storage.unwrap_or(StorageClass::Private),
                },
            );
        }

        let function = function
            .map(|name| name.split('(').next().unwrap_or(name))
            .and_then(|name| self.info.functions.get(name));
        if let Some(f) = function {
            for v in f.arguments.iter().chain(&f.locals) {
                if !v.name.is_empty() {
                    bindings.insert(v.name.clone(), Binding::Capture { ty: v.type_id });
                }
            }
        }

        Scope {
            bindings,
            member_names: self.member_names.clone(),
        }
    }
}

/// Compiles watch and condition expressions against a shader module.
///
/// Each compile appends a fresh evaluation function to a copy of the module;
/// the module set with [`set_module`](Self::set_module) is never modified.
#[derive(Debug, Default)]
pub struct ExpressionCompiler {
    source: Option<Source>,
    compiled: Option<CompiledExpression>,
}

impl ExpressionCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the module expressions are compiled against.
    pub fn set_module(&mut self, words: &[u32]) -> Result<()> {
        self.source = None;
        self.compiled = None;
        let source = Source::load(words).map_err(|e| CompileError::no_module(e.to_string()))?;
        self.source = Some(source);
        Ok(())
    }

    pub fn has_module(&self) -> bool {
        self.source.is_some()
    }

    /// Compile `expression` as seen from inside `current_function`.
    ///
    /// Returns the names of every variable the expression references. On
    /// failure the previous compiled output is discarded.
    pub fn compile(&mut self, expression: &str, current_function: Option<&str>) -> Result<Vec<String>> {
        self.compiled = None;
        let Some(source) = &self.source else {
            return Err(CompileError::no_module("no shader module has been set"));
        };
        let expr = parse(expression)?;
        let scope = source.scope(current_function);

        let mut builder = ModuleBuilder::from_words(&source.words)
            .map_err(|e| CompileError::no_module(e.to_string()))?;
        let void = builder.type_void();
        let function_type = builder.type_function(void, &[]);
        let function = builder.begin_function(void, function_type);
        builder.name(function, EVAL_FUNCTION);
        builder.label();

        let mut emitter = Emitter::new(&mut builder, &scope);
        let value = emitter.value(&expr)?;
        let (captures, referenced) = emitter.finish();

        let result = builder.variable(value.ty, StorageClass::Private);
        builder.name(result, RESULT_GLOBAL);
        builder.emit(Op::Store, &[result, value.id]);
        builder.emit(Op::Return, &[]);
        builder.end_function();

        debug!(
            expression,
            function,
            captures = captures.len(),
            "compiled expression"
        );
        self.compiled = Some(CompiledExpression {
            words: builder.build(),
            function,
            result,
            result_type: value.ty,
            captures,
            referenced: referenced.clone(),
        });
        Ok(referenced)
    }

    /// Module from the last successful compile, empty if there is none.
    pub fn compiled_module(&self) -> &[u32] {
        self.compiled.as_ref().map_or(&[], |c| c.words.as_slice())
    }

    pub fn compiled(&self) -> Option<&CompiledExpression> {
        self.compiled.as_ref()
    }

    /// Introspection of the current module.
    pub fn introspection(&self) -> Option<&IntrospectionResult> {
        self.source.as_ref().map(|s| &s.info)
    }
}
