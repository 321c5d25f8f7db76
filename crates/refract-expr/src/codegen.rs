//! SPIR-V emission for parsed expressions.
//!
//! Expressions are lowered into the body of a single function appended to the
//! shader module. Names resolve to pointers ("places") so member access and
//! indexing can go through access chains; a place is loaded only when its
//! value is needed.

use std::collections::HashMap;

use refract_spirv::{GlslOp, ModuleBuilder, Op, StorageClass, TypeDesc};

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::{CompileError, CompileErrorKind, Result, Span};

/// How a name visible to the expression is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Module-scope variable, read in place.
    Global { id: u32, ty: u32, storage: StorageClass },
    /// Member of an anonymous block, reached through an access chain.
    BlockMember {
        block: u32,
        member: u32,
        ty: u32,
        storage: StorageClass,
    },
    /// Function-local value, copied into a private global before evaluation.
    Capture { ty: u32 },
}

/// Names and struct member names the expression may refer to.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    pub bindings: HashMap<String, Binding>,
    pub member_names: HashMap<(u32, u32), String>,
}

/// A local or argument the caller must copy into `global` before running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub global: u32,
    /// Value type (not the pointer type).
    pub ty: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Bool,
    Int,
    UInt,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar(Scalar),
    Vector(Scalar, u32),
    Matrix { columns: u32, rows: u32 },
    Other,
}

impl Shape {
    fn scalar(self) -> Option<Scalar> {
        match self {
            Shape::Scalar(s) | Shape::Vector(s, _) => Some(s),
            Shape::Matrix { .. } => Some(Scalar::Float),
            Shape::Other => None,
        }
    }

    fn width(self) -> u32 {
        match self {
            Shape::Vector(_, n) => n,
            _ => 1,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Shape::Scalar(s) | Shape::Vector(s, _) if s != Scalar::Bool)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Operand {
    pub id: u32,
    pub ty: u32,
}

enum Emitted {
    Value(Operand),
    Place {
        ptr: u32,
        ty: u32,
        storage: StorageClass,
    },
}

impl Emitted {
    fn ty(&self) -> u32 {
        match self {
            Emitted::Value(v) => v.ty,
            Emitted::Place { ty, .. } => *ty,
        }
    }
}

/// Type constructor call such as `vec3` or `mat2x3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constructor {
    Scalar(Scalar),
    Vector(Scalar, u32),
    /// `columns` columns of `rows` components each.
    Matrix { columns: u32, rows: u32 },
}

impl Constructor {
    fn parse(name: &str) -> Option<Self> {
        let size = |digits: &str| digits.parse::<u32>().ok().filter(|n| (2..=4).contains(n));
        let dims = |rest: &str| {
            let (c, r) = rest.split_once('x')?;
            Some(Constructor::Matrix {
                columns: size(c)?,
                rows: size(r)?,
            })
        };

        match name {
            "float" => return Some(Constructor::Scalar(Scalar::Float)),
            "int" => return Some(Constructor::Scalar(Scalar::Int)),
            "uint" => return Some(Constructor::Scalar(Scalar::UInt)),
            "bool" => return Some(Constructor::Scalar(Scalar::Bool)),
            _ => {}
        }
        if let Some(rest) = name.strip_prefix("mat") {
            return size(rest)
                .map(|n| Constructor::Matrix { columns: n, rows: n })
                .or_else(|| dims(rest));
        }
        let prefixes = [
            ("vec", Scalar::Float),
            ("ivec", Scalar::Int),
            ("uvec", Scalar::UInt),
            ("bvec", Scalar::Bool),
            ("float", Scalar::Float),
            ("int", Scalar::Int),
            ("uint", Scalar::UInt),
            ("bool", Scalar::Bool),
        ];
        for (prefix, kind) in prefixes {
            if let Some(rest) = name.strip_prefix(prefix) {
                if let Some(n) = size(rest) {
                    return Some(Constructor::Vector(kind, n));
                }
                if prefix == "float" {
                    return dims(rest);
                }
            }
        }
        None
    }

    fn describe(self) -> String {
        match self {
            Constructor::Scalar(_) => "scalar".to_string(),
            Constructor::Vector(_, n) => format!("vec{n}"),
            Constructor::Matrix { columns, rows } => format!("mat{columns}x{rows}"),
        }
    }
}

/// Component-wise GLSL built-in: arity, float form, signed and unsigned forms.
struct Builtin {
    arity: usize,
    float: GlslOp,
    signed: Option<GlslOp>,
    unsigned: Option<GlslOp>,
}

fn componentwise(name: &str) -> Option<Builtin> {
    let plain = |arity, float| Builtin {
        arity,
        float,
        signed: None,
        unsigned: None,
    };
    let integral = |arity, float, signed, unsigned| Builtin {
        arity,
        float,
        signed: Some(signed),
        unsigned,
    };
    Some(match name {
        "sin" => plain(1, GlslOp::Sin),
        "cos" => plain(1, GlslOp::Cos),
        "tan" => plain(1, GlslOp::Tan),
        "asin" => plain(1, GlslOp::Asin),
        "acos" => plain(1, GlslOp::Acos),
        "sinh" => plain(1, GlslOp::Sinh),
        "cosh" => plain(1, GlslOp::Cosh),
        "tanh" => plain(1, GlslOp::Tanh),
        "radians" => plain(1, GlslOp::Radians),
        "degrees" => plain(1, GlslOp::Degrees),
        "exp" => plain(1, GlslOp::Exp),
        "exp2" => plain(1, GlslOp::Exp2),
        "log" => plain(1, GlslOp::Log),
        "log2" => plain(1, GlslOp::Log2),
        "sqrt" => plain(1, GlslOp::Sqrt),
        "inversesqrt" => plain(1, GlslOp::InverseSqrt),
        "floor" => plain(1, GlslOp::Floor),
        "ceil" => plain(1, GlslOp::Ceil),
        "fract" => plain(1, GlslOp::Fract),
        "round" => plain(1, GlslOp::Round),
        "roundEven" => plain(1, GlslOp::RoundEven),
        "trunc" => plain(1, GlslOp::Trunc),
        "abs" => integral(1, GlslOp::FAbs, GlslOp::SAbs, None),
        "sign" => integral(1, GlslOp::FSign, GlslOp::SSign, None),
        "pow" => plain(2, GlslOp::Pow),
        "step" => plain(2, GlslOp::Step),
        "min" => integral(2, GlslOp::FMin, GlslOp::SMin, Some(GlslOp::UMin)),
        "max" => integral(2, GlslOp::FMax, GlslOp::SMax, Some(GlslOp::UMax)),
        "clamp" => integral(3, GlslOp::FClamp, GlslOp::SClamp, Some(GlslOp::UClamp)),
        "mix" => plain(3, GlslOp::FMix),
        "smoothstep" => plain(3, GlslOp::SmoothStep),
        "fma" => plain(3, GlslOp::Fma),
        _ => return None,
    })
}

const SWIZZLE_SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];

/// Component indices for a swizzle, or `None` if it is malformed for `width`.
fn swizzle_indices(name: &str, width: u32) -> Option<Vec<u32>> {
    if name.is_empty() || name.len() > 4 {
        return None;
    }
    SWIZZLE_SETS
        .iter()
        .find_map(|set| {
            name.chars()
                .map(|c| set.find(c).map(|i| i as u32))
                .collect::<Option<Vec<_>>>()
        })
        .filter(|indices| indices.iter().all(|&i| i < width))
}

/// Common scalar kind for mixed operands: float wins, then unsigned.
fn unify(a: Scalar, b: Scalar) -> Scalar {
    match (a, b) {
        _ if a == b => a,
        (Scalar::Float, _) | (_, Scalar::Float) => Scalar::Float,
        _ => Scalar::UInt,
    }
}

/// Lowers expression trees into the currently open function of a builder.
pub(crate) struct Emitter<'a> {
    b: &'a mut ModuleBuilder,
    scope: &'a Scope,
    captures: Vec<Capture>,
    referenced: Vec<String>,
}

impl<'a> Emitter<'a> {
    pub fn new(b: &'a mut ModuleBuilder, scope: &'a Scope) -> Self {
        Self {
            b,
            scope,
            captures: Vec::new(),
            referenced: Vec::new(),
        }
    }

    /// Captured locals and every name the expression referenced, in first-use order.
    pub fn finish(self) -> (Vec<Capture>, Vec<String>) {
        (self.captures, self.referenced)
    }

    /// Emit `expr` and load its value.
    pub fn value(&mut self, expr: &Expr) -> Result<Operand> {
        let emitted = self.emit(expr)?;
        Ok(self.load(emitted))
    }

    fn emit(&mut self, expr: &Expr) -> Result<Emitted> {
        let span = &expr.span;
        let value = match &expr.kind {
            ExprKind::Float(v) => Operand {
                id: self.b.constant_f32(*v),
                ty: self.b.type_float(),
            },
            ExprKind::Int(v) => Operand {
                id: self.b.constant_i32(*v),
                ty: self.b.type_int(),
            },
            ExprKind::UInt(v) => Operand {
                id: self.b.constant_u32(*v),
                ty: self.b.type_uint(),
            },
            ExprKind::Bool(v) => Operand {
                id: self.b.constant_bool(*v),
                ty: self.b.type_bool(),
            },
            ExprKind::Ident(name) => return self.ident(name, span),
            ExprKind::Member { base, name } => return self.member(base, name, span),
            ExprKind::Index { base, index } => return self.index(base, index, span),
            ExprKind::Unary { op, operand } => self.unary(*op, operand, span)?,
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, span)?,
            ExprKind::Call { name, args } => self.call(name, args, span)?,
        };
        Ok(Emitted::Value(value))
    }

    fn load(&mut self, emitted: Emitted) -> Operand {
        match emitted {
            Emitted::Value(v) => v,
            Emitted::Place { ptr, ty, .. } => Operand {
                id: self.b.emit_result(Op::Load, ty, &[ptr]),
                ty,
            },
        }
    }

    fn shape(&self, ty: u32) -> Shape {
        let types = self.b.types();
        match types.get(ty) {
            Some(TypeDesc::Bool) => Shape::Scalar(Scalar::Bool),
            Some(TypeDesc::Int { signed: true, .. }) => Shape::Scalar(Scalar::Int),
            Some(TypeDesc::Int { .. }) => Shape::Scalar(Scalar::UInt),
            Some(TypeDesc::Float { .. }) => Shape::Scalar(Scalar::Float),
            Some(TypeDesc::Vector { component, count }) => match self.shape(*component) {
                Shape::Scalar(s) => Shape::Vector(s, *count),
                _ => Shape::Other,
            },
            Some(TypeDesc::Matrix { column, columns }) => Shape::Matrix {
                columns: *columns,
                rows: types.component_count(*column),
            },
            _ => Shape::Other,
        }
    }

    fn scalar_type(&mut self, kind: Scalar) -> u32 {
        match kind {
            Scalar::Bool => self.b.type_bool(),
            Scalar::Int => self.b.type_int(),
            Scalar::UInt => self.b.type_uint(),
            Scalar::Float => self.b.type_float(),
        }
    }

    /// Scalar type for width 1, vector type otherwise.
    fn type_of(&mut self, kind: Scalar, width: u32) -> u32 {
        let scalar = self.scalar_type(kind);
        if width == 1 {
            scalar
        } else {
            self.b.type_vector(scalar, width)
        }
    }

    fn matrix_type(&mut self, columns: u32, rows: u32) -> u32 {
        let column = self.type_of(Scalar::Float, rows);
        self.b.type_matrix(column, columns)
    }

    fn zero(&mut self, kind: Scalar) -> u32 {
        match kind {
            Scalar::Bool => self.b.constant_bool(false),
            Scalar::Int => self.b.constant_i32(0),
            Scalar::UInt => self.b.constant_u32(0),
            Scalar::Float => self.b.constant_f32(0.0),
        }
    }

    fn one(&mut self, kind: Scalar) -> u32 {
        match kind {
            Scalar::Bool => self.b.constant_bool(true),
            Scalar::Int => self.b.constant_i32(1),
            Scalar::UInt => self.b.constant_u32(1),
            Scalar::Float => self.b.constant_f32(1.0),
        }
    }

    /// Splat a scalar constant to `width` components.
    fn splat_constant(&mut self, scalar: u32, kind: Scalar, width: u32) -> u32 {
        if width == 1 {
            return scalar;
        }
        let ty = self.type_of(kind, width);
        self.b.constant_composite(ty, &vec![scalar; width as usize])
    }

    fn ident(&mut self, name: &str, span: &Span) -> Result<Emitted> {
        let scope = self.scope;
        let Some(binding) = scope.bindings.get(name) else {
            return Err(CompileError::new(
                CompileErrorKind::UnknownIdentifier,
                format!("unknown identifier `{name}`"),
                span.clone(),
            ));
        };
        if !self.referenced.iter().any(|n| n == name) {
            self.referenced.push(name.to_string());
        }
        Ok(match *binding {
            Binding::Global { id, ty, storage } => Emitted::Place { ptr: id, ty, storage },
            Binding::BlockMember {
                block,
                member,
                ty,
                storage,
            } => {
                let index = self.b.constant_i32(member as i32);
                let pointer = self.b.type_pointer(storage, ty);
                let ptr = self.b.emit_result(Op::AccessChain, pointer, &[block, index]);
                Emitted::Place { ptr, ty, storage }
            }
            Binding::Capture { ty } => {
                let global = match self.captures.iter().find(|c| c.name == name) {
                    Some(capture) => capture.global,
                    None => {
                        let global = self.b.variable(ty, StorageClass::Private);
                        self.b.name(global, name);
                        self.captures.push(Capture {
                            name: name.to_string(),
                            global,
                            ty,
                        });
                        global
                    }
                };
                Emitted::Place {
                    ptr: global,
                    ty,
                    storage: StorageClass::Private,
                }
            }
        })
    }

    fn member(&mut self, base: &Expr, name: &str, span: &Span) -> Result<Emitted> {
        let target = self.emit(base)?;
        let ty = target.ty();
        if let Shape::Vector(kind, width) = self.shape(ty) {
            let vector = self.load(target);
            return self.swizzle(vector, kind, width, name, span).map(Emitted::Value);
        }

        let Some(TypeDesc::Struct { members }) = self.b.types().get(ty).cloned() else {
            return Err(CompileError::mismatch(
                format!("`.{name}` applied to a value that is neither a vector nor a struct"),
                span.clone(),
            ));
        };
        let Some(index) = (0..members.len() as u32)
            .find(|i| self.scope.member_names.get(&(ty, *i)).map(String::as_str) == Some(name))
        else {
            return Err(CompileError::new(
                CompileErrorKind::UnknownIdentifier,
                format!("struct has no member `{name}`"),
                span.clone(),
            ));
        };
        let member_ty = members[index as usize];

        Ok(match target {
            Emitted::Place { ptr, storage, .. } => {
                let constant = self.b.constant_i32(index as i32);
                let pointer = self.b.type_pointer(storage, member_ty);
                let ptr = self.b.emit_result(Op::AccessChain, pointer, &[ptr, constant]);
                Emitted::Place {
                    ptr,
                    ty: member_ty,
                    storage,
                }
            }
            Emitted::Value(v) => Emitted::Value(Operand {
                id: self
                    .b
                    .emit_result(Op::CompositeExtract, member_ty, &[v.id, index]),
                ty: member_ty,
            }),
        })
    }

    fn swizzle(
        &mut self,
        vector: Operand,
        kind: Scalar,
        width: u32,
        name: &str,
        span: &Span,
    ) -> Result<Operand> {
        let Some(indices) = swizzle_indices(name, width) else {
            return Err(CompileError::new(
                CompileErrorKind::InvalidSwizzle,
                format!("invalid swizzle `.{name}` on a {width}-component vector"),
                span.clone(),
            ));
        };
        if let [index] = indices[..] {
            let ty = self.scalar_type(kind);
            let id = self
                .b
                .emit_result(Op::CompositeExtract, ty, &[vector.id, index]);
            return Ok(Operand { id, ty });
        }
        let ty = self.type_of(kind, indices.len() as u32);
        let mut operands = vec![vector.id, vector.id];
        operands.extend(indices);
        let id = self.b.emit_result(Op::VectorShuffle, ty, &operands);
        Ok(Operand { id, ty })
    }

    fn element_type(&self, ty: u32) -> Option<u32> {
        match self.b.types().get(ty)? {
            TypeDesc::Vector { component, .. } => Some(*component),
            TypeDesc::Matrix { column, .. } => Some(*column),
            TypeDesc::Array { element, .. } | TypeDesc::RuntimeArray { element } => Some(*element),
            _ => None,
        }
    }

    fn index(&mut self, base: &Expr, index: &Expr, span: &Span) -> Result<Emitted> {
        let target = self.emit(base)?;
        let ty = target.ty();
        let Some(element) = self.element_type(ty) else {
            return Err(CompileError::mismatch(
                "indexed value is not a vector, matrix or array",
                span.clone(),
            ));
        };
        let idx = self.value(index)?;
        if !matches!(self.shape(idx.ty), Shape::Scalar(Scalar::Int | Scalar::UInt)) {
            return Err(CompileError::mismatch(
                "index must be an integer scalar",
                index.span.clone(),
            ));
        }

        match target {
            Emitted::Place { ptr, storage, .. } => {
                let pointer = self.b.type_pointer(storage, element);
                let ptr = self.b.emit_result(Op::AccessChain, pointer, &[ptr, idx.id]);
                Ok(Emitted::Place {
                    ptr,
                    ty: element,
                    storage,
                })
            }
            Emitted::Value(v) => {
                let id = match (self.shape(ty), &index.kind) {
                    (Shape::Vector(..), _) => {
                        self.b
                            .emit_result(Op::VectorExtractDynamic, element, &[v.id, idx.id])
                    }
                    (_, ExprKind::Int(i)) if *i >= 0 => {
                        self.b
                            .emit_result(Op::CompositeExtract, element, &[v.id, *i as u32])
                    }
                    (_, ExprKind::UInt(i)) => {
                        self.b.emit_result(Op::CompositeExtract, element, &[v.id, *i])
                    }
                    _ => {
                        return Err(CompileError::mismatch(
                            "only constant indices are allowed on temporary values",
                            index.span.clone(),
                        ))
                    }
                };
                Ok(Emitted::Value(Operand { id, ty: element }))
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, span: &Span) -> Result<Operand> {
        let v = self.value(operand)?;
        let shape = self.shape(v.ty);
        let opcode = match (op, shape.scalar()) {
            (UnaryOp::Neg, Some(Scalar::Float)) => Op::FNegate,
            (UnaryOp::Neg, Some(Scalar::Int | Scalar::UInt)) => Op::SNegate,
            (UnaryOp::Not, Some(Scalar::Bool)) => Op::LogicalNot,
            (UnaryOp::Neg, _) => {
                return Err(CompileError::mismatch("`-` requires a numeric operand", span.clone()))
            }
            (UnaryOp::Not, _) => {
                return Err(CompileError::mismatch("`!` requires a boolean operand", span.clone()))
            }
        };
        Ok(Operand {
            id: self.b.emit_result(opcode, v.ty, &[v.id]),
            ty: v.ty,
        })
    }

    /// Convert `v` to component kind `to`, keeping its width.
    fn convert(&mut self, v: Operand, to: Scalar, span: &Span) -> Result<Operand> {
        let shape = self.shape(v.ty);
        let Some(from) = shape.scalar().filter(|_| !matches!(shape, Shape::Matrix { .. })) else {
            return Err(CompileError::mismatch(
                "expected a scalar or vector operand",
                span.clone(),
            ));
        };
        if from == to {
            return Ok(v);
        }
        let width = shape.width();
        let ty = self.type_of(to, width);
        let id = match (from, to) {
            (Scalar::Bool, _) => {
                let one = self.one(to);
                let one = self.splat_constant(one, to, width);
                let zero = self.zero(to);
                let zero = self.splat_constant(zero, to, width);
                self.b.emit_result(Op::Select, ty, &[v.id, one, zero])
            }
            (_, Scalar::Bool) => {
                let zero = self.zero(from);
                let zero = self.splat_constant(zero, from, width);
                let opcode = if from == Scalar::Float {
                    Op::FUnordNotEqual
                } else {
                    Op::INotEqual
                };
                self.b.emit_result(opcode, ty, &[v.id, zero])
            }
            (Scalar::Int, Scalar::Float) => self.b.emit_result(Op::ConvertSToF, ty, &[v.id]),
            (Scalar::UInt, Scalar::Float) => self.b.emit_result(Op::ConvertUToF, ty, &[v.id]),
            (Scalar::Float, Scalar::Int) => self.b.emit_result(Op::ConvertFToS, ty, &[v.id]),
            (Scalar::Float, Scalar::UInt) => self.b.emit_result(Op::ConvertFToU, ty, &[v.id]),
            _ => self.b.emit_result(Op::Bitcast, ty, &[v.id]),
        };
        Ok(Operand { id, ty })
    }

    /// Widen a scalar to a `width`-component vector.
    fn broadcast(&mut self, v: Operand, width: u32) -> Operand {
        let shape = self.shape(v.ty);
        if width == 1 || shape.width() == width {
            return v;
        }
        let kind = shape.scalar().unwrap_or(Scalar::Float);
        let ty = self.type_of(kind, width);
        let id = self
            .b
            .emit_result(Op::CompositeConstruct, ty, &vec![v.id; width as usize]);
        Operand { id, ty }
    }

    /// Bring scalar/vector operands to kind `kind` and a common width.
    fn balance(&mut self, operands: &[Operand], kind: Scalar, span: &Span) -> Result<(Vec<Operand>, u32)> {
        let widths: Vec<u32> = operands.iter().map(|v| self.shape(v.ty).width()).collect();
        let width = widths.iter().copied().max().unwrap_or(1);
        if let Some(bad) = widths.iter().find(|w| **w != 1 && **w != width) {
            return Err(CompileError::mismatch(
                format!("vector size mismatch: {bad} and {width} components"),
                span.clone(),
            ));
        }
        let mut balanced = Vec::with_capacity(operands.len());
        for v in operands {
            let converted = self.convert(*v, kind, span)?;
            balanced.push(self.broadcast(converted, width));
        }
        Ok((balanced, width))
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: &Span) -> Result<Operand> {
        let l = self.value(left)?;
        let r = self.value(right)?;
        let (ls, rs) = (self.shape(l.ty), self.shape(r.ty));

        if op.is_logical() {
            if ls != Shape::Scalar(Scalar::Bool) || rs != Shape::Scalar(Scalar::Bool) {
                return Err(CompileError::mismatch(
                    "`&&` and `||` require boolean operands",
                    span.clone(),
                ));
            }
            let opcode = if op == BinaryOp::And {
                Op::LogicalAnd
            } else {
                Op::LogicalOr
            };
            let ty = self.b.type_bool();
            return Ok(Operand {
                id: self.b.emit_result(opcode, ty, &[l.id, r.id]),
                ty,
            });
        }

        if matches!(ls, Shape::Matrix { .. }) || matches!(rs, Shape::Matrix { .. }) {
            return self.matrix_binary(op, l, ls, r, rs, span);
        }
        let (Some(lk), Some(rk)) = (ls.scalar(), rs.scalar()) else {
            return Err(CompileError::mismatch(
                "operands must be scalars, vectors or matrices",
                span.clone(),
            ));
        };

        if lk == Scalar::Bool || rk == Scalar::Bool {
            if lk != rk || !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                return Err(CompileError::mismatch(
                    "boolean operands only support `==` and `!=`",
                    span.clone(),
                ));
            }
        }

        let kind = unify(lk, rk);
        let (operands, width) = self.balance(&[l, r], kind, span)?;
        let (l, r) = (operands[0], operands[1]);

        let opcode = match (op, kind) {
            (BinaryOp::Add, Scalar::Float) => Op::FAdd,
            (BinaryOp::Sub, Scalar::Float) => Op::FSub,
            (BinaryOp::Mul, Scalar::Float) => Op::FMul,
            (BinaryOp::Div, Scalar::Float) => Op::FDiv,
            (BinaryOp::Mod, Scalar::Float) => Op::FMod,
            (BinaryOp::Add, _) => Op::IAdd,
            (BinaryOp::Sub, _) => Op::ISub,
            (BinaryOp::Mul, _) => Op::IMul,
            (BinaryOp::Div, Scalar::Int) => Op::SDiv,
            (BinaryOp::Div, _) => Op::UDiv,
            (BinaryOp::Mod, Scalar::Int) => Op::SMod,
            (BinaryOp::Mod, _) => Op::UMod,
            _ => return self.compare(op, kind, l, r, width, span),
        };
        Ok(Operand {
            id: self.b.emit_result(opcode, l.ty, &[l.id, r.id]),
            ty: l.ty,
        })
    }

    fn compare(
        &mut self,
        op: BinaryOp,
        kind: Scalar,
        l: Operand,
        r: Operand,
        width: u32,
        span: &Span,
    ) -> Result<Operand> {
        if width > 1 && !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            return Err(CompileError::mismatch(
                "vectors can only be compared with `==` and `!=`",
                span.clone(),
            ));
        }
        let opcode = match (op, kind) {
            (BinaryOp::Eq, Scalar::Bool) => Op::LogicalEqual,
            (BinaryOp::Ne, Scalar::Bool) => Op::LogicalNotEqual,
            (BinaryOp::Eq, Scalar::Float) => Op::FOrdEqual,
            (BinaryOp::Ne, Scalar::Float) => Op::FUnordNotEqual,
            (BinaryOp::Lt, Scalar::Float) => Op::FOrdLessThan,
            (BinaryOp::Le, Scalar::Float) => Op::FOrdLessThanEqual,
            (BinaryOp::Gt, Scalar::Float) => Op::FOrdGreaterThan,
            (BinaryOp::Ge, Scalar::Float) => Op::FOrdGreaterThanEqual,
            (BinaryOp::Eq, _) => Op::IEqual,
            (BinaryOp::Ne, _) => Op::INotEqual,
            (BinaryOp::Lt, Scalar::Int) => Op::SLessThan,
            (BinaryOp::Le, Scalar::Int) => Op::SLessThanEqual,
            (BinaryOp::Gt, Scalar::Int) => Op::SGreaterThan,
            (BinaryOp::Ge, Scalar::Int) => Op::SGreaterThanEqual,
            (BinaryOp::Lt, _) => Op::ULessThan,
            (BinaryOp::Le, _) => Op::ULessThanEqual,
            (BinaryOp::Gt, _) => Op::UGreaterThan,
            _ => Op::UGreaterThanEqual,
        };
        let bool_ty = self.b.type_bool();
        let ty = self.type_of(Scalar::Bool, width);
        let id = self.b.emit_result(opcode, ty, &[l.id, r.id]);
        if width == 1 {
            return Ok(Operand { id, ty });
        }
        let reduce = if op == BinaryOp::Eq { Op::All } else { Op::Any };
        Ok(Operand {
            id: self.b.emit_result(reduce, bool_ty, &[id]),
            ty: bool_ty,
        })
    }

    fn matrix_binary(
        &mut self,
        op: BinaryOp,
        l: Operand,
        ls: Shape,
        r: Operand,
        rs: Shape,
        span: &Span,
    ) -> Result<Operand> {
        let mismatch = || CompileError::mismatch("incompatible matrix operands", span.clone());
        let (opcode, ty, operands) = match (op, ls, rs) {
            (
                BinaryOp::Mul,
                Shape::Matrix { columns, rows },
                Shape::Matrix {
                    columns: r_columns,
                    rows: r_rows,
                },
            ) => {
                if columns != r_rows {
                    return Err(mismatch());
                }
                let ty = self.matrix_type(r_columns, rows);
                (Op::MatrixTimesMatrix, ty, [l.id, r.id])
            }
            (BinaryOp::Mul, Shape::Matrix { columns, rows }, Shape::Vector(_, n)) => {
                if n != columns {
                    return Err(mismatch());
                }
                let r = self.convert(r, Scalar::Float, span)?;
                let ty = self.type_of(Scalar::Float, rows);
                (Op::MatrixTimesVector, ty, [l.id, r.id])
            }
            (BinaryOp::Mul, Shape::Vector(_, n), Shape::Matrix { columns, rows }) => {
                if n != rows {
                    return Err(mismatch());
                }
                let l = self.convert(l, Scalar::Float, span)?;
                let ty = self.type_of(Scalar::Float, columns);
                (Op::VectorTimesMatrix, ty, [l.id, r.id])
            }
            (BinaryOp::Mul, Shape::Matrix { .. }, Shape::Scalar(_)) => {
                let r = self.convert(r, Scalar::Float, span)?;
                (Op::MatrixTimesScalar, l.ty, [l.id, r.id])
            }
            (BinaryOp::Mul, Shape::Scalar(_), Shape::Matrix { .. }) => {
                let l = self.convert(l, Scalar::Float, span)?;
                (Op::MatrixTimesScalar, r.ty, [r.id, l.id])
            }
            (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Div, a, b) if a == b => {
                let opcode = match op {
                    BinaryOp::Add => Op::FAdd,
                    BinaryOp::Sub => Op::FSub,
                    _ => Op::FDiv,
                };
                (opcode, l.ty, [l.id, r.id])
            }
            _ => return Err(mismatch()),
        };
        Ok(Operand {
            id: self.b.emit_result(opcode, ty, &operands),
            ty,
        })
    }

    fn call(&mut self, name: &str, args: &[Expr], span: &Span) -> Result<Operand> {
        if let Some(constructor) = Constructor::parse(name) {
            return self.construct(constructor, args, span);
        }
        let values = self.values(args)?;
        self.builtin(name, &values, span)
    }

    /// Each argument evaluated once, left to right.
    fn values(&mut self, args: &[Expr]) -> Result<Vec<Operand>> {
        args.iter().map(|arg| self.value(arg)).collect()
    }

    /// Scalar components of the already evaluated constructor arguments
    /// `values`, converted to `kind`.
    fn components(
        &mut self,
        args: &[Expr],
        values: Vec<Operand>,
        kind: Scalar,
        constructor: Constructor,
    ) -> Result<Vec<u32>> {
        let mut components = Vec::new();
        for (arg, v) in args.iter().zip(values) {
            let v = match self.shape(v.ty) {
                Shape::Scalar(_) | Shape::Vector(..) => self.convert(v, kind, &arg.span)?,
                _ => {
                    return Err(CompileError::new(
                        CompileErrorKind::InvalidConstructor,
                        format!("{} arguments must be scalars or vectors", constructor.describe()),
                        arg.span.clone(),
                    ))
                }
            };
            match self.shape(v.ty) {
                Shape::Vector(_, n) => {
                    let scalar = self.scalar_type(kind);
                    for i in 0..n {
                        components.push(self.b.emit_result(Op::CompositeExtract, scalar, &[v.id, i]));
                    }
                }
                _ => components.push(v.id),
            }
        }
        Ok(components)
    }

    fn construct(&mut self, constructor: Constructor, args: &[Expr], span: &Span) -> Result<Operand> {
        let wrong_count = |expected: u32, got: usize| {
            CompileError::new(
                CompileErrorKind::InvalidConstructor,
                format!(
                    "{} constructor needs {expected} components, got {got}",
                    constructor.describe()
                ),
                span.clone(),
            )
        };
        match constructor {
            Constructor::Scalar(kind) => {
                let [arg] = args else {
                    return Err(wrong_count(1, args.len()));
                };
                let v = self.value(arg)?;
                let v = match self.shape(v.ty) {
                    Shape::Vector(s, _) => {
                        let ty = self.scalar_type(s);
                        Operand {
                            id: self.b.emit_result(Op::CompositeExtract, ty, &[v.id, 0]),
                            ty,
                        }
                    }
                    _ => v,
                };
                self.convert(v, kind, &arg.span)
            }
            Constructor::Vector(kind, n) => {
                let values = self.values(args)?;
                if let ([arg], [v]) = (args, values.as_slice()) {
                    if let Shape::Scalar(_) = self.shape(v.ty) {
                        let v = self.convert(*v, kind, &arg.span)?;
                        return Ok(self.broadcast(v, n));
                    }
                }
                let components = self.components(args, values, kind, constructor)?;
                if components.len() != n as usize {
                    return Err(wrong_count(n, components.len()));
                }
                let ty = self.type_of(kind, n);
                Ok(Operand {
                    id: self.b.emit_result(Op::CompositeConstruct, ty, &components),
                    ty,
                })
            }
            Constructor::Matrix { columns, rows } => {
                let values = self.values(args)?;
                let components = self.components(args, values, Scalar::Float, constructor)?;
                if components.len() != (columns * rows) as usize {
                    return Err(wrong_count(columns * rows, components.len()));
                }
                let column_ty = self.type_of(Scalar::Float, rows);
                let column_ids: Vec<u32> = components
                    .chunks(rows as usize)
                    .map(|chunk| self.b.emit_result(Op::CompositeConstruct, column_ty, chunk))
                    .collect();
                let ty = self.matrix_type(columns, rows);
                Ok(Operand {
                    id: self.b.emit_result(Op::CompositeConstruct, ty, &column_ids),
                    ty,
                })
            }
        }
    }

    fn builtin(&mut self, name: &str, args: &[Operand], span: &Span) -> Result<Operand> {
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(CompileError::mismatch(
                    format!("`{name}` takes {expected} arguments, got {}", args.len()),
                    span.clone(),
                ))
            }
        };
        for v in args {
            if !self.shape(v.ty).is_numeric() {
                return Err(CompileError::mismatch(
                    format!("`{name}` requires scalar or vector arguments"),
                    span.clone(),
                ));
            }
        }

        match name {
            "dot" | "distance" => {
                arity(2)?;
                let (v, width) = self.balance(args, Scalar::Float, span)?;
                let ty = self.b.type_float();
                let id = match (name, width) {
                    ("dot", 1) => self.b.emit_result(Op::FMul, ty, &[v[0].id, v[1].id]),
                    ("dot", _) => self.b.emit_result(Op::Dot, ty, &[v[0].id, v[1].id]),
                    _ => self
                        .b
                        .ext_inst(ty, GlslOp::Distance.word(), &[v[0].id, v[1].id]),
                };
                Ok(Operand { id, ty })
            }
            "length" => {
                arity(1)?;
                let v = self.convert(args[0], Scalar::Float, span)?;
                let ty = self.b.type_float();
                let id = self.b.ext_inst(ty, GlslOp::Length.word(), &[v.id]);
                Ok(Operand { id, ty })
            }
            "normalize" => {
                arity(1)?;
                let v = self.convert(args[0], Scalar::Float, span)?;
                let id = self.b.ext_inst(v.ty, GlslOp::Normalize.word(), &[v.id]);
                Ok(Operand { id, ty: v.ty })
            }
            "cross" => {
                arity(2)?;
                let (v, width) = self.balance(args, Scalar::Float, span)?;
                if width != 3 {
                    return Err(CompileError::mismatch("`cross` requires vec3 arguments", span.clone()));
                }
                let id = self
                    .b
                    .ext_inst(v[0].ty, GlslOp::Cross.word(), &[v[0].id, v[1].id]);
                Ok(Operand { id, ty: v[0].ty })
            }
            "atan" if args.len() == 2 => self.apply(GlslOp::Atan2, Scalar::Float, args, span),
            "atan" => {
                arity(1)?;
                self.apply(GlslOp::Atan, Scalar::Float, args, span)
            }
            _ => {
                let Some(builtin) = componentwise(name) else {
                    return Err(CompileError::new(
                        CompileErrorKind::UnknownFunction,
                        format!("unknown function `{name}`"),
                        span.clone(),
                    ));
                };
                arity(builtin.arity)?;
                let all = |kind: Scalar| args.iter().all(|v| self.shape(v.ty).scalar() == Some(kind));
                let (op, kind) = match (builtin.signed, builtin.unsigned) {
                    (Some(op), _) if all(Scalar::Int) => (op, Scalar::Int),
                    (_, Some(op)) if all(Scalar::UInt) => (op, Scalar::UInt),
                    _ => (builtin.float, Scalar::Float),
                };
                self.apply(op, kind, args, span)
            }
        }
    }

    /// Emit a component-wise extended instruction over balanced operands.
    fn apply(&mut self, op: GlslOp, kind: Scalar, args: &[Operand], span: &Span) -> Result<Operand> {
        let (v, width) = self.balance(args, kind, span)?;
        let ty = self.type_of(kind, width);
        let ids: Vec<u32> = v.iter().map(|o| o.id).collect();
        Ok(Operand {
            id: self.b.ext_inst(ty, op.word(), &ids),
            ty,
        })
    }
}
