//! Instruction semantics.

use refract_spirv::{Op, TypeDesc, GLSL_STD_450};

use crate::error::{ExecutionError, Result, UndefinedBehavior};
use crate::program::{Instr, Program};
use crate::session::{Status, StepEvent, VmSession};
use crate::value::{Pointer, PointerRoot, ScalarKind, Value};

/// `Lod` bit of the image operands mask.
const IMAGE_OPERAND_LOD: u32 = 0x2;

pub(crate) fn arg(instr: &Instr, index: usize) -> Result<u32> {
    instr
        .operands
        .get(index)
        .copied()
        .ok_or(ExecutionError::MissingOperand { op: instr.op, index })
}

/// Operands from `index` on; empty when the instruction is shorter.
fn tail(instr: &Instr, index: usize) -> &[u32] {
    instr.operands.get(index..).unwrap_or(&[])
}

pub(crate) fn mismatch(op: Op, message: impl Into<String>) -> ExecutionError {
    ExecutionError::TypeMismatch {
        op,
        message: message.into(),
    }
}

/// Apply `f` to every scalar of `v`.
pub(crate) fn map1(op: Op, v: &Value, f: &mut dyn FnMut(&Value) -> Result<Value>) -> Result<Value> {
    match v {
        Value::Composite(parts) => parts
            .iter()
            .map(|p| map1(op, p, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::Composite),
        scalar => f(scalar),
    }
}

/// Apply `f` component-wise; a scalar operand is broadcast against a composite.
pub(crate) fn map2(
    op: Op,
    a: &Value,
    b: &Value,
    f: &mut dyn FnMut(&Value, &Value) -> Result<Value>,
) -> Result<Value> {
    match (a, b) {
        (Value::Composite(x), Value::Composite(y)) => {
            if x.len() != y.len() {
                return Err(mismatch(op, format!("{} vs {} components", x.len(), y.len())));
            }
            x.iter()
                .zip(y)
                .map(|(p, q)| map2(op, p, q, f))
                .collect::<Result<Vec<_>>>()
                .map(Value::Composite)
        }
        (Value::Composite(x), s) => x
            .iter()
            .map(|p| map2(op, p, s, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::Composite),
        (s, Value::Composite(y)) => y
            .iter()
            .map(|q| map2(op, s, q, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::Composite),
        (x, y) => f(x, y),
    }
}

/// Three-operand component-wise application with scalar broadcast.
pub(crate) fn map3(
    op: Op,
    a: &Value,
    b: &Value,
    c: &Value,
    f: &mut dyn FnMut(&Value, &Value, &Value) -> Result<Value>,
) -> Result<Value> {
    let len = [a, b, c]
        .iter()
        .filter_map(|v| v.components().map(<[Value]>::len))
        .max();
    let Some(len) = len else {
        return f(a, b, c);
    };
    let pick = |v: &Value, i: usize| -> Result<Value> {
        match v {
            Value::Composite(parts) => parts
                .get(i)
                .cloned()
                .ok_or_else(|| mismatch(op, "component count differs")),
            scalar => Ok(scalar.clone()),
        }
    };
    (0..len)
        .map(|i| map3(op, &pick(a, i)?, &pick(b, i)?, &pick(c, i)?, f))
        .collect::<Result<Vec<_>>>()
        .map(Value::Composite)
}

pub(crate) fn float(op: Op, v: &Value) -> Result<f32> {
    match v {
        Value::Float(f) => Ok(*f),
        other => other
            .as_f32()
            .ok_or_else(|| mismatch(op, format!("expected a number, got {other:?}"))),
    }
}

pub(crate) fn bits(op: Op, v: &Value) -> Result<u32> {
    v.bits()
        .ok_or_else(|| mismatch(op, format!("expected a scalar, got {v:?}")))
}

fn boolean(op: Op, v: &Value) -> Result<bool> {
    v.as_bool()
        .ok_or_else(|| mismatch(op, format!("expected a bool, got {v:?}")))
}

fn floats(op: Op, v: &Value) -> Result<Vec<f32>> {
    match v {
        Value::Composite(parts) => parts.iter().map(|p| float(op, p)).collect(),
        scalar => Ok(vec![float(op, scalar)?]),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Matrix as columns of floats. Every column has the same, non-zero length.
pub(crate) fn columns(op: Op, m: &Value) -> Result<Vec<Vec<f32>>> {
    let cols = m
        .components()
        .ok_or_else(|| mismatch(op, "expected a matrix"))?
        .iter()
        .map(|c| floats(op, c))
        .collect::<Result<Vec<_>>>()?;
    let rows = cols.first().map_or(0, Vec::len);
    if rows == 0 || cols.iter().any(|c| c.len() != rows) {
        return Err(mismatch(op, "matrix columns differ in length"));
    }
    Ok(cols)
}

fn check_len(op: Op, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(mismatch(op, format!("expected {expected} components, found {actual}")))
    }
}

fn matrix(cols: Vec<Vec<f32>>) -> Value {
    Value::Composite(cols.iter().map(|c| Value::vector(c)).collect())
}

impl VmSession {
    pub(crate) fn value(&self, program: &Program, id: u32) -> Result<Value> {
        if let Some(v) = self.frame()?.values.get(&id) {
            return Ok(v.clone());
        }
        if let Some(c) = program.constant(id) {
            return Ok(c.clone());
        }
        if let Some(g) = program.global(id) {
            return Ok(Value::Pointer(Pointer::global(id, g.ty)));
        }
        Err(ExecutionError::UndefinedId { id })
    }

    fn operand(&self, program: &Program, instr: &Instr, index: usize) -> Result<Value> {
        self.value(program, arg(instr, index)?)
    }

    fn pointer(&self, program: &Program, instr: &Instr, index: usize) -> Result<Pointer> {
        match self.operand(program, instr, index)? {
            Value::Pointer(p) => Ok(p),
            other => Err(mismatch(instr.op, format!("expected a pointer, got {other:?}"))),
        }
    }

    fn set(&mut self, id: u32, value: Value) -> Result<()> {
        self.frame_mut()?.values.insert(id, value);
        Ok(())
    }

    fn scalar_kind(program: &Program, ty: u32) -> ScalarKind {
        program
            .types()
            .scalar_of(ty)
            .and_then(|s| program.types().get(s))
            .and_then(ScalarKind::of)
            .unwrap_or(ScalarKind::Float)
    }

    fn jump(&mut self, program: &Program, label: u32) -> Result<()> {
        self.ip = program
            .label(label)
            .ok_or(ExecutionError::InvalidTarget { id: label })?;
        Ok(())
    }

    pub(crate) fn execute(&mut self, program: &Program, instr: &Instr) -> Result<StepEvent> {
        let op = instr.op;
        match op {
            Op::Nop | Op::LoopMerge | Op::SelectionMerge => {}
            Op::Label => {
                let label = arg(instr, 0)?;
                let frame = self.frame_mut()?;
                frame.previous_block = frame.block;
                frame.block = label;
            }
            Op::Branch => self.jump(program, arg(instr, 0)?)?,
            Op::BranchConditional => {
                let cond = boolean(op, &self.operand(program, instr, 0)?)?;
                let target = if cond { arg(instr, 1)? } else { arg(instr, 2)? };
                self.jump(program, target)?;
            }
            Op::Switch => {
                let selector = bits(op, &self.operand(program, instr, 0)?)?;
                let mut target = arg(instr, 1)?;
                for pair in tail(instr, 2).chunks_exact(2) {
                    if pair[0] == selector {
                        target = pair[1];
                        break;
                    }
                }
                self.jump(program, target)?;
            }
            Op::Phi => {
                let previous = self.frame()?.previous_block;
                let chosen = tail(instr, 2)
                    .chunks_exact(2)
                    .find(|pair| pair[1] == previous)
                    .map(|pair| pair[0])
                    .ok_or_else(|| mismatch(op, format!("no incoming value from block {previous}")))?;
                let value = self.value(program, chosen)?;
                self.set(arg(instr, 1)?, value)?;
            }
            Op::Return => return Ok(self.pop_frame(None)),
            Op::ReturnValue => {
                let value = self.operand(program, instr, 0)?;
                return Ok(self.pop_frame(Some(value)));
            }
            Op::Kill | Op::TerminateInvocation => {
                self.status = Status::Killed;
                return Ok(StepEvent::Killed);
            }
            Op::DemoteToHelperInvocation => self.demoted = true,
            Op::Unreachable => return Err(ExecutionError::Unreachable),
            Op::FunctionCall => {
                let function = arg(instr, 2)?;
                let args = (3..instr.operands.len())
                    .map(|i| self.operand(program, instr, i))
                    .collect::<Result<Vec<_>>>()?;
                self.push_frame(function, args, Some(arg(instr, 1)?))?;
                return Ok(StepEvent::Called);
            }
            Op::ControlBarrier | Op::MemoryBarrier => return Ok(StepEvent::Barrier),
            Op::EmitVertex => return Ok(StepEvent::EmitVertex),
            Op::EndPrimitive => return Ok(StepEvent::EndPrimitive),
            Op::Store => {
                let ptr = self.pointer(program, instr, 0)?;
                let value = self.operand(program, instr, 1)?;
                self.write(&ptr, value);
            }
            Op::CopyMemory => {
                let target = self.pointer(program, instr, 0)?;
                let source = self.pointer(program, instr, 1)?;
                let value = self.read(&source);
                self.write(&target, value);
            }
            Op::AtomicStore => {
                let ptr = self.pointer(program, instr, 0)?;
                let value = self.operand(program, instr, 3)?;
                self.write(&ptr, value);
            }
            Op::ImageWrite => {
                tracing::trace!("image writes are not simulated");
            }
            _ => {
                let ty = arg(instr, 0)?;
                let id = arg(instr, 1)?;
                let value = self.compute(program, instr, ty)?;
                self.set(id, value)?;
            }
        }
        Ok(StepEvent::Executed)
    }

    /// Evaluate a result-producing instruction.
    fn compute(&mut self, program: &Program, instr: &Instr, ty: u32) -> Result<Value> {
        let op = instr.op;
        let types = program.types();
        let kind = Self::scalar_kind(program, ty);
        let a = |s: &Self| s.operand(program, instr, 2);
        let b = |s: &Self| s.operand(program, instr, 3);

        let value = match op {
            Op::Undef => Value::zero(types, ty),
            Op::Variable => {
                let var = arg(instr, 1)?;
                let pointee = types.resolve_id(ty);
                let init = match instr.operands.get(3) {
                    Some(id) => self.value(program, *id)?,
                    None => Value::zero(types, pointee),
                };
                self.frame_mut()?.memory.insert(var, init);
                let frame = self.frames.len() - 1;
                Value::Pointer(Pointer {
                    root: PointerRoot::Local { frame, var },
                    path: Vec::new(),
                    ty: pointee,
                })
            }
            Op::Load | Op::AtomicLoad => {
                let ptr = self.pointer(program, instr, 2)?;
                self.read(&ptr)
            }
            Op::AccessChain | Op::InBoundsAccessChain => self.access_chain(program, instr, ty)?,
            Op::ArrayLength => {
                let ptr = self.pointer(program, instr, 2)?;
                let member = arg(instr, 3)?;
                let len = self
                    .read(&ptr)
                    .at(&[member])
                    .and_then(Value::components)
                    .map_or(0, <[Value]>::len);
                Value::UInt(len as u32)
            }
            Op::CopyObject | Op::FConvert => a(self)?,
            Op::SNegate => map1(op, &a(self)?, &mut |v| {
                Ok(Value::from_bits(kind, (bits(op, v)? as i32).wrapping_neg() as u32))
            })?,
            Op::FNegate => map1(op, &a(self)?, &mut |v| Ok(Value::Float(-float(op, v)?)))?,
            Op::IAdd | Op::ISub | Op::IMul => {
                map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (bits(op, x)?, bits(op, y)?);
                    let r = match op {
                        Op::IAdd => x.wrapping_add(y),
                        Op::ISub => x.wrapping_sub(y),
                        _ => x.wrapping_mul(y),
                    };
                    Ok(Value::from_bits(kind, r))
                })?
            }
            Op::UDiv | Op::UMod | Op::SDiv | Op::SRem | Op::SMod => {
                let mut divided_by_zero = false;
                let v = map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (bits(op, x)?, bits(op, y)?);
                    if y == 0 {
                        divided_by_zero = true;
                        return Ok(Value::from_bits(kind, 0));
                    }
                    let (sx, sy) = (x as i32, y as i32);
                    let r = match op {
                        Op::UDiv => x / y,
                        Op::UMod => x % y,
                        Op::SDiv => sx.wrapping_div(sy) as u32,
                        Op::SRem => sx.wrapping_rem(sy) as u32,
                        _ => {
                            let r = sx.wrapping_rem(sy);
                            if r != 0 && (r < 0) != (sy < 0) {
                                r.wrapping_add(sy) as u32
                            } else {
                                r as u32
                            }
                        }
                    };
                    Ok(Value::from_bits(kind, r))
                })?;
                if divided_by_zero {
                    self.flag(UndefinedBehavior::DivisionByZero);
                }
                v
            }
            Op::FAdd | Op::FSub | Op::FMul | Op::FDiv | Op::FRem | Op::FMod
            | Op::VectorTimesScalar | Op::MatrixTimesScalar => {
                let mut divided_by_zero = false;
                let v = map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (float(op, x)?, float(op, y)?);
                    let r = match op {
                        Op::FAdd => x + y,
                        Op::FSub => x - y,
                        Op::FMul | Op::VectorTimesScalar | Op::MatrixTimesScalar => x * y,
                        _ if y == 0.0 => {
                            divided_by_zero = true;
                            match op {
                                Op::FDiv => x / y,
                                _ => 0.0,
                            }
                        }
                        Op::FDiv => x / y,
                        Op::FRem => x % y,
                        _ => x - y * (x / y).floor(),
                    };
                    Ok(Value::Float(r))
                })?;
                if divided_by_zero {
                    self.flag(UndefinedBehavior::DivisionByZero);
                }
                v
            }
            Op::Dot => {
                let (x, y) = (floats(op, &a(self)?)?, floats(op, &b(self)?)?);
                Value::Float(dot(&x, &y))
            }
            Op::VectorTimesMatrix => {
                let v = floats(op, &a(self)?)?;
                let m = columns(op, &b(self)?)?;
                check_len(op, v.len(), m[0].len())?;
                Value::vector(&m.iter().map(|c| dot(&v, c)).collect::<Vec<_>>())
            }
            Op::MatrixTimesVector => {
                let m = columns(op, &a(self)?)?;
                let v = floats(op, &b(self)?)?;
                check_len(op, v.len(), m.len())?;
                Value::vector(&mat_vec(&m, &v))
            }
            Op::MatrixTimesMatrix => {
                let left = columns(op, &a(self)?)?;
                let right = columns(op, &b(self)?)?;
                check_len(op, right[0].len(), left.len())?;
                matrix(right.iter().map(|c| mat_vec(&left, c)).collect())
            }
            Op::OuterProduct => {
                let c = floats(op, &a(self)?)?;
                let r = floats(op, &b(self)?)?;
                matrix(r.iter().map(|s| c.iter().map(|x| x * s).collect()).collect())
            }
            Op::Transpose => matrix(transpose(&columns(op, &a(self)?)?)),
            Op::Any | Op::All => {
                let parts = a(self)?.flatten();
                let flags = parts.iter().map(|p| boolean(op, p)).collect::<Result<Vec<_>>>()?;
                Value::Bool(if op == Op::Any {
                    flags.iter().any(|f| *f)
                } else {
                    flags.iter().all(|f| *f)
                })
            }
            Op::IsNan | Op::IsInf => map1(op, &a(self)?, &mut |v| {
                let f = float(op, v)?;
                Ok(Value::Bool(if op == Op::IsNan { f.is_nan() } else { f.is_infinite() }))
            })?,
            Op::LogicalNot => map1(op, &a(self)?, &mut |v| Ok(Value::Bool(!boolean(op, v)?)))?,
            Op::LogicalEqual | Op::LogicalNotEqual | Op::LogicalOr | Op::LogicalAnd => {
                map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (boolean(op, x)?, boolean(op, y)?);
                    Ok(Value::Bool(match op {
                        Op::LogicalEqual => x == y,
                        Op::LogicalNotEqual => x != y,
                        Op::LogicalOr => x || y,
                        _ => x && y,
                    }))
                })?
            }
            Op::Select => {
                let cond = a(self)?;
                let (x, y) = (b(self)?, self.operand(program, instr, 4)?);
                match cond {
                    Value::Bool(c) => {
                        if c {
                            x
                        } else {
                            y
                        }
                    }
                    cond => map3(op, &cond, &x, &y, &mut |c, x, y| {
                        Ok(if boolean(op, c)? { x.clone() } else { y.clone() })
                    })?,
                }
            }
            Op::IEqual | Op::INotEqual | Op::UGreaterThan | Op::SGreaterThan
            | Op::UGreaterThanEqual | Op::SGreaterThanEqual | Op::ULessThan | Op::SLessThan
            | Op::ULessThanEqual | Op::SLessThanEqual => {
                map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (bits(op, x)?, bits(op, y)?);
                    let (sx, sy) = (x as i32, y as i32);
                    Ok(Value::Bool(match op {
                        Op::IEqual => x == y,
                        Op::INotEqual => x != y,
                        Op::UGreaterThan => x > y,
                        Op::SGreaterThan => sx > sy,
                        Op::UGreaterThanEqual => x >= y,
                        Op::SGreaterThanEqual => sx >= sy,
                        Op::ULessThan => x < y,
                        Op::SLessThan => sx < sy,
                        Op::ULessThanEqual => x <= y,
                        _ => sx <= sy,
                    }))
                })?
            }
            Op::FOrdEqual | Op::FUnordEqual | Op::FOrdNotEqual | Op::FUnordNotEqual
            | Op::FOrdLessThan | Op::FUnordLessThan | Op::FOrdGreaterThan
            | Op::FUnordGreaterThan | Op::FOrdLessThanEqual | Op::FUnordLessThanEqual
            | Op::FOrdGreaterThanEqual | Op::FUnordGreaterThanEqual => {
                map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (float(op, x)?, float(op, y)?);
                    let unordered = x.is_nan() || y.is_nan();
                    let r = match op {
                        Op::FOrdEqual | Op::FUnordEqual => x == y,
                        Op::FOrdNotEqual | Op::FUnordNotEqual => x != y,
                        Op::FOrdLessThan | Op::FUnordLessThan => x < y,
                        Op::FOrdGreaterThan | Op::FUnordGreaterThan => x > y,
                        Op::FOrdLessThanEqual | Op::FUnordLessThanEqual => x <= y,
                        _ => x >= y,
                    };
                    let unordered_op = matches!(
                        op,
                        Op::FUnordEqual
                            | Op::FUnordNotEqual
                            | Op::FUnordLessThan
                            | Op::FUnordGreaterThan
                            | Op::FUnordLessThanEqual
                            | Op::FUnordGreaterThanEqual
                    );
                    Ok(Value::Bool(if unordered { unordered_op } else { r }))
                })?
            }
            Op::ShiftRightLogical | Op::ShiftRightArithmetic | Op::ShiftLeftLogical => {
                let mut out_of_range = false;
                let v = map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, n) = (bits(op, x)?, bits(op, y)?);
                    if n >= 32 {
                        out_of_range = true;
                        return Ok(Value::from_bits(kind, 0));
                    }
                    let r = match op {
                        Op::ShiftRightLogical => x >> n,
                        Op::ShiftRightArithmetic => ((x as i32) >> n) as u32,
                        _ => x << n,
                    };
                    Ok(Value::from_bits(kind, r))
                })?;
                if out_of_range {
                    self.flag(UndefinedBehavior::ShiftOutOfRange);
                }
                v
            }
            Op::BitwiseOr | Op::BitwiseXor | Op::BitwiseAnd => {
                map2(op, &a(self)?, &b(self)?, &mut |x, y| {
                    let (x, y) = (bits(op, x)?, bits(op, y)?);
                    let r = match op {
                        Op::BitwiseOr => x | y,
                        Op::BitwiseXor => x ^ y,
                        _ => x & y,
                    };
                    Ok(Value::from_bits(kind, r))
                })?
            }
            Op::Not => map1(op, &a(self)?, &mut |v| Ok(Value::from_bits(kind, !bits(op, v)?)))?,
            Op::BitReverse => {
                map1(op, &a(self)?, &mut |v| Ok(Value::from_bits(kind, bits(op, v)?.reverse_bits())))?
            }
            Op::BitCount => {
                map1(op, &a(self)?, &mut |v| Ok(Value::from_bits(kind, bits(op, v)?.count_ones())))?
            }
            Op::BitFieldInsert => {
                let base = a(self)?;
                let insert = b(self)?;
                let offset = bits(op, &self.operand(program, instr, 4)?)?;
                let count = bits(op, &self.operand(program, instr, 5)?)?;
                let mask = field_mask(offset, count);
                map2(op, &base, &insert, &mut |x, y| {
                    let (x, y) = (bits(op, x)?, bits(op, y)?);
                    Ok(Value::from_bits(kind, (x & !mask) | (y.wrapping_shl(offset) & mask)))
                })?
            }
            Op::BitFieldSExtract | Op::BitFieldUExtract => {
                let offset = bits(op, &b(self)?)?;
                let count = bits(op, &self.operand(program, instr, 4)?)?;
                map1(op, &a(self)?, &mut |v| {
                    let x = bits(op, v)?;
                    if count == 0 {
                        return Ok(Value::from_bits(kind, 0));
                    }
                    let field = (x & field_mask(offset, count)).wrapping_shr(offset);
                    let r = if op == Op::BitFieldSExtract && count < 32 {
                        let shift = 32 - count;
                        ((field << shift) as i32 >> shift) as u32
                    } else {
                        field
                    };
                    Ok(Value::from_bits(kind, r))
                })?
            }
            Op::ConvertFToU => map1(op, &a(self)?, &mut |v| Ok(Value::UInt(float(op, v)? as u32)))?,
            Op::ConvertFToS => map1(op, &a(self)?, &mut |v| Ok(Value::Int(float(op, v)? as i32)))?,
            Op::ConvertSToF => {
                map1(op, &a(self)?, &mut |v| Ok(Value::Float(bits(op, v)? as i32 as f32)))?
            }
            Op::ConvertUToF => map1(op, &a(self)?, &mut |v| Ok(Value::Float(bits(op, v)? as f32)))?,
            Op::UConvert | Op::SConvert | Op::Bitcast => {
                map1(op, &a(self)?, &mut |v| Ok(Value::from_bits(kind, bits(op, v)?)))?
            }
            Op::DPdx | Op::DPdy | Op::Fwidth | Op::DPdxFine | Op::DPdyFine | Op::FwidthFine
            | Op::DPdxCoarse | Op::DPdyCoarse | Op::FwidthCoarse => Value::zero(types, ty),
            Op::CompositeConstruct => {
                let parts = (2..instr.operands.len())
                    .map(|i| self.operand(program, instr, i))
                    .collect::<Result<Vec<_>>>()?;
                match types.get(ty) {
                    Some(TypeDesc::Vector { .. }) => {
                        Value::Composite(parts.iter().flat_map(Value::flatten).collect())
                    }
                    _ => Value::Composite(parts),
                }
            }
            Op::CompositeExtract => {
                let composite = a(self)?;
                composite
                    .at(tail(instr, 3))
                    .cloned()
                    .ok_or_else(|| mismatch(op, "extract index out of range"))?
            }
            Op::CompositeInsert => {
                let object = a(self)?;
                let mut composite = b(self)?;
                let slot = composite
                    .at_mut(tail(instr, 4))
                    .ok_or_else(|| mismatch(op, "insert index out of range"))?;
                *slot = object;
                composite
            }
            Op::VectorExtractDynamic => {
                let vector = a(self)?;
                let index = b(self)?.as_i64().unwrap_or(-1);
                match usize::try_from(index).ok().and_then(|i| vector.components()?.get(i)) {
                    Some(v) => v.clone(),
                    None => {
                        self.flag(UndefinedBehavior::IndexOutOfBounds);
                        Value::zero(types, ty)
                    }
                }
            }
            Op::VectorInsertDynamic => {
                let mut vector = a(self)?;
                let component = b(self)?;
                let index = self.operand(program, instr, 4)?.as_i64().unwrap_or(-1);
                match u32::try_from(index).ok().and_then(|i| vector.at_mut(&[i])) {
                    Some(slot) => *slot = component,
                    None => self.flag(UndefinedBehavior::IndexOutOfBounds),
                }
                vector
            }
            Op::VectorShuffle => {
                let mut pool = a(self)?.components().map(<[Value]>::to_vec).unwrap_or_default();
                pool.extend(b(self)?.components().map(<[Value]>::to_vec).unwrap_or_default());
                let zero = types.scalar_of(ty).map(|s| Value::zero(types, s)).unwrap_or_default();
                Value::Composite(
                    tail(instr, 4)
                        .iter()
                        .map(|i| pool.get(*i as usize).cloned().unwrap_or_else(|| zero.clone()))
                        .collect(),
                )
            }
            Op::SampledImage | Op::Image => a(self)?,
            Op::ImageSampleImplicitLod
            | Op::ImageSampleExplicitLod
            | Op::ImageSampleProjImplicitLod
            | Op::ImageSampleProjExplicitLod
            | Op::ImageFetch
            | Op::ImageRead
            | Op::ImageGather => self.sample(program, instr, ty)?,
            Op::ImageSampleDrefImplicitLod | Op::ImageSampleDrefExplicitLod => {
                let texel = self.sample(program, instr, ty)?;
                let reference = float(op, &self.operand(program, instr, 4)?)?;
                let stored = texel.flatten().first().and_then(Value::as_f32).unwrap_or(0.0);
                Value::Float(if reference <= stored { 1.0 } else { 0.0 })
            }
            Op::ImageQuerySize | Op::ImageQuerySizeLod => {
                let binding = self.handle(op, &a(self)?)?;
                let size = self
                    .sampler
                    .as_ref()
                    .map_or([1, 1], |s| s.size(binding));
                let parts = size.iter().map(|s| Value::from_bits(kind, *s)).collect();
                Value::Composite(parts)
            }
            Op::ImageQueryLod => Value::zero(types, ty),
            Op::ImageQueryLevels => Value::from_bits(kind, 1),
            Op::AtomicExchange | Op::AtomicIIncrement | Op::AtomicIDecrement | Op::AtomicIAdd
            | Op::AtomicISub | Op::AtomicSMin | Op::AtomicUMin | Op::AtomicSMax
            | Op::AtomicUMax | Op::AtomicAnd | Op::AtomicOr | Op::AtomicXor => {
                let ptr = self.pointer(program, instr, 2)?;
                let old = self.read(&ptr);
                let x = bits(op, &old)?;
                let y = match op {
                    Op::AtomicIIncrement | Op::AtomicIDecrement => 1,
                    _ => bits(op, &self.operand(program, instr, 5)?)?,
                };
                let new = match op {
                    Op::AtomicExchange => y,
                    Op::AtomicIIncrement | Op::AtomicIAdd => x.wrapping_add(y),
                    Op::AtomicIDecrement | Op::AtomicISub => x.wrapping_sub(y),
                    Op::AtomicSMin => (x as i32).min(y as i32) as u32,
                    Op::AtomicUMin => x.min(y),
                    Op::AtomicSMax => (x as i32).max(y as i32) as u32,
                    Op::AtomicUMax => x.max(y),
                    Op::AtomicAnd => x & y,
                    Op::AtomicOr => x | y,
                    _ => x ^ y,
                };
                self.write(&ptr, Value::from_bits(kind, new));
                old
            }
            Op::ExtInst => {
                let set = arg(instr, 2)?;
                let number = arg(instr, 3)?;
                if program.ext_set(set) != Some(GLSL_STD_450) {
                    return Err(ExecutionError::UnsupportedExtInst {
                        set,
                        instruction: number,
                    });
                }
                let args = (4..instr.operands.len())
                    .map(|i| self.operand(program, instr, i))
                    .collect::<Result<Vec<_>>>()?;
                self.glsl(program, ty, number, &args)?
            }
            other => return Err(ExecutionError::Unsupported(other)),
        };
        Ok(value)
    }

    fn access_chain(&mut self, program: &Program, instr: &Instr, ty: u32) -> Result<Value> {
        let pointee = program.types().resolve_id(ty);
        let mut ptr = self.pointer(program, instr, 2)?;
        let mut in_bounds = true;
        for index in 3..instr.operands.len() {
            let raw = self.operand(program, instr, index)?.as_i64().unwrap_or(-1);
            let len = self
                .root(&ptr.root)
                .and_then(|v| v.at(&ptr.path))
                .and_then(Value::components)
                .map(<[Value]>::len);
            match (u32::try_from(raw), len) {
                (Ok(i), Some(len)) if (i as usize) < len => ptr.path.push(i),
                _ => {
                    in_bounds = false;
                    break;
                }
            }
        }
        if !in_bounds {
            if ptr.root != PointerRoot::Null {
                self.flag(UndefinedBehavior::IndexOutOfBounds);
            }
            return Ok(Value::Pointer(Pointer::null(pointee)));
        }
        ptr.ty = pointee;
        Ok(Value::Pointer(ptr))
    }

    fn handle(&self, op: Op, v: &Value) -> Result<u32> {
        match v {
            Value::Handle(binding) => Ok(*binding),
            other => Err(mismatch(op, format!("expected an image handle, got {other:?}"))),
        }
    }

    fn sample(&mut self, program: &Program, instr: &Instr, ty: u32) -> Result<Value> {
        let op = instr.op;
        let binding = self.handle(op, &self.operand(program, instr, 2)?)?;
        let mut coord = floats(op, &self.operand(program, instr, 3)?)?;
        if matches!(op, Op::ImageSampleProjImplicitLod | Op::ImageSampleProjExplicitLod) {
            if let Some(q) = coord.pop() {
                if q != 0.0 {
                    coord.iter_mut().for_each(|c| *c /= q);
                }
            }
        }
        let mask_index = match op {
            Op::ImageSampleDrefImplicitLod | Op::ImageSampleDrefExplicitLod | Op::ImageGather => 5,
            _ => 4,
        };
        let lod = match instr.operands.get(mask_index) {
            Some(mask) if mask & IMAGE_OPERAND_LOD != 0 => {
                float(op, &self.operand(program, instr, mask_index + 1)?)?
            }
            _ => 0.0,
        };
        let texel = match &self.sampler {
            Some(sampler) => {
                if matches!(op, Op::ImageFetch | Op::ImageRead) {
                    let [w, h] = sampler.size(binding);
                    let dims = [w.max(1) as f32, h.max(1) as f32];
                    for (c, d) in coord.iter_mut().zip(dims) {
                        *c = (*c + 0.5) / d;
                    }
                }
                sampler.sample(binding, &coord, lod)
            }
            None => [0.0; 4],
        };
        let texel = if op == Op::ImageGather {
            let component = bits(op, &self.operand(program, instr, 4)?)? as usize;
            [texel.get(component).copied().unwrap_or(0.0); 4]
        } else {
            texel
        };
        let kind = Self::scalar_kind(program, ty);
        let count = program.types().component_count(ty).max(1) as usize;
        let parts: Vec<Value> = texel
            .iter()
            .take(count)
            .map(|t| match kind {
                ScalarKind::Float => Value::Float(*t),
                ScalarKind::Int => Value::Int(*t as i32),
                ScalarKind::UInt => Value::UInt(*t as u32),
                ScalarKind::Bool => Value::Bool(*t != 0.0),
            })
            .collect();
        Ok(match program.types().get(ty) {
            Some(TypeDesc::Vector { .. }) => Value::Composite(parts),
            _ => parts.into_iter().next().unwrap_or_default(),
        })
    }
}

fn field_mask(offset: u32, count: u32) -> u32 {
    let width = if count >= 32 { u32::MAX } else { (1u32 << count) - 1 };
    width.wrapping_shl(offset)
}

/// `m` as returned by [`columns`]; missing entries read as zero.
pub(crate) fn mat_vec(m: &[Vec<f32>], v: &[f32]) -> Vec<f32> {
    let rows = m.first().map_or(0, Vec::len);
    (0..rows)
        .map(|r| {
            m.iter()
                .zip(v)
                .map(|(col, s)| col.get(r).copied().unwrap_or(0.0) * s)
                .sum()
        })
        .collect()
}

pub(crate) fn transpose(m: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let rows = m.first().map_or(0, Vec::len);
    (0..rows)
        .map(|r| m.iter().map(|col| col.get(r).copied().unwrap_or(0.0)).collect())
        .collect()
}
