//! `GLSL.std.450` extended instructions.

use refract_spirv::{GlslOp, Op};

use crate::error::{ExecutionError, Result, UndefinedBehavior};
use crate::exec::{bits, columns, float, map1, map2, map3, mismatch};
use crate::program::Program;
use crate::session::VmSession;
use crate::value::{ScalarKind, Value};

const OP: Op = Op::ExtInst;

fn vec_of(v: &Value) -> Result<Vec<f32>> {
    v.flatten().iter().map(|c| float(OP, c)).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn length(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// `m` must be square.
fn determinant(m: &[Vec<f32>]) -> f32 {
    match m.len() {
        0 => 1.0,
        1 => m[0][0],
        2 => m[0][0] * m[1][1] - m[1][0] * m[0][1],
        n => (0..n)
            .map(|c| {
                let minor: Vec<Vec<f32>> = m
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != c)
                    .map(|(_, col)| col[1..].to_vec())
                    .collect();
                let sign = if c % 2 == 0 { 1.0 } else { -1.0 };
                sign * m[c][0] * determinant(&minor)
            })
            .sum(),
    }
}

fn arg(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index)
        .ok_or(ExecutionError::MissingOperand { op: OP, index: index + 4 })
}

impl VmSession {
    pub(crate) fn glsl(&mut self, program: &Program, ty: u32, number: u32, args: &[Value]) -> Result<Value> {
        let instruction = GlslOp::from_word(number).ok_or(ExecutionError::UnsupportedExtInst {
            set: 0,
            instruction: number,
        })?;
        let kind = program
            .types()
            .scalar_of(ty)
            .and_then(|s| program.types().get(s))
            .and_then(ScalarKind::of)
            .unwrap_or(ScalarKind::Float);
        let mut ub: Option<UndefinedBehavior> = None;

        let unary = |f: fn(f32) -> f32| -> Result<Value> {
            map1(OP, arg(args, 0)?, &mut |v| Ok(Value::Float(f(float(OP, v)?))))
        };
        let binary = |f: fn(f32, f32) -> f32| -> Result<Value> {
            map2(OP, arg(args, 0)?, arg(args, 1)?, &mut |x, y| {
                Ok(Value::Float(f(float(OP, x)?, float(OP, y)?)))
            })
        };

        let value = match instruction {
            GlslOp::Round => unary(f32::round)?,
            GlslOp::RoundEven => unary(|x| {
                let r = x.round();
                if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
                    r - x.signum()
                } else {
                    r
                }
            })?,
            GlslOp::Trunc => unary(f32::trunc)?,
            GlslOp::FAbs => unary(f32::abs)?,
            GlslOp::FSign => unary(|x| if x == 0.0 { 0.0 } else { x.signum() })?,
            GlslOp::Floor => unary(f32::floor)?,
            GlslOp::Ceil => unary(f32::ceil)?,
            GlslOp::Fract => unary(|x| x - x.floor())?,
            GlslOp::Radians => unary(f32::to_radians)?,
            GlslOp::Degrees => unary(f32::to_degrees)?,
            GlslOp::Sin => unary(f32::sin)?,
            GlslOp::Cos => unary(f32::cos)?,
            GlslOp::Tan => unary(f32::tan)?,
            GlslOp::Sinh => unary(f32::sinh)?,
            GlslOp::Cosh => unary(f32::cosh)?,
            GlslOp::Tanh => unary(f32::tanh)?,
            GlslOp::Atan => unary(f32::atan)?,
            GlslOp::Atan2 => binary(f32::atan2)?,
            GlslOp::Exp => unary(f32::exp)?,
            GlslOp::Exp2 => unary(f32::exp2)?,
            GlslOp::Asin | GlslOp::Acos => map1(OP, arg(args, 0)?, &mut |v| {
                let x = float(OP, v)?;
                if !(-1.0..=1.0).contains(&x) {
                    ub = Some(UndefinedBehavior::AsinAcosDomain);
                }
                Ok(Value::Float(if instruction == GlslOp::Asin { x.asin() } else { x.acos() }))
            })?,
            GlslOp::Log | GlslOp::Log2 => map1(OP, arg(args, 0)?, &mut |v| {
                let x = float(OP, v)?;
                if x <= 0.0 {
                    ub = Some(UndefinedBehavior::LogOfNonPositive);
                }
                Ok(Value::Float(if instruction == GlslOp::Log { x.ln() } else { x.log2() }))
            })?,
            GlslOp::Sqrt | GlslOp::InverseSqrt => map1(OP, arg(args, 0)?, &mut |v| {
                let x = float(OP, v)?;
                if x < 0.0 || (instruction == GlslOp::InverseSqrt && x == 0.0) {
                    ub = Some(UndefinedBehavior::SqrtOfNegative);
                }
                Ok(Value::Float(if instruction == GlslOp::Sqrt { x.sqrt() } else { 1.0 / x.sqrt() }))
            })?,
            GlslOp::Pow => map2(OP, arg(args, 0)?, arg(args, 1)?, &mut |x, y| {
                let (x, y) = (float(OP, x)?, float(OP, y)?);
                if x < 0.0 || (x == 0.0 && y <= 0.0) {
                    ub = Some(UndefinedBehavior::PowDomain);
                }
                Ok(Value::Float(x.powf(y)))
            })?,
            GlslOp::FMin | GlslOp::NMin => binary(f32::min)?,
            GlslOp::FMax | GlslOp::NMax => binary(f32::max)?,
            GlslOp::SAbs => map1(OP, arg(args, 0)?, &mut |v| {
                Ok(Value::from_bits(kind, (bits(OP, v)? as i32).wrapping_abs() as u32))
            })?,
            GlslOp::SSign => map1(OP, arg(args, 0)?, &mut |v| {
                Ok(Value::from_bits(kind, (bits(OP, v)? as i32).signum() as u32))
            })?,
            GlslOp::UMin | GlslOp::UMax | GlslOp::SMin | GlslOp::SMax => {
                map2(OP, arg(args, 0)?, arg(args, 1)?, &mut |x, y| {
                    let (x, y) = (bits(OP, x)?, bits(OP, y)?);
                    let r = match instruction {
                        GlslOp::UMin => x.min(y),
                        GlslOp::UMax => x.max(y),
                        GlslOp::SMin => (x as i32).min(y as i32) as u32,
                        _ => (x as i32).max(y as i32) as u32,
                    };
                    Ok(Value::from_bits(kind, r))
                })?
            }
            GlslOp::FClamp | GlslOp::NClamp => {
                map3(OP, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?, &mut |x, lo, hi| {
                    let (x, lo, hi) = (float(OP, x)?, float(OP, lo)?, float(OP, hi)?);
                    if lo > hi {
                        ub = Some(UndefinedBehavior::ClampBounds);
                    }
                    Ok(Value::Float(x.max(lo).min(hi)))
                })?
            }
            GlslOp::UClamp | GlslOp::SClamp => {
                map3(OP, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?, &mut |x, lo, hi| {
                    let (x, lo, hi) = (bits(OP, x)?, bits(OP, lo)?, bits(OP, hi)?);
                    let r = if instruction == GlslOp::UClamp {
                        if lo > hi {
                            ub = Some(UndefinedBehavior::ClampBounds);
                        }
                        x.max(lo).min(hi)
                    } else {
                        let (x, lo, hi) = (x as i32, lo as i32, hi as i32);
                        if lo > hi {
                            ub = Some(UndefinedBehavior::ClampBounds);
                        }
                        x.max(lo).min(hi) as u32
                    };
                    Ok(Value::from_bits(kind, r))
                })?
            }
            GlslOp::FMix => map3(OP, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?, &mut |x, y, a| {
                let (x, y, a) = (float(OP, x)?, float(OP, y)?, float(OP, a)?);
                Ok(Value::Float(x * (1.0 - a) + y * a))
            })?,
            GlslOp::Step => binary(|edge, x| if x < edge { 0.0 } else { 1.0 })?,
            GlslOp::SmoothStep => {
                map3(OP, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?, &mut |e0, e1, x| {
                    let (e0, e1, x) = (float(OP, e0)?, float(OP, e1)?, float(OP, x)?);
                    if e0 >= e1 {
                        ub = Some(UndefinedBehavior::SmoothStepBounds);
                    }
                    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
                    Ok(Value::Float(t * t * (3.0 - 2.0 * t)))
                })?
            }
            GlslOp::Fma => map3(OP, arg(args, 0)?, arg(args, 1)?, arg(args, 2)?, &mut |a, b, c| {
                Ok(Value::Float(float(OP, a)?.mul_add(float(OP, b)?, float(OP, c)?)))
            })?,
            GlslOp::Length => Value::Float(length(&vec_of(arg(args, 0)?)?)),
            GlslOp::Distance => {
                let (a, b) = (vec_of(arg(args, 0)?)?, vec_of(arg(args, 1)?)?);
                let diff: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
                Value::Float(length(&diff))
            }
            GlslOp::Cross => {
                let (a, b) = (vec_of(arg(args, 0)?)?, vec_of(arg(args, 1)?)?);
                if a.len() != 3 || b.len() != 3 {
                    return Err(mismatch(OP, "cross expects two 3-component vectors"));
                }
                Value::vector(&[
                    a[1] * b[2] - a[2] * b[1],
                    a[2] * b[0] - a[0] * b[2],
                    a[0] * b[1] - a[1] * b[0],
                ])
            }
            GlslOp::Normalize => {
                let v = vec_of(arg(args, 0)?)?;
                let len = length(&v);
                let out: Vec<f32> = v.iter().map(|c| c / len).collect();
                match arg(args, 0)? {
                    Value::Composite(_) => Value::vector(&out),
                    _ => Value::Float(out.first().copied().unwrap_or(0.0)),
                }
            }
            GlslOp::FaceForward => {
                let n = arg(args, 0)?.clone();
                let (i, nref) = (vec_of(arg(args, 1)?)?, vec_of(arg(args, 2)?)?);
                if dot(&nref, &i) < 0.0 {
                    n
                } else {
                    map1(OP, &n, &mut |c| Ok(Value::Float(-float(OP, c)?)))?
                }
            }
            GlslOp::Reflect => {
                let (i, n) = (vec_of(arg(args, 0)?)?, vec_of(arg(args, 1)?)?);
                let d = 2.0 * dot(&n, &i);
                let out: Vec<f32> = i.iter().zip(&n).map(|(i, n)| i - d * n).collect();
                match arg(args, 0)? {
                    Value::Composite(_) => Value::vector(&out),
                    _ => Value::Float(out.first().copied().unwrap_or(0.0)),
                }
            }
            GlslOp::Determinant => {
                let m = columns(OP, arg(args, 0)?)?;
                if m.len() != m[0].len() || m.len() > 4 {
                    return Err(mismatch(OP, "determinant expects a square matrix"));
                }
                Value::Float(determinant(&m))
            }
        };
        if let Some(kind) = ub {
            self.flag(kind);
        }
        Ok(value)
    }
}
