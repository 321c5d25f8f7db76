//! Human-readable rendering of VM values.
//!
//! | Shape | Example |
//! |-------|---------|
//! | scalar | `2.5`, `-3`, `true` |
//! | vector | `(x = 4.0, y = 1.0)` |
//! | matrix (row-major) | `[(1.0, 3.0), (2.0, 4.0)]` |
//! | struct | `{ direction = (x = 0.0, y = 1.0, z = 0.0), power = 2.5 }` |
//! | array | `[ [0] = 0.25, [1] = 0.5 ]` |

use std::fmt::Write;

use refract_spirv::TypeDesc;
use refract_vm::{Program, Value};

const SWIZZLE: [&str; 4] = ["x", "y", "z", "w"];

/// Render `value` as declared by type `ty` of `program`.
pub fn format_value(program: &Program, ty: u32, value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, program, Some(ty), value);
    out
}

fn write_value(out: &mut String, program: &Program, ty: Option<u32>, value: &Value) {
    let desc = ty.and_then(|ty| program.types().resolve(ty));
    let Value::Composite(parts) = value else {
        write_scalar(out, value);
        return;
    };
    match desc {
        Some(TypeDesc::Vector { component, .. }) => {
            out.push('(');
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match SWIZZLE.get(i) {
                    Some(label) => {
                        let _ = write!(out, "{label} = ");
                    }
                    None => {
                        let _ = write!(out, "[{i}] = ");
                    }
                }
                write_value(out, program, Some(*component), part);
            }
            out.push(')');
        }
        Some(TypeDesc::Matrix { .. }) => write_matrix(out, parts),
        Some(TypeDesc::Struct { members }) => {
            let Some(ty) = ty else {
                return;
            };
            let struct_id = program.types().resolve_id(ty);
            out.push_str("{ ");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let name = program
                    .member_name(struct_id, i as u32)
                    .map_or_else(|| format!("_{i}"), str::to_string);
                let _ = write!(out, "{name} = ");
                write_value(out, program, members.get(i).copied(), part);
            }
            out.push_str(" }");
        }
        Some(TypeDesc::Array { element, .. }) | Some(TypeDesc::RuntimeArray { element }) => {
            write_array(out, program, Some(*element), parts);
        }
        _ => write_array(out, program, None, parts),
    }
}

fn write_array(out: &mut String, program: &Program, element: Option<u32>, parts: &[Value]) {
    if parts.is_empty() {
        out.push_str("[]");
        return;
    }
    out.push_str("[ ");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "[{i}] = ");
        write_value(out, program, element, part);
    }
    out.push_str(" ]");
}

/// Columns are stored; rows are printed.
fn write_matrix(out: &mut String, columns: &[Value]) {
    let rows = columns
        .iter()
        .map(|c| c.components().map_or(1, <[Value]>::len))
        .max()
        .unwrap_or(0);
    out.push('[');
    for row in 0..rows {
        if row > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match column.at(&[row as u32]) {
                Some(v) => write_scalar(out, v),
                None => out.push('?'),
            }
        }
        out.push(')');
    }
    out.push(']');
}

fn write_scalar(out: &mut String, value: &Value) {
    let _ = match value {
        Value::Void => write!(out, "void"),
        Value::Bool(b) => write!(out, "{b}"),
        Value::Int(v) => write!(out, "{v}"),
        Value::UInt(v) => write!(out, "{v}"),
        Value::Float(v) => write!(out, "{v:?}"),
        Value::Handle(binding) => write!(out, "<binding {binding}>"),
        Value::Pointer(_) => write!(out, "<pointer>"),
        Value::Composite(parts) => {
            let text: Vec<String> = parts
                .iter()
                .map(|p| {
                    let mut s = String::new();
                    write_scalar(&mut s, p);
                    s
                })
                .collect();
            write!(out, "({})", text.join(", "))
        }
    };
}

/// RGBA preview for 3- and 4-component float vectors, clamped to `[0, 1]`.
pub fn color_preview(value: &Value) -> Option<[f32; 4]> {
    let parts = value.components()?;
    if !(3..=4).contains(&parts.len()) || !parts.iter().all(|p| matches!(p, Value::Float(_))) {
        return None;
    }
    let mut rgba = [0.0, 0.0, 0.0, 1.0];
    for (slot, part) in rgba.iter_mut().zip(parts) {
        *slot = part.as_f32().unwrap_or(0.0).clamp(0.0, 1.0);
    }
    Some(rgba)
}
