//! Runtime values.

use refract_spirv::{TypeDesc, TypeTable};

/// Where a pointer's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerRoot {
    /// Module-scope variable.
    Global(u32),
    /// Function-scope variable in the frame at `frame` depth.
    Local { frame: usize, var: u32 },
    /// Result of an out-of-bounds access chain; reads yield zero, writes are dropped.
    Null,
}

/// A pointer into VM memory: a root variable plus a composite index path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub root: PointerRoot,
    pub path: Vec<u32>,
    /// Pointee type id.
    pub ty: u32,
}

impl Pointer {
    pub fn global(id: u32, ty: u32) -> Self {
        Self {
            root: PointerRoot::Global(id),
            path: Vec::new(),
            ty,
        }
    }

    pub fn null(ty: u32) -> Self {
        Self {
            root: PointerRoot::Null,
            path: Vec::new(),
            ty,
        }
    }
}

/// Scalar kind used when building values from raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

impl ScalarKind {
    pub fn of(desc: &TypeDesc) -> Option<Self> {
        match desc {
            TypeDesc::Bool => Some(ScalarKind::Bool),
            TypeDesc::Int { signed: true, .. } => Some(ScalarKind::Int),
            TypeDesc::Int { signed: false, .. } => Some(ScalarKind::UInt),
            TypeDesc::Float { .. } => Some(ScalarKind::Float),
            _ => None,
        }
    }
}

/// A value held in a register or in memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    /// Vector components, matrix columns, struct members or array elements.
    Composite(Vec<Value>),
    Pointer(Pointer),
    /// Opaque image, sampler or sampled-image handle (the resource binding).
    Handle(u32),
}

impl Value {
    /// Zero-initialized value of type `ty`.
    ///
    /// Tables filled by [`TypeTable::record`] are acyclic and size-capped, so
    /// the walk is bounded.
    pub fn zero(types: &TypeTable, ty: u32) -> Value {
        let Some(desc) = types.get(ty) else {
            return Value::Void;
        };
        match desc {
            TypeDesc::Void | TypeDesc::Function { .. } => Value::Void,
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::Int { signed: true, .. } => Value::Int(0),
            TypeDesc::Int { signed: false, .. } => Value::UInt(0),
            TypeDesc::Float { .. } => Value::Float(0.0),
            TypeDesc::Vector { component, count } => {
                Value::Composite(vec![Value::zero(types, *component); *count as usize])
            }
            TypeDesc::Matrix { column, columns } => {
                Value::Composite(vec![Value::zero(types, *column); *columns as usize])
            }
            TypeDesc::Array { element, length } => {
                Value::Composite(vec![Value::zero(types, *element); *length as usize])
            }
            TypeDesc::RuntimeArray { .. } => Value::Composite(Vec::new()),
            TypeDesc::Struct { members } => {
                Value::Composite(members.iter().map(|m| Value::zero(types, *m)).collect())
            }
            TypeDesc::Image { .. } | TypeDesc::Sampler | TypeDesc::SampledImage { .. } => {
                Value::Handle(0)
            }
            TypeDesc::Pointer { pointee, .. } => Value::Pointer(Pointer::null(*pointee)),
        }
    }

    /// Build a scalar from its 32-bit pattern.
    pub fn from_bits(kind: ScalarKind, bits: u32) -> Value {
        match kind {
            ScalarKind::Bool => Value::Bool(bits != 0),
            ScalarKind::Int => Value::Int(bits as i32),
            ScalarKind::UInt => Value::UInt(bits),
            ScalarKind::Float => Value::Float(f32::from_bits(bits)),
        }
    }

    /// 32-bit pattern of a scalar.
    pub fn bits(&self) -> Option<u32> {
        match self {
            Value::Bool(b) => Some(*b as u32),
            Value::Int(v) => Some(*v as u32),
            Value::UInt(v) => Some(*v),
            Value::Float(v) => Some(v.to_bits()),
            _ => None,
        }
    }

    /// Numeric value widened to `f32`.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f32),
            Value::UInt(v) => Some(*v as f32),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value; floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(v) => Some(*v as i64),
            Value::UInt(v) => Some(*v as i64),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn components(&self) -> Option<&[Value]> {
        match self {
            Value::Composite(parts) => Some(parts),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }

    /// Flatten scalars in declaration order (vectors, then matrix columns).
    pub fn flatten(&self) -> Vec<Value> {
        match self {
            Value::Composite(parts) => parts.iter().flat_map(Value::flatten).collect(),
            other => vec![other.clone()],
        }
    }

    /// Float components of a scalar or flat vector.
    pub fn to_f32s(&self) -> Vec<f32> {
        self.flatten().iter().filter_map(Value::as_f32).collect()
    }

    /// `true` when a boolean is set, a number is non-zero, or every component is.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::UInt(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Composite(parts) => !parts.is_empty() && parts.iter().all(Value::truthy),
            _ => false,
        }
    }

    /// Element at `path`.
    pub fn at(&self, path: &[u32]) -> Option<&Value> {
        path.iter().try_fold(self, |value, index| match value {
            Value::Composite(parts) => parts.get(*index as usize),
            _ => None,
        })
    }

    /// Mutable element at `path`.
    pub fn at_mut(&mut self, path: &[u32]) -> Option<&mut Value> {
        path.iter().try_fold(self, |value, index| match value {
            Value::Composite(parts) => parts.get_mut(*index as usize),
            _ => None,
        })
    }

    /// Convenience constructor for float vectors.
    pub fn vector(components: &[f32]) -> Value {
        Value::Composite(components.iter().map(|c| Value::Float(*c)).collect())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
