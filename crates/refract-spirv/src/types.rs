//! Index-based type table.
//!
//! Types are keyed by result id. Pointer declarations are stored as redirect
//! entries: [`TypeTable::resolve`] follows them to the pointee so callers can
//! look through variables and access chains without chasing references.
//!
//! Composite declarations may only name types declared before them, so the
//! table never contains a cycle through a vector, matrix, array or struct.
//! Each composite also records its nesting depth and flattened scalar count,
//! and both are capped: walkers can recurse and allocate without further
//! checks.

use std::collections::HashMap;

use crate::error::{ModuleError, Result};
use crate::op::{Op, StorageClass};
use crate::reader::Instruction;

/// Declared shape of a type id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: u32, count: u32 },
    Matrix { column: u32, columns: u32 },
    Array { element: u32, length: u32 },
    RuntimeArray { element: u32 },
    Struct { members: Vec<u32> },
    Image { sampled: u32, dim: u32 },
    Sampler,
    SampledImage { image: u32 },
    Pointer { storage: StorageClass, pointee: u32 },
    Function { result: u32, params: Vec<u32> },
}

impl TypeDesc {
    /// Whether this is a scalar numeric or boolean type.
    pub fn is_scalar(&self) -> bool {
        matches!(self, TypeDesc::Bool | TypeDesc::Int { .. } | TypeDesc::Float { .. })
    }
}

/// Type and integer-constant lookup keyed by result id.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<u32, TypeDesc>,
    constants: HashMap<u32, u32>,
    layouts: HashMap<u32, Layout>,
}

/// Upper bound on redirect hops, guards against cyclic pointer declarations.
const MAX_REDIRECTS: usize = 16;

/// Deepest composite nesting a declaration may reach.
pub const MAX_TYPE_DEPTH: u32 = 64;

/// Most scalar slots a single value of one type may hold.
pub const MAX_TYPE_SLOTS: u64 = 1 << 20;

/// Size facts of a declared type that can appear inside a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    depth: u32,
    slots: u64,
}

impl Layout {
    const LEAF: Layout = Layout { depth: 0, slots: 1 };
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a type declaration or 32-bit integer constant.
    ///
    /// Returns `Ok(true)` when the instruction was consumed.
    pub fn record(&mut self, inst: &Instruction<'_>) -> Result<bool> {
        let Some(op) = inst.op() else {
            return Ok(false);
        };
        let desc = match op {
            Op::TypeVoid => TypeDesc::Void,
            Op::TypeBool => TypeDesc::Bool,
            Op::TypeInt => TypeDesc::Int {
                width: inst.word(1)?,
                signed: inst.word(2)? != 0,
            },
            Op::TypeFloat => TypeDesc::Float { width: inst.word(1)? },
            Op::TypeVector => TypeDesc::Vector {
                component: inst.word(1)?,
                count: inst.word(2)?,
            },
            Op::TypeMatrix => TypeDesc::Matrix {
                column: inst.word(1)?,
                columns: inst.word(2)?,
            },
            Op::TypeArray => {
                let length_id = inst.word(2)?;
                TypeDesc::Array {
                    element: inst.word(1)?,
                    length: self.constants.get(&length_id).copied().unwrap_or(0),
                }
            }
            Op::TypeRuntimeArray => TypeDesc::RuntimeArray { element: inst.word(1)? },
            Op::TypeStruct => TypeDesc::Struct {
                members: inst.rest(1).to_vec(),
            },
            Op::TypeImage => TypeDesc::Image {
                sampled: inst.word(1)?,
                dim: inst.word(2)?,
            },
            Op::TypeSampler => TypeDesc::Sampler,
            Op::TypeSampledImage => TypeDesc::SampledImage { image: inst.word(1)? },
            Op::TypePointer => {
                let storage = StorageClass::from_word(inst.word(1)?)
                    .unwrap_or(StorageClass::Generic);
                TypeDesc::Pointer {
                    storage,
                    pointee: inst.word(2)?,
                }
            }
            Op::TypeFunction => TypeDesc::Function {
                result: inst.word(1)?,
                params: inst.rest(2).to_vec(),
            },
            Op::Constant => {
                self.record_constant(inst.word(0)?, inst.word(1)?, inst.word(2)?);
                return Ok(true);
            }
            _ => return Ok(false),
        };
        let id = inst.word(0)?;
        if self.types.contains_key(&id) {
            return Err(ModuleError::InvalidType {
                id,
                reason: "declared twice",
            });
        }
        if let Some(layout) = self.layout(&desc).map_err(|reason| ModuleError::InvalidType { id, reason })? {
            self.layouts.insert(id, layout);
        }
        self.types.insert(id, desc);
        Ok(true)
    }

    /// Insert a declaration directly. Declarations that break the
    /// composite rules are still stored but cannot be nested.
    pub fn insert(&mut self, id: u32, desc: TypeDesc) {
        if let Ok(Some(layout)) = self.layout(&desc) {
            self.layouts.insert(id, layout);
        }
        self.types.insert(id, desc);
    }

    /// Layout of a new declaration, checked against already declared types.
    /// `None` for types that cannot be nested (void, functions).
    fn layout(&self, desc: &TypeDesc) -> std::result::Result<Option<Layout>, &'static str> {
        let inner = |id: &u32| {
            self.layouts
                .get(id)
                .copied()
                .ok_or("refers to a type that is not declared before it")
        };
        let layout = match desc {
            TypeDesc::Void | TypeDesc::Function { .. } => return Ok(None),
            TypeDesc::Bool
            | TypeDesc::Int { .. }
            | TypeDesc::Float { .. }
            | TypeDesc::Image { .. }
            | TypeDesc::Sampler
            | TypeDesc::SampledImage { .. }
            | TypeDesc::Pointer { .. } => Layout::LEAF,
            TypeDesc::Vector { component, count } => {
                if !self.types.get(component).is_some_and(TypeDesc::is_scalar) {
                    return Err("vector component is not a declared scalar");
                }
                if !(2..=16).contains(count) {
                    return Err("vector component count out of range");
                }
                Layout {
                    depth: 1,
                    slots: u64::from(*count),
                }
            }
            TypeDesc::Matrix { column, columns } => {
                if !matches!(self.types.get(column), Some(TypeDesc::Vector { .. })) {
                    return Err("matrix column is not a declared vector");
                }
                if !(2..=4).contains(columns) {
                    return Err("matrix column count out of range");
                }
                let col = inner(column)?;
                Layout {
                    depth: col.depth + 1,
                    slots: col.slots * u64::from(*columns),
                }
            }
            TypeDesc::Array { element, length } => {
                let elem = inner(element)?;
                Layout {
                    depth: elem.depth + 1,
                    slots: elem
                        .slots
                        .checked_mul(u64::from(*length))
                        .ok_or("array is too large")?,
                }
            }
            TypeDesc::RuntimeArray { element } => {
                let elem = inner(element)?;
                Layout {
                    depth: elem.depth + 1,
                    slots: 0,
                }
            }
            TypeDesc::Struct { members } => {
                let mut layout = Layout { depth: 1, slots: 0 };
                for member in members {
                    let m = inner(member)?;
                    layout.depth = layout.depth.max(m.depth + 1);
                    layout.slots = layout.slots.checked_add(m.slots).ok_or("struct is too large")?;
                }
                layout
            }
        };
        if layout.depth > MAX_TYPE_DEPTH {
            return Err("type nesting is too deep");
        }
        if layout.slots > MAX_TYPE_SLOTS {
            return Err("type is too large");
        }
        Ok(Some(layout))
    }

    /// Remember `value` when `ty` is a 32-bit integer type.
    pub fn record_constant(&mut self, ty: u32, id: u32, value: u32) {
        if matches!(self.types.get(&ty), Some(TypeDesc::Int { width: 32, .. })) {
            self.constants.insert(id, value);
        }
    }

    /// Declaration of `id` without following pointers.
    pub fn get(&self, id: u32) -> Option<&TypeDesc> {
        self.types.get(&id)
    }

    /// Id reached after following pointer redirects from `id`.
    pub fn resolve_id(&self, mut id: u32) -> u32 {
        for _ in 0..MAX_REDIRECTS {
            match self.types.get(&id) {
                Some(TypeDesc::Pointer { pointee, .. }) => id = *pointee,
                _ => break,
            }
        }
        id
    }

    /// Declaration of `id` with pointer redirects followed.
    pub fn resolve(&self, id: u32) -> Option<&TypeDesc> {
        self.types.get(&self.resolve_id(id))
    }

    /// Same as [`resolve`](Self::resolve) but fails with [`ModuleError::UnknownType`].
    pub fn expect(&self, id: u32) -> Result<&TypeDesc> {
        self.resolve(id).ok_or(ModuleError::UnknownType { id })
    }

    /// Storage class of a pointer type.
    pub fn storage_class(&self, id: u32) -> Option<StorageClass> {
        match self.types.get(&id) {
            Some(TypeDesc::Pointer { storage, .. }) => Some(*storage),
            _ => None,
        }
    }

    /// Value of a 32-bit integer constant.
    pub fn constant(&self, id: u32) -> Option<u32> {
        self.constants.get(&id).copied()
    }

    /// First id declared with exactly `desc`.
    pub fn find(&self, desc: &TypeDesc) -> Option<u32> {
        self.types
            .iter()
            .filter(|(_, d)| *d == desc)
            .map(|(id, _)| *id)
            .min()
    }

    /// First pointer type to `pointee` in `storage`.
    pub fn find_pointer(&self, storage: StorageClass, pointee: u32) -> Option<u32> {
        self.find(&TypeDesc::Pointer { storage, pointee })
    }

    /// Number of scalar components (1 for scalars, n for vectors, c*r for matrices).
    ///
    /// Aggregates and opaque types report zero.
    pub fn component_count(&self, id: u32) -> u32 {
        match self.resolve(id) {
            Some(d) if d.is_scalar() => 1,
            Some(TypeDesc::Vector { count, .. }) => *count,
            Some(TypeDesc::Matrix { column, columns }) => match self.types.get(column) {
                Some(TypeDesc::Vector { count, .. }) => columns.saturating_mul(*count),
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Innermost scalar type id of a scalar, vector or matrix.
    pub fn scalar_of(&self, id: u32) -> Option<u32> {
        let mut id = self.resolve_id(id);
        // matrix -> column -> component
        for _ in 0..3 {
            match self.types.get(&id)? {
                d if d.is_scalar() => return Some(id),
                TypeDesc::Vector { component, .. } => id = *component,
                TypeDesc::Matrix { column, .. } => id = *column,
                _ => return None,
            }
        }
        None
    }
}
