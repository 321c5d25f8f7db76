//! Variable and type descriptors.

use refract_spirv::{StorageClass, TypeDesc, TypeTable};

/// Shape of a value as seen by the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
    Void,
    Bool,
    Int,
    UInt,
    Float,
    Vector,
    Matrix,
    Struct,
    Array,
    RuntimeArray,
    Image,
    Sampler,
    SampledImage,
    #[default]
    Unknown,
}

impl ValueType {
    /// Scalar kinds can be compared and printed directly.
    pub fn is_scalar(self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Int | ValueType::UInt | ValueType::Float)
    }
}

/// A named value: global, uniform, local, argument, struct member or return type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    /// Result id of the declaration (0 for struct members and return types).
    pub id: u32,
    /// Type id after pointer redirects.
    pub type_id: u32,
    pub name: String,
    pub value_type: ValueType,
    /// Scalar components: 1 for scalars, n for vectors, c*r for matrices.
    /// Arrays report the count of one element.
    pub component_count: u32,
    /// Scalar kind of vectors and matrices, element kind of arrays.
    pub base_type: ValueType,
    /// Name in the user type table for structs and arrays of structs.
    pub type_name: Option<String>,
    pub array_length: Option<u32>,
    /// Matrix column count.
    pub columns: u32,
    pub storage: Option<StorageClass>,
    /// Member index when flattened out of an anonymous uniform block.
    pub block_member: Option<u32>,
}

fn scalar_kind(desc: &TypeDesc) -> ValueType {
    match desc {
        TypeDesc::Bool => ValueType::Bool,
        TypeDesc::Int { signed: true, .. } => ValueType::Int,
        TypeDesc::Int { signed: false, .. } => ValueType::UInt,
        TypeDesc::Float { .. } => ValueType::Float,
        _ => ValueType::Unknown,
    }
}

impl Variable {
    /// Describe `type_id` (pointers are looked through) under `name`.
    ///
    /// `type_name` maps a struct type id to its debug name.
    pub fn describe(
        types: &TypeTable,
        type_id: u32,
        name: impl Into<String>,
        type_name: &dyn Fn(u32) -> Option<String>,
    ) -> Self {
        let resolved = types.resolve_id(type_id);
        let mut var = Variable {
            type_id: resolved,
            name: name.into(),
            storage: types.storage_class(type_id),
            ..Default::default()
        };
        let Some(desc) = types.get(resolved) else {
            return var;
        };
        match desc {
            TypeDesc::Void => var.value_type = ValueType::Void,
            d if d.is_scalar() => {
                var.value_type = scalar_kind(d);
                var.base_type = var.value_type;
                var.component_count = 1;
            }
            TypeDesc::Vector { component, count } => {
                var.value_type = ValueType::Vector;
                var.base_type = types.get(*component).map(scalar_kind).unwrap_or_default();
                var.component_count = *count;
            }
            TypeDesc::Matrix { column, columns } => {
                var.value_type = ValueType::Matrix;
                var.base_type = types
                    .scalar_of(*column)
                    .and_then(|s| types.get(s))
                    .map(scalar_kind)
                    .unwrap_or_default();
                var.component_count = types.component_count(resolved);
                var.columns = *columns;
            }
            TypeDesc::Struct { .. } => {
                var.value_type = ValueType::Struct;
                var.base_type = ValueType::Struct;
                var.component_count = 1;
                var.type_name = type_name(resolved);
            }
            TypeDesc::Array { element, length } => {
                let inner = Variable::describe(types, *element, "", type_name);
                var.value_type = ValueType::Array;
                var.base_type = inner.value_type;
                var.component_count = inner.component_count;
                var.type_name = inner.type_name;
                var.array_length = Some(*length);
            }
            TypeDesc::RuntimeArray { element } => {
                let inner = Variable::describe(types, *element, "", type_name);
                var.value_type = ValueType::RuntimeArray;
                var.base_type = inner.value_type;
                var.component_count = inner.component_count;
                var.type_name = inner.type_name;
            }
            TypeDesc::Image { .. } => var.value_type = ValueType::Image,
            TypeDesc::Sampler => var.value_type = ValueType::Sampler,
            TypeDesc::SampledImage { .. } => var.value_type = ValueType::SampledImage,
            _ => {}
        }
        var
    }
}
