//! Stage inputs and outputs, and how they map onto VM interface slots.
//!
//! Interface variables are matched by `Location` decoration or by `BuiltIn`;
//! data crosses stage boundaries as flat `f32` lists and is converted to the
//! declared type of the slot it lands in.

use std::sync::Arc;

use refract_spirv::{BuiltIn, StorageClass, TypeDesc, TypeTable};
use refract_vm::{Value, VmSession};

use crate::config::ClipDepth;

/// Per-vertex data for the vertex stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexInput {
    pub vertex_id: u32,
    pub instance_id: u32,
    /// Attribute data indexed by location.
    pub attributes: Vec<Vec<f32>>,
}

/// What a vertex-processing stage produced for one vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexOutput {
    /// Clip-space position.
    pub position: [f32; 4],
    /// Output varyings by location, flattened to floats.
    pub varyings: Vec<(u32, Vec<f32>)>,
}

impl VertexOutput {
    pub fn varying(&self, location: u32) -> Option<&[f32]> {
        self.varyings
            .iter()
            .find(|(l, _)| *l == location)
            .map(|(_, data)| data.as_slice())
    }
}

/// One covered pixel of a triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelInput {
    /// Window coordinate of the pixel centre.
    pub position: [f32; 2],
    /// Post-vertex-stage outputs of the triangle's corners.
    pub vertices: [VertexOutput; 3],
    /// Screen-space barycentric weights of `position`.
    pub weights: [f32; 3],
    pub front_facing: bool,
}

impl PixelInput {
    /// Barycentric weights corrected for perspective: each screen weight is
    /// divided by its vertex's clip `w` and the result renormalized.
    pub fn perspective_weights(&self) -> [f32; 3] {
        let q: Vec<f32> = (0..3)
            .map(|i| self.weights[i] / clip_w(&self.vertices[i]))
            .collect();
        let sum: f32 = q.iter().sum();
        if sum == 0.0 || !sum.is_finite() {
            return self.weights;
        }
        [q[0] / sum, q[1] / sum, q[2] / sum]
    }

    /// Normalized device `z / w`, interpolated linearly in screen space.
    pub fn ndc_depth(&self) -> f32 {
        (0..3)
            .map(|i| self.weights[i] * self.vertices[i].position[2] / clip_w(&self.vertices[i]))
            .sum()
    }

    /// Window depth under the `clip` convention.
    pub fn depth(&self, clip: ClipDepth) -> f32 {
        clip.window_depth(self.ndc_depth())
    }

    /// Interpolated `1 / w`, the fourth component of `gl_FragCoord`.
    pub fn inverse_w(&self) -> f32 {
        (0..3)
            .map(|i| self.weights[i] / clip_w(&self.vertices[i]))
            .sum()
    }

    /// Varyings of the first vertex, interpolated across the triangle.
    pub fn varyings(&self) -> Vec<(u32, Vec<f32>)> {
        let weights = self.perspective_weights();
        self.vertices[0]
            .varyings
            .iter()
            .map(|(location, first)| {
                let data = (0..first.len())
                    .map(|c| {
                        (0..3)
                            .map(|v| {
                                let component = self.vertices[v]
                                    .varying(*location)
                                    .and_then(|d| d.get(c))
                                    .copied()
                                    .unwrap_or(0.0);
                                weights[v] * component
                            })
                            .sum()
                    })
                    .collect();
                (*location, data)
            })
            .collect()
    }
}

fn clip_w(vertex: &VertexOutput) -> f32 {
    let w = vertex.position[3];
    if w == 0.0 {
        1.0
    } else {
        w
    }
}

// ============================================================================
// Slot conversion
// ============================================================================

/// Scalar that can fill any scalar slot of a shader interface.
pub(crate) trait SlotScalar: Copy {
    fn to_float(self) -> f32;
    fn to_int(self) -> i32;
    fn to_uint(self) -> u32;
    fn to_bool(self) -> bool;
}

impl SlotScalar for f32 {
    fn to_float(self) -> f32 {
        self
    }
    fn to_int(self) -> i32 {
        self as i32
    }
    fn to_uint(self) -> u32 {
        self as u32
    }
    fn to_bool(self) -> bool {
        self != 0.0
    }
}

/// Integer built-ins keep every bit; a signed slot reads the same pattern.
impl SlotScalar for u32 {
    fn to_float(self) -> f32 {
        self as f32
    }
    fn to_int(self) -> i32 {
        self as i32
    }
    fn to_uint(self) -> u32 {
        self
    }
    fn to_bool(self) -> bool {
        self != 0
    }
}

/// Value of type `ty` built from `data` in declaration order. Missing data
/// reads as zero.
pub(crate) fn value_from_floats(types: &TypeTable, ty: u32, data: &[f32]) -> Value {
    value_from_slots(types, ty, data)
}

pub(crate) fn value_from_slots<T: SlotScalar>(types: &TypeTable, ty: u32, data: &[T]) -> Value {
    fill(types, ty, &mut data.iter().copied())
}

fn fill<T: SlotScalar>(types: &TypeTable, ty: u32, data: &mut impl Iterator<Item = T>) -> Value {
    let Some(desc) = types.get(ty) else {
        return Value::Void;
    };
    match desc {
        TypeDesc::Float { .. } => Value::Float(data.next().map_or(0.0, T::to_float)),
        TypeDesc::Int { signed: true, .. } => Value::Int(data.next().map_or(0, T::to_int)),
        TypeDesc::Int { signed: false, .. } => Value::UInt(data.next().map_or(0, T::to_uint)),
        TypeDesc::Bool => Value::Bool(data.next().is_some_and(T::to_bool)),
        TypeDesc::Vector { component, count } => {
            Value::Composite((0..*count).map(|_| fill(types, *component, data)).collect())
        }
        TypeDesc::Matrix { column, columns } => {
            Value::Composite((0..*columns).map(|_| fill(types, *column, data)).collect())
        }
        TypeDesc::Array { element, length } => {
            Value::Composite((0..*length).map(|_| fill(types, *element, data)).collect())
        }
        TypeDesc::Struct { members } => {
            Value::Composite(members.iter().map(|m| fill(types, *m, data)).collect())
        }
        _ => Value::zero(types, ty),
    }
}

/// Declared type of the slot `(id, member)` returned by `builtin_slot`.
fn slot_type(vm: &VmSession, id: u32, member: Option<u32>) -> Option<u32> {
    let program = vm.program();
    let ty = program.global(id)?.ty;
    match member {
        None => Some(ty),
        Some(m) => match program.types().get(ty)? {
            TypeDesc::Struct { members } => members.get(m as usize).copied(),
            _ => None,
        },
    }
}

/// Write `data` into the built-in `builtin` of `storage`. Returns `false` when
/// the stage does not declare it.
pub(crate) fn write_builtin<T: SlotScalar>(
    vm: &mut VmSession,
    storage: StorageClass,
    builtin: BuiltIn,
    data: &[T],
) -> bool {
    let Some((id, member)) = vm.program().builtin_slot(storage, builtin) else {
        return false;
    };
    let Some(ty) = slot_type(vm, id, member) else {
        return false;
    };
    let value = value_from_slots(vm.program().types(), ty, data);
    match member {
        None => {
            vm.set_global(id, value);
            true
        }
        Some(m) => vm.set_global_at(id, &[m], value),
    }
}

pub(crate) fn read_builtin(vm: &VmSession, storage: StorageClass, builtin: BuiltIn) -> Option<Value> {
    let (id, member) = vm.program().builtin_slot(storage, builtin)?;
    let value = vm.global(id)?;
    match member {
        None => Some(value.clone()),
        Some(m) => value.at(&[m]).cloned(),
    }
}

/// Ids, types and locations of the interface variables in `storage`.
fn located(vm: &VmSession, storage: StorageClass) -> Vec<(u32, u32, u32)> {
    let program = vm.program();
    program
        .globals()
        .iter()
        .filter(|g| g.storage == storage)
        .filter_map(|g| Some((g.id, g.ty, program.location(g.id)?)))
        .collect()
}

fn write_locations(vm: &mut VmSession, data: impl Fn(u32, u32) -> Option<Value>) {
    for (id, ty, location) in located(vm, StorageClass::Input) {
        if let Some(value) = data(location, ty) {
            vm.set_global(id, value);
        }
    }
}

// ============================================================================
// Per-stage binding
// ============================================================================

pub(crate) fn write_vertex_input(vm: &mut VmSession, input: &VertexInput) {
    let program = Arc::clone(vm.program());
    let types = program.types();
    write_locations(vm, |location, ty| {
        let data = input.attributes.get(location as usize)?;
        Some(value_from_floats(types, ty, data))
    });
    for builtin in [BuiltIn::VertexIndex, BuiltIn::VertexId] {
        write_builtin(vm, StorageClass::Input, builtin, &[input.vertex_id]);
    }
    for builtin in [BuiltIn::InstanceIndex, BuiltIn::InstanceId] {
        write_builtin(vm, StorageClass::Input, builtin, &[input.instance_id]);
    }
}

/// Position and located outputs of a finished vertex-processing invocation.
pub(crate) fn read_vertex_output(vm: &VmSession) -> VertexOutput {
    let mut position = [0.0, 0.0, 0.0, 1.0];
    if let Some(value) = read_builtin(vm, StorageClass::Output, BuiltIn::Position) {
        for (slot, v) in position.iter_mut().zip(value.to_f32s()) {
            *slot = v;
        }
    }
    let mut varyings: Vec<(u32, Vec<f32>)> = located(vm, StorageClass::Output)
        .into_iter()
        .filter_map(|(id, _, location)| Some((location, vm.global(id)?.to_f32s())))
        .collect();
    varyings.sort_by_key(|(location, _)| *location);
    VertexOutput { position, varyings }
}

/// Bind interpolated varyings and fragment built-ins. Returns the window
/// depth.
pub(crate) fn write_pixel_input(vm: &mut VmSession, input: &PixelInput, clip: ClipDepth) -> f32 {
    let program = Arc::clone(vm.program());
    let types = program.types();
    let varyings = input.varyings();
    write_locations(vm, |location, ty| {
        let (_, data) = varyings.iter().find(|(l, _)| *l == location)?;
        Some(value_from_floats(types, ty, data))
    });

    let depth = input.depth(clip);
    let frag_coord = [input.position[0], input.position[1], depth, input.inverse_w()];
    write_builtin(vm, StorageClass::Input, BuiltIn::FragCoord, &frag_coord);
    let facing = if input.front_facing { 1.0 } else { 0.0 };
    write_builtin(vm, StorageClass::Input, BuiltIn::FrontFacing, &[facing]);
    write_builtin(vm, StorageClass::Input, BuiltIn::HelperInvocation, &[0.0]);
    depth
}

/// Color at output location 0, padded to RGBA with opaque alpha.
pub(crate) fn read_pixel_color(vm: &VmSession) -> [f32; 4] {
    let mut color = [0.0, 0.0, 0.0, 1.0];
    let Some(out) = vm.program().location_slot(StorageClass::Output, 0) else {
        return color;
    };
    if let Some(value) = vm.global(out.id) {
        for (slot, v) in color.iter_mut().zip(value.to_f32s()) {
            *slot = v;
        }
    }
    color
}

/// Depth written through `gl_FragDepth`, if the stage declares it.
pub(crate) fn read_frag_depth(vm: &VmSession) -> Option<f32> {
    read_builtin(vm, StorageClass::Output, BuiltIn::FragDepth)?.as_f32()
}

/// Bind an input patch or primitive: arrayed inputs receive one element per
/// vertex, non-arrayed inputs the first vertex.
pub(crate) fn write_vertex_array(vm: &mut VmSession, vertices: &[VertexOutput]) {
    let program = Arc::clone(vm.program());
    let types = program.types();
    let empty = VertexOutput::default();
    write_locations(vm, |location, ty| {
        let element = |i: usize, ty: u32| {
            let data = vertices
                .get(i)
                .unwrap_or(&empty)
                .varying(location)
                .unwrap_or(&[]);
            value_from_floats(types, ty, data)
        };
        Some(match types.get(ty) {
            Some(TypeDesc::Array { element: e, length }) => {
                Value::Composite((0..*length as usize).map(|i| element(i, *e)).collect())
            }
            _ => element(0, ty),
        })
    });

    if let Some((id, None)) = program.builtin_slot(StorageClass::Input, BuiltIn::Position) {
        let declared = program.global(id).and_then(|g| types.get(g.ty));
        if let Some(TypeDesc::Array { element, length }) = declared {
            let positions = (0..*length as usize)
                .map(|i| {
                    let position = vertices.get(i).map_or([0.0; 4], |v| v.position);
                    value_from_floats(types, *element, &position)
                })
                .collect();
            vm.set_global(id, Value::Composite(positions));
        }
    }
    let count = vertices.len() as f32;
    write_builtin(vm, StorageClass::Input, BuiltIn::PatchVertices, &[count]);
}

/// Split arrayed outputs of a patch into `count` vertices.
pub(crate) fn read_patch_outputs(vm: &VmSession, count: u32) -> Vec<VertexOutput> {
    let program = vm.program();
    let element = |id: u32, ty: u32, i: u32| -> Option<Vec<f32>> {
        let value = vm.global(id)?;
        match program.types().get(ty)? {
            TypeDesc::Array { .. } => value.at(&[i]).map(Value::to_f32s),
            _ => Some(value.to_f32s()),
        }
    };
    let outputs = located(vm, StorageClass::Output);
    let position_slot = program
        .builtin_slot(StorageClass::Output, BuiltIn::Position)
        .and_then(|(id, member)| member.is_none().then_some(id));
    (0..count)
        .map(|i| {
            let mut position = [0.0, 0.0, 0.0, 1.0];
            if let Some(id) = position_slot {
                let ty = program.global(id).map_or(0, |g| g.ty);
                for (slot, v) in position.iter_mut().zip(element(id, ty, i).unwrap_or_default()) {
                    *slot = v;
                }
            }
            let mut varyings: Vec<(u32, Vec<f32>)> = outputs
                .iter()
                .filter_map(|&(id, ty, location)| Some((location, element(id, ty, i)?)))
                .collect();
            varyings.sort_by_key(|(location, _)| *location);
            VertexOutput { position, varyings }
        })
        .collect()
}

/// Compute built-ins of one workgroup invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComputeIds {
    pub(crate) local: [u32; 3],
    pub(crate) workgroup: [u32; 3],
    pub(crate) num_workgroups: [u32; 3],
    pub(crate) size: [u32; 3],
}

pub(crate) fn write_compute_ids(vm: &mut VmSession, ids: &ComputeIds) {
    let global = [0, 1, 2].map(|i| ids.workgroup[i].wrapping_mul(ids.size[i]).wrapping_add(ids.local[i]));
    let index = ids.local[2]
        .wrapping_mul(ids.size[0].wrapping_mul(ids.size[1]))
        .wrapping_add(ids.local[1].wrapping_mul(ids.size[0]))
        .wrapping_add(ids.local[0]);
    write_builtin(vm, StorageClass::Input, BuiltIn::LocalInvocationId, &ids.local);
    write_builtin(vm, StorageClass::Input, BuiltIn::WorkgroupId, &ids.workgroup);
    write_builtin(vm, StorageClass::Input, BuiltIn::NumWorkgroups, &ids.num_workgroups);
    write_builtin(vm, StorageClass::Input, BuiltIn::WorkgroupSize, &ids.size);
    write_builtin(vm, StorageClass::Input, BuiltIn::GlobalInvocationId, &global);
    write_builtin(vm, StorageClass::Input, BuiltIn::LocalInvocationIndex, &[index]);
}
