//! Hand-assembled shader modules.
//!
//! Each fixture documents the GLSL it corresponds to. Line numbers in the
//! listings are the ones attached to the instructions with `OpLine`, all in
//! [`FIXTURE_FILE`].

use refract_spirv::{
    BuiltIn, Decoration, ExecutionMode, ExecutionModel, ModuleBuilder, Op, StorageClass,
};

/// Source file every fixture attributes its lines to.
pub const FIXTURE_FILE: &str = "/project/shaders/fixture.glsl";

/// Scope and memory-semantics literals used by barriers and atomics.
const SCOPE_DEVICE: i32 = 1;
const SCOPE_WORKGROUP: i32 = 2;
const SEMANTICS_NONE: i32 = 0;
const SEMANTICS_WORKGROUP_ACQ_REL: i32 = 0x108;

/// Builder with the common scalar and vector types already declared.
pub struct Fixture {
    pub b: ModuleBuilder,
    pub file: u32,
    pub void: u32,
    pub bool_: u32,
    pub int: u32,
    pub uint: u32,
    pub float: u32,
    pub vec2: u32,
    pub vec3: u32,
    pub vec4: u32,
    pub void_fn: u32,
    interface: Vec<u32>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let mut b = ModuleBuilder::new();
        let file = b.string(FIXTURE_FILE);
        let void = b.type_void();
        let bool_ = b.type_bool();
        let int = b.type_int();
        let uint = b.type_uint();
        let float = b.type_float();
        let vec2 = b.type_vector(float, 2);
        let vec3 = b.type_vector(float, 3);
        let vec4 = b.type_vector(float, 4);
        let void_fn = b.type_function(void, &[]);
        Self {
            b,
            file,
            void,
            bool_,
            int,
            uint,
            float,
            vec2,
            vec3,
            vec4,
            void_fn,
            interface: Vec::new(),
        }
    }

    fn interface_variable(&mut self, name: &str, ty: u32, storage: StorageClass) -> u32 {
        let var = self.b.variable(ty, storage);
        self.b.name(var, name);
        self.interface.push(var);
        var
    }

    pub fn input(&mut self, name: &str, ty: u32, location: u32) -> u32 {
        let var = self.interface_variable(name, ty, StorageClass::Input);
        self.b.decorate(var, Decoration::Location, &[location]);
        var
    }

    pub fn output(&mut self, name: &str, ty: u32, location: u32) -> u32 {
        let var = self.interface_variable(name, ty, StorageClass::Output);
        self.b.decorate(var, Decoration::Location, &[location]);
        var
    }

    pub fn builtin(&mut self, name: &str, ty: u32, storage: StorageClass, builtin: BuiltIn) -> u32 {
        let var = self.interface_variable(name, ty, storage);
        self.b.decorate(var, Decoration::BuiltIn, &[builtin.word()]);
        var
    }

    /// Declare a block struct type with named members.
    pub fn block_type(&mut self, name: &str, members: &[(&str, u32)]) -> u32 {
        let types: Vec<u32> = members.iter().map(|(_, ty)| *ty).collect();
        let block = self.b.type_struct(&types);
        self.b.name(block, name);
        self.b.decorate(block, Decoration::Block, &[]);
        for (index, (member, _)) in members.iter().enumerate() {
            self.b.member_name(block, index as u32, member);
            self.b
                .member_decorate(block, index as u32, Decoration::Offset, &[index as u32 * 16]);
        }
        block
    }

    /// Anonymous uniform block; its members are visible as plain uniforms.
    pub fn uniform_block(&mut self, members: &[(&str, u32)], binding: u32) -> u32 {
        let block = self.block_type("Params", members);
        let var = self.b.variable(block, StorageClass::Uniform);
        self.b.name(var, "");
        self.b.decorate(var, Decoration::Binding, &[binding]);
        self.b.decorate(var, Decoration::DescriptorSet, &[0]);
        var
    }

    /// Named storage buffer holding a single runtime array of `element`.
    pub fn storage_buffer(&mut self, name: &str, block_name: &str, member: &str, element: u32, binding: u32) -> u32 {
        let array = self
            .b
            .declare_type(refract_spirv::TypeDesc::RuntimeArray { element });
        let block = self.block_type(block_name, &[(member, array)]);
        let var = self.b.variable(block, StorageClass::StorageBuffer);
        self.b.name(var, name);
        self.b.decorate(var, Decoration::Binding, &[binding]);
        self.b.decorate(var, Decoration::DescriptorSet, &[0]);
        var
    }

    /// Pointer to `base.indices...` with the result type `element` in `storage`.
    pub fn access(&mut self, base: u32, storage: StorageClass, element: u32, indices: &[u32]) -> u32 {
        let ptr = self.b.type_pointer(storage, element);
        let mut operands = vec![base];
        operands.extend_from_slice(indices);
        self.b.emit_result(Op::AccessChain, ptr, &operands)
    }

    /// Open `void main()` and its entry block.
    pub fn begin_main(&mut self) -> u32 {
        let main = self.b.begin_function(self.void, self.void_fn);
        self.b.name(main, "main");
        self.b.label();
        main
    }

    /// Function-local variable; must be declared in the entry block.
    pub fn local(&mut self, name: &str, ty: u32) -> u32 {
        let ptr = self.b.type_pointer(StorageClass::Function, ty);
        let var = self
            .b
            .emit_result(Op::Variable, ptr, &[StorageClass::Function.word()]);
        self.b.name(var, name);
        var
    }

    pub fn line(&mut self, line: u32) {
        self.b.line(self.file, line, 1);
    }

    pub fn load(&mut self, ty: u32, ptr: u32) -> u32 {
        self.b.emit_result(Op::Load, ty, &[ptr])
    }

    pub fn store(&mut self, ptr: u32, value: u32) {
        self.b.emit(Op::Store, &[ptr, value]);
    }

    pub fn f32(&mut self, value: f32) -> u32 {
        self.b.constant_f32(value)
    }

    pub fn i32(&mut self, value: i32) -> u32 {
        self.b.constant_i32(value)
    }

    pub fn u32(&mut self, value: u32) -> u32 {
        self.b.constant_u32(value)
    }

    pub fn splat4(&mut self, value: u32) -> u32 {
        let vec4 = self.vec4;
        self.b
            .emit_result(Op::CompositeConstruct, vec4, &[value, value, value, value])
    }

    /// `return; }` for a void function.
    pub fn end_void(&mut self) {
        self.b.emit(Op::Return, &[]);
        self.b.end_function();
    }

    /// Declare the entry point and assemble.
    pub fn finish(mut self, model: ExecutionModel, main: u32) -> Vec<u32> {
        let interface = std::mem::take(&mut self.interface);
        self.b.entry_point(model, main, "main", &interface);
        self.b.build()
    }
}

/// ```glsl
/// 1 layout(location = 0) out vec4 out_color;
/// 2 void main() {
/// 3     out_color = color;
/// 4 }
/// ```
pub fn solid_color_fragment(color: [f32; 4]) -> Vec<u32> {
    let mut f = Fixture::new();
    let out = f.output("out_color", f.vec4, 0);
    let parts: Vec<u32> = color.iter().map(|c| f.f32(*c)).collect();
    let vec4 = f.vec4;
    let value = f.b.constant_composite(vec4, &parts);
    let main = f.begin_main();
    f.line(3);
    f.store(out, value);
    f.line(4);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(location = 0) in vec4 in_position;
/// 2 layout(location = 1) in vec4 in_color;
/// 3 layout(location = 0) out vec4 v_color;
/// 4 void main() {
/// 5     gl_Position = in_position;
/// 6     v_color = in_color;
/// 7 }
/// ```
pub fn passthrough_vertex() -> Vec<u32> {
    let mut f = Fixture::new();
    let vec4 = f.vec4;
    let in_position = f.input("in_position", vec4, 0);
    let in_color = f.input("in_color", vec4, 1);
    let v_color = f.output("v_color", vec4, 0);
    let position = f.builtin("gl_Position", vec4, StorageClass::Output, BuiltIn::Position);
    let main = f.begin_main();
    f.line(5);
    let p = f.load(vec4, in_position);
    f.store(position, p);
    f.line(6);
    let c = f.load(vec4, in_color);
    f.store(v_color, c);
    f.line(7);
    f.end_void();
    f.finish(ExecutionModel::Vertex, main)
}

/// ```glsl
/// 1 layout(location = 0) in vec4 v_color;
/// 2 layout(location = 0) out vec4 out_color;
/// 3 void main() {
/// 4     out_color = v_color;
/// 5 }
/// ```
pub fn varying_color_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let vec4 = f.vec4;
    let v_color = f.input("v_color", vec4, 0);
    let out = f.output("out_color", vec4, 0);
    let main = f.begin_main();
    f.line(4);
    let c = f.load(vec4, v_color);
    f.store(out, c);
    f.line(5);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(binding = 0) uniform Params { uint width; };
/// 2 layout(binding = 1) buffer Counters { uint counts[]; } counters;
/// 3 layout(location = 0) out vec4 out_color;
/// 4 void main() {
/// 5     uint index = uint(gl_FragCoord.y) * width + uint(gl_FragCoord.x);
/// 6     atomicAdd(counters.counts[index], 1u);
/// 7     out_color = vec4(1.0);
/// 8 }
/// ```
pub fn coverage_counter_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec4, uint, float) = (f.vec4, f.uint, f.float);
    let params = f.uniform_block(&[("width", uint)], 0);
    let counters = f.storage_buffer("counters", "Counters", "counts", uint, 1);
    let out = f.output("out_color", vec4, 0);
    let frag_coord = f.builtin("gl_FragCoord", vec4, StorageClass::Input, BuiltIn::FragCoord);
    let zero = f.i32(0);
    let one = f.u32(1);
    let one_f = f.f32(1.0);
    let scope = f.i32(SCOPE_DEVICE);
    let semantics = f.i32(SEMANTICS_NONE);

    let main = f.begin_main();
    let index = f.local("index", uint);
    f.line(5);
    let fc = f.load(vec4, frag_coord);
    let fy = f.b.emit_result(Op::CompositeExtract, float, &[fc, 1]);
    let fx = f.b.emit_result(Op::CompositeExtract, float, &[fc, 0]);
    let y = f.b.emit_result(Op::ConvertFToU, uint, &[fy]);
    let x = f.b.emit_result(Op::ConvertFToU, uint, &[fx]);
    let width_ptr = f.access(params, StorageClass::Uniform, uint, &[zero]);
    let width = f.load(uint, width_ptr);
    let row = f.b.emit_result(Op::IMul, uint, &[y, width]);
    let i = f.b.emit_result(Op::IAdd, uint, &[row, x]);
    f.store(index, i);
    f.line(6);
    let i = f.load(uint, index);
    let slot = f.access(counters, StorageClass::StorageBuffer, uint, &[zero, i]);
    f.b.emit_result(Op::AtomicIAdd, uint, &[slot, scope, semantics, one]);
    f.line(7);
    let white = f.splat4(one_f);
    f.store(out, white);
    f.line(8);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(binding = 0) uniform Params { float u_x; };
/// 2 layout(location = 0) out vec4 out_color;
/// 3 void main() {
/// 4     float x = u_x;
/// 5     float y = x * 2.0;
/// 6     out_color = vec4(y);
/// 7 }
/// ```
pub fn conditional_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec4, float) = (f.vec4, f.float);
    let params = f.uniform_block(&[("u_x", float)], 0);
    let out = f.output("out_color", vec4, 0);
    let zero = f.i32(0);
    let two = f.f32(2.0);

    let main = f.begin_main();
    let x = f.local("x", float);
    let y = f.local("y", float);
    f.line(4);
    let ptr = f.access(params, StorageClass::Uniform, float, &[zero]);
    let u = f.load(float, ptr);
    f.store(x, u);
    f.line(5);
    let xv = f.load(float, x);
    let doubled = f.b.emit_result(Op::FMul, float, &[xv, two]);
    f.store(y, doubled);
    f.line(6);
    let yv = f.load(float, y);
    let c = f.splat4(yv);
    f.store(out, c);
    f.line(7);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(location = 0) out vec4 out_color;
/// 2 void main() {
/// 3     vec4 v = vec4(1.0, 2.0, 3.0, 4.0);
/// 4     float s = v.x + v.w;
/// 5     out_color = v * s;
/// 6 }
/// ```
pub fn vector_local_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec4, float) = (f.vec4, f.float);
    let out = f.output("out_color", vec4, 0);
    let parts = [f.f32(1.0), f.f32(2.0), f.f32(3.0), f.f32(4.0)];

    let main = f.begin_main();
    let v = f.local("v", vec4);
    let s = f.local("s", float);
    f.line(3);
    let value = f.b.emit_result(Op::CompositeConstruct, vec4, &parts);
    f.store(v, value);
    f.line(4);
    let vv = f.load(vec4, v);
    let vx = f.b.emit_result(Op::CompositeExtract, float, &[vv, 0]);
    let vw = f.b.emit_result(Op::CompositeExtract, float, &[vv, 3]);
    let sum = f.b.emit_result(Op::FAdd, float, &[vx, vw]);
    f.store(s, sum);
    f.line(5);
    let vv = f.load(vec4, v);
    let sv = f.load(float, s);
    let scaled = f.b.emit_result(Op::VectorTimesScalar, vec4, &[vv, sv]);
    f.store(out, scaled);
    f.line(6);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
///  1 layout(location = 0) out vec4 out_color;
///  2 float scale(float a) {
///  3     float doubled = a * 2.0;
///  4     return doubled;
///  5 }
///  6 void main() {
///  7     float a = 1.5;
///  8     float b = scale(a);
///  9     out_color = vec4(b);
/// 10 }
/// ```
pub fn call_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec4, float) = (f.vec4, f.float);
    let out = f.output("out_color", vec4, 0);
    let two = f.f32(2.0);
    let one_half = f.f32(1.5);
    let scale_ty = f.b.type_function(float, &[float]);

    let scale = f.b.begin_function(float, scale_ty);
    f.b.name(scale, "scale(f1;");
    let a_param = f.b.function_parameter(float);
    f.b.name(a_param, "a");
    f.b.label();
    let doubled = f.local("doubled", float);
    f.line(2);
    f.line(3);
    let product = f.b.emit_result(Op::FMul, float, &[a_param, two]);
    f.store(doubled, product);
    f.line(4);
    let result = f.load(float, doubled);
    f.b.emit(Op::ReturnValue, &[result]);
    f.line(5);
    f.b.end_function();

    let main = f.begin_main();
    let a = f.local("a", float);
    let b = f.local("b", float);
    f.line(7);
    f.store(a, one_half);
    f.line(8);
    let av = f.load(float, a);
    let called = f.b.emit_result(Op::FunctionCall, float, &[scale, av]);
    f.store(b, called);
    f.line(9);
    let bv = f.load(float, b);
    let c = f.splat4(bv);
    f.store(out, c);
    f.line(10);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(location = 0) out vec4 out_color;
/// 2 void main() {
/// 3     float i = 0.0;
/// 4     for (;;) {
/// 5         i = i + 1.0;
/// 6     }
/// 7 }
/// ```
pub fn infinite_loop_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let float = f.float;
    f.output("out_color", f.vec4, 0);
    let zero = f.f32(0.0);
    let one = f.f32(1.0);

    let main = f.begin_main();
    let i = f.local("i", float);
    f.line(3);
    f.store(i, zero);
    let header = f.b.id();
    let merge = f.b.id();
    f.b.emit(Op::Branch, &[header]);
    f.b.label_with(header);
    f.b.emit(Op::LoopMerge, &[merge, header, 0]);
    f.line(5);
    let iv = f.load(float, i);
    let next = f.b.emit_result(Op::FAdd, float, &[iv, one]);
    f.store(i, next);
    f.b.emit(Op::Branch, &[header]);
    f.b.label_with(merge);
    f.line(7);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(binding = 0) uniform Params { int divisor; };
/// 2 layout(location = 0) out vec4 out_color;
/// 3 void main() {
/// 4     int q = 10 / divisor;
/// 5     out_color = vec4(float(q));
/// 6 }
/// ```
pub fn division_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec4, int, float) = (f.vec4, f.int, f.float);
    let params = f.uniform_block(&[("divisor", int)], 0);
    let out = f.output("out_color", vec4, 0);
    let zero = f.i32(0);
    let ten = f.i32(10);

    let main = f.begin_main();
    let q = f.local("q", int);
    f.line(4);
    let ptr = f.access(params, StorageClass::Uniform, int, &[zero]);
    let divisor = f.load(int, ptr);
    let quotient = f.b.emit_result(Op::SDiv, int, &[ten, divisor]);
    f.store(q, quotient);
    f.line(5);
    let qv = f.load(int, q);
    let qf = f.b.emit_result(Op::ConvertSToF, float, &[qv]);
    let c = f.splat4(qf);
    f.store(out, c);
    f.line(6);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(location = 0) out vec4 out_color;
/// 2 void main() {
/// 3     out_color = vec4(1.0);
/// 4     discard;
/// 5 }
/// ```
pub fn discard_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let out = f.output("out_color", f.vec4, 0);
    let one = f.f32(1.0);
    let main = f.begin_main();
    f.line(3);
    let c = f.splat4(one);
    f.store(out, c);
    f.line(4);
    f.b.emit(Op::Kill, &[]);
    f.b.end_function();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(local_size_x = 4) in;
/// 2 shared uint shared_data[4];
/// 3 layout(binding = 0) buffer Results { uint values[]; } results;
/// 4 void main() {
/// 5     uint idx = gl_LocalInvocationIndex;
/// 6     shared_data[idx] = idx + 1u;
/// 7     barrier();
/// 8     results.values[idx] = shared_data[(idx + 1u) % 4u];
/// 9 }
/// ```
pub fn shared_memory_compute() -> Vec<u32> {
    let mut f = Fixture::new();
    let uint = f.uint;
    let array = f.b.type_array(uint, 4);
    let shared = f.interface_variable("shared_data", array, StorageClass::Workgroup);
    let results = f.storage_buffer("results", "Results", "values", uint, 0);
    let local_index = f.builtin(
        "gl_LocalInvocationIndex",
        uint,
        StorageClass::Input,
        BuiltIn::LocalInvocationIndex,
    );
    let zero = f.i32(0);
    let one = f.u32(1);
    let four = f.u32(4);
    let workgroup = f.i32(SCOPE_WORKGROUP);
    let semantics = f.i32(SEMANTICS_WORKGROUP_ACQ_REL);

    let main = f.begin_main();
    let idx = f.local("idx", uint);
    f.line(5);
    let li = f.load(uint, local_index);
    f.store(idx, li);
    f.line(6);
    let i = f.load(uint, idx);
    let value = f.b.emit_result(Op::IAdd, uint, &[i, one]);
    let slot = f.access(shared, StorageClass::Workgroup, uint, &[i]);
    f.store(slot, value);
    f.line(7);
    f.b.emit(Op::ControlBarrier, &[workgroup, workgroup, semantics]);
    f.line(8);
    let i = f.load(uint, idx);
    let next = f.b.emit_result(Op::IAdd, uint, &[i, one]);
    let wrapped = f.b.emit_result(Op::UMod, uint, &[next, four]);
    let src = f.access(shared, StorageClass::Workgroup, uint, &[wrapped]);
    let neighbour = f.load(uint, src);
    let dst = f.access(results, StorageClass::StorageBuffer, uint, &[zero, i]);
    f.store(dst, neighbour);
    f.line(9);
    f.end_void();
    f.b.execution_mode(main, ExecutionMode::LocalSize, &[4, 1, 1]);
    f.finish(ExecutionModel::GLCompute, main)
}

/// ```glsl
/// 1 layout(triangles) in;
/// 2 layout(triangle_strip, max_vertices = 3) out;
/// 3 layout(location = 0) in vec4 in_position[3];
/// 4 void main() {
/// 5     gl_Position = in_position[0]; EmitVertex();
/// 6     gl_Position = in_position[1]; EmitVertex();
/// 7     gl_Position = in_position[2]; EmitVertex();
/// 8     EndPrimitive();
/// 9 }
/// ```
pub fn geometry_passthrough() -> Vec<u32> {
    let mut f = Fixture::new();
    let vec4 = f.vec4;
    let array = f.b.type_array(vec4, 3);
    let in_position = f.input("in_position", array, 0);
    let position = f.builtin("gl_Position", vec4, StorageClass::Output, BuiltIn::Position);
    let indices = [f.i32(0), f.i32(1), f.i32(2)];

    let main = f.begin_main();
    for (line, index) in (5..).zip(indices) {
        f.line(line);
        let ptr = f.access(in_position, StorageClass::Input, vec4, &[index]);
        let p = f.load(vec4, ptr);
        f.store(position, p);
        f.b.emit(Op::EmitVertex, &[]);
    }
    f.line(8);
    f.b.emit(Op::EndPrimitive, &[]);
    f.line(9);
    f.end_void();
    f.b.execution_mode(main, ExecutionMode::Triangles, &[]);
    f.b.execution_mode(main, ExecutionMode::Invocations, &[1]);
    f.b.execution_mode(main, ExecutionMode::OutputTriangleStrip, &[]);
    f.b.execution_mode(main, ExecutionMode::OutputVertices, &[3]);
    f.finish(ExecutionModel::Geometry, main)
}

/// ```glsl
/// 1 layout(vertices = 3) out;
/// 2 layout(location = 0) in float in_value[3];
/// 3 layout(location = 0) out float out_value[3];
/// 4 void main() {
/// 5     out_value[gl_InvocationID] = in_value[gl_InvocationID] * 2.0;
/// 6 }
/// ```
pub fn tessellation_doubler() -> Vec<u32> {
    let mut f = Fixture::new();
    let (float, int) = (f.float, f.int);
    let array = f.b.type_array(float, 3);
    let in_value = f.input("in_value", array, 0);
    let out_value = f.output("out_value", array, 0);
    let invocation = f.builtin("gl_InvocationID", int, StorageClass::Input, BuiltIn::InvocationId);
    let two = f.f32(2.0);

    let main = f.begin_main();
    f.line(5);
    let id = f.load(int, invocation);
    let src = f.access(in_value, StorageClass::Input, float, &[id]);
    let v = f.load(float, src);
    let doubled = f.b.emit_result(Op::FMul, float, &[v, two]);
    let dst = f.access(out_value, StorageClass::Output, float, &[id]);
    f.store(dst, doubled);
    f.line(6);
    f.end_void();
    f.b.execution_mode(main, ExecutionMode::OutputVertices, &[3]);
    f.finish(ExecutionModel::TessellationControl, main)
}

/// ```glsl
/// 1 layout(binding = 0) uniform sampler2D tex;
/// 2 layout(location = 0) in vec2 v_uv;
/// 3 layout(location = 0) out vec4 out_color;
/// 4 void main() {
/// 5     out_color = texture(tex, v_uv);
/// 6 }
/// ```
pub fn texture_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec2, vec4, float) = (f.vec2, f.vec4, f.float);
    let image = f.b.declare_type(refract_spirv::TypeDesc::Image { sampled: float, dim: 1 });
    let sampled = f
        .b
        .declare_type(refract_spirv::TypeDesc::SampledImage { image });
    let tex = f.b.variable(sampled, StorageClass::UniformConstant);
    f.b.name(tex, "tex");
    f.b.decorate(tex, Decoration::Binding, &[0]);
    f.b.decorate(tex, Decoration::DescriptorSet, &[0]);
    let v_uv = f.input("v_uv", vec2, 0);
    let out = f.output("out_color", vec4, 0);

    let main = f.begin_main();
    f.line(5);
    let t = f.load(sampled, tex);
    let uv = f.load(vec2, v_uv);
    let color = f.b.emit_result(Op::ImageSampleImplicitLod, vec4, &[t, uv]);
    f.store(out, color);
    f.line(6);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 layout(location = 0) out vec4 out_color;
/// 2 void main() {
/// 3     float x = gl_FragCoord.x;
/// 4     float y = gl_FragCoord.y;
/// 5     out_color = vec4(x, y, 0.0, 1.0);
/// 6 }
/// ```
pub fn gradient_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec4, float) = (f.vec4, f.float);
    let out = f.output("out_color", vec4, 0);
    let frag_coord = f.builtin("gl_FragCoord", vec4, StorageClass::Input, BuiltIn::FragCoord);
    let zero = f.f32(0.0);
    let one = f.f32(1.0);

    let main = f.begin_main();
    let x = f.local("x", float);
    let y = f.local("y", float);
    f.line(3);
    let fc = f.load(vec4, frag_coord);
    let fx = f.b.emit_result(Op::CompositeExtract, float, &[fc, 0]);
    f.store(x, fx);
    f.line(4);
    let fc = f.load(vec4, frag_coord);
    let fy = f.b.emit_result(Op::CompositeExtract, float, &[fc, 1]);
    f.store(y, fy);
    f.line(5);
    let xv = f.load(float, x);
    let yv = f.load(float, y);
    let c = f.b.emit_result(Op::CompositeConstruct, vec4, &[xv, yv, zero, one]);
    f.store(out, c);
    f.line(6);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}

/// ```glsl
/// 1 struct Light { vec3 direction; float power; };
/// 2 layout(location = 0) out vec4 out_color;
/// 3 void main() {
/// 4     Light light = Light(vec3(0.0, 1.0, 0.0), 2.5);
/// 5     float weights[3] = float[3](0.25, 0.5, 0.25);
/// 6     mat2 m = mat2(1.0, 2.0, 3.0, 4.0);
/// 7     out_color = vec4(light.power * weights[1]);
/// 8 }
/// ```
pub fn struct_local_fragment() -> Vec<u32> {
    let mut f = Fixture::new();
    let (vec2, vec3, vec4, float) = (f.vec2, f.vec3, f.vec4, f.float);
    let light_ty = f.b.type_struct(&[vec3, float]);
    f.b.name(light_ty, "Light");
    f.b.member_name(light_ty, 0, "direction");
    f.b.member_name(light_ty, 1, "power");
    let weights_ty = f.b.type_array(float, 3);
    let mat2 = f.b.type_matrix(vec2, 2);
    let out = f.output("out_color", vec4, 0);
    let (c0, c1, c2, c3, c4) = (f.f32(0.0), f.f32(1.0), f.f32(2.0), f.f32(3.0), f.f32(4.0));
    let (quarter, half, power) = (f.f32(0.25), f.f32(0.5), f.f32(2.5));
    let index_one = f.i32(1);

    let main = f.begin_main();
    let light = f.local("light", light_ty);
    let weights = f.local("weights", weights_ty);
    let m = f.local("m", mat2);
    f.line(4);
    let dir = f.b.emit_result(Op::CompositeConstruct, vec3, &[c0, c1, c0]);
    let l = f.b.emit_result(Op::CompositeConstruct, light_ty, &[dir, power]);
    f.store(light, l);
    f.line(5);
    let w = f
        .b
        .emit_result(Op::CompositeConstruct, weights_ty, &[quarter, half, quarter]);
    f.store(weights, w);
    f.line(6);
    let col0 = f.b.emit_result(Op::CompositeConstruct, vec2, &[c1, c2]);
    let col1 = f.b.emit_result(Op::CompositeConstruct, vec2, &[c3, c4]);
    let mv = f.b.emit_result(Op::CompositeConstruct, mat2, &[col0, col1]);
    f.store(m, mv);
    f.line(7);
    let lv = f.load(light_ty, light);
    let p = f.b.emit_result(Op::CompositeExtract, float, &[lv, 1]);
    let wptr = f.access(weights, StorageClass::Function, float, &[index_one]);
    let wv = f.load(float, wptr);
    let product = f.b.emit_result(Op::FMul, float, &[p, wv]);
    let c = f.splat4(product);
    f.store(out, c);
    f.line(8);
    f.end_void();
    f.finish(ExecutionModel::Fragment, main)
}
