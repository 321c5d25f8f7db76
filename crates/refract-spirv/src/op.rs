//! Opcode and operand enumerations for the supported SPIR-V subset.
//!
//! Values are the numeric encodings from the SPIR-V unified headers. Only the
//! instructions and enumerants the debugger understands are listed; anything
//! else decodes to `None` and is skipped by word count.

macro_rules! word_enum {
    (
        $(#[$outer:meta])*
        $name:ident : $repr:ty {
            $($(#[$inner:meta])* $variant:ident = $value:literal,)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        pub enum $name {
            $($(#[$inner])* $variant = $value,)*
        }

        impl $name {
            /// Decode a raw operand value.
            pub fn from_word(value: $repr) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Raw operand value.
            pub fn word(self) -> $repr {
                self as $repr
            }
        }
    };
}

word_enum! {
    /// Instruction opcodes.
    Op: u16 {
        Nop = 0,
        Undef = 1,
        Source = 3,
        SourceExtension = 4,
        Name = 5,
        MemberName = 6,
        String = 7,
        Line = 8,
        Extension = 10,
        ExtInstImport = 11,
        ExtInst = 12,
        MemoryModel = 14,
        EntryPoint = 15,
        ExecutionMode = 16,
        Capability = 17,
        TypeVoid = 19,
        TypeBool = 20,
        TypeInt = 21,
        TypeFloat = 22,
        TypeVector = 23,
        TypeMatrix = 24,
        TypeImage = 25,
        TypeSampler = 26,
        TypeSampledImage = 27,
        TypeArray = 28,
        TypeRuntimeArray = 29,
        TypeStruct = 30,
        TypePointer = 32,
        TypeFunction = 33,
        ConstantTrue = 41,
        ConstantFalse = 42,
        Constant = 43,
        ConstantComposite = 44,
        ConstantNull = 46,
        Function = 54,
        FunctionParameter = 55,
        FunctionEnd = 56,
        FunctionCall = 57,
        Variable = 59,
        Load = 61,
        Store = 62,
        CopyMemory = 63,
        AccessChain = 65,
        InBoundsAccessChain = 66,
        ArrayLength = 68,
        Decorate = 71,
        MemberDecorate = 72,
        VectorExtractDynamic = 77,
        VectorInsertDynamic = 78,
        VectorShuffle = 79,
        CompositeConstruct = 80,
        CompositeExtract = 81,
        CompositeInsert = 82,
        CopyObject = 83,
        Transpose = 84,
        SampledImage = 86,
        ImageSampleImplicitLod = 87,
        ImageSampleExplicitLod = 88,
        ImageSampleDrefImplicitLod = 89,
        ImageSampleDrefExplicitLod = 90,
        ImageSampleProjImplicitLod = 91,
        ImageSampleProjExplicitLod = 92,
        ImageFetch = 95,
        ImageGather = 96,
        ImageRead = 98,
        ImageWrite = 99,
        Image = 100,
        ImageQuerySizeLod = 103,
        ImageQuerySize = 104,
        ImageQueryLod = 105,
        ImageQueryLevels = 106,
        ConvertFToU = 109,
        ConvertFToS = 110,
        ConvertSToF = 111,
        ConvertUToF = 112,
        UConvert = 113,
        SConvert = 114,
        FConvert = 115,
        Bitcast = 124,
        SNegate = 126,
        FNegate = 127,
        IAdd = 128,
        FAdd = 129,
        ISub = 130,
        FSub = 131,
        IMul = 132,
        FMul = 133,
        UDiv = 134,
        SDiv = 135,
        FDiv = 136,
        UMod = 137,
        SRem = 138,
        SMod = 139,
        FRem = 140,
        FMod = 141,
        VectorTimesScalar = 142,
        MatrixTimesScalar = 143,
        VectorTimesMatrix = 144,
        MatrixTimesVector = 145,
        MatrixTimesMatrix = 146,
        OuterProduct = 147,
        Dot = 148,
        Any = 154,
        All = 155,
        IsNan = 156,
        IsInf = 157,
        LogicalEqual = 164,
        LogicalNotEqual = 165,
        LogicalOr = 166,
        LogicalAnd = 167,
        LogicalNot = 168,
        Select = 169,
        IEqual = 170,
        INotEqual = 171,
        UGreaterThan = 172,
        SGreaterThan = 173,
        UGreaterThanEqual = 174,
        SGreaterThanEqual = 175,
        ULessThan = 176,
        SLessThan = 177,
        ULessThanEqual = 178,
        SLessThanEqual = 179,
        FOrdEqual = 180,
        FUnordEqual = 181,
        FOrdNotEqual = 182,
        FUnordNotEqual = 183,
        FOrdLessThan = 184,
        FUnordLessThan = 185,
        FOrdGreaterThan = 186,
        FUnordGreaterThan = 187,
        FOrdLessThanEqual = 188,
        FUnordLessThanEqual = 189,
        FOrdGreaterThanEqual = 190,
        FUnordGreaterThanEqual = 191,
        ShiftRightLogical = 194,
        ShiftRightArithmetic = 195,
        ShiftLeftLogical = 196,
        BitwiseOr = 197,
        BitwiseXor = 198,
        BitwiseAnd = 199,
        Not = 200,
        BitFieldInsert = 201,
        BitFieldSExtract = 202,
        BitFieldUExtract = 203,
        BitReverse = 204,
        BitCount = 205,
        DPdx = 207,
        DPdy = 208,
        Fwidth = 209,
        DPdxFine = 210,
        DPdyFine = 211,
        FwidthFine = 212,
        DPdxCoarse = 213,
        DPdyCoarse = 214,
        FwidthCoarse = 215,
        EmitVertex = 218,
        EndPrimitive = 219,
        ControlBarrier = 224,
        MemoryBarrier = 225,
        AtomicLoad = 227,
        AtomicStore = 228,
        AtomicExchange = 229,
        AtomicIIncrement = 232,
        AtomicIDecrement = 233,
        AtomicIAdd = 234,
        AtomicISub = 235,
        AtomicSMin = 236,
        AtomicUMin = 237,
        AtomicSMax = 238,
        AtomicUMax = 239,
        AtomicAnd = 240,
        AtomicOr = 241,
        AtomicXor = 242,
        Phi = 245,
        LoopMerge = 246,
        SelectionMerge = 247,
        Label = 248,
        Branch = 249,
        BranchConditional = 250,
        Switch = 251,
        Kill = 252,
        Return = 253,
        ReturnValue = 254,
        Unreachable = 255,
        NoLine = 317,
        ModuleProcessed = 330,
        TerminateInvocation = 4416,
        DemoteToHelperInvocation = 5380,
    }
}

word_enum! {
    /// Where a variable lives.
    StorageClass: u32 {
        UniformConstant = 0,
        Input = 1,
        Uniform = 2,
        Output = 3,
        Workgroup = 4,
        CrossWorkgroup = 5,
        Private = 6,
        Function = 7,
        Generic = 8,
        PushConstant = 9,
        AtomicCounter = 10,
        Image = 11,
        StorageBuffer = 12,
    }
}

word_enum! {
    /// Decorations consumed by the debugger.
    Decoration: u32 {
        Block = 2,
        BufferBlock = 3,
        BuiltIn = 11,
        NoPerspective = 13,
        Flat = 14,
        Patch = 15,
        Location = 30,
        Component = 31,
        Binding = 33,
        DescriptorSet = 34,
        Offset = 35,
    }
}

word_enum! {
    /// Built-in variables bound by the stage input setters.
    BuiltIn: u32 {
        Position = 0,
        PointSize = 1,
        ClipDistance = 3,
        CullDistance = 4,
        VertexId = 5,
        InstanceId = 6,
        PrimitiveId = 7,
        InvocationId = 8,
        Layer = 9,
        TessLevelOuter = 11,
        TessLevelInner = 12,
        TessCoord = 13,
        PatchVertices = 14,
        FragCoord = 15,
        PointCoord = 16,
        FrontFacing = 17,
        FragDepth = 22,
        HelperInvocation = 23,
        NumWorkgroups = 24,
        WorkgroupSize = 25,
        WorkgroupId = 26,
        LocalInvocationId = 27,
        GlobalInvocationId = 28,
        LocalInvocationIndex = 29,
        VertexIndex = 42,
        InstanceIndex = 43,
    }
}

word_enum! {
    /// Shader stage of an entry point.
    ExecutionModel: u32 {
        Vertex = 0,
        TessellationControl = 1,
        TessellationEvaluation = 2,
        Geometry = 3,
        Fragment = 4,
        GLCompute = 5,
    }
}

word_enum! {
    /// Execution modes read from `OpExecutionMode`.
    ExecutionMode: u32 {
        Invocations = 0,
        OriginUpperLeft = 7,
        OriginLowerLeft = 8,
        LocalSize = 17,
        InputPoints = 19,
        Triangles = 22,
        OutputVertices = 26,
        OutputPoints = 27,
        OutputLineStrip = 28,
        OutputTriangleStrip = 29,
    }
}

word_enum! {
    /// `GLSL.std.450` extended instruction numbers.
    GlslOp: u32 {
        Round = 1,
        RoundEven = 2,
        Trunc = 3,
        FAbs = 4,
        SAbs = 5,
        FSign = 6,
        SSign = 7,
        Floor = 8,
        Ceil = 9,
        Fract = 10,
        Radians = 11,
        Degrees = 12,
        Sin = 13,
        Cos = 14,
        Tan = 15,
        Asin = 16,
        Acos = 17,
        Atan = 18,
        Sinh = 19,
        Cosh = 20,
        Tanh = 21,
        Atan2 = 25,
        Pow = 26,
        Exp = 27,
        Log = 28,
        Exp2 = 29,
        Log2 = 30,
        Sqrt = 31,
        InverseSqrt = 32,
        Determinant = 33,
        FMin = 37,
        UMin = 38,
        SMin = 39,
        FMax = 40,
        UMax = 41,
        SMax = 42,
        FClamp = 43,
        UClamp = 44,
        SClamp = 45,
        FMix = 46,
        Step = 48,
        SmoothStep = 49,
        Fma = 50,
        Length = 66,
        Distance = 67,
        Cross = 68,
        Normalize = 69,
        FaceForward = 70,
        Reflect = 71,
        NMin = 79,
        NMax = 80,
        NClamp = 81,
    }
}

/// Name of the only extended instruction set the VM executes.
pub const GLSL_STD_450: &str = "GLSL.std.450";

/// Instruction category used by the profile histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Arithmetic,
    Bitwise,
    Logical,
    Texture,
    Derivative,
    ControlFlow,
}

impl Op {
    /// Histogram bucket of this opcode, if it is counted at all.
    pub fn category(self) -> Option<Category> {
        use Op::*;
        let category = match self {
            SNegate | FNegate | IAdd | FAdd | ISub | FSub | IMul | FMul | UDiv | SDiv | FDiv
            | UMod | SRem | SMod | FRem | FMod | VectorTimesScalar | MatrixTimesScalar
            | VectorTimesMatrix | MatrixTimesVector | MatrixTimesMatrix | OuterProduct | Dot
            | Transpose | ExtInst => Category::Arithmetic,

            ShiftRightLogical | ShiftRightArithmetic | ShiftLeftLogical | BitwiseOr
            | BitwiseXor | BitwiseAnd | Not | BitFieldInsert | BitFieldSExtract
            | BitFieldUExtract | BitReverse | BitCount => Category::Bitwise,

            Any | All | IsNan | IsInf | LogicalEqual | LogicalNotEqual | LogicalOr
            | LogicalAnd | LogicalNot | Select | IEqual | INotEqual | UGreaterThan
            | SGreaterThan | UGreaterThanEqual | SGreaterThanEqual | ULessThan | SLessThan
            | ULessThanEqual | SLessThanEqual | FOrdEqual | FUnordEqual | FOrdNotEqual
            | FUnordNotEqual | FOrdLessThan | FUnordLessThan | FOrdGreaterThan
            | FUnordGreaterThan | FOrdLessThanEqual | FUnordLessThanEqual
            | FOrdGreaterThanEqual | FUnordGreaterThanEqual => Category::Logical,

            SampledImage | ImageSampleImplicitLod | ImageSampleExplicitLod
            | ImageSampleDrefImplicitLod | ImageSampleDrefExplicitLod
            | ImageSampleProjImplicitLod | ImageSampleProjExplicitLod | ImageFetch
            | ImageGather | ImageRead | ImageWrite | ImageQuerySizeLod | ImageQuerySize
            | ImageQueryLod | ImageQueryLevels => Category::Texture,

            DPdx | DPdy | Fwidth | DPdxFine | DPdyFine | FwidthFine | DPdxCoarse
            | DPdyCoarse | FwidthCoarse => Category::Derivative,

            Phi | LoopMerge | SelectionMerge | Branch | BranchConditional | Switch | Kill
            | Return | ReturnValue | FunctionCall | TerminateInvocation
            | DemoteToHelperInvocation => Category::ControlFlow,

            _ => return None,
        };
        Some(category)
    }

    /// Whether the instruction synchronizes invocations.
    pub fn is_barrier(self) -> bool {
        matches!(self, Op::ControlBarrier | Op::MemoryBarrier)
    }

    /// Whether the instruction belongs to the logical-layout debug section.
    pub fn is_debug(self) -> bool {
        matches!(
            self,
            Op::Source | Op::SourceExtension | Op::String | Op::Name | Op::MemberName | Op::ModuleProcessed
        )
    }

    /// Whether the instruction belongs to the logical-layout annotation section.
    pub fn is_annotation(self) -> bool {
        matches!(self, Op::Decorate | Op::MemberDecorate)
    }

    /// Whether the instruction belongs to the module preamble
    /// (capabilities, imports, memory model, entry points, execution modes).
    pub fn is_preamble(self) -> bool {
        matches!(
            self,
            Op::Capability
                | Op::Extension
                | Op::ExtInstImport
                | Op::MemoryModel
                | Op::EntryPoint
                | Op::ExecutionMode
        )
    }

    /// Whether the instruction ends a block or the whole invocation.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Op::Branch
                | Op::BranchConditional
                | Op::Switch
                | Op::Kill
                | Op::Return
                | Op::ReturnValue
                | Op::Unreachable
                | Op::TerminateInvocation
        )
    }
}
