//! Execution faults and undefined-behavior events.

use refract_spirv::ModuleError;
use thiserror::Error;

/// VM result type.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Fatal faults. They end the current invocation only; the session can be
/// restarted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// The module could not be read.
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// An operand id has no value in the current frame, constants or globals.
    #[error("id {id} has no value")]
    UndefinedId {
        /// The unresolved id.
        id: u32,
    },

    /// An instruction is shorter than its opcode requires.
    #[error("opcode {op:?} is missing operand {index}")]
    MissingOperand {
        /// Offending opcode.
        op: refract_spirv::Op,
        /// Index of the missing operand word.
        index: usize,
    },

    /// Operand values have the wrong shape for the instruction.
    #[error("type mismatch in {op:?}: {message}")]
    TypeMismatch {
        /// Offending opcode.
        op: refract_spirv::Op,
        /// What was expected.
        message: String,
    },

    /// A branch or call targets an unknown label or function.
    #[error("unknown branch target {id}")]
    InvalidTarget {
        /// Target id.
        id: u32,
    },

    /// The requested function does not exist.
    #[error("unknown function {id}")]
    UnknownFunction {
        /// Function id.
        id: u32,
    },

    /// An extended instruction set other than `GLSL.std.450` was used.
    #[error("unsupported extended instruction {set}:{instruction}")]
    UnsupportedExtInst {
        /// Import id.
        set: u32,
        /// Instruction number within the set.
        instruction: u32,
    },

    /// The opcode is recognized but not executable.
    #[error("opcode {0:?} cannot be executed")]
    Unsupported(refract_spirv::Op),

    /// Execution reached `OpUnreachable`.
    #[error("reached unreachable code")]
    Unreachable,

    /// Stepping was requested while no invocation is active.
    #[error("no active invocation")]
    NotRunning,

    /// Call depth exceeded.
    #[error("call depth limit {limit} exceeded")]
    StackOverflow {
        /// Configured limit.
        limit: usize,
    },
}

/// Classification of a non-fatal undefined-behavior event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UndefinedBehavior {
    DivisionByZero = 1,
    IndexOutOfBounds = 2,
    SqrtOfNegative = 3,
    LogOfNonPositive = 4,
    PowDomain = 5,
    ShiftOutOfRange = 6,
    ClampBounds = 7,
    AsinAcosDomain = 8,
    SmoothStepBounds = 9,
    NullPointer = 10,
}

impl UndefinedBehavior {
    /// Packed code, never zero.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use UndefinedBehavior::*;
        [
            DivisionByZero,
            IndexOutOfBounds,
            SqrtOfNegative,
            LogOfNonPositive,
            PowDomain,
            ShiftOutOfRange,
            ClampBounds,
            AsinAcosDomain,
            SmoothStepBounds,
            NullPointer,
        ]
        .into_iter()
        .find(|kind| kind.code() == code)
    }

    pub fn describe(self) -> &'static str {
        match self {
            UndefinedBehavior::DivisionByZero => "division by zero",
            UndefinedBehavior::IndexOutOfBounds => "index out of bounds",
            UndefinedBehavior::SqrtOfNegative => "square root of a negative number",
            UndefinedBehavior::LogOfNonPositive => "logarithm of a non-positive number",
            UndefinedBehavior::PowDomain => "pow with a negative base or 0^y with y <= 0",
            UndefinedBehavior::ShiftOutOfRange => "shift amount outside 0..32",
            UndefinedBehavior::ClampBounds => "clamp with min greater than max",
            UndefinedBehavior::AsinAcosDomain => "asin/acos argument outside [-1, 1]",
            UndefinedBehavior::SmoothStepBounds => "smoothstep with edge0 >= edge1",
            UndefinedBehavior::NullPointer => "access through an invalid pointer",
        }
    }
}

/// One recorded undefined-behavior occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbEvent {
    pub kind: UndefinedBehavior,
    /// Source line of the instruction, if known.
    pub line: Option<u32>,
}
