//! Instruction set
//!
//! A stack-machine instruction set modelled on the common intermediate
//! language: typed constants, argument and local access with short forms,
//! wrapping and overflow-checked arithmetic, short and long branches,
//! conversions, calls, object model operations, arrays and structured
//! exception control.
//!
//! Opcodes are grouped by category:
//! - 0x00-0x1F: Constants & stack manipulation
//! - 0x20-0x3F: Arguments & locals
//! - 0x40-0x5F: Arithmetic & bitwise
//! - 0x60-0x6F: Comparison
//! - 0x70-0x8F: Conversions
//! - 0x90-0xAF: Branches
//! - 0xB0-0xBF: Calls
//! - 0xC0-0xCF: Object model
//! - 0xD0-0xDF: Arrays
//! - 0xE0-0xEF: Exception control

/// Instruction opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Constants & Stack (0x00-0x1F) =====
    /// No operation
    Nop = 0x00,
    /// Duplicate top stack value
    Dup = 0x01,
    /// Pop top value from stack
    Pop = 0x02,
    /// Push null reference
    Ldnull = 0x03,
    /// Push -1 (int32)
    LdcI4M1 = 0x04,
    /// Push 0 (int32)
    LdcI4_0 = 0x05,
    /// Push 1 (int32)
    LdcI4_1 = 0x06,
    /// Push 2 (int32)
    LdcI4_2 = 0x07,
    /// Push 3 (int32)
    LdcI4_3 = 0x08,
    /// Push 4 (int32)
    LdcI4_4 = 0x09,
    /// Push 5 (int32)
    LdcI4_5 = 0x0A,
    /// Push 6 (int32)
    LdcI4_6 = 0x0B,
    /// Push 7 (int32)
    LdcI4_7 = 0x0C,
    /// Push 8 (int32)
    LdcI4_8 = 0x0D,
    /// Push int32 in -128..=127 (operand: short i32)
    LdcI4S = 0x0E,
    /// Push int32 (operand: i32)
    LdcI4 = 0x0F,
    /// Push int64 (operand: i64)
    LdcI8 = 0x10,
    /// Push float32 (operand: f32)
    LdcR4 = 0x11,
    /// Push float64 (operand: f64)
    LdcR8 = 0x12,
    /// Push string literal (operand: string)
    Ldstr = 0x13,

    // ===== Arguments & Locals (0x20-0x3F) =====
    /// Load argument 0 (`this` for instance methods)
    Ldarg0 = 0x20,
    /// Load argument 1
    Ldarg1 = 0x21,
    /// Load argument 2
    Ldarg2 = 0x22,
    /// Load argument 3
    Ldarg3 = 0x23,
    /// Load argument (operand: u8 index)
    LdargS = 0x24,
    /// Load argument (operand: u16 index)
    Ldarg = 0x25,
    /// Store argument (operand: u8 index)
    StargS = 0x26,
    /// Store argument (operand: u16 index)
    Starg = 0x27,
    /// Load local 0
    Ldloc0 = 0x28,
    /// Load local 1
    Ldloc1 = 0x29,
    /// Load local 2
    Ldloc2 = 0x2A,
    /// Load local 3
    Ldloc3 = 0x2B,
    /// Load local (operand: u8 index)
    LdlocS = 0x2C,
    /// Load local (operand: u16 index)
    Ldloc = 0x2D,
    /// Store local 0
    Stloc0 = 0x2E,
    /// Store local 1
    Stloc1 = 0x2F,
    /// Store local 2
    Stloc2 = 0x30,
    /// Store local 3
    Stloc3 = 0x31,
    /// Store local (operand: u8 index)
    StlocS = 0x32,
    /// Store local (operand: u16 index)
    Stloc = 0x33,

    // ===== Arithmetic & Bitwise (0x40-0x5F) =====
    /// pop b, pop a, push a + b (wrapping)
    Add = 0x40,
    /// pop b, pop a, push a - b (wrapping)
    Sub = 0x41,
    /// pop b, pop a, push a * b (wrapping)
    Mul = 0x42,
    /// pop b, pop a, push a / b
    Div = 0x43,
    /// Unsigned division
    DivUn = 0x44,
    /// pop b, pop a, push a % b
    Rem = 0x45,
    /// Unsigned remainder
    RemUn = 0x46,
    /// Bitwise AND
    And = 0x47,
    /// Bitwise OR
    Or = 0x48,
    /// Bitwise XOR
    Xor = 0x49,
    /// Shift left
    Shl = 0x4A,
    /// Arithmetic shift right
    Shr = 0x4B,
    /// Logical shift right
    ShrUn = 0x4C,
    /// Negate
    Neg = 0x4D,
    /// Bitwise NOT
    Not = 0x4E,
    /// Add, trapping on signed overflow
    AddOvf = 0x50,
    /// Add, trapping on unsigned overflow
    AddOvfUn = 0x51,
    /// Subtract, trapping on signed overflow
    SubOvf = 0x52,
    /// Subtract, trapping on unsigned overflow
    SubOvfUn = 0x53,
    /// Multiply, trapping on signed overflow
    MulOvf = 0x54,
    /// Multiply, trapping on unsigned overflow
    MulOvfUn = 0x55,
    /// Trap if the top float is NaN or infinite
    Ckfinite = 0x56,

    // ===== Comparison (0x60-0x6F) =====
    /// pop b, pop a, push a == b
    Ceq = 0x60,
    /// pop b, pop a, push a > b
    Cgt = 0x61,
    /// Unsigned (or unordered) greater than
    CgtUn = 0x62,
    /// pop b, pop a, push a < b
    Clt = 0x63,
    /// Unsigned (or unordered) less than
    CltUn = 0x64,

    // ===== Conversions (0x70-0x8F) =====
    /// Convert to int8, push int32
    ConvI1 = 0x70,
    /// Convert to int16, push int32
    ConvI2 = 0x71,
    /// Convert to int32
    ConvI4 = 0x72,
    /// Convert to int64
    ConvI8 = 0x73,
    /// Convert to uint8, push int32
    ConvU1 = 0x74,
    /// Convert to uint16, push int32
    ConvU2 = 0x75,
    /// Convert to uint32, push int32
    ConvU4 = 0x76,
    /// Convert to uint64, push int64
    ConvU8 = 0x77,
    /// Convert to float32
    ConvR4 = 0x78,
    /// Convert to float64
    ConvR8 = 0x79,
    /// Convert unsigned integer to float
    ConvRUn = 0x7A,
    /// Checked conversion to int8
    ConvOvfI1 = 0x80,
    /// Checked conversion to int16
    ConvOvfI2 = 0x81,
    /// Checked conversion to int32
    ConvOvfI4 = 0x82,
    /// Checked conversion to int64
    ConvOvfI8 = 0x83,
    /// Checked conversion to uint8
    ConvOvfU1 = 0x84,
    /// Checked conversion to uint16
    ConvOvfU2 = 0x85,
    /// Checked conversion to uint32
    ConvOvfU4 = 0x86,
    /// Checked conversion to uint64
    ConvOvfU8 = 0x87,

    // ===== Branches (0x90-0xAF) =====
    /// Unconditional branch (short)
    BrS = 0x90,
    /// Branch if false/zero/null (short)
    BrfalseS = 0x91,
    /// Branch if true/non-zero/non-null (short)
    BrtrueS = 0x92,
    /// Branch if equal (short)
    BeqS = 0x93,
    /// Branch if greater or equal (short)
    BgeS = 0x94,
    /// Branch if greater (short)
    BgtS = 0x95,
    /// Branch if less or equal (short)
    BleS = 0x96,
    /// Branch if less (short)
    BltS = 0x97,
    /// Branch if not equal, unsigned/unordered (short)
    BneUnS = 0x98,
    /// Branch if greater or equal, unsigned (short)
    BgeUnS = 0x99,
    /// Branch if greater, unsigned (short)
    BgtUnS = 0x9A,
    /// Branch if less or equal, unsigned (short)
    BleUnS = 0x9B,
    /// Branch if less, unsigned (short)
    BltUnS = 0x9C,
    /// Unconditional branch
    Br = 0xA0,
    /// Branch if false/zero/null
    Brfalse = 0xA1,
    /// Branch if true/non-zero/non-null
    Brtrue = 0xA2,
    /// Branch if equal
    Beq = 0xA3,
    /// Branch if greater or equal
    Bge = 0xA4,
    /// Branch if greater
    Bgt = 0xA5,
    /// Branch if less or equal
    Ble = 0xA6,
    /// Branch if less
    Blt = 0xA7,
    /// Branch if not equal, unsigned/unordered
    BneUn = 0xA8,
    /// Branch if greater or equal, unsigned
    BgeUn = 0xA9,
    /// Branch if greater, unsigned
    BgtUn = 0xAA,
    /// Branch if less or equal, unsigned
    BleUn = 0xAB,
    /// Branch if less, unsigned
    BltUn = 0xAC,
    /// Jump table: pop index, branch to the indexed label or fall through
    Switch = 0xAD,

    // ===== Calls (0xB0-0xBF) =====
    /// Call a method non-virtually (operand: method)
    Call = 0xB0,
    /// Call a method through virtual dispatch (operand: method)
    Callvirt = 0xB1,
    /// Allocate an object and run a constructor (operand: method)
    Newobj = 0xB2,
    /// Return from the current method
    Ret = 0xB3,

    // ===== Object Model (0xC0-0xCF) =====
    /// Load instance field (operand: field)
    Ldfld = 0xC0,
    /// Store instance field (operand: field)
    Stfld = 0xC1,
    /// Load static field (operand: field)
    Ldsfld = 0xC2,
    /// Store static field (operand: field)
    Stsfld = 0xC3,
    /// Cast reference or trap (operand: type)
    Castclass = 0xC4,
    /// Test instance, push reference or null (operand: type)
    Isinst = 0xC5,
    /// Box a value type (operand: type)
    Box = 0xC6,
    /// Unbox to a value or cast to a reference (operand: type)
    UnboxAny = 0xC7,

    // ===== Arrays (0xD0-0xDF) =====
    /// pop length, push new array (operand: element type)
    Newarr = 0xD0,
    /// pop array, push length
    Ldlen = 0xD1,
    /// pop index, pop array, push element (operand: element type)
    Ldelem = 0xD2,
    /// pop value, pop index, pop array (operand: element type)
    Stelem = 0xD3,

    // ===== Exception Control (0xE0-0xEF) =====
    /// Throw the top value
    Throw = 0xE0,
    /// Rethrow the exception being handled
    Rethrow = 0xE1,
    /// Exit a protected region (short)
    LeaveS = 0xE2,
    /// Exit a protected region
    Leave = 0xE3,
    /// End a finally handler
    Endfinally = 0xE4,
}

/// Kind of operand an opcode takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// int32 in -128..=127
    ShortI32,
    /// int32
    I32,
    /// int64
    I64,
    /// float32
    F32,
    /// float64
    F64,
    /// String literal
    Str,
    /// Argument index in 0..=255
    ShortArg,
    /// Argument index
    Arg,
    /// Local index in 0..=255
    ShortLocal,
    /// Local index
    Local,
    /// Branch target
    Label,
    /// Jump table
    Switch,
    /// Method handle
    Method,
    /// Field handle
    Field,
    /// Type reference
    Type,
}

/// How an opcode changes the evaluation stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Fixed pop and push counts
    Fixed {
        /// Values popped
        pops: u8,
        /// Values pushed
        pushes: u8,
    },
    /// Determined by the callee signature
    Call,
    /// Pops the return value, if the method has one
    Return,
    /// Empties the stack
    Clear,
}

/// Control flow after an opcode executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// Falls through to the next instruction
    Next,
    /// Always transfers to a label
    Branch,
    /// Transfers to a label or falls through
    CondBranch,
    /// Transfers through a jump table or falls through
    Switch,
    /// Returns from the method
    Return,
    /// Raises an exception
    Throw,
    /// Exits a protected region to a label
    Leave,
    /// Ends a finally handler
    EndFinally,
}

struct OpInfo {
    name: &'static str,
    operand: OperandKind,
    stack: StackEffect,
    flow: FlowControl,
}

const fn op(
    name: &'static str,
    operand: OperandKind,
    pops: u8,
    pushes: u8,
    flow: FlowControl,
) -> OpInfo {
    OpInfo {
        name,
        operand,
        stack: StackEffect::Fixed { pops, pushes },
        flow,
    }
}

const fn special(
    name: &'static str,
    operand: OperandKind,
    stack: StackEffect,
    flow: FlowControl,
) -> OpInfo {
    OpInfo {
        name,
        operand,
        stack,
        flow,
    }
}

impl Opcode {
    /// Every opcode, in encoding order
    pub const ALL: [Opcode; 134] = [
        Opcode::Nop, Opcode::Dup, Opcode::Pop, Opcode::Ldnull, Opcode::LdcI4M1,
        Opcode::LdcI4_0, Opcode::LdcI4_1, Opcode::LdcI4_2, Opcode::LdcI4_3, Opcode::LdcI4_4,
        Opcode::LdcI4_5, Opcode::LdcI4_6, Opcode::LdcI4_7, Opcode::LdcI4_8, Opcode::LdcI4S,
        Opcode::LdcI4, Opcode::LdcI8, Opcode::LdcR4, Opcode::LdcR8, Opcode::Ldstr,
        Opcode::Ldarg0, Opcode::Ldarg1, Opcode::Ldarg2, Opcode::Ldarg3, Opcode::LdargS,
        Opcode::Ldarg, Opcode::StargS, Opcode::Starg, Opcode::Ldloc0, Opcode::Ldloc1,
        Opcode::Ldloc2, Opcode::Ldloc3, Opcode::LdlocS, Opcode::Ldloc, Opcode::Stloc0,
        Opcode::Stloc1, Opcode::Stloc2, Opcode::Stloc3, Opcode::StlocS, Opcode::Stloc,
        Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Div, Opcode::DivUn,
        Opcode::Rem, Opcode::RemUn, Opcode::And, Opcode::Or, Opcode::Xor,
        Opcode::Shl, Opcode::Shr, Opcode::ShrUn, Opcode::Neg, Opcode::Not,
        Opcode::AddOvf, Opcode::AddOvfUn, Opcode::SubOvf, Opcode::SubOvfUn, Opcode::MulOvf,
        Opcode::MulOvfUn, Opcode::Ckfinite, Opcode::Ceq, Opcode::Cgt, Opcode::CgtUn,
        Opcode::Clt, Opcode::CltUn, Opcode::ConvI1, Opcode::ConvI2, Opcode::ConvI4,
        Opcode::ConvI8, Opcode::ConvU1, Opcode::ConvU2, Opcode::ConvU4, Opcode::ConvU8,
        Opcode::ConvR4, Opcode::ConvR8, Opcode::ConvRUn, Opcode::ConvOvfI1, Opcode::ConvOvfI2,
        Opcode::ConvOvfI4, Opcode::ConvOvfI8, Opcode::ConvOvfU1, Opcode::ConvOvfU2, Opcode::ConvOvfU4,
        Opcode::ConvOvfU8, Opcode::BrS, Opcode::BrfalseS, Opcode::BrtrueS, Opcode::BeqS,
        Opcode::BgeS, Opcode::BgtS, Opcode::BleS, Opcode::BltS, Opcode::BneUnS,
        Opcode::BgeUnS, Opcode::BgtUnS, Opcode::BleUnS, Opcode::BltUnS, Opcode::Br,
        Opcode::Brfalse, Opcode::Brtrue, Opcode::Beq, Opcode::Bge, Opcode::Bgt,
        Opcode::Ble, Opcode::Blt, Opcode::BneUn, Opcode::BgeUn, Opcode::BgtUn,
        Opcode::BleUn, Opcode::BltUn, Opcode::Switch, Opcode::Call, Opcode::Callvirt,
        Opcode::Newobj, Opcode::Ret, Opcode::Ldfld, Opcode::Stfld, Opcode::Ldsfld,
        Opcode::Stsfld, Opcode::Castclass, Opcode::Isinst, Opcode::Box, Opcode::UnboxAny,
        Opcode::Newarr, Opcode::Ldlen, Opcode::Ldelem, Opcode::Stelem, Opcode::Throw,
        Opcode::Rethrow, Opcode::LeaveS, Opcode::Leave, Opcode::Endfinally,
    ];

    /// Convert a byte to an opcode
    ///
    /// Returns None if the byte doesn't correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    /// Convert opcode to its byte value
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    fn info(self) -> OpInfo {
        use FlowControl::*;
        use OperandKind as K;
        match self {
            Opcode::Nop => op("nop", K::None, 0, 0, Next),
            Opcode::Dup => op("dup", K::None, 1, 2, Next),
            Opcode::Pop => op("pop", K::None, 1, 0, Next),
            Opcode::Ldnull => op("ldnull", K::None, 0, 1, Next),
            Opcode::LdcI4M1 => op("ldc.i4.m1", K::None, 0, 1, Next),
            Opcode::LdcI4_0 => op("ldc.i4.0", K::None, 0, 1, Next),
            Opcode::LdcI4_1 => op("ldc.i4.1", K::None, 0, 1, Next),
            Opcode::LdcI4_2 => op("ldc.i4.2", K::None, 0, 1, Next),
            Opcode::LdcI4_3 => op("ldc.i4.3", K::None, 0, 1, Next),
            Opcode::LdcI4_4 => op("ldc.i4.4", K::None, 0, 1, Next),
            Opcode::LdcI4_5 => op("ldc.i4.5", K::None, 0, 1, Next),
            Opcode::LdcI4_6 => op("ldc.i4.6", K::None, 0, 1, Next),
            Opcode::LdcI4_7 => op("ldc.i4.7", K::None, 0, 1, Next),
            Opcode::LdcI4_8 => op("ldc.i4.8", K::None, 0, 1, Next),
            Opcode::LdcI4S => op("ldc.i4.s", K::ShortI32, 0, 1, Next),
            Opcode::LdcI4 => op("ldc.i4", K::I32, 0, 1, Next),
            Opcode::LdcI8 => op("ldc.i8", K::I64, 0, 1, Next),
            Opcode::LdcR4 => op("ldc.r4", K::F32, 0, 1, Next),
            Opcode::LdcR8 => op("ldc.r8", K::F64, 0, 1, Next),
            Opcode::Ldstr => op("ldstr", K::Str, 0, 1, Next),

            Opcode::Ldarg0 => op("ldarg.0", K::None, 0, 1, Next),
            Opcode::Ldarg1 => op("ldarg.1", K::None, 0, 1, Next),
            Opcode::Ldarg2 => op("ldarg.2", K::None, 0, 1, Next),
            Opcode::Ldarg3 => op("ldarg.3", K::None, 0, 1, Next),
            Opcode::LdargS => op("ldarg.s", K::ShortArg, 0, 1, Next),
            Opcode::Ldarg => op("ldarg", K::Arg, 0, 1, Next),
            Opcode::StargS => op("starg.s", K::ShortArg, 1, 0, Next),
            Opcode::Starg => op("starg", K::Arg, 1, 0, Next),
            Opcode::Ldloc0 => op("ldloc.0", K::None, 0, 1, Next),
            Opcode::Ldloc1 => op("ldloc.1", K::None, 0, 1, Next),
            Opcode::Ldloc2 => op("ldloc.2", K::None, 0, 1, Next),
            Opcode::Ldloc3 => op("ldloc.3", K::None, 0, 1, Next),
            Opcode::LdlocS => op("ldloc.s", K::ShortLocal, 0, 1, Next),
            Opcode::Ldloc => op("ldloc", K::Local, 0, 1, Next),
            Opcode::Stloc0 => op("stloc.0", K::None, 1, 0, Next),
            Opcode::Stloc1 => op("stloc.1", K::None, 1, 0, Next),
            Opcode::Stloc2 => op("stloc.2", K::None, 1, 0, Next),
            Opcode::Stloc3 => op("stloc.3", K::None, 1, 0, Next),
            Opcode::StlocS => op("stloc.s", K::ShortLocal, 1, 0, Next),
            Opcode::Stloc => op("stloc", K::Local, 1, 0, Next),

            Opcode::Add => op("add", K::None, 2, 1, Next),
            Opcode::Sub => op("sub", K::None, 2, 1, Next),
            Opcode::Mul => op("mul", K::None, 2, 1, Next),
            Opcode::Div => op("div", K::None, 2, 1, Next),
            Opcode::DivUn => op("div.un", K::None, 2, 1, Next),
            Opcode::Rem => op("rem", K::None, 2, 1, Next),
            Opcode::RemUn => op("rem.un", K::None, 2, 1, Next),
            Opcode::And => op("and", K::None, 2, 1, Next),
            Opcode::Or => op("or", K::None, 2, 1, Next),
            Opcode::Xor => op("xor", K::None, 2, 1, Next),
            Opcode::Shl => op("shl", K::None, 2, 1, Next),
            Opcode::Shr => op("shr", K::None, 2, 1, Next),
            Opcode::ShrUn => op("shr.un", K::None, 2, 1, Next),
            Opcode::Neg => op("neg", K::None, 1, 1, Next),
            Opcode::Not => op("not", K::None, 1, 1, Next),
            Opcode::AddOvf => op("add.ovf", K::None, 2, 1, Next),
            Opcode::AddOvfUn => op("add.ovf.un", K::None, 2, 1, Next),
            Opcode::SubOvf => op("sub.ovf", K::None, 2, 1, Next),
            Opcode::SubOvfUn => op("sub.ovf.un", K::None, 2, 1, Next),
            Opcode::MulOvf => op("mul.ovf", K::None, 2, 1, Next),
            Opcode::MulOvfUn => op("mul.ovf.un", K::None, 2, 1, Next),
            Opcode::Ckfinite => op("ckfinite", K::None, 1, 1, Next),

            Opcode::Ceq => op("ceq", K::None, 2, 1, Next),
            Opcode::Cgt => op("cgt", K::None, 2, 1, Next),
            Opcode::CgtUn => op("cgt.un", K::None, 2, 1, Next),
            Opcode::Clt => op("clt", K::None, 2, 1, Next),
            Opcode::CltUn => op("clt.un", K::None, 2, 1, Next),

            Opcode::ConvI1 => op("conv.i1", K::None, 1, 1, Next),
            Opcode::ConvI2 => op("conv.i2", K::None, 1, 1, Next),
            Opcode::ConvI4 => op("conv.i4", K::None, 1, 1, Next),
            Opcode::ConvI8 => op("conv.i8", K::None, 1, 1, Next),
            Opcode::ConvU1 => op("conv.u1", K::None, 1, 1, Next),
            Opcode::ConvU2 => op("conv.u2", K::None, 1, 1, Next),
            Opcode::ConvU4 => op("conv.u4", K::None, 1, 1, Next),
            Opcode::ConvU8 => op("conv.u8", K::None, 1, 1, Next),
            Opcode::ConvR4 => op("conv.r4", K::None, 1, 1, Next),
            Opcode::ConvR8 => op("conv.r8", K::None, 1, 1, Next),
            Opcode::ConvRUn => op("conv.r.un", K::None, 1, 1, Next),
            Opcode::ConvOvfI1 => op("conv.ovf.i1", K::None, 1, 1, Next),
            Opcode::ConvOvfI2 => op("conv.ovf.i2", K::None, 1, 1, Next),
            Opcode::ConvOvfI4 => op("conv.ovf.i4", K::None, 1, 1, Next),
            Opcode::ConvOvfI8 => op("conv.ovf.i8", K::None, 1, 1, Next),
            Opcode::ConvOvfU1 => op("conv.ovf.u1", K::None, 1, 1, Next),
            Opcode::ConvOvfU2 => op("conv.ovf.u2", K::None, 1, 1, Next),
            Opcode::ConvOvfU4 => op("conv.ovf.u4", K::None, 1, 1, Next),
            Opcode::ConvOvfU8 => op("conv.ovf.u8", K::None, 1, 1, Next),

            Opcode::BrS => op("br.s", K::Label, 0, 0, Branch),
            Opcode::BrfalseS => op("brfalse.s", K::Label, 1, 0, CondBranch),
            Opcode::BrtrueS => op("brtrue.s", K::Label, 1, 0, CondBranch),
            Opcode::BeqS => op("beq.s", K::Label, 2, 0, CondBranch),
            Opcode::BgeS => op("bge.s", K::Label, 2, 0, CondBranch),
            Opcode::BgtS => op("bgt.s", K::Label, 2, 0, CondBranch),
            Opcode::BleS => op("ble.s", K::Label, 2, 0, CondBranch),
            Opcode::BltS => op("blt.s", K::Label, 2, 0, CondBranch),
            Opcode::BneUnS => op("bne.un.s", K::Label, 2, 0, CondBranch),
            Opcode::BgeUnS => op("bge.un.s", K::Label, 2, 0, CondBranch),
            Opcode::BgtUnS => op("bgt.un.s", K::Label, 2, 0, CondBranch),
            Opcode::BleUnS => op("ble.un.s", K::Label, 2, 0, CondBranch),
            Opcode::BltUnS => op("blt.un.s", K::Label, 2, 0, CondBranch),
            Opcode::Br => op("br", K::Label, 0, 0, Branch),
            Opcode::Brfalse => op("brfalse", K::Label, 1, 0, CondBranch),
            Opcode::Brtrue => op("brtrue", K::Label, 1, 0, CondBranch),
            Opcode::Beq => op("beq", K::Label, 2, 0, CondBranch),
            Opcode::Bge => op("bge", K::Label, 2, 0, CondBranch),
            Opcode::Bgt => op("bgt", K::Label, 2, 0, CondBranch),
            Opcode::Ble => op("ble", K::Label, 2, 0, CondBranch),
            Opcode::Blt => op("blt", K::Label, 2, 0, CondBranch),
            Opcode::BneUn => op("bne.un", K::Label, 2, 0, CondBranch),
            Opcode::BgeUn => op("bge.un", K::Label, 2, 0, CondBranch),
            Opcode::BgtUn => op("bgt.un", K::Label, 2, 0, CondBranch),
            Opcode::BleUn => op("ble.un", K::Label, 2, 0, CondBranch),
            Opcode::BltUn => op("blt.un", K::Label, 2, 0, CondBranch),
            Opcode::Switch => op("switch", K::Switch, 1, 0, Switch),

            Opcode::Call => special("call", K::Method, StackEffect::Call, Next),
            Opcode::Callvirt => special("callvirt", K::Method, StackEffect::Call, Next),
            Opcode::Newobj => special("newobj", K::Method, StackEffect::Call, Next),
            Opcode::Ret => special("ret", K::None, StackEffect::Return, Return),

            Opcode::Ldfld => op("ldfld", K::Field, 1, 1, Next),
            Opcode::Stfld => op("stfld", K::Field, 2, 0, Next),
            Opcode::Ldsfld => op("ldsfld", K::Field, 0, 1, Next),
            Opcode::Stsfld => op("stsfld", K::Field, 1, 0, Next),
            Opcode::Castclass => op("castclass", K::Type, 1, 1, Next),
            Opcode::Isinst => op("isinst", K::Type, 1, 1, Next),
            Opcode::Box => op("box", K::Type, 1, 1, Next),
            Opcode::UnboxAny => op("unbox.any", K::Type, 1, 1, Next),

            Opcode::Newarr => op("newarr", K::Type, 1, 1, Next),
            Opcode::Ldlen => op("ldlen", K::None, 1, 1, Next),
            Opcode::Ldelem => op("ldelem", K::Type, 2, 1, Next),
            Opcode::Stelem => op("stelem", K::Type, 3, 0, Next),

            Opcode::Throw => op("throw", K::None, 1, 0, Throw),
            Opcode::Rethrow => op("rethrow", K::None, 0, 0, Throw),
            Opcode::LeaveS => special("leave.s", K::Label, StackEffect::Clear, Leave),
            Opcode::Leave => special("leave", K::Label, StackEffect::Clear, Leave),
            Opcode::Endfinally => special("endfinally", K::None, StackEffect::Clear, EndFinally),
        }
    }

    /// Get the instruction mnemonic
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Get the operand kind this opcode expects
    pub fn operand_kind(self) -> OperandKind {
        self.info().operand
    }

    /// Get the stack effect
    pub fn stack_effect(self) -> StackEffect {
        self.info().stack
    }

    /// Get the control flow behaviour
    pub fn flow(self) -> FlowControl {
        self.info().flow
    }

    /// Check if this opcode references a label
    pub fn is_branch(self) -> bool {
        matches!(
            self.flow(),
            FlowControl::Branch | FlowControl::CondBranch | FlowControl::Leave
        )
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(
            self.flow(),
            FlowControl::Branch
                | FlowControl::Return
                | FlowControl::Throw
                | FlowControl::Leave
                | FlowControl::EndFinally
        )
    }

    /// Check if this opcode is a call
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::Callvirt | Opcode::Newobj)
    }

    /// Get the short branch form of a long branch
    pub fn short_form(self) -> Option<Opcode> {
        let byte = self as u8;
        if (0xA0..=0xAC).contains(&byte) {
            Opcode::from_u8(byte - 0x10)
        } else if self == Opcode::Leave {
            Some(Opcode::LeaveS)
        } else {
            None
        }
    }

    /// Get the long branch form of a short branch
    pub fn long_form(self) -> Option<Opcode> {
        let byte = self as u8;
        if (0x90..=0x9C).contains(&byte) {
            Opcode::from_u8(byte + 0x10)
        } else if self == Opcode::LeaveS {
            Some(Opcode::Leave)
        } else {
            None
        }
    }

    /// Get the opcode for `ldarg.N` / `ldloc.N` / `stloc.N` / `ldc.i4.N` shortcuts
    pub(crate) fn indexed(base: Opcode, n: u8) -> Opcode {
        Opcode::from_u8(base as u8 + n).unwrap_or(base)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip_all() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(op.to_u8()), Some(op), "{}", op.name());
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x1F), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::LdcI4M1.name(), "ldc.i4.m1");
        assert_eq!(Opcode::BneUnS.name(), "bne.un.s");
        assert_eq!(Opcode::UnboxAny.name(), "unbox.any");
        assert_eq!(Opcode::ConvOvfU8.name(), "conv.ovf.u8");
    }

    #[test]
    fn test_branch_forms() {
        assert_eq!(Opcode::Br.short_form(), Some(Opcode::BrS));
        assert_eq!(Opcode::BltUn.short_form(), Some(Opcode::BltUnS));
        assert_eq!(Opcode::BgeS.long_form(), Some(Opcode::Bge));
        assert_eq!(Opcode::Leave.short_form(), Some(Opcode::LeaveS));
        assert_eq!(Opcode::Switch.short_form(), None);
        assert_eq!(Opcode::Add.long_form(), None);
        for op in Opcode::ALL {
            if let Some(short) = op.short_form() {
                assert_eq!(short.long_form(), Some(op));
                assert_eq!(short.operand_kind(), op.operand_kind());
            }
        }
    }

    #[test]
    fn test_indexed_shortcuts() {
        assert_eq!(Opcode::indexed(Opcode::Ldarg0, 3), Opcode::Ldarg3);
        assert_eq!(Opcode::indexed(Opcode::Stloc0, 2), Opcode::Stloc2);
        assert_eq!(Opcode::indexed(Opcode::LdcI4_0, 8), Opcode::LdcI4_8);
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Ret.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(Opcode::BrS.is_terminator());
        assert!(Opcode::Leave.is_terminator());
        assert!(!Opcode::Brtrue.is_terminator());
        assert!(!Opcode::Call.is_terminator());
        assert!(Opcode::Brtrue.is_branch());
        assert!(!Opcode::Switch.is_branch());
    }
}
