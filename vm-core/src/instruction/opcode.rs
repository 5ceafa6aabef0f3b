use num_enum::TryFromPrimitive;

/// Instruction opcodes of the fixed-width 64-bit ISA.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[allow(non_camel_case_types)]
pub enum Opcode {
    // Data movement
    MOV = 0x01,
    LOAD = 0x02,
    STORE = 0x03,
    PUSH = 0x04,
    POP = 0x05,
    HLT = 0x06,

    // Arithmetic
    ADD = 0x10,
    SUB = 0x11,
    MUL = 0x12,
    DIV = 0x13,
    MOD = 0x14,
    INC = 0x15,
    DEC = 0x16,
    CMP = 0x17,
    SWAP = 0x18,

    // Logical
    AND = 0x20,
    OR = 0x21,
    XOR = 0x22,
    NOT = 0x23,
    SHL = 0x24,
    SHR = 0x25,

    // Control flow
    JMP = 0x30,
    JZ = 0x31,
    JNZ = 0x32,
    JEQ = 0x33,
    JNE = 0x34,
    JC = 0x35,
    JNC = 0x36,
    CALL = 0x37,
    RET = 0x38,
    NOP = 0x39,
    JL = 0x3A,
    JLE = 0x3B,
    JG = 0x3C,
    JGE = 0x3D,
    LOOP = 0x3E,

    // System
    PRINT = 0x44,
    IN = 0x45,
    OUT = 0x46,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::try_from_primitive(value).ok()
    }
}
