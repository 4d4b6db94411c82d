//! JVM opcode and access-flag constants used by the weaving engine.

pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const DUP: u8 = 0x59;
pub const GOTO: u8 = 0xa7;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const NEW: u8 = 0xbb;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const IFNONNULL: u8 = 0xc7;

pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SYNTHETIC: u16 = 0x1000;

/// Whether an opcode loads a local variable.
pub fn is_local_load(opcode: u8) -> bool {
    matches!(opcode, ILOAD | LLOAD | FLOAD | DLOAD | ALOAD)
}

/// Whether an opcode stores a local variable.
pub fn is_local_store(opcode: u8) -> bool {
    matches!(opcode, ISTORE | LSTORE | FSTORE | DSTORE | ASTORE)
}

/// Slots touched by a local-variable instruction.
pub fn local_width(opcode: u8) -> u16 {
    match opcode {
        LLOAD | DLOAD | LSTORE | DSTORE => 2,
        _ => 1,
    }
}
