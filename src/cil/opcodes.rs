//! CIL opcode constants (ECMA-335 Partition III).
//!
//! Every opcode is a `u16`: single-byte opcodes carry their byte value (e.g. [`CALL`] =
//! `0x28`), two-byte opcodes of the `0xFE` space carry `0xFE00 | second` (e.g. [`CEQ`] =
//! `0xFE01`). Prefix instructions are not opcodes in this numbering; the decoder consumes
//! them before the opcode proper, so only their second byte is listed.
#![allow(missing_docs)]

/// Lead byte of the standard two-byte opcode space.
pub const EXTENDED_PREFIX: u8 = 0xFE;
/// Lead byte of the implementation-specific opcode space.
pub const VENDOR_PREFIX: u8 = 0xFD;

/// `unaligned.` prefix (second byte after `0xFE`), followed by an alignment byte.
pub const PREFIX_UNALIGNED: u8 = 0x12;
/// `volatile.` prefix.
pub const PREFIX_VOLATILE: u8 = 0x13;
/// `tail.` prefix.
pub const PREFIX_TAIL: u8 = 0x14;
/// `constrained.` prefix, followed by a type token.
pub const PREFIX_CONSTRAINED: u8 = 0x16;
/// `no.` prefix, followed by a check-suppression flag byte.
pub const PREFIX_NO: u8 = 0x19;
/// `readonly.` prefix.
pub const PREFIX_READONLY: u8 = 0x1E;

// ── Single-byte opcodes ──────────────────────────────────────────────────

pub const NOP: u16 = 0x00;
pub const BREAK: u16 = 0x01;
pub const LDARG_0: u16 = 0x02;
pub const LDARG_1: u16 = 0x03;
pub const LDARG_2: u16 = 0x04;
pub const LDARG_3: u16 = 0x05;
pub const LDLOC_0: u16 = 0x06;
pub const LDLOC_1: u16 = 0x07;
pub const LDLOC_2: u16 = 0x08;
pub const LDLOC_3: u16 = 0x09;
pub const STLOC_0: u16 = 0x0A;
pub const STLOC_1: u16 = 0x0B;
pub const STLOC_2: u16 = 0x0C;
pub const STLOC_3: u16 = 0x0D;
pub const LDARG_S: u16 = 0x0E;
pub const LDARGA_S: u16 = 0x0F;
pub const STARG_S: u16 = 0x10;
pub const LDLOC_S: u16 = 0x11;
pub const LDLOCA_S: u16 = 0x12;
pub const STLOC_S: u16 = 0x13;

// Constants
pub const LDNULL: u16 = 0x14;
pub const LDC_I4_M1: u16 = 0x15;
pub const LDC_I4_0: u16 = 0x16;
pub const LDC_I4_1: u16 = 0x17;
pub const LDC_I4_2: u16 = 0x18;
pub const LDC_I4_3: u16 = 0x19;
pub const LDC_I4_4: u16 = 0x1A;
pub const LDC_I4_5: u16 = 0x1B;
pub const LDC_I4_6: u16 = 0x1C;
pub const LDC_I4_7: u16 = 0x1D;
pub const LDC_I4_8: u16 = 0x1E;
pub const LDC_I4_S: u16 = 0x1F;
pub const LDC_I4: u16 = 0x20;
pub const LDC_I8: u16 = 0x21;
pub const LDC_R4: u16 = 0x22;
pub const LDC_R8: u16 = 0x23;

// Stack manipulation and calls
pub const DUP: u16 = 0x25;
pub const POP: u16 = 0x26;
pub const JMP: u16 = 0x27;
pub const CALL: u16 = 0x28;
pub const CALLI: u16 = 0x29;
pub const RET: u16 = 0x2A;

// Branches: short form at 0x2B.., long form at 0x38..
pub const BR_S: u16 = 0x2B;
pub const BR: u16 = 0x38;
pub const BRFALSE_S: u16 = 0x2C;
pub const BRFALSE: u16 = 0x39;
pub const BRTRUE_S: u16 = 0x2D;
pub const BRTRUE: u16 = 0x3A;
pub const BEQ_S: u16 = 0x2E;
pub const BEQ: u16 = 0x3B;
pub const BGE_S: u16 = 0x2F;
pub const BGE: u16 = 0x3C;
pub const BGT_S: u16 = 0x30;
pub const BGT: u16 = 0x3D;
pub const BLE_S: u16 = 0x31;
pub const BLE: u16 = 0x3E;
pub const BLT_S: u16 = 0x32;
pub const BLT: u16 = 0x3F;
pub const BNE_UN_S: u16 = 0x33;
pub const BNE_UN: u16 = 0x40;
pub const BGE_UN_S: u16 = 0x34;
pub const BGE_UN: u16 = 0x41;
pub const BGT_UN_S: u16 = 0x35;
pub const BGT_UN: u16 = 0x42;
pub const BLE_UN_S: u16 = 0x36;
pub const BLE_UN: u16 = 0x43;
pub const BLT_UN_S: u16 = 0x37;
pub const BLT_UN: u16 = 0x44;
pub const SWITCH: u16 = 0x45;

// Indirect loads and stores
pub const LDIND_I1: u16 = 0x46;
pub const LDIND_U1: u16 = 0x47;
pub const LDIND_I2: u16 = 0x48;
pub const LDIND_U2: u16 = 0x49;
pub const LDIND_I4: u16 = 0x4A;
pub const LDIND_U4: u16 = 0x4B;
pub const LDIND_I8: u16 = 0x4C;
pub const LDIND_I: u16 = 0x4D;
pub const LDIND_R4: u16 = 0x4E;
pub const LDIND_R8: u16 = 0x4F;
pub const LDIND_REF: u16 = 0x50;
pub const STIND_REF: u16 = 0x51;
pub const STIND_I1: u16 = 0x52;
pub const STIND_I2: u16 = 0x53;
pub const STIND_I4: u16 = 0x54;
pub const STIND_I8: u16 = 0x55;
pub const STIND_R4: u16 = 0x56;
pub const STIND_R8: u16 = 0x57;

// Arithmetic and bitwise
pub const ADD: u16 = 0x58;
pub const SUB: u16 = 0x59;
pub const MUL: u16 = 0x5A;
pub const DIV: u16 = 0x5B;
pub const DIV_UN: u16 = 0x5C;
pub const REM: u16 = 0x5D;
pub const REM_UN: u16 = 0x5E;
pub const AND: u16 = 0x5F;
pub const OR: u16 = 0x60;
pub const XOR: u16 = 0x61;
pub const SHL: u16 = 0x62;
pub const SHR: u16 = 0x63;
pub const SHR_UN: u16 = 0x64;
pub const NEG: u16 = 0x65;
pub const NOT: u16 = 0x66;

// Conversions
pub const CONV_I1: u16 = 0x67;
pub const CONV_I2: u16 = 0x68;
pub const CONV_I4: u16 = 0x69;
pub const CONV_I8: u16 = 0x6A;
pub const CONV_R4: u16 = 0x6B;
pub const CONV_R8: u16 = 0x6C;
pub const CONV_U4: u16 = 0x6D;
pub const CONV_U8: u16 = 0x6E;

// Object model
pub const CALLVIRT: u16 = 0x6F;
pub const CPOBJ: u16 = 0x70;
pub const LDOBJ: u16 = 0x71;
pub const LDSTR: u16 = 0x72;
pub const NEWOBJ: u16 = 0x73;
pub const CASTCLASS: u16 = 0x74;
pub const ISINST: u16 = 0x75;
pub const CONV_R_UN: u16 = 0x76;
pub const UNBOX: u16 = 0x79;
pub const THROW: u16 = 0x7A;
pub const LDFLD: u16 = 0x7B;
pub const LDFLDA: u16 = 0x7C;
pub const STFLD: u16 = 0x7D;
pub const LDSFLD: u16 = 0x7E;
pub const LDSFLDA: u16 = 0x7F;
pub const STSFLD: u16 = 0x80;
pub const STOBJ: u16 = 0x81;
pub const CONV_OVF_I1_UN: u16 = 0x82;
pub const CONV_OVF_I2_UN: u16 = 0x83;
pub const CONV_OVF_I4_UN: u16 = 0x84;
pub const CONV_OVF_I8_UN: u16 = 0x85;
pub const CONV_OVF_U1_UN: u16 = 0x86;
pub const CONV_OVF_U2_UN: u16 = 0x87;
pub const CONV_OVF_U4_UN: u16 = 0x88;
pub const CONV_OVF_U8_UN: u16 = 0x89;
pub const CONV_OVF_I_UN: u16 = 0x8A;
pub const CONV_OVF_U_UN: u16 = 0x8B;
pub const BOX: u16 = 0x8C;
pub const NEWARR: u16 = 0x8D;
pub const LDLEN: u16 = 0x8E;
pub const LDELEMA: u16 = 0x8F;
pub const LDELEM_I1: u16 = 0x90;
pub const LDELEM_U1: u16 = 0x91;
pub const LDELEM_I2: u16 = 0x92;
pub const LDELEM_U2: u16 = 0x93;
pub const LDELEM_I4: u16 = 0x94;
pub const LDELEM_U4: u16 = 0x95;
pub const LDELEM_I8: u16 = 0x96;
pub const LDELEM_I: u16 = 0x97;
pub const LDELEM_R4: u16 = 0x98;
pub const LDELEM_R8: u16 = 0x99;
pub const LDELEM_REF: u16 = 0x9A;
pub const STELEM_I: u16 = 0x9B;
pub const STELEM_I1: u16 = 0x9C;
pub const STELEM_I2: u16 = 0x9D;
pub const STELEM_I4: u16 = 0x9E;
pub const STELEM_I8: u16 = 0x9F;
pub const STELEM_R4: u16 = 0xA0;
pub const STELEM_R8: u16 = 0xA1;
pub const STELEM_REF: u16 = 0xA2;
pub const LDELEM: u16 = 0xA3;
pub const STELEM: u16 = 0xA4;
pub const UNBOX_ANY: u16 = 0xA5;
pub const CONV_OVF_I1: u16 = 0xB3;
pub const CONV_OVF_U1: u16 = 0xB4;
pub const CONV_OVF_I2: u16 = 0xB5;
pub const CONV_OVF_U2: u16 = 0xB6;
pub const CONV_OVF_I4: u16 = 0xB7;
pub const CONV_OVF_U4: u16 = 0xB8;
pub const CONV_OVF_I8: u16 = 0xB9;
pub const CONV_OVF_U8: u16 = 0xBA;
pub const REFANYVAL: u16 = 0xC2;
pub const CKFINITE: u16 = 0xC3;
pub const MKREFANY: u16 = 0xC6;
pub const LDTOKEN: u16 = 0xD0;
pub const CONV_U2: u16 = 0xD1;
pub const CONV_U1: u16 = 0xD2;
pub const CONV_I: u16 = 0xD3;
pub const CONV_OVF_I: u16 = 0xD4;
pub const CONV_OVF_U: u16 = 0xD5;
pub const ADD_OVF: u16 = 0xD6;
pub const ADD_OVF_UN: u16 = 0xD7;
pub const MUL_OVF: u16 = 0xD8;
pub const MUL_OVF_UN: u16 = 0xD9;
pub const SUB_OVF: u16 = 0xDA;
pub const SUB_OVF_UN: u16 = 0xDB;
pub const ENDFINALLY: u16 = 0xDC;
pub const LEAVE: u16 = 0xDD;
pub const LEAVE_S: u16 = 0xDE;
pub const STIND_I: u16 = 0xDF;
pub const CONV_U: u16 = 0xE0;

// ── Two-byte opcodes (0xFE space) ────────────────────────────────────────

pub const ARGLIST: u16 = 0xFE00;
pub const CEQ: u16 = 0xFE01;
pub const CGT: u16 = 0xFE02;
pub const CGT_UN: u16 = 0xFE03;
pub const CLT: u16 = 0xFE04;
pub const CLT_UN: u16 = 0xFE05;
pub const LDFTN: u16 = 0xFE06;
pub const LDVIRTFTN: u16 = 0xFE07;
pub const LDARG: u16 = 0xFE09;
pub const LDARGA: u16 = 0xFE0A;
pub const STARG: u16 = 0xFE0B;
pub const LDLOC: u16 = 0xFE0C;
pub const LDLOCA: u16 = 0xFE0D;
pub const STLOC: u16 = 0xFE0E;
pub const LOCALLOC: u16 = 0xFE0F;
pub const ENDFILTER: u16 = 0xFE11;
pub const INITOBJ: u16 = 0xFE15;
pub const CPBLK: u16 = 0xFE17;
pub const INITBLK: u16 = 0xFE18;
pub const RETHROW: u16 = 0xFE1A;
pub const SIZEOF: u16 = 0xFE1C;
pub const REFANYTYPE: u16 = 0xFE1D;
