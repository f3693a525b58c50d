pub const LF: u8 = 10;
pub const CR: u8 = 13;
pub const SGA: u8 = 3;
pub const TELOPT_EOR: u8 = 25;
pub const NAWS: u8 = 31;
pub const LINEMODE: u8 = 34;
pub const EOR: u8 = 239;
pub const SE: u8 = 240;
pub const NOP: u8 = 241;
pub const GA: u8 = 249;
pub const SB: u8 = 250;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;
pub const IAC: u8 = 255;

// TTYPE sub-negotiation commands.
pub const TTYPE_IS: u8 = 0;
pub const TTYPE_SEND: u8 = 1;

// MSSP sub-negotiation separators.
pub const MSSP_VAR: u8 = 1;
pub const MSSP_VAL: u8 = 2;

// MUD specific options.

// MNES: Mud New-Environ standard
pub const MNES: u8 = 39;

// Mud Server Status Protocol
pub const MSSP: u8 = 70;

// GMCP - Generic Mud Communication Protocol
pub const GMCP: u8 = 201;

// MSDP - Mud Server Data Protocol
pub const MSDP: u8 = 69;

// MTTS - Terminal Type
pub const MTTS: u8 = 24;
