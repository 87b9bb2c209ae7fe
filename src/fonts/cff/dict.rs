//! CFF DICT parsing and serialization.

use crate::error::{Error, Result};

/// Two-byte operators are stored as `0x0C00 | second byte`.
pub mod op {
    pub const CHARSET: u16 = 15;
    pub const ENCODING: u16 = 16;
    pub const CHAR_STRINGS: u16 = 17;
    pub const PRIVATE: u16 = 18;
    pub const SUBRS: u16 = 19;
    pub const DEFAULT_WIDTH_X: u16 = 20;
    pub const NOMINAL_WIDTH_X: u16 = 21;
    pub const ROS: u16 = 0x0C1E;
    pub const CID_COUNT: u16 = 0x0C22;
    pub const FD_ARRAY: u16 = 0x0C24;
    pub const FD_SELECT: u16 = 0x0C25;
}

/// A DICT operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Integer(i32),
    Real(f64),
}

impl Operand {
    pub fn as_f64(self) -> f64 {
        match self {
            Operand::Integer(i) => i as f64,
            Operand::Real(r) => r,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Operand::Integer(i) => i,
            Operand::Real(r) => r as i32,
        }
    }
}

/// An ordered operator/operands list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(u16, Vec<Operand>)>,
}

impl Dict {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut operands = Vec::new();
        let mut pos = 0usize;
        let at = |pos: usize| data.get(pos).copied().ok_or(Error::UnexpectedEof);

        while pos < data.len() {
            let b0 = data[pos];
            pos += 1;
            match b0 {
                0..=11 | 13..=21 => {
                    entries.push((b0 as u16, std::mem::take(&mut operands)));
                },
                12 => {
                    let b1 = at(pos)?;
                    pos += 1;
                    entries.push((0x0C00 | b1 as u16, std::mem::take(&mut operands)));
                },
                28 => {
                    let v = i16::from_be_bytes([at(pos)?, at(pos + 1)?]);
                    pos += 2;
                    operands.push(Operand::Integer(v as i32));
                },
                29 => {
                    let v = i32::from_be_bytes([at(pos)?, at(pos + 1)?, at(pos + 2)?, at(pos + 3)?]);
                    pos += 4;
                    operands.push(Operand::Integer(v));
                },
                30 => {
                    let (value, used) = parse_real(&data[pos..])?;
                    pos += used;
                    operands.push(Operand::Real(value));
                },
                32..=246 => operands.push(Operand::Integer(b0 as i32 - 139)),
                247..=250 => {
                    let b1 = at(pos)? as i32;
                    pos += 1;
                    operands.push(Operand::Integer((b0 as i32 - 247) * 256 + b1 + 108));
                },
                251..=254 => {
                    let b1 = at(pos)? as i32;
                    pos += 1;
                    operands.push(Operand::Integer(-(b0 as i32 - 251) * 256 - b1 - 108));
                },
                _ => {
                    return Err(Error::InvalidFontFile(format!("invalid CFF DICT byte {}", b0)));
                },
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, operator: u16) -> Option<&[Operand]> {
        self.entries
            .iter()
            .find(|(op, _)| *op == operator)
            .map(|(_, operands)| operands.as_slice())
    }

    pub fn get_int(&self, operator: u16) -> Option<i32> {
        self.get(operator).and_then(|o| o.first()).map(|o| o.as_i32())
    }

    pub fn get_f64(&self, operator: u16) -> Option<f64> {
        self.get(operator).and_then(|o| o.first()).map(|o| o.as_f64())
    }

    /// Two-operand entries such as `Private` (size, offset).
    pub fn get_pair(&self, operator: u16) -> Option<(usize, usize)> {
        match self.get(operator)? {
            [a, b] if a.as_i32() >= 0 && b.as_i32() >= 0 => {
                Some((a.as_i32() as usize, b.as_i32() as usize))
            },
            _ => None,
        }
    }

    pub fn contains(&self, operator: u16) -> bool {
        self.get(operator).is_some()
    }

    pub fn remove(&mut self, operator: u16) {
        self.entries.retain(|(op, _)| *op != operator);
    }

    pub fn set(&mut self, operator: u16, operands: Vec<Operand>) {
        match self.entries.iter_mut().find(|(op, _)| *op == operator) {
            Some(entry) => entry.1 = operands,
            None => self.entries.push((operator, operands)),
        }
    }

    /// Serialize. Operators listed in `offset_ops` get their integer
    /// operands in the fixed 5-byte form so offsets can be patched without
    /// changing the DICT size.
    pub fn write(&self, offset_ops: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        // ROS must come first in a CID-keyed Top DICT.
        let ordered = self
            .entries
            .iter()
            .filter(|(op, _)| *op == op::ROS)
            .chain(self.entries.iter().filter(|(op, _)| *op != op::ROS));
        for (operator, operands) in ordered {
            let fixed = offset_ops.contains(operator);
            for operand in operands {
                match *operand {
                    Operand::Integer(v) if fixed => write_fixed_int(&mut out, v),
                    Operand::Integer(v) => write_int(&mut out, v),
                    Operand::Real(r) => write_real(&mut out, r),
                }
            }
            if *operator >= 0x0C00 {
                out.push(12);
                out.push((*operator & 0xFF) as u8);
            } else {
                out.push(*operator as u8);
            }
        }
        out
    }
}

fn parse_real(data: &[u8]) -> Result<(f64, usize)> {
    let mut text = String::new();
    for (i, &byte) in data.iter().enumerate() {
        for nibble in [byte >> 4, byte & 0x0F] {
            match nibble {
                0..=9 => text.push((b'0' + nibble) as char),
                0xA => text.push('.'),
                0xB => text.push('E'),
                0xC => text.push_str("E-"),
                0xE => text.push('-'),
                0xF => {
                    let value = text.parse::<f64>().unwrap_or(0.0);
                    return Ok((value, i + 1));
                },
                _ => {},
            }
        }
    }
    Err(Error::UnexpectedEof)
}

fn write_int(out: &mut Vec<u8>, v: i32) {
    match v {
        -107..=107 => out.push((v + 139) as u8),
        108..=1131 => {
            let v = v - 108;
            out.push((v / 256 + 247) as u8);
            out.push((v % 256) as u8);
        },
        -1131..=-108 => {
            let v = -v - 108;
            out.push((v / 256 + 251) as u8);
            out.push((v % 256) as u8);
        },
        -32768..=32767 => {
            out.push(28);
            out.extend_from_slice(&(v as i16).to_be_bytes());
        },
        _ => write_fixed_int(out, v),
    }
}

fn write_fixed_int(out: &mut Vec<u8>, v: i32) {
    out.push(29);
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_real(out: &mut Vec<u8>, r: f64) {
    let text = format!("{}", r);
    let mut nibbles: Vec<u8> = Vec::new();
    for ch in text.chars() {
        match ch {
            '0'..='9' => nibbles.push(ch as u8 - b'0'),
            '.' => nibbles.push(0xA),
            '-' => nibbles.push(0xE),
            _ => {},
        }
    }
    nibbles.push(0xF);
    if nibbles.len() % 2 == 1 {
        nibbles.push(0xF);
    }
    out.push(30);
    for pair in nibbles.chunks(2) {
        out.push(pair[0] << 4 | pair[1]);
    }
}
