//! Type1/Type2 charstring interpreter.
//!
//! The interpreter does not build outlines. It executes a glyph program just
//! far enough to learn the advance width, whether the glyph is a `seac`
//! composite, and which local and global subroutines the glyph reaches.
//! The subroutine sets drive subsetting.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Operand stack capacity. Type2 allows 48 arguments; Type1 fonts stay
/// well below that.
const MAX_STACK: usize = 48;
const TRANSIENT_SIZE: usize = 32;

/// Charstring dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharstringKind {
    /// Type1 charstrings (already decrypted, lenIV bytes removed)
    Type1,
    /// Type2 charstrings as found in CFF
    Type2,
}

/// Components of an accented (`seac`) glyph, as StandardEncoding codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeacComponents {
    /// Base character code
    pub base: u8,
    /// Accent character code
    pub accent: u8,
}

/// What a glyph program revealed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphInfo {
    /// Advance width in font units, if the program stated one.
    pub width: Option<f64>,
    /// Composite glyph components.
    pub composite: Option<SeacComponents>,
    /// Local subroutine indices reached (unbiased).
    pub local_subrs: BTreeSet<usize>,
    /// Global subroutine indices reached (unbiased).
    pub global_subrs: BTreeSet<usize>,
}

/// Everything the interpreter needs besides the glyph program itself.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub kind: CharstringKind,
    pub local_subrs: &'a [&'a [u8]],
    pub global_subrs: &'a [&'a [u8]],
    /// Type2 `defaultWidthX`
    pub default_width: f64,
    /// Type2 `nominalWidthX`
    pub nominal_width: f64,
    pub max_depth: usize,
}

impl<'a> DecodeContext<'a> {
    /// Context for Type1 charstrings with the given subroutines.
    pub fn type1(subrs: &'a [&'a [u8]]) -> Self {
        Self {
            kind: CharstringKind::Type1,
            local_subrs: subrs,
            global_subrs: &[],
            default_width: 0.0,
            nominal_width: 0.0,
            max_depth: 10,
        }
    }

    /// Context for Type2 charstrings.
    pub fn type2(local_subrs: &'a [&'a [u8]], global_subrs: &'a [&'a [u8]]) -> Self {
        Self {
            kind: CharstringKind::Type2,
            local_subrs,
            global_subrs,
            default_width: 0.0,
            nominal_width: 0.0,
            max_depth: 10,
        }
    }

    pub fn with_widths(mut self, default_width: f64, nominal_width: f64) -> Self {
        self.default_width = default_width;
        self.nominal_width = nominal_width;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Subroutine bias for a Type2 subroutine INDEX of `count` entries.
pub fn subroutine_bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

/// Decode one glyph program.
pub fn decode(code: &[u8], ctx: &DecodeContext<'_>) -> Result<GlyphInfo> {
    let mut decoder = CharstringDecoder::new(*ctx);
    decoder.execute(code, 0)?;
    Ok(decoder.info)
}

enum Flow {
    Return,
    EndChar,
}

struct CharstringDecoder<'a> {
    ctx: DecodeContext<'a>,
    stack: Vec<f64>,
    num_hints: usize,
    last_op: &'static str,
    width_seen: bool,
    ps_stack: Vec<f64>,
    transient: [f64; TRANSIENT_SIZE],
    seed: u32,
    info: GlyphInfo,
}

impl<'a> CharstringDecoder<'a> {
    fn new(ctx: DecodeContext<'a>) -> Self {
        Self {
            ctx,
            stack: Vec::with_capacity(MAX_STACK),
            num_hints: 0,
            last_op: "",
            width_seen: false,
            ps_stack: Vec::new(),
            transient: [0.0; TRANSIENT_SIZE],
            seed: 0x2545_F491,
            info: GlyphInfo::default(),
        }
    }

    fn invalid(&self, what: &str) -> Error {
        Error::InvalidCharstring(format!("{} (after '{}')", what, self.last_op))
    }

    fn push(&mut self, value: f64) -> Result<()> {
        if self.stack.len() >= MAX_STACK {
            return Err(self.invalid("operand stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<f64> {
        self.stack.pop().ok_or_else(|| self.invalid("operand stack underflow"))
    }

    /// Record the Type2 width on the first stack-clearing operator.
    /// `expected` is the argument count the operator takes without a width.
    fn type2_width(&mut self, odd_means_width: bool, expected: Option<usize>) {
        if self.width_seen || self.ctx.kind != CharstringKind::Type2 {
            return;
        }
        self.width_seen = true;
        let has_width = match expected {
            Some(n) => self.stack.len() > n,
            None => odd_means_width && self.stack.len() % 2 == 1,
        };
        if has_width && !self.stack.is_empty() {
            let w = self.stack.remove(0);
            self.info.width = Some(self.ctx.nominal_width + w);
        } else {
            self.info.width = Some(self.ctx.default_width);
        }
    }

    fn count_stems(&mut self) {
        self.type2_width(true, None);
        self.num_hints += self.stack.len() / 2;
        self.stack.clear();
    }

    fn call_subr(&mut self, global: bool, depth: usize) -> Result<Option<Flow>> {
        let raw = self.pop()?;
        let (subrs, bias) = match (self.ctx.kind, global) {
            (CharstringKind::Type1, _) => (self.ctx.local_subrs, 0),
            (CharstringKind::Type2, false) => {
                (self.ctx.local_subrs, subroutine_bias(self.ctx.local_subrs.len()))
            },
            (CharstringKind::Type2, true) => {
                (self.ctx.global_subrs, subroutine_bias(self.ctx.global_subrs.len()))
            },
        };
        let index = (raw as i64).saturating_add(bias as i64);
        if index < 0 || index as usize >= subrs.len() {
            return Err(self.invalid(&format!("subroutine index {} out of range", index)));
        }
        let index = index as usize;
        if global {
            self.info.global_subrs.insert(index);
        } else {
            self.info.local_subrs.insert(index);
        }
        match self.execute(subrs[index], depth + 1)? {
            Flow::Return => Ok(None),
            Flow::EndChar => Ok(Some(Flow::EndChar)),
        }
    }

    fn execute(&mut self, code: &[u8], depth: usize) -> Result<Flow> {
        if depth > self.ctx.max_depth {
            return Err(Error::RecursionLimitExceeded(self.ctx.max_depth));
        }

        let kind = self.ctx.kind;
        let mut pos = 0usize;
        let byte = |pos: usize| code.get(pos).copied();

        while let Some(b0) = byte(pos) {
            pos += 1;
            match b0 {
                32..=246 => self.push(b0 as f64 - 139.0)?,
                247..=250 => {
                    let b1 = byte(pos).ok_or(Error::UnexpectedEof)?;
                    pos += 1;
                    self.push((b0 as f64 - 247.0) * 256.0 + b1 as f64 + 108.0)?;
                },
                251..=254 => {
                    let b1 = byte(pos).ok_or(Error::UnexpectedEof)?;
                    pos += 1;
                    self.push(-(b0 as f64 - 251.0) * 256.0 - b1 as f64 - 108.0)?;
                },
                28 if kind == CharstringKind::Type2 => {
                    let bytes = code.get(pos..pos + 2).ok_or(Error::UnexpectedEof)?;
                    pos += 2;
                    self.push(i16::from_be_bytes([bytes[0], bytes[1]]) as f64)?;
                },
                255 => {
                    let bytes = code.get(pos..pos + 4).ok_or(Error::UnexpectedEof)?;
                    pos += 4;
                    let v = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    match kind {
                        CharstringKind::Type1 => self.push(v as f64)?,
                        CharstringKind::Type2 => self.push(v as f64 / 65536.0)?,
                    }
                },
                12 => {
                    let b1 = byte(pos).ok_or(Error::UnexpectedEof)?;
                    pos += 1;
                    if let Some(flow) = self.escape_operator(b1)? {
                        return Ok(flow);
                    }
                },
                1 | 3 | 18 | 23 => {
                    self.last_op = match b0 {
                        1 => "hstem",
                        3 => "vstem",
                        18 => "hstemhm",
                        _ => "vstemhm",
                    };
                    self.count_stems();
                },
                19 | 20 if kind == CharstringKind::Type2 => {
                    self.last_op = if b0 == 19 { "hintmask" } else { "cntrmask" };
                    // Arguments left on the stack are implicit vstem hints.
                    self.count_stems();
                    let mask_len = (self.num_hints + 7) / 8;
                    if pos + mask_len > code.len() {
                        return Err(Error::UnexpectedEof);
                    }
                    pos += mask_len;
                },
                10 => {
                    self.last_op = "callsubr";
                    if let Some(flow) = self.call_subr(false, depth)? {
                        return Ok(flow);
                    }
                },
                29 if kind == CharstringKind::Type2 => {
                    self.last_op = "callgsubr";
                    if let Some(flow) = self.call_subr(true, depth)? {
                        return Ok(flow);
                    }
                },
                11 => {
                    self.last_op = "return";
                    return Ok(Flow::Return);
                },
                13 if kind == CharstringKind::Type1 => {
                    self.last_op = "hsbw";
                    if self.stack.len() < 2 {
                        return Err(self.invalid("hsbw needs 2 arguments"));
                    }
                    self.info.width = Some(self.stack[1]);
                    self.stack.clear();
                },
                14 => {
                    self.last_op = "endchar";
                    // endchar takes 0 or 4 arguments
                    self.type2_width(true, None);
                    if kind == CharstringKind::Type2 && self.stack.len() >= 4 {
                        let n = self.stack.len();
                        self.info.composite = Some(SeacComponents {
                            base: self.stack[n - 2] as u8,
                            accent: self.stack[n - 1] as u8,
                        });
                    }
                    self.stack.clear();
                    return Ok(Flow::EndChar);
                },
                21 => {
                    self.last_op = "rmoveto";
                    self.type2_width(false, Some(2));
                    self.stack.clear();
                },
                4 | 22 => {
                    self.last_op = if b0 == 4 { "vmoveto" } else { "hmoveto" };
                    self.type2_width(false, Some(1));
                    self.stack.clear();
                },
                _ => {
                    self.last_op = "path";
                    self.stack.clear();
                },
            }
        }

        // Falling off the end of a subroutine is an implicit return.
        Ok(Flow::Return)
    }

    fn escape_operator(&mut self, op: u8) -> Result<Option<Flow>> {
        let kind = self.ctx.kind;
        match (kind, op) {
            (CharstringKind::Type1, 6) => {
                self.last_op = "seac";
                if self.stack.len() < 5 {
                    return Err(self.invalid("seac needs 5 arguments"));
                }
                let n = self.stack.len();
                self.info.composite = Some(SeacComponents {
                    base: self.stack[n - 2] as u8,
                    accent: self.stack[n - 1] as u8,
                });
                self.stack.clear();
                return Ok(Some(Flow::EndChar));
            },
            (CharstringKind::Type1, 7) => {
                self.last_op = "sbw";
                if self.stack.len() < 4 {
                    return Err(self.invalid("sbw needs 4 arguments"));
                }
                self.info.width = Some(self.stack[2]);
                self.stack.clear();
            },
            (CharstringKind::Type1, 16) => {
                self.last_op = "callothersubr";
                let _othersubr = self.pop()?;
                let n = self.pop()? as usize;
                if n > self.stack.len() {
                    return Err(self.invalid("callothersubr argument count"));
                }
                for _ in 0..n {
                    let v = self.pop()?;
                    self.ps_stack.push(v);
                }
            },
            (CharstringKind::Type1, 17) => {
                self.last_op = "pop";
                let v = self.ps_stack.pop().unwrap_or(0.0);
                self.push(v)?;
            },
            (_, 3) | (_, 4) | (_, 15) => {
                self.last_op = match op {
                    3 => "and",
                    4 => "or",
                    _ => "eq",
                };
                let b = self.pop()?;
                let a = self.pop()?;
                let r = match op {
                    3 => a != 0.0 && b != 0.0,
                    4 => a != 0.0 || b != 0.0,
                    _ => a == b,
                };
                self.push(if r { 1.0 } else { 0.0 })?;
            },
            (_, 10) | (_, 11) | (_, 12) | (_, 24) => {
                self.last_op = match op {
                    10 => "add",
                    11 => "sub",
                    12 => "div",
                    _ => "mul",
                };
                let b = self.pop()?;
                let a = self.pop()?;
                let r = match op {
                    10 => a + b,
                    11 => a - b,
                    12 if b != 0.0 => a / b,
                    12 => 0.0,
                    _ => a * b,
                };
                self.push(r)?;
            },
            (CharstringKind::Type2, 5) | (CharstringKind::Type2, 9) | (CharstringKind::Type2, 14)
            | (CharstringKind::Type2, 26) => {
                self.last_op = match op {
                    5 => "not",
                    9 => "abs",
                    14 => "neg",
                    _ => "sqrt",
                };
                let a = self.pop()?;
                let r = match op {
                    5 => (a == 0.0) as u8 as f64,
                    9 => a.abs(),
                    14 => -a,
                    _ => a.abs().sqrt(),
                };
                self.push(r)?;
            },
            (CharstringKind::Type2, 18) => {
                self.last_op = "drop";
                self.pop()?;
            },
            (CharstringKind::Type2, 20) => {
                self.last_op = "put";
                let index = self.pop()? as usize;
                let value = self.pop()?;
                if index < TRANSIENT_SIZE {
                    self.transient[index] = value;
                }
            },
            (CharstringKind::Type2, 21) => {
                self.last_op = "get";
                let index = self.pop()? as usize;
                let value = self.transient.get(index).copied().unwrap_or(0.0);
                self.push(value)?;
            },
            (CharstringKind::Type2, 22) => {
                self.last_op = "ifelse";
                let v2 = self.pop()?;
                let v1 = self.pop()?;
                let s2 = self.pop()?;
                let s1 = self.pop()?;
                self.push(if v1 <= v2 { s1 } else { s2 })?;
            },
            (CharstringKind::Type2, 23) => {
                self.last_op = "random";
                // xorshift; only the stack depth matters here
                self.seed ^= self.seed << 13;
                self.seed ^= self.seed >> 17;
                self.seed ^= self.seed << 5;
                let r = (self.seed as f64 / u32::MAX as f64).max(f64::EPSILON);
                self.push(r)?;
            },
            (CharstringKind::Type2, 27) => {
                self.last_op = "dup";
                let a = *self.stack.last().ok_or_else(|| self.invalid("dup on empty stack"))?;
                self.push(a)?;
            },
            (CharstringKind::Type2, 28) => {
                self.last_op = "exch";
                let n = self.stack.len();
                if n < 2 {
                    return Err(self.invalid("exch needs 2 arguments"));
                }
                self.stack.swap(n - 1, n - 2);
            },
            (CharstringKind::Type2, 29) => {
                self.last_op = "index";
                let i = self.pop()?;
                let n = self.stack.len();
                if n == 0 {
                    return Err(self.invalid("index on empty stack"));
                }
                let i = if i < 0.0 { 0 } else { (i as usize).min(n - 1) };
                let v = self.stack[n - 1 - i];
                self.push(v)?;
            },
            (CharstringKind::Type2, 30) => {
                self.last_op = "roll";
                let j = self.pop()? as i64;
                let n = self.pop()? as usize;
                let len = self.stack.len();
                if n > len {
                    return Err(self.invalid("roll count exceeds stack"));
                }
                if n > 0 {
                    let shift = j.rem_euclid(n as i64) as usize;
                    self.stack[len - n..].rotate_right(shift);
                }
            },
            _ => {
                // dotsection, vstem3, hstem3, setcurrentpoint, flex family, ...
                self.last_op = "escape";
                if kind == CharstringKind::Type2 && (34..=37).contains(&op) {
                    self.type2_width(false, None);
                }
                self.stack.clear();
            },
        }
        Ok(None)
    }
}
