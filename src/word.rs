// SPDX-License-Identifier: Apache-2.0

//! Word-level expressions describing the operation a verified candidate
//! implements, and their bit-blasting onto an `Aig`.
//!
//! Bit vectors are LSB first everywhere: `Concat` parts, constant bits and
//! net lists all start at bit 0.

use serde::{Deserialize, Serialize};

use crate::aig::{Aig, AigOperand, Bits};
use crate::error::ModIdError;
use crate::netlist::NetId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordExpr {
    /// Named placeholder with no boolean meaning.
    Var { name: String, width: usize },
    Net(NetId),
    Const(Vec<bool>),
    Concat(Vec<WordExpr>),
    Slice {
        expr: Box<WordExpr>,
        lo: usize,
        width: usize,
    },
    Not(Box<WordExpr>),
    Neg(Box<WordExpr>),
    Add(Box<WordExpr>, Box<WordExpr>),
    Sub(Box<WordExpr>, Box<WordExpr>),
    Eq(Box<WordExpr>, Box<WordExpr>),
    Ult(Box<WordExpr>, Box<WordExpr>),
    Ule(Box<WordExpr>, Box<WordExpr>),
    Slt(Box<WordExpr>, Box<WordExpr>),
    Sle(Box<WordExpr>, Box<WordExpr>),
    Ite {
        cond: Box<WordExpr>,
        then: Box<WordExpr>,
        otherwise: Box<WordExpr>,
    },
    Zext { expr: Box<WordExpr>, width: usize },
    Sext { expr: Box<WordExpr>, width: usize },
}

impl WordExpr {
    /// Concatenation of single-bit nets, `nets[0]` being the LSB.
    pub fn nets(nets: &[NetId]) -> WordExpr {
        if nets.len() == 1 {
            return WordExpr::Net(nets[0]);
        }
        WordExpr::Concat(nets.iter().map(|n| WordExpr::Net(*n)).collect())
    }

    pub fn constant(value: u128, width: usize) -> WordExpr {
        WordExpr::Const(
            (0..width)
                .map(|i| i < 128 && (value >> i) & 1 == 1)
                .collect(),
        )
    }

    pub fn zero(width: usize) -> WordExpr {
        WordExpr::Const(vec![false; width])
    }

    pub fn from_bits(bits: &[bool]) -> WordExpr {
        WordExpr::Const(bits.to_vec())
    }

    pub fn width(&self) -> usize {
        match self {
            WordExpr::Var { width, .. } => *width,
            WordExpr::Net(_) => 1,
            WordExpr::Const(bits) => bits.len(),
            WordExpr::Concat(parts) => parts.iter().map(|p| p.width()).sum(),
            WordExpr::Slice { width, .. } => *width,
            WordExpr::Not(e) | WordExpr::Neg(e) => e.width(),
            WordExpr::Add(a, _) | WordExpr::Sub(a, _) => a.width(),
            WordExpr::Eq(..)
            | WordExpr::Ult(..)
            | WordExpr::Ule(..)
            | WordExpr::Slt(..)
            | WordExpr::Sle(..) => 1,
            WordExpr::Ite { then, .. } => then.width(),
            WordExpr::Zext { width, .. } | WordExpr::Sext { width, .. } => *width,
        }
    }

    pub fn is_zero_const(&self) -> bool {
        matches!(self, WordExpr::Const(bits) if bits.iter().all(|b| !b))
    }

    pub fn slice(self, lo: usize, width: usize) -> WordExpr {
        if lo == 0 && width == self.width() {
            return self;
        }
        WordExpr::Slice {
            expr: Box::new(self),
            lo,
            width,
        }
    }

    pub fn zext(self, width: usize) -> WordExpr {
        let w = self.width();
        if width == w {
            self
        } else if width < w {
            self.slice(0, width)
        } else {
            WordExpr::Zext {
                expr: Box::new(self),
                width,
            }
        }
    }

    pub fn sext(self, width: usize) -> WordExpr {
        let w = self.width();
        if width == w {
            self
        } else if width < w {
            self.slice(0, width)
        } else {
            WordExpr::Sext {
                expr: Box::new(self),
                width,
            }
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: WordExpr) -> WordExpr {
        WordExpr::Add(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: WordExpr) -> WordExpr {
        WordExpr::Sub(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> WordExpr {
        WordExpr::Neg(Box::new(self))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> WordExpr {
        WordExpr::Not(Box::new(self))
    }

    pub fn ite(cond: WordExpr, then: WordExpr, otherwise: WordExpr) -> WordExpr {
        WordExpr::Ite {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Nets referenced anywhere in the expression.
    pub fn nets_used(&self) -> Vec<NetId> {
        let mut out = Vec::new();
        self.collect_nets(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_nets(&self, out: &mut Vec<NetId>) {
        match self {
            WordExpr::Net(n) => out.push(*n),
            WordExpr::Var { .. } | WordExpr::Const(_) => {}
            WordExpr::Concat(parts) => parts.iter().for_each(|p| p.collect_nets(out)),
            WordExpr::Slice { expr, .. }
            | WordExpr::Not(expr)
            | WordExpr::Neg(expr)
            | WordExpr::Zext { expr, .. }
            | WordExpr::Sext { expr, .. } => expr.collect_nets(out),
            WordExpr::Add(a, b)
            | WordExpr::Sub(a, b)
            | WordExpr::Eq(a, b)
            | WordExpr::Ult(a, b)
            | WordExpr::Ule(a, b)
            | WordExpr::Slt(a, b)
            | WordExpr::Sle(a, b) => {
                a.collect_nets(out);
                b.collect_nets(out);
            }
            WordExpr::Ite {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_nets(out);
                then.collect_nets(out);
                otherwise.collect_nets(out);
            }
        }
    }

    /// Lowers the expression to AIG operands, LSB first.
    pub fn bitblast(&self, aig: &mut Aig) -> Result<Bits, ModIdError> {
        let bits = match self {
            WordExpr::Var { name, .. } => {
                return Err(ModIdError::Expression(format!(
                    "placeholder '{name}' has no boolean value"
                )));
            }
            WordExpr::Net(n) => vec![aig.input(*n)],
            WordExpr::Const(bits) => bits.iter().map(|b| aig.lit(*b)).collect(),
            WordExpr::Concat(parts) => {
                let mut out = Vec::new();
                for p in parts {
                    out.extend(p.bitblast(aig)?);
                }
                out
            }
            WordExpr::Slice { expr, lo, width } => {
                let inner = expr.bitblast(aig)?;
                if lo + width > inner.len() {
                    return Err(ModIdError::Expression(format!(
                        "slice [{lo}+:{width}] of a {}-bit value",
                        inner.len()
                    )));
                }
                inner[*lo..lo + width].to_vec()
            }
            WordExpr::Not(e) => e.bitblast(aig)?.iter().map(|b| b.negate()).collect(),
            WordExpr::Neg(e) => {
                let v = e.bitblast(aig)?;
                negate_bits(aig, &v)
            }
            WordExpr::Add(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                let c = aig.lit(false);
                add_bits(aig, &va, &vb, c)
            }
            WordExpr::Sub(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                let nb: Bits = vb.iter().map(|x| x.negate()).collect();
                let c = aig.lit(true);
                add_bits(aig, &va, &nb, c)
            }
            WordExpr::Eq(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                let eqs: Bits = va
                    .iter()
                    .zip(vb.iter())
                    .map(|(x, y)| aig.xnor(*x, *y))
                    .collect();
                vec![aig.and_all(&eqs)]
            }
            WordExpr::Ult(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                vec![ult_bits(aig, &va, &vb)]
            }
            WordExpr::Ule(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                vec![ult_bits(aig, &vb, &va).negate()]
            }
            WordExpr::Slt(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                vec![ult_bits(aig, &flip_msb(&va), &flip_msb(&vb))]
            }
            WordExpr::Sle(a, b) => {
                let (va, vb) = same_width(aig, a, b)?;
                vec![ult_bits(aig, &flip_msb(&vb), &flip_msb(&va)).negate()]
            }
            WordExpr::Ite {
                cond,
                then,
                otherwise,
            } => {
                let c = cond.bitblast(aig)?;
                if c.len() != 1 {
                    return Err(ModIdError::Expression(format!(
                        "ite condition is {} bits wide",
                        c.len()
                    )));
                }
                let (vt, vf) = same_width(aig, then, otherwise)?;
                vt.iter()
                    .zip(vf.iter())
                    .map(|(t, f)| aig.mux(c[0], *t, *f))
                    .collect()
            }
            WordExpr::Zext { expr, width } => {
                let mut v = expr.bitblast(aig)?;
                v.resize(*width, aig.lit(false));
                v
            }
            WordExpr::Sext { expr, width } => {
                let mut v = expr.bitblast(aig)?;
                let msb = v.last().copied().unwrap_or(aig.lit(false));
                v.resize(*width, msb);
                v
            }
        };
        Ok(bits)
    }

    /// Renders the expression, naming nets through `name_of`. A concat of
    /// nets named `X_0, X_1, ...` in order collapses to `X`.
    pub fn render(&self, name_of: &dyn Fn(NetId) -> String) -> String {
        self.render_impl(name_of, true)
    }

    fn render_impl(&self, name_of: &dyn Fn(NetId) -> String, collapse: bool) -> String {
        let r = |e: &WordExpr| e.render_impl(name_of, collapse);
        match self {
            WordExpr::Var { name, .. } => name.clone(),
            WordExpr::Net(n) => name_of(*n),
            WordExpr::Const(bits) => render_const(bits),
            WordExpr::Concat(parts) => {
                let names: Vec<String> = parts.iter().map(r).collect();
                if collapse {
                    if let Some(bus) = collapse_bus(&names) {
                        return bus;
                    }
                }
                let msb_first: Vec<String> = names.into_iter().rev().collect();
                format!("{{{}}}", msb_first.join(", "))
            }
            WordExpr::Slice { expr, lo, width } => {
                format!("{}[{}:{}]", r(&**expr), lo + width - 1, lo)
            }
            WordExpr::Not(e) => format!("~{}", r(&**e)),
            WordExpr::Neg(e) => format!("-{}", r(&**e)),
            WordExpr::Add(a, b) => format!("({} + {})", r(&**a), r(&**b)),
            WordExpr::Sub(a, b) => format!("({} - {})", r(&**a), r(&**b)),
            WordExpr::Eq(a, b) => format!("({} == {})", r(&**a), r(&**b)),
            WordExpr::Ult(a, b) => format!("({} < {})", r(&**a), r(&**b)),
            WordExpr::Ule(a, b) => format!("({} <= {})", r(&**a), r(&**b)),
            WordExpr::Slt(a, b) => format!("({} <s {})", r(&**a), r(&**b)),
            WordExpr::Sle(a, b) => format!("({} <=s {})", r(&**a), r(&**b)),
            WordExpr::Ite {
                cond,
                then,
                otherwise,
            } => format!(
                "({} ? {} : {})",
                r(&**cond),
                r(&**then),
                r(&**otherwise)
            ),
            WordExpr::Zext { expr, width } => format!("zext({}, {})", r(&**expr), width),
            WordExpr::Sext { expr, width } => format!("sext({}, {})", r(&**expr), width),
        }
    }
}

impl std::fmt::Display for WordExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render_impl(&|n| n.to_string(), false))
    }
}

fn render_const(bits: &[bool]) -> String {
    if bits.len() <= 64 {
        let v = bits
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, b)| if *b { acc | (1 << i) } else { acc });
        return format!("{}'d{}", bits.len(), v);
    }
    let s: String = bits.iter().rev().map(|b| if *b { '1' } else { '0' }).collect();
    format!("{}'b{}", bits.len(), s)
}

fn collapse_bus(names: &[String]) -> Option<String> {
    let mut base: Option<&str> = None;
    for (i, name) in names.iter().enumerate() {
        let (b, idx) = name.rsplit_once('_')?;
        if idx.parse::<usize>().ok()? != i {
            return None;
        }
        match base {
            None => base = Some(b),
            Some(prev) if prev == b => {}
            Some(_) => return None,
        }
    }
    base.map(|b| b.to_string())
}

fn same_width(aig: &mut Aig, a: &WordExpr, b: &WordExpr) -> Result<(Bits, Bits), ModIdError> {
    let va = a.bitblast(aig)?;
    let vb = b.bitblast(aig)?;
    if va.len() != vb.len() {
        return Err(ModIdError::Expression(format!(
            "width mismatch: {} vs {}",
            va.len(),
            vb.len()
        )));
    }
    Ok((va, vb))
}

/// Ripple-carry sum truncated to the operand width.
pub fn add_bits(aig: &mut Aig, a: &[AigOperand], b: &[AigOperand], carry_in: AigOperand) -> Bits {
    let mut carry = carry_in;
    let mut out = Vec::with_capacity(a.len());
    for (x, y) in a.iter().zip(b.iter()) {
        let t = aig.xor(*x, *y);
        out.push(aig.xor(t, carry));
        let g = aig.and(*x, *y);
        let p = aig.and(t, carry);
        carry = aig.or(g, p);
    }
    out
}

pub fn negate_bits(aig: &mut Aig, a: &[AigOperand]) -> Bits {
    let inv: Bits = a.iter().map(|x| x.negate()).collect();
    let zero = vec![aig.lit(false); a.len()];
    let one = aig.lit(true);
    add_bits(aig, &inv, &zero, one)
}

/// `a < b`, unsigned.
fn ult_bits(aig: &mut Aig, a: &[AigOperand], b: &[AigOperand]) -> AigOperand {
    // Scan from LSB: lt_i = (!a_i & b_i) | (a_i == b_i) & lt_{i-1}
    let mut lt = aig.lit(false);
    for (x, y) in a.iter().zip(b.iter()) {
        let strictly = aig.and(x.negate(), *y);
        let eq = aig.xnor(*x, *y);
        let keep = aig.and(eq, lt);
        lt = aig.or(strictly, keep);
    }
    lt
}

fn flip_msb(v: &[AigOperand]) -> Bits {
    let mut out = v.to_vec();
    if let Some(last) = out.last_mut() {
        *last = last.negate();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn eval_word(expr: &WordExpr, assign: &dyn Fn(NetId) -> bool) -> u64 {
        let mut aig = Aig::new();
        let bits = expr.bitblast(&mut aig).unwrap();
        aig.eval(&bits, assign)
            .iter()
            .enumerate()
            .fold(0, |acc, (i, b)| if *b { acc | (1 << i) } else { acc })
    }

    fn nets(range: std::ops::Range<usize>) -> Vec<NetId> {
        range.map(NetId).collect()
    }

    fn assign_words(a: u64, b: u64) -> impl Fn(NetId) -> bool {
        move |n: NetId| {
            if n.0 < 4 {
                (a >> n.0) & 1 == 1
            } else {
                (b >> (n.0 - 4)) & 1 == 1
            }
        }
    }

    #[test]
    fn test_add_sub_exhaustive_4bit() {
        let a = WordExpr::nets(&nets(0..4));
        let b = WordExpr::nets(&nets(4..8));
        let sum = a.clone().add(b.clone());
        let diff = a.sub(b);
        for x in 0..16u64 {
            for y in 0..16u64 {
                assert_eq!(eval_word(&sum, &assign_words(x, y)), (x + y) & 0xf);
                assert_eq!(eval_word(&diff, &assign_words(x, y)), x.wrapping_sub(y) & 0xf);
            }
        }
    }

    #[test_case(3, 5, 1, 1, 1, 1; "three five")]
    #[test_case(5, 5, 0, 1, 0, 1; "equal")]
    #[test_case(0xf, 1, 0, 0, 1, 1; "minus one vs one")]
    #[test_case(1, 0x8, 1, 1, 0, 0; "one vs most negative")]
    fn test_comparisons(a: u64, b: u64, ult: u64, ule: u64, slt: u64, sle: u64) {
        let x = WordExpr::nets(&nets(0..4));
        let y = WordExpr::nets(&nets(4..8));
        let assign = assign_words(a, b);
        let cmp = |e: WordExpr| eval_word(&e, &assign);
        assert_eq!(cmp(WordExpr::Ult(Box::new(x.clone()), Box::new(y.clone()))), ult);
        assert_eq!(cmp(WordExpr::Ule(Box::new(x.clone()), Box::new(y.clone()))), ule);
        assert_eq!(cmp(WordExpr::Slt(Box::new(x.clone()), Box::new(y.clone()))), slt);
        assert_eq!(cmp(WordExpr::Sle(Box::new(x), Box::new(y))), sle);
    }

    #[test]
    fn test_render_collapses_named_bus() {
        let a = WordExpr::nets(&nets(0..2));
        let b = WordExpr::nets(&nets(4..6));
        let expr = a.add(b);
        let name = |n: NetId| {
            if n.0 < 4 {
                format!("A_{}", n.0)
            } else {
                format!("B_{}", n.0 - 4)
            }
        };
        assert_eq!(expr.render(&name), "(A + B)");
        assert_eq!(
            WordExpr::nets(&[NetId(1), NetId(0)]).render(&name),
            "{A_0, A_1}"
        );
    }

    #[test]
    fn test_placeholder_does_not_bitblast() {
        let mut aig = Aig::new();
        let v = WordExpr::Var {
            name: "UNKNOWN_OPERATION".to_string(),
            width: 4,
        };
        assert!(matches!(v.bitblast(&mut aig), Err(ModIdError::Expression(_))));
    }
}
