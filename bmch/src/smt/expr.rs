//! Hash-consed term factory
//!
//! All terms of one BMC run live in a single [`ExprFactory`]; [`Expr`] is a
//! copyable handle into it. Structurally equal terms share a handle.

use std::collections::HashMap;
use std::fmt::Write;

use num_bigint::BigInt;
use num_traits::Signed;

/// SMT sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    Int,
}

impl Sort {
    pub fn smtlib(&self) -> &'static str {
        match self {
            Sort::Bool => "Bool",
            Sort::Int => "Int",
        }
    }
}

/// Term operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Not,
    And,
    Or,
    Xor,
    Implies,
    Eq,
    Ite,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Op::Not => "not",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Implies => "=>",
            Op::Eq => "=",
            Op::Ite => "ite",
            Op::Add => "+",
            Op::Sub | Op::Neg => "-",
            Op::Mul => "*",
            Op::Div => "div",
            Op::Mod => "mod",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }
}

/// Handle to an interned term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Expr(u32);

/// Interned term node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprNode {
    True,
    False,
    Int(BigInt),
    Const { name: String, sort: Sort },
    App(Op, Vec<Expr>),
}

#[derive(Debug, Default)]
pub struct ExprFactory {
    nodes: Vec<ExprNode>,
    index: HashMap<ExprNode, Expr>,
}

impl ExprFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, node: ExprNode) -> Expr {
        if let Some(&e) = self.index.get(&node) {
            return e;
        }
        let e = Expr(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.index.insert(node, e);
        e
    }

    pub fn node(&self, e: Expr) -> &ExprNode {
        &self.nodes[e.0 as usize]
    }

    /// Number of distinct terms interned so far
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sort(&self, e: Expr) -> Sort {
        match self.node(e) {
            ExprNode::True | ExprNode::False => Sort::Bool,
            ExprNode::Int(_) => Sort::Int,
            ExprNode::Const { sort, .. } => *sort,
            ExprNode::App(op, args) => match op {
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Neg => Sort::Int,
                Op::Ite => args.get(1).map_or(Sort::Bool, |a| self.sort(*a)),
                _ => Sort::Bool,
            },
        }
    }

    /// Name of a constant term
    pub fn const_name(&self, e: Expr) -> Option<&str> {
        match self.node(e) {
            ExprNode::Const { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn mk_true(&mut self) -> Expr {
        self.intern(ExprNode::True)
    }

    pub fn mk_false(&mut self) -> Expr {
        self.intern(ExprNode::False)
    }

    pub fn bool(&mut self, b: bool) -> Expr {
        if b { self.mk_true() } else { self.mk_false() }
    }

    pub fn int(&mut self, n: i64) -> Expr {
        self.intern(ExprNode::Int(BigInt::from(n)))
    }

    pub fn big(&mut self, n: BigInt) -> Expr {
        self.intern(ExprNode::Int(n))
    }

    pub fn constant(&mut self, name: impl Into<String>, sort: Sort) -> Expr {
        self.intern(ExprNode::Const {
            name: name.into(),
            sort,
        })
    }

    fn app(&mut self, op: Op, args: Vec<Expr>) -> Expr {
        self.intern(ExprNode::App(op, args))
    }

    pub fn not(&mut self, e: Expr) -> Expr {
        match self.node(e) {
            ExprNode::True => self.mk_false(),
            ExprNode::False => self.mk_true(),
            ExprNode::App(Op::Not, args) => args[0],
            _ => self.app(Op::Not, vec![e]),
        }
    }

    pub fn and(&mut self, args: Vec<Expr>) -> Expr {
        let mut kept = Vec::with_capacity(args.len());
        for a in args {
            match self.node(a) {
                ExprNode::True => {}
                ExprNode::False => return self.mk_false(),
                _ if kept.contains(&a) => {}
                _ => kept.push(a),
            }
        }
        match kept.len() {
            0 => self.mk_true(),
            1 => kept[0],
            _ => self.app(Op::And, kept),
        }
    }

    pub fn or(&mut self, args: Vec<Expr>) -> Expr {
        let mut kept = Vec::with_capacity(args.len());
        for a in args {
            match self.node(a) {
                ExprNode::False => {}
                ExprNode::True => return self.mk_true(),
                _ if kept.contains(&a) => {}
                _ => kept.push(a),
            }
        }
        match kept.len() {
            0 => self.mk_false(),
            1 => kept[0],
            _ => self.app(Op::Or, kept),
        }
    }

    pub fn xor(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Xor, vec![a, b])
    }

    pub fn implies(&mut self, a: Expr, b: Expr) -> Expr {
        let lhs_true = matches!(self.node(a), ExprNode::True);
        let trivial = matches!(self.node(a), ExprNode::False) || matches!(self.node(b), ExprNode::True);
        if lhs_true {
            b
        } else if trivial {
            self.mk_true()
        } else {
            self.app(Op::Implies, vec![a, b])
        }
    }

    pub fn eq(&mut self, a: Expr, b: Expr) -> Expr {
        if a == b {
            return self.mk_true();
        }
        self.app(Op::Eq, vec![a, b])
    }

    pub fn ite(&mut self, c: Expr, t: Expr, e: Expr) -> Expr {
        match self.node(c) {
            ExprNode::True => t,
            ExprNode::False => e,
            _ if t == e => t,
            _ => self.app(Op::Ite, vec![c, t, e]),
        }
    }

    pub fn add(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Add, vec![a, b])
    }

    pub fn sub(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Sub, vec![a, b])
    }

    pub fn mul(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Mul, vec![a, b])
    }

    pub fn div(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Div, vec![a, b])
    }

    pub fn modulo(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Mod, vec![a, b])
    }

    pub fn neg(&mut self, a: Expr) -> Expr {
        self.app(Op::Neg, vec![a])
    }

    pub fn lt(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Lt, vec![a, b])
    }

    pub fn le(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Le, vec![a, b])
    }

    pub fn gt(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Gt, vec![a, b])
    }

    pub fn ge(&mut self, a: Expr, b: Expr) -> Expr {
        self.app(Op::Ge, vec![a, b])
    }

    /// Convert between sorts: `Bool -> Int` as 0/1, `Int -> Bool` as `!= 0`
    pub fn coerce(&mut self, e: Expr, sort: Sort) -> Expr {
        match (self.sort(e), sort) {
            (Sort::Bool, Sort::Int) => {
                let one = self.int(1);
                let zero = self.int(0);
                self.ite(e, one, zero)
            }
            (Sort::Int, Sort::Bool) => {
                let zero = self.int(0);
                let is_zero = self.eq(e, zero);
                self.not(is_zero)
            }
            _ => e,
        }
    }

    /// Render a term in SMT-LIB2 concrete syntax
    pub fn to_smtlib(&self, e: Expr) -> String {
        let mut out = String::new();
        self.write_term(e, &mut out);
        out
    }

    fn write_term(&self, e: Expr, out: &mut String) {
        match self.node(e) {
            ExprNode::True => out.push_str("true"),
            ExprNode::False => out.push_str("false"),
            ExprNode::Int(n) if n.is_negative() => {
                let _ = write!(out, "(- {})", n.abs());
            }
            ExprNode::Int(n) => {
                let _ = write!(out, "{n}");
            }
            ExprNode::Const { name, .. } => out.push_str(&symbol(name)),
            ExprNode::App(op, args) => {
                out.push('(');
                out.push_str(op.symbol());
                for a in args {
                    out.push(' ');
                    self.write_term(*a, out);
                }
                out.push(')');
            }
        }
    }
}

/// Quote a symbol with `|..|` unless it is a valid simple symbol
pub fn symbol(name: &str) -> String {
    const EXTRA: &str = "~!@$%^&*_-+=<>.?/";
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || EXTRA.contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{}|", name.replace('|', "_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consing_shares_handles() {
        let mut f = ExprFactory::new();
        let x = f.constant("x", Sort::Int);
        let one = f.int(1);
        let a = f.add(x, one);
        let b = f.add(x, one);
        assert_eq!(a, b);
        assert_eq!(f.constant("x", Sort::Int), x);
    }

    #[test]
    fn test_and_or_simplify_constants() {
        let mut f = ExprFactory::new();
        let p = f.constant("p", Sort::Bool);
        let t = f.mk_true();
        let fl = f.mk_false();
        assert_eq!(f.and(vec![t, p]), p);
        assert_eq!(f.and(vec![p, fl]), fl);
        assert_eq!(f.and(vec![]), t);
        assert_eq!(f.or(vec![fl, p]), p);
        assert_eq!(f.or(vec![]), fl);
        assert_eq!(f.implies(t, p), p);
    }

    #[test]
    fn test_double_negation() {
        let mut f = ExprFactory::new();
        let p = f.constant("p", Sort::Bool);
        let np = f.not(p);
        assert_eq!(f.not(np), p);
    }

    #[test]
    fn test_to_smtlib() {
        let mut f = ExprFactory::new();
        let x = f.constant("%x", Sort::Int);
        let m = f.int(-5);
        let c = f.lt(x, m);
        let b = f.constant("bb!entry", Sort::Bool);
        let e = f.implies(b, c);
        assert_eq!(f.to_smtlib(e), "(=> bb!entry (< %x (- 5)))");
    }

    #[test]
    fn test_sort_inference() {
        let mut f = ExprFactory::new();
        let x = f.constant("x", Sort::Int);
        let p = f.constant("p", Sort::Bool);
        let one = f.int(1);
        let ite = f.ite(p, x, one);
        assert_eq!(f.sort(ite), Sort::Int);
        let cmp = f.ge(x, one);
        assert_eq!(f.sort(cmp), Sort::Bool);
    }

    #[test]
    fn test_coerce_bool_to_int() {
        let mut f = ExprFactory::new();
        let p = f.constant("p", Sort::Bool);
        let as_int = f.coerce(p, Sort::Int);
        assert_eq!(f.to_smtlib(as_int), "(ite p 1 0)");
        assert_eq!(f.coerce(p, Sort::Bool), p);
    }

    #[test]
    fn test_symbol_quoting() {
        assert_eq!(symbol("bb!a.b"), "bb!a.b");
        assert_eq!(symbol("0x"), "|0x|");
        assert_eq!(symbol("has space"), "|has space|");
    }
}
