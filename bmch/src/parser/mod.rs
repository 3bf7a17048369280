//! Recursive-descent parser for textual MIR
//!
//! ```text
//! extern fn nd_int() -> i32;
//!
//! fn main(%n: i32) -> i32 {
//! entry:
//!   %x: i32 = call nd_int();
//!   %c: bool = lt %x, %n;
//!   br %c, then, done;
//! then:
//!   goto done;
//! done:
//!   ret %x;
//! }
//! ```

use std::collections::HashSet;

use crate::error::{BmchError, Result};
use crate::lexer::Token;
use crate::mir::{
    BasicBlock, Callee, Constant, DataLayout, MirBinOp, MirExternFn, MirFunction, MirInst,
    MirProgram, MirType, MirUnaryOp, Operand, Place, Terminator,
};
use crate::span::Span;


/// Parse tokens into a MIR program
pub fn parse(_filename: &str, source: &str, tokens: Vec<(Token, Span)>) -> Result<MirProgram> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        eof: Span::new(source.len(), source.len()),
    };
    parser.program()
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    eof: Span,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or(self.eof)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(BmchError::parser(message, self.span()))
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T> {
        match self.peek() {
            Some(tok) => self.error(format!("expected {expected}, found '{tok}'")),
            None => self.error(format!("expected {expected}, found end of input")),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            self.unexpected(&format!("'{expected}'"))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self, what: &str) -> Result<(String, Span)> {
        let span = self.span();
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok((name, span))
            }
            _ => self.unexpected(what),
        }
    }

    fn place(&mut self) -> Result<Place> {
        match self.peek() {
            Some(Token::Place(name)) => {
                let place = Place::new(name.clone());
                self.pos += 1;
                Ok(place)
            }
            _ => self.unexpected("a place"),
        }
    }

    fn ty(&mut self) -> Result<MirType> {
        let span = self.span();
        let (name, _) = self.ident("a type")?;
        MirType::from_name(&name)
            .ok_or_else(|| BmchError::parser(format!("unknown type '{name}'"), span))
    }

    fn program(&mut self) -> Result<MirProgram> {
        let mut program = MirProgram {
            functions: Vec::new(),
            extern_fns: Vec::new(),
            data_layout: DataLayout::default(),
        };
        let mut names: HashSet<String> = HashSet::new();

        while let Some(tok) = self.peek() {
            match tok {
                Token::Extern => {
                    let span = self.span();
                    let ext = self.extern_fn()?;
                    if program.extern_fn(&ext.name).is_some() {
                        return Err(BmchError::parser(
                            format!("duplicate extern declaration '{}'", ext.name),
                            span,
                        ));
                    }
                    program.extern_fns.push(ext);
                }
                Token::Fn => {
                    let span = self.span();
                    let func = self.function()?;
                    if !names.insert(func.name.clone()) {
                        return Err(BmchError::parser(
                            format!("duplicate function '{}'", func.name),
                            span,
                        ));
                    }
                    program.functions.push(func);
                }
                _ => return self.unexpected("'fn' or 'extern'"),
            }
        }

        Ok(program)
    }

    fn extern_fn(&mut self) -> Result<MirExternFn> {
        self.expect(Token::Extern)?;
        self.expect(Token::Fn)?;
        let (name, _) = self.ident("a function name")?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.ty()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::Arrow)?;
        let ret_ty = self.ty()?;
        self.expect(Token::Semi)?;
        Ok(MirExternFn {
            name,
            params,
            ret_ty,
        })
    }

    fn function(&mut self) -> Result<MirFunction> {
        self.expect(Token::Fn)?;
        let (name, _) = self.ident("a function name")?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let place = self.place()?;
                self.expect(Token::Colon)?;
                params.push((place.name, self.ty()?));
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::Arrow)?;
        let ret_ty = self.ty()?;
        self.expect(Token::LBrace)?;

        let mut blocks: Vec<BasicBlock> = Vec::new();
        let mut label_refs: Vec<(String, Span)> = Vec::new();
        while !self.eat(&Token::RBrace) {
            let span = self.span();
            let block = self.block(&mut label_refs)?;
            if blocks.iter().any(|b| b.label == block.label) {
                return Err(BmchError::parser(
                    format!("duplicate block label '{}'", block.label),
                    span,
                ));
            }
            blocks.push(block);
        }

        if blocks.is_empty() {
            return self.error(format!("function '{name}' has no blocks"));
        }
        for (label, span) in label_refs {
            if !blocks.iter().any(|b| b.label == label) {
                return Err(BmchError::parser(
                    format!("unknown block label '{label}' in function '{name}'"),
                    span,
                ));
            }
        }

        Ok(MirFunction {
            name,
            params,
            ret_ty,
            blocks,
        })
    }

    fn block(&mut self, label_refs: &mut Vec<(String, Span)>) -> Result<BasicBlock> {
        let (label, _) = self.ident("a block label")?;
        self.expect(Token::Colon)?;

        let mut instructions = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Place(_)) | Some(Token::Call) => {
                    instructions.push(self.instruction(label_refs)?);
                    self.expect(Token::Semi)?;
                }
                Some(Token::Ret | Token::Goto | Token::Br | Token::Unreachable) => {
                    let terminator = self.terminator(label_refs)?;
                    self.expect(Token::Semi)?;
                    return Ok(BasicBlock {
                        label,
                        instructions,
                        terminator,
                    });
                }
                _ => return self.unexpected("an instruction or terminator"),
            }
        }
    }

    fn instruction(&mut self, label_refs: &mut Vec<(String, Span)>) -> Result<MirInst> {
        if self.peek() == Some(&Token::Call) {
            let (callee, args) = self.call()?;
            return Ok(MirInst::Call {
                dest: None,
                ty: MirType::Unit,
                callee,
                args,
            });
        }

        let dest = self.place()?;
        self.expect(Token::Colon)?;
        let ty = self.ty()?;
        self.expect(Token::Eq)?;

        let span = self.span();
        match self.bump() {
            Some(Token::Const) => {
                let value = match self.operand()? {
                    Operand::Constant(Constant::Int(n)) if ty == MirType::Bool => {
                        Constant::Bool(n != 0)
                    }
                    Operand::Constant(Constant::Bool(b)) if ty != MirType::Bool => {
                        Constant::Int(i64::from(b))
                    }
                    Operand::Constant(c) => c,
                    Operand::Place(_) => {
                        return Err(BmchError::parser("'const' expects a literal", span));
                    }
                };
                Ok(MirInst::Const { dest, ty, value })
            }
            Some(Token::Copy) => {
                let src = self.operand()?;
                Ok(MirInst::Copy { dest, ty, src })
            }
            Some(Token::Phi) => {
                let mut values = Vec::new();
                loop {
                    self.expect(Token::LBracket)?;
                    let value = self.operand()?;
                    self.expect(Token::Comma)?;
                    let (label, label_span) = self.ident("a block label")?;
                    label_refs.push((label.clone(), label_span));
                    self.expect(Token::RBracket)?;
                    values.push((value, label));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                Ok(MirInst::Phi { dest, ty, values })
            }
            Some(Token::Call) => {
                self.pos -= 1;
                let (callee, args) = self.call()?;
                Ok(MirInst::Call {
                    dest: Some(dest),
                    ty,
                    callee,
                    args,
                })
            }
            Some(Token::Ident(opcode)) => {
                if let Some(op) = MirBinOp::from_mnemonic(&opcode) {
                    let lhs = self.operand()?;
                    self.expect(Token::Comma)?;
                    let rhs = self.operand()?;
                    Ok(MirInst::BinOp {
                        dest,
                        ty,
                        op,
                        lhs,
                        rhs,
                    })
                } else if let Some(op) = MirUnaryOp::from_mnemonic(&opcode) {
                    let src = self.operand()?;
                    Ok(MirInst::UnaryOp { dest, ty, op, src })
                } else {
                    Err(BmchError::parser(format!("unknown opcode '{opcode}'"), span))
                }
            }
            _ => Err(BmchError::parser("expected an opcode", span)),
        }
    }

    fn call(&mut self) -> Result<(Callee, Vec<Operand>)> {
        self.expect(Token::Call)?;
        let callee = if self.eat(&Token::Star) {
            Callee::Indirect(self.operand()?)
        } else {
            Callee::Direct(self.ident("a callee")?.0)
        };
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.operand()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        Ok((callee, args))
    }

    fn terminator(&mut self, label_refs: &mut Vec<(String, Span)>) -> Result<Terminator> {
        let mut label = |p: &mut Self| -> Result<String> {
            let (name, span) = p.ident("a block label")?;
            label_refs.push((name.clone(), span));
            Ok(name)
        };

        match self.bump() {
            Some(Token::Ret) => {
                if self.peek() == Some(&Token::Semi) {
                    Ok(Terminator::Return(None))
                } else {
                    Ok(Terminator::Return(Some(self.operand()?)))
                }
            }
            Some(Token::Goto) => Ok(Terminator::Goto(label(self)?)),
            Some(Token::Br) => {
                let cond = self.operand()?;
                self.expect(Token::Comma)?;
                let then_label = label(self)?;
                self.expect(Token::Comma)?;
                let else_label = label(self)?;
                Ok(Terminator::Branch {
                    cond,
                    then_label,
                    else_label,
                })
            }
            Some(Token::Unreachable) => Ok(Terminator::Unreachable),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                self.unexpected("a terminator")
            }
        }
    }

    fn operand(&mut self) -> Result<Operand> {
        let operand = match self.peek() {
            Some(Token::Place(name)) => Operand::Place(Place::new(name.clone())),
            Some(Token::IntLit(n)) => Operand::Constant(Constant::Int(*n)),
            Some(Token::True) => Operand::Constant(Constant::Bool(true)),
            Some(Token::False) => Operand::Constant(Constant::Bool(false)),
            _ => return self.unexpected("an operand"),
        };
        self.pos += 1;
        Ok(operand)
    }
}
