//! Token definitions

use logos::Logos;

/// Textual MIR token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // Keywords
    #[token("extern")]
    Extern,
    #[token("fn")]
    Fn,
    #[token("call")]
    Call,
    #[token("phi")]
    Phi,
    #[token("const")]
    Const,
    #[token("copy")]
    Copy,
    #[token("ret")]
    Ret,
    #[token("goto")]
    Goto,
    #[token("br")]
    Br,
    #[token("unreachable")]
    Unreachable,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Literals
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 2)]
    IntLit(i64),

    /// `%name`, stored without the sigil
    #[regex(r"%[A-Za-z0-9_.]+", |lex| lex.slice()[1..].to_string())]
    Place(String),

    /// Function names, labels, type names and opcodes; may contain dots
    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    // Symbols
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("=")]
    Eq,
    #[token("*")]
    Star,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Extern => write!(f, "extern"),
            Token::Fn => write!(f, "fn"),
            Token::Call => write!(f, "call"),
            Token::Phi => write!(f, "phi"),
            Token::Const => write!(f, "const"),
            Token::Copy => write!(f, "copy"),
            Token::Ret => write!(f, "ret"),
            Token::Goto => write!(f, "goto"),
            Token::Br => write!(f, "br"),
            Token::Unreachable => write!(f, "unreachable"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::IntLit(n) => write!(f, "{n}"),
            Token::Place(name) => write!(f, "%{name}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Arrow => write!(f, "->"),
            Token::Colon => write!(f, ":"),
            Token::Semi => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Eq => write!(f, "="),
            Token::Star => write!(f, "*"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
        }
    }
}
