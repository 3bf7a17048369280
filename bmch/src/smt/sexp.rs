//! Minimal s-expression reader for solver responses

use std::fmt;

use super::SolverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(s) => Some(s),
            Sexp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            Sexp::Atom(_) => None,
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{s}"),
            Sexp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse exactly one s-expression
pub fn parse(input: &str) -> Result<Sexp, SolverError> {
    let mut reader = Reader {
        chars: input.chars().collect(),
        pos: 0,
    };
    reader.skip_ws();
    let sexp = reader.sexp()?;
    reader.skip_ws();
    if reader.pos < reader.chars.len() {
        return Err(SolverError::Parse(format!(
            "trailing input after s-expression: {input}"
        )));
    }
    Ok(sexp)
}

/// Net parenthesis depth of a chunk of solver output, ignoring quoted text
pub fn paren_balance(text: &str) -> i64 {
    let mut depth = 0;
    let mut in_string = false;
    let mut in_symbol = false;
    for c in text.chars() {
        match c {
            '"' if !in_symbol => in_string = !in_string,
            '|' if !in_string => in_symbol = !in_symbol,
            '(' if !in_string && !in_symbol => depth += 1,
            ')' if !in_string && !in_symbol => depth -= 1,
            _ => {}
        }
    }
    depth
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn skip_ws(&mut self) {
        while let Some(c) = self.chars.get(self.pos) {
            if c.is_whitespace() {
                self.pos += 1;
            } else if *c == ';' {
                while self.chars.get(self.pos).is_some_and(|c| *c != '\n') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn sexp(&mut self) -> Result<Sexp, SolverError> {
        match self.chars.get(self.pos) {
            None => Err(SolverError::Parse("unexpected end of s-expression".into())),
            Some('(') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_ws();
                    match self.chars.get(self.pos) {
                        Some(')') => {
                            self.pos += 1;
                            return Ok(Sexp::List(items));
                        }
                        None => {
                            return Err(SolverError::Parse("unbalanced parentheses".into()));
                        }
                        Some(_) => items.push(self.sexp()?),
                    }
                }
            }
            Some(')') => Err(SolverError::Parse("unexpected ')'".into())),
            Some(_) => Ok(Sexp::Atom(self.atom()?)),
        }
    }

    fn atom(&mut self) -> Result<String, SolverError> {
        let start = self.pos;
        match self.chars.get(self.pos) {
            Some(&q @ ('|' | '"')) => {
                self.pos += 1;
                while let Some(&c) = self.chars.get(self.pos) {
                    self.pos += 1;
                    if c == q {
                        let inner: String = self.chars[start + 1..self.pos - 1].iter().collect();
                        return Ok(inner);
                    }
                }
                Err(SolverError::Parse("unterminated quoted atom".into()))
            }
            _ => {
                while let Some(c) = self.chars.get(self.pos) {
                    if c.is_whitespace() || *c == '(' || *c == ')' {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
        }
    }
}
