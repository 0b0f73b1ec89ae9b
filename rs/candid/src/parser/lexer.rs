use super::ParseError;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    Ident(String),
    Text(String),
    Nat(u32),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Semi,
    Comma,
    Arrow,
    Equals,
    Dot,
    Mu,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(id) => write!(f, "'{}'", id),
            Token::Text(text) => write!(f, "{:?}", text),
            Token::Nat(n) => write!(f, "{}", n),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBrace => f.write_str("'{'"),
            Token::RBrace => f.write_str("'}'"),
            Token::Colon => f.write_str("':'"),
            Token::Semi => f.write_str("';'"),
            Token::Comma => f.write_str("','"),
            Token::Arrow => f.write_str("'->'"),
            Token::Equals => f.write_str("'='"),
            Token::Dot => f.write_str("'.'"),
            Token::Mu => f.write_str("'μ'"),
        }
    }
}

/// A token and the byte offset it starts at.
pub(crate) type Spanned = (Token, usize);

pub(crate) fn tokenize(text: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '/' if chars.peek().map(|(_, c)| *c) == Some('/') => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            '/' if chars.peek().map(|(_, c)| *c) == Some('*') => {
                chars.next();
                let mut previous = '\0';
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    previous = c;
                }
                if !closed {
                    return Err(ParseError::Unterminated {
                        what: "comment",
                        offset,
                    });
                }
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ':' => Token::Colon,
            ';' => Token::Semi,
            ',' => Token::Comma,
            '=' => Token::Equals,
            '.' => Token::Dot,
            'μ' => Token::Mu,
            '-' if chars.peek().map(|(_, c)| *c) == Some('>') => {
                chars.next();
                Token::Arrow
            }
            '"' => Token::Text(read_text(&mut chars, offset)?),
            c if c.is_ascii_digit() => {
                let mut literal = String::from(c);
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        literal.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Nat(parse_nat(&literal)?)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        ident.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(ident)
            }
            ch => return Err(ParseError::UnexpectedCharacter { ch, offset }),
        };
        tokens.push((token, offset));
    }
    Ok(tokens)
}

fn parse_nat(literal: &str) -> Result<u32, ParseError> {
    let digits = literal.replace('_', "");
    let parsed = match digits.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse::<u32>(),
    };
    parsed.map_err(|_| ParseError::InvalidNumber(literal.to_string()))
}

fn read_text<I>(chars: &mut std::iter::Peekable<I>, offset: usize) -> Result<String, ParseError>
where
    I: Iterator<Item = (usize, char)>,
{
    let unterminated = ParseError::Unterminated {
        what: "text literal",
        offset,
    };
    let mut text = String::new();
    loop {
        let (_, c) = chars.next().ok_or_else(|| unterminated.clone())?;
        match c {
            '"' => return Ok(text),
            '\\' => {
                let (escape_offset, escaped) = chars.next().ok_or_else(|| unterminated.clone())?;
                match escaped {
                    'n' => text.push('\n'),
                    'r' => text.push('\r'),
                    't' => text.push('\t'),
                    '\\' | '"' | '\'' => text.push(escaped),
                    'u' => {
                        if chars.next().map(|(_, c)| c) != Some('{') {
                            return Err(ParseError::InvalidEscape {
                                offset: escape_offset,
                            });
                        }
                        let mut hex = String::new();
                        loop {
                            match chars.next() {
                                Some((_, '}')) => break,
                                Some((_, c)) if c.is_ascii_hexdigit() || c == '_' => hex.push(c),
                                _ => {
                                    return Err(ParseError::InvalidEscape {
                                        offset: escape_offset,
                                    })
                                }
                            }
                        }
                        let ch = u32::from_str_radix(&hex.replace('_', ""), 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or(ParseError::InvalidEscape {
                                offset: escape_offset,
                            })?;
                        text.push(ch);
                    }
                    _ => {
                        return Err(ParseError::InvalidEscape {
                            offset: escape_offset,
                        })
                    }
                }
            }
            c => text.push(c),
        }
    }
}
