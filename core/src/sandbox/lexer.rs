//! Tokenizer for the sandbox dialect

use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    None,
    If,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// Statement separator; also emitted for `;`
    Newline,
}

pub(super) fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' | ';' => {
                chars.next();
                tokens.push(Token::Newline);
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' => push(&mut chars, &mut tokens, Token::LParen),
            ')' => push(&mut chars, &mut tokens, Token::RParen),
            '[' => push(&mut chars, &mut tokens, Token::LBracket),
            ']' => push(&mut chars, &mut tokens, Token::RBracket),
            '{' => push(&mut chars, &mut tokens, Token::LBrace),
            '}' => push(&mut chars, &mut tokens, Token::RBrace),
            ',' => push(&mut chars, &mut tokens, Token::Comma),
            ':' => push(&mut chars, &mut tokens, Token::Colon),
            '+' => push(&mut chars, &mut tokens, Token::Plus),
            '-' => push(&mut chars, &mut tokens, Token::Minus),
            '*' => push(&mut chars, &mut tokens, Token::Star),
            '/' => push(&mut chars, &mut tokens, Token::Slash),
            '%' => push(&mut chars, &mut tokens, Token::Percent),
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    return Err(SandboxError::Syntax("unexpected character '!'".to_string()));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(lex_string(&mut chars)?));
            }
            c if c.is_ascii_digit() => {
                tokens.push(lex_number(&mut chars)?);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(keyword_or_ident(name));
            }
            other => {
                return Err(SandboxError::Syntax(format!(
                    "unexpected character '{other}'"
                )));
            }
        }
    }
    Ok(tokens)
}

fn push(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    tokens: &mut Vec<Token>,
    token: Token,
) {
    chars.next();
    tokens.push(token);
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, SandboxError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(value),
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some(other) => {
                    return Err(SandboxError::Syntax(format!(
                        "unknown escape '\\{other}'"
                    )));
                }
                None => return Err(SandboxError::Syntax("unterminated string".to_string())),
            },
            Some(c) => value.push(c),
            None => return Err(SandboxError::Syntax("unterminated string".to_string())),
        }
    }
}

fn lex_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<Token, SandboxError> {
    let mut text = String::new();
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            chars.next();
        } else if c == '.' && !is_float {
            is_float = true;
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| SandboxError::Syntax(format!("invalid number '{text}'")))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| SandboxError::Syntax(format!("invalid number '{text}'")))
    }
}

fn keyword_or_ident(name: String) -> Token {
    match name.as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "none" => Token::None,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "in" => Token::In,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Ident(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_assignment() {
        let tokens = tokenize("x = 5").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Ident("x".to_string()), Token::Assign, Token::Int(5)]
        );
    }

    #[test]
    fn test_tokenize_operators_and_keywords() {
        let tokens = tokenize("while x <= 10 { }").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::While,
                Token::Ident("x".to_string()),
                Token::Le,
                Token::Int(10),
                Token::LBrace,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_tokenize_string_escapes() {
        let tokens = tokenize("\"a\\nb\"").unwrap();
        assert_eq!(tokens, vec![Token::Str("a\nb".to_string())]);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = tokenize("x = 1 # comment\ny = 2").unwrap();
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[3], Token::Newline);
    }

    #[test]
    fn test_unterminated_string_rejected() {
        assert!(tokenize("\"oops").is_err());
    }

    #[test]
    fn test_tokenize_map_literal() {
        let tokens = tokenize("{\"a\": 1}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LBrace,
                Token::Str("a".to_string()),
                Token::Colon,
                Token::Int(1),
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_loop_keywords() {
        let tokens = tokenize("break; continue").unwrap();
        assert_eq!(tokens, vec![Token::Break, Token::Newline, Token::Continue]);
    }

    #[test]
    fn test_floats() {
        let tokens = tokenize("3.25").unwrap();
        assert_eq!(tokens, vec![Token::Float(3.25)]);
    }
}
