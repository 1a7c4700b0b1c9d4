//! Tokenizer for Sift source
//!
//! Produces a flat token stream with every spelling interned into the
//! driver's [`IdMap`]. Semicolons are optional Go-style: a newline after a
//! token that can end a statement inserts an implicit `;`.

use crate::token::{Bid, IdMap, Token};

/// Tokenize `source`, interning spellings into `idmap`.
pub fn tokenize(source: &str, idmap: &mut IdMap) -> Result<Vec<Token>, String> {
    let mut tokens: Vec<Token> = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0usize;
    let mut line = 0u32;
    let mut col = 0u32;

    macro_rules! push_op {
        ($bid:expr, $len:expr) => {{
            tokens.push(Token::new($bid.into(), line, col));
            i += $len;
            col += $len as u32;
        }};
    }

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\n' => {
                if wants_semicolon(tokens.last(), idmap) {
                    tokens.push(Token::new(Bid::Semicolon.into(), line, col));
                }
                i += 1;
                line += 1;
                col = 0;
            }
            b' ' | b'\t' | b'\r' => {
                i += 1;
                col += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                // Leave the newline for the arm above.
            }
            b'"' => {
                let start = i;
                let start_col = col;
                i += 1;
                col += 1;
                while i < bytes.len() && bytes[i] != b'"' && bytes[i] != b'\n' {
                    i += 1;
                    col += 1;
                }
                if i >= bytes.len() || bytes[i] != b'"' {
                    return Err(format!(
                        "{}:{}: syntax: unclosed string literal",
                        line + 1,
                        start_col + 1
                    ));
                }
                i += 1;
                col += 1;
                let text = &source[start..i];
                let id = idmap.intern(text);
                tokens.push(Token::new(id, line, start_col));
            }
            b'0'..=b'9' => {
                let start = i;
                let start_col = col;
                if c == b'0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
                    i += 2;
                    col += 2;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_hexdigit() || bytes[i] == b'_')
                    {
                        i += 1;
                        col += 1;
                    }
                } else {
                    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
                        i += 1;
                        col += 1;
                    }
                }
                let text = &source[start..i];
                let id = idmap.intern(text);
                tokens.push(Token::new(id, line, start_col));
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let start = i;
                let start_col = col;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                    col += 1;
                }
                let text = &source[start..i];
                let id = idmap.intern(text);
                tokens.push(Token::new(id, line, start_col));
            }
            b'~' => {
                // Tilde operator family: ~mod+ ~mod- ~sat+ ~sat- and their
                // assignment forms.
                let rest = &source[i..];
                let (bid, len) = if let Some(r) = rest.strip_prefix("~mod+") {
                    if r.starts_with('=') {
                        (Bid::TildeModPlusEq, 6)
                    } else {
                        (Bid::TildeModPlus, 5)
                    }
                } else if let Some(r) = rest.strip_prefix("~mod-") {
                    if r.starts_with('=') {
                        (Bid::TildeModMinusEq, 6)
                    } else {
                        (Bid::TildeModMinus, 5)
                    }
                } else if let Some(r) = rest.strip_prefix("~sat+") {
                    if r.starts_with('=') {
                        (Bid::TildeSatPlusEq, 6)
                    } else {
                        (Bid::TildeSatPlus, 5)
                    }
                } else if let Some(r) = rest.strip_prefix("~sat-") {
                    if r.starts_with('=') {
                        (Bid::TildeSatMinusEq, 6)
                    } else {
                        (Bid::TildeSatMinus, 5)
                    }
                } else {
                    return Err(format!(
                        "{}:{}: syntax: unknown operator starting with '~'",
                        line + 1,
                        col + 1
                    ));
                };
                push_op!(bid, len);
            }
            b'.' => {
                if bytes.get(i + 1) == Some(&b'.') {
                    if bytes.get(i + 2) == Some(&b'=') {
                        push_op!(Bid::DotDotEq, 3);
                    } else {
                        push_op!(Bid::DotDot, 2);
                    }
                } else {
                    push_op!(Bid::Dot, 1);
                }
            }
            b'<' => match bytes.get(i + 1) {
                Some(&b'<') => {
                    if bytes.get(i + 2) == Some(&b'=') {
                        push_op!(Bid::ShlEq, 3);
                    } else {
                        push_op!(Bid::Shl, 2);
                    }
                }
                Some(&b'=') => push_op!(Bid::LtEq, 2),
                _ => push_op!(Bid::Lt, 1),
            },
            b'>' => match bytes.get(i + 1) {
                Some(&b'>') => {
                    if bytes.get(i + 2) == Some(&b'=') {
                        push_op!(Bid::ShrEq, 3);
                    } else {
                        push_op!(Bid::Shr, 2);
                    }
                }
                Some(&b'=') => push_op!(Bid::GtEq, 2),
                _ => push_op!(Bid::Gt, 1),
            },
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::EqEq, 2);
                } else {
                    push_op!(Bid::Eq, 1);
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::NotEq, 2);
                } else {
                    push_op!(Bid::Exclam, 1);
                }
            }
            b'+' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::PlusEq, 2);
                } else {
                    push_op!(Bid::Plus, 1);
                }
            }
            b'-' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::MinusEq, 2);
                } else {
                    push_op!(Bid::Minus, 1);
                }
            }
            b'*' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::StarEq, 2);
                } else {
                    push_op!(Bid::Star, 1);
                }
            }
            b'/' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::SlashEq, 2);
                } else {
                    push_op!(Bid::SlashOp, 1);
                }
            }
            b'%' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::PercentEq, 2);
                } else {
                    push_op!(Bid::Percent, 1);
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::AmpEq, 2);
                } else {
                    push_op!(Bid::Amp, 1);
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::PipeEq, 2);
                } else {
                    push_op!(Bid::Pipe, 1);
                }
            }
            b'^' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    push_op!(Bid::CaretEq, 2);
                } else {
                    push_op!(Bid::Caret, 1);
                }
            }
            b'(' => push_op!(Bid::OpenParen, 1),
            b')' => push_op!(Bid::CloseParen, 1),
            b'[' => push_op!(Bid::OpenBracket, 1),
            b']' => push_op!(Bid::CloseBracket, 1),
            b'{' => push_op!(Bid::OpenBrace, 1),
            b'}' => push_op!(Bid::CloseBrace, 1),
            b',' => push_op!(Bid::Comma, 1),
            b':' => push_op!(Bid::Colon, 1),
            b';' => push_op!(Bid::Semicolon, 1),
            b'?' => push_op!(Bid::Question, 1),
            _ => {
                return Err(format!(
                    "{}:{}: syntax: unexpected character {:?}",
                    line + 1,
                    col + 1,
                    c as char
                ));
            }
        }
    }
    if wants_semicolon(tokens.last(), idmap) {
        tokens.push(Token::new(Bid::Semicolon.into(), line, col));
    }
    Ok(tokens)
}

/// Does a newline after `last` terminate a statement?
fn wants_semicolon(last: Option<&Token>, idmap: &IdMap) -> bool {
    let Some(tok) = last else {
        return false;
    };
    match crate::token::bid_of(tok.id) {
        Some(
            Bid::CloseParen
            | Bid::CloseBracket
            | Bid::CloseBrace
            | Bid::Return
            | Bid::Break
            | Bid::Continue
            | Bid::True
            | Bid::False
            | Bid::Ok
            | Bid::This
            | Bid::Bool
            | Bid::Status
            | Bid::I8
            | Bid::I16
            | Bid::I32
            | Bid::I64
            | Bid::U8
            | Bid::U16
            | Bid::U32
            | Bid::U64
            | Bid::EmptyStruct
            | Bid::IoReader
            | Bid::IoWriter,
        ) => true,
        Some(_) => false,
        // User identifiers and literals end statements.
        None => !idmap.str(tok.id).is_empty(),
    }
}

/// True if the token spells an integer literal.
pub fn is_int_literal(tok: Token, idmap: &IdMap) -> bool {
    idmap
        .str(tok.id)
        .as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_digit())
}

/// True if the token spells a string literal (quotes included).
pub fn is_str_literal(tok: Token, idmap: &IdMap) -> bool {
    idmap.str(tok.id).starts_with('"')
}

/// Parse the integer value of a literal token's spelling.
pub fn int_value(text: &str) -> Result<i128, String> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let parsed = if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        i128::from_str_radix(hex, 16)
    } else {
        cleaned.parse::<i128>()
    };
    parsed.map_err(|_| format!("invalid integer literal {:?}", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Id;

    fn lex(src: &str) -> (Vec<Token>, IdMap) {
        let mut idmap = IdMap::new();
        let tokens = tokenize(src, &mut idmap).expect("tokenize");
        (tokens, idmap)
    }

    fn ids(tokens: &[Token]) -> Vec<Id> {
        tokens.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        let (tokens, idmap) = lex("func decode");
        assert_eq!(tokens[0].id, Bid::Func.into());
        assert_eq!(idmap.str(tokens[1].id), "decode");
        assert!(!tokens[1].id.is_built_in());
    }

    #[test]
    fn test_tilde_operators() {
        let (tokens, _) = lex("x ~mod+= 1");
        assert_eq!(tokens[1].id, Bid::TildeModPlusEq.into());
        let (tokens, _) = lex("a ~sat+ b");
        assert_eq!(tokens[1].id, Bid::TildeSatPlus.into());
    }

    #[test]
    fn test_range_operators() {
        let (tokens, _) = lex("[0 ..= 100]");
        assert_eq!(
            ids(&tokens),
            vec![
                Bid::OpenBracket.into(),
                // "0" is a fresh literal id
                tokens[1].id,
                Bid::DotDotEq.into(),
                tokens[3].id,
                Bid::CloseBracket.into(),
                Bid::Semicolon.into(),
            ]
        );
    }

    #[test]
    fn test_hex_literals() {
        let (tokens, idmap) = lex("0xFFFF_FFF5");
        assert!(is_int_literal(tokens[0], &idmap));
        assert_eq!(int_value(idmap.str(tokens[0].id)).unwrap(), 0xFFFF_FFF5);
    }

    #[test]
    fn test_string_literal_keeps_quotes() {
        let (tokens, idmap) = lex("\"?bad magic\"");
        assert!(is_str_literal(tokens[0], &idmap));
        assert_eq!(idmap.str(tokens[0].id), "\"?bad magic\"");
    }

    #[test]
    fn test_unclosed_string() {
        let mut idmap = IdMap::new();
        let err = tokenize("\"oops", &mut idmap).unwrap_err();
        assert!(err.contains("unclosed string"));
    }

    #[test]
    fn test_semicolon_insertion() {
        let (tokens, _) = lex("x = 1\ny = 2");
        let semis = tokens
            .iter()
            .filter(|t| t.is(Bid::Semicolon))
            .count();
        assert_eq!(semis, 2);
    }

    #[test]
    fn test_no_semicolon_after_comma_or_operator() {
        let (tokens, _) = lex("while x < 10,\n    inv x >= 0\n{");
        // The comma line must not get an implicit semicolon.
        let after_comma = tokens
            .iter()
            .position(|t| t.is(Bid::Comma))
            .map(|p| tokens[p + 1]);
        assert!(after_comma.is_some_and(|t| t.is(Bid::Inv)));
    }

    #[test]
    fn test_comments_are_skipped() {
        let (tokens, _) = lex("x // trailing comment\ny");
        // x ; y ;
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_column_tracking() {
        let (tokens, _) = lex("ab cd");
        assert_eq!(tokens[0].col, 0);
        assert_eq!(tokens[1].col, 3);
    }
}
