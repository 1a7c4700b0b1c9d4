//! Token and identifier tables for Sift
//!
//! Every name in a Sift program (keywords, operators, type names, user
//! identifiers, even the raw spellings of literals) is interned into a
//! process-local [`IdMap`] and referred to by a 32-bit [`Id`] from then on.
//! Built-ins occupy a fixed low range so later passes can match on `Bid`
//! constants without string comparisons.
//!
//! The table is single-writer during lexing and read-only afterwards: the
//! driver owns the `IdMap`, the lexer interns into it, and every later pass
//! receives a shared reference.

use std::collections::HashMap;

/// Opaque interned identifier. Comparable for equality in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id(pub u32);

impl Id {
    /// The invalid/absent identifier.
    pub const NONE: Id = Id(0);

    /// True if this id is in the fixed built-in range.
    pub fn is_built_in(self) -> bool {
        (self.0 as usize) < BUILT_IN_COUNT
    }

    /// True if this id equals the given built-in.
    pub fn is(self, b: Bid) -> bool {
        self.0 == b as u32
    }
}

impl From<Bid> for Id {
    fn from(b: Bid) -> Id {
        Id(b as u32)
    }
}

/// Qualified name: `(package, receiver, leaf)`.
///
/// Free and built-in names use [`Bid::Base`]'s id as the receiver; names in
/// the current package use `Id::NONE` as the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QQId {
    pub package: Id,
    pub receiver: Id,
    pub leaf: Id,
}

impl QQId {
    pub fn new(package: Id, receiver: Id, leaf: Id) -> Self {
        QQId {
            package,
            receiver,
            leaf,
        }
    }

    /// A free name in the current package (no receiver).
    pub fn free(leaf: Id) -> Self {
        QQId {
            package: Id::NONE,
            receiver: Bid::Base.into(),
            leaf,
        }
    }
}

/// Built-in identifiers. Discriminants are the interned ids, so the lexer
/// and checker can convert between `Bid` and `Id` without lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Bid {
    Invalid = 0,

    // Keywords
    And,
    As,
    Assert,
    Base,
    Bool,
    Break,
    Choose,
    Const,
    Continue,
    Else,
    False,
    Func,
    If,
    Inv,
    IoBind,
    Iterate,
    Nptr,
    Not,
    Ok,
    Or,
    Post,
    Pre,
    Pri,
    Ptr,
    Pub,
    Return,
    Slice,
    Status,
    Struct,
    Table,
    This,
    True,
    Use,
    Var,
    Via,
    While,
    Yield,

    // Numeric type names
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,

    // Built-in type and method names
    EmptyStruct,
    IoReader,
    IoWriter,
    Length,
    Available,
    ReadU8,
    PeekU8,
    WriteU8,
    Skip,
    Mark,
    SinceMark,
    Initialize,
    CpuArch,

    // Binary operators
    Plus,
    Minus,
    Star,
    SlashOp,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    TildeModPlus,
    TildeModMinus,
    TildeSatPlus,
    TildeSatMinus,

    // Assignment operators
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    TildeModPlusEq,
    TildeModMinusEq,
    TildeSatPlusEq,
    TildeSatMinusEq,

    // Punctuation
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Dot,
    DotDot,
    DotDotEq,
    Colon,
    Semicolon,
    Question,
    Exclam,
}

/// Spellings for the built-in range, indexed by discriminant.
const BUILT_IN_NAMES: &[(Bid, &str)] = &[
    (Bid::Invalid, ""),
    (Bid::And, "and"),
    (Bid::As, "as"),
    (Bid::Assert, "assert"),
    (Bid::Base, "base"),
    (Bid::Bool, "bool"),
    (Bid::Break, "break"),
    (Bid::Choose, "choose"),
    (Bid::Const, "const"),
    (Bid::Continue, "continue"),
    (Bid::Else, "else"),
    (Bid::False, "false"),
    (Bid::Func, "func"),
    (Bid::If, "if"),
    (Bid::Inv, "inv"),
    (Bid::IoBind, "io_bind"),
    (Bid::Iterate, "iterate"),
    (Bid::Nptr, "nptr"),
    (Bid::Not, "not"),
    (Bid::Ok, "ok"),
    (Bid::Or, "or"),
    (Bid::Post, "post"),
    (Bid::Pre, "pre"),
    (Bid::Pri, "pri"),
    (Bid::Ptr, "ptr"),
    (Bid::Pub, "pub"),
    (Bid::Return, "return"),
    (Bid::Slice, "slice"),
    (Bid::Status, "status"),
    (Bid::Struct, "struct"),
    (Bid::Table, "table"),
    (Bid::This, "this"),
    (Bid::True, "true"),
    (Bid::Use, "use"),
    (Bid::Var, "var"),
    (Bid::Via, "via"),
    (Bid::While, "while"),
    (Bid::Yield, "yield"),
    (Bid::I8, "i8"),
    (Bid::I16, "i16"),
    (Bid::I32, "i32"),
    (Bid::I64, "i64"),
    (Bid::U8, "u8"),
    (Bid::U16, "u16"),
    (Bid::U32, "u32"),
    (Bid::U64, "u64"),
    (Bid::EmptyStruct, "empty_struct"),
    (Bid::IoReader, "io_reader"),
    (Bid::IoWriter, "io_writer"),
    (Bid::Length, "length"),
    (Bid::Available, "available"),
    (Bid::ReadU8, "read_u8"),
    (Bid::PeekU8, "peek_u8"),
    (Bid::WriteU8, "write_u8"),
    (Bid::Skip, "skip"),
    (Bid::Mark, "mark"),
    (Bid::SinceMark, "since_mark"),
    (Bid::Initialize, "initialize"),
    (Bid::CpuArch, "cpu_arch"),
    (Bid::Plus, "+"),
    (Bid::Minus, "-"),
    (Bid::Star, "*"),
    (Bid::SlashOp, "/"),
    (Bid::Percent, "%"),
    (Bid::Amp, "&"),
    (Bid::Pipe, "|"),
    (Bid::Caret, "^"),
    (Bid::Shl, "<<"),
    (Bid::Shr, ">>"),
    (Bid::EqEq, "=="),
    (Bid::NotEq, "!="),
    (Bid::Lt, "<"),
    (Bid::LtEq, "<="),
    (Bid::Gt, ">"),
    (Bid::GtEq, ">="),
    (Bid::TildeModPlus, "~mod+"),
    (Bid::TildeModMinus, "~mod-"),
    (Bid::TildeSatPlus, "~sat+"),
    (Bid::TildeSatMinus, "~sat-"),
    (Bid::Eq, "="),
    (Bid::PlusEq, "+="),
    (Bid::MinusEq, "-="),
    (Bid::StarEq, "*="),
    (Bid::SlashEq, "/="),
    (Bid::PercentEq, "%="),
    (Bid::AmpEq, "&="),
    (Bid::PipeEq, "|="),
    (Bid::CaretEq, "^="),
    (Bid::ShlEq, "<<="),
    (Bid::ShrEq, ">>="),
    (Bid::TildeModPlusEq, "~mod+="),
    (Bid::TildeModMinusEq, "~mod-="),
    (Bid::TildeSatPlusEq, "~sat+="),
    (Bid::TildeSatMinusEq, "~sat-="),
    (Bid::OpenParen, "("),
    (Bid::CloseParen, ")"),
    (Bid::OpenBracket, "["),
    (Bid::CloseBracket, "]"),
    (Bid::OpenBrace, "{"),
    (Bid::CloseBrace, "}"),
    (Bid::Comma, ","),
    (Bid::Dot, "."),
    (Bid::DotDot, ".."),
    (Bid::DotDotEq, "..="),
    (Bid::Colon, ":"),
    (Bid::Semicolon, ";"),
    (Bid::Question, "?"),
    (Bid::Exclam, "!"),
];

/// Number of built-in ids (the fixed low range).
pub const BUILT_IN_COUNT: usize = BUILT_IN_NAMES.len();

impl Bid {
    /// The interned spelling of this built-in.
    pub fn name(self) -> &'static str {
        BUILT_IN_NAMES[self as usize].1
    }
}

/// Interning table mapping spellings to [`Id`]s and back.
#[derive(Debug)]
pub struct IdMap {
    names: Vec<String>,
    by_name: HashMap<String, Id>,
}

impl IdMap {
    /// Create a table seeded with the built-in range.
    pub fn new() -> Self {
        let mut map = IdMap {
            names: Vec::with_capacity(BUILT_IN_COUNT * 2),
            by_name: HashMap::with_capacity(BUILT_IN_COUNT * 2),
        };
        for (i, &(bid, name)) in BUILT_IN_NAMES.iter().enumerate() {
            // The discriminant doubles as the table index. A mismatch here is
            // a broken table, which is a compiler bug, not a user error.
            assert_eq!(
                bid as usize, i,
                "duplicate or misordered built-in identifier {:?}",
                bid
            );
            map.names.push(name.to_string());
            if !name.is_empty() {
                let prev = map.by_name.insert(name.to_string(), Id(i as u32));
                assert!(prev.is_none(), "duplicate built-in identifier {:?}", name);
            }
        }
        map
    }

    /// Intern a spelling, returning its id. Idempotent.
    pub fn intern(&mut self, name: &str) -> Id {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = Id(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Look up an already-interned spelling.
    pub fn get(&self, name: &str) -> Option<Id> {
        self.by_name.get(name).copied()
    }

    /// The spelling of an id.
    pub fn str(&self, id: Id) -> &str {
        self.names
            .get(id.0 as usize)
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

impl Default for IdMap {
    fn default() -> Self {
        Self::new()
    }
}

/// True for the ids of the eight integer base type names.
pub fn is_numeric_type_name(id: Id) -> bool {
    matches!(
        bid_of(id),
        Some(
            Bid::I8 | Bid::I16 | Bid::I32 | Bid::I64 | Bid::U8 | Bid::U16 | Bid::U32 | Bid::U64
        )
    )
}

/// Recover the `Bid` for an id in the built-in range.
pub fn bid_of(id: Id) -> Option<Bid> {
    if !id.is_built_in() {
        return None;
    }
    Some(BUILT_IN_NAMES[id.0 as usize].0)
}

/// A lexed token: the interned id of its spelling plus its position.
///
/// Literals are interned like everything else; the parser recovers the
/// spelling through the `IdMap` and parses the value. String literals keep
/// their surrounding quotes in the interned spelling so they can never
/// collide with identifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub id: Id,
    /// Line number (0-indexed).
    pub line: u32,
    /// Column number (0-indexed).
    pub col: u32,
}

impl Token {
    pub fn new(id: Id, line: u32, col: u32) -> Self {
        Token { id, line, col }
    }

    pub fn is(&self, b: Bid) -> bool {
        self.id.is(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_table_is_consistent() {
        // Constructing the map asserts the discriminant/index correspondence.
        let map = IdMap::new();
        assert_eq!(map.get("while"), Some(Bid::While.into()));
        assert_eq!(map.get("~mod+"), Some(Bid::TildeModPlus.into()));
        assert_eq!(map.str(Bid::U32.into()), "u32");
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut map = IdMap::new();
        let a = map.intern("decode_frame");
        let b = map.intern("decode_frame");
        assert_eq!(a, b);
        assert!(!a.is_built_in());
        assert_eq!(map.str(a), "decode_frame");
    }

    #[test]
    fn test_intern_built_in_returns_fixed_id() {
        let mut map = IdMap::new();
        assert_eq!(map.intern("assert"), Bid::Assert.into());
        assert_eq!(map.intern("u8"), Bid::U8.into());
    }

    #[test]
    fn test_numeric_type_names() {
        assert!(is_numeric_type_name(Bid::U64.into()));
        assert!(is_numeric_type_name(Bid::I8.into()));
        assert!(!is_numeric_type_name(Bid::Bool.into()));
        assert!(!is_numeric_type_name(Id(100_000)));
    }

    #[test]
    fn test_qqid_free() {
        let q = QQId::free(Id(500));
        assert_eq!(q.package, Id::NONE);
        assert_eq!(q.receiver, Bid::Base.into());
        assert_eq!(q.leaf, Id(500));
    }
}
