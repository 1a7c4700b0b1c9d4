//! Type system for Sift
//!
//! Every typed expression carries an [`MType`]. Numeric types may carry a
//! refinement interval narrowing the base range; the checker uses these
//! intervals as the static half of its proof obligations.

use crate::interval::Interval;
use crate::token::{Bid, Id, IdMap, QQId};
use std::fmt;

/// The eight integer base widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumBase {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl NumBase {
    pub fn from_id(id: Id) -> Option<NumBase> {
        match crate::token::bid_of(id)? {
            Bid::I8 => Some(NumBase::I8),
            Bid::I16 => Some(NumBase::I16),
            Bid::I32 => Some(NumBase::I32),
            Bid::I64 => Some(NumBase::I64),
            Bid::U8 => Some(NumBase::U8),
            Bid::U16 => Some(NumBase::U16),
            Bid::U32 => Some(NumBase::U32),
            Bid::U64 => Some(NumBase::U64),
            _ => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, NumBase::I8 | NumBase::I16 | NumBase::I32 | NumBase::I64)
    }

    pub fn bits(self) -> u32 {
        match self {
            NumBase::I8 | NumBase::U8 => 8,
            NumBase::I16 | NumBase::U16 => 16,
            NumBase::I32 | NumBase::U32 => 32,
            NumBase::I64 | NumBase::U64 => 64,
        }
    }

    pub fn min_value(self) -> i128 {
        if self.is_signed() {
            -(1i128 << (self.bits() - 1))
        } else {
            0
        }
    }

    pub fn max_value(self) -> i128 {
        if self.is_signed() {
            (1i128 << (self.bits() - 1)) - 1
        } else {
            (1i128 << self.bits()) - 1
        }
    }

    /// The natural range of the base as an interval.
    pub fn range(self) -> Interval {
        Interval::closed(self.min_value(), self.max_value())
    }

    /// The wider of two bases; `None` when signedness differs.
    pub fn widest(self, other: NumBase) -> Option<NumBase> {
        if self.is_signed() != other.is_signed() {
            return None;
        }
        Some(if self.bits() >= other.bits() { self } else { other })
    }

    pub fn name(self) -> &'static str {
        match self {
            NumBase::I8 => "i8",
            NumBase::I16 => "i16",
            NumBase::I32 => "i32",
            NumBase::I64 => "i64",
            NumBase::U8 => "u8",
            NumBase::U16 => "u16",
            NumBase::U32 => "u32",
            NumBase::U64 => "u64",
        }
    }

    /// The C spelling used by the generator.
    pub fn c_name(self) -> &'static str {
        match self {
            NumBase::I8 => "int8_t",
            NumBase::I16 => "int16_t",
            NumBase::I32 => "int32_t",
            NumBase::I64 => "int64_t",
            NumBase::U8 => "uint8_t",
            NumBase::U16 => "uint16_t",
            NumBase::U32 => "uint32_t",
            NumBase::U64 => "uint64_t",
        }
    }
}

/// Status kind, encoded in the first byte of the status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// `$` prefix: the coroutine suspended and may be resumed.
    Suspension,
    /// `?` prefix: fatal; the receiver becomes disabled.
    Error,
    /// `#` prefix: non-fatal out-of-band result.
    Note,
    /// `@` prefix: other.
    Other,
}

impl StatusKind {
    pub fn from_message(msg: &str) -> Option<StatusKind> {
        match msg.as_bytes().first() {
            Some(b'$') => Some(StatusKind::Suspension),
            Some(b'?') => Some(StatusKind::Error),
            Some(b'#') => Some(StatusKind::Note),
            Some(b'@') => Some(StatusKind::Other),
            _ => None,
        }
    }
}

/// The type of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MType {
    /// Integer base, optionally narrowed to a refinement interval.
    /// Invariant: a present refinement is non-empty and a subset of the
    /// base's natural range.
    Numeric {
        base: NumBase,
        refinement: Option<Interval>,
    },
    Bool,
    EmptyStruct,
    /// `[N] T`, fixed length known at compile time.
    Array { len: u64, elem: Box<MType> },
    /// `slice T`, runtime length.
    Slice(Box<MType>),
    /// `table T`, 2-D with width/height/stride at runtime.
    Table(Box<MType>),
    /// `ptr T`, non-null.
    Ptr(Box<MType>),
    /// `nptr T`, nullable.
    Nptr(Box<MType>),
    Status,
    /// Reference to a function (used by `choose` fields).
    Func(QQId),
    /// A user struct or built-in struct (`base.io_reader` etc.).
    Struct(QQId),
}

impl MType {
    /// Unrefined numeric type.
    pub fn numeric(base: NumBase) -> MType {
        MType::Numeric {
            base,
            refinement: None,
        }
    }

    /// Refined numeric type. The refinement must be a non-empty subset of
    /// the base's range; callers enforce this before construction.
    pub fn refined(base: NumBase, refinement: Interval) -> MType {
        MType::Numeric {
            base,
            refinement: Some(refinement),
        }
    }

    pub fn u8() -> MType {
        MType::numeric(NumBase::U8)
    }

    pub fn u32() -> MType {
        MType::numeric(NumBase::U32)
    }

    pub fn u64() -> MType {
        MType::numeric(NumBase::U64)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, MType::Numeric { .. })
    }

    pub fn num_base(&self) -> Option<NumBase> {
        match self {
            MType::Numeric { base, .. } => Some(*base),
            _ => None,
        }
    }

    /// The value envelope of this type: the refinement if present, else the
    /// base's natural range. Non-numeric types have no envelope.
    pub fn envelope(&self) -> Option<Interval> {
        match self {
            MType::Numeric { base, refinement } => {
                Some(refinement.unwrap_or_else(|| base.range()))
            }
            _ => None,
        }
    }

    /// Element type of a directly indexable container. Tables are 2-D and
    /// are only reachable through their row accessors, so they are excluded.
    pub fn elem(&self) -> Option<&MType> {
        match self {
            MType::Array { elem, .. } => Some(elem),
            MType::Slice(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn is_io_reader(&self) -> bool {
        matches!(self, MType::Struct(q) if q.leaf.is(Bid::IoReader))
    }

    pub fn is_io_writer(&self) -> bool {
        matches!(self, MType::Struct(q) if q.leaf.is(Bid::IoWriter))
    }

    /// Render for diagnostics.
    pub fn display<'a>(&'a self, idmap: &'a IdMap) -> MTypeDisplay<'a> {
        MTypeDisplay { ty: self, idmap }
    }
}

/// Borrowing display adapter; struct and func names need the id table.
pub struct MTypeDisplay<'a> {
    ty: &'a MType,
    idmap: &'a IdMap,
}

impl fmt::Display for MTypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            MType::Numeric { base, refinement } => match refinement {
                None => write!(f, "base.{}", base.name()),
                Some(iv) => write!(f, "base.{}[{}]", base.name(), iv),
            },
            MType::Bool => write!(f, "base.bool"),
            MType::EmptyStruct => write!(f, "base.empty_struct"),
            MType::Array { len, elem } => {
                write!(f, "[{}] {}", len, elem.display(self.idmap))
            }
            MType::Slice(elem) => write!(f, "slice {}", elem.display(self.idmap)),
            MType::Table(elem) => write!(f, "table {}", elem.display(self.idmap)),
            MType::Ptr(t) => write!(f, "ptr {}", t.display(self.idmap)),
            MType::Nptr(t) => write!(f, "nptr {}", t.display(self.idmap)),
            MType::Status => write!(f, "base.status"),
            MType::Func(q) => write!(f, "func {}", self.idmap.str(q.leaf)),
            MType::Struct(q) => {
                if q.package != Id::NONE {
                    write!(f, "{}.{}", self.idmap.str(q.package), self.idmap.str(q.leaf))
                } else {
                    write!(f, "{}", self.idmap.str(q.leaf))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_ranges() {
        assert_eq!(NumBase::U8.min_value(), 0);
        assert_eq!(NumBase::U8.max_value(), 255);
        assert_eq!(NumBase::I8.min_value(), -128);
        assert_eq!(NumBase::I8.max_value(), 127);
        assert_eq!(NumBase::U64.max_value(), u64::MAX as i128);
        assert_eq!(NumBase::I64.min_value(), i64::MIN as i128);
    }

    #[test]
    fn test_widest() {
        assert_eq!(NumBase::U8.widest(NumBase::U32), Some(NumBase::U32));
        assert_eq!(NumBase::I64.widest(NumBase::I16), Some(NumBase::I64));
        assert_eq!(NumBase::U8.widest(NumBase::I8), None);
    }

    #[test]
    fn test_envelope_prefers_refinement() {
        let t = MType::refined(NumBase::U32, Interval::closed(0, 100));
        assert_eq!(t.envelope(), Some(Interval::closed(0, 100)));
        let u = MType::u32();
        assert_eq!(u.envelope(), Some(NumBase::U32.range()));
        assert_eq!(MType::Bool.envelope(), None);
    }

    #[test]
    fn test_status_kind() {
        assert_eq!(
            StatusKind::from_message("$short read"),
            Some(StatusKind::Suspension)
        );
        assert_eq!(StatusKind::from_message("?bad magic"), Some(StatusKind::Error));
        assert_eq!(StatusKind::from_message("#end of data"), Some(StatusKind::Note));
        assert_eq!(StatusKind::from_message("@metadata"), Some(StatusKind::Other));
        assert_eq!(StatusKind::from_message("plain"), None);
    }

    #[test]
    fn test_display() {
        let idmap = IdMap::new();
        let t = MType::refined(NumBase::U32, Interval::closed(0, 100));
        assert_eq!(format!("{}", t.display(&idmap)), "base.u32[0 ..= 100]");
        let s = MType::Slice(Box::new(MType::u8()));
        assert_eq!(format!("{}", s.display(&idmap)), "slice base.u8");
    }
}
