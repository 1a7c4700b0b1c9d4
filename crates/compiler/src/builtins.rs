//! Built-in method signatures
//!
//! The base package contributes the I/O buffer types and their methods plus
//! the universal `length()` accessor on slices and arrays. The resolver asks
//! this table the same questions it asks the user-defined function
//! environment.

use crate::ast::FuncEffect;
use crate::token::{bid_of, Bid, Id};
use crate::types::{MType, NumBase};

/// Signature of a built-in method.
pub struct MethodSig {
    pub effect: FuncEffect,
    /// Argument names and types, in declaration order.
    pub args: Vec<(&'static str, MType)>,
    /// `None` means the method returns nothing (`empty_struct`).
    pub ret: Option<MType>,
    /// Minimum `available()` the caller must have proven on the receiver.
    pub pre_available: Option<u64>,
}

impl MethodSig {
    fn pure(ret: MType) -> Self {
        MethodSig {
            effect: FuncEffect::Pure,
            args: Vec::new(),
            ret: Some(ret),
            pre_available: None,
        }
    }

    fn coroutine(args: Vec<(&'static str, MType)>, ret: Option<MType>) -> Self {
        MethodSig {
            effect: FuncEffect::Coroutine,
            args,
            ret,
            pre_available: None,
        }
    }
}

/// Look up a built-in method on a receiver type.
pub fn method_signature(recv: &MType, name: Id) -> Option<MethodSig> {
    match recv {
        MType::Slice(_) | MType::Array { .. } | MType::Table(_) => match bid_of(name)? {
            Bid::Length => Some(MethodSig::pure(MType::u64())),
            _ => None,
        },
        _ if recv.is_io_reader() => reader_method(name),
        _ if recv.is_io_writer() => writer_method(name),
        _ => None,
    }
}

fn reader_method(name: Id) -> Option<MethodSig> {
    match bid_of(name)? {
        Bid::ReadU8 => Some(MethodSig::coroutine(Vec::new(), Some(MType::u8()))),
        Bid::PeekU8 => Some(MethodSig {
            effect: FuncEffect::Pure,
            args: Vec::new(),
            ret: Some(MType::u8()),
            pre_available: Some(1),
        }),
        Bid::Skip => Some(MethodSig::coroutine(
            vec![("n", MType::u32())],
            None,
        )),
        Bid::Available => Some(MethodSig::pure(MType::u64())),
        Bid::Mark => Some(MethodSig {
            effect: FuncEffect::Impure,
            args: Vec::new(),
            ret: None,
            pre_available: None,
        }),
        Bid::SinceMark => Some(MethodSig::pure(MType::Slice(Box::new(MType::u8())))),
        _ => None,
    }
}

fn writer_method(name: Id) -> Option<MethodSig> {
    match bid_of(name)? {
        Bid::WriteU8 => Some(MethodSig::coroutine(
            vec![("a", MType::numeric(NumBase::U8))],
            None,
        )),
        Bid::Available => Some(MethodSig::pure(MType::u64())),
        Bid::Mark => Some(MethodSig {
            effect: FuncEffect::Impure,
            args: Vec::new(),
            ret: None,
            pre_available: None,
        }),
        Bid::SinceMark => Some(MethodSig::pure(MType::Slice(Box::new(MType::u8())))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::QQId;

    fn io_reader() -> MType {
        MType::Struct(QQId::new(
            Bid::Base.into(),
            Bid::Base.into(),
            Bid::IoReader.into(),
        ))
    }

    #[test]
    fn test_reader_read_u8_is_coroutine() {
        let sig = method_signature(&io_reader(), Bid::ReadU8.into()).expect("read_u8");
        assert_eq!(sig.effect, FuncEffect::Coroutine);
        assert_eq!(sig.ret, Some(MType::u8()));
    }

    #[test]
    fn test_reader_peek_u8_requires_available() {
        let sig = method_signature(&io_reader(), Bid::PeekU8.into()).expect("peek_u8");
        assert_eq!(sig.effect, FuncEffect::Pure);
        assert_eq!(sig.pre_available, Some(1));
    }

    #[test]
    fn test_slice_length() {
        let s = MType::Slice(Box::new(MType::u8()));
        let sig = method_signature(&s, Bid::Length.into()).expect("length");
        assert_eq!(sig.ret, Some(MType::u64()));
        assert!(sig.args.is_empty());
    }

    #[test]
    fn test_unknown_method() {
        let s = MType::Slice(Box::new(MType::u8()));
        assert!(method_signature(&s, Bid::ReadU8.into()).is_none());
        assert!(method_signature(&MType::Bool, Bid::Length.into()).is_none());
    }
}
