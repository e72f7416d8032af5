// In-memory schema model: the declarative format tree the interpreter walks
//
// Produced by the loader (load.rs) from the textual schema document and
// checked by the validator (validate.rs). Type references stay textual;
// resolution happens at interpretation time against the lexical scope chain.

pub mod load;
pub mod validate;

use crate::expr::ast::Expr;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Byte order for multi-byte reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A whole schema: the root type definition.
#[derive(Debug)]
pub struct Schema {
    pub root: Rc<TypeSpec>,
}

/// One type definition: meta, ordered sequence, lazy instances, nested
/// types, enums, and parameters.
#[derive(Debug)]
pub struct TypeSpec {
    pub meta: Meta,
    pub params: Vec<ParamSpec>,
    pub seq: Vec<Rc<FieldSpec>>,
    /// Declaration order is preserved; serialization realizes in this order.
    pub instances: Vec<Rc<InstanceSpec>>,
    pub types: FxHashMap<String, Rc<TypeSpec>>,
    pub enums: FxHashMap<String, Rc<EnumSpec>>,
}

impl TypeSpec {
    pub fn instance(&self, name: &str) -> Option<&Rc<InstanceSpec>> {
        self.instances.iter().find(|i| i.id == name)
    }
}

#[derive(Debug, Default)]
pub struct Meta {
    pub id: Option<String>,
    pub endian: Option<EndianSpec>,
    pub encoding: Option<String>,
}

/// Default byte order: fixed, or chosen per parse by a switch expression.
#[derive(Debug)]
pub enum EndianSpec {
    Fixed(Endian),
    Switch {
        on: Expr,
        cases: FxHashMap<String, Endian>,
    },
}

#[derive(Debug)]
pub struct ParamSpec {
    pub id: String,
    pub ty: Option<String>,
}

/// One entry in a type's sequence.
#[derive(Debug, Default)]
pub struct FieldSpec {
    pub id: Option<String>,
    pub ty: Option<FieldType>,
    pub size: Option<Expr>,
    pub size_eos: bool,
    pub repeat: Option<Repeat>,
    pub cond: Option<Expr>,
    pub contents: Option<Vec<u8>>,
    pub encoding: Option<String>,
    pub terminator: Option<u8>,
    pub include: bool,
    pub consume: bool,
    pub eos_error: bool,
    pub enum_ref: Option<String>,
    pub pos: Option<Expr>,
    pub io: Option<Expr>,
    pub process: Option<String>,
    pub doc: Option<String>,
}

impl FieldSpec {
    pub fn new() -> Self {
        Self {
            consume: true,
            eos_error: true,
            ..Default::default()
        }
    }
}

/// An instance: a lazily evaluated named field. Either a pure value
/// expression, or a (possibly pos-anchored) read described by `field`.
#[derive(Debug)]
pub struct InstanceSpec {
    pub id: String,
    pub value: Option<Expr>,
    pub field: FieldSpec,
}

#[derive(Debug)]
pub enum Repeat {
    /// Fixed element count from an expression
    Count(Expr),
    /// Read until the expression over `_` turns truthy
    Until(Expr),
    /// Read until end of stream
    Eos,
}

/// A field's type reference.
#[derive(Debug)]
pub enum FieldType {
    Builtin(BuiltinType),
    User { name: String, args: Vec<Expr> },
    Switch(Box<SwitchType>),
}

/// Type chosen at parse time by evaluating a discriminant expression.
#[derive(Debug)]
pub struct SwitchType {
    pub on: Expr,
    pub cases: Vec<(String, FieldType)>,
    pub default: Option<FieldType>,
}

/// Enum table: integer values to symbolic names, in declaration order.
#[derive(Debug)]
pub struct EnumSpec {
    pub pairs: Vec<(i64, String)>,
}

impl EnumSpec {
    pub fn value_of(&self, member: &str) -> Option<i64> {
        self.pairs
            .iter()
            .find(|(_, name)| name == member)
            .map(|(v, _)| *v)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, name)| name.as_str())
    }
}

/// The closed set of built-in type names. Unsuffixed multi-byte names
/// inherit endianness from the enclosing meta at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinType {
    U1,
    S1,
    U2(Option<Endian>),
    U4(Option<Endian>),
    U8(Option<Endian>),
    S2(Option<Endian>),
    S4(Option<Endian>),
    S8(Option<Endian>),
    F4(Option<Endian>),
    F8(Option<Endian>),
    Str,
    StrZ,
}

impl BuiltinType {
    pub fn from_str(s: &str) -> Option<BuiltinType> {
        let (base, endian) = match s {
            "u1" => return Some(BuiltinType::U1),
            "s1" => return Some(BuiltinType::S1),
            "str" => return Some(BuiltinType::Str),
            "strz" => return Some(BuiltinType::StrZ),
            _ => {
                if let Some(base) = s.strip_suffix("le") {
                    (base, Some(Endian::Little))
                } else if let Some(base) = s.strip_suffix("be") {
                    (base, Some(Endian::Big))
                } else {
                    (s, None)
                }
            }
        };
        match base {
            "u2" => Some(BuiltinType::U2(endian)),
            "u4" => Some(BuiltinType::U4(endian)),
            "u8" => Some(BuiltinType::U8(endian)),
            "s2" => Some(BuiltinType::S2(endian)),
            "s4" => Some(BuiltinType::S4(endian)),
            "s8" => Some(BuiltinType::S8(endian)),
            "f4" => Some(BuiltinType::F4(endian)),
            "f8" => Some(BuiltinType::F8(endian)),
            _ => None,
        }
    }

    /// Fixed byte width, when the type has one.
    pub fn width(&self) -> Option<usize> {
        match self {
            BuiltinType::U1 | BuiltinType::S1 => Some(1),
            BuiltinType::U2(_) | BuiltinType::S2(_) => Some(2),
            BuiltinType::U4(_) | BuiltinType::S4(_) | BuiltinType::F4(_) => Some(4),
            BuiltinType::U8(_) | BuiltinType::S8(_) | BuiltinType::F8(_) => Some(8),
            BuiltinType::Str | BuiltinType::StrZ => None,
        }
    }
}
