// Runtime value tree produced by the interpreter
//
// Values are dynamically typed: integers (64-bit reads surface as big
// integers), floats, booleans, byte arrays, text, sequences, and objects.
// Objects keep fields in declaration order and carry lazily evaluated
// instance slots sharing the backing stream.

use crate::error::Error;
use crate::schema::{Endian, TypeSpec};
use crate::stream::ByteStream;
use num_bigint::BigInt;
use num_traits::cast::ToPrimitive;
use num_traits::Zero;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub type StreamRef = Rc<RefCell<ByteStream>>;
pub type ObjRef = Rc<RefCell<ObjectData>>;

/// A value in the result tree.
#[derive(Debug, Clone)]
pub enum Value {
    /// The nullish value: a skipped field or an unresolved identifier.
    Null,
    Int(i64),
    /// Full-range integer (u8/s8 reads and overflowing arithmetic).
    BigInt(BigInt),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Obj(ObjRef),
    /// The active stream, reachable through `_io` in expressions.
    Stream(StreamRef),
}

impl Value {
    pub fn big(v: impl Into<BigInt>) -> Value {
        Value::BigInt(v.into())
    }

    /// Wrap an unsigned 64-bit quantity, preferring the native arm.
    pub fn from_u64(v: u64) -> Value {
        match i64::try_from(v) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::BigInt(BigInt::from(v)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::BigInt(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::List(_) => "sequence",
            Value::Obj(_) => "object",
            Value::Stream(_) => "stream",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::BigInt(_) | Value::Float(_))
    }

    /// Convert to a native integer. Floats are floored; big integers must
    /// fit. Nullish values fail: a missing identifier is an error in any
    /// context that requires a value.
    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::BigInt(v) => v
                .to_i64()
                .ok_or_else(|| Error::parse("integer value out of native range")),
            Value::Float(v) => Ok(v.floor() as i64),
            Value::Bool(v) => Ok(i64::from(*v)),
            other => Err(Error::parse(format!(
                "cannot convert {} to integer",
                other.type_name()
            ))),
        }
    }

    /// Convert to a big integer (floors floats).
    pub fn as_bigint(&self) -> Result<BigInt, Error> {
        match self {
            Value::Int(v) => Ok(BigInt::from(*v)),
            Value::BigInt(v) => Ok(v.clone()),
            Value::Float(v) => Ok(BigInt::from(v.floor() as i64)),
            Value::Bool(v) => Ok(BigInt::from(i64::from(*v))),
            other => Err(Error::parse(format!(
                "cannot convert {} to integer",
                other.type_name()
            ))),
        }
    }

    pub fn as_float(&self) -> Result<f64, Error> {
        match self {
            Value::Int(v) => Ok(*v as f64),
            Value::BigInt(v) => Ok(v.to_f64().unwrap_or(f64::INFINITY)),
            Value::Float(v) => Ok(*v),
            Value::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            other => Err(Error::parse(format!(
                "cannot convert {} to float",
                other.type_name()
            ))),
        }
    }

    /// Truthiness: zero, the empty string, and nullish are false;
    /// everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::BigInt(v) => !v.is_zero(),
            Value::Float(v) => *v != 0.0,
            Value::Bool(v) => *v,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(_) | Value::List(_) | Value::Obj(_) | Value::Stream(_) => true,
        }
    }

    /// String rendering used by `to_s` and string concatenation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Obj(o) => format!("<{}>", o.borrow().type_name),
            Value::Stream(_) => "<stream>".to_string(),
        }
    }

    /// Value equality. Integer comparisons cross the native/big boundary
    /// under arbitrary-precision semantics.
    pub fn value_eq(&self, other: &Value) -> Result<bool, Error> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Int(a), Value::BigInt(b)) => Ok(&BigInt::from(*a) == b),
            (Value::BigInt(a), Value::Int(b)) => Ok(a == &BigInt::from(*b)),
            (Value::BigInt(a), Value::BigInt(b)) => Ok(a == b),
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(a.as_float()? == b.as_float()?),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(a == b),
            (Value::Null, Value::Null) => Ok(true),
            (Value::Null, _) | (_, Value::Null) => Ok(false),
            (a, b) => Err(Error::parse(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// Everything a lazy instance needs to evaluate after the parse returned:
/// the defining type, the lexical scope, the stream, inherited meta, and
/// links back into the tree. Backlinks are weak; the tree stays acyclic
/// for ownership purposes.
pub struct InstanceSeed {
    pub ty: Rc<TypeSpec>,
    pub scope: Rc<crate::interp::context::Scope>,
    pub io: StreamRef,
    pub parent: Option<Weak<RefCell<ObjectData>>>,
    pub root: Weak<RefCell<ObjectData>>,
    pub endian: Option<Endian>,
    pub encoding: Option<String>,
    pub filters: Rc<crate::FilterMap>,
}

impl fmt::Debug for InstanceSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstanceSeed { .. }")
    }
}

/// Memoization state of one instance slot.
#[derive(Debug, Clone)]
pub enum InstanceState {
    Pending,
    /// Guard against an instance whose expression depends on itself.
    InProgress,
    Done(Value),
}

/// An object under construction or in the finished tree: ordered fields
/// plus lazy instance slots.
pub struct ObjectData {
    pub type_name: String,
    fields: Vec<(String, Value)>,
    instance_slots: Vec<(String, InstanceState)>,
    pub(crate) seed: Option<InstanceSeed>,
    /// Link to the enclosing object, for `_parent` chains in expressions.
    pub(crate) parent: Option<Weak<RefCell<ObjectData>>>,
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectData")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl ObjectData {
    pub fn new(type_name: impl Into<String>) -> ObjRef {
        Rc::new(RefCell::new(Self {
            type_name: type_name.into(),
            fields: Vec::new(),
            instance_slots: Vec::new(),
            seed: None,
            parent: None,
        }))
    }

    /// The enclosing object, when still alive.
    pub fn parent(&self) -> Option<ObjRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Instance names in declaration order.
    pub fn instance_names(&self) -> Vec<String> {
        self.instance_slots.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instance_slots.iter().any(|(n, _)| n == name)
    }

    pub(crate) fn add_instance_slot(&mut self, name: impl Into<String>) {
        self.instance_slots.push((name.into(), InstanceState::Pending));
    }

    pub(crate) fn instance_state(&self, name: &str) -> Option<&InstanceState> {
        self.instance_slots
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub(crate) fn set_instance_state(&mut self, name: &str, state: InstanceState) {
        if let Some(slot) = self.instance_slots.iter_mut().find(|(n, _)| n == name) {
            slot.1 = state;
        }
    }
}
