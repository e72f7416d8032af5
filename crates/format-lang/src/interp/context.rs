// Per-parse evaluation context and the lexical scope chain
//
// The scope chain resolves user type names and enum tables outward from the
// current type to the root. The context carries the per-object state the
// expression evaluator consults: active stream, current object, parent
// chain, root, repetition bindings.

use crate::error::Error;
use crate::schema::{Endian, EnumSpec, TypeSpec};
use crate::value::{ObjRef, StreamRef, Value};
use crate::FilterMap;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// One level of the lexical scope chain: the nested types and enums a type
/// definition brings into scope.
#[derive(Debug)]
pub struct Scope {
    pub types: FxHashMap<String, Rc<TypeSpec>>,
    pub enums: FxHashMap<String, Rc<EnumSpec>>,
    pub parent: Option<Rc<Scope>>,
}

impl Scope {
    /// Build the scope level for `ty` on top of an optional enclosing scope.
    pub fn for_type(ty: &TypeSpec, parent: Option<Rc<Scope>>) -> Rc<Scope> {
        Rc::new(Scope {
            types: ty.types.clone(),
            enums: ty.enums.clone(),
            parent,
        })
    }

    /// Resolve a user type name walking inner → outer.
    pub fn resolve_type(&self, name: &str) -> Option<Rc<TypeSpec>> {
        if let Some(ty) = self.types.get(name) {
            return Some(Rc::clone(ty));
        }
        self.parent.as_ref().and_then(|p| p.resolve_type(name))
    }

    /// Resolve an enum name walking inner → outer.
    pub fn resolve_enum(&self, name: &str) -> Option<Rc<EnumSpec>> {
        if let Some(e) = self.enums.get(name) {
            return Some(Rc::clone(e));
        }
        self.parent.as_ref().and_then(|p| p.resolve_enum(name))
    }
}

/// The state one in-flight type parse evaluates expressions against.
pub struct Context {
    pub io: StreamRef,
    pub current: ObjRef,
    pub parent: Option<ObjRef>,
    pub root: ObjRef,
    pub scope: Rc<Scope>,
    /// Byte order in effect for unsuffixed multi-byte reads.
    pub endian: Option<Endian>,
    /// Text encoding in effect for string fields without their own.
    pub encoding: Option<String>,
    /// 0-based element index inside a repetition (`_index`).
    pub index: Option<i64>,
    /// The just-parsed element inside repeat-until (`_`).
    pub last: Option<Value>,
    pub filters: Rc<FilterMap>,
}

impl Context {
    /// Resolve an identifier: special names first, then fields of the
    /// current object, then its instances (realized on demand). A name
    /// matching nothing yields the nullish value; contexts that require a
    /// value fail when coercing it.
    pub fn resolve(&self, name: &str) -> Result<Value, Error> {
        match name {
            "_io" => return Ok(Value::Stream(Rc::clone(&self.io))),
            "_root" => return Ok(Value::Obj(Rc::clone(&self.root))),
            "_parent" => {
                return Ok(match &self.parent {
                    Some(p) => Value::Obj(Rc::clone(p)),
                    None => Value::Null,
                });
            }
            "_index" => {
                return Ok(match self.index {
                    Some(i) => Value::Int(i),
                    None => Value::Null,
                });
            }
            "_" => {
                return Ok(match &self.last {
                    Some(v) => v.clone(),
                    None => Value::Null,
                });
            }
            _ => {}
        }
        if let Some(v) = self.current.borrow().field(name) {
            return Ok(v.clone());
        }
        if self.current.borrow().has_instance(name) {
            return crate::interp::realize_instance(&self.current, name);
        }
        Ok(Value::Null)
    }

    /// Look up `Enum::member` through the scope chain.
    pub fn resolve_enum_member(&self, scope_name: &str, member: &str) -> Result<Value, Error> {
        let spec = self
            .scope
            .resolve_enum(scope_name)
            .ok_or_else(|| Error::parse(format!("unknown enum '{}'", scope_name)))?;
        let value = spec.value_of(member).ok_or_else(|| {
            Error::parse(format!("enum '{}' has no member '{}'", scope_name, member))
        })?;
        Ok(Value::Int(value))
    }
}
