// Type interpreter: walks a schema against a stream, producing the value tree
//
// Drives the schema model against the byte stream, consulting the expression
// engine through the evaluation context for every attribute that carries an
// expression. Sequential fields parse in declaration order; instances are
// installed as lazy slots realized on first access.

pub mod context;

use crate::error::Error;
use crate::expr::eval::eval;
use crate::schema::{
    BuiltinType, Endian, EndianSpec, FieldSpec, FieldType, Repeat, Schema, SwitchType, TypeSpec,
};
use crate::stream::ByteStream;
use crate::value::{InstanceSeed, InstanceState, ObjRef, ObjectData, StreamRef, Value};
use crate::FilterMap;
use context::{Context, Scope};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

const DEFAULT_MAX_RECURSION_DEPTH: u32 = 256;

/// Interpreter over a validated schema model.
pub struct Interpreter {
    filters: Rc<FilterMap>,
    max_depth: u32,
}

impl Interpreter {
    pub fn new(filters: Rc<FilterMap>) -> Self {
        Self {
            filters,
            max_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }

    /// Parse a byte buffer against the schema's root type.
    pub fn parse(&self, schema: &Schema, data: &[u8]) -> Result<Value, Error> {
        let io = Rc::new(RefCell::new(ByteStream::new(data)));
        let obj = self.parse_type(&schema.root, None, io, None, None, None, None, Vec::new(), 0)?;
        Ok(Value::Obj(obj))
    }

    /// Parse a type instance: bind parameters, walk the sequence, install
    /// lazy instance slots.
    #[allow(clippy::too_many_arguments)]
    fn parse_type(
        &self,
        ty: &Rc<TypeSpec>,
        outer_scope: Option<Rc<Scope>>,
        io: StreamRef,
        parent: Option<ObjRef>,
        root: Option<ObjRef>,
        inherited_endian: Option<Endian>,
        inherited_encoding: Option<String>,
        args: Vec<Value>,
        depth: u32,
    ) -> Result<ObjRef, Error> {
        if depth > self.max_depth {
            return Err(Error::parse("type recursion depth exceeded"));
        }

        let scope = Scope::for_type(ty, outer_scope);
        let obj = ObjectData::new(ty.meta.id.clone().unwrap_or_default());
        obj.borrow_mut().parent = parent.as_ref().map(Rc::downgrade);
        let root_obj = root.unwrap_or_else(|| Rc::clone(&obj));

        if ty.params.len() != args.len() {
            return Err(Error::parse(format!(
                "type '{}' expects {} argument(s), got {}",
                ty.meta.id.as_deref().unwrap_or("?"),
                ty.params.len(),
                args.len()
            )));
        }
        for (param, arg) in ty.params.iter().zip(args) {
            obj.borrow_mut().set_field(param.id.clone(), arg);
        }

        let mut ctx = Context {
            io,
            current: Rc::clone(&obj),
            parent: parent.clone(),
            root: root_obj,
            scope: Rc::clone(&scope),
            endian: None,
            encoding: ty.meta.encoding.clone().or(inherited_encoding),
            index: None,
            last: None,
            filters: Rc::clone(&self.filters),
        };
        ctx.endian = match &ty.meta.endian {
            Some(EndianSpec::Fixed(e)) => Some(*e),
            Some(EndianSpec::Switch { on, cases }) => {
                let key = switch_key(&eval(on, &ctx)?)?;
                Some(*cases.get(&key).ok_or_else(|| {
                    Error::parse(format!("no endianness case matches '{}'", key))
                })?)
            }
            None => inherited_endian,
        };

        for field in &ty.seq {
            let parsed = self.parse_field(field, &mut ctx, depth)?;
            if let (Some(id), Some(value)) = (&field.id, parsed) {
                obj.borrow_mut().set_field(id.clone(), value);
            }
        }

        if !ty.instances.is_empty() {
            let mut b = obj.borrow_mut();
            for inst in &ty.instances {
                b.add_instance_slot(inst.id.clone());
            }
            b.seed = Some(InstanceSeed {
                ty: Rc::clone(ty),
                scope,
                io: Rc::clone(&ctx.io),
                parent: parent.map(|p| Rc::downgrade(&p)),
                root: Rc::downgrade(&ctx.root),
                endian: ctx.endian,
                encoding: ctx.encoding.clone(),
                filters: Rc::clone(&self.filters),
            });
        }

        Ok(obj)
    }

    /// Dispatch one field: `if` gate, `pos` redirect, `io` redirect,
    /// repetition, contents check, value read — in that order. Returns
    /// `None` when the `if` gate is falsy.
    pub(crate) fn parse_field(
        &self,
        field: &FieldSpec,
        ctx: &mut Context,
        depth: u32,
    ) -> Result<Option<Value>, Error> {
        if let Some(cond) = &field.cond {
            if !eval(cond, ctx)?.truthy() {
                return Ok(None);
            }
        }

        if let Some(pos_expr) = &field.pos {
            let p = eval(pos_expr, ctx)?.as_int()?;
            let p = usize::try_from(p)
                .map_err(|_| Error::parse(format!("negative stream position {}", p)))?;
            ctx.io.borrow_mut().seek(p)?;
        }

        if field.io.is_some() {
            return Err(Error::not_implemented("io redirect"));
        }

        if let Some(repeat) = &field.repeat {
            return self.parse_repeat(field, repeat, ctx, depth).map(Some);
        }

        self.parse_element(field, ctx, depth).map(Some)
    }

    /// One element read: the repetition-cleared remainder of field dispatch.
    fn parse_element(
        &self,
        field: &FieldSpec,
        ctx: &mut Context,
        depth: u32,
    ) -> Result<Value, Error> {
        if let Some(expected) = &field.contents {
            return self.check_contents(expected, ctx);
        }
        self.read_value(field, ctx, depth)
    }

    fn check_contents(&self, expected: &[u8], ctx: &mut Context) -> Result<Value, Error> {
        let start = ctx.io.borrow().pos();
        let actual = ctx.io.borrow_mut().read_bytes(expected.len())?;
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            if a != e {
                return Err(Error::Validation(crate::error::ValidationError::at_byte(
                    format!(
                        "unexpected contents: got {:#04x}, expected {:#04x}",
                        a, e
                    ),
                    start + i,
                )));
            }
        }
        Ok(Value::Bytes(actual))
    }

    fn parse_repeat(
        &self,
        field: &FieldSpec,
        repeat: &Repeat,
        ctx: &mut Context,
        depth: u32,
    ) -> Result<Value, Error> {
        let mut items = Vec::new();
        match repeat {
            Repeat::Count(count_expr) => {
                let n = eval(count_expr, ctx)?.as_int()?;
                if n < 0 {
                    return Err(Error::parse(format!("negative repeat count {}", n)));
                }
                for i in 0..n {
                    ctx.index = Some(i);
                    let item = self.parse_element(field, ctx, depth);
                    ctx.index = None;
                    items.push(item?);
                }
            }
            Repeat::Eos => {
                let mut i = 0;
                while !ctx.io.borrow().is_eof() {
                    ctx.index = Some(i);
                    let item = self.parse_element(field, ctx, depth);
                    ctx.index = None;
                    items.push(item?);
                    i += 1;
                }
            }
            Repeat::Until(until_expr) => {
                let mut i = 0;
                loop {
                    ctx.index = Some(i);
                    match self.parse_element(field, ctx, depth) {
                        Ok(item) => {
                            ctx.last = Some(item.clone());
                            items.push(item);
                            let done = eval(until_expr, ctx)?.truthy();
                            if done || ctx.io.borrow().is_eof() {
                                break;
                            }
                        }
                        // end-of-stream terminates the loop instead of failing
                        Err(e) if e.is_eos() => break,
                        Err(e) => {
                            ctx.index = None;
                            ctx.last = None;
                            return Err(e);
                        }
                    }
                    i += 1;
                }
                ctx.index = None;
                ctx.last = None;
            }
        }
        ctx.index = None;
        Ok(Value::List(items))
    }

    /// Read a single value per the field's size/type attributes.
    fn read_value(
        &self,
        field: &FieldSpec,
        ctx: &mut Context,
        depth: u32,
    ) -> Result<Value, Error> {
        if field.size.is_some() || field.size_eos {
            let n = match &field.size {
                Some(size_expr) => {
                    let n = eval(size_expr, ctx)?.as_int()?;
                    usize::try_from(n)
                        .map_err(|_| Error::parse(format!("negative field size {}", n)))?
                }
                None => {
                    let io = ctx.io.borrow();
                    io.size() - io.pos()
                }
            };
            return match &field.ty {
                None => {
                    let bytes = ctx.io.borrow_mut().read_bytes(n)?;
                    Ok(Value::Bytes(self.apply_process(field, bytes)?))
                }
                Some(FieldType::Builtin(BuiltinType::Str)) => {
                    let bytes = ctx.io.borrow_mut().read_bytes(n)?;
                    let bytes = self.apply_process(field, bytes)?;
                    Ok(Value::Str(self.decode_str(&bytes, field, ctx)?))
                }
                Some(FieldType::Builtin(BuiltinType::StrZ)) => {
                    let bytes = ctx.io.borrow_mut().read_bytes(n)?;
                    let bytes = self.apply_process(field, bytes)?;
                    let term = field.terminator.unwrap_or(0);
                    let end = bytes.iter().position(|&b| b == term);
                    let slice = match (end, field.include) {
                        (Some(i), false) => &bytes[..i],
                        (Some(i), true) => &bytes[..=i],
                        (None, _) => &bytes[..],
                    };
                    Ok(Value::Str(self.decode_str(slice, field, ctx)?))
                }
                Some(ft) => {
                    // carve a sub-stream so inner reads cannot cross the boundary
                    let sub = if field.process.is_some() {
                        let bytes = ctx.io.borrow_mut().read_bytes(n)?;
                        ByteStream::from_vec(self.apply_process(field, bytes)?)
                    } else {
                        ctx.io.borrow_mut().substream(n)?
                    };
                    let sub = Rc::new(RefCell::new(sub));
                    self.read_typed(ft, field, ctx, &sub, depth)
                }
            };
        }

        match &field.ty {
            Some(ft) => {
                let io = Rc::clone(&ctx.io);
                self.read_typed(ft, field, ctx, &io, depth)
            }
            None => match field.terminator {
                // untyped terminated field: a terminated byte read
                Some(term) => {
                    let bytes = ctx.io.borrow_mut().read_bytes_term(
                        term,
                        field.include,
                        field.consume,
                        field.eos_error,
                    )?;
                    Ok(Value::Bytes(self.apply_process(field, bytes)?))
                }
                None => Err(Error::parse(format!(
                    "field '{}' has neither a type nor a size",
                    field.id.as_deref().unwrap_or("?")
                ))),
            },
        }
    }

    fn read_typed(
        &self,
        ft: &FieldType,
        field: &FieldSpec,
        ctx: &mut Context,
        io: &StreamRef,
        depth: u32,
    ) -> Result<Value, Error> {
        match ft {
            FieldType::Switch(sw) => {
                let resolved = self.resolve_switch(sw, ctx)?;
                self.read_typed(resolved, field, ctx, io, depth)
            }
            FieldType::Builtin(bt) => self.read_builtin(bt, field, ctx, io),
            FieldType::User { name, args } => {
                let ty = ctx
                    .scope
                    .resolve_type(name)
                    .ok_or_else(|| Error::parse(format!("unknown type '{}'", name)))?;
                let arg_values = args
                    .iter()
                    .map(|a| eval(a, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                let obj = self.parse_type(
                    &ty,
                    Some(Rc::clone(&ctx.scope)),
                    Rc::clone(io),
                    Some(Rc::clone(&ctx.current)),
                    Some(Rc::clone(&ctx.root)),
                    ctx.endian,
                    ctx.encoding.clone(),
                    arg_values,
                    depth + 1,
                )?;
                Ok(Value::Obj(obj))
            }
        }
    }

    fn resolve_switch<'a>(
        &self,
        sw: &'a SwitchType,
        ctx: &Context,
    ) -> Result<&'a FieldType, Error> {
        let discriminant = eval(&sw.on, ctx)?;
        let key = switch_key(&discriminant)?;
        if let Some((_, ft)) = sw.cases.iter().find(|(k, _)| *k == key) {
            return Ok(ft);
        }
        sw.default
            .as_ref()
            .ok_or_else(|| Error::parse(format!("no switch case matches '{}'", key)))
    }

    fn read_builtin(
        &self,
        bt: &BuiltinType,
        field: &FieldSpec,
        ctx: &Context,
        io: &StreamRef,
    ) -> Result<Value, Error> {
        // unsuffixed multi-byte names inherit endianness; little-endian
        // when nothing is in scope
        let pick = |suffix: &Option<Endian>| (*suffix).or(ctx.endian).unwrap_or(Endian::Little);
        let mut s = io.borrow_mut();
        let value = match bt {
            BuiltinType::U1 => Value::Int(s.read_u1()? as i64),
            BuiltinType::S1 => Value::Int(s.read_s1()? as i64),
            BuiltinType::U2(e) => Value::Int(match pick(e) {
                Endian::Little => s.read_u2le()?,
                Endian::Big => s.read_u2be()?,
            } as i64),
            BuiltinType::U4(e) => Value::Int(match pick(e) {
                Endian::Little => s.read_u4le()?,
                Endian::Big => s.read_u4be()?,
            } as i64),
            BuiltinType::U8(e) => Value::BigInt(BigInt::from(match pick(e) {
                Endian::Little => s.read_u8le()?,
                Endian::Big => s.read_u8be()?,
            })),
            BuiltinType::S2(e) => Value::Int(match pick(e) {
                Endian::Little => s.read_s2le()?,
                Endian::Big => s.read_s2be()?,
            } as i64),
            BuiltinType::S4(e) => Value::Int(match pick(e) {
                Endian::Little => s.read_s4le()?,
                Endian::Big => s.read_s4be()?,
            } as i64),
            BuiltinType::S8(e) => Value::BigInt(BigInt::from(match pick(e) {
                Endian::Little => s.read_s8le()?,
                Endian::Big => s.read_s8be()?,
            })),
            BuiltinType::F4(e) => Value::Float(match pick(e) {
                Endian::Little => s.read_f4le()?,
                Endian::Big => s.read_f4be()?,
            } as f64),
            BuiltinType::F8(e) => Value::Float(match pick(e) {
                Endian::Little => s.read_f8le()?,
                Endian::Big => s.read_f8be()?,
            }),
            BuiltinType::Str => {
                // str without a size still works with an explicit terminator
                let Some(term) = field.terminator else {
                    return Err(Error::parse("str type requires a size or a terminator"));
                };
                let bytes =
                    s.read_bytes_term(term, field.include, field.consume, field.eos_error)?;
                drop(s);
                return Ok(Value::Str(self.decode_str(&bytes, field, ctx)?));
            }
            BuiltinType::StrZ => {
                let term = field.terminator.unwrap_or(0);
                let bytes =
                    s.read_bytes_term(term, field.include, field.consume, field.eos_error)?;
                drop(s);
                return Ok(Value::Str(self.decode_str(&bytes, field, ctx)?));
            }
        };
        Ok(value)
    }

    fn decode_str(
        &self,
        bytes: &[u8],
        field: &FieldSpec,
        ctx: &Context,
    ) -> Result<String, Error> {
        let label = field
            .encoding
            .as_deref()
            .or(ctx.encoding.as_deref())
            .unwrap_or("UTF-8");
        crate::encoding::decode(bytes, label)
    }

    fn apply_process(&self, field: &FieldSpec, bytes: Vec<u8>) -> Result<Vec<u8>, Error> {
        match &field.process {
            None => Ok(bytes),
            Some(name) => match self.filters.get(name) {
                Some(filter) => filter.apply(&bytes),
                None => Err(Error::not_implemented(format!("process filter '{}'", name))),
            },
        }
    }
}

/// Stringify a switch discriminant for case-map lookup.
fn switch_key(value: &Value) -> Result<String, Error> {
    match value {
        Value::Int(v) => Ok(v.to_string()),
        Value::BigInt(v) => Ok(v.to_string()),
        Value::Bool(v) => Ok(v.to_string()),
        Value::Str(s) => Ok(s.clone()),
        other => Err(Error::parse(format!(
            "switch discriminant must be an integer, boolean or string, got {}",
            other.type_name()
        ))),
    }
}

/// Evaluate an instance slot on first access and memoize the result.
/// Failures are not memoized: a failed access surfaces its error and the
/// next access re-evaluates.
pub(crate) fn realize_instance(obj: &ObjRef, name: &str) -> Result<Value, Error> {
    {
        let b = obj.borrow();
        match b.instance_state(name) {
            None => {
                return Err(Error::parse(format!(
                    "object has no instance '{}'",
                    name
                )));
            }
            Some(InstanceState::Done(v)) => return Ok(v.clone()),
            Some(InstanceState::InProgress) => {
                return Err(Error::parse(format!(
                    "instance '{}' depends on itself",
                    name
                )));
            }
            Some(InstanceState::Pending) => {}
        }
    }

    let (spec, mut ctx) = {
        let mut b = obj.borrow_mut();
        let seed = match b.seed.as_ref() {
            Some(seed) => seed,
            None => return Err(Error::Base(format!("instance '{}' has no seed", name))),
        };
        let spec = match seed.ty.instance(name) {
            Some(spec) => Rc::clone(spec),
            None => return Err(Error::Base(format!("instance '{}' has no spec", name))),
        };
        let ctx = Context {
            io: Rc::clone(&seed.io),
            current: Rc::clone(obj),
            parent: seed.parent.as_ref().and_then(|w| w.upgrade()),
            root: seed.root.upgrade().unwrap_or_else(|| Rc::clone(obj)),
            scope: Rc::clone(&seed.scope),
            endian: seed.endian,
            encoding: seed.encoding.clone(),
            index: None,
            last: None,
            filters: Rc::clone(&seed.filters),
        };
        b.set_instance_state(name, InstanceState::InProgress);
        (spec, ctx)
    };

    let result = if let Some(value_expr) = &spec.value {
        // value instance: computed, no stream read; the if gate still applies
        match &spec.field.cond {
            Some(cond) => match eval(cond, &ctx) {
                Ok(gate) if !gate.truthy() => Ok(Value::Null),
                Ok(_) => eval(value_expr, &ctx),
                Err(e) => Err(e),
            },
            None => eval(value_expr, &ctx),
        }
    } else {
        // positioned read: save the cursor, restore on both paths
        let saved = ctx.io.borrow().state();
        let interp = Interpreter::new(Rc::clone(&ctx.filters));
        let read = interp.parse_field(&spec.field, &mut ctx, 0);
        ctx.io.borrow_mut().restore(saved);
        read.map(|v| v.unwrap_or(Value::Null))
    };

    match result {
        Ok(v) => {
            obj.borrow_mut()
                .set_instance_state(name, InstanceState::Done(v.clone()));
            Ok(v)
        }
        Err(e) => {
            obj.borrow_mut()
                .set_instance_state(name, InstanceState::Pending);
            Err(e)
        }
    }
}

impl Value {
    /// Access a member of an object value: parsed fields first, then lazy
    /// instances (realized and memoized on first access).
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        match self {
            Value::Obj(obj) => {
                if let Some(v) = obj.borrow().field(name) {
                    return Ok(v.clone());
                }
                if obj.borrow().has_instance(name) {
                    return realize_instance(obj, name);
                }
                Err(Error::parse(format!("object has no member '{}'", name)))
            }
            other => Err(Error::parse(format!(
                "cannot access member '{}' of {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// Index into a sequence value.
    pub fn at(&self, index: usize) -> Result<Value, Error> {
        match self {
            Value::List(items) => items
                .get(index)
                .cloned()
                .ok_or_else(|| {
                    Error::parse(format!(
                        "index {} out of range for sequence of {}",
                        index,
                        items.len()
                    ))
                }),
            other => Err(Error::parse(format!(
                "cannot index into {}",
                other.type_name()
            ))),
        }
    }

    /// All entries of an object: parsed fields in parse order followed by
    /// instances realized in declaration order. Serialization uses this.
    pub fn entries(&self) -> Result<Vec<(String, Value)>, Error> {
        match self {
            Value::Obj(obj) => {
                let mut out: Vec<(String, Value)> = obj
                    .borrow()
                    .fields()
                    .map(|(n, v)| (n.to_string(), v.clone()))
                    .collect();
                let instance_names = obj.borrow().instance_names();
                for name in instance_names {
                    let v = realize_instance(obj, &name)?;
                    out.push((name, v));
                }
                Ok(out)
            }
            other => Err(Error::parse(format!(
                "{} has no entries",
                other.type_name()
            ))),
        }
    }
}
