//! Dynamically typed host values exchanged with compiled code.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Which host container an address was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCategory {
    Str,
    Struct,
    Array,
    Hash,
    Class,
    Object,
    Data,
}

impl HostCategory {
    pub fn name(&self) -> &'static str {
        match self {
            HostCategory::Str => "string",
            HostCategory::Struct => "struct",
            HostCategory::Array => "array",
            HostCategory::Hash => "hash",
            HostCategory::Class => "class",
            HostCategory::Object => "object",
            HostCategory::Data => "data",
        }
    }
}

/// Where the address held by an [`OpaqueHandle`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleOrigin {
    /// The address of a host container passed into the call.
    Host(HostCategory),
    /// An address produced by compiled code.
    Native,
}

/// A native address returned to the host. It can be passed back into
/// pointer-typed parameters but cannot be dereferenced or used in arithmetic
/// from the host side, and it is never turned back into the container it may
/// have come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueHandle {
    addr: usize,
    origin: HandleOrigin,
}

impl OpaqueHandle {
    pub(crate) fn new(addr: usize, origin: HandleOrigin) -> Self {
        Self { addr, origin }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn origin(&self) -> HandleOrigin {
        self.origin
    }
}

/// A user-defined class: a name and its ordered field names.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub fields: Vec<String>,
}

/// An instance of a [`ClassInfo`].
#[derive(Debug, Clone)]
pub struct Object {
    pub class: Rc<ClassInfo>,
    pub slots: Vec<Value>,
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(Rc<str>),
    /// Mutable byte buffer. Passed to pointer parameters as the address of
    /// its first byte; an empty buffer cannot be passed.
    Str(Rc<RefCell<Vec<u8>>>),
    Struct(Rc<RefCell<Vec<(Rc<str>, Value)>>>),
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<Vec<(Value, Value)>>>),
    Class(Rc<ClassInfo>),
    Object(Rc<RefCell<Object>>),
    /// Arbitrary host payload.
    Data(Rc<dyn Any>),
    Handle(OpaqueHandle),
}

impl Value {
    pub fn str(s: impl AsRef<[u8]>) -> Value {
        Value::Str(Rc::new(RefCell::new(s.as_ref().to_vec())))
    }

    /// A string buffer with a trailing NUL, suitable for C string parameters.
    pub fn c_str(s: &str) -> Value {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        Value::Str(Rc::new(RefCell::new(bytes)))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Rc::from(name))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn hash(entries: Vec<(Value, Value)>) -> Value {
        Value::Hash(Rc::new(RefCell::new(entries)))
    }

    pub fn record(fields: Vec<(&str, Value)>) -> Value {
        let fields = fields.into_iter().map(|(k, v)| (Rc::from(k), v)).collect();
        Value::Struct(Rc::new(RefCell::new(fields)))
    }

    pub fn class(name: &str, fields: &[&str]) -> Value {
        Value::Class(Rc::new(ClassInfo {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }))
    }

    /// An instance of `class` with its slots set to `nil`.
    pub fn object(class: &Rc<ClassInfo>) -> Value {
        let slots = vec![Value::Nil; class.fields.len()];
        Value::Object(Rc::new(RefCell::new(Object {
            class: Rc::clone(class),
            slots,
        })))
    }

    pub fn data<T: Any>(payload: T) -> Value {
        Value::Data(Rc::new(payload))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<OpaqueHandle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Host category name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Symbol(_) => "symbol",
            Value::Handle(_) => "handle",
            other => other.container_category().map_or("value", |c| c.name()),
        }
    }

    /// The container category of this value and the address it is passed
    /// as, or `None` for scalars.
    pub fn container(&self) -> Option<(HostCategory, usize)> {
        let found = match self {
            Value::Str(bytes) => (HostCategory::Str, bytes.borrow().as_ptr() as usize),
            Value::Struct(rc) => (HostCategory::Struct, Rc::as_ptr(rc) as usize),
            Value::Array(rc) => (HostCategory::Array, Rc::as_ptr(rc) as usize),
            Value::Hash(rc) => (HostCategory::Hash, Rc::as_ptr(rc) as usize),
            Value::Class(rc) => (HostCategory::Class, Rc::as_ptr(rc) as usize),
            Value::Object(rc) => (HostCategory::Object, Rc::as_ptr(rc) as usize),
            Value::Data(rc) => (HostCategory::Data, Rc::as_ptr(rc) as *const () as usize),
            _ => return None,
        };
        Some(found)
    }

    fn container_category(&self) -> Option<HostCategory> {
        self.container().map(|(category, _)| category)
    }
}

impl PartialEq for Value {
    /// Scalars compare by value, containers by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Data(a), Value::Data(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Data(_) => f.write_str("Data(..)"),
            Value::Str(bytes) => write!(f, "Str({:?})", String::from_utf8_lossy(&bytes.borrow())),
            Value::Struct(_) | Value::Array(_) | Value::Hash(_) | Value::Object(_) => {
                write!(f, "{}", self)
            }
            Value::Class(class) => write!(f, "Class({})", class.name),
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Symbol(s) => write!(f, "Symbol({})", s),
            Value::Handle(h) => write!(f, "{:?}", h),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Str(bytes) => write!(f, "{:?}", String::from_utf8_lossy(&bytes.borrow())),
            Value::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                f.write_str("}")
            }
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Hash(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Class(class) => write!(f, "#<class {}>", class.name),
            Value::Object(object) => write!(f, "#<{}>", object.borrow().class.name),
            Value::Data(_) => f.write_str("#<data>"),
            Value::Handle(handle) => match handle.origin() {
                HandleOrigin::Host(category) => {
                    write!(f, "#<handle 0x{:x} ({})>", handle.addr(), category.name())
                }
                HandleOrigin::Native => write!(f, "#<handle 0x{:x}>", handle.addr()),
            },
        }
    }
}
