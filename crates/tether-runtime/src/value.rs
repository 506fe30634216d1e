use std::fmt;

use crate::ObjectId;

/// The closed set of primitive kinds a debuggee value can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::Char,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Char => "char",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        PrimitiveKind::ALL
            .into_iter()
            .find(|kind| kind.type_name() == name)
    }

    /// Class of the single-field holder a result of this kind is boxed into.
    pub fn holder_class(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "tether.runtime.BooleanResult",
            PrimitiveKind::Byte => "tether.runtime.ByteResult",
            PrimitiveKind::Short => "tether.runtime.ShortResult",
            PrimitiveKind::Int => "tether.runtime.IntResult",
            PrimitiveKind::Long => "tether.runtime.LongResult",
            PrimitiveKind::Float => "tether.runtime.FloatResult",
            PrimitiveKind::Double => "tether.runtime.DoubleResult",
            PrimitiveKind::Char => "tether.runtime.CharResult",
        }
    }

    pub fn default_value(self) -> Primitive {
        match self {
            PrimitiveKind::Boolean => Primitive::Boolean(false),
            PrimitiveKind::Byte => Primitive::Byte(0),
            PrimitiveKind::Short => Primitive::Short(0),
            PrimitiveKind::Int => Primitive::Int(0),
            PrimitiveKind::Long => Primitive::Long(0),
            PrimitiveKind::Float => Primitive::Float(0.0),
            PrimitiveKind::Double => Primitive::Double(0.0),
            PrimitiveKind::Char => Primitive::Char('\0'),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Byte(_) => PrimitiveKind::Byte,
            Primitive::Short(_) => PrimitiveKind::Short,
            Primitive::Int(_) => PrimitiveKind::Int,
            Primitive::Long(_) => PrimitiveKind::Long,
            Primitive::Float(_) => PrimitiveKind::Float,
            Primitive::Double(_) => PrimitiveKind::Double,
            Primitive::Char(_) => PrimitiveKind::Char,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Boolean(v) => write!(f, "{v}"),
            Primitive::Byte(v) => write!(f, "{v}"),
            Primitive::Short(v) => write!(f, "{v}"),
            Primitive::Int(v) => write!(f, "{v}"),
            Primitive::Long(v) => write!(f, "{v}L"),
            Primitive::Float(v) => write!(f, "{v:?}f"),
            Primitive::Double(v) => write!(f, "{v:?}"),
            Primitive::Char(v) => write!(f, "'{}'", v.escape_default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub runtime_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Void,
    Primitive(Primitive),
    Object(ObjectRef),
}

impl Value {
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(obj) => Some(obj.id),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Value::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Primitive(Primitive::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Runtime type name of the value; `null` and `void` for the empty kinds.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Void => "void",
            Value::Primitive(p) => p.type_name(),
            Value::Object(obj) => &obj.runtime_type,
        }
    }

    /// Whether a value of this shape may be passed where `declared` is expected.
    pub(crate) fn is_assignable_to(&self, declared: &str) -> bool {
        match self {
            Value::Void => false,
            Value::Null => PrimitiveKind::from_type_name(declared).is_none(),
            Value::Primitive(p) => p.type_name() == declared,
            Value::Object(obj) => declared == "Object" || obj.runtime_type == declared,
        }
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        Value::Primitive(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

macro_rules! primitive_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Primitive::$variant(value)
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Primitive(Primitive::$variant(value))
                }
            }
        )+
    };
}

primitive_from! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
}
