//! Typed callables behind a type-erased call interface
//!
//! A [`Handler`] is built from an ordinary Rust closure or function. The
//! parameter types are captured into a [`Signature`] at construction time,
//! which is what allows the call site to validate late-bound JSON argument
//! lists before any decoding happens. Handlers whose final parameter is a
//! `Vec<T>` can opt into variadic binding, where every trailing argument is
//! checked against the element type and collected into the vector.

use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::InvokeError;

/// JSON-level kind a parameter position expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Boolean
    Bool,
    /// Integer number
    Int,
    /// Floating-point number (also accepts integers)
    Float,
    /// String
    Str,
    /// Array
    Array,
    /// Object
    Object,
    /// Any value, including null
    Any,
}

impl ParamType {
    pub(crate) fn label(self) -> &'static str {
        match self {
            ParamType::Bool => "boolean",
            ParamType::Int => "integer",
            ParamType::Float => "float",
            ParamType::Str => "string",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }

    /// Whether a value of kind `actual` can bind to this parameter kind
    pub(crate) fn accepts(self, actual: ParamType) -> bool {
        self == actual || self == ParamType::Any || (self == ParamType::Float && actual == ParamType::Int)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Kind of a concrete JSON value, `None` for null
pub(crate) fn value_kind(value: &Value) -> Option<ParamType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(ParamType::Bool),
        Value::Number(n) => {
            if n.is_f64() {
                Some(ParamType::Float)
            } else {
                Some(ParamType::Int)
            }
        }
        Value::String(_) => Some(ParamType::Str),
        Value::Array(_) => Some(ParamType::Array),
        Value::Object(_) => Some(ParamType::Object),
    }
}

pub(crate) fn value_label(value: &Value) -> &'static str {
    match value_kind(value) {
        Some(kind) => kind.label(),
        None => "null",
    }
}

/// Expected kind and nullability of one parameter position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Expected JSON kind
    pub kind: ParamType,
    /// Whether a null argument may bind to this position
    pub nullable: bool,
}

impl ParamSpec {
    /// Spec for a parameter of Rust type `T`
    pub fn of<T: ArgType>() -> Self {
        Self {
            kind: T::KIND,
            nullable: T::NULLABLE,
        }
    }
}

/// Rust types usable as handler parameters
///
/// Maps a Rust type onto the JSON kind it decodes from. `Option<T>` and
/// [`Value`] are nullable: they are the only parameter types a null
/// argument may bind to.
pub trait ArgType: DeserializeOwned {
    /// JSON kind this type decodes from
    const KIND: ParamType;
    /// Whether null binds to this type
    const NULLABLE: bool = false;
}

macro_rules! impl_arg_type {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl ArgType for $ty {
                const KIND: ParamType = $kind;
            }
        )+
    };
}

impl_arg_type!(ParamType::Bool => bool);
impl_arg_type!(ParamType::Int => i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
impl_arg_type!(ParamType::Float => f32, f64);
impl_arg_type!(ParamType::Str => String, PathBuf);

impl<T: DeserializeOwned> ArgType for Vec<T> {
    const KIND: ParamType = ParamType::Array;
}

impl ArgType for serde_json::Map<String, Value> {
    const KIND: ParamType = ParamType::Object;
}

impl ArgType for Value {
    const KIND: ParamType = ParamType::Any;
    const NULLABLE: bool = true;
}

impl<T: ArgType> ArgType for Option<T> {
    const KIND: ParamType = T::KIND;
    const NULLABLE: bool = true;
}

/// Parameter layout of a handler
#[derive(Debug, Clone)]
pub struct Signature {
    params: Vec<ParamSpec>,
    variadic: Option<ParamSpec>,
}

impl Signature {
    fn fixed(params: Vec<ParamSpec>) -> Self {
        Self {
            params,
            variadic: None,
        }
    }

    fn variadic(params: Vec<ParamSpec>, tail: ParamSpec) -> Self {
        Self {
            params,
            variadic: Some(tail),
        }
    }

    /// Number of fixed parameters, excluding any variadic tail
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether the final parameter accepts a variable-length tail
    pub fn is_variadic(&self) -> bool {
        self.variadic.is_some()
    }

    /// Specs of the fixed parameters
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Element spec of the variadic tail, if any
    pub fn tail(&self) -> Option<ParamSpec> {
        self.variadic
    }

    /// Expected spec at an argument position
    ///
    /// Positions at or past the fixed-parameter count resolve to the
    /// variadic element spec, or `None` for a non-variadic signature.
    pub fn param_at(&self, position: usize) -> Option<ParamSpec> {
        if position < self.params.len() {
            Some(self.params[position])
        } else {
            self.variadic
        }
    }
}

type CallFn = Box<dyn Fn(Vec<Value>) -> Result<Value, InvokeError> + Send + Sync>;

/// A callable with a known signature
///
/// Stored type-erased (`Arc<dyn Any + Send + Sync>`) in the registry and
/// recovered by [`invoke`](super::invoke) at call time.
pub struct Handler {
    signature: Signature,
    func: CallFn,
}

impl Handler {
    /// Wrap a function or closure of fixed arity
    pub fn new<Args, F>(callable: F) -> Self
    where
        F: IntoHandler<Args>,
    {
        callable.into_handler()
    }

    /// Wrap a function or closure whose final `Vec<T>` parameter binds a
    /// variable-length argument tail
    pub fn new_variadic<Args, F>(callable: F) -> Self
    where
        F: IntoVariadicHandler<Args>,
    {
        callable.into_handler()
    }

    /// Parameter layout of this handler
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Decode the arguments and perform the call
    ///
    /// Assumes the argument list has already been validated against the
    /// signature; a decode failure still comes back as a `TypeMismatch`
    /// rather than a panic.
    pub(crate) fn call(&self, args: Vec<Value>) -> Result<Value, InvokeError> {
        (self.func)(args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Conversion of typed functions into fixed-arity handlers
pub trait IntoHandler<Args> {
    fn into_handler(self) -> Handler;
}

/// Conversion of typed functions into variadic handlers
pub trait IntoVariadicHandler<Args> {
    fn into_handler(self) -> Handler;
}

fn decode<T: ArgType>(value: Option<Value>, position: usize) -> Result<T, InvokeError> {
    let value = value.unwrap_or(Value::Null);
    let actual = value_label(&value);
    serde_json::from_value(value).map_err(|_| InvokeError::TypeMismatch {
        position,
        actual,
        expected: T::KIND,
    })
}

fn encode<R: Serialize>(value: R) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

macro_rules! impl_into_handler {
    ($(($param:ident, $idx:tt)),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<Func, Ret, $($param,)*> IntoHandler<($($param,)*)> for Func
        where
            Func: Fn($($param),*) -> Ret + Send + Sync + 'static,
            Ret: Serialize,
            $($param: ArgType + 'static,)*
        {
            fn into_handler(self) -> Handler {
                let signature = Signature::fixed(vec![$(ParamSpec::of::<$param>()),*]);
                let func: CallFn = Box::new(move |args| {
                    let mut args = args.into_iter();
                    $(let $param: $param = decode(args.next(), $idx)?;)*
                    Ok(encode(self($($param),*)))
                });
                Handler { signature, func }
            }
        }
    };
}

impl_into_handler!();
impl_into_handler!((A0, 0));
impl_into_handler!((A0, 0), (A1, 1));
impl_into_handler!((A0, 0), (A1, 1), (A2, 2));
impl_into_handler!((A0, 0), (A1, 1), (A2, 2), (A3, 3));
impl_into_handler!((A0, 0), (A1, 1), (A2, 2), (A3, 3), (A4, 4));

macro_rules! impl_into_variadic_handler {
    ($(($param:ident, $idx:tt)),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<Func, Ret, Tail, $($param,)*> IntoVariadicHandler<($($param,)* Vec<Tail>,)> for Func
        where
            Func: Fn($($param,)* Vec<Tail>) -> Ret + Send + Sync + 'static,
            Ret: Serialize,
            Tail: ArgType + 'static,
            $($param: ArgType + 'static,)*
        {
            fn into_handler(self) -> Handler {
                let params = vec![$(ParamSpec::of::<$param>()),*];
                let fixed = params.len();
                let signature = Signature::variadic(params, ParamSpec::of::<Tail>());
                let func: CallFn = Box::new(move |args| {
                    let mut args = args.into_iter();
                    $(let $param: $param = decode(args.next(), $idx)?;)*
                    let mut tail = Vec::new();
                    let mut position = fixed;
                    for value in args {
                        tail.push(decode::<Tail>(Some(value), position)?);
                        position += 1;
                    }
                    Ok(encode(self($($param,)* tail)))
                });
                Handler { signature, func }
            }
        }
    };
}

impl_into_variadic_handler!();
impl_into_variadic_handler!((A0, 0));
impl_into_variadic_handler!((A0, 0), (A1, 1));
impl_into_variadic_handler!((A0, 0), (A1, 1), (A2, 2));

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_signature_shape() {
        let handler = Handler::new(|_a: i64, _b: String| ());
        let signature = handler.signature();
        assert_eq!(signature.arity(), 2);
        assert!(!signature.is_variadic());
        assert_eq!(signature.params()[0].kind, ParamType::Int);
        assert_eq!(signature.params()[1].kind, ParamType::Str);
    }

    #[test]
    fn test_variadic_signature_shape() {
        let handler = Handler::new_variadic(|_prefix: String, _rest: Vec<i64>| ());
        let signature = handler.signature();
        assert_eq!(signature.arity(), 1);
        assert!(signature.is_variadic());
        assert_eq!(signature.tail().unwrap().kind, ParamType::Int);
    }

    #[test]
    fn test_param_at_resolves_tail() {
        let handler = Handler::new_variadic(|_rest: Vec<bool>| ());
        let signature = handler.signature();
        assert_eq!(signature.param_at(0).unwrap().kind, ParamType::Bool);
        assert_eq!(signature.param_at(7).unwrap().kind, ParamType::Bool);

        let fixed = Handler::new(|_a: i64| ());
        assert!(fixed.signature().param_at(1).is_none());
    }

    #[test]
    fn test_nullable_specs() {
        assert!(ParamSpec::of::<Option<i64>>().nullable);
        assert!(ParamSpec::of::<Value>().nullable);
        assert!(!ParamSpec::of::<i64>().nullable);
        assert_eq!(ParamSpec::of::<Option<String>>().kind, ParamType::Str);
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(value_kind(&json!(true)), Some(ParamType::Bool));
        assert_eq!(value_kind(&json!(3)), Some(ParamType::Int));
        assert_eq!(value_kind(&json!(3.5)), Some(ParamType::Float));
        assert_eq!(value_kind(&json!("s")), Some(ParamType::Str));
        assert_eq!(value_kind(&json!([1, 2])), Some(ParamType::Array));
        assert_eq!(value_kind(&json!({"k": 1})), Some(ParamType::Object));
        assert_eq!(value_kind(&Value::Null), None);
        assert_eq!(value_label(&Value::Null), "null");
    }

    #[test]
    fn test_accepts_int_into_float() {
        assert!(ParamType::Float.accepts(ParamType::Int));
        assert!(!ParamType::Int.accepts(ParamType::Float));
        assert!(ParamType::Any.accepts(ParamType::Object));
        assert!(!ParamType::Str.accepts(ParamType::Bool));
    }

    #[test]
    fn test_decode_out_of_range_is_type_mismatch() {
        let err = decode::<u8>(Some(json!(300)), 1).unwrap_err();
        assert_eq!(
            err,
            InvokeError::TypeMismatch {
                position: 1,
                actual: "integer",
                expected: ParamType::Int,
            }
        );
    }

    #[test]
    fn test_call_returns_encoded_result() {
        let handler = Handler::new(|a: i64, b: i64| a + b);
        let result = handler.call(vec![json!(2), json!(3)]).unwrap();
        assert_eq!(result, json!(5));
    }

    #[test]
    fn test_call_collects_variadic_tail() {
        let handler = Handler::new_variadic(|base: i64, rest: Vec<i64>| {
            rest.iter().fold(base, |acc, n| acc + n)
        });
        let result = handler.call(vec![json!(1), json!(2), json!(3)]).unwrap();
        assert_eq!(result, json!(6));
    }
}
