//! Validated dispatch to type-erased handlers

use std::any::Any;

use serde_json::Value;

use super::handler::{value_kind, Handler, Signature};
use super::InvokeError;

/// Call a type-erased target with a list of argument values
///
/// The target must hold a [`Handler`]; anything else fails with
/// [`InvokeError::NotCallable`]. The argument list is checked against the
/// handler's signature before the call: the arity must match (exactly for
/// fixed signatures, at least the fixed count for variadic ones), and each
/// value's JSON kind must be assignable to its parameter spec. Null binds
/// only to nullable parameters. On success the handler runs and its result
/// is returned encoded as a [`Value`].
pub fn invoke(target: &(dyn Any + Send + Sync), args: &[Value]) -> Result<Value, InvokeError> {
    let handler = match target.downcast_ref::<Handler>() {
        Some(handler) => handler,
        None => return Err(InvokeError::NotCallable),
    };

    check_args(handler.signature(), args)?;
    handler.call(args.to_vec())
}

/// Validate an argument list against a signature
fn check_args(signature: &Signature, args: &[Value]) -> Result<(), InvokeError> {
    let want = signature.arity();

    if signature.is_variadic() {
        if args.len() < want {
            return Err(InvokeError::ArityMismatch {
                got: args.len(),
                want,
                variadic: true,
            });
        }
    } else if args.len() != want {
        return Err(InvokeError::ArityMismatch {
            got: args.len(),
            want,
            variadic: false,
        });
    }

    for (position, value) in args.iter().enumerate() {
        let spec = match signature.param_at(position) {
            Some(spec) => spec,
            None => break,
        };

        match value_kind(value) {
            None => {
                if !spec.nullable {
                    return Err(InvokeError::TypeMismatch {
                        position,
                        actual: "null",
                        expected: spec.kind,
                    });
                }
            }
            Some(actual) => {
                if !spec.kind.accepts(actual) {
                    return Err(InvokeError::TypeMismatch {
                        position,
                        actual: actual.label(),
                        expected: spec.kind,
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::handler::ParamType;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_not_callable() {
        let target = 42i64;
        let err = invoke(&target, &[]).unwrap_err();
        assert_eq!(err, InvokeError::NotCallable);
    }

    #[test]
    fn test_exact_arity_enforced() {
        let handler = Handler::new(|_a: i64, _b: i64| ());

        let err = invoke(&handler, &[json!(1)]).unwrap_err();
        assert_eq!(
            err,
            InvokeError::ArityMismatch {
                got: 1,
                want: 2,
                variadic: false,
            }
        );

        let err = invoke(&handler, &[json!(1), json!(2), json!(3)]).unwrap_err();
        assert_eq!(
            err,
            InvokeError::ArityMismatch {
                got: 3,
                want: 2,
                variadic: false,
            }
        );

        assert!(invoke(&handler, &[json!(1), json!(2)]).is_ok());
    }

    #[test]
    fn test_variadic_arity_is_lower_bound() {
        let handler = Handler::new_variadic(|_prefix: String, _rest: Vec<i64>| ());

        let err = invoke(&handler, &[]).unwrap_err();
        assert_eq!(
            err,
            InvokeError::ArityMismatch {
                got: 0,
                want: 1,
                variadic: true,
            }
        );

        assert!(invoke(&handler, &[json!("p")]).is_ok());
        assert!(invoke(&handler, &[json!("p"), json!(1), json!(2), json!(3)]).is_ok());
    }

    #[test]
    fn test_type_mismatch_reports_position() {
        let handler = Handler::new(|_a: i64, _b: String| ());

        let err = invoke(&handler, &[json!(1), json!(2)]).unwrap_err();
        assert_eq!(
            err,
            InvokeError::TypeMismatch {
                position: 1,
                actual: "integer",
                expected: ParamType::Str,
            }
        );
    }

    #[test]
    fn test_variadic_tail_positions_checked() {
        let handler = Handler::new_variadic(|_rest: Vec<i64>| ());

        let err = invoke(&handler, &[json!(1), json!("no")]).unwrap_err();
        assert_eq!(
            err,
            InvokeError::TypeMismatch {
                position: 1,
                actual: "string",
                expected: ParamType::Int,
            }
        );
    }

    #[test]
    fn test_null_binds_to_nullable_only() {
        let nullable = Handler::new(|message: Option<String>| message.is_none());
        let result = invoke(&nullable, &[serde_json::Value::Null]).unwrap();
        assert_eq!(result, json!(true));

        let strict = Handler::new(|_message: String| ());
        let err = invoke(&strict, &[serde_json::Value::Null]).unwrap_err();
        assert_eq!(
            err,
            InvokeError::TypeMismatch {
                position: 0,
                actual: "null",
                expected: ParamType::Str,
            }
        );
    }

    #[test]
    fn test_integer_binds_to_float_param() {
        let handler = Handler::new(|half: f64| half * 2.0);
        let result = invoke(&handler, &[json!(2)]).unwrap();
        assert_eq!(result, json!(4.0));
    }

    #[test]
    fn test_call_side_effects_run_once() {
        let counter = Arc::new(AtomicI64::new(0));
        let captured = Arc::clone(&counter);
        let handler = Handler::new(move |n: i64| {
            captured.fetch_add(n, Ordering::SeqCst);
        });

        invoke(&handler, &[json!(5)]).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_zero_arity_call() {
        let handler = Handler::new(|| "done");
        let result = invoke(&handler, &[]).unwrap();
        assert_eq!(result, json!("done"));
    }
}
