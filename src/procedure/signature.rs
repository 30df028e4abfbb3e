use std::{any::type_name, fmt};

use specta::{datatype::DataType, Generics, Type, TypeMap};

use crate::SignatureError;

/// The type of a procedure's input or output.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    type_name: &'static str,
    data_type: DataType,
}

impl Shape {
    pub fn of<T: Type>() -> Self {
        Self {
            type_name: type_name::<T>(),
            data_type: T::inline(&mut TypeMap::default(), Generics::Definition),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The [Specta](https://docs.rs/specta) description of the type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

/// One parameter or result of a callable.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// The [`RequestContext`](crate::RequestContext).
    Context,
    /// The trailing error result.
    Error,
    /// A user defined value.
    Value(Shape),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Context => write!(f, "RequestContext"),
            Slot::Error => write!(f, "Error"),
            Slot::Value(shape) => write!(f, "{}", shape.type_name),
        }
    }
}

/// Which calling convention a procedure uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Context,
    ContextInput,
    ContextOutput,
    ContextInputOutput,
}

/// The parameters and results of a callable.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Slot>,
    pub results: Vec<Slot>,
}

impl Signature {
    pub fn new(params: Vec<Slot>, results: Vec<Slot>) -> Self {
        Self { params, results }
    }

    /// Check the calling convention and infer the input and output shapes.
    pub fn validate(&self) -> Result<(Kind, Option<Shape>, Option<Shape>), SignatureError> {
        let input = match self.params.as_slice() {
            [first, rest @ ..] if rest.len() <= 1 => {
                if *first != Slot::Context {
                    return Err(SignatureError::Param {
                        position: 0,
                        expected: "RequestContext",
                        found: first.to_string(),
                    });
                }

                match rest {
                    [] => None,
                    [Slot::Value(shape)] => Some(shape.clone()),
                    [other, ..] => {
                        return Err(SignatureError::Param {
                            position: 1,
                            expected: "input value",
                            found: other.to_string(),
                        })
                    }
                }
            }
            params => return Err(SignatureError::ParamCount(params.len())),
        };

        let output = match self.results.as_slice() {
            [rest @ .., last] if rest.len() <= 1 => {
                if *last != Slot::Error {
                    return Err(SignatureError::Return {
                        position: rest.len(),
                        expected: "Error",
                        found: last.to_string(),
                    });
                }

                match rest {
                    [] => None,
                    [Slot::Value(shape)] => Some(shape.clone()),
                    [other, ..] => {
                        return Err(SignatureError::Return {
                            position: 0,
                            expected: "output value",
                            found: other.to_string(),
                        })
                    }
                }
            }
            results => return Err(SignatureError::ReturnCount(results.len())),
        };

        let kind = match (&input, &output) {
            (None, None) => Kind::Context,
            (Some(_), None) => Kind::ContextInput,
            (None, Some(_)) => Kind::ContextOutput,
            (Some(_), Some(_)) => Kind::ContextInputOutput,
        };

        Ok((kind, input, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<T: Type>() -> Slot {
        Slot::Value(Shape::of::<T>())
    }

    #[test]
    fn valid_conventions() {
        let cases = [
            (Signature::new(vec![Slot::Context], vec![Slot::Error]), Kind::Context),
            (
                Signature::new(vec![Slot::Context, value::<String>()], vec![Slot::Error]),
                Kind::ContextInput,
            ),
            (
                Signature::new(vec![Slot::Context], vec![value::<i32>(), Slot::Error]),
                Kind::ContextOutput,
            ),
            (
                Signature::new(
                    vec![Slot::Context, value::<String>()],
                    vec![value::<i32>(), Slot::Error],
                ),
                Kind::ContextInputOutput,
            ),
        ];

        for (signature, expected) in cases {
            let (kind, input, output) = signature.validate().unwrap();
            assert_eq!(kind, expected);
            assert_eq!(input.is_some(), signature.params.len() == 2);
            assert_eq!(output.is_some(), signature.results.len() == 2);
        }
    }

    #[test]
    fn round_trips_shapes() {
        let (_, input, output) = Signature::new(
            vec![Slot::Context, value::<String>()],
            vec![value::<Vec<i32>>(), Slot::Error],
        )
        .validate()
        .unwrap();

        assert_eq!(input, Some(Shape::of::<String>()));
        assert_eq!(output.unwrap().type_name(), "alloc::vec::Vec<i32>");
    }

    #[test]
    fn wrong_arity() {
        assert_eq!(
            Signature::new(vec![], vec![Slot::Error]).validate(),
            Err(SignatureError::ParamCount(0))
        );
        assert_eq!(
            Signature::new(
                vec![Slot::Context, value::<i32>(), value::<i32>()],
                vec![Slot::Error]
            )
            .validate(),
            Err(SignatureError::ParamCount(3))
        );
        assert_eq!(
            Signature::new(vec![Slot::Context], vec![]).validate(),
            Err(SignatureError::ReturnCount(0))
        );
        assert_eq!(
            Signature::new(
                vec![Slot::Context],
                vec![value::<i32>(), value::<i32>(), Slot::Error]
            )
            .validate(),
            Err(SignatureError::ReturnCount(3))
        );
    }

    #[test]
    fn wrong_positions() {
        assert_eq!(
            Signature::new(vec![value::<i32>()], vec![Slot::Error]).validate(),
            Err(SignatureError::Param {
                position: 0,
                expected: "RequestContext",
                found: "i32".into(),
            })
        );
        assert_eq!(
            Signature::new(vec![Slot::Context, Slot::Context], vec![Slot::Error]).validate(),
            Err(SignatureError::Param {
                position: 1,
                expected: "input value",
                found: "RequestContext".into(),
            })
        );
        assert_eq!(
            Signature::new(vec![Slot::Context], vec![value::<i32>()]).validate(),
            Err(SignatureError::Return {
                position: 0,
                expected: "Error",
                found: "i32".into(),
            })
        );
        assert_eq!(
            Signature::new(vec![Slot::Context], vec![Slot::Error, Slot::Error]).validate(),
            Err(SignatureError::Return {
                position: 0,
                expected: "output value",
                found: "Error".into(),
            })
        );
        assert_eq!(
            Signature::new(vec![Slot::Context], vec![value::<i32>(), value::<i32>()])
                .validate()
                .unwrap_err()
                .to_string(),
            "result 1 must be `Error` but is `i32`"
        );
    }
}
