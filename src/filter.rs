use crate::error::Result;
use crate::value::Value;

/// Argument a filter declares it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    None,
    Optional,
    Required,
}

/// A named, pure transformation applied to a resolved value.
///
/// Arity is checked against [`Filter::argument`] before `apply` runs; `apply`
/// itself validates the argument's type and reports a
/// [`crate::Error::FilterArgument`] on mismatch.
pub trait Filter: Send + Sync {
    fn argument(&self) -> Argument {
        Argument::Optional
    }

    fn apply(&self, input: Value, arg: Option<Value>, autoescape: bool) -> Result<Value>;
}

pub struct FilterFn<F> {
    argument: Argument,
    f: F,
}

/// Turn a closure into a [`Filter`] with the given argument contract.
pub fn filter_fn<F>(argument: Argument, f: F) -> FilterFn<F>
where
    F: Fn(Value, Option<Value>, bool) -> Result<Value> + Send + Sync,
{
    FilterFn { argument, f }
}

impl<F> Filter for FilterFn<F>
where
    F: Fn(Value, Option<Value>, bool) -> Result<Value> + Send + Sync,
{
    fn argument(&self) -> Argument {
        self.argument
    }

    fn apply(&self, input: Value, arg: Option<Value>, autoescape: bool) -> Result<Value> {
        (self.f)(input, arg, autoescape)
    }
}
