//! Callable functions: built-ins evaluated natively and user declarations
//! whose body is re-linked at every call site.

use crate::error::LinkError;
use crate::expression::{Expression, Linked};
use crate::parser::Span;
use crate::reactive::Signal;
use crate::scope::{FunctionScope, LinkContext, Scope};
use crate::types::{Primitive, Type, TypeRegistry};
use crate::value::{Color, Font, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

pub trait Function {
    fn name(&self) -> &str;

    fn parameter_types(&self) -> &[Type];

    fn return_type(&self) -> &Type;

    /// Wires the call's output stream from already linked argument streams.
    fn sink(&self, scope: &dyn Scope, arguments: Vec<Signal>, span: Span) -> Result<Signal, LinkError>;

    fn signature(&self) -> String {
        let parameters: Vec<&str> = self.parameter_types().iter().map(|ty| ty.name()).collect();
        format!("{}({})", self.name(), parameters.join(", "))
    }
}

type Evaluator = fn(&[Value]) -> Value;

pub struct Builtin {
    name: &'static str,
    parameters: Vec<Type>,
    returns: Type,
    evaluate: Evaluator,
}

impl Function for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn parameter_types(&self) -> &[Type] {
        &self.parameters
    }

    fn return_type(&self) -> &Type {
        &self.returns
    }

    fn sink(&self, _scope: &dyn Scope, arguments: Vec<Signal>, _span: Span) -> Result<Signal, LinkError> {
        Ok(Signal::combine(&arguments, self.evaluate))
    }
}

fn numbers<const N: usize>(values: &[Value]) -> Option<[f64; N]> {
    let mut numbers = [0.0; N];
    for (slot, value) in numbers.iter_mut().zip(values) {
        *slot = value.as_number()?;
    }
    Some(numbers)
}

fn unary(values: &[Value], apply: fn(f64) -> f64) -> Value {
    numbers::<1>(values).map_or(Value::Nil, |[x]| Value::Number(apply(x)))
}

fn text(values: &[Value], apply: fn(&str) -> Value) -> Value {
    values.first().and_then(Value::as_str).map_or(Value::Nil, apply)
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

const BUILTINS: &[(&str, &[Primitive], Primitive, Evaluator)] = &[
    ("min", &[Primitive::Number, Primitive::Number], Primitive::Number, |values| {
        numbers::<2>(values).map_or(Value::Nil, |[a, b]| Value::Number(a.min(b)))
    }),
    ("max", &[Primitive::Number, Primitive::Number], Primitive::Number, |values| {
        numbers::<2>(values).map_or(Value::Nil, |[a, b]| Value::Number(a.max(b)))
    }),
    ("abs", &[Primitive::Number], Primitive::Number, |values| unary(values, f64::abs)),
    ("round", &[Primitive::Number], Primitive::Number, |values| unary(values, f64::round)),
    ("floor", &[Primitive::Number], Primitive::Number, |values| unary(values, f64::floor)),
    ("ceil", &[Primitive::Number], Primitive::Number, |values| unary(values, f64::ceil)),
    ("string", &[Primitive::Number], Primitive::String, |values| {
        Value::string(values[0].to_display_string())
    }),
    ("string", &[Primitive::Bool], Primitive::String, |values| {
        Value::string(values[0].to_display_string())
    }),
    ("length", &[Primitive::String], Primitive::Number, |values| {
        text(values, |text| Value::Number(text.chars().count() as f64))
    }),
    ("upper", &[Primitive::String], Primitive::String, |values| {
        text(values, |text| Value::string(text.to_uppercase()))
    }),
    ("lower", &[Primitive::String], Primitive::String, |values| {
        text(values, |text| Value::string(text.to_lowercase()))
    }),
    (
        "rgb",
        &[Primitive::Number, Primitive::Number, Primitive::Number],
        Primitive::Color,
        |values| {
            numbers::<3>(values).map_or(Value::Nil, |[r, g, b]| {
                Value::Color(Color::rgb(channel(r), channel(g), channel(b)))
            })
        },
    ),
    ("font", &[Primitive::String, Primitive::Number], Primitive::Font, |values| {
        match (values[0].as_str(), values[1].as_number()) {
            (Some(family), Some(size)) => Value::Font(Font {
                family: family.into(),
                size,
            }),
            _ => Value::Nil,
        }
    }),
    ("image", &[Primitive::String], Primitive::Image, |values| {
        values[0].as_str().map_or(Value::Nil, |name| Value::Image(name.into()))
    }),
];

/// Overloads by name, in declaration order.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: IndexMap<String, Vec<Rc<dyn Function>>>,
}

impl FunctionTable {
    pub fn with_builtins(types: &TypeRegistry) -> Self {
        let mut table = Self::default();
        for (name, parameters, returns, evaluate) in BUILTINS {
            let builtin = Builtin {
                name: *name,
                parameters: parameters.iter().map(|primitive| types.primitive(*primitive)).collect(),
                returns: types.primitive(*returns),
                evaluate: *evaluate,
            };
            table.insert(Rc::new(builtin));
        }
        table
    }

    fn insert(&mut self, function: Rc<dyn Function>) {
        self.functions
            .entry(function.name().to_string())
            .or_default()
            .push(function);
    }

    pub fn declare(&mut self, function: Rc<dyn Function>, span: Span) -> Result<(), LinkError> {
        if self.exact(function.name(), function.parameter_types()).is_some() {
            return Err(LinkError::DuplicateFunction(function.signature(), span));
        }
        self.insert(function);
        Ok(())
    }

    pub fn exact(&self, name: &str, parameter_types: &[Type]) -> Option<Rc<dyn Function>> {
        self.functions
            .get(name)?
            .iter()
            .find(|function| function.parameter_types() == parameter_types)
            .cloned()
    }

    pub fn loose(&self, name: &str, arity: usize) -> Vec<Rc<dyn Function>> {
        self.functions
            .get(name)
            .into_iter()
            .flatten()
            .filter(|function| function.parameter_types().len() == arity)
            .cloned()
            .collect()
    }
}

/// A function declared in the layout's `functions` block.
pub struct FunctionDeclaration {
    name: String,
    parameter_names: Vec<String>,
    parameter_types: Vec<Type>,
    return_type: Type,
    body: Expression,
}

impl FunctionDeclaration {
    /// Links the body once against placeholder arguments to find its return type.
    pub fn declare(
        context: &LinkContext,
        name: impl Into<String>,
        parameters: Vec<(String, Type)>,
        body: Expression,
    ) -> Result<Self, LinkError> {
        let placeholders: Vec<(String, Linked)> = parameters
            .iter()
            .map(|(name, ty)| {
                let linked = Linked {
                    ty: ty.clone(),
                    sink: Signal::new(),
                };
                (name.clone(), linked)
            })
            .collect();
        let scope = FunctionScope::new(context, &placeholders);
        let return_type = body.link(&scope, None)?.ty;
        let (parameter_names, parameter_types): (Vec<String>, Vec<Type>) = parameters.into_iter().unzip();
        Ok(Self {
            name: name.into(),
            parameter_names,
            parameter_types,
            return_type,
            body,
        })
    }
}

impl Function for FunctionDeclaration {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_types(&self) -> &[Type] {
        &self.parameter_types
    }

    fn return_type(&self) -> &Type {
        &self.return_type
    }

    fn sink(&self, scope: &dyn Scope, arguments: Vec<Signal>, _span: Span) -> Result<Signal, LinkError> {
        let arguments: Vec<(String, Linked)> = self
            .parameter_names
            .iter()
            .zip(&self.parameter_types)
            .zip(arguments)
            .map(|((name, ty), sink)| (name.clone(), Linked { ty: ty.clone(), sink }))
            .collect();
        let scope = FunctionScope::new(scope.context(), &arguments);
        let linked = self.body.instantiate().link(&scope, Some(&self.return_type))?;
        Ok(linked.sink)
    }
}

/// Host string table consulted by `@(...)`.
pub trait Localizer {
    fn localize(&self, key: &str) -> String;
}

pub struct IdentityLocalizer;

impl Localizer for IdentityLocalizer {
    fn localize(&self, key: &str) -> String {
        key.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapLocalizer {
    strings: HashMap<String, String>,
}

impl MapLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.strings.insert(key.into(), text.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapLocalizer {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            strings: iter
                .into_iter()
                .map(|(key, text)| (key.into(), text.into()))
                .collect(),
        }
    }
}

impl Localizer for MapLocalizer {
    fn localize(&self, key: &str) -> String {
        self.strings.get(key).cloned().unwrap_or_else(|| key.to_string())
    }
}

/// Localizes the first value, then substitutes each `%@` with the next value.
pub fn format_localized(localizer: &dyn Localizer, values: &[Value]) -> String {
    let Some((format, arguments)) = values.split_first() else {
        return String::new();
    };
    let format = localizer.localize(&format.to_display_string());
    let mut arguments = arguments.iter();
    let mut pieces = format.split("%@");
    let mut output = pieces.next().unwrap_or_default().to_string();
    for piece in pieces {
        match arguments.next() {
            Some(argument) => output.push_str(&argument.to_display_string()),
            None => output.push_str("%@"),
        }
        output.push_str(piece);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, tokenize};

    fn context() -> LinkContext {
        LinkContext::new(TypeRegistry::new(), Rc::new(IdentityLocalizer), Default::default(), 8)
    }

    fn parse(code: &str) -> Expression {
        parse_expression(&tokenize(code).unwrap(), code.len()).unwrap()
    }

    fn evaluate(context: &LinkContext, code: &str) -> Option<Value> {
        parse(code).link(context, None).unwrap().latest()
    }

    #[test]
    fn builtins_evaluate() {
        let context = context();
        assert_eq!(evaluate(&context, "min(4, 2) + abs(-3)"), Some(Value::Number(5.0)));
        assert_eq!(evaluate(&context, "upper(\"ab\") + string(true)"), Some(Value::string("ABtrue")));
        assert_eq!(evaluate(&context, "length(\"héllo\")"), Some(Value::Number(5.0)));
        assert_eq!(evaluate(&context, "rgb(255, 0, 300)"), Some(Value::Color(Color(0xff00ff))));
    }

    #[test]
    fn overloads_resolve_by_argument_type() {
        let context = context();
        assert_eq!(evaluate(&context, "string(1.5)"), Some(Value::string("1.5")));
        assert_eq!(evaluate(&context, "string(1 > 2)"), Some(Value::string("false")));
    }

    #[test]
    fn declared_functions_relink_per_call() {
        let mut context = context();
        let number = context.types.number();
        let declaration = FunctionDeclaration::declare(
            &context,
            "double",
            vec![("x".to_string(), number)],
            parse("x * 2"),
        )
        .unwrap();
        assert_eq!(declaration.return_type().name(), "Number");
        context.functions.declare(Rc::new(declaration), Span::from(0..0)).unwrap();
        assert_eq!(evaluate(&context, "double(3) + double(4)"), Some(Value::Number(14.0)));
    }

    #[test]
    fn function_bodies_cannot_see_outer_names() {
        let context = context();
        let error = FunctionDeclaration::declare(&context, "leak", vec![], parse("Axis.vertical"))
            .err()
            .unwrap();
        assert!(matches!(error, LinkError::UnknownVariable(..)));
    }

    #[test]
    fn duplicate_declarations_fail() {
        let mut context = context();
        let number = context.types.number();
        let declaration =
            FunctionDeclaration::declare(&context, "abs", vec![("x".to_string(), number)], parse("x"))
                .unwrap();
        let error = context.functions.declare(Rc::new(declaration), Span::from(3..6)).unwrap_err();
        assert_eq!(error.to_string(), "function abs(Number) is already declared");
    }

    #[test]
    fn localized_formatting() {
        let localizer: MapLocalizer = [("greeting %@ %@", "%@ says hi to %@")].into_iter().collect();
        let values = [
            Value::string("greeting %@ %@"),
            Value::string("Ada"),
            Value::Number(2.0),
        ];
        assert_eq!(format_localized(&localizer, &values), "Ada says hi to 2");
        assert_eq!(format_localized(&IdentityLocalizer, &[Value::string("%@!")]), "%@!");
    }
}
