//! Turns the generic item tree into a layout document: checks the top-level
//! block structure, registers declared types and builds view templates.

use super::{Item, ItemBody, Span};
use crate::bindings::{BindingKind, HostRegistry};
use crate::error::ParseError;
use crate::expression::{Expression, ExpressionKind};
use crate::types::{EnumDefinition, ListShapeDefinition, Type, TypeRegistry};
use crate::value::Value;
use crate::view::{ViewKind, ViewTemplate, composite_fields};
use indexmap::IndexMap;

const BLOCK_ORDER: [&str; 6] = ["bindings", "types", "inputs", "properties", "functions", "layout"];

#[derive(Debug, Clone)]
pub struct InputDeclaration {
    pub path: String,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionItem {
    pub name: String,
    pub parameters: Vec<(String, Type)>,
    pub body: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub bindings: IndexMap<String, BindingKind>,
    pub input_types: Vec<InputDeclaration>,
    pub properties: Vec<(String, Expression)>,
    pub functions: Vec<FunctionItem>,
    pub layers: Vec<ViewTemplate>,
}

/// Builds the document. Declared types are registered into `types`;
/// `inputs` lists the host's inputs with their registered type, if any.
pub fn build_document(
    items: Vec<Item>,
    host: &HostRegistry,
    types: &mut TypeRegistry,
    inputs: &IndexMap<String, Option<Type>>,
) -> Result<Document, ParseError> {
    let mut document = Document::default();
    let mut previous: Option<usize> = None;
    let mut has_layout = false;
    let end = items.last().map_or(Span::from(0..0), |item| Span::from(item.span.end..item.span.end));

    for item in items {
        let Some(order) = BLOCK_ORDER.iter().position(|block| *block == item.name) else {
            return Err(ParseError::UnknownBlock(item.name, item.span));
        };
        if previous.is_some_and(|previous| previous >= order) {
            return Err(ParseError::MisplacedBlock(item.name, item.span));
        }
        previous = Some(order);
        let ItemBody::Block(entries) = item.body else {
            return Err(ParseError::ExpectedBlock(item.name, item.span));
        };
        match BLOCK_ORDER[order] {
            "bindings" => document.bindings = bindings(entries, host)?,
            "types" => declare_types(entries, types)?,
            "inputs" => input_declarations("", entries, types, inputs, &mut document.input_types)?,
            "properties" => properties("", entries, &mut document.properties)?,
            "functions" => document.functions = functions(entries, types)?,
            _ => {
                document.layers = layers(entries, &document.bindings, item.span)?;
                has_layout = true;
            }
        }
    }

    if !has_layout {
        return Err(ParseError::MissingLayout(end));
    }
    log::debug!(
        "document: {} bindings, {} inputs, {} properties, {} functions, {} layers",
        document.bindings.len(),
        document.input_types.len(),
        document.properties.len(),
        document.functions.len(),
        document.layers.len()
    );
    Ok(document)
}

/// The identifier of a single-segment key path, as used for type names.
fn single_name(expression: &Expression) -> Option<&str> {
    match &expression.kind {
        ExpressionKind::KeyPath(path) if path.len() == 1 => Some(&path[0]),
        _ => None,
    }
}

fn constant_value(expression: &Expression) -> Option<Value> {
    match &expression.kind {
        ExpressionKind::Constant(value) => Some(value.clone()),
        ExpressionKind::Negate(operand) => match constant_value(operand)? {
            Value::Number(number) => Some(Value::Number(-number)),
            _ => None,
        },
        _ => None,
    }
}

fn resolve_type(types: &TypeRegistry, name: &str, span: Span) -> Result<Type, ParseError> {
    types
        .type_named(name)
        .ok_or_else(|| ParseError::UnknownType(name.to_string(), span))
}

fn bindings(entries: Vec<Item>, host: &HostRegistry) -> Result<IndexMap<String, BindingKind>, ParseError> {
    let mut bindings = IndexMap::new();
    for entry in entries {
        let ItemBody::Value(value) = &entry.body else {
            return Err(ParseError::InvalidDeclaration("bindings", entry.name, entry.span));
        };
        let Some(kind_name) = single_name(value) else {
            return Err(ParseError::InvalidDeclaration("bindings", entry.name, value.span));
        };
        let kind = BindingKind::from_name(kind_name)
            .ok_or_else(|| ParseError::UnknownBindingKind(kind_name.to_string(), value.span))?;
        if host.get(&entry.name).map(|object| object.kind()) != Some(kind) {
            return Err(ParseError::UnboundHostObject(
                entry.name,
                kind.name().to_string(),
                entry.span,
            ));
        }
        if bindings.insert(entry.name.clone(), kind).is_some() {
            return Err(ParseError::DuplicateProperty(entry.name, entry.span));
        }
    }
    Ok(bindings)
}

fn declare_types(entries: Vec<Item>, types: &mut TypeRegistry) -> Result<(), ParseError> {
    for entry in entries {
        let ItemBody::Block(cases) = entry.body else {
            return Err(ParseError::ExpectedBlock(entry.name, entry.span));
        };
        let is_list = !cases.is_empty()
            && cases
                .iter()
                .all(|case| matches!(case.body, ItemBody::Block(_)));
        let registered = if is_list {
            types.register_list(list_shape(&entry.name, cases)?)
        } else {
            types.register_enum(enumeration(&entry.name, cases)?)
        };
        registered.map_err(|error| ParseError::Registration(error, entry.span))?;
    }
    Ok(())
}

fn enumeration(name: &str, cases: Vec<Item>) -> Result<EnumDefinition, ParseError> {
    let mut definition = EnumDefinition::new(name);
    for (ordinal, case) in cases.into_iter().enumerate() {
        let value = match &case.body {
            ItemBody::Bare => Value::Number(ordinal as f64),
            ItemBody::Value(value) => constant_value(value)
                .ok_or_else(|| ParseError::InvalidDeclaration("types", case.name.clone(), value.span))?,
            _ => return Err(ParseError::InvalidDeclaration("types", case.name, case.span)),
        };
        if definition.cases.contains_key(&case.name) {
            return Err(ParseError::DuplicateProperty(case.name, case.span));
        }
        definition = definition.case(case.name, value);
    }
    Ok(definition)
}

fn list_shape(name: &str, variants: Vec<Item>) -> Result<ListShapeDefinition, ParseError> {
    let mut definition = ListShapeDefinition::new(name);
    for variant in variants {
        let ItemBody::Block(fields) = variant.body else {
            return Err(ParseError::ExpectedBlock(variant.name, variant.span));
        };
        let mut declared = IndexMap::new();
        for field in fields {
            let type_name = match &field.body {
                ItemBody::Value(value) => single_name(value).map(str::to_string),
                _ => None,
            };
            let Some(type_name) = type_name else {
                return Err(ParseError::InvalidDeclaration("types", field.name, field.span));
            };
            declared.insert(field.name, type_name);
        }
        definition
            .variants
            .insert(variant.name, declared);
    }
    Ok(definition)
}

fn input_declarations(
    prefix: &str,
    entries: Vec<Item>,
    types: &TypeRegistry,
    inputs: &IndexMap<String, Option<Type>>,
    declarations: &mut Vec<InputDeclaration>,
) -> Result<(), ParseError> {
    for entry in entries {
        let path = format!("{prefix}{}", entry.name);
        match entry.body {
            ItemBody::Block(children) => {
                input_declarations(&format!("{path}."), children, types, inputs, declarations)?;
            }
            ItemBody::Value(value) => {
                let Some(type_name) = single_name(&value) else {
                    return Err(ParseError::InvalidDeclaration("inputs", path, value.span));
                };
                let ty = resolve_type(types, type_name, value.span)?;
                match inputs.get(&path) {
                    None => return Err(ParseError::UnknownInput(path, entry.span)),
                    Some(Some(registered)) if *registered != ty => {
                        return Err(ParseError::InputTypeConflict(
                            path,
                            registered.name().to_string(),
                            entry.span,
                        ));
                    }
                    Some(_) => {}
                }
                declarations.push(InputDeclaration {
                    path,
                    ty,
                    span: entry.span,
                });
            }
            _ => return Err(ParseError::InvalidDeclaration("inputs", path, entry.span)),
        }
    }
    Ok(())
}

fn properties(
    prefix: &str,
    entries: Vec<Item>,
    properties: &mut Vec<(String, Expression)>,
) -> Result<(), ParseError> {
    for entry in entries {
        let path = format!("{prefix}{}", entry.name);
        match entry.body {
            ItemBody::Block(children) => self::properties(&format!("{path}."), children, properties)?,
            ItemBody::Value(value) => {
                if properties.iter().any(|(existing, _)| *existing == path) {
                    return Err(ParseError::DuplicateProperty(path, entry.span));
                }
                properties.push((path, value));
            }
            _ => return Err(ParseError::InvalidDeclaration("properties", path, entry.span)),
        }
    }
    Ok(())
}

fn functions(entries: Vec<Item>, types: &TypeRegistry) -> Result<Vec<FunctionItem>, ParseError> {
    entries
        .into_iter()
        .map(|entry| {
            let ItemBody::Function { parameters, body } = entry.body else {
                return Err(ParseError::InvalidDeclaration("functions", entry.name, entry.span));
            };
            let parameters = parameters
                .into_iter()
                .map(|parameter| {
                    let ty = resolve_type(types, &parameter.type_name, parameter.span)?;
                    Ok((parameter.name, ty))
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            Ok(FunctionItem {
                name: entry.name,
                parameters,
                body,
                span: entry.span,
            })
        })
        .collect()
}

fn layers(
    entries: Vec<Item>,
    bindings: &IndexMap<String, BindingKind>,
    span: Span,
) -> Result<Vec<ViewTemplate>, ParseError> {
    if entries.is_empty() {
        return Err(ParseError::InvalidDeclaration("layout", "no layers".to_string(), span));
    }
    entries
        .into_iter()
        .map(|entry| match entry.body {
            ItemBody::Block(children) if entry.name == "layer" => {
                let mut layer = ViewTemplate::new(ViewKind::Layer, entry.span);
                build_view(&mut layer, children, bindings)?;
                Ok(layer)
            }
            _ if entry.name == "layer" => Err(ParseError::ExpectedBlock(entry.name, entry.span)),
            _ => Err(ParseError::InvalidDeclaration(
                "layout",
                format!("expected layer, found '{}'", entry.name),
                entry.span,
            )),
        })
        .collect()
}

fn set_property(
    view: &mut ViewTemplate,
    name: String,
    value: Expression,
    span: Span,
) -> Result<(), ParseError> {
    if view.kind.property_type(&name).is_none() {
        return Err(ParseError::UnknownProperty(name, view.kind.name().to_string(), span));
    }
    if view.properties.contains_key(&name) {
        return Err(ParseError::DuplicateProperty(name, span));
    }
    view.properties.insert(name, value);
    Ok(())
}

/// The kind of a nested view named `name`, if there is one.
fn view_kind(name: &str, bindings: &IndexMap<String, BindingKind>) -> Option<(ViewKind, Option<String>)> {
    if let Some(kind) = ViewKind::from_keyword(name) {
        return Some((kind, None));
    }
    let binding = bindings.get(name)?;
    Some((binding.view_kind(), Some(name.to_string())))
}

fn nested_view(
    parent: &mut ViewTemplate,
    name: String,
    children: Vec<Item>,
    span: Span,
    bindings: &IndexMap<String, BindingKind>,
) -> Result<(), ParseError> {
    if name == "layer" {
        return Err(ParseError::NestedLayer(span));
    }
    let Some((kind, binding)) = view_kind(&name, bindings) else {
        return Err(ParseError::UnknownView(name, span));
    };
    if !parent.kind.is_container() {
        return Err(ParseError::NotAContainer(parent.kind.name().to_string(), span));
    }
    let mut view = ViewTemplate::new(kind, span);
    view.binding = binding;
    build_view(&mut view, children, bindings)?;
    parent.children.push(view);
    Ok(())
}

fn build_view(
    view: &mut ViewTemplate,
    entries: Vec<Item>,
    bindings: &IndexMap<String, BindingKind>,
) -> Result<(), ParseError> {
    for entry in entries {
        let Item { name, span, body } = entry;
        match body {
            ItemBody::Value(value) => match composite_fields(&name) {
                Some(fields) => {
                    for field in fields {
                        set_property(view, format!("{name}.{field}"), value.clone(), span)?;
                    }
                }
                None => set_property(view, name, value, span)?,
            },
            ItemBody::Block(children) if composite_fields(&name).is_some() => {
                for child in children {
                    let ItemBody::Value(value) = child.body else {
                        return Err(ParseError::InvalidDeclaration(
                            "layout",
                            format!("{name}.{}", child.name),
                            child.span,
                        ));
                    };
                    set_property(view, format!("{name}.{}", child.name), value, child.span)?;
                }
            }
            ItemBody::Block(children) if view.kind == ViewKind::List => {
                if view.prototypes.contains_key(&name) {
                    return Err(ParseError::DuplicateProperty(name, span));
                }
                let mut prototype = ViewTemplate::new(ViewKind::Stack, span);
                build_view(&mut prototype, children, bindings)?;
                view.prototypes.insert(name, prototype);
            }
            ItemBody::Block(children) => nested_view(view, name, children, span, bindings)?,
            ItemBody::Bare if view_kind(&name, bindings).is_some() || name == "layer" => {
                nested_view(view, name, Vec::new(), span, bindings)?;
            }
            ItemBody::Bare => {
                return Err(ParseError::UnknownProperty(name, view.kind.name().to_string(), span));
            }
            ItemBody::Function { .. } => {
                return Err(ParseError::InvalidDeclaration("layout", name, span));
            }
        }
    }
    if view.kind == ViewKind::List && !view.properties.contains_key("items") {
        return Err(ParseError::MissingItems(view.span));
    }
    Ok(())
}
