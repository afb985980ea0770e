//! Name resolution during linking.
//!
//! Scopes compose by delegation: an item scope falls back to the layout
//! scope, which falls back to the [`LinkContext`] owning types, functions
//! and inputs. Function bodies get a [`FunctionScope`] with no fallback.

use crate::bindings::HostRegistry;
use crate::error::LinkError;
use crate::expression::{Expression, Linked};
use crate::function::{Function, FunctionTable, Localizer};
use crate::parser::Span;
use crate::reactive::Signal;
use crate::types::{Type, TypeRegistry};
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

pub trait Scope {
    fn context(&self) -> &LinkContext;

    /// Resolves a dotted key path. `Ok(None)` means the name is unknown here.
    fn variable(&self, path: &[String], hint: Option<&Type>, span: Span) -> Result<Option<Linked>, LinkError>;

    fn function_for(&self, name: &str, parameter_types: &[Type]) -> Option<Rc<dyn Function>> {
        self.context().functions.exact(name, parameter_types)
    }

    fn functions_loose(&self, name: &str, arity: usize) -> Vec<Rc<dyn Function>> {
        self.context().functions.loose(name, arity)
    }
}

#[derive(Debug, Clone)]
pub struct InputBinding {
    pub ty: Type,
    pub signal: Signal,
}

/// Root scope of one build: the registries every other scope reaches through.
pub struct LinkContext {
    pub types: TypeRegistry,
    pub functions: FunctionTable,
    inputs: IndexMap<String, Option<InputBinding>>,
    localizer: Rc<dyn Localizer>,
    host: HostRegistry,
    list_cache_capacity: usize,
}

impl LinkContext {
    pub fn new(
        types: TypeRegistry,
        localizer: Rc<dyn Localizer>,
        host: HostRegistry,
        list_cache_capacity: usize,
    ) -> Self {
        let functions = FunctionTable::with_builtins(&types);
        Self {
            types,
            functions,
            inputs: IndexMap::new(),
            localizer,
            host,
            list_cache_capacity,
        }
    }

    /// Adds an input; `None` marks an input whose type was never declared.
    pub fn add_input(&mut self, path: impl Into<String>, binding: Option<InputBinding>) {
        self.inputs.insert(path.into(), binding);
    }

    pub fn localizer(&self) -> Rc<dyn Localizer> {
        self.localizer.clone()
    }

    pub fn host(&self) -> &HostRegistry {
        &self.host
    }

    pub fn list_cache_capacity(&self) -> usize {
        self.list_cache_capacity
    }
}

impl Scope for LinkContext {
    fn context(&self) -> &LinkContext {
        self
    }

    fn variable(&self, path: &[String], _hint: Option<&Type>, span: Span) -> Result<Option<Linked>, LinkError> {
        if let [type_name, key] = path {
            let enum_type = self
                .types
                .type_named(type_name)
                .filter(|ty| ty.enum_cases().is_some());
            if let Some(ty) = enum_type {
                let value = ty
                    .enum_cases()
                    .and_then(|cases| cases.get(key))
                    .cloned()
                    .ok_or_else(|| LinkError::UnknownEnumCase(type_name.clone(), key.clone(), span))?;
                return Ok(Some(Linked::constant(ty, value)));
            }
        }

        let name = path.join(".");
        match self.inputs.get(&name) {
            None => Ok(None),
            Some(None) => Err(LinkError::UntypedInput(name, span)),
            Some(Some(binding)) => Ok(Some(Linked {
                ty: binding.ty.clone(),
                sink: binding.signal.clone(),
            })),
        }
    }
}

#[derive(Debug)]
enum PropertyState {
    Unlinked(Expression),
    Linking,
    Linked(Linked),
}

/// Named expressions from the `properties` block, linked on first use.
#[derive(Debug, Default)]
pub struct PropertyTable {
    entries: IndexMap<String, RefCell<PropertyState>>,
}

impl PropertyTable {
    pub fn new(properties: impl IntoIterator<Item = (String, Expression)>) -> Self {
        let entries = properties
            .into_iter()
            .map(|(name, expression)| (name, RefCell::new(PropertyState::Unlinked(expression))))
            .collect();
        Self { entries }
    }

    fn link(
        &self,
        name: &str,
        scope: &dyn Scope,
        hint: Option<&Type>,
        span: Span,
    ) -> Result<Option<Linked>, LinkError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let expression = {
            let mut state = entry.borrow_mut();
            match &*state {
                PropertyState::Linked(linked) => return Ok(Some(linked.clone())),
                PropertyState::Linking => {
                    return Err(LinkError::CircularReference(name.to_string(), span));
                }
                PropertyState::Unlinked(expression) => {
                    let expression = expression.clone();
                    *state = PropertyState::Linking;
                    expression
                }
            }
        };
        match expression.link(scope, hint) {
            Ok(linked) => {
                *entry.borrow_mut() = PropertyState::Linked(linked.clone());
                Ok(Some(linked))
            }
            Err(error) => {
                *entry.borrow_mut() = PropertyState::Unlinked(expression);
                Err(error)
            }
        }
    }

    fn linked(&self, name: &str) -> Option<Linked> {
        match &*self.entries.get(name)?.borrow() {
            PropertyState::Linked(linked) => Some(linked.clone()),
            _ => None,
        }
    }
}

/// Scope of the layout: named properties first, then the link context.
pub struct LayoutScope {
    properties: PropertyTable,
    parent: Rc<dyn Scope>,
}

impl LayoutScope {
    pub fn new(properties: PropertyTable, parent: Rc<dyn Scope>) -> Self {
        Self { properties, parent }
    }

    /// The linked value of a named property, if it has been linked.
    pub fn property(&self, path: &str) -> Option<Linked> {
        self.properties.linked(path)
    }

    /// Links every property no view has referenced yet. Properties that can
    /// only be typed by their use site (such as `.case` shorthands) are left
    /// alone.
    pub fn link_all(&self) -> Result<(), LinkError> {
        for (name, entry) in &self.properties.entries {
            let span = match &*entry.borrow() {
                PropertyState::Unlinked(expression) if !expression.needs_hint() => expression.span,
                _ => continue,
            };
            self.properties.link(name, self, None, span)?;
        }
        Ok(())
    }
}

impl Scope for LayoutScope {
    fn context(&self) -> &LinkContext {
        self.parent.context()
    }

    fn variable(&self, path: &[String], hint: Option<&Type>, span: Span) -> Result<Option<Linked>, LinkError> {
        match self.properties.link(&path.join("."), self, hint, span)? {
            Some(linked) => Ok(Some(linked)),
            None => self.parent.variable(path, hint, span),
        }
    }
}

/// Scope of a function body: its arguments and nothing else.
pub struct FunctionScope<'a> {
    context: &'a LinkContext,
    arguments: &'a [(String, Linked)],
}

impl<'a> FunctionScope<'a> {
    pub fn new(context: &'a LinkContext, arguments: &'a [(String, Linked)]) -> Self {
        Self { context, arguments }
    }
}

impl Scope for FunctionScope<'_> {
    fn context(&self) -> &LinkContext {
        self.context
    }

    fn variable(&self, path: &[String], _hint: Option<&Type>, _span: Span) -> Result<Option<Linked>, LinkError> {
        let [name] = path else {
            return Ok(None);
        };
        Ok(self
            .arguments
            .iter()
            .find(|(argument, _)| argument == name)
            .map(|(_, linked)| linked.clone()))
    }
}

/// Name under which list item prototypes see their model record.
pub const ITEM: &str = "item";

/// Scope of one list item: `item` and `item.field` read the item's record.
pub struct ItemScope {
    model: Signal,
    shape: Type,
    tag: String,
    parent: Rc<dyn Scope>,
}

impl ItemScope {
    pub fn new(model: Signal, shape: Type, tag: impl Into<String>, parent: Rc<dyn Scope>) -> Self {
        Self {
            model,
            shape,
            tag: tag.into(),
            parent,
        }
    }
}

impl Scope for ItemScope {
    fn context(&self) -> &LinkContext {
        self.parent.context()
    }

    fn variable(&self, path: &[String], hint: Option<&Type>, span: Span) -> Result<Option<Linked>, LinkError> {
        match path {
            [head] if head == ITEM => Ok(Some(Linked {
                ty: self.shape.clone(),
                sink: self.model.clone(),
            })),
            [head, field] if head == ITEM => {
                let ty = self
                    .shape
                    .list_variants()
                    .and_then(|variants| variants.get(&self.tag))
                    .and_then(|fields| fields.get(field))
                    .cloned()
                    .ok_or_else(|| LinkError::UnknownField(self.tag.clone(), field.clone(), span))?;
                let field = field.clone();
                let sink = self.model.map(move |model| {
                    model
                        .as_record()
                        .and_then(|record| record.field(&field))
                        .cloned()
                        .unwrap_or(Value::Nil)
                });
                Ok(Some(Linked { ty, sink }))
            }
            _ => self.parent.variable(path, hint, span),
        }
    }
}
