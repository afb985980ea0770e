//! Host-facing entry point: registration of inputs, types and host objects,
//! and the build pipeline turning layout source into a linked view tree.

use crate::bindings::{BindingKind, HostObject, HostRegistry};
use crate::error::{BuildError, RegistrationError};
use crate::expression::Linked;
use crate::function::{FunctionDeclaration, IdentityLocalizer, Localizer};
use crate::parser::{Document, SourceCode, build_document, parse_expression, parse_items, tokenize};
use crate::reactive::Signal;
use crate::scope::{InputBinding, LayoutScope, LinkContext, PropertyTable, Scope};
use crate::types::{EnumDefinition, ListShapeDefinition, Type, TypeRegistry};
use crate::value::Value;
use crate::view::{View, ViewSnapshot};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum keyed and pooled entries per list item cache.
    pub list_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            list_cache_capacity: 32,
        }
    }
}

struct InputEntry {
    signal: Signal,
    ty: Option<Type>,
}

pub struct Engine {
    config: EngineConfig,
    types: TypeRegistry,
    inputs: IndexMap<String, InputEntry>,
    host: HostRegistry,
    localizer: Rc<dyn Localizer>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            types: TypeRegistry::new(),
            inputs: IndexMap::new(),
            host: HostRegistry::default(),
            localizer: Rc::new(IdentityLocalizer),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Registers an input whose type the layout declares in its `inputs` block.
    pub fn register_input(&mut self, name: impl Into<String>) -> Result<Signal, RegistrationError> {
        self.insert_input(name.into(), None)
    }

    pub fn register_typed_input(
        &mut self,
        name: impl Into<String>,
        type_name: &str,
    ) -> Result<Signal, RegistrationError> {
        let ty = self
            .types
            .type_named(type_name)
            .ok_or_else(|| RegistrationError::UnknownType(type_name.to_string()))?;
        self.insert_input(name.into(), Some(ty))
    }

    fn insert_input(&mut self, name: String, ty: Option<Type>) -> Result<Signal, RegistrationError> {
        if self.inputs.contains_key(&name) {
            return Err(RegistrationError::DuplicateInput(name));
        }
        let signal = Signal::new();
        self.inputs.insert(
            name,
            InputEntry {
                signal: signal.clone(),
                ty,
            },
        );
        Ok(signal)
    }

    pub fn input(&self, name: &str) -> Option<Signal> {
        self.inputs.get(name).map(|entry| entry.signal.clone())
    }

    pub fn register_enum(&mut self, definition: EnumDefinition) -> Result<Type, RegistrationError> {
        self.types.register_enum(definition)
    }

    pub fn register_list(&mut self, definition: ListShapeDefinition) -> Result<Type, RegistrationError> {
        self.types.register_list(definition)
    }

    pub fn register_view(&mut self, name: impl Into<String>) -> Result<(), RegistrationError> {
        self.host.register(name, HostObject::View)
    }

    pub fn register_button(
        &mut self,
        name: impl Into<String>,
        action: impl Fn() + 'static,
    ) -> Result<(), RegistrationError> {
        self.host.register(name, HostObject::Button(Rc::new(action)))
    }

    pub fn register_list_action(
        &mut self,
        name: impl Into<String>,
        action: impl Fn(usize, &Value) + 'static,
    ) -> Result<(), RegistrationError> {
        self.host.register(name, HostObject::List(Rc::new(action)))
    }

    pub fn set_localizer(&mut self, localizer: impl Localizer + 'static) {
        self.localizer = Rc::new(localizer);
    }

    /// Creates the root scope of a build. Inputs without a type, neither
    /// registered nor declared, are known by name but cannot be read.
    fn link_context(&self, types: TypeRegistry, declared: &IndexMap<String, Type>) -> LinkContext {
        let mut context = LinkContext::new(
            types,
            self.localizer.clone(),
            self.host.clone(),
            self.config.list_cache_capacity,
        );
        for (name, entry) in &self.inputs {
            let binding = entry
                .ty
                .clone()
                .or_else(|| declared.get(name).cloned())
                .map(|ty| InputBinding {
                    signal: checked_input(name, &entry.signal, &ty),
                    ty,
                });
            context.add_input(name.clone(), binding);
        }
        context
    }

    /// Scans, parses and links `source`. Either every layer links or the
    /// first error is returned.
    pub fn build(&self, source: &str) -> Result<Layout, BuildError> {
        let code = SourceCode::new(source);

        log::debug!("scanning {} bytes", source.len());
        let tokens = tokenize(source).map_err(BuildError::lex)?;

        log::debug!("parsing {} tokens", tokens.len());
        let items = parse_items(&tokens, source.len()).map_err(|error| BuildError::parse(error, &code))?;

        let mut types = self.types.clone();
        let registered: IndexMap<String, Option<Type>> = self
            .inputs
            .iter()
            .map(|(name, entry)| (name.clone(), entry.ty.clone()))
            .collect();
        let Document {
            bindings,
            input_types,
            properties,
            functions,
            layers,
        } = build_document(items, &self.host, &mut types, &registered)
            .map_err(|error| BuildError::parse(error, &code))?;

        log::debug!("binding {} inputs", self.inputs.len());
        let declared: IndexMap<String, Type> = input_types
            .into_iter()
            .map(|declaration| (declaration.path, declaration.ty))
            .collect();
        let mut context = self.link_context(types, &declared);

        log::debug!("declaring {} functions", functions.len());
        for function in functions {
            let declaration =
                FunctionDeclaration::declare(&context, function.name, function.parameters, function.body)
                    .map_err(|error| BuildError::link(error, &code))?;
            context
                .functions
                .declare(Rc::new(declaration), function.span)
                .map_err(|error| BuildError::link(error, &code))?;
        }

        log::debug!("linking {} layers", layers.len());
        let context: Rc<dyn Scope> = Rc::new(context);
        let layout_scope = Rc::new(LayoutScope::new(PropertyTable::new(properties), context));
        let scope: Rc<dyn Scope> = layout_scope.clone();
        let layers = layers
            .iter()
            .map(|layer| layer.link(&scope, None))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| BuildError::link(error, &code))?;
        layout_scope
            .link_all()
            .map_err(|error| BuildError::link(error, &code))?;

        Ok(Layout {
            layers,
            properties: layout_scope,
            bindings,
        })
    }

    /// Links a standalone expression against the registered inputs.
    pub fn link_expression(&self, source: &str) -> Result<Linked, BuildError> {
        let code = SourceCode::new(source);
        let tokens = tokenize(source).map_err(BuildError::lex)?;
        let expression =
            parse_expression(&tokens, source.len()).map_err(|error| BuildError::parse(error, &code))?;
        let context = self.link_context(self.types.clone(), &IndexMap::new());
        expression
            .link(&context, None)
            .map_err(|error| BuildError::link(error, &code))
    }
}

/// Drops values that do not fit `ty`, keeping the last good one current.
fn checked_input(name: &str, signal: &Signal, ty: &Type) -> Signal {
    let name = name.to_string();
    let ty = ty.clone();
    signal.filter(move |value| {
        let accepted = ty.accepts(value);
        if !accepted {
            log::warn!("input '{name}' dropped {value}: expected {ty}");
        }
        accepted
    })
}

/// A successfully linked layout.
pub struct Layout {
    pub layers: Vec<View>,
    properties: Rc<LayoutScope>,
    pub bindings: IndexMap<String, BindingKind>,
}

impl Layout {
    pub fn property(&self, path: &str) -> Option<Linked> {
        self.properties.property(path)
    }

    pub fn find(&self, binding: &str) -> Option<&View> {
        self.layers.iter().find_map(|layer| layer.find(binding))
    }

    pub fn snapshot(&self) -> Vec<ViewSnapshot> {
        self.layers.iter().map(View::snapshot).collect()
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("layers", &self.layers)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_names_are_unique() {
        let mut engine = Engine::new();
        engine.register_input("score").unwrap();
        assert_eq!(
            engine.register_typed_input("score", "Number").unwrap_err(),
            RegistrationError::DuplicateInput("score".into())
        );
        assert_eq!(
            engine.register_typed_input("level", "Meters").unwrap_err(),
            RegistrationError::UnknownType("Meters".into())
        );
        engine.register_view("avatar").unwrap();
        assert!(engine.register_button("avatar", || ()).is_err());
    }

    #[test]
    fn config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(Engine::new().config().list_cache_capacity, 32);
    }

    #[test]
    fn expressions_link_against_inputs() {
        let mut engine = Engine::new();
        let score = engine.register_typed_input("score", "Number").unwrap();
        let linked = engine.link_expression("score >= 10 ? \"pass\" : \"fail\"").unwrap();
        let recorder = linked.sink.record();
        score.emit(Value::Number(12.0));
        score.emit(Value::Number(3.0));
        assert_eq!(recorder.values(), [Value::string("pass"), Value::string("fail")]);
    }

    #[test]
    fn build_errors_carry_positions() {
        let engine = Engine::new();
        let error = engine
            .build("layout {\n  layer {\n    label { text: 1 }\n  }\n}")
            .unwrap_err();
        assert!(matches!(error, BuildError::Link { .. }));
        assert_eq!(error.line(), 3);
        assert_eq!(error.message(), "cannot cast Number to String");
    }
}
