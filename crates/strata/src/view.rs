//! View kinds, their property tables, and the view tree before and after
//! linking.

use crate::bindings::HostObject;
use crate::error::LinkError;
use crate::expression::{Expression, Linked};
use crate::list::ListView;
use crate::parser::Span;
use crate::scope::Scope;
use crate::types::Type;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use ulid::Ulid;

pub type ViewId = Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    Layer,
    Absolute,
    Linear,
    Stack,
    Label,
    Image,
    Rect,
    Spacer,
    List,
    Button,
    /// A host-provided view bound through `bindings`.
    Host,
}

/// Expected type of a view property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Named(&'static str),
    /// Any registered list shape.
    ListShape,
}

/// Composite properties and their fields. `padding: 8` sets every field.
pub const COMPOSITES: &[(&str, &[&str])] = &[
    ("padding", &["left", "right", "top", "bottom"]),
    ("size", &["width", "height"]),
    ("fixedSize", &["width", "height"]),
    ("center", &["x", "y"]),
];

const COMMON_PROPERTIES: &[(&str, &str)] = &[
    ("visible", "Bool"),
    ("alpha", "Number"),
    ("background", "Color"),
    ("cornerRadius", "Number"),
    ("aspect", "Number"),
];

const KEYWORDS: &[(&str, ViewKind)] = &[
    ("layer", ViewKind::Layer),
    ("absolute", ViewKind::Absolute),
    ("linear", ViewKind::Linear),
    ("stack", ViewKind::Stack),
    ("label", ViewKind::Label),
    ("image", ViewKind::Image),
    ("rect", ViewKind::Rect),
    ("spacer", ViewKind::Spacer),
    ("list", ViewKind::List),
];

impl ViewKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        KEYWORDS
            .iter()
            .find(|(name, _)| *name == keyword)
            .map(|(_, kind)| *kind)
    }

    pub fn keyword(self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Host => "view",
            other => other.keyword().unwrap_or("view"),
        }
    }

    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Layer | Self::Absolute | Self::Linear | Self::Stack | Self::Host
        )
    }

    fn specific_properties(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Label => &[
                ("text", "String"),
                ("font", "Font"),
                ("color", "Color"),
                ("lines", "Number"),
                ("alignment", "TextAlignment"),
            ],
            Self::Image => &[("image", "Image"), ("tint", "Color")],
            Self::Button => &[
                ("title", "String"),
                ("enabled", "Bool"),
                ("font", "Font"),
                ("color", "Color"),
            ],
            Self::Linear => &[("axis", "Axis"), ("spacing", "Number")],
            _ => &[],
        }
    }

    /// Type of property `name`, where composite fields are named `padding.left`.
    pub fn property_type(self, name: &str) -> Option<PropertyType> {
        if self == Self::List && name == "items" {
            return Some(PropertyType::ListShape);
        }
        if let Some((group, field)) = name.split_once('.') {
            let known = COMPOSITES
                .iter()
                .any(|(composite, fields)| *composite == group && fields.contains(&field));
            return known.then_some(PropertyType::Named("Number"));
        }
        COMMON_PROPERTIES
            .iter()
            .chain(self.specific_properties())
            .find(|(property, _)| *property == name)
            .map(|(_, type_name)| PropertyType::Named(*type_name))
    }
}

pub fn composite_fields(name: &str) -> Option<&'static [&'static str]> {
    COMPOSITES
        .iter()
        .find(|(composite, _)| *composite == name)
        .map(|(_, fields)| *fields)
}

/// A parsed, unlinked view.
#[derive(Debug, Clone)]
pub struct ViewTemplate {
    pub kind: ViewKind,
    pub binding: Option<String>,
    pub span: Span,
    pub properties: IndexMap<String, Expression>,
    pub children: Vec<ViewTemplate>,
    /// List item prototypes by variant tag.
    pub prototypes: IndexMap<String, ViewTemplate>,
}

impl ViewTemplate {
    pub fn new(kind: ViewKind, span: Span) -> Self {
        Self {
            kind,
            binding: None,
            span,
            properties: IndexMap::new(),
            children: Vec::new(),
            prototypes: IndexMap::new(),
        }
    }

    pub fn link(&self, scope: &Rc<dyn Scope>, parent: Option<ViewId>) -> Result<View, LinkError> {
        let id = ViewId::new();
        let types = &scope.context().types;
        let mut properties = IndexMap::new();
        for (name, expression) in &self.properties {
            let hint: Option<Type> = match self.kind.property_type(name) {
                Some(PropertyType::Named(type_name)) => Some(
                    types
                        .type_named(type_name)
                        .ok_or_else(|| LinkError::UnknownType(type_name.to_string(), expression.span))?,
                ),
                _ => None,
            };
            let linked = expression.instantiate().link(scope.as_ref(), hint.as_ref())?;
            properties.insert(name.clone(), linked);
        }

        let children = self
            .children
            .iter()
            .map(|child| child.link(scope, Some(id)))
            .collect::<Result<Vec<_>, _>>()?;

        let action = self
            .binding
            .as_ref()
            .and_then(|binding| scope.context().host().get(binding))
            .cloned();

        let list = match (self.kind, properties.get("items")) {
            (ViewKind::List, Some(items)) => {
                let on_select = match &action {
                    Some(HostObject::List(action)) => Some(action.clone()),
                    _ => None,
                };
                let list = ListView::build(
                    &self.prototypes,
                    items,
                    self.properties.get("items").map_or(self.span, |items| items.span),
                    scope,
                    id,
                    on_select,
                )?;
                Some(Rc::new(list))
            }
            _ => None,
        };

        Ok(View {
            id,
            parent,
            kind: self.kind,
            binding: self.binding.clone(),
            properties,
            children,
            list,
            action,
        })
    }
}

/// A linked view: every property is a live stream.
pub struct View {
    pub id: ViewId,
    pub parent: Option<ViewId>,
    pub kind: ViewKind,
    pub binding: Option<String>,
    pub properties: IndexMap<String, Linked>,
    pub children: Vec<View>,
    pub list: Option<Rc<ListView>>,
    pub action: Option<HostObject>,
}

impl View {
    pub fn property(&self, name: &str) -> Option<&Linked> {
        self.properties.get(name)
    }

    /// Latest value of a property, if it has produced one.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.property(name)?.latest()
    }

    /// Depth-first search for the view bound to `binding`.
    pub fn find(&self, binding: &str) -> Option<&View> {
        if self.binding.as_deref() == Some(binding) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(binding))
    }

    /// Invokes the bound button action. Returns whether there was one.
    pub fn press(&self) -> bool {
        match &self.action {
            Some(HostObject::Button(action)) => {
                action();
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            id: self.id,
            kind: self.kind,
            binding: self.binding.clone(),
            properties: self
                .properties
                .iter()
                .map(|(name, linked)| (name.clone(), linked.latest()))
                .collect(),
            children: self.children.iter().map(View::snapshot).collect(),
            items: self
                .list
                .as_ref()
                .map(|list| list.snapshots())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("binding", &self.binding)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Current values of a linked view tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub id: ViewId,
    pub kind: ViewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    pub properties: IndexMap<String, Option<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ViewSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ViewSnapshot>,
}

impl ViewSnapshot {
    pub fn count(&self) -> usize {
        1 + self
            .children
            .iter()
            .chain(&self.items)
            .map(ViewSnapshot::count)
            .sum::<usize>()
    }
}
