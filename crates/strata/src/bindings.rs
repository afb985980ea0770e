//! Host objects a layout can bind to by name.

use crate::error::RegistrationError;
use crate::value::Value;
use crate::view::ViewKind;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    View,
    Button,
    List,
}

impl BindingKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "View" => Some(Self::View),
            "Button" => Some(Self::Button),
            "List" => Some(Self::List),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::View => "View",
            Self::Button => "Button",
            Self::List => "List",
        }
    }

    pub fn view_kind(self) -> ViewKind {
        match self {
            Self::View => ViewKind::Host,
            Self::Button => ViewKind::Button,
            Self::List => ViewKind::List,
        }
    }
}

pub type ButtonAction = Rc<dyn Fn()>;

/// Called with the index and model record of a selected list item.
pub type ListAction = Rc<dyn Fn(usize, &Value)>;

#[derive(Clone)]
pub enum HostObject {
    View,
    Button(ButtonAction),
    List(ListAction),
}

impl HostObject {
    pub fn kind(&self) -> BindingKind {
        match self {
            Self::View => BindingKind::View,
            Self::Button(_) => BindingKind::Button,
            Self::List(_) => BindingKind::List,
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject::{}", self.kind().name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostRegistry {
    objects: IndexMap<String, HostObject>,
}

impl HostRegistry {
    pub fn register(&mut self, name: impl Into<String>, object: HostObject) -> Result<(), RegistrationError> {
        let name = name.into();
        if self.objects.contains_key(&name) {
            return Err(RegistrationError::DuplicateHostObject(name));
        }
        self.objects.insert(name, object);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&HostObject> {
        self.objects.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_across_kinds() {
        let mut registry = HostRegistry::default();
        registry.register("submit", HostObject::Button(Rc::new(|| ()))).unwrap();
        let error = registry.register("submit", HostObject::View).unwrap_err();
        assert_eq!(error, RegistrationError::DuplicateHostObject("submit".into()));
        assert_eq!(registry.get("submit").map(HostObject::kind), Some(BindingKind::Button));
    }
}
