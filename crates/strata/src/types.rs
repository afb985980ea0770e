//! Nominal type system: primitives, enums, alternative sets and list shapes.
//!
//! A [`Type`] is a shared handle to a [`TypeDefinition`]; two types are the
//! same type only when they point at the same definition.

use crate::error::RegistrationError;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Suffix naming the alternative-set type of a base type (`Mode` → `Mode*`).
pub const SET_SUFFIX: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Number,
    String,
    Bool,
    Color,
    Font,
    Image,
}

impl Primitive {
    pub const ALL: [Primitive; 6] = [
        Primitive::Number,
        Primitive::String,
        Primitive::Bool,
        Primitive::Color,
        Primitive::Font,
        Primitive::Image,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::String => "String",
            Self::Bool => "Bool",
            Self::Color => "Color",
            Self::Font => "Font",
            Self::Image => "Image",
        }
    }
}

/// Field name → field type of one list variant.
pub type RecordShape = IndexMap<String, Type>;

#[derive(Debug)]
pub enum TypeKind {
    Primitive(Primitive),
    Enum(IndexMap<String, Value>),
    Set(Type),
    ListShape(IndexMap<String, RecordShape>),
}

#[derive(Debug)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
}

#[derive(Clone)]
pub struct Type(Rc<TypeDefinition>);

impl Type {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self(Rc::new(TypeDefinition {
            name: name.into(),
            kind,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self.0.kind {
            TypeKind::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }

    pub fn is_primitive(&self, primitive: Primitive) -> bool {
        self.primitive() == Some(primitive)
    }

    pub fn enum_cases(&self) -> Option<&IndexMap<String, Value>> {
        match &self.0.kind {
            TypeKind::Enum(cases) => Some(cases),
            _ => None,
        }
    }

    /// The wrapped base type when this is an alternative set.
    pub fn set_original(&self) -> Option<&Type> {
        match &self.0.kind {
            TypeKind::Set(original) => Some(original),
            _ => None,
        }
    }

    pub fn list_variants(&self) -> Option<&IndexMap<String, RecordShape>> {
        match &self.0.kind {
            TypeKind::ListShape(variants) => Some(variants),
            _ => None,
        }
    }

    /// Whether `value` has the runtime shape of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (&self.0.kind, value) {
            (TypeKind::Primitive(Primitive::Number | Primitive::Image), Value::Nil) => true,
            (TypeKind::Primitive(Primitive::Number), Value::Number(_))
            | (TypeKind::Primitive(Primitive::String), Value::String(_))
            | (TypeKind::Primitive(Primitive::Bool), Value::Bool(_))
            | (TypeKind::Primitive(Primitive::Color), Value::Color(_))
            | (TypeKind::Primitive(Primitive::Font), Value::Font(_))
            | (TypeKind::Primitive(Primitive::Image), Value::Image(_)) => true,
            (TypeKind::Enum(cases), value) => cases.values().any(|case| case == value),
            (TypeKind::Set(original), Value::Set(alternatives)) => {
                alternatives.iter().all(|alternative| original.accepts(alternative))
            }
            (TypeKind::ListShape(variants), Value::List(records)) => records.iter().all(|record| {
                variants.get(record.tag.as_ref()).is_some_and(|shape| {
                    shape.iter().all(|(field, field_type)| {
                        record.field(field).is_some_and(|value| field_type.accepts(value))
                    })
                })
            }),
            _ => false,
        }
    }
}

impl Deref for Type {
    type Target = TypeDefinition;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.0.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

#[derive(Debug, Clone)]
pub struct EnumDefinition {
    pub name: String,
    pub cases: IndexMap<String, Value>,
}

impl EnumDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: IndexMap::new(),
        }
    }

    pub fn case(mut self, key: impl Into<String>, value: Value) -> Self {
        self.cases.insert(key.into(), value);
        self
    }

    /// Cases whose values are their ordinals.
    pub fn with_keys<'a>(name: impl Into<String>, keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter()
            .enumerate()
            .fold(Self::new(name), |definition, (ordinal, key)| {
                definition.case(key, Value::Number(ordinal as f64))
            })
    }
}

/// List shape declared by field type names; names resolve at registration.
#[derive(Debug, Clone)]
pub struct ListShapeDefinition {
    pub name: String,
    pub variants: IndexMap<String, IndexMap<String, String>>,
}

impl ListShapeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: IndexMap::new(),
        }
    }

    pub fn variant<'a>(
        mut self,
        tag: impl Into<String>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let fields = fields
            .into_iter()
            .map(|(field, type_name)| (field.to_string(), type_name.to_string()))
            .collect();
        self.variants.insert(tag.into(), fields);
        self
    }
}

/// Append-only table of named types. Cloned per build so declarations made
/// by one layout never leak into the host's registry.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, Type>,
    number: Type,
    string: Type,
    bool: Type,
    color: Type,
    font: Type,
    image: Type,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let primitive = |primitive: Primitive| Type::new(primitive.name(), TypeKind::Primitive(primitive));
        let mut registry = Self {
            types: IndexMap::new(),
            number: primitive(Primitive::Number),
            string: primitive(Primitive::String),
            bool: primitive(Primitive::Bool),
            color: primitive(Primitive::Color),
            font: primitive(Primitive::Font),
            image: primitive(Primitive::Image),
        };
        for primitive in Primitive::ALL {
            let ty = registry.primitive(primitive);
            registry.types.insert(ty.name().to_string(), ty);
        }
        for base in [registry.number.clone(), registry.string.clone()] {
            registry.insert_set(&base);
        }
        for builtin in [
            EnumDefinition::with_keys("Axis", ["horizontal", "vertical"]),
            EnumDefinition::with_keys("TextAlignment", ["leading", "center", "trailing"]),
        ] {
            registry.insert_enum(builtin);
        }
        registry
    }

    pub fn primitive(&self, primitive: Primitive) -> Type {
        match primitive {
            Primitive::Number => self.number.clone(),
            Primitive::String => self.string.clone(),
            Primitive::Bool => self.bool.clone(),
            Primitive::Color => self.color.clone(),
            Primitive::Font => self.font.clone(),
            Primitive::Image => self.image.clone(),
        }
    }

    pub fn number(&self) -> Type {
        self.number.clone()
    }

    pub fn string(&self) -> Type {
        self.string.clone()
    }

    pub fn bool(&self) -> Type {
        self.bool.clone()
    }

    pub fn color(&self) -> Type {
        self.color.clone()
    }

    pub fn type_named(&self, name: &str) -> Option<Type> {
        self.types.get(name).cloned()
    }

    pub fn set_of(&self, base: &Type) -> Option<Type> {
        self.type_named(&format!("{}{SET_SUFFIX}", base.name()))
            .filter(|set| set.set_original() == Some(base))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }

    pub fn register_enum(&mut self, definition: EnumDefinition) -> Result<Type, RegistrationError> {
        self.ensure_free(&definition.name)?;
        Ok(self.insert_enum(definition))
    }

    pub fn register_list(&mut self, definition: ListShapeDefinition) -> Result<Type, RegistrationError> {
        self.ensure_free(&definition.name)?;
        let mut variants = IndexMap::new();
        for (tag, fields) in definition.variants {
            let mut shape = RecordShape::new();
            for (field, type_name) in fields {
                let ty = self
                    .type_named(&type_name)
                    .ok_or_else(|| RegistrationError::UnknownType(type_name.clone()))?;
                shape.insert(field, ty);
            }
            variants.insert(tag, shape);
        }
        let ty = Type::new(definition.name, TypeKind::ListShape(variants));
        self.types.insert(ty.name().to_string(), ty.clone());
        self.insert_set(&ty);
        Ok(ty)
    }

    fn ensure_free(&self, name: &str) -> Result<(), RegistrationError> {
        let set_name = format!("{name}{SET_SUFFIX}");
        if self.types.contains_key(name) || self.types.contains_key(&set_name) {
            return Err(RegistrationError::DuplicateType(name.to_string()));
        }
        Ok(())
    }

    fn insert_enum(&mut self, definition: EnumDefinition) -> Type {
        let ty = Type::new(definition.name, TypeKind::Enum(definition.cases));
        self.types.insert(ty.name().to_string(), ty.clone());
        self.insert_set(&ty);
        ty
    }

    fn insert_set(&mut self, base: &Type) {
        let set = Type::new(format!("{}{SET_SUFFIX}", base.name()), TypeKind::Set(base.clone()));
        self.types.insert(set.name().to_string(), set);
    }

    /// Runtime shape check for values entering through inputs.
    pub fn conforms(&self, value: &Value, ty: &Type) -> bool {
        ty.accepts(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Color, Record};

    #[test]
    fn builtins_are_registered() {
        let registry = TypeRegistry::new();
        for name in ["Number", "String", "Bool", "Color", "Font", "Image", "Number*", "String*"] {
            assert!(registry.type_named(name).is_some(), "{name}");
        }
        let axis = registry.type_named("Axis").unwrap();
        assert_eq!(axis.enum_cases().unwrap().len(), 2);
        assert_eq!(registry.set_of(&axis).unwrap().name(), "Axis*");
        assert!(registry.set_of(&registry.bool()).is_none());
    }

    #[test]
    fn types_compare_by_identity() {
        let mut first = TypeRegistry::new();
        let mut second = TypeRegistry::new();
        let a = first.register_enum(EnumDefinition::with_keys("Mode", ["a"])).unwrap();
        let b = second.register_enum(EnumDefinition::with_keys("Mode", ["a"])).unwrap();
        assert_ne!(a, b);
        assert_eq!(first.type_named("Mode"), Some(a));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = TypeRegistry::new();
        let error = registry
            .register_enum(EnumDefinition::with_keys("Number", ["x"]))
            .unwrap_err();
        assert_eq!(error, RegistrationError::DuplicateType("Number".into()));
        registry
            .register_list(ListShapeDefinition::new("Users").variant("user", [("name", "String")]))
            .unwrap();
        assert!(registry.type_named("Users*").is_some());
        assert!(registry.register_list(ListShapeDefinition::new("Users")).is_err());
    }

    #[test]
    fn list_fields_must_name_known_types() {
        let mut registry = TypeRegistry::new();
        let error = registry
            .register_list(ListShapeDefinition::new("Rows").variant("row", [("size", "Meters")]))
            .unwrap_err();
        assert_eq!(error, RegistrationError::UnknownType("Meters".into()));
    }

    #[test]
    fn conformance() {
        let mut registry = TypeRegistry::new();
        let users = registry
            .register_list(
                ListShapeDefinition::new("Users")
                    .variant("user", [("id", "Number"), ("name", "String")])
                    .variant("newUser", []),
            )
            .unwrap();
        let good = Value::List(
            vec![
                Record::new("user").with("id", Value::Number(1.0)).with("name", Value::string("Ada")),
                Record::new("newUser"),
            ]
            .into(),
        );
        let bad = Value::List(vec![Record::new("user").with("id", Value::Number(1.0))].into());
        assert!(registry.conforms(&good, &users));
        assert!(!registry.conforms(&bad, &users));
        assert!(registry.conforms(&Value::Nil, &registry.number()));
        assert!(!registry.conforms(&Value::string("5"), &registry.number()));
        assert!(registry.conforms(&Value::Color(Color(0)), &registry.color()));

        let axis = registry.type_named("Axis").unwrap();
        assert!(registry.conforms(&Value::Number(1.0), &axis));
        assert!(!registry.conforms(&Value::Number(2.0), &axis));
    }
}
