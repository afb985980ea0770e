//! Runtime values carried by signals.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Field of a list record that identifies the model item across updates.
pub const IDENTITY_FIELD: &str = "id";

/// Numbers compare through [`OrderedFloat`], so `NaN` equals `NaN` and a
/// repeated `NaN` is suppressed like any other repeated value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Nil,
    Number(f64),
    String(Arc<str>),
    Bool(bool),
    Color(Color),
    Font(Font),
    Image(Arc<str>),
    /// Alternatives of an `a|b|c` expression, tested by membership.
    Set(Arc<[Value]>),
    List(Arc<[Record]>),
    Record(Record),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Number(left), Self::Number(right)) => OrderedFloat(*left) == OrderedFloat(*right),
            (Self::String(left), Self::String(right)) | (Self::Image(left), Self::Image(right)) => left == right,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Color(left), Self::Color(right)) => left == right,
            (Self::Font(left), Self::Font(right)) => left == right,
            (Self::Set(left), Self::Set(right)) => left == right,
            (Self::List(left), Self::List(right)) => left == right,
            (Self::Record(left), Self::Record(right)) => left == right,
            _ => false,
        }
    }
}

impl Value {
    pub fn string(text: impl Into<Arc<str>>) -> Self {
        Self::String(text.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Membership test used by `x == a|b|c`.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Self::Set(alternatives) => alternatives.iter().any(|alternative| alternative == value),
            other => other == value,
        }
    }

    /// Text used by `string(..)` and localized formatting.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Nil => "nil".to_string(),
            Self::Number(number) => format_number(*number),
            Self::String(text) => text.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Color(color) => color.to_string(),
            Self::Font(font) => format!("{} {}", font.family, format_number(font.size)),
            Self::Image(name) => name.to_string(),
            Self::Set(alternatives) => alternatives
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join("|"),
            Self::List(records) => format!("[{} items]", records.len()),
            Self::Record(record) => format!("{}{{..}}", record.tag),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(text) => write!(f, "{text:?}"),
            other => write!(f, "{}", other.to_display_string()),
        }
    }
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

/// 24-bit RGB color, parsed from `#rrggbb` literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    /// Parses up to six hex digits (without the leading `#`).
    pub fn from_hex(digits: &str) -> Option<Self> {
        if digits.is_empty() || digits.len() > 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self)
    }

    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self((u32::from(red) << 16) | (u32::from(green) << 8) | u32::from(blue))
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Font {
    pub family: Arc<str>,
    pub size: f64,
}

impl PartialEq for Font {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family && OrderedFloat(self.size) == OrderedFloat(other.size)
    }
}

/// One item of a list-shaped value: a variant tag plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub tag: Arc<str>,
    pub fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self {
            tag: tag.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn identity(&self) -> Option<ItemIdentity> {
        match self.fields.get(IDENTITY_FIELD)? {
            Value::Number(number) => Some(ItemIdentity::Number(OrderedFloat(*number))),
            Value::String(text) => Some(ItemIdentity::String(text.clone())),
            _ => None,
        }
    }
}

/// Hashable identity of a model item, taken from its `id` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemIdentity {
    Number(OrderedFloat<f64>),
    String(Arc<str>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_from_hex() {
        assert_eq!(Color::from_hex("ff0000"), Some(Color(0xff0000)));
        assert_eq!(Color::from_hex("fff"), Some(Color(0xfff)));
        assert_eq!(Color::from_hex("1234567"), None);
        assert_eq!(Color::from_hex(""), None);
        assert_eq!(Color::rgb(1, 2, 3).to_string(), "#010203");
    }

    #[test]
    fn set_membership() {
        let set = Value::Set(vec![Value::Number(1.0), Value::Number(2.0)].into());
        assert!(set.contains(&Value::Number(2.0)));
        assert!(!set.contains(&Value::Number(3.0)));
    }

    #[test]
    fn record_identity_uses_id_field() {
        let record = Record::new("user").with("id", Value::Number(7.0));
        assert_eq!(record.identity(), Some(ItemIdentity::Number(OrderedFloat(7.0))));
        assert_eq!(Record::new("newUser").identity(), None);
    }

    #[test]
    fn nan_equals_nan() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(f64::NAN), Value::Number(0.0));
        let record = Record::new("point").with("x", Value::Number(f64::NAN));
        assert_eq!(Value::Record(record.clone()), Value::Record(record));
        assert_ne!(Value::Number(1.0), Value::string("1"));
    }

    #[test]
    fn numbers_display_without_trailing_zero() {
        assert_eq!(Value::Number(7.0).to_display_string(), "7");
        assert_eq!(Value::Number(1.5).to_display_string(), "1.5");
    }
}
