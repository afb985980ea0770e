//! Strata: a small language for reactive UI layouts.
//!
//! Source text goes through the scanner and parser into a layout document,
//! which is linked against an [`Engine`]'s inputs, types and host objects
//! into a tree of [`View`]s whose properties are live [`Signal`]s.

pub mod bindings;
pub mod engine;
pub mod error;
pub mod expression;
pub mod function;
pub mod list;
pub mod parser;
pub mod reactive;
pub mod reuse_cache;
pub mod scope;
pub mod types;
pub mod value;
pub mod view;

pub use engine::{Engine, EngineConfig, Layout};
pub use error::{BuildError, LexError, LinkError, ParseError, RegistrationError};
pub use expression::{Expression, Linked};
pub use function::{IdentityLocalizer, Localizer, MapLocalizer};
pub use reactive::{Signal, Subscription};
pub use types::{EnumDefinition, ListShapeDefinition, Type, TypeRegistry};
pub use value::{Color, Font, ItemIdentity, Record, Value};
pub use view::{View, ViewKind, ViewSnapshot};
