//! Linked list views.
//!
//! A list view follows its `items` stream. Each record is displayed by an
//! instance of the prototype registered for the record's tag. An item whose
//! record stays in the list keeps its view. Items that leave are recycled
//! through one [`ReusableItemCache`] per tag, keyed by the record's `id` field.

use crate::bindings::ListAction;
use crate::error::LinkError;
use crate::expression::Linked;
use crate::parser::Span;
use crate::reactive::{Signal, Subscription};
use crate::reuse_cache::{Reusable, ReusableItemCache};
use crate::scope::{ItemScope, Scope};
use crate::types::Type;
use crate::value::{ItemIdentity, Record, Value};
use crate::view::{View, ViewId, ViewSnapshot, ViewTemplate};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// One displayed item: its prototype instance and the stream of its record.
pub struct ListItem {
    pub model: Signal,
    pub tag: String,
    identity: Option<ItemIdentity>,
    pub view: View,
}

impl Reusable for ListItem {
    fn identity(&self) -> Option<ItemIdentity> {
        self.identity.clone()
    }
}

struct Prototypes {
    templates: IndexMap<String, ViewTemplate>,
    shape: Type,
    scope: Rc<dyn Scope>,
    parent: ViewId,
}

impl Prototypes {
    fn instantiate(&self, tag: &str) -> Result<ListItem, LinkError> {
        let template = self
            .templates
            .get(tag)
            .ok_or_else(|| LinkError::UnknownVariant(self.shape.name().to_string(), tag.to_string(), Span::from(0..0)))?;
        let model = Signal::new();
        let scope: Rc<dyn Scope> = Rc::new(ItemScope::new(
            model.clone(),
            self.shape.clone(),
            tag,
            self.scope.clone(),
        ));
        let view = template.link(&scope, Some(self.parent))?;
        Ok(ListItem {
            model,
            tag: tag.to_string(),
            identity: None,
            view,
        })
    }
}

struct ListState {
    prototypes: Prototypes,
    items: Vec<ListItem>,
    caches: IndexMap<String, ReusableItemCache<ListItem>>,
}

impl ListState {
    /// Keeps displayed items whose record is still present, hands the rest
    /// back to their caches, then picks a cached or new item for each
    /// remaining record. Returns the model updates to publish once the state
    /// is no longer borrowed.
    fn refresh(&mut self, records: &[Record]) -> Vec<(Signal, Value)> {
        let mut displayed: IndexMap<(String, ItemIdentity), ListItem> = IndexMap::new();
        let mut leaving = Vec::new();
        for item in std::mem::take(&mut self.items) {
            match item.identity.clone() {
                Some(identity) => {
                    if let Some(duplicate) = displayed.insert((item.tag.clone(), identity), item) {
                        leaving.push(duplicate);
                    }
                }
                None => leaving.push(item),
            }
        }
        let kept: Vec<Option<ListItem>> = records
            .iter()
            .map(|record| {
                let identity = record.identity()?;
                displayed.shift_remove(&(record.tag.to_string(), identity))
            })
            .collect();
        leaving.extend(displayed.into_values());
        for item in leaving {
            if let Some(cache) = self.caches.get_mut(&item.tag) {
                cache.put(item);
            }
        }

        let mut updates = Vec::with_capacity(records.len());
        let mut built = 0;
        for (record, kept) in records.iter().zip(kept) {
            let identity = record.identity();
            let reused = kept.or_else(|| {
                self.caches
                    .get_mut(record.tag.as_ref())
                    .and_then(|cache| cache.take(identity.as_ref()))
            });
            let mut item = match reused {
                Some(item) => item,
                None => match self.prototypes.instantiate(&record.tag) {
                    Ok(item) => {
                        built += 1;
                        item
                    }
                    Err(error) => {
                        log::error!("skipping list item '{}': {error}", record.tag);
                        continue;
                    }
                },
            };
            item.identity = identity;
            updates.push((item.model.clone(), Value::Record(record.clone())));
            self.items.push(item);
        }
        log::trace!("list refresh: {} items, {built} built", self.items.len());
        updates
    }
}

pub struct ListView {
    state: Rc<RefCell<ListState>>,
    revision: Signal,
    action: Option<ListAction>,
    _items: Subscription,
}

impl ListView {
    /// Checks every prototype by linking one instance, which is kept in the
    /// cache for the first refresh, then follows `items`.
    pub fn build(
        templates: &IndexMap<String, ViewTemplate>,
        items: &Linked,
        span: Span,
        scope: &Rc<dyn Scope>,
        parent: ViewId,
        action: Option<ListAction>,
    ) -> Result<Self, LinkError> {
        let Some(variants) = items.ty.list_variants() else {
            return Err(LinkError::NotAList(items.ty.name().to_string(), span));
        };
        for (tag, template) in templates {
            if !variants.contains_key(tag) {
                return Err(LinkError::UnknownVariant(
                    items.ty.name().to_string(),
                    tag.clone(),
                    template.span,
                ));
            }
        }

        let prototypes = Prototypes {
            templates: templates.clone(),
            shape: items.ty.clone(),
            scope: scope.clone(),
            parent,
        };
        let capacity = scope.context().list_cache_capacity();
        let mut caches = IndexMap::new();
        for tag in templates.keys() {
            let mut cache = ReusableItemCache::new(capacity);
            cache.put(prototypes.instantiate(tag)?);
            caches.insert(tag.clone(), cache);
        }

        let state = Rc::new(RefCell::new(ListState {
            prototypes,
            items: Vec::new(),
            caches,
        }));
        let revision = Signal::constant(Value::Number(0.0));
        let subscription = {
            let state = Rc::downgrade(&state);
            let revision = revision.downgrade();
            items.sink.subscribe(move |value| {
                let (Some(state), Some(revision)) = (state.upgrade(), revision.upgrade()) else {
                    return;
                };
                refresh(&state, &revision, value);
            })
        };
        Ok(Self {
            state,
            revision,
            action,
            _items: subscription,
        })
    }

    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts up once per refresh.
    pub fn revision(&self) -> Signal {
        self.revision.clone()
    }

    /// Reports the selection of item `index` to the bound list action.
    pub fn select(&self, index: usize) -> bool {
        let model = self
            .state
            .borrow()
            .items
            .get(index)
            .and_then(|item| item.model.latest());
        match (&self.action, model) {
            (Some(action), Some(model)) => {
                action(index, &model);
                true
            }
            _ => false,
        }
    }

    pub fn snapshots(&self) -> Vec<ViewSnapshot> {
        self.state
            .borrow()
            .items
            .iter()
            .map(|item| item.view.snapshot())
            .collect()
    }

    /// Ids of the displayed item views, in display order.
    pub fn item_ids(&self) -> Vec<ViewId> {
        self.state.borrow().items.iter().map(|item| item.view.id).collect()
    }

    /// `(keyed, pooled)` entry counts of the cache for `tag`.
    pub fn cache_stats(&self, tag: &str) -> Option<(usize, usize)> {
        let state = self.state.borrow();
        let cache = state.caches.get(tag)?;
        Some((cache.keyed_len(), cache.pooled_len()))
    }
}

fn refresh(state: &Rc<RefCell<ListState>>, revision: &Signal, value: &Value) {
    let records: &[Record] = match value {
        Value::List(records) => records.as_ref(),
        _ => &[],
    };
    let updates = state.borrow_mut().refresh(records);
    for (model, record) in updates {
        model.emit(record);
    }
    let next = revision.latest().and_then(|value| value.as_number()).unwrap_or(0.0) + 1.0;
    revision.emit(Value::Number(next));
}

impl fmt::Debug for ListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListView")
            .field("len", &self.len())
            .field("revision", &self.revision.latest())
            .finish_non_exhaustive()
    }
}
