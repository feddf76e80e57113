//! Structural writes and built-in collection methods
//!
//! The same functions serve two purposes: applying writes to a snapshot
//! whose elements may still be `Ref`s during construction, and replaying
//! queued steps against a fully built value.

use crate::core::record::{EventKind, FieldKey};
use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Structural family of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Frame or object with named fields
    Namespace,
    List,
    Dict,
    Set,
    Tuple,
}

impl CollectionKind {
    /// Family implied by the first mutation seen for an entity
    pub fn for_event(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Var | EventKind::FunctionCall => Some(CollectionKind::Namespace),
            EventKind::DictItem => Some(CollectionKind::Dict),
            EventKind::ListItem => Some(CollectionKind::List),
            EventKind::SetItem => Some(CollectionKind::Set),
            EventKind::TupleItem => Some(CollectionKind::Tuple),
            _ => None,
        }
    }

    /// Family named by a declared type
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "list" => CollectionKind::List,
            "dict" => CollectionKind::Dict,
            "set" => CollectionKind::Set,
            "tuple" => CollectionKind::Tuple,
            _ => CollectionKind::Namespace,
        }
    }

    /// Empty value of this family
    pub fn empty(self, class: &str) -> Value {
        match self {
            CollectionKind::Namespace => Value::Object {
                class: class.to_string(),
                fields: Vec::new(),
            },
            CollectionKind::List => Value::List(Vec::new()),
            CollectionKind::Dict => Value::Dict(Vec::new()),
            CollectionKind::Set => Value::Set(Vec::new()),
            CollectionKind::Tuple => Value::Tuple(Vec::new()),
        }
    }
}

/// A built-in collection mutation replayed at build time
///
/// The argument may be a `Ref`; it is resolved at the time the owning
/// value is built, not when the call was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredOp {
    pub collection: CollectionKind,
    pub method: String,
    pub argument: Value,
}

impl DeferredOp {
    /// Parse a `"<kind>.<method>"` annotation
    pub fn parse(extra: &str, argument: Value) -> Option<Self> {
        let (kind, method) = extra.split_once('.')?;
        let collection = match kind {
            "list" => CollectionKind::List,
            "dict" => CollectionKind::Dict,
            "set" => CollectionKind::Set,
            _ => return None,
        };
        if method.is_empty() {
            return None;
        }
        Some(Self {
            collection,
            method: method.to_string(),
            argument,
        })
    }

    /// True if replay only moves elements around, so `Ref`s among them or
    /// in the argument never need resolving first
    pub fn is_positional(&self) -> bool {
        match (self.collection, self.method.as_str()) {
            (CollectionKind::List, "append") => true,
            (CollectionKind::List, "extend") => !matches!(self.argument, Value::Ref(_)),
            (CollectionKind::List, "insert") => matches!(
                &self.argument,
                Value::Tuple(args) | Value::List(args) if args.len() == 2 && !args[0].has_refs()
            ),
            (CollectionKind::List, "pop" | "clear" | "reverse") => !self.argument.has_refs(),
            (CollectionKind::Dict, "popitem" | "clear") => true,
            (CollectionKind::Set, "pop" | "clear") => true,
            _ => false,
        }
    }
}

fn field_name(field: &FieldKey) -> String {
    match field {
        FieldKey::Name(name) => name.clone(),
        FieldKey::Key(Value::Str(s)) => s.clone(),
        other => other.to_string(),
    }
}

fn set_entry<K: PartialEq>(entries: &mut Vec<(K, Value)>, key: K, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some((_, slot)) => *slot = value,
        None => entries.push((key, value)),
    }
}

/// Apply one recorded write to `target`
pub fn write_value(
    target: &mut Value,
    kind: EventKind,
    field: &FieldKey,
    value: Value,
) -> Result<(), String> {
    match (kind, target) {
        (EventKind::Var | EventKind::DictItem, Value::Object { fields, .. }) => {
            set_entry(fields, field_name(field), value);
            Ok(())
        }
        (EventKind::Var | EventKind::DictItem, Value::Dict(entries)) => {
            set_entry(entries, field.to_value(), value);
            Ok(())
        }
        (EventKind::ListItem, Value::List(items)) => {
            let index = match field {
                FieldKey::Index(i) => *i,
                FieldKey::Key(Value::Int(i)) => *i,
                other => return Err(format!("list index must be an integer, got {other}")),
            };
            let len = items.len() as i64;
            let normalized = if index < 0 { index + len } else { index };
            if (0..len).contains(&normalized) {
                items[normalized as usize] = value;
            } else if normalized < 0 {
                items.insert(0, value);
            } else {
                items.push(value);
            }
            Ok(())
        }
        (EventKind::SetItem, Value::Set(items)) => {
            if !items.contains(&value) {
                items.push(value);
            }
            Ok(())
        }
        (EventKind::TupleItem, Value::Tuple(items)) => {
            let mut rebuilt = Vec::with_capacity(items.len() + 1);
            rebuilt.extend(items.drain(..));
            rebuilt.push(value);
            *items = rebuilt;
            Ok(())
        }
        (kind, target) => Err(format!(
            "{kind} write on {} is not supported",
            target.type_name()
        )),
    }
}

fn iterable(value: Value) -> Result<Vec<Value>, String> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items),
        Value::Dict(entries) => Ok(entries.into_iter().map(|(k, _)| k).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(format!("'{}' object is not iterable", other.type_name())),
    }
}

fn pair(argument: Value) -> Option<(Value, Value)> {
    match argument {
        Value::Tuple(mut items) | Value::List(mut items) if items.len() == 2 => {
            let second = items.pop()?;
            let first = items.pop()?;
            Some((first, second))
        }
        _ => None,
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

/// Replay a deferred built-in method call against a built value
pub fn apply_deferred(op: &DeferredOp, target: &mut Value, argument: Value) -> Result<(), String> {
    let method = op.method.as_str();
    match target {
        Value::List(items) => apply_list(items, method, argument),
        Value::Dict(entries) => apply_dict(entries, method, argument),
        Value::Set(items) => apply_set(items, method, argument),
        other => Err(format!(
            "cannot replay {:?}.{} on {}",
            op.collection,
            method,
            other.type_name()
        )),
    }
}

fn apply_list(items: &mut Vec<Value>, method: &str, argument: Value) -> Result<(), String> {
    match method {
        "append" => items.push(argument),
        "extend" => items.extend(iterable(argument)?),
        "insert" => {
            let (index, value) = pair(argument).ok_or("insert expects (index, value)")?;
            let index = index.as_int().ok_or("insert index must be an integer")?;
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, value);
        }
        "pop" => {
            let index = match argument {
                Value::None => -1,
                other => other.as_int().ok_or("pop index must be an integer")?,
            };
            let at = normalize_index(index, items.len()).ok_or("pop index out of range")?;
            items.remove(at);
        }
        "remove" => {
            let at = items
                .iter()
                .position(|item| item.loose_eq(&argument))
                .ok_or_else(|| format!("list.remove({argument}): value not in list"))?;
            items.remove(at);
        }
        "clear" => items.clear(),
        "reverse" => items.reverse(),
        "sort" => items.sort_by(|a, b| a.loose_cmp(b).unwrap_or(Ordering::Equal)),
        other => return Err(format!("unsupported list method {other}")),
    }
    Ok(())
}

fn apply_dict(
    entries: &mut Vec<(Value, Value)>,
    method: &str,
    argument: Value,
) -> Result<(), String> {
    match method {
        "pop" => {
            let key = match pair(argument.clone()) {
                Some((key, _default)) => key,
                None => argument,
            };
            if let Some(at) = entries.iter().position(|(k, _)| k.loose_eq(&key)) {
                entries.remove(at);
            }
        }
        "popitem" => {
            entries.pop().ok_or("popitem(): dictionary is empty")?;
        }
        "clear" => entries.clear(),
        "update" => {
            let updates = match argument {
                Value::Dict(updates) => updates,
                other => iterable(other)?
                    .into_iter()
                    .map(|item| pair(item).ok_or("update expects key/value pairs"))
                    .collect::<Result<Vec<_>, _>>()?,
            };
            for (key, value) in updates {
                match entries.iter_mut().find(|(k, _)| k.loose_eq(&key)) {
                    Some((_, slot)) => *slot = value,
                    None => entries.push((key, value)),
                }
            }
        }
        "setdefault" => {
            let (key, default) = pair(argument.clone()).unwrap_or((argument, Value::None));
            if !entries.iter().any(|(k, _)| k.loose_eq(&key)) {
                entries.push((key, default));
            }
        }
        other => return Err(format!("unsupported dict method {other}")),
    }
    Ok(())
}

fn apply_set(items: &mut Vec<Value>, method: &str, argument: Value) -> Result<(), String> {
    match method {
        "add" => {
            if !items.iter().any(|item| item.loose_eq(&argument)) {
                items.push(argument);
            }
        }
        "remove" => {
            let at = items
                .iter()
                .position(|item| item.loose_eq(&argument))
                .ok_or_else(|| format!("set.remove({argument}): key error"))?;
            items.remove(at);
        }
        "discard" => items.retain(|item| !item.loose_eq(&argument)),
        "pop" => {
            if items.is_empty() {
                return Err("pop from an empty set".to_string());
            }
            items.remove(0);
        }
        "clear" => items.clear(),
        "update" => {
            for value in iterable(argument)? {
                if !items.iter().any(|item| item.loose_eq(&value)) {
                    items.push(value);
                }
            }
        }
        other => return Err(format!("unsupported set method {other}")),
    }
    Ok(())
}
