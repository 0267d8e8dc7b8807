//! # Variable binder
//!
//! Moves attachments in and out of a [`Namespace`]. Binding an attachment
//! picks a free variable name derived from its basename, stores it, and
//! returns a [`Binding`] describing where it lives. Resolving walks a binding
//! path back to the stored value.

use crate::attachment::Attachment;
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::namespace::Namespace;
use crate::syntax;
use crate::value::{Segment, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// Highest numeric suffix tried before falling back to a random one
pub const MAX_VARNAME_SEARCH_INDEX: usize = 100;

/// Maximum attribute paths per attachment
pub const ATTACHMENT_MAX_ATTR_PATHS: usize = 10;

/// Maximum related attachments per attachment
pub const ATTACHMENT_MAX_RELATED: usize = 10;

/// Where an attachment lives in the namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(rename = "type")]
    pub type_name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attr_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Binding>,
}

impl Binding {
    pub fn new(type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            path: path.into(),
            attr_paths: Vec::new(),
            related: Vec::new(),
        }
    }
}

/// Default variable stem for a type: snake-cased, last word.
/// `ImageFile` becomes `file`, `Image` becomes `image`.
pub fn default_basename(type_name: &str) -> String {
    let mut snake = String::new();
    let mut prev_lower = false;
    for c in type_name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            snake.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            snake.push('_');
            prev_lower = false;
        }
    }

    let stem = snake
        .split('_')
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or("var")
        .to_string();
    if stem.starts_with(|c: char| c.is_ascii_digit()) {
        format!("var{}", stem)
    } else {
        stem
    }
}

/// First free `base0 .. base99`, else `base_<random>`
pub fn find_free_name(basename: &str, namespace: &Namespace) -> String {
    (0..MAX_VARNAME_SEARCH_INDEX)
        .map(|i| format!("{}{}", basename, i))
        .find(|name| !namespace.contains(name))
        .unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{}_{}", basename, &suffix[..8])
        })
}

/// Bind `attachment` under a fresh name, then its related attachments in
/// order.
pub fn assign(attachment: &Attachment, namespace: &mut Namespace) -> Result<Binding> {
    if attachment.attr_paths().len() > ATTACHMENT_MAX_ATTR_PATHS {
        return Err(Error::limit_exceeded("attachment attr paths", ATTACHMENT_MAX_ATTR_PATHS)
            .with_operation("binding::assign"));
    }
    if attachment.related().len() > ATTACHMENT_MAX_RELATED {
        return Err(Error::limit_exceeded("related attachments", ATTACHMENT_MAX_RELATED)
            .with_operation("binding::assign"));
    }

    let type_name = attachment.type_name();
    let basename = match attachment.basename() {
        Some(basename) => basename.to_string(),
        None => default_basename(&type_name),
    };
    let name = find_free_name(&basename, namespace);
    namespace
        .insert(name.clone(), Value::Attachment(attachment.clone()))
        .map_err(|e| e.with_operation("binding::assign"))?;
    debug!(variable = %name, r#type = %type_name, "bound attachment");

    let attr_paths = attachment
        .attr_paths()
        .iter()
        .map(|p| join_path(&name, p))
        .collect();
    let related = attachment
        .related()
        .iter()
        .map(|r| assign(r, namespace))
        .collect::<Result<Vec<_>>>()?;

    Ok(Binding {
        type_name,
        path: name,
        attr_paths,
        related,
    })
}

fn join_path(name: &str, path: &str) -> String {
    if path.starts_with('[') || path.starts_with('.') {
        format!("{}{}", name, path)
    } else {
        format!("{}.{}", name, path)
    }
}

/// Parse `name`, `name.attr`, `name[0]`, `name["key"]` and chains of them
pub fn parse_path(path: &str) -> Result<(String, Vec<Segment>)> {
    syntax::parse_path(path).map_err(|err| {
        Error::invalid_path(path)
            .with_operation("binding::parse_path")
            .set_source(err)
    })
}

/// Walk a binding path back to its value
pub fn resolve(path: &str, namespace: &Namespace) -> Result<Value> {
    let (root, segments) = parse_path(path)?;
    let mut value = namespace
        .get(&root)
        .cloned()
        .ok_or_else(|| Error::lookup_failed(path).with_operation("binding::resolve"))?;
    for segment in &segments {
        value = value.get_segment(segment).map_err(|e| {
            Error::new(ErrorKind::LookupFailed, e.message().to_string())
                .with_operation("binding::resolve")
                .with_context("path", path)
        })?;
    }
    Ok(value)
}

/// Breadth-first search for the path of a value sharing `attachment`'s payload
pub fn locate(attachment: &Attachment, namespace: &Namespace) -> Option<String> {
    let mut queue: VecDeque<(String, Value)> = namespace
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let mut visited = HashSet::new();

    while let Some((path, value)) = queue.pop_front() {
        let children: Vec<(Segment, Value)> = match &value {
            Value::Attachment(found) => {
                if found.same_payload(attachment) {
                    return Some(path);
                }
                if !visited.insert(found.payload_id()) {
                    continue;
                }
                found.with_payload(children_of)
            }
            plain => children_of(plain),
        };
        queue.extend(
            children
                .into_iter()
                .map(|(segment, child)| (format!("{}{}", path, segment), child)),
        );
    }
    None
}

fn children_of(value: &Value) -> Vec<(Segment, Value)> {
    match value {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Segment::Item(Value::Int(i as i64)), v.clone()))
            .collect(),
        Value::Dict(entries) => entries
            .iter()
            .map(|(k, v)| (Segment::Item(Value::Str(k.clone())), v.clone()))
            .collect(),
        Value::Record(record) => record
            .fields
            .iter()
            .map(|(k, v)| (Segment::Attr(k.clone()), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Bind every attachment of a live message. Original attachments, and the
/// original attachments related to them, become caller objects of the
/// namespace.
pub fn assign_message(message: &Message, namespace: &mut Namespace) -> Result<Message<Binding>> {
    message.validate()?;
    let attachments = message
        .attachments
        .iter()
        .map(|a| {
            mark_caller_objects(a, namespace);
            assign(a, namespace)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Message {
        text: message.text.clone(),
        timestamp: message.timestamp,
        attachments,
    })
}

fn mark_caller_objects(attachment: &Attachment, namespace: &mut Namespace) {
    if attachment.is_original() {
        namespace.mark_caller_object(attachment);
    }
    for related in attachment.related() {
        mark_caller_objects(related, namespace);
    }
}

/// Turn bindings back into live attachments, free of any write observer.
/// A path that leads to a plain value is wrapped in a fresh, non-original
/// attachment.
pub fn resolve_message(message: &Message<Binding>, namespace: &Namespace) -> Result<Message> {
    let attachments = message
        .attachments
        .iter()
        .map(|binding| {
            resolve(&binding.path, namespace).map(|value| match value {
                Value::Attachment(mut attachment) => {
                    attachment.set_observer(None);
                    attachment
                }
                plain => Attachment::new(plain).with_original(false),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Message {
        text: message.text.clone(),
        timestamp: message.timestamp,
        attachments,
    })
}

/// Describe a live message in terms of namespace paths, binding any
/// attachment the namespace does not hold yet.
pub fn contextualize_message(
    message: &Message,
    namespace: &mut Namespace,
) -> Result<Message<Binding>> {
    message.validate()?;
    let mut attachments = Vec::with_capacity(message.attachments.len());
    for attachment in &message.attachments {
        let binding = match locate(attachment, namespace) {
            Some(path) => Binding::new(attachment.type_name(), path),
            None => assign(attachment, namespace)?,
        };
        attachments.push(binding);
    }
    Ok(Message {
        text: message.text.clone(),
        timestamp: message.timestamp,
        attachments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{OriginModification, OriginObserver};
    use crate::feedback::Feedback;
    use crate::value::Record;
    use std::sync::Arc;

    fn image(width: i64) -> Attachment {
        Attachment::new(Record::new("Image").with_field("width", width))
    }

    #[test]
    fn test_default_basename() {
        assert_eq!(default_basename("Image"), "image");
        assert_eq!(default_basename("ImageFile"), "file");
        assert_eq!(default_basename("text_box"), "box");
        assert_eq!(default_basename("int"), "int");
        assert_eq!(default_basename("3"), "var3");
        assert_eq!(default_basename(""), "var");
    }

    #[test]
    fn test_assign_distinct_names() {
        let mut ns = Namespace::new();
        let names: Vec<String> = (0..5)
            .map(|i| assign(&image(i), &mut ns).unwrap().path)
            .collect();
        assert_eq!(names, vec!["image0", "image1", "image2", "image3", "image4"]);
        assert_eq!(ns.len(), 5);
    }

    #[test]
    fn test_assign_uses_basename() {
        let mut ns = Namespace::new();
        let binding = assign(&image(1).with_basename("photo"), &mut ns).unwrap();
        assert_eq!(binding.path, "photo0");
        assert_eq!(binding.type_name, "Image");
    }

    #[test]
    fn test_assign_falls_back_to_random_suffix() {
        let mut ns = Namespace::new();
        for i in 0..MAX_VARNAME_SEARCH_INDEX {
            ns.insert(format!("image{}", i), Value::Null).unwrap();
        }
        let binding = assign(&image(1), &mut ns).unwrap();
        assert!(binding.path.starts_with("image_"));
        assert_eq!(binding.path.len(), "image_".len() + 8);
    }

    #[test]
    fn test_assign_rewrites_attr_paths_and_related() {
        let mut ns = Namespace::new();
        let mask = Attachment::new(Record::new("Mask"));
        let img = image(1)
            .with_attr_paths(["layers[0]", ".size"])
            .with_related(vec![mask.clone()]);

        let binding = assign(&img, &mut ns).unwrap();
        assert_eq!(binding.attr_paths, vec!["image0.layers[0]", "image0.size"]);
        assert_eq!(binding.related.len(), 1);
        assert_eq!(binding.related[0].path, "mask0");
        assert!(ns.contains("mask0"));
    }

    #[test]
    fn test_assign_rejects_too_many_attr_paths() {
        let mut ns = Namespace::new();
        let paths: Vec<String> = (0..=ATTACHMENT_MAX_ATTR_PATHS)
            .map(|i| format!("p{}", i))
            .collect();
        assert!(assign(&image(1).with_attr_paths(paths), &mut ns)
            .is_err_and(|e| e.kind() == ErrorKind::LimitExceeded));
        assert!(ns.is_empty());
    }

    #[test]
    fn test_resolve_returns_same_attachment() {
        let mut ns = Namespace::new();
        let img = image(7);
        let binding = assign(&img, &mut ns).unwrap();

        match resolve(&binding.path, &ns).unwrap() {
            Value::Attachment(found) => assert!(found.same_payload(&img)),
            other => panic!("expected attachment, got {:?}", other),
        }
        assert_eq!(
            resolve(&format!("{}.width", binding.path), &ns).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn test_resolve_index_and_key() {
        let mut ns = Namespace::new();
        let mut entries = crate::value::Fields::new();
        entries.insert("a b".to_string(), Value::List(vec![Value::Int(1), Value::Int(2)]));
        ns.insert("data", Value::Dict(entries)).unwrap();

        assert_eq!(resolve("data[\"a b\"][1]", &ns).unwrap(), Value::Int(2));
        assert_eq!(resolve("data['a b'][-2]", &ns).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_resolve_missing() {
        let ns = Namespace::new();
        assert!(resolve("ghost", &ns).is_err_and(|e| e.kind() == ErrorKind::LookupFailed));

        let mut ns = Namespace::new();
        ns.insert("x", Value::Int(1)).unwrap();
        assert!(resolve("x.width", &ns).is_err_and(|e| e.kind() == ErrorKind::LookupFailed));
        assert!(resolve("x[", &ns).is_err_and(|e| e.kind() == ErrorKind::InvalidPath));
    }

    #[test]
    fn test_locate_nested() {
        let mut ns = Namespace::new();
        let img = image(1);
        ns.insert(
            "results",
            Value::List(vec![Value::Null, Value::Attachment(img.clone())]),
        )
        .unwrap();

        assert_eq!(locate(&img, &ns).as_deref(), Some("results[1]"));
        assert_eq!(locate(&image(1), &ns), None);
    }

    #[test]
    fn test_contextualize_reuses_existing_path() {
        let mut ns = Namespace::new();
        let img = image(1);
        ns.insert("edited", Value::Attachment(img.clone())).unwrap();
        let fresh = image(2);

        let message = Message::new("done").with_attachments(vec![img, fresh.clone()]);
        let contextualized = contextualize_message(&message, &mut ns).unwrap();
        assert_eq!(contextualized.attachments[0].path, "edited");
        assert_eq!(contextualized.attachments[1].path, "image0");

        let live = resolve_message(&contextualized, &ns).unwrap();
        assert!(live.attachments[1].same_payload(&fresh));
    }

    #[test]
    fn test_assign_message_marks_caller_objects() {
        let mut ns = Namespace::new();
        let mask = image(2);
        let img = image(1).with_related(vec![mask.clone()]);
        let made = image(3).with_original(false);

        let message = Message::new("edit").with_attachments(vec![img.clone(), made.clone()]);
        assign_message(&message, &mut ns).unwrap();
        assert!(ns.is_caller_object(&img));
        assert!(ns.is_caller_object(&mask));
        assert!(!ns.is_caller_object(&made));
    }

    #[test]
    fn test_resolve_message_drops_observer() {
        let veto: OriginObserver = Arc::new(|m: &OriginModification| {
            Err(Feedback::modified_caller_object(&m.variable, &m.member))
        });
        let mut ns = Namespace::new();
        let img = image(1).with_observer(veto);
        ns.insert("image0", Value::Attachment(img.clone())).unwrap();

        let message =
            Message::new("done").with_attachments(vec![Binding::new("Image", "image0")]);
        let live = resolve_message(&message, &ns).unwrap();
        assert!(!live.attachments[0].has_observer());
        live.attachments[0]
            .set_attr("image0", "width", Value::Int(5))
            .unwrap();
        assert_eq!(img.get_attr("width").unwrap(), Value::Int(5));
    }
}
