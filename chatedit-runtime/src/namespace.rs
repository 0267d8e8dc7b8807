//! # Namespace
//!
//! The variables and capabilities generated code runs against. A name is
//! either a variable or a capability, never both.

use crate::attachment::Attachment;
use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Namespace {
    values: BTreeMap<String, Value>,
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
    /// Payloads handed in by the caller; only these are guarded against writes
    caller_objects: Vec<Attachment>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Expose a capability under its signature name
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<()> {
        let name = capability.signature().name.clone();
        if self.values.contains_key(&name) {
            return Err(Error::invalid_argument(format!(
                "'{}' is already bound to a variable",
                name
            ))
            .with_operation("namespace::register"));
        }
        self.capabilities.insert(name, capability);
        Ok(())
    }

    pub fn capability(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.get(name)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Arc<dyn Capability>> {
        self.capabilities.values()
    }

    pub fn is_capability(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Names of capabilities that must be awaited
    pub fn suspending_capabilities(&self) -> BTreeSet<String> {
        self.capabilities
            .values()
            .map(|c| c.signature())
            .filter(|s| s.suspending)
            .map(|s| s.name.clone())
            .collect()
    }

    /// One rendered signature per line, for prompts
    pub fn manifest(&self) -> String {
        self.capabilities
            .values()
            .map(|c| c.signature().render())
            .collect::<Vec<_>>()
            .join("\n")
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Whether `name` is taken by a variable or a capability
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.capabilities.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    /// Bind a variable, returning the value it replaced
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Result<Option<Value>> {
        let name = name.into();
        if self.capabilities.contains_key(&name) {
            return Err(Error::invalid_argument(format!(
                "cannot assign to capability '{}'",
                name
            ))
            .with_operation("namespace::insert"));
        }
        Ok(self.values.insert(name, value))
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.values.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy over variables from `previous` whose names are still free.
    /// Returns how many were inherited.
    pub fn inherit(&mut self, previous: &Namespace) -> usize {
        let mut inherited = 0;
        for (name, value) in &previous.values {
            if !self.contains(name) {
                self.values.insert(name.clone(), value.clone());
                inherited += 1;
            }
        }
        for attachment in &previous.caller_objects {
            self.mark_caller_object(attachment);
        }
        inherited
    }

    // =========================================================================
    // Caller objects
    // =========================================================================

    /// Record the payload of `attachment` as handed in by the caller
    pub fn mark_caller_object(&mut self, attachment: &Attachment) {
        if !self.is_caller_object(attachment) {
            let mut handle = attachment.clone();
            handle.set_observer(None);
            self.caller_objects.push(handle);
        }
    }

    pub fn is_caller_object(&self, attachment: &Attachment) -> bool {
        self.caller_objects.iter().any(|c| c.same_payload(attachment))
    }

    pub fn caller_objects(&self) -> &[Attachment] {
        &self.caller_objects
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("values", &self.values)
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FnCapability, Signature, TypeSpec};
    use crate::error::ErrorKind;

    fn noop(name: &str) -> Arc<dyn Capability> {
        Arc::new(FnCapability::new(
            Signature::new(name).returns(TypeSpec::None),
            |_, _| Ok(Value::Null),
        ))
    }

    #[test]
    fn test_names_are_unique() {
        let mut ns = Namespace::new();
        ns.register(noop("respond")).unwrap();
        assert!(ns
            .insert("respond", Value::Int(1))
            .is_err_and(|e| e.kind() == ErrorKind::InvalidArgument));

        ns.insert("total", Value::Int(1)).unwrap();
        assert!(ns.register(noop("total")).is_err());
        assert!(ns.contains("respond"));
        assert!(ns.contains("total"));
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn test_insert_returns_previous() {
        let mut ns = Namespace::new();
        assert!(ns.insert("x", Value::Int(1)).unwrap().is_none());
        assert_eq!(ns.insert("x", Value::Int(2)).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_inherit_keeps_existing() {
        let mut previous = Namespace::new();
        previous.insert("x", Value::Int(1)).unwrap();
        previous.insert("y", Value::Int(2)).unwrap();

        let mut current = Namespace::new();
        current.insert("x", Value::Int(10)).unwrap();
        assert_eq!(current.inherit(&previous), 1);
        assert_eq!(current.get("x"), Some(&Value::Int(10)));
        assert_eq!(current.get("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_caller_objects_follow_inherit() {
        let image = Attachment::new(Value::Int(1));
        let mut previous = Namespace::new();
        previous.mark_caller_object(&image);
        previous.mark_caller_object(&image.clone());
        assert_eq!(previous.caller_objects().len(), 1);

        let mut current = Namespace::new();
        current.inherit(&previous);
        assert!(current.is_caller_object(&image));
        assert!(!current.is_caller_object(&image.deep_copy()));
    }

    #[test]
    fn test_suspending_capabilities() {
        let mut ns = Namespace::new();
        ns.register(noop("sync_op")).unwrap();
        ns.register(Arc::new(FnCapability::new(
            Signature::new("slow_op").suspending(),
            |_, _| Ok(Value::Null),
        )))
        .unwrap();
        let names = ns.suspending_capabilities();
        assert_eq!(names.len(), 1);
        assert!(names.contains("slow_op"));
    }
}
