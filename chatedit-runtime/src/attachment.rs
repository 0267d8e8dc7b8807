//! # Attachment proxy
//!
//! An [`Attachment`] wraps exactly one payload behind a shared handle and
//! forwards reads and writes to it. Cloning an attachment clones the handle,
//! so every clone sees the same payload; [`Attachment::deep_copy`] is the only
//! way to get an independent one.
//!
//! Attachments handed in by the caller are *original*. Before any write
//! reaches an original payload the attachment's observer is told which
//! variable and member are being written, and may veto the write.

use crate::error::Error;
use crate::feedback::{Feedback, Raised};
use crate::value::{Segment, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A write about to land on an original attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginModification {
    /// Namespace variable the write goes through
    pub variable: String,
    /// Member written, relative to the attachment (`width`, `size.w`, `["k"]`)
    pub member: String,
}

/// Observer notified before an original attachment is mutated.
/// Returning `Err` vetoes the write.
pub type OriginObserver =
    Arc<dyn Fn(&OriginModification) -> std::result::Result<(), Feedback> + Send + Sync>;

/// Shared handle onto one payload value
#[derive(Clone)]
pub struct Attachment {
    payload: Arc<RwLock<Value>>,
    filename: Option<String>,
    basename: Option<String>,
    original: bool,
    attr_paths: Vec<String>,
    related: Vec<Attachment>,
    observer: Option<OriginObserver>,
}

impl Attachment {
    /// Wrap a payload. Wrapping an attachment shares its payload instead of
    /// nesting one proxy inside another.
    pub fn new(payload: impl Into<Value>) -> Self {
        let payload = match payload.into() {
            Value::Attachment(inner) => inner.payload,
            value => Arc::new(RwLock::new(value)),
        };
        Self {
            payload,
            filename: None,
            basename: None,
            original: true,
            attr_paths: Vec::new(),
            related: Vec::new(),
            observer: None,
        }
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Preferred variable stem when the attachment is bound
    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = Some(basename.into());
        self
    }

    pub fn with_original(mut self, original: bool) -> Self {
        self.original = original;
        self
    }

    /// Paths below the payload worth pointing the model at (`.layers[0]`)
    pub fn with_attr_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attr_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_related(mut self, related: Vec<Attachment>) -> Self {
        self.related = related;
        self
    }

    pub fn with_observer(mut self, observer: OriginObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<OriginObserver>) {
        self.observer = observer;
    }

    pub fn set_original(&mut self, original: bool) {
        self.original = original;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn basename(&self) -> Option<&str> {
        self.basename.as_deref()
    }

    pub fn is_original(&self) -> bool {
        self.original
    }

    pub fn attr_paths(&self) -> &[String] {
        &self.attr_paths
    }

    pub fn related(&self) -> &[Attachment] {
        &self.related
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Whether `observer` is the one installed on this handle
    pub fn is_observed_by(&self, observer: &OriginObserver) -> bool {
        self.observer
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, observer))
    }

    /// Type name of the payload
    pub fn type_name(&self) -> String {
        self.read().type_name()
    }

    /// Whether both handles point at the same payload
    pub fn same_payload(&self, other: &Attachment) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Address of the payload, stable for the payload's lifetime
    pub fn payload_id(&self) -> usize {
        Arc::as_ptr(&self.payload) as *const () as usize
    }

    /// Borrow the payload for reading
    pub fn with_payload<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.read())
    }

    /// Clone of the current payload
    pub fn snapshot(&self) -> Value {
        self.read().clone()
    }

    // =========================================================================
    // Forwarded access
    // =========================================================================

    pub fn get_attr(&self, name: &str) -> crate::error::Result<Value> {
        self.read().get_attr(name)
    }

    pub fn get_item(&self, key: &Value) -> crate::error::Result<Value> {
        self.read().get_item(key)
    }

    pub fn set_attr(&self, variable: &str, name: &str, value: Value) -> Result<(), Raised> {
        self.set_path(variable, &[Segment::Attr(name.to_string())], value)
    }

    pub fn set_item(&self, variable: &str, key: Value, value: Value) -> Result<(), Raised> {
        self.set_path(variable, &[Segment::Item(key)], value)
    }

    pub fn del_attr(&self, variable: &str, name: &str) -> Result<(), Raised> {
        self.del_path(variable, &[Segment::Attr(name.to_string())])
    }

    pub fn del_item(&self, variable: &str, key: Value) -> Result<(), Raised> {
        self.del_path(variable, &[Segment::Item(key)])
    }

    /// Write `value` at `path` below the payload, `variable` being the
    /// namespace slot the write goes through.
    pub fn set_path(&self, variable: &str, path: &[Segment], value: Value) -> Result<(), Raised> {
        if path.is_empty() {
            return Err(Error::invalid_path(variable).into());
        }
        if value.references(self) {
            return Err(Error::invalid_argument(format!(
                "cannot store '{}' inside itself",
                variable
            ))
            .into());
        }
        self.notify(variable, path)?;
        self.write().set_path(variable, path, value)
    }

    /// Delete the member at `path` below the payload
    pub fn del_path(&self, variable: &str, path: &[Segment]) -> Result<(), Raised> {
        if path.is_empty() {
            return Err(Error::invalid_path(variable).into());
        }
        self.notify(variable, path)?;
        self.write().del_path(variable, path)
    }

    /// Independent copy: fresh payload, `original == false`, no observer
    pub fn deep_copy(&self) -> Self {
        let payload = self.read().deep_copy();
        Self {
            payload: Arc::new(RwLock::new(payload)),
            filename: self.filename.clone(),
            basename: self.basename.clone(),
            original: false,
            attr_paths: self.attr_paths.clone(),
            related: self.related.iter().map(Attachment::deep_copy).collect(),
            observer: None,
        }
    }

    fn notify(&self, variable: &str, path: &[Segment]) -> Result<(), Raised> {
        if !self.original {
            return Ok(());
        }
        let Some(observer) = &self.observer else {
            return Ok(());
        };
        let member: String = path.iter().map(ToString::to_string).collect();
        let modification = OriginModification {
            variable: variable.to_string(),
            member: member.trim_start_matches('.').to_string(),
        };
        observer(&modification).map_err(Raised::from)
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.payload.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.payload.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Attachment {
    fn eq(&self, other: &Self) -> bool {
        self.same_payload(other) || *self.read() == *other.read()
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self.read())
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("payload", &*self.read())
            .field("filename", &self.filename)
            .field("basename", &self.basename)
            .field("original", &self.original)
            .field("attr_paths", &self.attr_paths)
            .field("related", &self.related)
            .finish_non_exhaustive()
    }
}
