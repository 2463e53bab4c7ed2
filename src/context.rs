//! Request-scoped context.
//!
//! A `Context` is an immutable overlay of typed values plus an optional
//! deadline. Deriving a context never changes its parent: every `with_*` call
//! wraps the parent in a new node, and lookups walk from the newest node back
//! to the root.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Node {
    key: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

/// Immutable, cheaply clonable request context.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
    deadline: Option<Instant>,
}

impl Context {
    /// Empty root context with no values and no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context carrying `value` under the key type `K`.
    ///
    /// `K` is usually a private zero-sized type, so unrelated modules cannot
    /// collide on the same slot.
    pub fn with_value<K, V>(&self, value: V) -> Self
    where
        K: 'static,
        V: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Node {
                key: TypeId::of::<K>(),
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
            deadline: self.deadline,
        }
    }

    /// Look up the newest value stored under `K`.
    ///
    /// Returns `None` when the key was never set or when the stored value is
    /// not a `V`.
    pub fn value<K, V>(&self) -> Option<&V>
    where
        K: 'static,
        V: Any,
    {
        let key = TypeId::of::<K>();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if n.key == key {
                return n.value.downcast_ref::<V>();
            }
            node = n.parent.as_deref();
        }
        None
    }

    /// Derive a context that expires after `timeout`. A timeout too large to
    /// represent as an instant leaves the parent's deadline in place.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derive a context that expires at `deadline`. A child can only shorten
    /// the parent's deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            head: self.head.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            depth += 1;
            node = n.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.depth())
            .field("deadline", &self.deadline)
            .finish()
    }
}
