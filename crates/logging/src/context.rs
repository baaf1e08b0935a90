//! Request-scoped context values
//!
//! A [`Context`] is an immutable chain of nodes. Each derivation adds a child
//! node pointing at its parent, so a value bound on a child shadows the
//! parent's value for that child and everything derived from it, while the
//! parent keeps seeing its own binding. Contexts are passed explicitly; there
//! is no thread-local or task-local state.
//!
//! Every context also carries a cancellation token. [`Context::with_cancel`]
//! derives a child with its own token, cancelled together with any ancestor
//! token but never cancelling its ancestors.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Immutable, cheaply clonable key-value carrier
#[derive(Clone)]
pub struct Context {
    node: Arc<Node>,
}

struct Node {
    parent: Option<Arc<Node>>,
    value: Option<(TypeId, Arc<dyn Any + Send + Sync>)>,
    token: CancellationToken,
}

impl Drop for Node {
    // Unlink uniquely owned ancestors iteratively; recursive drops overflow
    // the stack on long derivation chains.
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(node) = parent {
            parent = match Arc::try_unwrap(node) {
                Ok(mut node) => node.parent.take(),
                Err(_) => None,
            };
        }
    }
}

impl Context {
    /// The empty root context
    pub fn background() -> Self {
        Self {
            node: Arc::new(Node {
                parent: None,
                value: None,
                token: CancellationToken::new(),
            }),
        }
    }

    /// Derive a child context binding `value` under the key type `K`
    ///
    /// `K` is usually a private zero-sized type so unrelated modules cannot
    /// collide on the same key.
    pub fn with_value<K: 'static, V: Any + Send + Sync>(&self, value: V) -> Context {
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        self.child(Some((TypeId::of::<K>(), value)), self.node.token.clone())
    }

    /// Look up the value bound under `K` by this context or its nearest ancestor
    ///
    /// Returns `None` when no node binds `K`, or when the nearest binding holds
    /// a value of a different type.
    pub fn value<K: 'static, V: Any + Send + Sync>(&self) -> Option<&V> {
        let key = TypeId::of::<K>();
        let mut node = Some(&self.node);

        while let Some(current) = node {
            if let Some((bound, value)) = &current.value {
                if *bound == key {
                    return value.downcast_ref::<V>();
                }
            }
            node = current.parent.as_ref();
        }

        None
    }

    /// Derive a cancellable child; cancelling the returned token cancels the
    /// child and its descendants only
    pub fn with_cancel(&self) -> (Context, CancellationToken) {
        let token = self.node.token.child_token();
        (self.child(None, token.clone()), token)
    }

    /// Whether this context (or an ancestor) has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.node.token.is_cancelled()
    }

    /// Completes once this context is cancelled
    pub async fn cancelled(&self) {
        self.node.token.cancelled().await
    }

    /// Number of derivations between this context and its root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.node.parent.as_ref();
        while let Some(current) = node {
            depth += 1;
            node = current.parent.as_ref();
        }
        depth
    }

    fn child(&self, value: Option<(TypeId, Arc<dyn Any + Send + Sync>)>, token: CancellationToken) -> Context {
        Context {
            node: Arc::new(Node {
                parent: Some(Arc::clone(&self.node)),
                value,
                token,
            }),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
