//! Context handles
//!
//! A [`Context`] is a cheap handle onto an entry the registry committed
//! to the instruction log. Handles are clonable and carry the class and
//! data type fixed at creation; the registry flips them unbound when the
//! entry is deleted, after which every further use is rejected.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use archi_types::TypeDescriptor;

use crate::class::ContextClass;

struct ContextState {
    key: String,
    registry: u64,
    class: Arc<dyn ContextClass>,
    data_type: TypeDescriptor,
    bound: Cell<bool>,
}

/// Handle onto a live registry entry.
#[derive(Clone)]
pub struct Context {
    state: Rc<ContextState>,
}

impl Context {
    pub(crate) fn bind(
        key: String,
        registry: u64,
        class: Arc<dyn ContextClass>,
        data_type: TypeDescriptor,
    ) -> Context {
        Context {
            state: Rc::new(ContextState {
                key,
                registry,
                class,
                data_type,
                bound: Cell::new(true),
            }),
        }
    }

    /// The key this context is registered under.
    pub fn key(&self) -> &str {
        &self.state.key
    }

    /// The class governing slots and actions of this context.
    pub fn class(&self) -> &Arc<dyn ContextClass> {
        &self.state.class
    }

    /// Declared type of the context data.
    pub fn data_type(&self) -> &TypeDescriptor {
        &self.state.data_type
    }

    /// Whether the entry is still live. Deleting the entry unbinds
    /// every handle pointing at it.
    pub fn is_bound(&self) -> bool {
        self.state.bound.get()
    }

    pub(crate) fn registry_serial(&self) -> u64 {
        self.state.registry
    }

    pub(crate) fn unbind(&self) {
        self.state.bound.set(false);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("key", &self.state.key)
            .field("class", &self.state.class.name())
            .field("data_type", &self.state.data_type)
            .field("bound", &self.state.bound.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::base_class;

    #[test]
    fn handles_share_bound_state() {
        let ctx = Context::bind(
            "camera".to_string(),
            1,
            base_class(),
            TypeDescriptor::Wildcard,
        );
        let other = ctx.clone();
        assert!(ctx.is_bound());
        other.unbind();
        assert!(!ctx.is_bound());
        assert_eq!(ctx.key(), "camera");
    }

    #[test]
    fn debug_names_the_class() {
        let ctx = Context::bind(
            "camera".to_string(),
            1,
            base_class(),
            TypeDescriptor::Wildcard,
        );
        let text = format!("{ctx:?}");
        assert!(text.contains("\"camera\""));
        assert!(text.contains("class: \"base\""));
    }
}
