//! Registry of the backends that can be constructed in this process.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use logbuch_backend::{BackendFactory, BackendKind};
use logbuch_backend_thread::ThreadBackendFactory;

/// The set of constructible backends.
///
/// The thread backend is always present and serves as the fallback.
#[derive(Clone)]
pub struct Backends {
    factories: HashMap<BackendKind, Arc<dyn BackendFactory>>,
}

impl Backends {
    /// Only the thread backend, as if no optional capability were present.
    #[must_use]
    pub fn thread_only() -> Self {
        let mut factories: HashMap<BackendKind, Arc<dyn BackendFactory>> = HashMap::new();
        factories.insert(BackendKind::Thread, Arc::new(ThreadBackendFactory));

        Self { factories }
    }

    /// Registers `factory` under its kind, replacing any previous one.
    #[must_use]
    pub fn with(mut self, factory: impl BackendFactory) -> Self {
        self.factories.insert(factory.kind(), Arc::new(factory));
        self
    }

    /// The factory for `kind`, if available.
    #[must_use]
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn BackendFactory>> {
        self.factories.get(&kind).cloned()
    }

    /// Whether `kind` can be constructed.
    #[must_use]
    pub fn contains(&self, kind: BackendKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub(crate) fn fallback(&self) -> Arc<dyn BackendFactory> {
        self.get(BackendKind::Thread)
            .unwrap_or_else(|| Arc::new(ThreadBackendFactory))
    }
}

impl Default for Backends {
    /// Every backend compiled into this build.
    fn default() -> Self {
        let backends = Self::thread_only();

        #[cfg(feature = "native-async")]
        let backends = backends.with(logbuch_backend_native::NativeBackendFactory);

        backends
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().map(|kind| kind.as_str()).collect();
        kinds.sort_unstable();

        f.debug_struct("Backends").field("kinds", &kinds).finish()
    }
}
