//! Visualizer factory: kind identifier -> constructor.
//!
//! Populated at startup; `open(kind, ..)` looks constructors up here rather
//! than instantiating arbitrary types.

use tracing::debug;

use slimtune_core::{SessionError, SessionResult};

use super::{SnapshotSummary, Visualizer, SUMMARY_KIND};

/// Constructor for one visualizer kind.
pub type VisualizerConstructor = Box<dyn Fn() -> Box<dyn Visualizer> + Send + Sync>;

/// A registered kind, as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizerKindInfo {
    pub kind: String,
    pub label: String,
}

struct Entry {
    info: VisualizerKindInfo,
    constructor: VisualizerConstructor,
}

/// Registry of visualizer constructors, in registration order.
#[derive(Default)]
pub struct VisualizerFactory {
    entries: Vec<Entry>,
}

impl VisualizerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the visualizers shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(SUMMARY_KIND, "Snapshot Summary", || {
            Box::new(SnapshotSummary::new())
        });
        factory
    }

    /// Registers a constructor under `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, label: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Visualizer> + Send + Sync + 'static,
    {
        let info = VisualizerKindInfo {
            kind: kind.into(),
            label: label.into(),
        };
        debug!(kind = %info.kind, "Registered visualizer kind");

        let entry = Entry {
            info,
            constructor: Box::new(constructor),
        };
        match self.entries.iter_mut().find(|e| e.info.kind == entry.info.kind) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Instantiates a visualizer of the given kind.
    ///
    /// # Errors
    ///
    /// `SessionError::UnknownVisualizer` if nothing is registered under `kind`.
    pub fn create(&self, kind: &str) -> SessionResult<Box<dyn Visualizer>> {
        self.entries
            .iter()
            .find(|e| e.info.kind == kind)
            .map(|e| (e.constructor)())
            .ok_or_else(|| SessionError::UnknownVisualizer(kind.to_string()))
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> Vec<VisualizerKindInfo> {
        self.entries.iter().map(|e| e.info.clone()).collect()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.iter().any(|e| e.info.kind == kind)
    }
}

impl std::fmt::Debug for VisualizerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizerFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::VisualizerContext;

    struct Noop;

    impl Visualizer for Noop {
        fn display_name(&self) -> String {
            "Noop".to_string()
        }
        fn initialize(&mut self, _ctx: &VisualizerContext<'_>) -> bool {
            true
        }
        fn on_close(&mut self) {}
    }

    #[test]
    fn test_builtins_registered() {
        let factory = VisualizerFactory::with_builtins();
        assert!(factory.contains(SUMMARY_KIND));
        let visualizer = factory.create(SUMMARY_KIND).unwrap();
        assert_eq!(visualizer.display_name(), "Snapshot Summary");
    }

    #[test]
    fn test_unknown_kind() {
        let factory = VisualizerFactory::new();
        assert!(matches!(
            factory.create("flame"),
            Err(SessionError::UnknownVisualizer(kind)) if kind == "flame"
        ));
    }

    #[test]
    fn test_register_replaces_and_keeps_order() {
        let mut factory = VisualizerFactory::with_builtins();
        factory.register("noop", "No-op", || Box::new(Noop));
        factory.register(SUMMARY_KIND, "Summary v2", || Box::new(Noop));

        let kinds = factory.kinds();
        assert_eq!(kinds.len(), 2);
        assert_eq!(kinds[0].kind, SUMMARY_KIND);
        assert_eq!(kinds[0].label, "Summary v2");
        assert_eq!(kinds[1].kind, "noop");
    }
}
