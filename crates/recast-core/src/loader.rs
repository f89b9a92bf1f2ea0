//! Runtime loader collaborator contract
//!
//! Capability facts are captured once, when a unit is loaded, in a
//! [`Capabilities`] descriptor stored with the [`LoadedType`]. Discovery
//! queries filter over those descriptors instead of asking the runtime again.

use std::collections::BTreeSet;

use crate::error::LoadError;

/// Supertypes and markers a loaded unit satisfies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    supertypes: BTreeSet<String>,
    markers: BTreeSet<String>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supertype(mut self, name: impl Into<String>) -> Self {
        self.supertypes.insert(name.into());
        self
    }

    pub fn with_marker(mut self, name: impl Into<String>) -> Self {
        self.markers.insert(name.into());
        self
    }

    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.supertypes.iter().map(String::as_str)
    }

    pub fn markers(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(String::as_str)
    }

    pub fn has_supertype(&self, name: &str) -> bool {
        self.supertypes.contains(name)
    }

    pub fn has_marker(&self, name: &str) -> bool {
        self.markers.contains(name)
    }
}

/// A unit accepted by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedType {
    name: String,
    handle: u64,
    capabilities: Capabilities,
}

impl LoadedType {
    pub fn new(name: impl Into<String>, handle: u64, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            handle,
            capabilities,
        }
    }

    /// Runtime name of the type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque runtime handle
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// A type is assignable to itself and to every supertype it declares
    pub fn is_assignable_to(&self, capability: &str) -> bool {
        self.name == capability || self.capabilities.has_supertype(capability)
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.capabilities.has_marker(marker)
    }
}

/// Turns final binaries into invocable runtime types
pub trait RuntimeLoader: Send + Sync {
    /// Define the unit in the runtime. Blocks for the duration of loading.
    fn load(&self, name: &str, binary: &[u8]) -> Result<LoadedType, LoadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability() {
        let ty = LoadedType::new(
            "app.Widget",
            1,
            Capabilities::new()
                .with_supertype("ui.Component")
                .with_marker("ui.Managed"),
        );
        assert!(ty.is_assignable_to("app.Widget"));
        assert!(ty.is_assignable_to("ui.Component"));
        assert!(!ty.is_assignable_to("ui.Layout"));
        assert!(ty.has_marker("ui.Managed"));
        assert_eq!(
            ty.capabilities().supertypes().collect::<Vec<_>>(),
            vec!["ui.Component"]
        );
        assert_eq!(
            ty.capabilities().markers().collect::<Vec<_>>(),
            vec!["ui.Managed"]
        );
        assert!(!ty.has_marker("ui.Component"));
    }
}
