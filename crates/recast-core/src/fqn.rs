//! Fully-qualified unit name handling
//!
//! Unit names are dot-separated (`app.models.Widget`). A nested unit carries
//! its enclosing unit's name followed by `$` and a suffix (`app.models.Widget$Row`);
//! nested units share the enclosing unit's source file.
//!
//! ## Usage
//!
//! ```
//! use recast_core::fqn::UnitName;
//!
//! let name = UnitName::new("app.models.Widget$Row");
//! assert_eq!(name.enclosing(), "app.models.Widget");
//! assert_eq!(name.package(), "app.models");
//! assert_eq!(name.relative_path("src"), "app/models/Widget.src");
//! ```

use std::fmt;

/// Separator between an enclosing unit and a nested unit.
pub const NESTED_SEPARATOR: char = '$';

/// Separator between package segments.
pub const PACKAGE_SEPARATOR: char = '.';

/// Suffix of package descriptor names, which are not compilable units.
pub const PACKAGE_DESCRIPTOR: &str = "package-info";

/// A borrowed view over a fully-qualified unit name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitName<'a> {
    full: &'a str,
}

impl<'a> UnitName<'a> {
    pub fn new(full: &'a str) -> Self {
        Self { full }
    }

    /// The full name as given
    pub fn as_str(&self) -> &'a str {
        self.full
    }

    /// The enclosing unit name, i.e. everything before the first `$`
    pub fn enclosing(&self) -> &'a str {
        match self.full.find(NESTED_SEPARATOR) {
            Some(idx) => &self.full[..idx],
            None => self.full,
        }
    }

    /// Whether this names a nested unit
    pub fn is_nested(&self) -> bool {
        self.full.contains(NESTED_SEPARATOR)
    }

    /// The package part of the name, or `""` for the default package
    pub fn package(&self) -> &'a str {
        match self.full.rfind(PACKAGE_SEPARATOR) {
            Some(idx) => &self.full[..idx],
            None => "",
        }
    }

    /// The last segment of the name
    pub fn simple_name(&self) -> &'a str {
        match self.full.rfind(PACKAGE_SEPARATOR) {
            Some(idx) => &self.full[idx + 1..],
            None => self.full,
        }
    }

    /// Package descriptors share the naming scheme but never produce a unit
    pub fn is_package_descriptor(&self) -> bool {
        self.full.ends_with(PACKAGE_DESCRIPTOR)
    }

    /// The enclosing unit as a `/`-separated path without extension
    pub fn relative_stem(&self) -> String {
        self.enclosing().replace(PACKAGE_SEPARATOR, "/")
    }

    /// The enclosing unit's source path relative to a source root
    pub fn relative_path(&self, extension: &str) -> String {
        format!("{}.{}", self.relative_stem(), extension)
    }
}

impl fmt::Display for UnitName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full)
    }
}
