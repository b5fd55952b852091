//! Embedded chart file sets
//!
//! Each chart embeds only the templates that produce its values document.
//! The chart manifests themselves are rendered by the chart renderer from
//! the on-disk charts directory.

/// One embedded file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChartFile {
    /// Path relative to the chart root
    pub path: &'static str,
    /// File contents
    pub contents: &'static str,
}

/// A chart's embedded file set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chart {
    /// Chart name, also the directory name under the charts root
    pub name: &'static str,
    /// Embedded files
    pub files: &'static [ChartFile],
}

/// Entry point template of every chart
pub const VALUES_TEMPLATE: &str = "values.yaml.tpl";

impl Chart {
    /// Contents of an embedded file
    pub fn file(&self, path: &str) -> Option<&'static str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.contents)
    }

    /// Paths of every embedded template (`*.tpl`)
    pub fn templates(&self) -> impl Iterator<Item = &'static ChartFile> {
        self.files.iter().filter(|f| f.path.ends_with(".tpl"))
    }
}
