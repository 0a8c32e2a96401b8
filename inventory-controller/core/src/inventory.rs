use crate::Workload;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

/// Workload names grouped by namespace.
///
/// Namespaces are kept in the order they were first observed and names within
/// a namespace are kept in the order they were listed, so that the serialized
/// form is stable for a given list response. Duplicate names are preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Inventory(IndexMap<String, Vec<String>>);

const JSON_INDENT: &[u8] = b"    ";

// === impl Inventory ===

impl Inventory {
    /// Groups workloads by namespace in a single pass.
    pub fn aggregate(workloads: impl IntoIterator<Item = Workload>) -> Self {
        let mut results = IndexMap::<String, Vec<String>>::new();
        for Workload { namespace, name } in workloads {
            results.entry(namespace).or_default().push(name);
        }
        Self(results)
    }

    pub fn get(&self, namespace: &str) -> Option<&[String]> {
        self.0.get(namespace).map(Vec::as_slice)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(ns, names)| (ns.as_str(), names.as_slice()))
    }

    /// Returns the number of namespaces.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the inventory as indented JSON followed by a newline.
    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(JSON_INDENT);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

impl FromIterator<Workload> for Inventory {
    fn from_iter<T: IntoIterator<Item = Workload>>(iter: T) -> Self {
        Self::aggregate(iter)
    }
}
