//! Extraction documents and dot-notation field paths.
//!
//! Paths use the notation the extraction schemas are written in:
//! `aldSystem.materialDeposited`, `processes[0].aldSystem`,
//! `reactantSelection.precursor[*].compound`. A `[*]` segment matches every
//! element of an array; [`ExtractionDocument::expand`] turns a pattern into
//! the concrete paths present in a document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ChemlinkError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    /// `[*]`: every element of an array.
    Wildcard,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

fn invalid(path: &str, reason: &'static str) -> ChemlinkError {
    ChemlinkError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

impl FieldPath {
    /// The document root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(invalid(path, "empty path"));
        }
        let mut segments = Vec::new();
        let mut rest = path;
        let mut first = true;
        loop {
            let key_end = rest.find(['.', '[']).unwrap_or(rest.len());
            let key = &rest[..key_end];
            if key.is_empty() {
                // A leading index (`[0].name`) is the only place a key may be absent.
                if !(first && rest.starts_with('[')) {
                    return Err(invalid(path, "empty segment"));
                }
            } else {
                segments.push(PathSegment::Key(key.to_string()));
            }
            first = false;
            rest = &rest[key_end..];

            while let Some(inner) = rest.strip_prefix('[') {
                if let Some(quoted) = inner.strip_prefix('"') {
                    let (key, used) =
                        unquote_key(quoted).ok_or_else(|| invalid(path, "unterminated quoted key"))?;
                    segments.push(PathSegment::Key(key));
                    rest = quoted[used..]
                        .strip_prefix(']')
                        .ok_or_else(|| invalid(path, "expected ']' after quoted key"))?;
                    continue;
                }
                let close = inner.find(']').ok_or_else(|| invalid(path, "unclosed '['"))?;
                let token = &inner[..close];
                let segment = if token == "*" {
                    PathSegment::Wildcard
                } else {
                    token
                        .parse::<usize>()
                        .map(PathSegment::Index)
                        .map_err(|_| invalid(path, "bracket must hold an index or '*'"))?
                };
                segments.push(segment);
                rest = &inner[close + 1..];
            }

            if rest.is_empty() {
                break;
            }
            rest = rest
                .strip_prefix('.')
                .ok_or_else(|| invalid(path, "expected '.' or '[' after ']'"))?;
        }
        Ok(Self { segments })
    }

    /// Convert a JSON Pointer (`/processes/0/name`) into a path. `within` is
    /// the value the pointer addresses: a numeric token under an object stays
    /// a key. Past the end of `within`, numeric tokens become indices.
    #[must_use]
    pub fn from_json_pointer(pointer: &str, within: &Value) -> Self {
        let mut node = Some(within);
        let mut segments = Vec::new();
        for token in pointer.split('/').skip(1) {
            let token = token.replace("~1", "/").replace("~0", "~");
            let index = token
                .parse::<usize>()
                .ok()
                .filter(|idx| idx.to_string() == token && !matches!(node, Some(Value::Object(_))));
            match index {
                Some(idx) => {
                    node = node.and_then(|value| value.get(idx));
                    segments.push(PathSegment::Index(idx));
                }
                None => {
                    node = node.and_then(|value| value.get(token.as_str()));
                    segments.push(PathSegment::Key(token));
                }
            }
        }
        Self { segments }
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the path has no wildcard.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !self.segments.contains(&PathSegment::Wildcard)
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    #[must_use]
    pub fn index(mut self, idx: usize) -> Self {
        self.segments.push(PathSegment::Index(idx));
        self
    }

    /// `self` followed by every segment of `tail`.
    #[must_use]
    pub fn join(&self, tail: &FieldPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(tail.segments.iter().cloned());
        Self { segments }
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Whether this concrete path is one of the paths `pattern` expands to.
    #[must_use]
    pub fn matches(&self, pattern: &FieldPath) -> bool {
        self.segments.len() == pattern.segments.len() && self.falls_under(pattern)
    }

    /// Whether this path is, or lies below, a path `pattern` expands to.
    #[must_use]
    pub fn falls_under(&self, pattern: &FieldPath) -> bool {
        self.segments.len() >= pattern.segments.len()
            && self
                .segments
                .iter()
                .zip(&pattern.segments)
                .all(|(have, want)| match (have, want) {
                    (PathSegment::Index(_), PathSegment::Wildcard) => true,
                    _ => have == want,
                })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if needs_quoting(key) => {
                    f.write_str("[\"")?;
                    for ch in key.chars() {
                        if matches!(ch, '"' | '\\') {
                            f.write_str("\\")?;
                        }
                        write!(f, "{ch}")?;
                    }
                    f.write_str("\"]")?;
                }
                PathSegment::Key(key) if pos == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
                PathSegment::Wildcard => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

/// Keys the plain dotted form cannot carry are written as `["key"]`.
fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(['.', '[', ']', '"', '\\'])
}

/// Body of a `["..."]` key after the opening quote: the unescaped key and the
/// byte length consumed, closing quote included.
fn unquote_key(quoted: &str) -> Option<(String, usize)> {
    let mut key = String::new();
    let mut chars = quoted.char_indices();
    while let Some((pos, ch)) = chars.next() {
        match ch {
            '"' => return Some((key, pos + 1)),
            '\\' => key.push(chars.next()?.1),
            _ => key.push(ch),
        }
    }
    None
}

impl FromStr for FieldPath {
    type Err = ChemlinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A structured extraction result: a JSON tree addressed by [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionDocument(Value);

impl ExtractionDocument {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(json)?))
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Value at a concrete path; wildcards never match here.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.segments.iter().try_fold(&self.0, |node, segment| match segment {
            PathSegment::Key(key) => node.as_object()?.get(key),
            PathSegment::Index(idx) => node.as_array()?.get(*idx),
            PathSegment::Wildcard => None,
        })
    }

    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut Value> {
        path.segments
            .iter()
            .try_fold(&mut self.0, |node, segment| match segment {
                PathSegment::Key(key) => node.as_object_mut()?.get_mut(key),
                PathSegment::Index(idx) => node.as_array_mut()?.get_mut(*idx),
                PathSegment::Wildcard => None,
            })
    }

    /// Replace (or insert, for an object key) the value at `path`. The parent
    /// must already exist.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<()> {
        let Some((last, parent_segments)) = path.segments.split_last() else {
            self.0 = value;
            return Ok(());
        };
        let parent_path = FieldPath {
            segments: parent_segments.to_vec(),
        };
        let display = path.to_string();
        let parent = self
            .get_mut(&parent_path)
            .ok_or_else(|| invalid(&display, "parent does not exist"))?;
        match last {
            PathSegment::Key(key) => {
                let object = parent
                    .as_object_mut()
                    .ok_or_else(|| invalid(&display, "parent is not an object"))?;
                object.insert(key.clone(), value);
            }
            PathSegment::Index(idx) => {
                let slot = parent
                    .as_array_mut()
                    .and_then(|array| array.get_mut(*idx))
                    .ok_or_else(|| invalid(&display, "index out of bounds"))?;
                *slot = value;
            }
            PathSegment::Wildcard => return Err(invalid(&display, "cannot set through a wildcard")),
        }
        Ok(())
    }

    /// Every concrete path (with its value) that `pattern` matches, in
    /// document order. Missing keys and type mismatches simply match nothing.
    #[must_use]
    pub fn expand(&self, pattern: &FieldPath) -> Vec<(FieldPath, &Value)> {
        let mut out = Vec::new();
        expand_into(&self.0, &pattern.segments, FieldPath::root(), &mut out);
        out
    }
}

fn expand_into<'v>(
    node: &'v Value,
    remaining: &[PathSegment],
    here: FieldPath,
    out: &mut Vec<(FieldPath, &'v Value)>,
) {
    let Some((segment, rest)) = remaining.split_first() else {
        out.push((here, node));
        return;
    };
    match segment {
        PathSegment::Key(key) => {
            if let Some(child) = node.as_object().and_then(|object| object.get(key)) {
                expand_into(child, rest, here.key(key.clone()), out);
            }
        }
        PathSegment::Index(idx) => {
            if let Some(child) = node.as_array().and_then(|array| array.get(*idx)) {
                expand_into(child, rest, here.index(*idx), out);
            }
        }
        PathSegment::Wildcard => {
            if let Some(array) = node.as_array() {
                for (idx, child) in array.iter().enumerate() {
                    expand_into(child, rest, here.clone().index(idx), out);
                }
            }
        }
    }
}

impl From<Value> for ExtractionDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<ExtractionDocument> for Value {
    fn from(document: ExtractionDocument) -> Self {
        document.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    #[test]
    fn parse_and_display_round_trip() {
        for raw in [
            "aldSystem.materialDeposited",
            "processes[0].aldSystem",
            "reactantSelection.precursor[*].compound",
            "matrix[1][2].cell",
            "[3].name",
        ] {
            assert_eq!(path(raw).to_string(), raw);
        }
        assert_eq!(
            path("a[2].b").segments(),
            &[
                PathSegment::Key("a".into()),
                PathSegment::Index(2),
                PathSegment::Key("b".into())
            ]
        );
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for raw in ["", "a..b", ".a", "a.", "a[", "a[x]", "a[0]b", "a[-1]"] {
            let err = FieldPath::parse(raw).expect_err(raw);
            assert!(matches!(err, ChemlinkError::InvalidPath { .. }), "{raw}: {err:?}");
        }
    }

    #[test]
    fn json_pointer_conversion() {
        let doc = json!({"processes": [{"aldSystem": {"a/b": 1}}]});
        let converted = FieldPath::from_json_pointer("/processes/0/aldSystem/a~1b", &doc);
        assert_eq!(converted.to_string(), "processes[0].aldSystem.a/b");
        assert!(FieldPath::from_json_pointer("", &doc).is_root());
    }

    #[test]
    fn json_pointer_numeric_object_key_stays_a_key() {
        let doc = json!({"layers": {"0": {"thickness": "5 nm"}}, "steps": [{"0": true}]});
        let converted = FieldPath::from_json_pointer("/layers/0/thickness", &doc);
        assert_eq!(
            converted.segments(),
            &[
                PathSegment::Key("layers".into()),
                PathSegment::Key("0".into()),
                PathSegment::Key("thickness".into())
            ]
        );
        assert_eq!(ExtractionDocument::new(doc.clone()).get(&converted), Some(&json!("5 nm")));

        let nested = FieldPath::from_json_pointer("/steps/0/0", &doc);
        assert_eq!(
            nested.segments(),
            &[
                PathSegment::Key("steps".into()),
                PathSegment::Index(0),
                PathSegment::Key("0".into())
            ]
        );
        // Beyond the document, numeric tokens are taken as indices.
        let missing = FieldPath::from_json_pointer("/absent/3", &doc);
        assert_eq!(missing.segments()[1], PathSegment::Index(3));
    }

    #[test]
    fn awkward_keys_display_quoted_and_parse_back() {
        let original = FieldPath::root()
            .key("processes")
            .index(0)
            .key("film.thickness")
            .key("ratio[O:Zn]")
            .key(r#"say "hi"\"#)
            .key("");
        let shown = original.to_string();
        assert_eq!(
            shown,
            r#"processes[0]["film.thickness"]["ratio[O:Zn]"]["say \"hi\"\\"][""]"#
        );
        assert_eq!(path(&shown), original);

        let leading = FieldPath::root().key("a.b").key("c");
        assert_eq!(leading.to_string(), r#"["a.b"].c"#);
        assert_eq!(path(r#"["a.b"].c"#), leading);

        for raw in [r#"a["b"#, r#"a["b"x"#, r#"a.["b"]"#] {
            assert!(FieldPath::parse(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn expand_resolves_wildcards_in_order() {
        let doc = ExtractionDocument::new(json!({
            "precursor": [
                {"compound": "TMA"},
                {"other": 1},
                {"compound": "H2O"}
            ]
        }));
        let hits = doc.expand(&path("precursor[*].compound"));
        let found: Vec<_> = hits
            .iter()
            .map(|(p, v)| (p.to_string(), v.as_str().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("precursor[0].compound".to_string(), "TMA".to_string()),
                ("precursor[2].compound".to_string(), "H2O".to_string()),
            ]
        );
        assert!(doc.expand(&path("missing[*].x")).is_empty());
        assert!(path("precursor[2].compound").matches(&path("precursor[*].compound")));
        assert!(!path("precursor[2].other").matches(&path("precursor[*].compound")));
        assert!(path("precursor[2].compound").falls_under(&path("precursor[*]")));
        assert!(!path("precursor").falls_under(&path("precursor[*]")));
    }

    #[test]
    fn get_and_set_concrete_paths() {
        let mut doc = ExtractionDocument::new(json!({"a": {"b": [1, 2]}}));
        assert_eq!(doc.get(&path("a.b[1]")), Some(&json!(2)));
        assert!(doc.get(&path("a.b[*]")).is_none());

        doc.set(&path("a.b[0]"), json!("x")).expect("set index");
        doc.set(&path("a.c"), json!(true)).expect("insert key");
        assert_eq!(doc.as_value(), &json!({"a": {"b": ["x", 2], "c": true}}));

        let err = doc.set(&path("a.b[5]"), json!(0)).expect_err("out of bounds");
        assert!(matches!(err, ChemlinkError::InvalidPath { .. }));
        let err = doc.set(&path("z.y"), json!(0)).expect_err("no parent");
        assert!(matches!(err, ChemlinkError::InvalidPath { .. }));
    }

    #[test]
    fn field_path_serializes_as_string() {
        let encoded = serde_json::to_string(&path("a[0].b")).expect("ser");
        assert_eq!(encoded, r#""a[0].b""#);
        let decoded: FieldPath = serde_json::from_str(&encoded).expect("de");
        assert_eq!(decoded, path("a[0].b"));
    }
}
