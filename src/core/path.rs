//! Response paths used to locate field errors

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One element of a response path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A response key (field name or alias)
    Key(Arc<str>),
    /// A position inside a list
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Owned path from the response root to a field, e.g. `["posts", 0, "author"]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResponsePath(Vec<PathSegment>);

impl ResponsePath {
    /// Build a path made only of response keys
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keys.into_iter()
                .map(|key| PathSegment::Key(Arc::from(key.as_ref())))
                .collect(),
        )
    }

    /// Append a response key
    pub fn key(mut self, key: &str) -> Self {
        self.0.push(PathSegment::Key(Arc::from(key)));
        self
    }

    /// Append a list index
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Borrowed path node kept on the stack while a plan runs
///
/// Invocation never allocates a path unless a field actually fails; the
/// owned [`ResponsePath`] is materialized from this chain on demand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Path<'a> {
    prev: Option<&'a Path<'a>>,
    segment: Segment<'a>,
}

#[derive(Debug, Clone, Copy)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> Path<'a> {
    pub(crate) fn key(prev: Option<&'a Path<'a>>, key: &'a str) -> Self {
        Self {
            prev,
            segment: Segment::Key(key),
        }
    }

    pub(crate) fn index(prev: &'a Path<'a>, index: usize) -> Self {
        Self {
            prev: Some(prev),
            segment: Segment::Index(index),
        }
    }

    pub(crate) fn to_response_path(&self) -> ResponsePath {
        let mut segments = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            segments.push(match current.segment {
                Segment::Key(key) => PathSegment::Key(Arc::from(key)),
                Segment::Index(index) => PathSegment::Index(index),
            });
            node = current.prev;
        }
        segments.reverse();
        ResponsePath(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_borrowed_chain_materializes_in_order() {
        let posts = Path::key(None, "posts");
        let first = Path::index(&posts, 0);
        let author = Path::key(Some(&first), "author");

        let path = author.to_response_path();
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_string(), "posts.0.author");
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            json!(["posts", 0, "author"])
        );
    }

    #[test]
    fn test_builder_methods() {
        let path = ResponsePath::default().key("a").index(2).key("b");
        assert_eq!(path, ResponsePath::from_keys(["a"]).index(2).key("b"));
        assert!(!path.is_empty());
        assert!(ResponsePath::default().is_empty());
    }
}
