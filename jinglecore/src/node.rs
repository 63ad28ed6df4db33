use crate::attrs::AttrParser;

/// Element attributes in insertion order. Keys are unique.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attrs(pub Vec<(String, String)>);

impl Attrs {
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Insert a key-value pair. If the key already exists, update the value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(pos) = self.0.iter().position(|(k, _)| *k == key) {
            self.0[pos].1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    String(String),
    Nodes(Vec<Node>),
}

/// One element of a stanza tree.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub content: Option<NodeContent>,
}

impl Node {
    pub fn children(&self) -> Option<&[Node]> {
        match &self.content {
            Some(NodeContent::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(NodeContent::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn attrs(&self) -> AttrParser<'_> {
        AttrParser::new(self)
    }

    /// The `xmlns` attribute, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.attrs.get("xmlns")
    }

    pub fn get_optional_child_by_tag<'a>(&'a self, tags: &[&str]) -> Option<&'a Node> {
        let mut current_node = self;
        for &tag in tags {
            current_node = current_node
                .children()?
                .iter()
                .find(|c| c.tag == tag)?;
        }
        Some(current_node)
    }

    pub fn get_children_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children()
            .into_iter()
            .flatten()
            .filter(move |c| c.tag == tag)
    }

    pub fn get_optional_child(&self, tag: &str) -> Option<&Node> {
        self.children()
            .and_then(|nodes| nodes.iter().find(|node| node.tag == tag))
    }

    pub fn get_optional_child_mut(&mut self, tag: &str) -> Option<&mut Node> {
        match &mut self.content {
            Some(NodeContent::Nodes(nodes)) => nodes.iter_mut().find(|n| n.tag == tag),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;

    #[test]
    fn test_child_lookup_by_path() {
        let node = NodeBuilder::new("iq")
            .children([NodeBuilder::new("jingle")
                .children([NodeBuilder::new("reason")
                    .children([NodeBuilder::new("busy").build()])
                    .build()])
                .build()])
            .build();

        assert!(
            node.get_optional_child_by_tag(&["jingle", "reason", "busy"])
                .is_some()
        );
        assert!(node.get_optional_child_by_tag(&["jingle", "content"]).is_none());
    }

    #[test]
    fn test_text_and_children_are_exclusive() {
        let node = NodeBuilder::new("text").string_content("Oops!").build();
        assert_eq!(node.text(), Some("Oops!"));
        assert!(node.children().is_none());
        assert!(node.get_optional_child("busy").is_none());
    }

    #[test]
    fn test_attrs_insert_overwrites() {
        let mut attrs = Attrs::new();
        attrs.insert("id", "1");
        attrs.insert("id", "2");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("id"), Some("2"));
        assert!(attrs.contains_key("id"));
        assert!(!attrs.is_empty());
    }
}
