//! Reply hierarchy reconstruction.

use std::collections::{HashMap, HashSet};

use crate::message::{ChatMessage, sort_chronologically};

/// Root messages plus a parent id -> children index.
#[derive(Debug, Clone, Default)]
pub struct ThreadTree {
    roots: Vec<ChatMessage>,
    children: HashMap<String, Vec<ChatMessage>>,
}

impl ThreadTree {
    /// Partition a flat channel listing.
    ///
    /// Roots keep their input order. Every reply lands under its stated
    /// parent id, even when that parent is not part of the input; each child
    /// list is sorted oldest first, keeping input order on equal timestamps.
    pub fn build(messages: Vec<ChatMessage>) -> Self {
        let mut roots = Vec::new();
        let mut children: HashMap<String, Vec<ChatMessage>> = HashMap::new();

        for msg in messages {
            match msg.reply_to_id.clone() {
                Some(parent) => children.entry(parent).or_default().push(msg),
                None => roots.push(msg),
            }
        }
        for replies in children.values_mut() {
            sort_chronologically(replies);
        }

        Self { roots, children }
    }

    pub fn roots(&self) -> &[ChatMessage] {
        &self.roots
    }

    /// Direct children of `id`, oldest first.
    pub fn children_of(&self, id: &str) -> &[ChatMessage] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of messages in the tree.
    pub fn len(&self) -> usize {
        self.roots.len() + self.children.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parent ids referenced by replies but absent from the input, sorted.
    ///
    /// Their replies are kept in the index but never reached from a root.
    pub fn orphans(&self) -> Vec<&str> {
        let known: HashSet<&str> = self
            .roots
            .iter()
            .chain(self.children.values().flatten())
            .map(|m| m.id.as_str())
            .collect();
        let mut orphans: Vec<&str> = self
            .children
            .keys()
            .map(String::as_str)
            .filter(|parent| !known.contains(parent))
            .collect();
        orphans.sort_unstable();
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::message_record;
    use serde_json::Value;

    fn tree(records: &[Value]) -> ThreadTree {
        ThreadTree::build(ChatMessage::from_values(records))
    }

    fn ids(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_single_thread() {
        let tree = tree(&[
            message_record("1", None, "2024-01-01T10:00:00Z", "Ann", "Hello"),
            message_record("2", Some("1"), "2024-01-01T11:00:00Z", "Bo", "Hey"),
        ]);
        assert_eq!(ids(tree.roots()), vec!["1"]);
        assert_eq!(ids(tree.children_of("1")), vec!["2"]);
        assert!(tree.children_of("2").is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_roots_keep_input_order() {
        let tree = tree(&[
            message_record("b", None, "2024-01-02T10:00:00Z", "Ann", ""),
            message_record("a", None, "2024-01-01T10:00:00Z", "Ann", ""),
        ]);
        assert_eq!(ids(tree.roots()), vec!["b", "a"]);
    }

    #[test]
    fn test_children_sorted_and_stable() {
        let tree = tree(&[
            message_record("1", None, "2024-01-01T10:00:00Z", "Ann", ""),
            message_record("late", Some("1"), "2024-01-01T13:00:00Z", "Bo", ""),
            message_record("tie-1", Some("1"), "2024-01-01T12:00:00Z", "Bo", ""),
            message_record("tie-2", Some("1"), "2024-01-01T12:00:00Z", "Cy", ""),
            message_record("early", Some("1"), "2024-01-01T11:00:00Z", "Cy", ""),
        ]);
        assert_eq!(
            ids(tree.children_of("1")),
            vec!["early", "tie-1", "tie-2", "late"]
        );
    }

    #[test]
    fn test_nested_replies() {
        let tree = tree(&[
            message_record("1", None, "2024-01-01T10:00:00Z", "Ann", ""),
            message_record("2", Some("1"), "2024-01-01T11:00:00Z", "Bo", ""),
            message_record("3", Some("2"), "2024-01-01T12:00:00Z", "Cy", ""),
        ]);
        assert_eq!(ids(tree.children_of("1")), vec!["2"]);
        assert_eq!(ids(tree.children_of("2")), vec!["3"]);
        assert!(tree.orphans().is_empty());
    }

    #[test]
    fn test_partition_is_complete() {
        let records = vec![
            message_record("1", None, "2024-01-01T10:00:00Z", "Ann", ""),
            message_record("2", Some("1"), "2024-01-01T11:00:00Z", "Bo", ""),
            message_record("3", Some("missing"), "2024-01-01T12:00:00Z", "Cy", ""),
            message_record("4", None, "2024-01-01T13:00:00Z", "Di", ""),
            message_record("5", Some("2"), "2024-01-01T14:00:00Z", "Ed", ""),
            message_record("6", Some("1"), "2024-01-01T09:00:00Z", "Fi", ""),
        ];
        let tree = tree(&records);

        let mut seen: Vec<&str> = ids(tree.roots());
        for parent in ["1", "2", "3", "4", "5", "6", "missing"] {
            seen.extend(ids(tree.children_of(parent)));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec!["1", "2", "3", "4", "5", "6"]);
        assert_eq!(tree.len(), records.len());
    }

    #[test]
    fn test_orphans_are_kept() {
        let tree = tree(&[
            message_record("1", None, "2024-01-01T10:00:00Z", "Ann", ""),
            message_record("2", Some("gone"), "2024-01-01T11:00:00Z", "Bo", ""),
        ]);
        assert_eq!(ids(tree.children_of("gone")), vec!["2"]);
        assert_eq!(tree.orphans(), vec!["gone"]);
    }

    #[test]
    fn test_orphans_in_large_channel() {
        let mut records = Vec::new();
        for i in 0..5_000 {
            let root = format!("root-{i}");
            records.push(message_record(&root, None, "2024-01-01T10:00:00Z", "Ann", ""));
            records.push(message_record(
                &format!("reply-{i}"),
                Some(root.as_str()),
                "2024-01-01T11:00:00Z",
                "Bo",
                "",
            ));
        }
        records.push(message_record("nested", Some("reply-7"), "2024-01-01T12:00:00Z", "Cy", ""));
        records.push(message_record("lost-a", Some("gone-b"), "2024-01-01T12:00:00Z", "Cy", ""));
        records.push(message_record("lost-b", Some("gone-a"), "2024-01-01T12:00:00Z", "Cy", ""));

        let tree = tree(&records);
        assert_eq!(tree.len(), records.len());
        assert_eq!(tree.orphans(), vec!["gone-a", "gone-b"]);
    }

    #[test]
    fn test_empty_input() {
        let tree = ThreadTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
        assert!(tree.orphans().is_empty());
    }
}
