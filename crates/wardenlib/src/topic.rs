use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TopicPatternError {
    #[error("`#` is only legal as the final segment of a topic pattern, got `{0}`")]
    HashNotFinal(String),
    #[error("topic pattern must not be empty")]
    Empty,
}

fn validate_pattern(pattern: &str) -> Result<(), TopicPatternError> {
    if pattern.is_empty() {
        return Err(TopicPatternError::Empty);
    }
    let segments: Vec<&str> = pattern.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "#" && i != segments.len() - 1 {
            return Err(TopicPatternError::HashNotFinal(pattern.to_string()));
        }
    }
    Ok(())
}

#[derive(Default, Debug, PartialEq)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    plus_child: Option<Box<TrieNode>>,
    /// Route indices whose pattern ends exactly at this node.
    end_route_indices: Vec<usize>,
    /// Route indices whose pattern places `#` at this node.
    hash_route_indices: Vec<usize>,
}

/// Resolves a concrete topic to the ordered list of matching route indices.
///
/// Built once at configuration load as a segment trie (one node per `/`
/// delimited level) instead of a per-route linear scan, so a large route
/// table doesn't cost a full scan per incoming message. Matches are
/// returned in configuration-declaration order.
#[derive(Debug, PartialEq)]
pub struct TopicMatcher {
    root: TrieNode,
    pattern_count: usize,
}

impl TopicMatcher {
    pub fn build<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Result<Self, TopicPatternError> {
        let mut root = TrieNode::default();
        let mut pattern_count = 0;

        for (index, pattern) in patterns.into_iter().enumerate() {
            let pattern = pattern.as_ref();
            validate_pattern(pattern)?;

            let mut node = &mut root;
            let segments: Vec<&str> = pattern.split('/').collect();

            for (seg_index, segment) in segments.iter().enumerate() {
                if *segment == "#" {
                    node.hash_route_indices.push(index);
                    break;
                } else if *segment == "+" {
                    node = node.plus_child.get_or_insert_with(Box::default);
                } else {
                    node = node
                        .children
                        .entry((*segment).to_string())
                        .or_default();
                }

                if seg_index == segments.len() - 1 {
                    node.end_route_indices.push(index);
                }
            }

            pattern_count += 1;
        }

        Ok(Self {
            root,
            pattern_count,
        })
    }

    /// Returns the indices (into the original pattern list) of every
    /// pattern matching `topic`, in configuration-declaration order.
    /// Pure: calling this twice with the same topic yields the same result.
    pub fn matching_indices(&self, topic: &str) -> Vec<usize> {
        let segments: Vec<&str> = topic.split('/').collect();
        let mut hits = vec![false; self.pattern_count];

        Self::collect(&self.root, &segments, 0, &mut hits);

        hits.iter()
            .enumerate()
            .filter_map(|(index, hit)| hit.then_some(index))
            .collect()
    }

    fn collect(node: &TrieNode, segments: &[&str], position: usize, hits: &mut [bool]) {
        if position == segments.len() {
            for &index in &node.end_route_indices {
                hits[index] = true;
            }
            return;
        }

        // `#` requires one or more remaining levels; position < segments.len()
        // here, so there is at least one remaining level.
        for &index in &node.hash_route_indices {
            hits[index] = true;
        }

        let segment = segments[position];

        if let Some(child) = node.children.get(segment) {
            Self::collect(child, segments, position + 1, hits);
        }

        if let Some(plus_child) = &node.plus_child {
            Self::collect(plus_child, segments, position + 1, hits);
        }
    }
}

/// Captures the segments a `+`/`#` wildcard absorbed, in left-to-right
/// order, exposed to the transform pipeline as the `_topic` context value.
/// Returns an empty list if `pattern` does not match `topic` or carries no
/// wildcards.
pub fn captures(pattern: &str, topic: &str) -> Vec<String> {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let topic_segments: Vec<&str> = topic.split('/').collect();
    let mut captured = Vec::new();

    for (index, segment) in pattern_segments.iter().enumerate() {
        match *segment {
            "#" => {
                if index < topic_segments.len() {
                    captured.push(topic_segments[index..].join("/"));
                }
                return captured;
            }
            "+" => match topic_segments.get(index) {
                Some(value) => captured.push((*value).to_string()),
                None => return Vec::new(),
            },
            literal => {
                if topic_segments.get(index) != Some(&literal) {
                    return Vec::new();
                }
            }
        }
    }

    if topic_segments.len() != pattern_segments.len() {
        return Vec::new();
    }

    captured
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> TopicMatcher {
        TopicMatcher::build(patterns.iter().copied()).unwrap()
    }

    #[test]
    fn exact_match() {
        let m = matcher(&["the/topic"]);
        assert_eq!(vec![0], m.matching_indices("the/topic"));
        assert!(m.matching_indices("the/topik").is_empty());
        assert!(m.matching_indices("toolong/the/topic").is_empty());
        assert!(m.matching_indices("the/topic/toolong").is_empty());
    }

    #[test]
    fn single_level_wildcard() {
        let m = matcher(&["the/topic/+"]);
        assert_eq!(vec![0], m.matching_indices("the/topic/something"));
        assert_eq!(vec![0], m.matching_indices("the/topic/"));
        assert!(m.matching_indices("the/topic").is_empty());
        assert!(m.matching_indices("the/topic/a/b").is_empty());
    }

    #[test]
    fn two_single_level_wildcards() {
        let m = matcher(&["the/topic/+/is/+/longer"]);
        assert_eq!(
            vec![0],
            m.matching_indices("the/topic/something/is/alot/longer")
        );
        assert!(m
            .matching_indices("the/topic/something/is/alot/longeeee")
            .is_empty());
        assert_eq!(vec![0], m.matching_indices("the/topic//is//longer"));
        assert!(m.matching_indices("the/topic/is/longer").is_empty());
    }

    #[test]
    fn multi_level_wildcard_requires_at_least_one_level() {
        let m = matcher(&["the/topic/#"]);
        assert_eq!(vec![0], m.matching_indices("the/topic/something"));
        assert_eq!(
            vec![0],
            m.matching_indices("the/topic/something/is/alot/longer")
        );
        assert_eq!(vec![0], m.matching_indices("the/topic/"));
        assert!(m.matching_indices("the/topic").is_empty());
    }

    #[test]
    fn hash_must_be_final_segment() {
        let result = TopicMatcher::build(["a/#/b"]);
        assert_eq!(
            Err(TopicPatternError::HashNotFinal("a/#/b".to_string())),
            result
        );
    }

    #[test]
    fn declaration_order_is_preserved_among_ties() {
        let m = matcher(&["sensors/#", "sensors/+/temp", "sensors/kitchen/temp"]);
        assert_eq!(vec![0, 1, 2], m.matching_indices("sensors/kitchen/temp"));
    }

    #[test]
    fn matching_is_pure() {
        let m = matcher(&["a/+/c", "a/b/#"]);
        let first = m.matching_indices("a/b/c");
        let second = m.matching_indices("a/b/c");
        assert_eq!(first, second);
    }

    #[test]
    fn case_sensitive() {
        let m = matcher(&["Topic/A"]);
        assert!(m.matching_indices("topic/a").is_empty());
        assert_eq!(vec![0], m.matching_indices("Topic/A"));
    }

    #[test]
    fn captures_single_level_wildcards_in_order() {
        assert_eq!(
            vec!["kitchen".to_string(), "temp".to_string()],
            captures("sensors/+/+", "sensors/kitchen/temp")
        );
    }

    #[test]
    fn captures_hash_as_one_joined_segment() {
        assert_eq!(
            vec!["a/b/c".to_string()],
            captures("sensors/#", "sensors/a/b/c")
        );
    }

    #[test]
    fn captures_empty_for_no_match() {
        assert!(captures("sensors/+/temp", "sensors/kitchen/humidity").is_empty());
    }
}
