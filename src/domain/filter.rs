//! Filter/match engine.
//!
//! Evaluates a query (substring, fuzzy subsequence, regular expression,
//! or predicate callback) against every node, records per-node match
//! order and per-ancestor descendant-match counts, and supports two
//! display modes: `Dim` (all nodes still enumerate as rows, unmatched
//! ones are flagged for visual de-emphasis) and `Hide` (row traversal
//! skips nodes with no match and no matching descendants).
//!
//! Fuzzy matching treats the query as an ordered subsequence: the
//! characters must appear in order, not necessarily contiguously. The
//! query is compiled into a capturing regex so the position of every
//! matched character can be recovered for highlighting.

use regex::Regex;

use crate::error::TreeError;
use crate::io::loader::NodeStatus;
use crate::render::scheduler::ChangeType;
use crate::tree::{Node, NodeId, Tree};

/// How unmatched nodes are treated while a filter is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Unmatched rows stay enumerated but are flagged as dimmed.
    Dim,
    /// Unmatched rows (without matching descendants) are not
    /// enumerated at all.
    Hide,
}

/// Result of a predicate query for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Match,
    /// Match this node and let its entire subtree inherit the match.
    MatchBranch,
    NoMatch,
    /// Exclude this node *and its whole subtree* from matching.
    Skip,
}

/// A filter query.
///
/// String queries match the node title case-insensitively; `Fuzzy`
/// interprets the string as an ordered character subsequence.
pub enum FilterQuery {
    Substring(String),
    Fuzzy(String),
    Pattern(Regex),
    Predicate(Box<dyn FnMut(&Node) -> FilterVerdict>),
}

/// Options for [`Tree::filter_nodes`].
#[derive(Debug, Clone, Copy)]
pub struct FilterOptions {
    pub mode: FilterMode,
    /// A matched node's entire subtree inherits the match.
    pub match_branch: bool,
    /// Only match end nodes (branches can still match via children).
    pub leaves_only: bool,
    /// Expand ancestors of real (non-inherited) matches.
    pub auto_expand: bool,
    /// Record matched title byte ranges for highlighting.
    pub highlight: bool,
    /// Install a "no data" status node when hide-mode yields nothing.
    pub no_data: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        FilterOptions {
            mode: FilterMode::Hide,
            match_branch: false,
            leaves_only: false,
            auto_expand: false,
            highlight: true,
            no_data: true,
        }
    }
}

/// Compiled query plus the original for re-application.
struct Matcher {
    query: FilterQuery,
    re: Option<Regex>,
    fuzzy: bool,
}

impl Matcher {
    fn compile(query: FilterQuery) -> Result<Self, TreeError> {
        let (re, fuzzy) = match &query {
            FilterQuery::Substring(s) => {
                let re = Regex::new(&format!("(?i){}", regex::escape(s)))
                    .map_err(|e| TreeError::Parse(e.to_string()))?;
                (Some(re), false)
            }
            FilterQuery::Fuzzy(s) => {
                // Each query character becomes a capture group of the
                // non-matching run before it, so the matched character
                // positions can be recovered from the group ends.
                let pattern: String = s.chars().fold("(?i)".to_string(), |acc, c| {
                    let esc = regex::escape(&c.to_string());
                    format!("{acc}([^{esc}]*){esc}")
                });
                let re =
                    Regex::new(&pattern).map_err(|e| TreeError::Parse(e.to_string()))?;
                (Some(re), true)
            }
            FilterQuery::Pattern(re) => (Some(re.clone()), false),
            FilterQuery::Predicate(_) => (None, false),
        };
        Ok(Matcher { query, re, fuzzy })
    }

    /// Evaluates one node.
    ///
    /// # Returns
    /// The verdict plus matched title byte ranges (for highlighting).
    fn eval(&mut self, node: &Node) -> (FilterVerdict, Vec<(usize, usize)>) {
        match &mut self.query {
            FilterQuery::Predicate(pred) => (pred(node), Vec::new()),
            _ => {
                let Some(re) = &self.re else {
                    return (FilterVerdict::NoMatch, Vec::new());
                };
                let title = node.title.as_str();
                if self.fuzzy {
                    match re.captures(title) {
                        Some(caps) => {
                            let mut spans = Vec::new();
                            for i in 1..caps.len() {
                                if let Some(gap) = caps.get(i) {
                                    let at = gap.end();
                                    let len = title[at..]
                                        .chars()
                                        .next()
                                        .map(char::len_utf8)
                                        .unwrap_or(0);
                                    spans.push((at, at + len));
                                }
                            }
                            (FilterVerdict::Match, spans)
                        }
                        None => (FilterVerdict::NoMatch, Vec::new()),
                    }
                } else {
                    let spans: Vec<(usize, usize)> =
                        re.find_iter(title).map(|m| (m.start(), m.end())).collect();
                    if spans.is_empty() {
                        (FilterVerdict::NoMatch, Vec::new())
                    } else {
                        (FilterVerdict::Match, spans)
                    }
                }
            }
        }
    }
}

impl Tree {
    /// Applies a filter query, dimming or hiding unmatched nodes.
    ///
    /// An empty string query is handled as [`Tree::clear_filter`].
    ///
    /// # Returns
    /// Number of matched nodes (branch-inherited matches included).
    pub fn filter_nodes(
        &mut self,
        query: FilterQuery,
        opts: FilterOptions,
    ) -> Result<usize, TreeError> {
        if let FilterQuery::Substring(s) | FilterQuery::Fuzzy(s) = &query {
            if s.is_empty() {
                tracing::info!("empty filter query handled as clear_filter()");
                self.clear_filter();
                return Ok(0);
            }
        }
        let matcher = Matcher::compile(query)?;
        self.run_without_update(move |tree| tree.apply_filter(matcher, opts))
    }

    /// Like [`Tree::filter_nodes`], but whole branches match: every
    /// descendant of a matched node inherits the match.
    pub fn filter_branches(
        &mut self,
        query: FilterQuery,
        opts: FilterOptions,
    ) -> Result<usize, TreeError> {
        self.filter_nodes(
            query,
            FilterOptions {
                match_branch: true,
                ..opts
            },
        )
    }

    /// Re-applies the last filter (after tree mutations).
    pub fn update_filter(&mut self) -> Result<usize, TreeError> {
        match self.last_filter.take() {
            Some((query, opts)) if self.filter_mode.is_some() => self.filter_nodes(query, opts),
            _ => {
                tracing::warn!("update_filter(): no filter active");
                Ok(0)
            }
        }
    }

    /// True while a filter is applied.
    pub fn is_filter_active(&self) -> bool {
        self.filter_mode.is_some()
    }

    /// Resets the filter: every node's match state returns to the
    /// unset/zero state and row enumeration to the unfiltered set.
    pub fn clear_filter(&mut self) {
        self.set_status(self.root_id(), NodeStatus::Ok, None);
        let all = self.find_all(self.root_id(), |_| true);
        for id in &all {
            let node = self.node_mut(*id);
            node.match_rank = None;
            node.match_spans.clear();
            node.sub_match_count = 0;
            if node.filter_auto_expanded {
                node.filter_auto_expanded = false;
                if node.expanded {
                    node.expanded = false;
                }
            }
        }
        let root = self.root_id();
        self.node_mut(root).sub_match_count = 0;
        self.filter_mode = None;
        self.last_filter = None;
        self.match_seq = 0;
        self.note_change(ChangeType::Structure, None);
    }

    fn apply_filter(
        &mut self,
        mut matcher: Matcher,
        opts: FilterOptions,
    ) -> Result<usize, TreeError> {
        self.filter_mode = Some(opts.mode);

        // Reset the previous run (also removes a stale noData node).
        self.set_status(self.root_id(), NodeStatus::Ok, None);
        let order = self.find_all(self.root_id(), |_| true);
        for id in &order {
            let node = self.node_mut(*id);
            node.match_rank = None;
            node.match_spans.clear();
            node.sub_match_count = 0;
        }
        let root = self.root_id();
        self.node_mut(root).sub_match_count = 0;
        self.match_seq = 0;

        let mut count = 0usize;
        let mut skipped: std::collections::HashSet<NodeId> = std::collections::HashSet::new();
        let mut inherit: std::collections::HashSet<NodeId> = std::collections::HashSet::new();

        for &id in &order {
            let node = self.node_ref(id);
            if node.is_status_node() {
                continue;
            }
            let parent = node.parent_id();
            if let Some(p) = parent {
                if skipped.contains(&p) {
                    skipped.insert(id);
                    continue;
                }
            }
            if opts.leaves_only && node.loaded_child_count() > 0 {
                continue;
            }

            let (verdict, spans) = matcher.eval(node);
            if verdict == FilterVerdict::Skip {
                skipped.insert(id);
                continue;
            }
            let mut matched =
                verdict == FilterVerdict::Match || verdict == FilterVerdict::MatchBranch;
            let mut matched_by_branch = false;
            if !matched {
                if let Some(p) = parent {
                    if inherit.contains(&p) {
                        matched = true;
                        matched_by_branch = true;
                    }
                }
            }
            if !matched {
                continue;
            }

            count += 1;
            self.match_seq += 1;
            let rank = self.match_seq;
            {
                let node = self.node_mut(id);
                node.match_rank = Some(rank);
                if opts.highlight {
                    node.match_spans = spans;
                }
            }
            if verdict == FilterVerdict::MatchBranch || opts.match_branch || matched_by_branch {
                inherit.insert(id);
            }

            // Bump every ancestor's descendant-match counter and
            // optionally expand the path to a real match.
            let ancestors = self.ancestor_chain(id);
            for pid in ancestors {
                self.node_mut(pid).sub_match_count += 1;
                if opts.auto_expand && !matched_by_branch && pid != root {
                    let p = self.node_mut(pid);
                    if !p.expanded {
                        p.expanded = true;
                        p.filter_auto_expanded = true;
                    }
                }
            }
        }

        if count == 0 && opts.no_data && opts.mode == FilterMode::Hide {
            self.set_status(root, NodeStatus::NoData, None);
        }
        tracing::info!(count, "filter applied");
        self.last_filter = Some((matcher.query, opts));
        Ok(count)
    }

    /// Ancestor ids bottom-up, including the invisible root.
    fn ancestor_chain(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut p = self.node_ref(id).parent_id();
        while let Some(pid) = p {
            out.push(pid);
            p = self.node_ref(pid).parent_id();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::wire::NodeData;
    use crate::tree::InsertMode;

    fn data(title: &str) -> NodeData {
        NodeData {
            title: title.to_string(),
            ..NodeData::default()
        }
    }

    /// root -> fruit(apple, banana), tools(hammer, saw)
    fn build() -> Tree {
        let mut tree = Tree::new();
        let root = tree.root_id();
        let fruit = tree.add_node(root, &data("fruit"), InsertMode::Child).unwrap();
        tree.add_node(fruit, &data("apple"), InsertMode::Child).unwrap();
        tree.add_node(fruit, &data("banana"), InsertMode::Child).unwrap();
        let tools = tree.add_node(root, &data("tools"), InsertMode::Child).unwrap();
        tree.add_node(tools, &data("hammer"), InsertMode::Child).unwrap();
        tree.add_node(tools, &data("saw"), InsertMode::Child).unwrap();
        tree.set_expanded(fruit, true).unwrap();
        tree.set_expanded(tools, true).unwrap();
        tree
    }

    fn by_title(tree: &Tree, title: &str) -> crate::tree::NodeId {
        tree.find_first(tree.root_id(), |n| n.title == title).unwrap()
    }

    #[test]
    fn test_substring_match_ranks_and_counts() {
        let mut tree = build();
        let count = tree
            .filter_nodes(
                FilterQuery::Substring("a".to_string()),
                FilterOptions::default(),
            )
            .unwrap();
        // apple, banana, hammer, saw contain 'a'.
        assert_eq!(count, 4);
        let apple = by_title(&tree, "apple");
        let banana = by_title(&tree, "banana");
        assert_eq!(tree.node(apple).unwrap().match_rank(), Some(1));
        assert_eq!(tree.node(banana).unwrap().match_rank(), Some(2));
        let fruit = by_title(&tree, "fruit");
        assert_eq!(tree.node(fruit).unwrap().sub_match_count(), 2);
        assert_eq!(tree.node(fruit).unwrap().match_rank(), None);
    }

    #[test]
    fn test_hide_mode_prunes_rows() {
        let mut tree = build();
        tree.filter_nodes(
            FilterQuery::Substring("apple".to_string()),
            FilterOptions::default(),
        )
        .unwrap();
        let titles: Vec<String> = tree
            .row_order()
            .iter()
            .map(|&id| tree.node(id).unwrap().title.clone())
            .collect();
        // "fruit" stays because a descendant matches; "tools" subtree
        // disappears entirely.
        assert_eq!(titles, ["fruit", "apple"]);
    }

    #[test]
    fn test_dim_mode_keeps_rows() {
        let mut tree = build();
        tree.filter_nodes(
            FilterQuery::Substring("apple".to_string()),
            FilterOptions {
                mode: FilterMode::Dim,
                ..FilterOptions::default()
            },
        )
        .unwrap();
        assert_eq!(tree.row_order().len(), 6);
    }

    #[test]
    fn test_fuzzy_subsequence_with_spans() {
        let mut tree = build();
        let count = tree
            .filter_nodes(
                FilterQuery::Fuzzy("hmr".to_string()),
                FilterOptions::default(),
            )
            .unwrap();
        assert_eq!(count, 1);
        let hammer = by_title(&tree, "hammer");
        let spans = tree.node(hammer).unwrap().match_spans().to_vec();
        // "hammer": h at 0, first m at 2, r at 5.
        assert_eq!(spans, vec![(0, 1), (2, 3), (5, 6)]);
    }

    #[test]
    fn test_substring_records_highlight_spans() {
        let mut tree = build();
        tree.filter_nodes(
            FilterQuery::Substring("an".to_string()),
            FilterOptions::default(),
        )
        .unwrap();
        let banana = by_title(&tree, "banana");
        assert_eq!(
            tree.node(banana).unwrap().match_spans().to_vec(),
            vec![(1, 3), (3, 5)]
        );
    }

    #[test]
    fn test_predicate_skip_excludes_subtree() {
        let mut tree = build();
        let count = tree
            .filter_nodes(
                FilterQuery::Predicate(Box::new(|n: &Node| {
                    if n.title == "tools" {
                        FilterVerdict::Skip
                    } else if n.title.contains('a') {
                        FilterVerdict::Match
                    } else {
                        FilterVerdict::NoMatch
                    }
                })),
                FilterOptions::default(),
            )
            .unwrap();
        // hammer and saw are inside the skipped subtree.
        assert_eq!(count, 2);
    }

    #[test]
    fn test_match_branch_inherits() {
        let mut tree = build();
        let count = tree
            .filter_branches(
                FilterQuery::Substring("fruit".to_string()),
                FilterOptions::default(),
            )
            .unwrap();
        // fruit itself plus both children by inheritance.
        assert_eq!(count, 3);
        let apple = by_title(&tree, "apple");
        assert!(tree.node(apple).unwrap().match_rank().is_some());
    }

    #[test]
    fn test_no_data_status_node_on_zero_hits() {
        let mut tree = build();
        tree.filter_nodes(
            FilterQuery::Substring("zzz".to_string()),
            FilterOptions::default(),
        )
        .unwrap();
        let rows = tree.row_order();
        assert_eq!(rows.len(), 1);
        let n = tree.node(rows[0]).unwrap();
        assert_eq!(
            n.status_node_type(),
            Some(crate::tree::StatusNodeType::NoData)
        );
    }

    #[test]
    fn test_clear_filter_round_trip() {
        let mut tree = build();
        let before = tree.row_order();
        tree.filter_nodes(
            FilterQuery::Substring("apple".to_string()),
            FilterOptions::default(),
        )
        .unwrap();
        tree.clear_filter();
        assert!(!tree.is_filter_active());
        assert_eq!(tree.row_order(), before);
        tree.visit(&mut |n: &Node| {
            assert_eq!(n.match_rank(), None);
            assert_eq!(n.sub_match_count(), 0);
            assert!(n.match_spans().is_empty());
            crate::domain::traversal::Visit::Continue
        });
    }

    #[test]
    fn test_auto_expand_marks_and_clears() {
        let mut tree = build();
        let fruit = by_title(&tree, "fruit");
        tree.set_expanded(fruit, false).unwrap();
        tree.filter_nodes(
            FilterQuery::Substring("apple".to_string()),
            FilterOptions {
                auto_expand: true,
                ..FilterOptions::default()
            },
        )
        .unwrap();
        assert!(tree.node(fruit).unwrap().expanded);
        tree.clear_filter();
        assert!(!tree.node(fruit).unwrap().expanded);
    }
}
