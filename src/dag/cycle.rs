//! Cycle detection over a run's dependency relation.
//!
//! Depth-first search with white/gray/black colouring. Colours live in a
//! side table indexed by test, so the run itself is never mutated and the
//! same run can be checked from several places at once.

use crate::dag::builder::{TestIndex, TestRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not visited yet
    White,
    /// On the current DFS path
    Gray,
    /// Fully explored
    Black,
}

/// Returns true if the run's dependency graph contains a cycle.
pub fn detect_cycle(run: &TestRun) -> bool {
    find_cycle(run).is_some()
}

/// Find a dependency cycle, if any.
///
/// The returned chain starts and ends with the same test and follows
/// dependency edges, e.g. `["a", "b", "a"]` when `a` depends on `b` and `b`
/// on `a`. A self-dependency yields `["a", "a"]`. Roots are tried in
/// declared order and the search stops at the first cycle found.
pub fn find_cycle(run: &TestRun) -> Option<Vec<String>> {
    let mut colors = vec![Color::White; run.len()];

    for root in 0..run.len() {
        if colors[root] != Color::White {
            continue;
        }
        if let Some(path) = visit(run, root, &mut colors) {
            return Some(
                path.into_iter()
                    .filter_map(|i| run.node(i).map(|n| n.name.clone()))
                    .collect(),
            );
        }
    }

    None
}

/// Iterative DFS from `root`. Each stack frame is a node and the position of
/// the next dependency to explore.
fn visit(run: &TestRun, root: TestIndex, colors: &mut [Color]) -> Option<Vec<TestIndex>> {
    let mut stack: Vec<(TestIndex, usize)> = vec![(root, 0)];
    colors[root] = Color::Gray;

    while let Some(frame) = stack.last_mut() {
        let (node, next) = *frame;
        let deps = run.node(node).map_or(&[][..], |n| n.dependencies.as_slice());

        if let Some(&dep) = deps.get(next) {
            frame.1 += 1;
            match colors[dep] {
                Color::White => {
                    colors[dep] = Color::Gray;
                    stack.push((dep, 0));
                }
                Color::Gray => {
                    let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut chain: Vec<TestIndex> =
                        stack[start..].iter().map(|&(n, _)| n).collect();
                    chain.push(dep);
                    return Some(chain);
                }
                Color::Black => {}
            }
        } else {
            colors[node] = Color::Black;
            stack.pop();
        }
    }

    None
}
