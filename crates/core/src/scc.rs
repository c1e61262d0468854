//! Strongly connected components, emitted dependencies first.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use indexmap::IndexMap;

/// Tarjan's algorithm over `graph`, driven by an explicit work stack.
///
/// Components come out in reverse topological order: a component only has
/// edges into itself or into components emitted before it. Roots are taken
/// in key order and successors in list order, so equal input gives equal
/// output. Within a component, members are listed in the order they leave
/// the Tarjan stack. Successors that are not keys count as nodes with no
/// outgoing edges.
pub fn strongly_connected_components<N>(graph: &IndexMap<N, Vec<N>>) -> Vec<Vec<N>>
where
    N: Copy + Eq + Hash,
{
    let successors = move |node: N| graph.get(&node).map(Vec::as_slice).unwrap_or_default();

    let mut next_index = 0usize;
    // node -> (index, lowlink)
    let mut marks: HashMap<N, (usize, usize)> = HashMap::new();
    let mut on_stack: HashSet<N> = HashSet::new();
    let mut stack: Vec<N> = Vec::new();
    let mut components: Vec<Vec<N>> = Vec::new();

    for &root in graph.keys() {
        if marks.contains_key(&root) {
            continue;
        }
        marks.insert(root, (next_index, next_index));
        next_index += 1;
        stack.push(root);
        on_stack.insert(root);
        // (node, position of the next successor to visit)
        let mut work: Vec<(N, usize)> = vec![(root, 0)];

        while let Some(frame) = work.last_mut() {
            let node = frame.0;
            let succ = successors(node);
            if frame.1 < succ.len() {
                let next = succ[frame.1];
                frame.1 += 1;
                match marks.get(&next).copied() {
                    None => {
                        marks.insert(next, (next_index, next_index));
                        next_index += 1;
                        stack.push(next);
                        on_stack.insert(next);
                        work.push((next, 0));
                    }
                    Some((next_idx, _)) if on_stack.contains(&next) => {
                        if let Some(mark) = marks.get_mut(&node) {
                            mark.1 = mark.1.min(next_idx);
                        }
                    }
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            let (index, low) = marks[&node];
            if index == low {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
            if let Some(&(parent, _)) = work.last() {
                if let Some(mark) = marks.get_mut(&parent) {
                    mark.1 = mark.1.min(low);
                }
            }
        }
    }
    components
}
