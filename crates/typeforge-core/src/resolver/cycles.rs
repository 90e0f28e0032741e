//! Detection of types that contain themselves by value.
//!
//! Runs Tarjan's strongly connected components algorithm over value edges
//! only. Any component with more than one node, or a node with an edge to
//! itself, is a layout that cannot exist in memory.

use smallvec::SmallVec;

use crate::model::{TypeId, TypeInstance};

const UNVISITED: usize = usize::MAX;

/// Every value cycle in the arena, each as a list of its members.
pub(crate) fn value_cycles(instances: &[TypeInstance]) -> Vec<Vec<TypeId>>
{
    let edges: Vec<SmallVec<[TypeId; 8]>> = instances.iter().map(TypeInstance::value_dependencies).collect();
    let count = edges.len();

    let mut index = vec![UNVISITED; count];
    let mut low = vec![0usize; count];
    let mut on_stack = vec![false; count];
    let mut stack: Vec<usize> = Vec::new();
    let mut next = 0usize;
    let mut cycles = Vec::new();

    for start in 0..count {
        if index[start] != UNVISITED {
            continue;
        }
        // (node, next edge to visit)
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];
        index[start] = next;
        low[start] = next;
        next += 1;
        stack.push(start);
        on_stack[start] = true;

        while let Some(frame) = frames.last_mut() {
            let node = frame.0;
            if frame.1 < edges[node].len() {
                let successor = edges[node][frame.1].index();
                frame.1 += 1;
                if index[successor] == UNVISITED {
                    index[successor] = next;
                    low[successor] = next;
                    next += 1;
                    stack.push(successor);
                    on_stack[successor] = true;
                    frames.push((successor, 0));
                } else if on_stack[successor] {
                    low[node] = low[node].min(index[successor]);
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                low[parent.0] = low[parent.0].min(low[node]);
            }
            if low[node] != index[node] {
                continue;
            }
            let mut component = Vec::new();
            while let Some(member) = stack.pop() {
                on_stack[member] = false;
                component.push(TypeId::from_index(member));
                if member == node {
                    break;
                }
            }
            let self_loop = edges[node].iter().any(|edge| edge.index() == node);
            if component.len() > 1 || self_loop {
                component.sort();
                cycles.push(component);
            }
        }
    }
    cycles
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::model::{AggregateKind, Field, PrimitiveKind, UserType};

    fn aggregate(name: &str, fields: &[usize]) -> TypeInstance
    {
        let mut user = UserType::shell(name.into(), Vec::new(), AggregateKind::Struct, 8);
        user.fields = fields
            .iter()
            .map(|ty| Field {
                name: format!("f{ty}"),
                ty: TypeId::from_index(*ty),
                byte_offset: 0,
                bit_field: None,
            })
            .collect();
        TypeInstance::Aggregate(user)
    }

    #[test]
    fn test_pointer_cycle_is_legal()
    {
        let instances = vec![
            aggregate("Node", &[1]),
            TypeInstance::Pointer {
                pointee: TypeId::from_index(0),
            },
        ];
        assert!(value_cycles(&instances).is_empty());
    }

    #[test]
    fn test_self_containment()
    {
        let instances = vec![aggregate("Bad", &[0])];
        assert_eq!(value_cycles(&instances), vec![vec![TypeId::from_index(0)]]);
    }

    #[test]
    fn test_mutual_containment_through_array()
    {
        let instances = vec![
            aggregate("A", &[1]),
            aggregate("B", &[2]),
            TypeInstance::Array {
                element: TypeId::from_index(0),
                length: Some(2),
            },
            TypeInstance::Primitive(PrimitiveKind::I32),
            aggregate("Ok", &[3]),
        ];
        let cycles = value_cycles(&instances);
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0],
            vec![TypeId::from_index(0), TypeId::from_index(1), TypeId::from_index(2)]
        );
    }
}
