use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};
use crate::layer::{Layer, LayerData, LayerKind, LayerMetadata, PropertyTable};

/// Sparse 0/1 adjacency over point observations: an edge `(i, j)` means
/// point `i` is a parent of point `j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseAdjacency {
    len: usize,
    edges: Vec<(usize, usize)>,
}

impl SparseAdjacency {
    pub fn new(len: usize, edges: Vec<(usize, usize)>) -> Result<Self> {
        for &(parent, child) in &edges {
            if parent >= len || child >= len {
                return Err(Error::structure(format!(
                    "edge ({parent}, {child}) out of bounds for {len} points"
                )));
            }
        }
        Ok(Self { len, edges })
    }

    /// Edges from a dense matrix: any non-zero entry at `[i, j]` links
    /// parent `i` to child `j`.
    pub fn from_dense(matrix: ArrayView2<u8>) -> Result<Self> {
        let (rows, columns) = matrix.dim();
        if rows != columns {
            return Err(Error::structure(format!(
                "adjacency matrix is {rows}x{columns}, not square"
            )));
        }
        let edges = matrix
            .indexed_iter()
            .filter(|&(_, &v)| v != 0)
            .map(|((i, j), _)| (i, j))
            .collect();
        Ok(Self { len: rows, edges })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Reconstructed tracks over a set of point observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracks {
    /// One row per observation, in the input row order: the assigned track
    /// id followed by the observation's coordinates.
    pub data: Array2<f64>,
    /// Track lineage: each track id that begins at a branch or merge maps
    /// to the sorted ids of its parent tracks.
    pub graph: BTreeMap<u64, Vec<u64>>,
    /// Remaining per-observation columns, aligned with `data` rows.
    pub properties: PropertyTable,
}

/// Convert a parent/child adjacency over points into linear tracks and a
/// lineage graph.
///
/// A point continues its parent's track only when the link is strictly
/// one-to-one: the point has exactly one parent and that parent exactly
/// one child. Every other point (orphan, merge, or child of a fork)
/// starts a new track, numbered by a single counter in row order, so
/// identical input always yields identical ids. Each fork or merge
/// boundary between two track ids becomes a child-to-parent edge in the
/// lineage graph.
pub fn reconstruct_tracks(
    points: ArrayView2<f64>,
    adjacency: &SparseAdjacency,
    properties: Option<&PropertyTable>,
) -> Result<Tracks> {
    let n = points.nrows();
    if adjacency.len() != n {
        return Err(Error::structure(format!(
            "adjacency covers {} points but {n} coordinate rows were given",
            adjacency.len()
        )));
    }
    if let Some(table) = properties {
        for (field, column) in table {
            if column.len() != n {
                return Err(Error::structure(format!(
                    "property `{field}` has {} values for {n} points",
                    column.len()
                )));
            }
        }
    }

    let mut parents = vec![Vec::new(); n];
    let mut children = vec![Vec::new(); n];
    for &(parent, child) in &adjacency.edges {
        children[parent].push(child);
        parents[child].push(parent);
    }

    // A point is a track start unless it hangs off a strictly 1-to-1 link.
    let continues_parent = |point: usize| -> bool {
        matches!(parents[point].as_slice(), &[parent] if children[parent].len() == 1)
    };

    let mut ids: Vec<Option<u64>> = vec![None; n];
    let mut next_id = 0u64;
    for start in 0..n {
        if ids[start].is_some() || continues_parent(start) {
            continue;
        }
        let id = next_id;
        next_id += 1;
        ids[start] = Some(id);
        // Follow the unambiguous chain forward.
        let mut current = start;
        let mut steps = 0usize;
        while let &[child] = children[current].as_slice() {
            if parents[child].len() != 1 {
                break;
            }
            ids[child] = Some(id);
            current = child;
            steps += 1;
            if steps > n {
                return Err(Error::structure("track walk exceeded point count"));
            }
        }
    }

    let resolved = |point: usize| -> Result<u64> {
        ids[point].ok_or_else(|| {
            Error::structure(format!("point {point} unreachable: adjacency contains a cycle"))
        })
    };

    let mut data = Array2::zeros((n, points.ncols() + 1));
    for i in 0..n {
        data[[i, 0]] = resolved(i)? as f64;
        for (j, value) in points.row(i).iter().enumerate() {
            data[[i, j + 1]] = *value;
        }
    }

    let mut graph: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for child in 0..n {
        let child_id = resolved(child)?;
        for &parent in &parents[child] {
            let parent_id = resolved(parent)?;
            if parent_id != child_id {
                let entry = graph.entry(child_id).or_default();
                if !entry.contains(&parent_id) {
                    entry.push(parent_id);
                }
            }
        }
    }
    for parent_ids in graph.values_mut() {
        parent_ids.sort_unstable();
    }

    Ok(Tracks {
        data,
        graph,
        properties: properties.cloned().unwrap_or_default(),
    })
}

/// Assemble a tracks layer from points, adjacency, and extra columns.
pub fn tracks_layer(
    points: ArrayView2<f64>,
    adjacency: &SparseAdjacency,
    properties: Option<&PropertyTable>,
) -> Result<Layer> {
    let tracks = reconstruct_tracks(points, adjacency, properties)?;
    let metadata = LayerMetadata {
        properties: (!tracks.properties.is_empty()).then_some(tracks.properties),
        graph: Some(tracks.graph),
        ..Default::default()
    };
    Ok(Layer {
        data: LayerData::Table(tracks.data),
        metadata,
        kind: LayerKind::Tracks,
    })
}

/// Assemble a points layer from bare coordinates and extra columns.
pub fn points_layer(points: Array2<f64>, properties: Option<PropertyTable>) -> Layer {
    let metadata = LayerMetadata {
        properties,
        ..Default::default()
    };
    Layer {
        data: LayerData::Table(points),
        metadata,
        kind: LayerKind::Points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::Value;

    fn chain_points(n: usize) -> Array2<f64> {
        let mut points = Array2::zeros((n, 2));
        for i in 0..n {
            points[[i, 0]] = i as f64;
            points[[i, 1]] = 10.0 * i as f64;
        }
        points
    }

    #[test]
    fn test_linear_chain_is_one_track() {
        let points = chain_points(5);
        let adjacency =
            SparseAdjacency::new(5, vec![(0, 1), (1, 2), (2, 3), (3, 4)]).unwrap();
        let tracks = reconstruct_tracks(points.view(), &adjacency, None).unwrap();
        for i in 0..5 {
            assert_eq!(tracks.data[[i, 0]], 0.0);
            assert_eq!(tracks.data[[i, 1]], i as f64);
        }
        assert!(tracks.graph.is_empty());
    }

    #[test]
    fn test_fork_starts_two_tracks() {
        let points = chain_points(3);
        let adjacency = SparseAdjacency::new(3, vec![(0, 1), (0, 2)]).unwrap();
        let tracks = reconstruct_tracks(points.view(), &adjacency, None).unwrap();
        assert_eq!(tracks.data.column(0).to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(tracks.graph.get(&1), Some(&vec![0]));
        assert_eq!(tracks.graph.get(&2), Some(&vec![0]));
    }

    #[test]
    fn test_merge_starts_new_track_with_both_parents() {
        let points = chain_points(3);
        let adjacency = SparseAdjacency::new(3, vec![(0, 2), (1, 2)]).unwrap();
        let tracks = reconstruct_tracks(points.view(), &adjacency, None).unwrap();
        assert_eq!(tracks.data.column(0).to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(tracks.graph.get(&2), Some(&vec![0, 1]));
        assert_eq!(tracks.graph.len(), 1);
    }

    #[test]
    fn test_disconnected_points_are_trivial_tracks() {
        let points = chain_points(4);
        let adjacency = SparseAdjacency::new(4, Vec::new()).unwrap();
        let tracks = reconstruct_tracks(points.view(), &adjacency, None).unwrap();
        assert_eq!(tracks.data.column(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(tracks.graph.is_empty());
    }

    #[test]
    fn test_fork_then_chain_keeps_branch_ids() {
        // 0 -> {1, 2}; 1 -> 3: the chain after the fork keeps track 1.
        let points = chain_points(4);
        let adjacency = SparseAdjacency::new(4, vec![(0, 1), (0, 2), (1, 3)]).unwrap();
        let tracks = reconstruct_tracks(points.view(), &adjacency, None).unwrap();
        assert_eq!(tracks.data.column(0).to_vec(), vec![0.0, 1.0, 2.0, 1.0]);
        assert_eq!(tracks.graph.len(), 2);
    }

    #[test]
    fn test_from_dense_matches_edge_list() {
        let dense = array![[0u8, 1, 1], [0, 0, 0], [0, 0, 0]];
        let adjacency = SparseAdjacency::from_dense(dense.view()).unwrap();
        assert_eq!(
            adjacency,
            SparseAdjacency::new(3, vec![(0, 1), (0, 2)]).unwrap()
        );
    }

    #[test]
    fn test_cycle_is_loud() {
        let points = chain_points(3);
        let adjacency = SparseAdjacency::new(3, vec![(0, 1), (1, 2), (2, 0)]).unwrap();
        assert!(reconstruct_tracks(points.view(), &adjacency, None).is_err());
    }

    #[test]
    fn test_property_columns_pass_through_aligned() {
        let points = chain_points(2);
        let adjacency = SparseAdjacency::new(2, vec![(0, 1)]).unwrap();
        let mut table = PropertyTable::new();
        table.insert("state".into(), vec![Value::from("a"), Value::from("b")]);
        let tracks =
            reconstruct_tracks(points.view(), &adjacency, Some(&table)).unwrap();
        assert_eq!(tracks.properties, table);
        // misaligned columns are rejected
        table.insert("bad".into(), vec![Value::from(1)]);
        assert!(reconstruct_tracks(points.view(), &adjacency, Some(&table)).is_err());
    }

    #[test]
    fn test_edge_bounds_checked() {
        assert!(SparseAdjacency::new(2, vec![(0, 5)]).is_err());
        let rect = Array2::<u8>::zeros((2, 3));
        assert!(SparseAdjacency::from_dense(rect.view()).is_err());
    }
}
