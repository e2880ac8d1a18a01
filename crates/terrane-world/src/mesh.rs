//! Shared patch mesh topology.
//!
//! Every patch of a level is drawn from the same vertex and index buffers:
//! a flat unit grid whose heights come from the level's texture array at
//! render time, plus a skirt hanging below the perimeter to hide seams
//! between neighbours of different resolution.

use bytemuck::{Pod, Zeroable};

/// Vertex of the patch template, in unit-patch coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
}

/// Immutable grid + skirt geometry for one level.
#[derive(Clone, Debug)]
pub struct MeshTemplate {
    grid_size: u32,
    vertices: Vec<TerrainVertex>,
    indices: Vec<u32>,
}

impl MeshTemplate {
    /// Build the template for a patch of `grid_size` cells per edge.
    ///
    /// Grid vertices sit at height 0. The `4 * grid_size` skirt vertices
    /// duplicate the perimeter at `skirt_height`.
    pub fn new(grid_size: u32, skirt_height: f32) -> Self {
        assert!(grid_size > 0, "mesh template needs at least one cell");
        let n = grid_size;
        let row = n + 1;
        let inv = 1.0 / n as f32;

        let mut vertices = Vec::with_capacity((row * row + 4 * n) as usize);
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(TerrainVertex {
                    position: [i as f32 * inv, 0.0, j as f32 * inv],
                });
            }
        }

        let perimeter = perimeter_indices(n);
        let skirt_base = vertices.len() as u32;
        for &p in &perimeter {
            let [x, _, z] = vertices[p as usize].position;
            vertices.push(TerrainVertex {
                position: [x, skirt_height, z],
            });
        }

        let mut indices = Vec::with_capacity((n * n * 6 + 4 * n * 6) as usize);
        for j in 0..n {
            for i in 0..n {
                let a = j * row + i;
                let b = a + 1;
                let c = a + row + 1;
                let d = a + row;
                indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }

        let ring = perimeter.len() as u32;
        for k in 0..ring {
            let next = (k + 1) % ring;
            let top_a = perimeter[k as usize];
            let top_b = perimeter[next as usize];
            let low_a = skirt_base + k;
            let low_b = skirt_base + next;
            indices.extend_from_slice(&[top_a, low_a, low_b, top_a, low_b, top_b]);
        }

        Self {
            grid_size,
            vertices,
            indices,
        }
    }

    /// Grid cells per edge.
    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// All vertices: grid first, then skirt.
    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }

    /// Triangle list indices.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of indices drawn per patch.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Triangles drawn per patch.
    pub fn triangle_count(&self) -> u32 {
        self.index_count() / 3
    }

    /// Number of grid (non-skirt) vertices.
    pub fn grid_vertex_count(&self) -> usize {
        let row = self.grid_size as usize + 1;
        row * row
    }

    /// Vertex data as bytes, ready for a vertex buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes, ready for an index buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Grid vertex indices around the perimeter, walking the closed ring once.
fn perimeter_indices(n: u32) -> Vec<u32> {
    let row = n + 1;
    let mut ring = Vec::with_capacity(4 * n as usize);
    // Bottom edge, left to right.
    for i in 0..n {
        ring.push(i);
    }
    // Right edge, bottom to top.
    for j in 0..n {
        ring.push(j * row + n);
    }
    // Top edge, right to left.
    for i in (1..=n).rev() {
        ring.push(n * row + i);
    }
    // Left edge, top to bottom.
    for j in (1..=n).rev() {
        ring.push(j * row);
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_and_index_counts() {
        let mesh = MeshTemplate::new(4, -1.0);
        assert_eq!(mesh.grid_vertex_count(), 25);
        assert_eq!(mesh.vertices().len(), 25 + 16);
        // 16 cells and 16 skirt edge-cells, two triangles each.
        assert_eq!(mesh.triangle_count(), 64);
        assert_eq!(mesh.index_count(), 192);
    }

    #[test]
    fn grid_is_flat_and_skirt_is_dropped() {
        let mesh = MeshTemplate::new(8, -1.0);
        let (grid, skirt) = mesh.vertices().split_at(mesh.grid_vertex_count());
        assert!(grid.iter().all(|v| v.position[1] == 0.0));
        assert!(skirt.iter().all(|v| v.position[1] == -1.0));
    }

    #[test]
    fn grid_spans_unit_square() {
        let mesh = MeshTemplate::new(8, -1.0);
        let grid = &mesh.vertices()[..mesh.grid_vertex_count()];
        assert_eq!(grid.first().unwrap().position, [0.0, 0.0, 0.0]);
        assert_eq!(grid.last().unwrap().position, [1.0, 0.0, 1.0]);
    }

    #[test]
    fn perimeter_visits_each_edge_vertex_once() {
        let n = 5;
        let ring = perimeter_indices(n);
        assert_eq!(ring.len(), 4 * n as usize);
        let mut sorted = ring.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ring.len());
        let row = n + 1;
        for idx in ring {
            let (i, j) = (idx % row, idx / row);
            assert!(i == 0 || j == 0 || i == n || j == n);
        }
    }

    #[test]
    fn skirt_vertices_sit_under_their_perimeter_vertex() {
        let mesh = MeshTemplate::new(3, -1.0);
        let ring = perimeter_indices(3);
        let skirt = &mesh.vertices()[mesh.grid_vertex_count()..];
        for (k, &p) in ring.iter().enumerate() {
            let top = mesh.vertices()[p as usize].position;
            let low = skirt[k].position;
            assert_eq!((top[0], top[2]), (low[0], low[2]));
        }
    }

    #[test]
    fn indices_stay_in_range() {
        let mesh = MeshTemplate::new(16, -1.0);
        let count = mesh.vertices().len() as u32;
        assert!(mesh.indices().iter().all(|&i| i < count));
        assert_eq!(mesh.vertex_bytes().len(), mesh.vertices().len() * 12);
        assert_eq!(mesh.index_bytes().len(), mesh.indices().len() * 4);
    }
}
