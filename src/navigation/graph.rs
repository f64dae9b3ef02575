// src/navigation/graph.rs
// Grid topology for route planning. Nodes are fixed at construction; edges between
// grid-adjacent tiles are the only mutable state and always change in both directions.

use log::debug;
use std::collections::VecDeque;

use crate::core::types::{GridGeometry, TilePosition};

/// Undirected `N x N` tile graph with unit edge weights.
#[derive(Debug, Clone)]
pub struct TileGraph {
    grid: GridGeometry,
    adjacency: Vec<Vec<usize>>,
}

impl TileGraph {
    /// Fully connected grid: every tile links to each of its up to four neighbours.
    pub fn new(grid: GridGeometry) -> Self {
        let size = grid.size();
        let mut adjacency = vec![Vec::with_capacity(4); (size * size) as usize];
        for y in 0..size {
            for x in 0..size {
                let tile = TilePosition::new(x, y);
                let Some(index) = grid.index(tile) else { continue };
                // +X, +Y, -X, -Y
                for (dx, dy) in [(1, 0), (0, 1), (-1, 0), (0, -1)] {
                    if let Some(neighbour) = grid.index(TilePosition::new(x + dx, y + dy)) {
                        adjacency[index].push(neighbour);
                    }
                }
            }
        }
        TileGraph { grid, adjacency }
    }

    /// Geometry of the graph.
    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    /// Node index of `tile`, if it lies on the grid.
    pub fn index_of(&self, tile: TilePosition) -> Option<usize> {
        self.grid.index(tile)
    }

    /// Tile at node `index`.
    pub fn tile_at(&self, index: usize) -> Option<TilePosition> {
        self.grid.tile_at(index)
    }

    /// Tiles currently reachable in one step from `tile`.
    pub fn neighbors(&self, tile: TilePosition) -> Vec<TilePosition> {
        self.index_of(tile)
            .map(|index| {
                self.adjacency[index]
                    .iter()
                    .filter_map(|&neighbour| self.tile_at(neighbour))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `a` and `b` are connected.
    pub fn has_edge(&self, a: TilePosition, b: TilePosition) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(a), Some(b)) => self.adjacency[a].contains(&b),
            _ => false,
        }
    }

    /// Removes the edge in both directions. Missing edges and off-grid tiles are a no-op.
    pub fn remove_edge(&mut self, a: TilePosition, b: TilePosition) -> bool {
        let (Some(a), Some(b)) = (self.index_of(a), self.index_of(b)) else {
            return false;
        };
        let had_edge = self.adjacency[a].contains(&b);
        self.adjacency[a].retain(|&n| n != b);
        self.adjacency[b].retain(|&n| n != a);
        had_edge
    }

    /// Re-links two grid-adjacent tiles. Returns `false` if they are not adjacent or
    /// already linked.
    pub fn restore_edge(&mut self, a: TilePosition, b: TilePosition) -> bool {
        if !a.is_adjacent(b) || self.has_edge(a, b) {
            return false;
        }
        let (Some(ia), Some(ib)) = (self.index_of(a), self.index_of(b)) else {
            return false;
        };
        self.adjacency[ia].push(ib);
        self.adjacency[ib].push(ia);
        true
    }

    /// Removes every edge incident to `index`.
    pub fn isolate_node(&mut self, index: usize) {
        let Some(neighbours) = self.adjacency.get_mut(index).map(std::mem::take) else {
            return;
        };
        for neighbour in neighbours {
            self.adjacency[neighbour].retain(|&n| n != index);
        }
    }

    /// Isolates the node under `tile`. Returns `false` for off-grid tiles.
    pub fn block_tile(&mut self, tile: TilePosition) -> bool {
        match self.index_of(tile) {
            Some(index) => {
                self.isolate_node(index);
                debug!("Blocked tile {}", tile);
                true
            }
            None => false,
        }
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Breadth-first shortest path.
    ///
    /// The result excludes `start` and ends at `goal`. It is empty when the tiles are equal,
    /// either is off the grid, or `goal` is unreachable.
    pub fn shortest_path(&self, start: TilePosition, goal: TilePosition) -> Vec<TilePosition> {
        let (Some(start), Some(goal)) = (self.index_of(start), self.index_of(goal)) else {
            return Vec::new();
        };
        if start == goal {
            return Vec::new();
        }

        let mut previous: Vec<Option<usize>> = vec![None; self.adjacency.len()];
        let mut visited = vec![false; self.adjacency.len()];
        let mut frontier = VecDeque::from([start]);
        visited[start] = true;

        while let Some(node) = frontier.pop_front() {
            if node == goal {
                break;
            }
            for &neighbour in &self.adjacency[node] {
                if !visited[neighbour] {
                    visited[neighbour] = true;
                    previous[neighbour] = Some(node);
                    frontier.push_back(neighbour);
                }
            }
        }

        if !visited[goal] {
            return Vec::new();
        }

        let mut path = Vec::new();
        let mut node = goal;
        while node != start {
            if let Some(tile) = self.tile_at(node) {
                path.push(tile);
            }
            match previous[node] {
                Some(parent) => node = parent,
                None => return Vec::new(),
            }
        }
        path.reverse();
        path
    }
}
