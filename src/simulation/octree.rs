//! # Barnes–Hut Octree
//!
//! Hierarchical spatial index used to approximate the gravitational force on
//! every particle in `O(N log N)` instead of the `O(N²)` all-pairs sum.
//!
//! ## Layout
//!
//! The tree is an arena: all nodes live in one `Vec` and refer to each other
//! by index. Particles are referred to by their index in the caller's slice;
//! at insertion time the particle's position and mass are copied into a
//! compact body table so the finished tree is self-contained and can be
//! shared read-only between worker threads.
//!
//! - A node is **empty** (no body, no children), a **leaf** (one body, or a
//!   bucket of bodies that reached the depth cap), or **internal** (exactly 8
//!   children, one per octant).
//! - Children are always allocated after their parent, so a reverse sweep of
//!   the arena visits every child before its parent.
//! - `mass` / `com` are only meaningful after [`Octree::calculate_mass`].
//!
//! ## Octant encoding
//!
//! - Bit 0 (value 1): x >= center.x
//! - Bit 1 (value 2): y >= center.y
//! - Bit 2 (value 4): z >= center.z
//!
//! ## Depth cap
//!
//! Two particles at the same position would split forever. Once a leaf sits at
//! `max_depth` it stops splitting and chains further bodies into a bucket.
//! A query that reaches the bucket leaf evaluates its bodies one by one
//! (self excluded); the bucket's aggregate is only used when an ancestor
//! passes the opening test.

use crate::simulation::particle::{NVec3, Particle};
use crate::simulation::physics::Gravity;

/// A single octree node covering the cube `center ± half_size`.
#[derive(Debug, Clone)]
pub struct OctreeNode {
    pub mass: f64,
    pub com: NVec3,
    pub center: NVec3,
    pub half_size: f64,
    pub depth: usize,
    pub children: Option<[usize; 8]>, // indices into Octree::nodes
    pub body_index: Option<usize>,    // head of this leaf's body chain
}

impl OctreeNode {
    fn empty(center: NVec3, half_size: f64, depth: usize) -> Self {
        Self {
            mass: 0.0,
            com: NVec3::zeros(),
            center,
            half_size,
            depth,
            children: None,
            body_index: None,
        }
    }

    /// Full edge length of the cube.
    #[inline]
    pub fn size(&self) -> f64 {
        2.0 * self.half_size
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    pub fn contains(&self, p: &NVec3) -> bool {
        (p.x - self.center.x).abs() <= self.half_size
            && (p.y - self.center.y).abs() <= self.half_size
            && (p.z - self.center.z).abs() <= self.half_size
    }
}

/// Position and mass copied from the caller's particle at insertion time.
#[derive(Debug, Clone, Copy)]
struct TreeBody {
    position: NVec3,
    mass: f64,
    next: Option<usize>, // next body in the same bucket
    inserted: bool,
}

impl Default for TreeBody {
    fn default() -> Self {
        Self {
            position: NVec3::zeros(),
            mass: 0.0,
            next: None,
            inserted: false,
        }
    }
}

/// Cube geometry of one node, for debug rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugBox {
    pub center: NVec3,
    pub half_size: f64,
    pub depth: usize,
    pub occupied: bool,
}

/// Arena-backed Barnes–Hut octree over a slice of particles.
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    bodies: Vec<TreeBody>,
    root: usize,
    max_depth: usize,
    inserted: usize,
    dropped: usize,
}

impl Octree {
    /// Create an empty tree whose root covers `center ± half_size`.
    pub fn new(center: NVec3, half_size: f64, max_depth: usize) -> Self {
        Self {
            nodes: vec![OctreeNode::empty(center, half_size, 0)],
            bodies: Vec::new(),
            root: 0,
            max_depth,
            inserted: 0,
            dropped: 0,
        }
    }

    /// Build a fresh tree over every particle in `particles`.
    ///
    /// Particles outside the root cube are counted in [`Octree::dropped`]
    /// rather than inserted. Aggregates are *not* computed; call
    /// [`Octree::calculate_mass`] before querying forces.
    pub fn build(particles: &[Particle], center: NVec3, half_size: f64, max_depth: usize) -> Self {
        let mut tree = Self::new(center, half_size, max_depth);
        tree.bodies.reserve(particles.len());
        // Leaves are ~N and every split adds 8
        tree.nodes.reserve(particles.len() * 2);
        for i in 0..particles.len() {
            tree.add(particles, i);
        }
        tree
    }

    /// Insert particle `index` of `particles` into the tree.
    ///
    /// Descends from the root:
    /// - an empty node stores the particle,
    /// - a leaf already holding one particle splits into 8 children and both
    ///   particles move into the octants containing them,
    /// - an internal node forwards to the child octant.
    ///
    /// Returns `false` (and counts the particle as dropped) when the position
    /// lies outside the root cube or is not finite, or when `index` is out of
    /// range. The particle's position and mass are recorded either way so it
    /// can still be the subject of a force query.
    pub fn add(&mut self, particles: &[Particle], index: usize) -> bool {
        let Some(p) = particles.get(index) else {
            self.dropped += 1;
            return false;
        };

        if self.bodies.len() <= index {
            self.bodies.resize(index + 1, TreeBody::default());
        }
        if self.bodies[index].inserted {
            return false;
        }

        let position = p.position_f64();
        self.bodies[index] = TreeBody {
            position,
            mass: p.mass,
            next: None,
            inserted: false,
        };

        if !self.nodes[self.root].contains(&position) {
            self.dropped += 1;
            return false;
        }

        self.insert(self.root, index);
        self.bodies[index].inserted = true;
        self.inserted += 1;
        true
    }

    /// Aggregate total mass and center of mass for every node.
    ///
    /// Post-order by construction: children always have larger arena indices
    /// than their parent, so sweeping the arena backwards finishes every
    /// subtree before the node above it.
    pub fn calculate_mass(&mut self) {
        for node_idx in (0..self.nodes.len()).rev() {
            let mut mass = 0.0;
            let mut weighted = NVec3::zeros();

            // Bodies stored directly in this leaf (a bucket may hold several)
            let mut cursor = self.nodes[node_idx].body_index;
            while let Some(b) = cursor {
                let body = &self.bodies[b];
                mass += body.mass;
                weighted += body.position * body.mass;
                cursor = body.next;
            }

            if let Some(children) = self.nodes[node_idx].children {
                for child_idx in children {
                    let child = &self.nodes[child_idx];
                    if child.mass > 0.0 {
                        mass += child.mass;
                        weighted += child.com * child.mass;
                    }
                }
            }

            let node = &mut self.nodes[node_idx];
            node.mass = mass;
            node.com = if mass > 0.0 { weighted / mass } else { node.center };
        }
    }

    /// Approximate gravitational force on particle `index`.
    ///
    /// Uses the position and mass recorded when the particle was added.
    /// An index the tree has never seen gets zero force.
    ///
    /// # Parameters
    /// - `index`   : particle index in the slice the tree was built from
    /// - `gravity` : force law (G, softening, distance scale)
    /// - `theta`   : opening-angle threshold; `0` gives the exact sum
    pub fn calculate_force(&self, index: usize, gravity: &Gravity, theta: f64) -> NVec3 {
        match self.bodies.get(index) {
            Some(body) => self.force_at(body.position, body.mass, Some(index), gravity, theta),
            None => NVec3::zeros(),
        }
    }

    /// Approximate gravitational force on a point mass at `position`.
    ///
    /// `exclude` names a body that must not act on itself (the query
    /// particle). An empty tree returns zero.
    pub fn force_at(
        &self,
        position: NVec3,
        mass: f64,
        exclude: Option<usize>,
        gravity: &Gravity,
        theta: f64,
    ) -> NVec3 {
        let mut acc = NVec3::zeros();
        self.traverse_node(self.root, position, mass, exclude, gravity, theta, &mut acc);
        acc
    }

    /// Index of the inserted particle nearest to `point`.
    ///
    /// Branch-and-bound descent: a node is skipped once the closest point of
    /// its cube is farther than the best candidate found so far. Ties resolve
    /// to the lowest particle index. Dropped particles are not considered.
    pub fn nearest(&self, point: NVec3) -> Option<usize> {
        let mut best: Option<(f64, usize)> = None;
        let mut stack = vec![self.root];

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            let bound = box_distance2(&point, &node.center, node.half_size);
            if let Some((best_d2, _)) = best {
                if bound > best_d2 {
                    continue;
                }
            }

            let mut cursor = node.body_index;
            while let Some(b) = cursor {
                let body = &self.bodies[b];
                let d2 = (body.position - point).norm_squared();
                let better = match best {
                    None => true,
                    Some((best_d2, best_i)) => d2 < best_d2 || (d2 == best_d2 && b < best_i),
                };
                if better {
                    best = Some((d2, b));
                }
                cursor = body.next;
            }

            if let Some(children) = node.children {
                // Visit the octant containing the point last so it is popped first
                let first = child_index_for_point(&point, &node.center);
                for (octant, child_idx) in children.into_iter().enumerate() {
                    if octant != first {
                        stack.push(child_idx);
                    }
                }
                stack.push(children[first]);
            }
        }

        best.map(|(_, i)| i)
    }

    /// Geometry of every node, for optional debug rendering.
    pub fn bounds(&self) -> Vec<DebugBox> {
        self.nodes
            .iter()
            .map(|n| DebugBox {
                center: n.center,
                half_size: n.half_size,
                depth: n.depth,
                occupied: n.body_index.is_some() || n.children.is_some(),
            })
            .collect()
    }

    pub fn root(&self) -> &OctreeNode {
        &self.nodes[self.root]
    }

    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    /// Number of particles inserted.
    pub fn len(&self) -> usize {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Number of `add` calls rejected (outside the root cube or invalid).
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    // helpers ==============================================================================

    /// Walk from `node_idx` down to the leaf that should hold `body_idx`,
    /// splitting occupied leaves on the way.
    fn insert(&mut self, node_idx: usize, body_idx: usize) {
        let pos = self.bodies[body_idx].position;
        let mut node_idx = node_idx;

        loop {
            let node = &self.nodes[node_idx];

            // Case 1: internal -> descend into the octant containing the body
            if let Some(children) = node.children {
                node_idx = children[child_index_for_point(&pos, &node.center)];
                continue;
            }

            // Case 2: empty leaf -> store the body here
            let Some(existing) = node.body_index else {
                self.nodes[node_idx].body_index = Some(body_idx);
                return;
            };

            // Case 3: occupied leaf at the depth cap -> chain into the bucket
            if node.depth >= self.max_depth {
                self.bodies[body_idx].next = Some(existing);
                self.nodes[node_idx].body_index = Some(body_idx);
                return;
            }

            // Case 4: occupied leaf -> split, move the resident body down, and
            // retry this node (now internal) for the incoming body.
            let children = self.subdivide(node_idx);
            let center = self.nodes[node_idx].center;
            let existing_pos = self.bodies[existing].position;
            self.nodes[node_idx].body_index = None;
            self.nodes[children[child_index_for_point(&existing_pos, &center)]].body_index =
                Some(existing);
        }
    }

    /// Allocate the 8 children of `node_idx` and mark it internal.
    fn subdivide(&mut self, node_idx: usize) -> [usize; 8] {
        let parent = &self.nodes[node_idx];
        let center = parent.center;
        let child_half = parent.half_size * 0.5;
        let depth = parent.depth + 1;

        let first = self.nodes.len();
        for octant in 0..8 {
            let child_center = child_center(&center, child_half, octant);
            self.nodes.push(OctreeNode::empty(child_center, child_half, depth));
        }

        let children = std::array::from_fn(|octant| first + octant);
        self.nodes[node_idx].children = Some(children);
        children
    }

    /// Recursively accumulate the force from the subtree at `node_idx`.
    ///
    /// - Empty node (`mass == 0`): no contribution.
    /// - Leaf: exact pairwise interaction with every body it holds, skipping
    ///   `exclude`.
    /// - Internal node: if `size / distance < theta` and the query point is
    ///   not inside the cube, the whole subtree acts as one mass at its COM;
    ///   otherwise descend into the children.
    #[allow(clippy::too_many_arguments)]
    fn traverse_node(
        &self,
        node_idx: usize,
        pos: NVec3,
        mass: f64,
        exclude: Option<usize>,
        gravity: &Gravity,
        theta: f64,
        acc: &mut NVec3,
    ) {
        let node = &self.nodes[node_idx];
        if node.mass == 0.0 {
            return;
        }

        let Some(children) = node.children else {
            let mut cursor = node.body_index;
            while let Some(b) = cursor {
                let body = &self.bodies[b];
                if Some(b) != exclude {
                    *acc += gravity.force(pos, mass, body.position, body.mass);
                }
                cursor = body.next;
            }
            return;
        };

        let dist = (node.com - pos).norm();
        let far_enough = dist > 0.0 && node.size() / dist < theta && !node.contains(&pos);

        if far_enough {
            *acc += gravity.force(pos, mass, node.com, node.mass);
        } else {
            for child_idx in children {
                self.traverse_node(child_idx, pos, mass, exclude, gravity, theta, acc);
            }
        }
    }
}

// helpers ===========================================================================

/// Octant of `p` relative to a node centered at `center` (see module docs).
#[inline]
fn child_index_for_point(p: &NVec3, center: &NVec3) -> usize {
    let mut idx = 0;
    if p.x >= center.x { idx |= 1; }
    if p.y >= center.y { idx |= 2; }
    if p.z >= center.z { idx |= 4; }
    idx
}

/// Center of child `octant` given the parent center and the child half size.
#[inline]
fn child_center(center: &NVec3, child_half: f64, octant: usize) -> NVec3 {
    let sign = |bit: usize| if octant & bit == 0 { -1.0 } else { 1.0 };
    NVec3::new(
        center.x + sign(1) * child_half,
        center.y + sign(2) * child_half,
        center.z + sign(4) * child_half,
    )
}

/// Squared distance from `p` to the closest point of the cube `center ± half`.
#[inline]
fn box_distance2(p: &NVec3, center: &NVec3, half: f64) -> f64 {
    let d = (p - center).map(|c| (c.abs() - half).max(0.0));
    d.norm_squared()
}
