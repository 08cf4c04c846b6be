//! Community detection: seeded multi-level Louvain over edge weights.
//!
//! Deterministic for a fixed seed: node visit order comes from a xorshift RNG,
//! neighbor communities are scanned in id order, and a node only moves on a
//! strictly positive improvement. Final ids are dense, ordered by community
//! size (descending) and then by smallest member name.

use crate::graph::CooccurrenceGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const GAIN_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub seed: u64,
    /// Local-moving sweeps per level.
    pub max_iterations: usize,
    /// Aggregation levels.
    pub max_levels: usize,
    pub resolution: f64,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iterations: 100,
            max_levels: 16,
            resolution: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub assignments: BTreeMap<String, usize>,
    pub community_count: usize,
    pub modularity: f64,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn community_of(&self, node: &str) -> Option<usize> {
        self.assignments.get(node).copied()
    }

    /// Members of each community, indexed by id, names sorted.
    pub fn communities(&self) -> Vec<Vec<&str>> {
        let mut out: Vec<Vec<&str>> = vec![Vec::new(); self.community_count];
        for (name, &id) in &self.assignments {
            if let Some(members) = out.get_mut(id) {
                members.push(name.as_str());
            }
        }
        out
    }
}

// Deterministic xorshift RNG for node ordering.
#[derive(Debug, Clone)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn gen_range_usize(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() as usize) % n
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        let n = items.len();
        for i in 0..n {
            let j = i + self.gen_range_usize(n - i);
            items.swap(i, j);
        }
    }
}

/// Weighted adjacency; aggregated levels carry self-loops as `A[c][c]`.
type Adjacency = Vec<BTreeMap<usize, f64>>;

pub fn detect_communities(graph: &CooccurrenceGraph, config: &CommunityConfig) -> Partition {
    let names: Vec<&str> = graph.nodes.keys().map(String::as_str).collect();
    let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut adj: Adjacency = vec![BTreeMap::new(); names.len()];
    for (key, stats) in &graph.edges {
        let (Some(&a), Some(&b)) = (index.get(key.source.as_str()), index.get(key.target.as_str()))
        else {
            continue;
        };
        let w = stats.weight as f64;
        *adj[a].entry(b).or_insert(0.0) += w;
        *adj[b].entry(a).or_insert(0.0) += w;
    }

    let m2: f64 = adj.iter().flat_map(|row| row.values()).sum();
    if names.is_empty() || m2 <= 0.0 {
        return Partition::default();
    }

    let mut rng = XorShift64::new(config.seed);
    let mut membership: Vec<usize> = (0..names.len()).collect();
    let mut levels = 0usize;

    while levels < config.max_levels.max(1) {
        levels += 1;
        let (community, improved) =
            local_moving(&adj, m2, config.resolution, config.max_iterations, &mut rng);
        if !improved {
            break;
        }
        for slot in membership.iter_mut() {
            *slot = community[*slot];
        }
        let count = community.iter().copied().max().map_or(0, |m| m + 1);
        if count == adj.len() {
            break;
        }
        adj = aggregate(&adj, &community, count);
    }

    // Dense ids: size descending, then smallest member (names are sorted).
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, &c) in membership.iter().enumerate() {
        groups.entry(c).or_default().push(node);
    }
    let mut ordered: Vec<Vec<usize>> = groups.into_values().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    let mut assignments = BTreeMap::new();
    for (id, members) in ordered.iter().enumerate() {
        for &node in members {
            assignments.insert(names[node].to_string(), id);
        }
    }

    let mut partition = Partition {
        community_count: ordered.len(),
        assignments,
        modularity: 0.0,
    };
    partition.modularity = modularity(graph, &partition, config.resolution);

    tracing::info!(
        nodes = names.len(),
        communities = partition.community_count,
        levels,
        modularity = partition.modularity,
        "detected communities"
    );
    partition
}

/// One Louvain level. Returns dense community ids per node and whether any
/// node moved.
fn local_moving(
    adj: &Adjacency,
    m2: f64,
    resolution: f64,
    max_iterations: usize,
    rng: &mut XorShift64,
) -> (Vec<usize>, bool) {
    let n = adj.len();
    let degree: Vec<f64> = adj.iter().map(|row| row.values().sum()).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut tot: Vec<f64> = degree.clone();

    let mut order: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut order);

    let mut improved = false;
    for _ in 0..max_iterations.max(1) {
        let mut moved_any = false;
        for &u in &order {
            let cur = community[u];

            let mut neigh_weights: BTreeMap<usize, f64> = BTreeMap::new();
            for (&v, &w) in &adj[u] {
                if v != u {
                    *neigh_weights.entry(community[v]).or_insert(0.0) += w;
                }
            }

            tot[cur] -= degree[u];

            let gain = |c: usize, k_in: f64| k_in - resolution * degree[u] * tot[c] / m2;
            let mut best = cur;
            let mut best_gain = gain(cur, neigh_weights.get(&cur).copied().unwrap_or(0.0));
            for (&c, &k_in) in &neigh_weights {
                let g = gain(c, k_in);
                if g > best_gain + GAIN_EPSILON {
                    best_gain = g;
                    best = c;
                }
            }

            community[u] = best;
            tot[best] += degree[u];
            if best != cur {
                moved_any = true;
                improved = true;
            }
        }
        if !moved_any {
            break;
        }
    }

    // Compress to dense ids in node order.
    let mut map: BTreeMap<usize, usize> = BTreeMap::new();
    for c in community.iter_mut() {
        let next = map.len();
        *c = *map.entry(*c).or_insert(next);
    }
    (community, improved)
}

fn aggregate(adj: &Adjacency, community: &[usize], count: usize) -> Adjacency {
    let mut out: Adjacency = vec![BTreeMap::new(); count];
    for (u, row) in adj.iter().enumerate() {
        let cu = community[u];
        for (&v, &w) in row {
            *out[cu].entry(community[v]).or_insert(0.0) += w;
        }
    }
    out
}

/// Weighted modularity of `partition` on `graph`.
///
/// `Q = Σ_c [ in_c / 2m - γ (tot_c / 2m)² ]`. Nodes missing from the
/// partition are treated as singletons.
pub fn modularity(graph: &CooccurrenceGraph, partition: &Partition, resolution: f64) -> f64 {
    let m2 = 2.0 * graph.total_weight() as f64;
    if m2 <= 0.0 {
        return 0.0;
    }
    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut tot: HashMap<usize, f64> = HashMap::new();
    let singleton_base = partition.community_count;
    let mut singletons = 0usize;
    let mut comm_of = |name: &str| -> usize {
        partition.community_of(name).unwrap_or_else(|| {
            singletons += 1;
            singleton_base + singletons
        })
    };

    for (key, stats) in &graph.edges {
        let w = stats.weight as f64;
        let ca = comm_of(key.source.as_str());
        let cb = comm_of(key.target.as_str());
        *tot.entry(ca).or_insert(0.0) += w;
        *tot.entry(cb).or_insert(0.0) += w;
        if ca == cb {
            *internal.entry(ca).or_insert(0.0) += 2.0 * w;
        }
    }

    tot.iter()
        .map(|(c, t)| {
            let in_c = internal.get(c).copied().unwrap_or(0.0);
            in_c / m2 - resolution * (t / m2).powi(2)
        })
        .sum()
}
