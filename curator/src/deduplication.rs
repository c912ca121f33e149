// ---------------------------------------------------------------------------
// Deduplication — partition records into near-duplicate groups
// ---------------------------------------------------------------------------
//
// Two records are duplicates when their cosine similarity reaches the
// threshold or their normalised documents are identical. Pair decisions are
// fed into a union-find, so the resulting groups are the connected
// components of the duplicate relation: symmetric and transitive by
// construction.
//
// Pairwise mode compares every pair. Bucketed mode hashes unit vectors with
// random-hyperplane signatures into several independent tables and compares
// only records that share a signature in at least one table. Every candidate
// pair is verified with the exact cosine test, so bucketed mode never
// over-groups; it may miss a pair only when that pair collides in no table.
// Signature length is chosen so that a pair exactly at the threshold collides
// in each table with probability at least 1/2, which puts the chance of
// missing it below 2^-24. Pairs further above the threshold collide more
// often, and transitive joins through other members recover most misses.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::config::{CurationConfig, DedupMode};
use crate::cosine::{cosine_with_magnitudes, magnitude, unit_vector};
use crate::error::CuratorError;
use crate::pipeline::CancellationFlag;
use crate::text::normalize_document;
use crate::types::{DuplicateGroup, DuplicateMap, Record};

/// Independent hash tables in bucketed mode.
const LSH_TABLES: usize = 24;

/// Upper bound on signature bits per table.
const MAX_SIGNATURE_BITS: usize = 32;

/// Hyperplanes are drawn from a fixed seed so that runs are reproducible.
const HYPERPLANE_SEED: u64 = 0x5EED_0F_C0_5105;

// ---------------------------------------------------------------------------
// Union-find
// ---------------------------------------------------------------------------

/// Disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct UnionFind {
	parent: Vec<usize>,
	size: Vec<usize>,
}

impl UnionFind {
	pub fn new(n: usize) -> Self {
		Self {
			parent: (0..n).collect(),
			size: vec![1; n],
		}
	}

	pub fn find(&mut self, mut x: usize) -> usize {
		while self.parent[x] != x {
			self.parent[x] = self.parent[self.parent[x]];
			x = self.parent[x];
		}
		x
	}

	/// Merge the sets of `a` and `b`. Returns false if already joined.
	pub fn union(&mut self, a: usize, b: usize) -> bool {
		let (mut ra, mut rb) = (self.find(a), self.find(b));
		if ra == rb {
			return false;
		}
		if self.size[ra] < self.size[rb] {
			std::mem::swap(&mut ra, &mut rb);
		}
		self.parent[rb] = ra;
		self.size[ra] += self.size[rb];
		true
	}

	pub fn set_size(&mut self, x: usize) -> usize {
		let root = self.find(x);
		self.size[root]
	}
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Eligible record with its precomputed magnitude.
struct Candidate<'a> {
	record: &'a Record,
	magnitude: f64,
}

impl Candidate<'_> {
	fn is_vector_duplicate(&self, other: &Candidate<'_>, threshold: f64) -> bool {
		let usable = |m: f64| m > 0.0 && m.is_finite();
		if !usable(self.magnitude)
			|| !usable(other.magnitude)
			|| self.record.vector.len() != other.record.vector.len()
		{
			return false;
		}
		cosine_with_magnitudes(
			&self.record.vector,
			&other.record.vector,
			self.magnitude,
			other.magnitude,
		) >= threshold
	}
}

/// Group the records at `eligible` (indices into `records`) by duplicate
/// relation. Records outside `eligible` never appear in the result.
pub fn detect_duplicates(
	records: &[Record],
	eligible: &[usize],
	config: &CurationConfig,
	cancel: &CancellationFlag,
) -> Result<DuplicateMap, CuratorError> {
	let candidates: Vec<Candidate<'_>> = eligible
		.iter()
		.map(|&i| Candidate {
			record: &records[i],
			magnitude: magnitude(&records[i].vector),
		})
		.collect();

	let mut uf = UnionFind::new(candidates.len());
	join_identical_documents(&candidates, &mut uf);

	let threshold = config.duplicate_threshold;
	match config.dedup_mode {
		DedupMode::Pairwise => {
			if candidates.len() > config.max_pairwise_records {
				return Err(CuratorError::ResourceExhausted {
					records: candidates.len(),
					limit: config.max_pairwise_records,
				});
			}
			join_pairwise(&candidates, threshold, &mut uf, cancel)?;
		}
		DedupMode::Bucketed => {
			join_bucketed(&candidates, threshold, &mut uf, cancel)?;
		}
	}

	let map = collect_groups(&candidates, &mut uf);
	tracing::info!(
		mode = ?config.dedup_mode,
		groups = map.groups.len(),
		records = map.by_record.len(),
		"Detected duplicates"
	);
	Ok(map)
}

/// Records whose normalised documents match are always duplicates.
fn join_identical_documents(candidates: &[Candidate<'_>], uf: &mut UnionFind) {
	let mut first_by_text: HashMap<String, usize> = HashMap::new();
	for (i, c) in candidates.iter().enumerate() {
		let normalized = normalize_document(c.record.document_text());
		if normalized.is_empty() {
			continue;
		}
		match first_by_text.get(&normalized) {
			Some(&first) => {
				uf.union(first, i);
			}
			None => {
				first_by_text.insert(normalized, i);
			}
		}
	}
}

fn join_pairwise(
	candidates: &[Candidate<'_>],
	threshold: f64,
	uf: &mut UnionFind,
	cancel: &CancellationFlag,
) -> Result<(), CuratorError> {
	for i in 0..candidates.len() {
		cancel.check()?;
		for j in (i + 1)..candidates.len() {
			if candidates[i].is_vector_duplicate(&candidates[j], threshold) {
				uf.union(i, j);
			}
		}
	}
	Ok(())
}

/// Signature bits per table such that two unit vectors exactly at
/// `threshold` share a table's signature with probability at least 1/2.
///
/// One random hyperplane separates two vectors at angle `θ` with probability
/// `θ / π`, so `k` hyperplanes agree with probability `(1 - θ/π)^k`.
fn signature_bits(threshold: f64) -> usize {
	let angle = threshold.clamp(-1.0, 1.0).acos();
	let agree = 1.0 - angle / std::f64::consts::PI;
	if agree >= 1.0 {
		return MAX_SIGNATURE_BITS;
	}
	let bits = (0.5f64.ln() / agree.ln()).floor();
	(bits as usize).clamp(1, MAX_SIGNATURE_BITS)
}

/// `count` hyperplane normals with standard normal coordinates.
fn random_hyperplanes(count: usize, dim: usize) -> Vec<Vec<f64>> {
	let mut rng = ChaCha8Rng::seed_from_u64(HYPERPLANE_SEED);
	let mut planes = Vec::with_capacity(count);
	for _ in 0..count {
		let mut plane = Vec::with_capacity(dim);
		for _ in 0..dim {
			let x: f64 = StandardNormal.sample(&mut rng);
			plane.push(x);
		}
		planes.push(plane);
	}
	planes
}

/// One bit per hyperplane: set when `unit` lies on its positive side.
fn signature(unit: &[f64], planes: &[Vec<f64>]) -> u64 {
	planes.iter().enumerate().fold(0u64, |sig, (bit, plane)| {
		let dot: f64 = unit.iter().zip(plane).map(|(a, b)| a * b).sum();
		if dot >= 0.0 { sig | (1u64 << bit) } else { sig }
	})
}

/// Join duplicates among records sharing a signature in any table. Returns
/// the number of exact cosine comparisons made.
fn join_bucketed(
	candidates: &[Candidate<'_>],
	threshold: f64,
	uf: &mut UnionFind,
	cancel: &CancellationFlag,
) -> Result<usize, CuratorError> {
	let units: Vec<(usize, Vec<f64>)> = candidates
		.iter()
		.enumerate()
		.filter_map(|(i, c)| unit_vector(&c.record.vector).map(|u| (i, u)))
		.collect();
	let Some(dim) = units.first().map(|(_, u)| u.len()) else {
		return Ok(0);
	};
	if units.len() < 2 {
		return Ok(0);
	}

	let bits = signature_bits(threshold);
	let planes = random_hyperplanes(LSH_TABLES * bits, dim);
	let mut compared = 0usize;

	for table in planes.chunks(bits) {
		let mut buckets: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
		for (i, u) in units.iter().filter(|(_, u)| u.len() == dim) {
			buckets.entry(signature(u, table)).or_default().push(*i);
		}

		for members in buckets.values() {
			cancel.check()?;
			for (n, &i) in members.iter().enumerate() {
				for &j in &members[n + 1..] {
					if uf.find(i) == uf.find(j) {
						continue;
					}
					compared += 1;
					if candidates[i].is_vector_duplicate(&candidates[j], threshold) {
						uf.union(i, j);
					}
				}
			}
		}
	}

	tracing::debug!(tables = LSH_TABLES, bits, compared, "Bucketed candidates");
	Ok(compared)
}

/// Turn union-find components of size > 1 into numbered groups. Groups are
/// numbered by their first member in input order; members keep input order.
fn collect_groups(candidates: &[Candidate<'_>], uf: &mut UnionFind) -> DuplicateMap {
	let mut group_of_root: HashMap<usize, usize> = HashMap::new();
	let mut groups: Vec<DuplicateGroup> = Vec::new();
	let mut by_record = BTreeMap::new();

	for (i, c) in candidates.iter().enumerate() {
		if uf.set_size(i) < 2 {
			continue;
		}
		let root = uf.find(i);
		let gid = *group_of_root.entry(root).or_insert_with(|| {
			groups.push(DuplicateGroup {
				id: groups.len(),
				members: Vec::new(),
				size: 0,
			});
			groups.len() - 1
		});
		groups[gid].members.push(c.record.id.clone());
		groups[gid].size += 1;
		by_record.insert(c.record.id.clone(), gid);
	}

	DuplicateMap { by_record, groups }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn make_record(id: &str, vector: Vec<f32>, document: Option<&str>) -> Record {
		Record {
			id: id.to_string(),
			vector,
			metadata: BTreeMap::new(),
			document: document.map(str::to_string),
		}
	}

	fn detect(records: &[Record], config: &CurationConfig) -> DuplicateMap {
		let eligible: Vec<usize> = (0..records.len()).collect();
		detect_duplicates(records, &eligible, config, &CancellationFlag::new()).unwrap()
	}

	fn with_mode(mode: DedupMode, threshold: f64) -> CurationConfig {
		CurationConfig {
			dedup_mode: mode,
			duplicate_threshold: threshold,
			..Default::default()
		}
	}

	// -- union-find -----------------------------------------------------------

	#[test]
	fn union_find_joins_transitively() {
		let mut uf = UnionFind::new(4);
		assert!(uf.union(0, 1));
		assert!(uf.union(1, 2));
		assert!(!uf.union(0, 2));
		assert_eq!(uf.find(0), uf.find(2));
		assert_ne!(uf.find(0), uf.find(3));
		assert_eq!(uf.set_size(2), 3);
		assert_eq!(uf.set_size(3), 1);
	}

	// -- detection ------------------------------------------------------------

	#[test]
	fn groups_similar_vectors() {
		let records = vec![
			make_record("a", vec![1.0, 0.0, 0.0], None),
			make_record("b", vec![0.99, 0.01, 0.0], None),
			make_record("c", vec![0.0, 1.0, 0.0], None),
		];
		let map = detect(&records, &with_mode(DedupMode::Pairwise, 0.98));
		assert_eq!(map.groups.len(), 1);
		assert_eq!(map.groups[0].members, vec!["a", "b"]);
		assert_eq!(map.groups[0].size, 2);
		assert_eq!(map.group_of("a"), map.group_of("b"));
		assert_eq!(map.group_of("c"), None);
	}

	#[test]
	fn identical_text_groups_regardless_of_vectors() {
		let records = vec![
			make_record("d", vec![1.0, 0.0, 0.0], Some("Heap  overflow in Parser")),
			make_record("e", vec![0.0, 0.0, 1.0], Some("heap overflow in parser ")),
			make_record("f", vec![0.0, 1.0, 0.0], Some("something else")),
		];
		let map = detect(&records, &CurationConfig::default());
		assert_eq!(map.groups.len(), 1);
		assert_eq!(map.groups[0].members, vec!["d", "e"]);
	}

	#[test]
	fn empty_documents_never_group() {
		let records = vec![
			make_record("a", vec![1.0, 0.0], Some("")),
			make_record("b", vec![0.0, 1.0], Some("   ")),
		];
		assert!(detect(&records, &CurationConfig::default()).groups.is_empty());
	}

	#[test]
	fn zero_vectors_are_not_vector_duplicates() {
		let records = vec![
			make_record("a", vec![0.0, 0.0], None),
			make_record("b", vec![0.0, 0.0], None),
		];
		let map = detect(&records, &with_mode(DedupMode::Pairwise, 0.0));
		assert!(map.groups.is_empty());
	}

	#[test]
	fn grouping_is_transitive() {
		// a~b and b~c reach 0.94, a~c alone does not.
		let records = vec![
			make_record("a", vec![1.0, 0.0], None),
			make_record("b", vec![0.94, 0.34], None),
			make_record("c", vec![0.77, 0.64], None),
		];
		let config = with_mode(DedupMode::Pairwise, 0.94);
		assert!(crate::cosine::cosine_similarity(&records[0].vector, &records[2].vector) < 0.94);
		let map = detect(&records, &config);
		assert_eq!(map.groups.len(), 1);
		assert_eq!(map.groups[0].size, 3);
	}

	#[test]
	fn only_eligible_records_are_considered() {
		let records = vec![
			make_record("a", vec![1.0, 0.0], None),
			make_record("b", vec![1.0, 0.0], None),
		];
		let map = detect_duplicates(
			&records,
			&[0],
			&CurationConfig::default(),
			&CancellationFlag::new(),
		)
		.unwrap();
		assert!(map.groups.is_empty());
	}

	#[test]
	fn pairwise_refuses_oversized_collections() {
		let records: Vec<Record> = (0..5)
			.map(|i| make_record(&format!("r{i}"), vec![i as f32, 1.0], None))
			.collect();
		let config = CurationConfig {
			max_pairwise_records: 4,
			..Default::default()
		};
		let eligible: Vec<usize> = (0..records.len()).collect();
		let err =
			detect_duplicates(&records, &eligible, &config, &CancellationFlag::new()).unwrap_err();
		assert!(matches!(
			err,
			CuratorError::ResourceExhausted {
				records: 5,
				limit: 4
			}
		));

		let bucketed = CurationConfig {
			dedup_mode: DedupMode::Bucketed,
			..config
		};
		assert!(detect_duplicates(&records, &eligible, &bucketed, &CancellationFlag::new()).is_ok());
	}

	#[test]
	fn bucketed_matches_pairwise() {
		// Deterministic pseudo-random vectors with planted near-copies.
		let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
		let mut next = || {
			state ^= state << 13;
			state ^= state >> 7;
			state ^= state << 17;
			(state % 2000) as f32 / 1000.0 - 1.0
		};
		let mut records = Vec::new();
		for i in 0..60 {
			let base: Vec<f32> = (0..8).map(|_| next()).collect();
			records.push(make_record(&format!("r{i}"), base.clone(), None));
			if i % 4 == 0 {
				let near: Vec<f32> = base.iter().map(|v| v + next() * 0.02).collect();
				records.push(make_record(&format!("r{i}-copy"), near, None));
			}
			if i % 9 == 0 {
				let chained: Vec<f32> = base.iter().map(|v| v * 1.5 + next() * 0.05).collect();
				records.push(make_record(&format!("r{i}-chain"), chained, None));
			}
		}

		for threshold in [0.0, 0.5, 0.9, 0.98, 0.995, 1.0] {
			let pairwise = detect(&records, &with_mode(DedupMode::Pairwise, threshold));
			let bucketed = detect(&records, &with_mode(DedupMode::Bucketed, threshold));
			assert_eq!(pairwise, bucketed, "threshold {threshold}");
		}
	}

	#[test]
	fn signature_bits_follow_threshold() {
		assert_eq!(signature_bits(0.0), 1);
		assert_eq!(signature_bits(1.0), MAX_SIGNATURE_BITS);
		assert!(signature_bits(0.98) > signature_bits(0.9));
		for t in [0.0_f64, 0.5, 0.9, 0.98, 0.995] {
			let agree = 1.0 - t.acos() / std::f64::consts::PI;
			assert!(agree.powi(signature_bits(t) as i32) >= 0.5, "threshold {t}");
		}
	}

	#[test]
	fn bucketed_prunes_high_dimensional_collections() {
		// 1000 random directions in 128 dimensions plus 40 slightly perturbed
		// copies (cosine about 0.995 with their originals).
		let mut state: u64 = 0x2545_F491_4F6C_DD1D;
		let mut uniform = || {
			state ^= state << 13;
			state ^= state >> 7;
			state ^= state << 17;
			(state % 2_000_001) as f32 / 1_000_000.0 - 1.0
		};
		let mut records = Vec::new();
		for i in 0..1000 {
			let base: Vec<f32> = (0..128)
				.map(|_| uniform() + uniform() + uniform() + uniform())
				.collect();
			if i % 25 == 0 {
				let near: Vec<f32> = base.iter().map(|v| v + uniform() * 0.2).collect();
				records.push(make_record(&format!("r{i}-copy"), near, None));
			}
			records.push(make_record(&format!("r{i}"), base, None));
		}

		let candidates: Vec<Candidate<'_>> = records
			.iter()
			.map(|r| Candidate {
				record: r,
				magnitude: magnitude(&r.vector),
			})
			.collect();
		let mut uf = UnionFind::new(candidates.len());
		let compared =
			join_bucketed(&candidates, 0.98, &mut uf, &CancellationFlag::new()).unwrap();
		let all_pairs = candidates.len() * (candidates.len() - 1) / 2;
		assert!(
			(compared as f64) < 0.1 * all_pairs as f64,
			"compared {compared} of {all_pairs} pairs"
		);

		let pairwise = detect(&records, &with_mode(DedupMode::Pairwise, 0.98));
		let bucketed = detect(&records, &with_mode(DedupMode::Bucketed, 0.98));
		assert_eq!(pairwise.groups.len(), 40);
		assert_eq!(pairwise, bucketed);
	}

	#[test]
	fn mismatched_dimensions_never_match() {
		let records = vec![
			make_record("a", vec![1.0, 0.0], None),
			make_record("b", vec![1.0, 0.0, 0.0], None),
		];
		for mode in [DedupMode::Pairwise, DedupMode::Bucketed] {
			assert!(detect(&records, &with_mode(mode, 0.0)).groups.is_empty());
		}
	}

	#[test]
	fn cancelled_detection_stops() {
		let records = vec![
			make_record("a", vec![1.0, 0.0], None),
			make_record("b", vec![1.0, 0.0], None),
		];
		let cancel = CancellationFlag::new();
		cancel.cancel();
		let err = detect_duplicates(&records, &[0, 1], &CurationConfig::default(), &cancel)
			.unwrap_err();
		assert!(matches!(err, CuratorError::Cancelled));
	}
}
