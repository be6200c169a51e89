// Randomized multi-replica convergence of whole-project documents: every
// replica edits several files concurrently with partial syncs in between,
// and after settling all replicas must agree on every buffer and on the
// registered path set.

use proptest::prelude::*;

use palimpsest_engine::crdt::ProjectDoc;

const PATHS: &[&str] = &["main.tex", "chapters/intro.tex", "bib/refs.bib"];
const ORIGIN: &str = "action";
const OPS_PER_RUN: usize = 10_000;

/// xorshift64*-based op stream, reproducible from the seed proptest reports.
struct OpStream {
    state: u64,
}

impl OpStream {
    fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            (self.next() % bound as u64) as usize
        }
    }

    /// ASCII fragment of 1..=max_len characters (byte index == char index).
    fn fragment(&mut self, max_len: usize) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789 \n\\{}_%";
        let len = 1 + self.below(max_len);
        (0..len).map(|_| ALPHABET[self.below(ALPHABET.len())] as char).collect()
    }

    fn distinct_pair(&mut self, bound: usize) -> (usize, usize) {
        let a = self.below(bound);
        let mut b = self.below(bound);
        if b == a {
            b = (b + 1) % bound;
        }
        (a, b)
    }
}

fn sync(source: &ProjectDoc, target: &ProjectDoc) {
    let sv = target.encode_state_vector();
    let diff = source.encode_diff(&sv).expect("state vector should decode");
    target.apply_update(&diff).expect("diff should apply");
}

fn settle(replicas: &[ProjectDoc]) {
    // Two full all-pairs rounds reach a fixed point for any edit history.
    for _ in 0..2 {
        for a in 0..replicas.len() {
            for b in 0..replicas.len() {
                if a != b {
                    sync(&replicas[a], &replicas[b]);
                }
            }
        }
    }
}

/// One random insert, removal, or range replace on a random file.
fn edit(replica: &ProjectDoc, stream: &mut OpStream) {
    let path = PATHS[stream.below(PATHS.len())];
    let len = replica.text_len(path) as usize;

    match (len, stream.below(4)) {
        (0, _) | (_, 0) | (_, 1) => {
            let index = stream.below(len + 1) as u32;
            replica.insert_text(path, index, &stream.fragment(12), ORIGIN);
        }
        (_, 2) => {
            let start = stream.below(len);
            let span = 1 + stream.below(len - start);
            replica.remove_text(path, start as u32, span as u32, ORIGIN);
        }
        _ => {
            let start = stream.below(len);
            let span = 1 + stream.below(len - start);
            replica.replace_text(path, start as u32, span as u32, &stream.fragment(8), ORIGIN);
        }
    }
}

/// Two replicas at the same frontier insert at the same index of the same
/// file, the classic CRDT tie-break case.
fn contended_insert(replicas: &[ProjectDoc], stream: &mut OpStream) {
    let (a, b) = stream.distinct_pair(replicas.len());
    sync(&replicas[a], &replicas[b]);
    sync(&replicas[b], &replicas[a]);

    let path = PATHS[stream.below(PATHS.len())];
    let index = stream.below(replicas[a].text_len(path) as usize + 1) as u32;
    replicas[a].insert_text(path, index, &stream.fragment(6), ORIGIN);
    replicas[b].insert_text(path, index, &stream.fragment(6), ORIGIN);
}

fn seed_large_project(replica: &ProjectDoc) {
    let mut body = String::with_capacity(140_000);
    for section in 0..1_600 {
        body.push_str("\\section{Draft ");
        body.push_str(&section.to_string());
        body.push_str("}\nSome running text that pads the buffer out.\n\n");
    }
    assert!(body.len() > 100_000, "seed should exceed 100KB");
    replica.insert_text("main.tex", 0, &body, ORIGIN);
    replica.insert_text("bib/refs.bib", 0, "@book{k, title={Seed}}\n", ORIGIN);
}

fn assert_converged(replicas: &[ProjectDoc], seed: u64) {
    let reference = &replicas[0];
    for (idx, replica) in replicas.iter().enumerate().skip(1) {
        assert_eq!(
            replica.file_paths(),
            reference.file_paths(),
            "path registry diverged for seed={seed}, replica={idx}"
        );
        for path in PATHS {
            assert_eq!(
                replica.text_of(path),
                reference.text_of(path),
                "buffer diverged for seed={seed}, replica={idx}, path={path}"
            );
        }
    }
}

fn run_convergence(seed: u64, replica_count: usize, ops: usize, large_seed: bool) {
    let replicas: Vec<ProjectDoc> = (1..=replica_count as u64)
        .map(|client_id| {
            let doc = ProjectDoc::with_client_id(client_id);
            for path in PATHS {
                doc.ensure_file(path);
            }
            doc
        })
        .collect();
    let mut stream = OpStream::new(seed);

    if large_seed {
        seed_large_project(&replicas[0]);
        settle(&replicas);
    }

    // The tie-break case is exercised at least once per run.
    contended_insert(&replicas, &mut stream);

    for _ in 0..ops {
        match stream.below(8) {
            0..=4 => edit(&replicas[stream.below(replica_count)], &mut stream),
            5 => contended_insert(&replicas, &mut stream),
            _ => {
                let (from, to) = stream.distinct_pair(replica_count);
                sync(&replicas[from], &replicas[to]);
            }
        }
    }

    settle(&replicas);
    assert_converged(&replicas, seed);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 1,
        max_shrink_iters: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn project_replicas_converge_after_10k_randomized_ops(
        seed in any::<u64>(),
        replica_count in 3usize..6,
    ) {
        run_convergence(seed, replica_count, OPS_PER_RUN, false);
    }

    #[test]
    fn project_replicas_converge_from_a_large_seeded_document(seed in any::<u64>()) {
        run_convergence(seed ^ 0x5EED_CAFE, 4, 1_200, true);
    }
}
