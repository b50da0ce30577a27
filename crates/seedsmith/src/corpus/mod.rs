//! Corpus tools: API triples, minimization and the exploration schedule.

mod minimize;
mod schedule;
mod triples;

pub use minimize::{
    apply_minimization, load_corpus, minimize_by_triples, CorpusSeed, Minimization, REDUNDANT_DIR,
};
pub use schedule::Schedule;
pub use triples::{api_triples, ApiTriple, TripleSet};
