//! Seed emission and the on-disk corpus.

mod render;
mod store;

pub use render::{parse_seed_header, render_seed, SeedHeader};
pub use store::{load_index, seed_file_name, seed_id_from_name, SeedMeta, SeedStore, SEED_INDEX};
