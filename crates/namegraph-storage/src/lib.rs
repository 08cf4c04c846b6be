//! Namegraph storage
//!
//! Everything that touches disk lives here:
//!
//! ```text
//! mentions.jsonl ──► JsonlMentionStore ──► MentionBatch ──► core
//!
//! store/
//! ├── manifest.json      ordered tags, parents, digests, latest
//! ├── F1.json            one file per generation
//! └── F2.json
//!
//! network/
//! ├── nodes.json
//! ├── edges.json
//! └── communities.json
//! ```
//!
//! Writes go through a temp file in the target directory and are renamed
//! into place, so a crashed run never leaves a half-written generation.

pub mod error;
pub mod exclusions;
mod fsio;
pub mod generations;
pub mod mentions;
pub mod network;

pub use error::StoreError;
pub use exclusions::load_exclusions;
pub use generations::{GenerationStore, Manifest, ManifestEntry, MANIFEST_FILE};
pub use mentions::{
    InMemoryMentionStore, JsonlMentionStore, MentionBatch, MentionFilter, NameMentionStore,
};
pub use network::{read_network, write_network, NetworkFiles};
