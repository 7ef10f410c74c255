//! Fuzzscout discovery core: page extraction, endpoint normalization, and stage-handoff artifacts.

pub mod commands;
pub mod error;
pub mod extract;
pub mod labeler;
pub mod normalize;
pub mod report;
pub mod scope;
pub mod triage;
pub mod types;

pub use commands::{parse_command_list, split_command, CommandLine};
pub use error::{ScoutError, ScoutResult};
pub use extract::{extract_page, PageExtract, ScriptHints};
pub use normalize::{normalize, normalize_url, EndpointKey, EndpointSet};
pub use report::{build_report, read_report, write_json_artifact, SessionCapture};
pub use scope::{same_host, validate_target};
pub use types::*;
