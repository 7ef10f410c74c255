//! `fuzzscout classify`: the built-in parameter type labeler.

use crate::cli::output;
use anyhow::Result;
use std::path::Path;

pub async fn run(input: &Path, out: &Path) -> Result<()> {
    let labeled = fuzzscout::labeler::classify_file(input, out)?;
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "output": out,
            "labeledParameters": labeled,
        }));
    } else if !output::is_quiet() {
        println!("  Labeled {labeled} parameters -> {}", out.display());
    }
    Ok(())
}
