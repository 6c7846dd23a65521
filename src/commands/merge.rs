//! Merge command handler.

use std::path::Path;

use crmsync::services::{IndexMatches, LinkDecision, SimilarityMerger};

/// Ranks the match sets in `file` and prints the link decision.
pub fn cmd_merge(file: &Path, json: bool) -> anyhow::Result<()> {
    let sets: Vec<IndexMatches> = super::read_json(file)?;
    let decision = LinkDecision::from_candidates(SimilarityMerger::default().merge(&sets));

    if json {
        let output = serde_json::json!({
            "allow_create": decision.allow_create,
            "candidates": decision.candidates,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if decision.candidates.is_empty() {
        println!("No similar records.");
    }
    for (rank, candidate) in decision.candidates.iter().enumerate() {
        println!(
            "{:>2}. {:<24} {:<12} score {:.2}",
            rank + 1,
            candidate.record.id.as_str(),
            candidate.record.module.as_str(),
            candidate.score
        );
    }
    println!();
    match decision.certain_match() {
        Some(best) => println!("Link to {} (certain match).", best.record.id),
        None => println!("No certain match; a new record may be created."),
    }
    Ok(())
}
