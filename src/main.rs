use tracing::info;

use shuffleboard::config::InspectConfig;
use shuffleboard::journal;

/// Replay an order journal and print the last persisted order of every
/// container as JSON. With `SHUFFLEBOARD_COMPACT=true` the journal is
/// rewritten to that single state afterwards.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let config = InspectConfig::from_env();
    let inspection = journal::inspect(&config.journal, config.compact)?;
    info!(
        "{}: {} batches, {} containers",
        config.journal.display(),
        inspection.batches,
        inspection.containers.len()
    );
    println!("{}", serde_json::to_string_pretty(&inspection.containers)?);
    if inspection.compacted {
        info!("compacted {} batches into one", inspection.batches);
    }
    Ok(())
}
