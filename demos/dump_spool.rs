// Dump undelivered aggregates from the spool as JSON (decodes the compressed BLOBs).
//
// Usage: cargo run --example dump_spool -- [DB_PATH] [LIMIT] [--mark-sent]
//   DB_PATH      default: ./data/metrics.db
//   LIMIT        default: 5
//   --mark-sent  flag the printed rows as sent

use telemetry_agent::error::SpoolError;
use telemetry_agent::spool::DurableSpool;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mark_sent = args.iter().any(|a| a == "--mark-sent");
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect();
    let path = positional.first().copied().unwrap_or("./data/metrics.db");
    let limit: u32 = positional
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let spool = DurableSpool::connect(path).await?;
    spool.init().await?;
    eprintln!("{} unsent aggregate(s) in {}", spool.count_unsent().await?, path);

    let records = spool.unsent(limit).await?;
    let mut rows: Vec<serde_json::Value> = Vec::with_capacity(records.len());
    for record in &records {
        match record.aggregate() {
            Ok(aggregate) => rows.push(serde_json::to_value(&aggregate)?),
            // Print what is there rather than abort the whole dump on one odd row.
            Err(e) => {
                eprintln!("record {}: {}; printing raw payload", record.id, e);
                match record
                    .payload_json()
                    .and_then(|raw| serde_json::from_slice(&raw).map_err(SpoolError::Decode))
                {
                    Ok(value) => rows.push(value),
                    Err(e) => eprintln!("record {}: unreadable: {}", record.id, e),
                }
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&rows)?);

    if mark_sent {
        for record in &records {
            spool.mark_sent(record.id).await?;
        }
        eprintln!("marked {} record(s) as sent", records.len());
    }
    Ok(())
}
