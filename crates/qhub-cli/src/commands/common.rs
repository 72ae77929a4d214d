//! Shared helpers for CLI commands.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use tracing::debug;

use qhub_adapter_sim::SimulatedService;
use qhub_hal::Counts;
use qhub_ir::{Circuit, predefined};
use qhub_orchestrator::{Config, ConnectionContext, Orchestrator};

/// Build an orchestrator over the in-process simulated service and connect.
pub async fn connect(config: Config, token: &str) -> Result<(Orchestrator, ConnectionContext)> {
    let orchestrator = Orchestrator::builder(Arc::new(SimulatedService::new()))
        .with_config(config)
        .build()?;

    let mut ctx = ConnectionContext::new();
    orchestrator.connect(&mut ctx, token).await?;
    debug!(targets = ctx.targets().len(), "connected to simulated service");
    Ok((orchestrator, ctx))
}

/// Load a library circuit by name.
pub fn load_library_circuit(name: &str) -> Result<Circuit> {
    predefined(name).map_err(|e| anyhow::anyhow!("{e}. Run 'qhub circuits' for the list"))
}

/// Load a circuit from a JSON file.
pub fn load_circuit_file(path: &Path) -> Result<(Circuit, String)> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let circuit =
        Circuit::from_json(&source).map_err(|e| anyhow::anyhow!("Invalid circuit file: {e}"))?;
    Ok((circuit, source))
}

/// One histogram row: bitstring, count, percentage, bar.
pub fn histogram_rows(counts: &Counts, limit: usize) -> Vec<(String, u64, f64, usize)> {
    let total = counts.total();
    if total == 0 {
        return Vec::new();
    }

    let mut sorted: Vec<(&str, u64)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    sorted
        .into_iter()
        .take(limit)
        .map(|(bits, count)| {
            let prob = count as f64 / total as f64 * 100.0;
            (bits.to_string(), count, prob, (prob / 2.0).round() as usize)
        })
        .collect()
}

/// Print hardware counts, with the local simulation alongside when present.
pub fn print_counts(hardware: &Counts, local: Option<&Counts>) {
    println!(
        "\n{} Results ({} shots):",
        style("✓").green().bold(),
        hardware.total()
    );

    for (bitstring, count, prob, bar_len) in histogram_rows(hardware, 16) {
        let local_note = local
            .map(|l| format!(" local {:>6}", l.get(&bitstring)))
            .unwrap_or_default();
        println!(
            "  {}: {:>6} ({:>5.2}%){} {}",
            style(&bitstring).cyan(),
            count,
            prob,
            style(local_note).dim(),
            style("█".repeat(bar_len)).green()
        );
    }

    if hardware.len() > 16 {
        println!("  ... and {} more outcomes", hardware.len() - 16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_rows_sorted_by_count() {
        let mut counts = Counts::new();
        counts.insert("00", 300);
        counts.insert("11", 700);

        let rows = histogram_rows(&counts, 16);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "11");
        assert!((rows[0].2 - 70.0).abs() < 1e-9);
        assert_eq!(rows[0].3, 35);
    }

    #[test]
    fn test_histogram_rows_limit_and_empty() {
        let mut counts = Counts::new();
        for i in 0..20u64 {
            counts.insert(format!("{i:05b}"), i + 1);
        }
        assert_eq!(histogram_rows(&counts, 16).len(), 16);
        assert!(histogram_rows(&Counts::new(), 16).is_empty());
    }

    #[test]
    fn test_load_library_circuit() {
        let circuit = load_library_circuit("bell_state").unwrap();
        assert_eq!(circuit.num_qubits(), 2);

        let err = load_library_circuit("nope").unwrap_err();
        assert!(err.to_string().contains("qhub circuits"));
    }

    #[test]
    fn test_load_circuit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bell.json");
        let json = serde_json::to_string(&Circuit::bell().unwrap()).unwrap();
        fs::write(&path, &json).unwrap();

        let (circuit, source) = load_circuit_file(&path).unwrap();
        assert_eq!(circuit.num_qubits(), 2);
        assert_eq!(source, json);

        assert!(load_circuit_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_load_circuit_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_circuit_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid circuit file"));
    }
}
