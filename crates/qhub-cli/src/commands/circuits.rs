//! Circuits command implementation.

use console::style;

use qhub_ir::{PREDEFINED_CIRCUITS, predefined};

/// Execute the circuits command.
pub fn execute() {
    println!("{} Library circuits:\n", style("QHub").cyan().bold());

    for name in PREDEFINED_CIRCUITS {
        match predefined(name) {
            Ok(circuit) => {
                let note = if circuit.has_measurements() {
                    ""
                } else {
                    " (estimator only)"
                };
                println!(
                    "  {} {} qubits, {} gates{}",
                    style(format!("{name:<28}")).bold(),
                    circuit.num_qubits(),
                    circuit.num_ops(),
                    style(note).dim()
                );
            }
            Err(e) => println!("  {} {}", style(name).red(), e),
        }
    }
}
