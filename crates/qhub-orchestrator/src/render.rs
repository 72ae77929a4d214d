//! Rendering of circuit diagrams and result histograms.
//!
//! The orchestrator only needs bytes to put in the cache, so rendering sits
//! behind [`ArtifactRenderer`]. [`SvgRenderer`] is the built-in
//! implementation and produces standalone SVG documents.

use std::f64::consts::PI;
use std::fmt::Write as _;

use qhub_hal::Counts;
use qhub_ir::{Circuit, Instruction, InstructionKind, StandardGate};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Rendering failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    #[error("circuit has no qubits to draw")]
    EmptyCircuit,

    #[error("no outcomes to plot")]
    EmptyHistogram,

    #[error("formatting failed: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Produces image bytes for the cache.
pub trait ArtifactRenderer: Send + Sync {
    /// Draw a circuit.
    fn circuit_diagram(&self, circuit: &Circuit) -> Result<Vec<u8>, RenderError>;

    /// Plot one histogram.
    fn histogram(&self, title: &str, counts: &Counts) -> Result<Vec<u8>, RenderError>;

    /// Plot hardware and local counts side by side.
    fn comparison(&self, hardware: &Counts, local: &Counts) -> Result<Vec<u8>, RenderError>;
}

// Layout, in SVG user units.
const WIRE_SPACING: f64 = 50.0;
const LAYER_WIDTH: f64 = 70.0;
const MARGIN: f64 = 40.0;
const GATE_SIZE: f64 = 34.0;
const CHART_HEIGHT: f64 = 240.0;
const BAR_SLOT: f64 = 36.0;
/// Histograms keep at most this many outcomes, the most frequent ones.
const MAX_BARS: usize = 32;

const HARDWARE_COLOR: &str = "#1f77b4";
const LOCAL_COLOR: &str = "#ff7f0e";

/// SVG renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRenderer;

impl SvgRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactRenderer for SvgRenderer {
    fn circuit_diagram(&self, circuit: &Circuit) -> Result<Vec<u8>, RenderError> {
        if circuit.num_qubits() == 0 {
            return Err(RenderError::EmptyCircuit);
        }
        let layers = circuit_to_layers(circuit);
        let wires = circuit.num_qubits() as f64;
        let width = 2.0 * MARGIN + LAYER_WIDTH * (layers.len().max(1) as f64);
        let height = 2.0 * MARGIN + WIRE_SPACING * (wires - 1.0) + 20.0;

        let mut svg = String::new();
        open_svg(&mut svg, width, height)?;
        writeln!(
            svg,
            r#"<text x="{MARGIN}" y="16" font-size="12">{}</text>"#,
            escape(circuit.name())
        )?;

        for q in 0..circuit.num_qubits() {
            let y = wire_y(q);
            writeln!(
                svg,
                r#"<line x1="{MARGIN}" y1="{y}" x2="{x2}" y2="{y}" stroke="black"/>"#,
                x2 = width - 10.0
            )?;
            writeln!(
                svg,
                r#"<text x="4" y="{ty}" font-size="12">q{q}</text>"#,
                ty = y + 4.0
            )?;
        }

        for (depth, layer) in layers.iter().enumerate() {
            let x = MARGIN + LAYER_WIDTH * (depth as f64 + 0.5);
            for inst in layer {
                draw_instruction(&mut svg, inst, x)?;
            }
        }

        svg.push_str("</svg>\n");
        Ok(svg.into_bytes())
    }

    fn histogram(&self, title: &str, counts: &Counts) -> Result<Vec<u8>, RenderError> {
        let bars = top_outcomes(&[counts]);
        if bars.is_empty() {
            return Err(RenderError::EmptyHistogram);
        }
        let total = counts.total().max(1) as f64;
        let series = [Series {
            counts,
            total,
            color: HARDWARE_COLOR,
        }];
        chart(title, &bars, &series, None)
    }

    fn comparison(&self, hardware: &Counts, local: &Counts) -> Result<Vec<u8>, RenderError> {
        let bars = top_outcomes(&[hardware, local]);
        if bars.is_empty() {
            return Err(RenderError::EmptyHistogram);
        }
        let series = [
            Series {
                counts: hardware,
                total: hardware.total().max(1) as f64,
                color: HARDWARE_COLOR,
            },
            Series {
                counts: local,
                total: local.total().max(1) as f64,
                color: LOCAL_COLOR,
            },
        ];
        chart(
            "Hardware vs local simulation",
            &bars,
            &series,
            Some(["hardware", "local"]),
        )
    }
}

/// Group instructions by the earliest layer all their qubits are free.
fn circuit_to_layers(circuit: &Circuit) -> Vec<Vec<&Instruction>> {
    let mut layers: Vec<Vec<&Instruction>> = Vec::new();
    let mut qubit_depth: FxHashMap<u32, usize> = FxHashMap::default();

    for inst in circuit.instructions() {
        // Multi-qubit gates block every wire between their extremes.
        let span = wire_span(inst);
        let depth = span
            .clone()
            .map(|q| qubit_depth.get(&q).copied().unwrap_or(0))
            .max()
            .unwrap_or(0);
        while layers.len() <= depth {
            layers.push(Vec::new());
        }
        layers[depth].push(inst);
        for q in span {
            qubit_depth.insert(q, depth + 1);
        }
    }
    layers
}

fn wire_span(inst: &Instruction) -> std::ops::RangeInclusive<u32> {
    let lo = inst.qubits.iter().map(|q| q.0).min().unwrap_or(0);
    let hi = inst.qubits.iter().map(|q| q.0).max().unwrap_or(0);
    lo..=hi
}

fn wire_y(qubit: u32) -> f64 {
    MARGIN + 10.0 + WIRE_SPACING * f64::from(qubit)
}

fn draw_instruction(svg: &mut String, inst: &Instruction, x: f64) -> Result<(), RenderError> {
    match &inst.kind {
        InstructionKind::Barrier => {
            let span = wire_span(inst);
            writeln!(
                svg,
                r#"<line x1="{x}" y1="{y1}" x2="{x}" y2="{y2}" stroke="gray" stroke-dasharray="4"/>"#,
                y1 = wire_y(*span.start()) - 20.0,
                y2 = wire_y(*span.end()) + 20.0
            )?;
        }
        InstructionKind::Measure => {
            let y = wire_y(inst.qubits[0].0);
            gate_box(svg, x, y, "M", "#eeeeee")?;
            if let Some(c) = inst.clbits.first() {
                writeln!(
                    svg,
                    r#"<text x="{tx}" y="{ty}" font-size="9">c{c}</text>"#,
                    c = c.0,
                    tx = x + GATE_SIZE / 2.0 + 2.0,
                    ty = y + GATE_SIZE / 2.0
                )?;
            }
        }
        InstructionKind::Reset => {
            gate_box(svg, x, wire_y(inst.qubits[0].0), "|0⟩", "#eeeeee")?;
        }
        InstructionKind::Gate(gate) if inst.qubits.len() > 1 => {
            let span = wire_span(inst);
            writeln!(
                svg,
                r#"<line x1="{x}" y1="{y1}" x2="{x}" y2="{y2}" stroke="black"/>"#,
                y1 = wire_y(*span.start()),
                y2 = wire_y(*span.end())
            )?;
            let (controls, targets) = inst.qubits.split_at(controls_of(gate));
            for c in controls {
                writeln!(
                    svg,
                    r#"<circle cx="{x}" cy="{cy}" r="5" fill="black"/>"#,
                    cy = wire_y(c.0)
                )?;
            }
            let label = target_label(gate);
            for t in targets {
                gate_box(svg, x, wire_y(t.0), &label, "#d0e4f5")?;
            }
        }
        InstructionKind::Gate(gate) => {
            gate_box(svg, x, wire_y(inst.qubits[0].0), &gate_label(gate), "#d0e4f5")?;
        }
    }
    Ok(())
}

fn gate_box(svg: &mut String, x: f64, y: f64, label: &str, fill: &str) -> Result<(), RenderError> {
    let half = GATE_SIZE / 2.0;
    let font = if label.chars().count() > 3 { 9 } else { 13 };
    writeln!(
        svg,
        r#"<rect x="{rx}" y="{ry}" width="{GATE_SIZE}" height="{GATE_SIZE}" fill="{fill}" stroke="black"/>"#,
        rx = x - half,
        ry = y - half
    )?;
    writeln!(
        svg,
        r#"<text x="{x}" y="{ty}" font-size="{font}" text-anchor="middle">{}</text>"#,
        escape(label),
        ty = y + 4.0
    )?;
    Ok(())
}

fn controls_of(gate: &StandardGate) -> usize {
    match gate {
        StandardGate::CX | StandardGate::CY | StandardGate::CZ | StandardGate::CP(_) => 1,
        StandardGate::CCX => 2,
        _ => 0,
    }
}

/// Label drawn on the target wire of a controlled gate.
fn target_label(gate: &StandardGate) -> String {
    match gate {
        StandardGate::CX | StandardGate::CCX => "X".to_string(),
        StandardGate::CY => "Y".to_string(),
        StandardGate::CZ => "Z".to_string(),
        StandardGate::CP(theta) => format!("P({})", format_angle(*theta)),
        StandardGate::Swap => "×".to_string(),
        other => gate_label(other),
    }
}

fn gate_label(gate: &StandardGate) -> String {
    match gate {
        StandardGate::X => "X".to_string(),
        StandardGate::Y => "Y".to_string(),
        StandardGate::Z => "Z".to_string(),
        StandardGate::H => "H".to_string(),
        StandardGate::S => "S".to_string(),
        StandardGate::Sdg => "S†".to_string(),
        StandardGate::T => "T".to_string(),
        StandardGate::Tdg => "T†".to_string(),
        StandardGate::SX => "√X".to_string(),
        StandardGate::Rx(p) => format!("RX({})", format_angle(*p)),
        StandardGate::Ry(p) => format!("RY({})", format_angle(*p)),
        StandardGate::Rz(p) => format!("RZ({})", format_angle(*p)),
        StandardGate::P(p) => format!("P({})", format_angle(*p)),
        StandardGate::CX => "CX".to_string(),
        StandardGate::CY => "CY".to_string(),
        StandardGate::CZ => "CZ".to_string(),
        StandardGate::CP(p) => format!("CP({})", format_angle(*p)),
        StandardGate::Swap => "SWAP".to_string(),
        StandardGate::CCX => "CCX".to_string(),
    }
}

/// Angles near common multiples of π print symbolically.
fn format_angle(value: f64) -> String {
    const EPS: f64 = 1e-10;
    let named = [
        (PI, "π"),
        (PI / 2.0, "π/2"),
        (PI / 4.0, "π/4"),
        (PI / 8.0, "π/8"),
        (-PI, "-π"),
        (-PI / 2.0, "-π/2"),
        (-PI / 4.0, "-π/4"),
    ];
    named
        .iter()
        .find(|(v, _)| (value - v).abs() < EPS)
        .map_or_else(|| format!("{value:.2}"), |(_, s)| (*s).to_string())
}

struct Series<'a> {
    counts: &'a Counts,
    total: f64,
    color: &'static str,
}

/// Outcomes to plot: every nonzero bitstring of any input, capped to the
/// most frequent, then in bitstring order.
fn top_outcomes(inputs: &[&Counts]) -> Vec<String> {
    let mut merged: FxHashMap<&str, u64> = FxHashMap::default();
    for counts in inputs {
        for (bits, n) in counts.iter() {
            if n > 0 {
                *merged.entry(bits).or_default() += n;
            }
        }
    }
    let mut ranked: Vec<(&str, u64)> = merged.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.truncate(MAX_BARS);
    let mut bars: Vec<String> = ranked.into_iter().map(|(b, _)| b.to_string()).collect();
    bars.sort();
    bars
}

fn chart(
    title: &str,
    bars: &[String],
    series: &[Series<'_>],
    legend: Option<[&str; 2]>,
) -> Result<Vec<u8>, RenderError> {
    let slot = BAR_SLOT * series.len() as f64;
    let width = 2.0 * MARGIN + slot * bars.len() as f64 + 20.0;
    let height = CHART_HEIGHT + 2.0 * MARGIN + 30.0;
    let base = MARGIN + CHART_HEIGHT;

    let mut svg = String::new();
    open_svg(&mut svg, width, height)?;
    writeln!(
        svg,
        r#"<text x="{MARGIN}" y="20" font-size="14">{}</text>"#,
        escape(title)
    )?;
    writeln!(
        svg,
        r#"<line x1="{MARGIN}" y1="{base}" x2="{x2}" y2="{base}" stroke="black"/>"#,
        x2 = width - MARGIN
    )?;

    for (i, bits) in bars.iter().enumerate() {
        let x0 = MARGIN + 10.0 + slot * i as f64;
        for (s, data) in series.iter().enumerate() {
            let p = data.counts.get(bits) as f64 / data.total;
            let h = p * CHART_HEIGHT;
            writeln!(
                svg,
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h:.2}" fill="{color}"><title>{bits}: {p:.3}</title></rect>"#,
                x = x0 + BAR_SLOT * s as f64,
                y = base - h,
                w = BAR_SLOT - 6.0,
                color = data.color
            )?;
        }
        writeln!(
            svg,
            r#"<text x="{x}" y="{y}" font-size="10" transform="rotate(60 {x} {y})">{bits}</text>"#,
            x = x0 + 4.0,
            y = base + 12.0
        )?;
    }

    if let Some(names) = legend {
        for (s, (name, data)) in names.iter().zip(series).enumerate() {
            let y = 34.0 + 14.0 * s as f64;
            writeln!(
                svg,
                r#"<rect x="{x}" y="{ry}" width="10" height="10" fill="{color}"/><text x="{tx}" y="{ty}" font-size="11">{name}</text>"#,
                x = width - MARGIN - 80.0,
                ry = y - 9.0,
                tx = width - MARGIN - 65.0,
                ty = y,
                color = data.color
            )?;
        }
    }

    svg.push_str("</svg>\n");
    Ok(svg.into_bytes())
}

fn open_svg(svg: &mut String, width: f64, height: f64) -> Result<(), RenderError> {
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
