use crate::export_data::OutputFormat;
use crate::import_data::InputFormat;
use anyhow::Result;
use itertools::Itertools;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// The formats a run may pick from. Built by the caller and handed to
/// whatever needs to resolve a format; nothing here is global.
pub struct FormatRegistry {
    inputs: Vec<InputFormat>,
    outputs: Vec<OutputFormat>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry {
            inputs: InputFormat::iter().collect(),
            outputs: OutputFormat::iter().collect(),
        }
    }

    pub fn with_formats(inputs: Vec<InputFormat>, outputs: Vec<OutputFormat>) -> Self {
        FormatRegistry { inputs, outputs }
    }

    pub fn inputs(&self) -> &[InputFormat] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputFormat] {
        &self.outputs
    }

    /// Picks the reader for `spec`. An explicitly named format wins over
    /// detection.
    pub fn input_for(&self, spec: &str, forced: Option<&str>) -> Result<InputFormat> {
        if let Some(name) = forced {
            return InputFormat::from_str(name)
                .ok()
                .filter(|format| self.inputs.contains(format))
                .ok_or_else(|| {
                    anyhow!(
                        "unknown input format `{}`, supported: {}",
                        name,
                        self.inputs.iter().join(", ")
                    )
                });
        }
        self.inputs
            .iter()
            .copied()
            .find(|format| format.can_read(spec))
            .ok_or_else(|| {
                anyhow!(
                    "cannot tell the format of `{}`, supported: {}",
                    spec,
                    self.inputs.iter().join(", ")
                )
            })
    }

    pub fn output_for(&self, name: &str) -> Result<OutputFormat> {
        OutputFormat::from_str(name)
            .ok()
            .filter(|format| self.outputs.contains(format))
            .ok_or_else(|| {
                anyhow!(
                    "unknown output format `{}`, supported: {}",
                    name,
                    self.outputs.iter().join(", ")
                )
            })
    }
}
