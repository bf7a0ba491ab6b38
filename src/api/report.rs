// Deployment reports
//
// Renders deployment records, previews and failures for the operator.

use std::fs;
use std::path::Path;

use anyhow::Result;
use common::DeploymentRecord;
use serde::Serialize;

use crate::error::Error;
use crate::orchestrator::PlanPreview;

/// Report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Plain text
    Text,
    /// JSON
    Json,
}

#[derive(Serialize)]
struct FailureReport<'a> {
    error: String,
    step: Option<usize>,
    deployed: Option<&'a DeploymentRecord>,
}

/// Report formatter
pub struct ReportFormatter;

impl ReportFormatter {
    /// Format a record as JSON
    pub fn to_json(record: &DeploymentRecord) -> Result<String> {
        Ok(serde_json::to_string_pretty(record)?)
    }

    /// Format a record as text: one `name: address` line per contract
    pub fn to_text(record: &DeploymentRecord) -> String {
        let mut text = String::new();

        text.push_str(&format!(
            "Plan {} deployed by {:?} (nonce {} onwards)\n",
            record.plan, record.deployer, record.start_nonce
        ));
        for contract in &record.contracts {
            text.push_str(&format!("  {}: {:?}\n", contract.name, contract.address));
        }
        for call in &record.calls {
            text.push_str(&format!(
                "  {} -> {:?}.{} ({:?})\n",
                call.name, call.target, call.function, call.tx_hash
            ));
        }

        let wrong = record.mispredicted();
        if !wrong.is_empty() {
            text.push_str("Mispredicted:\n");
            for (name, predicted, realized) in wrong {
                text.push_str(&format!(
                    "  {}: predicted {:?}, deployed {:?}\n",
                    name, predicted, realized
                ));
            }
        }

        text
    }

    /// Format a record
    pub fn format(record: &DeploymentRecord, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Self::to_json(record),
            ReportFormat::Text => Ok(Self::to_text(record)),
        }
    }

    /// Format a failure together with whatever was deployed before it
    pub fn failure(error: &Error, format: ReportFormat) -> Result<String> {
        let step = match error {
            Error::DeploymentFailed { step, .. } => Some(*step),
            _ => None,
        };
        let deployed = error.partial_record();

        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&FailureReport {
                error: error.to_string(),
                step,
                deployed,
            })?),
            ReportFormat::Text => {
                let mut text = format!("Deployment failed: {}\n", error);
                match deployed {
                    Some(record) if !record.contracts.is_empty() => {
                        text.push_str(
                            "Already on chain (not rolled back, do not redeploy blindly):\n",
                        );
                        for contract in &record.contracts {
                            text.push_str(&format!(
                                "  {}: {:?}\n",
                                contract.name, contract.address
                            ));
                        }
                    }
                    _ => text.push_str("Nothing was deployed.\n"),
                }
                Ok(text)
            }
        }
    }

    /// Format a dry run
    pub fn preview(preview: &PlanPreview) -> String {
        let mut text = format!(
            "Plan {} from {:?}, {} transactions starting at nonce {}\n",
            preview.plan,
            preview.deployer,
            preview.steps.len(),
            preview.start_nonce
        );
        for step in &preview.steps {
            text.push_str(&format!(
                "{}. {} [{}] nonce {}",
                step.index, step.name, step.action, step.nonce
            ));
            if let Some(prediction) = &step.prediction {
                text.push_str(&format!(" -> {:?}", prediction.address));
            }
            text.push('\n');
            for arg in &step.args {
                text.push_str(&format!("     {}\n", arg));
            }
        }
        text
    }

    /// Save a record to a file
    pub fn save_to_file<P: AsRef<Path>>(
        record: &DeploymentRecord,
        path: P,
        format: ReportFormat,
    ) -> Result<()> {
        fs::write(path, Self::format(record, format)?)?;
        Ok(())
    }
}
