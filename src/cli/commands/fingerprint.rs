//! `task-intel fingerprint`: show how a text is keyed for deduplication.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::text;

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Text to fingerprint
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct FingerprintOutput {
    pub normalized: String,
    pub fingerprint: String,
    pub keywords: Vec<String>,
}

impl FingerprintOutput {
    pub fn for_text(input: &str) -> Self {
        Self {
            normalized: text::normalize(input),
            fingerprint: text::fingerprint(input),
            keywords: text::keywords(input),
        }
    }
}

impl CommandOutput for FingerprintOutput {
    fn to_human(&self) -> String {
        [
            format!("Normalized:  {}", self.normalized),
            format!("Fingerprint: {}", self.fingerprint),
            format!("Keywords:    {}", self.keywords.join(", ")),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: FingerprintArgs, json_mode: bool) -> Result<()> {
    output(&FingerprintOutput::for_text(&args.text), json_mode);
    Ok(())
}
