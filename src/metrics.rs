//! Token and latency accounting for agent runs.

use serde::{Deserialize, Serialize};

/// Loop variants tracked when collecting metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionName {
    Structural,
    Visual,
}

/// Aggregated token usage and inference latency across the two loops.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PilotMetrics {
    pub structural_prompt_tokens: u64,
    pub structural_completion_tokens: u64,
    pub structural_inference_time_ms: u64,

    pub visual_prompt_tokens: u64,
    pub visual_completion_tokens: u64,
    pub visual_inference_time_ms: u64,

    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_inference_time_ms: u64,
}

impl PilotMetrics {
    /// Merge the values from another metrics instance into this one.
    pub fn merge(&mut self, other: &PilotMetrics) {
        self.structural_prompt_tokens += other.structural_prompt_tokens;
        self.structural_completion_tokens += other.structural_completion_tokens;
        self.structural_inference_time_ms += other.structural_inference_time_ms;

        self.visual_prompt_tokens += other.visual_prompt_tokens;
        self.visual_completion_tokens += other.visual_completion_tokens;
        self.visual_inference_time_ms += other.visual_inference_time_ms;

        self.total_prompt_tokens += other.total_prompt_tokens;
        self.total_completion_tokens += other.total_completion_tokens;
        self.total_inference_time_ms += other.total_inference_time_ms;
    }

    /// Record metrics for one model call and update cumulative totals.
    pub fn record(
        &mut self,
        function: FunctionName,
        prompt_tokens: u64,
        completion_tokens: u64,
        inference_time_ms: u64,
    ) {
        match function {
            FunctionName::Structural => {
                self.structural_prompt_tokens += prompt_tokens;
                self.structural_completion_tokens += completion_tokens;
                self.structural_inference_time_ms += inference_time_ms;
            }
            FunctionName::Visual => {
                self.visual_prompt_tokens += prompt_tokens;
                self.visual_completion_tokens += completion_tokens;
                self.visual_inference_time_ms += inference_time_ms;
            }
        }

        self.total_prompt_tokens += prompt_tokens;
        self.total_completion_tokens += completion_tokens;
        self.total_inference_time_ms += inference_time_ms;
    }
}
