use async_trait::async_trait;
use tracing::debug;

use super::oracle::{OracleError, OracleResponse, ScoringOracle};
use super::prompts::{analysis_system_prompt, build_analysis_prompt};
use crate::llm_client::{LlmClient, LlmError};

/// `ScoringOracle` backed by the shared chat-completion client.
pub struct LlmScoringOracle {
    llm: LlmClient,
    system: String,
}

impl LlmScoringOracle {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            system: analysis_system_prompt(),
        }
    }
}

#[async_trait]
impl ScoringOracle for LlmScoringOracle {
    fn model(&self) -> &str {
        self.llm.model()
    }

    async fn score(
        &self,
        candidate_text: &str,
        job_text: &str,
    ) -> Result<OracleResponse, OracleError> {
        let prompt = build_analysis_prompt(candidate_text, job_text);
        debug!("Scoring prompt: {} chars", prompt.len());

        self.llm
            .call_json::<OracleResponse>(&prompt, &self.system)
            .await
            .map_err(|e| match e {
                LlmError::Parse(e) => OracleError::Malformed(e.to_string()),
                LlmError::EmptyContent => OracleError::Malformed("empty reply".to_string()),
                other => OracleError::Llm(other),
            })
    }
}
